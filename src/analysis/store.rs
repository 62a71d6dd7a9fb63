//! Binary fingerprint files.
//!
//! Layout, native byte order, all fields `u32`:
//!
//! ```text
//! TRANSFORM_SIZE FIRST_FREQ LAST_FREQ sample_count
//! per sample: frame_count species id, then frame_count * COUNT_FREQ values
//! ```
//!
//! Each value is a normalized bin scaled to the full `u32` range.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::Array2;
use tracing::{info, warn};

use super::{species, AnalysisError, Result, Sample, COUNT_FREQ, FIRST_FREQ, LAST_FREQ, TRANSFORM_SIZE};

/// Scale between a normalized bin and its stored integer.
pub const QUANT_SCALE: f64 = u32::MAX as f64;

/// Header constants every readable file must carry.
pub const LAYOUT: [u32; 3] = [TRANSFORM_SIZE as u32, FIRST_FREQ as u32, LAST_FREQ as u32];

pub fn quantize(value: f64) -> u32 {
    (value.clamp(0.0, 1.0) * QUANT_SCALE).round() as u32
}

pub fn dequantize(value: u32) -> f64 {
    value as f64 / QUANT_SCALE
}

pub fn write_learning_set<W: Write>(samples: &[Sample], writer: &mut W) -> Result<()> {
    for value in LAYOUT {
        write_u32(writer, value)?;
    }
    write_u32(writer, samples.len() as u32)?;
    for sample in samples {
        write_u32(writer, sample.frame_vector_count() as u32)?;
        write_u32(writer, sample.species())?;
        write_u32(writer, sample.id())?;
        for &value in sample.frequencies() {
            write_u32(writer, quantize(value))?;
        }
    }
    Ok(())
}

pub fn save_learning_set(samples: &[Sample], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_learning_set(samples, &mut writer)?;
    writer.flush()?;
    info!(path = %path.display(), samples = samples.len(), "saved fingerprints");
    Ok(())
}

/// Reads a whole fingerprint set; any header or length problem fails the
/// entire read.
pub fn read_learning_set<R: Read>(reader: &mut R) -> Result<Vec<Sample>> {
    let mut found = [0u32; 3];
    for slot in found.iter_mut() {
        *slot = read_u32(reader).map_err(|err| truncated(err, 0))?;
    }
    if found != LAYOUT {
        return Err(AnalysisError::FormatMismatch {
            expected: LAYOUT,
            found,
        });
    }
    let count = read_u32(reader).map_err(|err| truncated(err, 0))? as usize;

    let mut samples = Vec::with_capacity(count.min(4_096));
    for index in 0..count {
        let mut field = || read_u32(reader).map_err(|err| truncated(err, index));
        let frames = field()? as usize;
        let species_id = field()?;
        let id = field()?;

        let mut values = Vec::with_capacity(frames.saturating_mul(COUNT_FREQ).min(1 << 20));
        for _ in 0..frames * COUNT_FREQ {
            values.push(dequantize(read_u32(reader).map_err(|err| truncated(err, index))?));
        }
        let frequencies = Array2::from_shape_vec((frames, COUNT_FREQ), values)
            .map_err(|_| AnalysisError::Truncated { index })?;
        // Stored sets carry no file names; the species code stands in.
        let mut sample = Sample::from_fingerprint(frequencies, species_id, id);
        sample.set_label(species::short_name(species_id));
        samples.push(sample);
    }
    Ok(samples)
}

/// Loads a fingerprint file, logging and returning an empty set when the
/// file cannot be used.
pub fn load_learning_file(path: &Path) -> Vec<Sample> {
    let loaded = File::open(path)
        .map_err(AnalysisError::from)
        .and_then(|file| read_learning_set(&mut BufReader::new(file)));
    match loaded {
        Ok(samples) => {
            info!(path = %path.display(), samples = samples.len(), "loaded fingerprints");
            samples
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring fingerprint file");
            Vec::new()
        }
    }
}

/// Human-readable rendering of a fingerprint set.
pub fn dump_text(samples: &[Sample]) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "layout {} {} {} samples {}",
        LAYOUT[0],
        LAYOUT[1],
        LAYOUT[2],
        samples.len()
    );
    for sample in samples {
        let _ = writeln!(
            text,
            "sample {:08} species {} ({}) frames {}",
            sample.id(),
            sample.species(),
            species::short_name(sample.species()),
            sample.frame_vector_count()
        );
        for row in sample.frequencies().rows() {
            let line: Vec<String> = row.iter().map(|value| format!("{value:.4}")).collect();
            let _ = writeln!(text, "  {}", line.join(" "));
        }
    }
    text
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_ne_bytes())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_ne_bytes(bytes))
}

fn truncated(err: io::Error, index: usize) -> AnalysisError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        AnalysisError::Truncated { index }
    } else {
        AnalysisError::Io(err)
    }
}
