use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::resample::linear_resample;
use crate::analysis::SAMPLE_RATE;
use crate::types::Signal;

/// Packet-by-packet decoder for one audio track, yielding the first channel
/// as f64 PCM.
pub struct PacketDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    buffer: Option<SampleBuffer<f32>>,
}

impl PacketDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probe_result = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("Failed to probe audio format")?;
        let format = probe_result.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio tracks found in file")?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .context("Sample rate not specified in audio file")?;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create decoder")?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            buffer: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decodes the next packet of the track. `Ok(None)` marks the end of the
    /// stream.
    pub fn next_block(&mut self) -> Result<Option<Vec<f64>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(err) => return Err(err).context("Failed to read packet"),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(reason)) => {
                    debug!(reason, "skipping undecodable packet");
                    continue;
                }
                Err(err) => return Err(err).context("Failed to decode audio packet"),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let needs_buffer = self
                .buffer
                .as_ref()
                .map_or(true, |buffer| buffer.capacity() < decoded.capacity());
            if needs_buffer {
                self.buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            let Some(buffer) = self.buffer.as_mut() else {
                continue;
            };
            buffer.copy_interleaved_ref(decoded);
            let block = buffer
                .samples()
                .iter()
                .step_by(channels)
                .map(|&sample| f64::from(sample))
                .collect();
            return Ok(Some(block));
        }
    }
}

/// Decodes a whole file to mono PCM at its native rate.
pub fn decode_audio(path: &Path) -> Result<Signal> {
    let mut decoder = PacketDecoder::open(path)?;
    let mut samples = Vec::new();
    while let Some(block) = decoder.next_block()? {
        samples.extend(block);
    }
    Ok(Signal::new(samples, decoder.sample_rate(), display_name(path)))
}

/// Decodes a whole file and brings it to the analysis rate.
pub fn load_signal(path: &Path) -> Result<Signal> {
    let signal = decode_audio(path)?;
    if signal.sample_rate == SAMPLE_RATE {
        return Ok(signal);
    }
    debug!(
        path = %path.display(),
        from = signal.sample_rate,
        to = SAMPLE_RATE,
        seconds = signal.duration(),
        "resampling"
    );
    let samples = linear_resample(&signal.samples, signal.sample_rate, SAMPLE_RATE)?;
    Ok(Signal::new(samples, SAMPLE_RATE, signal.name))
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
