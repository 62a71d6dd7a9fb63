//! Sequential PCM sources feeding the segment detector.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{bail, Result};
use tracing::warn;

use super::decoder::{display_name, PacketDecoder};
use super::resample::StreamResampler;
use crate::analysis::SAMPLE_RATE;
use crate::types::Signal;

/// Pull interface over a mono stream at [`SAMPLE_RATE`].
pub trait PcmSource {
    /// Whether another sample can be read.
    fn read_possible(&mut self) -> bool;

    /// Next sample, or `0.0` once the stream is exhausted.
    fn read(&mut self) -> f64;

    /// Display name, usually the file name.
    fn name(&self) -> &str;

    /// Samples handed out so far.
    fn position(&self) -> u64;
}

/// Serves an in-memory signal.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f64>,
    cursor: usize,
    name: String,
}

impl MemorySource {
    pub fn new(samples: Vec<f64>, name: impl Into<String>) -> Self {
        Self {
            samples,
            cursor: 0,
            name: name.into(),
        }
    }
}

impl From<Signal> for MemorySource {
    fn from(signal: Signal) -> Self {
        Self::new(signal.samples, signal.name)
    }
}

impl PcmSource for MemorySource {
    fn read_possible(&mut self) -> bool {
        self.cursor < self.samples.len()
    }

    fn read(&mut self) -> f64 {
        let value = self.samples.get(self.cursor).copied().unwrap_or(0.0);
        self.cursor = (self.cursor + 1).min(self.samples.len());
        value
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }
}

/// Decodes a container file incrementally, resampling on the fly when the
/// file is not at [`SAMPLE_RATE`].
pub struct FileSource {
    decoder: PacketDecoder,
    resampler: Option<StreamResampler>,
    pending: VecDeque<f64>,
    finished: bool,
    position: u64,
    name: String,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let decoder = PacketDecoder::open(path)?;
        let resampler = if decoder.sample_rate() == SAMPLE_RATE {
            None
        } else {
            Some(StreamResampler::new(decoder.sample_rate(), SAMPLE_RATE)?)
        };
        Ok(Self {
            decoder,
            resampler,
            pending: VecDeque::new(),
            finished: false,
            position: 0,
            name: display_name(path),
        })
    }

    fn refill(&mut self) {
        while self.pending.is_empty() && !self.finished {
            let mut out = Vec::new();
            match self.decoder.next_block() {
                Ok(Some(block)) => match self.resampler.as_mut() {
                    Some(resampler) => resampler.process(&block, &mut out),
                    None => out = block,
                },
                Ok(None) => {
                    self.finished = true;
                    if let Some(resampler) = self.resampler.as_mut() {
                        resampler.finish(&mut out);
                    }
                }
                Err(err) => {
                    // Decode failures end this source; the caller moves on.
                    warn!(source = %self.name, error = %format!("{err:#}"), "stopping decode");
                    self.finished = true;
                }
            }
            self.pending.extend(out);
        }
    }
}

impl PcmSource for FileSource {
    fn read_possible(&mut self) -> bool {
        self.refill();
        !self.pending.is_empty()
    }

    fn read(&mut self) -> f64 {
        self.refill();
        match self.pending.pop_front() {
            Some(value) => {
                self.position += 1;
                value
            }
            None => 0.0,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// The closed set of source kinds.
pub enum AnySource {
    Memory(MemorySource),
    File(FileSource),
}

impl AnySource {
    /// Opens a file source for the supported container extensions.
    pub fn open(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "wav" | "mp3" | "flac" | "ogg" => Ok(Self::File(FileSource::open(path)?)),
            _ => bail!("unsupported audio container: {}", path.display()),
        }
    }

    fn inner(&mut self) -> &mut dyn PcmSource {
        match self {
            Self::Memory(source) => source,
            Self::File(source) => source,
        }
    }
}

impl From<Signal> for AnySource {
    fn from(signal: Signal) -> Self {
        Self::Memory(signal.into())
    }
}

impl PcmSource for AnySource {
    fn read_possible(&mut self) -> bool {
        self.inner().read_possible()
    }

    fn read(&mut self) -> f64 {
        self.inner().read()
    }

    fn name(&self) -> &str {
        match self {
            Self::Memory(source) => source.name(),
            Self::File(source) => source.name(),
        }
    }

    fn position(&self) -> u64 {
        match self {
            Self::Memory(source) => source.position(),
            Self::File(source) => source.position(),
        }
    }
}
