pub mod classifier;
pub mod detector;
pub mod features;
pub mod learning;
pub mod manager;
pub mod sample;
pub mod similarity;
pub mod species;
pub mod spectrum;
pub mod store;

use std::path::PathBuf;

pub use classifier::{categorize, classify, cross_test, evaluate, rank, Classification};
pub use detector::SegmentDetector;
pub use features::FeatureExtractor;
pub use manager::SampleManager;
pub use sample::Sample;
pub use spectrum::SpectralTransform;

/// Sample rate every PCM source is expected to deliver.
pub const SAMPLE_RATE: u32 = 44_100;
/// Length of one spectral transform block, in samples.
pub const TRANSFORM_SIZE: usize = 256;
/// First transform bin kept in a feature frame.
pub const FIRST_FREQ: usize = 12;
/// One past the last transform bin kept in a feature frame.
pub const LAST_FREQ: usize = 64;
/// Number of bins in a band-limited feature frame.
pub const COUNT_FREQ: usize = LAST_FREQ - FIRST_FREQ;
/// Distance between the starts of consecutive transform blocks.
pub const HOP: usize = 100;

/// Convenient alias for results returned by the analysis engine.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("cannot read audio input {path:?}: {message}")]
    Input { path: PathBuf, message: String },

    #[error("segment of {frames} samples is shorter than the {required}-sample transform")]
    SegmentTooShort { frames: usize, required: usize },

    #[error("a sample needs at least one PCM frame")]
    EmptySample,

    #[error("fingerprint layout {found:?} does not match configured layout {expected:?}")]
    FormatMismatch {
        expected: [u32; 3],
        found: [u32; 3],
    },

    #[error("fingerprint data ended before sample {index} was complete")]
    Truncated { index: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub fn input(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Input {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Number of feature frames extracted from `frames` samples, or `None` when
/// the buffer cannot hold a single transform block.
pub fn frame_vector_count(frames: usize) -> Option<usize> {
    if frames < TRANSFORM_SIZE {
        return None;
    }
    Some((frames - TRANSFORM_SIZE) / HOP + 1)
}
