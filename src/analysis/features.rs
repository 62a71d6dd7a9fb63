use ndarray::Array2;

use super::spectrum::{SpectralTransform, SpectrumBounds, FULL_BINS};
use super::{frame_vector_count, AnalysisError, Result, COUNT_FREQ, HOP, TRANSFORM_SIZE};

/// Full-resolution spectrogram kept alongside the band-limited features,
/// used only for display.
#[derive(Debug, Clone)]
pub struct FullSpectrogram {
    /// One row per feature frame, `TRANSFORM_SIZE / 2` columns.
    pub bins: Array2<f64>,
    pub bounds: SpectrumBounds,
}

/// Slides a spectral transform over PCM frames at a fixed hop.
#[derive(Debug, Default)]
pub struct FeatureExtractor {
    transform: SpectralTransform,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Band-limited power frames, one row per hop.
    pub fn extract(&mut self, frames: &[f64]) -> Result<Array2<f64>> {
        let count = vector_count(frames.len())?;
        let mut features = Array2::zeros((count, COUNT_FREQ));
        for (index, row) in features.rows_mut().into_iter().enumerate() {
            let start = index * HOP;
            self.transform
                .compute(&frames[start..start + TRANSFORM_SIZE], row);
        }
        Ok(features)
    }

    /// Band-limited frames together with the full spectrum of every block.
    pub fn extract_full(&mut self, frames: &[f64]) -> Result<(Array2<f64>, FullSpectrogram)> {
        let count = vector_count(frames.len())?;
        let mut features = Array2::zeros((count, COUNT_FREQ));
        let mut bins = Array2::zeros((count, FULL_BINS));
        let mut bounds = SpectrumBounds::default();
        for (index, (row, full)) in features
            .rows_mut()
            .into_iter()
            .zip(bins.rows_mut())
            .enumerate()
        {
            let start = index * HOP;
            self.transform.compute_full(
                &frames[start..start + TRANSFORM_SIZE],
                row,
                full,
                &mut bounds,
            );
        }
        Ok((features, FullSpectrogram { bins, bounds }))
    }
}

fn vector_count(frames: usize) -> Result<usize> {
    frame_vector_count(frames).ok_or(AnalysisError::SegmentTooShort {
        frames,
        required: TRANSFORM_SIZE,
    })
}
