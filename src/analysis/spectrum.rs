use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayViewMut1, Axis};
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::{COUNT_FREQ, FIRST_FREQ, LAST_FREQ, TRANSFORM_SIZE};

/// Number of bins in a full-spectrum vector.
pub const FULL_BINS: usize = TRANSFORM_SIZE / 2;

/// Windowed power-spectrum transform over fixed `TRANSFORM_SIZE` blocks.
///
/// Owns the plan and its scratch buffers, so it needs `&mut self` for every
/// call. Pipelines that run in parallel keep one transform per worker.
pub struct SpectralTransform {
    plan: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("size", &TRANSFORM_SIZE)
            .finish()
    }
}

impl Default for SpectralTransform {
    fn default() -> Self {
        Self::new()
    }
}

/// Running bounds of full-spectrum values across one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for SpectrumBounds {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl SpectrumBounds {
    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

impl SpectralTransform {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let plan = planner.plan_fft_forward(TRANSFORM_SIZE);
        let input = plan.make_input_vec();
        let output = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        Self {
            plan,
            window: hann_window(TRANSFORM_SIZE),
            input,
            output,
            scratch,
        }
    }

    /// Band-limited power spectrum of `block`, re-indexed so `out[0]` is bin
    /// `FIRST_FREQ`.
    pub fn compute(&mut self, block: &[f64], mut out: ArrayViewMut1<'_, f64>) {
        debug_assert_eq!(out.len(), COUNT_FREQ);
        self.run(block);
        for (slot, bin) in out.iter_mut().zip(&self.output[FIRST_FREQ..LAST_FREQ]) {
            *slot = bin.norm_sqr();
        }
    }

    /// Band-limited spectrum plus the full `0..TRANSFORM_SIZE/2` spectrum.
    ///
    /// Element 0 of the full vector is the DC coefficient scaled by
    /// `1/TRANSFORM_SIZE`; the remaining bins are powers and feed `bounds`.
    pub fn compute_full(
        &mut self,
        block: &[f64],
        mut out: ArrayViewMut1<'_, f64>,
        mut full: ArrayViewMut1<'_, f64>,
        bounds: &mut SpectrumBounds,
    ) {
        debug_assert_eq!(full.len(), FULL_BINS);
        self.run(block);
        for (index, bin) in self.output.iter().enumerate().take(FULL_BINS).skip(1) {
            let value = bin.norm_sqr();
            if (FIRST_FREQ..LAST_FREQ).contains(&index) {
                out[index - FIRST_FREQ] = value;
            }
            full[index] = value;
            bounds.include(value);
        }
        full[0] = self.output[0].re / TRANSFORM_SIZE as f64;
    }

    fn run(&mut self, block: &[f64]) {
        for ((slot, sample), weight) in self.input.iter_mut().zip(block).zip(&self.window) {
            *slot = sample * weight;
        }
        self.plan
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .expect("transform buffers are allocated by the plan itself");
    }
}

/// Periodic Hann window, `0.5 - 0.5 cos(2 pi j / n)`.
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|j| 0.5 - 0.5 * (2.0 * PI * j as f64 / size as f64).cos())
        .collect()
}

/// Index of the loudest full-spectrum bin per frame, skipping DC.
pub fn dominant_bins(full: &ndarray::Array2<f64>) -> Vec<usize> {
    full.axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .skip(1)
                .fold((0, f64::NEG_INFINITY), |best, (index, &value)| {
                    if value > best.1 {
                        (index, value)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn sine(bin: f64, amplitude: f64) -> Vec<f64> {
        (0..TRANSFORM_SIZE)
            .map(|i| amplitude * (2.0 * PI * bin * i as f64 / TRANSFORM_SIZE as f64).sin())
            .collect()
    }

    #[test]
    fn hann_window_shape() {
        let window = hann_window(TRANSFORM_SIZE);
        assert_eq!(window[0], 0.0);
        assert!((window[TRANSFORM_SIZE / 2] - 1.0).abs() < 1e-12);
        assert!(window.iter().all(|&w| (0.0..=1.0).contains(&w)));
        assert_eq!(hann_window(1), vec![0.0]);
    }

    #[test]
    fn restricted_spectrum_peaks_at_tone_bin() {
        let mut transform = SpectralTransform::new();
        let mut out = Array1::zeros(COUNT_FREQ);
        transform.compute(&sine(30.0, 0.5), out.view_mut());
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(peak + FIRST_FREQ, 30);
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn full_spectrum_agrees_with_restricted_band() {
        let mut transform = SpectralTransform::new();
        let block = sine(20.0, 0.3);
        let mut restricted = Array1::zeros(COUNT_FREQ);
        transform.compute(&block, restricted.view_mut());

        let mut again = Array1::zeros(COUNT_FREQ);
        let mut full = Array1::zeros(FULL_BINS);
        let mut bounds = SpectrumBounds::default();
        transform.compute_full(&block, again.view_mut(), full.view_mut(), &mut bounds);

        for i in 0..COUNT_FREQ {
            assert!((restricted[i] - again[i]).abs() < 1e-9);
            assert!((full[i + FIRST_FREQ] - again[i]).abs() < 1e-9);
        }
        assert!(bounds.max >= full[20]);
        assert!(bounds.min <= bounds.max);
        assert_eq!(dominant_bins(&full.insert_axis(Axis(0)).to_owned()), vec![20]);
    }

    #[test]
    fn dc_term_is_scaled_mean() {
        let mut transform = SpectralTransform::new();
        let block = vec![1.0; TRANSFORM_SIZE];
        let mut out = Array1::zeros(COUNT_FREQ);
        let mut full = Array1::zeros(FULL_BINS);
        let mut bounds = SpectrumBounds::default();
        transform.compute_full(&block, out.view_mut(), full.view_mut(), &mut bounds);
        // Hann window averages to one half.
        assert!((full[0] - 0.5).abs() < 1e-9);
    }
}
