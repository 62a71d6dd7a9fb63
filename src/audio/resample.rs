use anyhow::{ensure, Result};

/// Linearly resample `samples` from `source_rate` to `target_rate`.
pub fn linear_resample(samples: &[f64], source_rate: u32, target_rate: u32) -> Result<Vec<f64>> {
    ensure!(source_rate > 0, "source sample rate must be positive");
    ensure!(target_rate > 0, "target sample rate must be positive");
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = ((samples.len() as f64) * ratio).ceil().max(1.0) as usize;
    let mut output = Vec::with_capacity(output_len);
    let last_index = samples.len() - 1;
    for i in 0..output_len {
        let position = i as f64 / ratio;
        let left = (position.floor() as usize).min(last_index);
        let right = (left + 1).min(last_index);
        let t = position - left as f64;
        output.push(samples[left] * (1.0 - t) + samples[right] * t);
    }
    Ok(output)
}

/// Linear resampler fed block by block, for sources that decode
/// incrementally.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    step: f64,
    position: f64,
    previous: Option<f64>,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        ensure!(source_rate > 0, "source sample rate must be positive");
        ensure!(target_rate > 0, "target sample rate must be positive");
        Ok(Self {
            step: source_rate as f64 / target_rate as f64,
            position: 0.0,
            previous: None,
        })
    }

    /// Appends the output produced by `block` to `out`.
    pub fn process(&mut self, block: &[f64], out: &mut Vec<f64>) {
        for &sample in block {
            let Some(previous) = self.previous else {
                self.previous = Some(sample);
                continue;
            };
            while self.position < 1.0 {
                out.push(previous + (sample - previous) * self.position);
                self.position += self.step;
            }
            self.position -= 1.0;
            self.previous = Some(sample);
        }
    }

    /// Flushes output that falls after the last input sample.
    pub fn finish(&mut self, out: &mut Vec<f64>) {
        if let Some(previous) = self.previous.take() {
            while self.position < 1.0 {
                out.push(previous);
                self.position += self.step;
            }
        }
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::{linear_resample, StreamResampler};

    #[test]
    fn preserves_constant_signal_after_resample() {
        let input = vec![0.5; 480];
        let resampled = linear_resample(&input, 48_000, 16_000).unwrap();
        let expected_len = ((input.len() as f64) * 16_000_f64 / 48_000_f64).ceil() as usize;
        assert_eq!(resampled.len(), expected_len);
        assert!(resampled.iter().all(|&sample| (sample - 0.5).abs() < 1e-9));
    }

    #[test]
    fn streaming_matches_whole_buffer() {
        let input: Vec<f64> = (0..1_001).map(|i| (i as f64 * 0.01).sin()).collect();
        let whole = linear_resample(&input, 22_050, 44_100).unwrap();

        let mut resampler = StreamResampler::new(22_050, 44_100).unwrap();
        let mut streamed = Vec::new();
        for block in input.chunks(97) {
            resampler.process(block, &mut streamed);
        }
        resampler.finish(&mut streamed);

        assert_eq!(streamed.len(), whole.len());
        for (a, b) in streamed.iter().zip(&whole) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(linear_resample(&[0.0], 0, 44_100).is_err());
        assert!(StreamResampler::new(44_100, 0).is_err());
    }
}
