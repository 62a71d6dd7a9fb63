//! Core types shared by the audio collaborators and the analysis engine

/// Raw audio signal (mono, f64 samples)
#[derive(Debug, Clone, Default)]
pub struct Signal {
    /// PCM samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f64>,
    /// Sample rate in Hz (e.g., 44100)
    pub sample_rate: u32,
    /// Display name, usually the file name the signal was loaded from
    pub name: String,
}

impl Signal {
    pub fn new(samples: Vec<f64>, sample_rate: u32, name: impl Into<String>) -> Self {
        Self {
            samples,
            sample_rate,
            name: name.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Mean square of a block of samples. Empty blocks have zero power.
pub fn mean_power(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64
}
