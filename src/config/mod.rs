use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::SAMPLE_RATE;

/// Tuning knobs for segmentation, normalization and classification.
///
/// Every field has a default, so a JSON file only needs the keys it wants to
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum log-domain dynamic range for a sample to count as signal.
    pub snr_min: f64,
    /// Largest distance accepted as a match.
    pub diff_cutoff: f64,
    /// Window power threshold when analyzing recordings.
    pub power_cutoff: f64,
    /// Window power threshold when reading learning directories.
    pub learning_power_cutoff: f64,
    /// Seconds of quiet tolerated inside one event.
    pub hope_time: f64,
    /// Samples per power window.
    pub window: usize,
    pub min_segment: usize,
    pub front_padding: usize,
    pub back_padding: usize,
    /// Longest event kept before it is closed by force.
    pub max_segment: usize,
    /// Distance under which a sample joins an existing category.
    pub categorize_delta: f64,
    pub cross_folds: usize,
    pub apply_filter: bool,
    pub print_unknown: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            snr_min: 3.0,
            diff_cutoff: 0.255,
            power_cutoff: 4e-7,
            learning_power_cutoff: 1e-4,
            hope_time: 0.01,
            window: 8,
            min_segment: 2_000,
            front_padding: 300,
            back_padding: 300,
            max_segment: 1_097_152,
            categorize_delta: 0.2,
            cross_folds: 10,
            apply_filter: true,
            print_unknown: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.window > 0, "window must be at least one sample");
        ensure!(self.cross_folds >= 2, "cross-test needs at least two folds");
        ensure!(self.hope_time >= 0.0, "hope time cannot be negative");
        ensure!(
            self.max_segment > self.min_segment,
            "max_segment must exceed min_segment"
        );
        Ok(())
    }

    /// Quiet tolerance expressed in samples.
    pub fn hope_samples(&self) -> usize {
        (SAMPLE_RATE as f64 * self.hope_time) as usize
    }
}
