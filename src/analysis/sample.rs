use std::fmt::Write as _;
use std::fs;
use std::ops::Range;
use std::path::Path;

use ndarray::{Array2, Axis};
use tracing::warn;

use super::features::{FeatureExtractor, FullSpectrogram};
use super::{similarity, species, store, AnalysisError, Result, COUNT_FREQ, SAMPLE_RATE};
use crate::audio::{decoder, encoder};
use crate::types::Signal;

/// Identity and placement of a sample inside the stream it was cut from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleInfo {
    /// Per-run identity, counted from 1.
    pub id: u32,
    pub species: u32,
    /// Source label used to group samples when clustering.
    pub label: String,
    /// First PCM frame in the source stream.
    pub start: u64,
    /// One past the last PCM frame in the source stream.
    pub end: u64,
    pub sample_rate: u32,
}

impl SampleInfo {
    pub fn labelled(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            species: species::id_from_label(&label),
            label,
            sample_rate: SAMPLE_RATE,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn with_span(mut self, start: u64, end: u64) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// A bounded audio segment with its normalized spectral fingerprint.
#[derive(Debug, Clone)]
pub struct Sample {
    info: SampleInfo,
    frames: Vec<f64>,
    frequencies: Array2<f64>,
    full: Option<FullSpectrogram>,
    null: bool,
    absorbed: usize,
}

impl Sample {
    /// Builds a sample from an owned PCM buffer, extracting and normalizing
    /// its features.
    pub fn from_frames(
        frames: Vec<f64>,
        info: SampleInfo,
        extractor: &mut FeatureExtractor,
        snr_min: f64,
    ) -> Result<Self> {
        if frames.is_empty() {
            return Err(AnalysisError::EmptySample);
        }
        let (frequencies, full) = extractor.extract_full(&frames)?;
        let mut sample = Self {
            info,
            frames,
            frequencies,
            full: Some(full),
            null: false,
            absorbed: 0,
        };
        sample.normalize(snr_min);
        Ok(sample)
    }

    /// Builds a sample from `range` of `signal`; the span is recorded in the
    /// signal's own coordinates.
    pub fn from_region(
        signal: &Signal,
        range: Range<usize>,
        id: u32,
        extractor: &mut FeatureExtractor,
        snr_min: f64,
    ) -> Result<Self> {
        let end = range.end.min(signal.samples.len());
        let start = range.start.min(end);
        let info = SampleInfo {
            id,
            sample_rate: signal.sample_rate,
            ..SampleInfo::default()
        }
        .with_span(start as u64, end as u64);
        Self::from_frames(signal.samples[start..end].to_vec(), info, extractor, snr_min)
    }

    /// Decodes a whole audio file and treats it as one sample labelled by the
    /// file name prefix.
    pub fn from_file(path: &Path, extractor: &mut FeatureExtractor, snr_min: f64) -> Result<Self> {
        let signal = decoder::load_signal(path)
            .map_err(|err| AnalysisError::input(path, format!("{err:#}")))?;
        let info = SampleInfo {
            sample_rate: signal.sample_rate,
            ..SampleInfo::labelled(species::label_from_path(path))
        }
        .with_span(0, signal.samples.len() as u64);
        Self::from_frames(signal.samples, info, extractor, snr_min)
    }

    /// Restores a sample from already normalized feature frames; no raw audio
    /// is attached.
    pub fn from_fingerprint(frequencies: Array2<f64>, species: u32, id: u32) -> Self {
        debug_assert_eq!(frequencies.ncols(), COUNT_FREQ);
        Self {
            info: SampleInfo {
                id,
                species,
                ..SampleInfo::default()
            },
            frames: Vec::new(),
            frequencies,
            full: None,
            null: false,
            absorbed: 0,
        }
    }

    /// Log-scales every bin and rescales against the sample's own dynamic
    /// range. Samples whose range falls below `snr_min` are marked null.
    fn normalize(&mut self, snr_min: f64) {
        let mut maximum = f64::NEG_INFINITY;
        let mut min_avg = f64::INFINITY;
        for mut row in self.frequencies.axis_iter_mut(Axis(0)) {
            let mut sum = 0.0;
            for value in row.iter_mut() {
                // Silent bins would otherwise log to -inf.
                *value = value.max(f64::MIN_POSITIVE).ln();
                sum += *value;
                maximum = maximum.max(*value);
            }
            min_avg = min_avg.min(sum);
        }
        min_avg /= COUNT_FREQ as f64;

        let baseline = (min_avg + maximum) / 2.0;
        let snr = maximum - baseline;
        if snr.is_nan() || snr < snr_min {
            self.null = true;
        }

        let range = maximum - baseline;
        let mut overflow = 0usize;
        self.frequencies.mapv_inplace(|value| {
            let scaled = if range > 0.0 {
                ((value - baseline) / range).max(0.0)
            } else {
                0.0
            };
            if scaled > 1.0 {
                overflow += 1;
            }
            scaled
        });
        if overflow > 0 {
            warn!(
                id = self.info.id,
                overflow, "normalized bins exceed 1.0; features are inconsistent"
            );
        }
    }

    /// Distance to `other`; see [`similarity::sample_distance`].
    pub fn differ(&self, other: &Sample) -> f64 {
        similarity::sample_distance(self, other)
    }

    /// Absorbs `other` into this category prototype.
    ///
    /// The feature values of the prototype are left untouched: the category
    /// keeps its first member as representative and only counts absorbed
    /// members.
    pub fn consume(&mut self, _other: &Sample) {
        self.absorbed += 1;
    }

    pub fn info(&self) -> &SampleInfo {
        &self.info
    }

    pub fn id(&self) -> u32 {
        self.info.id
    }

    pub fn species(&self) -> u32 {
        self.info.species
    }

    pub fn label(&self) -> &str {
        &self.info.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.info.label = label.into();
    }

    pub fn start(&self) -> u64 {
        self.info.start
    }

    pub fn end(&self) -> u64 {
        self.info.end
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    pub fn frames(&self) -> &[f64] {
        &self.frames
    }

    pub fn frequencies(&self) -> &Array2<f64> {
        &self.frequencies
    }

    pub fn frame_vector_count(&self) -> usize {
        self.frequencies.nrows()
    }

    pub fn full_spectrum(&self) -> Option<&FullSpectrogram> {
        self.full.as_ref()
    }

    /// Number of members merged into this sample by clustering.
    pub fn absorbed(&self) -> usize {
        self.absorbed
    }

    /// Display string such as `Bogatka (1-17)`.
    pub fn describe(&self) -> String {
        format!(
            "{} ({}-{})",
            species::local_name(self.info.species),
            self.info.species,
            self.info.id
        )
    }

    /// Writes the raw audio as 16-bit mono WAV.
    pub fn save_audio(&self, path: &Path) -> Result<()> {
        let rate = if self.info.sample_rate == 0 {
            SAMPLE_RATE
        } else {
            self.info.sample_rate
        };
        encoder::write_wav(&self.frames, rate, path)
            .map_err(|err| AnalysisError::input(path, format!("{err:#}")))
    }

    /// Writes this sample alone as a fingerprint file.
    pub fn save_fingerprint(&self, path: &Path) -> Result<()> {
        store::save_learning_set(std::slice::from_ref(self), path)
    }

    /// Writes the normalized features as text, one frame per line.
    pub fn write_text(&self, path: &Path) -> Result<()> {
        fs::write(path, self.features_text())?;
        Ok(())
    }

    pub fn features_text(&self) -> String {
        let mut text = String::new();
        for row in self.frequencies.rows() {
            for value in row {
                let _ = write!(text, "{value:.6e} ");
            }
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TRANSFORM_SIZE;
    use std::f64::consts::PI;

    fn chirp_frames(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                0.5 * (2.0 * PI * (3_000.0 + 2_000.0 * t) * t).sin()
            })
            .collect()
    }

    fn build(frames: Vec<f64>) -> Result<Sample> {
        let mut extractor = FeatureExtractor::new();
        Sample::from_frames(frames, SampleInfo::labelled("BOGA").with_id(3), &mut extractor, 3.0)
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(build(Vec::new()), Err(AnalysisError::EmptySample)));
    }

    #[test]
    fn short_buffer_is_too_short() {
        assert!(matches!(
            build(vec![0.2; TRANSFORM_SIZE / 2]),
            Err(AnalysisError::SegmentTooShort { .. })
        ));
    }

    #[test]
    fn normalized_bins_lie_in_unit_interval() {
        let sample = build(chirp_frames(8_000)).unwrap();
        assert!(!sample.is_null());
        assert!(sample
            .frequencies()
            .iter()
            .all(|&value| (0.0..=1.0).contains(&value)));
        let peak = sample.frequencies().iter().cloned().fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-12);
        assert_eq!(sample.species(), 1);
        assert_eq!(sample.id(), 3);
        assert_eq!(sample.frame_vector_count(), (8_000 - TRANSFORM_SIZE) / 100 + 1);
    }

    #[test]
    fn flat_features_are_marked_null() {
        let mut sample = Sample::from_fingerprint(Array2::from_elem((6, COUNT_FREQ), 0.25), 1, 1);
        sample.normalize(3.0);
        assert!(sample.is_null());
        assert!(sample.frequencies().iter().all(|&value| value == 0.0));
    }

    #[test]
    fn silence_is_null_and_finite() {
        let sample = build(vec![0.0; 2_000]).unwrap();
        assert!(sample.is_null());
        assert!(sample.frequencies().iter().all(|value| value.is_finite()));
    }

    #[test]
    fn region_keeps_signal_coordinates() {
        let signal = Signal::new(chirp_frames(10_000), SAMPLE_RATE, "region");
        let mut extractor = FeatureExtractor::new();
        let sample = Sample::from_region(&signal, 2_000..6_000, 9, &mut extractor, 3.0).unwrap();
        assert_eq!((sample.start(), sample.end()), (2_000, 6_000));
        assert_eq!(sample.frames().len(), 4_000);

        let too_short = Sample::from_region(&signal, 100..200, 10, &mut extractor, 3.0);
        assert!(matches!(too_short, Err(AnalysisError::SegmentTooShort { .. })));
    }

    #[test]
    fn consume_keeps_prototype_features() {
        let mut category = build(chirp_frames(6_000)).unwrap();
        let before = category.frequencies().clone();
        let other = build(chirp_frames(9_000)).unwrap();
        category.consume(&other);
        category.consume(&other);
        assert_eq!(category.frequencies(), &before);
        assert_eq!(category.absorbed(), 2);
    }

    #[test]
    fn text_dump_has_one_line_per_frame() {
        let sample = build(chirp_frames(3_000)).unwrap();
        let text = sample.features_text();
        assert_eq!(text.lines().count(), sample.frame_vector_count());
        let first = text.lines().next().unwrap();
        assert_eq!(first.split_whitespace().count(), COUNT_FREQ);
        assert_eq!(sample.describe(), "Bogatka (1-3)");
    }
}
