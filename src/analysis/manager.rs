use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, enabled, info, warn, Level};

use super::detector::SegmentDetector;
use super::features::FeatureExtractor;
use super::sample::Sample;
use super::spectrum::dominant_bins;
use super::{species, SAMPLE_RATE, TRANSFORM_SIZE};
use crate::audio::{AnySource, IirFilter, PcmSource, SampleFilter};
use crate::config::AnalysisConfig;

/// Runs the segment detector over a queue of inputs, one after another.
///
/// Null samples are dropped here, and accepted samples can be mirrored to
/// disk under a name prefix.
pub struct SampleManager {
    pending: VecDeque<PathBuf>,
    queued_sources: VecDeque<AnySource>,
    analyzed: Vec<String>,
    current: Option<(AnySource, String)>,
    detector: SegmentDetector,
    extractor: FeatureExtractor,
    snr_min: f64,
    save_prefix: Option<String>,
}

impl SampleManager {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            pending: VecDeque::new(),
            queued_sources: VecDeque::new(),
            analyzed: Vec::new(),
            current: None,
            detector: SegmentDetector::new(config),
            extractor: FeatureExtractor::new(),
            snr_min: config.snr_min,
            save_prefix: None,
        }
    }

    /// Manager tuned for reading labelled learning recordings: learning power
    /// cutoff, no pre-filter.
    pub fn for_learning(config: &AnalysisConfig) -> Self {
        let mut manager = Self::new(config);
        manager.set_power_cutoff(config.learning_power_cutoff);
        manager
    }

    /// Manager tuned for field recordings: analysis power cutoff, band-pass
    /// pre-filter unless disabled.
    pub fn for_analysis(config: &AnalysisConfig) -> Self {
        let mut manager = Self::new(config);
        manager.set_power_cutoff(config.power_cutoff);
        if config.apply_filter {
            manager.set_filter(Some(Box::new(IirFilter::band_pass())));
        }
        manager
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.pending.push_back(path.into());
    }

    /// Queues an already opened source behind the files.
    pub fn add_source(&mut self, source: AnySource) {
        self.queued_sources.push_back(source);
    }

    /// Sets where accepted samples are written, restarting id numbering.
    pub fn set_save_prefix(&mut self, prefix: Option<&str>) {
        self.save_prefix = prefix.filter(|p| !p.is_empty()).map(str::to_owned);
        self.detector.reset_ids();
    }

    pub fn set_filter(&mut self, filter: Option<Box<dyn SampleFilter>>) {
        self.detector.set_filter(filter);
    }

    pub fn set_power_cutoff(&mut self, cutoff: f64) {
        self.detector.set_power_cutoff(cutoff);
    }

    pub fn set_hope_time(&mut self, seconds: f64) {
        self.detector.set_hope_time(seconds);
    }

    pub fn last_id(&self) -> u32 {
        self.detector.last_id()
    }

    /// Names of inputs opened so far.
    pub fn analyzed_files(&self) -> &[String] {
        &self.analyzed
    }

    fn open_next(&mut self) -> bool {
        while let Some(path) = self.pending.pop_front() {
            match AnySource::open(&path) {
                Ok(source) => {
                    info!(path = %path.display(), "reading");
                    self.start(source);
                    return true;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %format!("{err:#}"), "skipping input");
                }
            }
        }
        if let Some(source) = self.queued_sources.pop_front() {
            self.start(source);
            return true;
        }
        false
    }

    fn start(&mut self, source: AnySource) {
        let label = species::label_from_path(Path::new(source.name()));
        self.analyzed.push(source.name().to_owned());
        self.detector.reset();
        self.current = Some((source, label));
    }

    /// Next non-null sample across all queued inputs, or `None` when every
    /// input is exhausted.
    pub fn get_sample(&mut self) -> Option<Sample> {
        loop {
            if self.current.is_none() && !self.open_next() {
                return None;
            }
            let (source, label) = self.current.as_mut()?;
            match self
                .detector
                .next_sample(source, &mut self.extractor, label, self.snr_min)
            {
                Ok(Some(sample)) if sample.is_null() => {
                    debug!(id = sample.id(), "dropping null sample");
                }
                Ok(Some(sample)) => {
                    self.log_sample(&sample);
                    self.try_save(&sample);
                    return Some(sample);
                }
                Ok(None) => self.current = None,
                Err(err) => {
                    warn!(source = %source.name(), error = %err, "skipping segment");
                }
            }
        }
    }

    fn log_sample(&self, sample: &Sample) {
        if !enabled!(Level::DEBUG) {
            return;
        }
        let peak_hz = sample.full_spectrum().and_then(|full| {
            let mut bins = dominant_bins(&full.bins);
            bins.sort_unstable();
            bins.get(bins.len() / 2)
                .map(|&bin| bin as f64 * SAMPLE_RATE as f64 / TRANSFORM_SIZE as f64)
        });
        debug!(
            id = sample.id(),
            label = sample.label(),
            start = sample.start(),
            end = sample.end(),
            frames = sample.frame_vector_count(),
            peak_hz = peak_hz.unwrap_or(0.0),
            "accepted sample"
        );
    }

    fn try_save(&self, sample: &Sample) {
        let Some(prefix) = self.save_prefix.as_deref() else {
            return;
        };
        let stem = format!("{prefix}{:010}", sample.id());
        let wav = PathBuf::from(format!("{stem}.wav"));
        let freq = PathBuf::from(format!("{stem}.freq"));
        let mut outputs = vec![
            (sample.save_audio(&wav), wav),
            (sample.save_fingerprint(&freq), freq),
        ];
        if enabled!(Level::DEBUG) {
            let text = PathBuf::from(format!("{stem}.txt"));
            outputs.push((sample.write_text(&text), text));
        }
        for (result, path) in outputs {
            if let Err(err) = result {
                warn!(path = %path.display(), error = %err, "failed to save sample");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signal;

    fn chirp(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                0.3 * (2.0 * std::f64::consts::PI * (2_500.0 + 3_000.0 * t) * t).sin()
            })
            .collect()
    }

    fn recording(bursts: usize) -> Vec<f64> {
        let mut samples = vec![0.0; 5_000];
        for _ in 0..bursts {
            samples.extend(chirp(6_000));
            samples.extend(vec![0.0; 5_000]);
        }
        samples
    }

    fn manager() -> SampleManager {
        let config = AnalysisConfig {
            apply_filter: false,
            ..AnalysisConfig::default()
        };
        SampleManager::for_learning(&config)
    }

    #[test]
    fn walks_every_queued_source() {
        let mut manager = manager();
        manager.add_source(Signal::new(recording(2), SAMPLE_RATE, "BOGA_a.wav").into());
        manager.add_source(Signal::new(recording(1), SAMPLE_RATE, "RUDZ_b.wav").into());
        let samples: Vec<Sample> = std::iter::from_fn(|| manager.get_sample()).collect();
        assert_eq!(samples.len(), 3);
        assert_eq!(
            samples.iter().map(Sample::id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(samples[2].label(), "RUDZ");
        assert_eq!(samples[2].species(), 2);
        assert_eq!(manager.analyzed_files(), ["BOGA_a.wav", "RUDZ_b.wav"]);
        assert!(manager.get_sample().is_none());
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let mut manager = manager();
        manager.add_file("/nonexistent/BOGA_missing.wav");
        manager.add_file("notes.txt");
        manager.add_source(Signal::new(recording(1), SAMPLE_RATE, "MYSI_c.wav").into());
        let sample = manager.get_sample().unwrap();
        assert_eq!(sample.species(), 3);
        assert!(manager.get_sample().is_none());
    }

    #[test]
    fn save_prefix_writes_audio_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("{}/cut_", dir.path().display());
        let mut manager = manager();
        manager.set_save_prefix(Some(&prefix));
        manager.add_source(Signal::new(recording(1), SAMPLE_RATE, "MODR_d.wav").into());
        let sample = manager.get_sample().unwrap();
        assert_eq!(manager.last_id(), sample.id());
        assert!(dir.path().join("cut_0000000001.wav").is_file());
        assert!(dir.path().join("cut_0000000001.freq").is_file());
    }
}
