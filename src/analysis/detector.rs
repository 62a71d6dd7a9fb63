//! Power-threshold segmentation of a PCM stream.
//!
//! The stream is scanned in fixed windows. A window louder than the cutoff
//! opens an event; the event stays open through quiet stretches shorter than
//! the hope tolerance and closes once the quiet run exceeds it. Closed events
//! longer than `min_segment` are padded on both sides and handed out as
//! [`Segment`]s in absolute stream coordinates.

use tracing::{debug, trace};

use super::features::FeatureExtractor;
use super::sample::{Sample, SampleInfo};
use super::{Result, SAMPLE_RATE, TRANSFORM_SIZE};
use crate::audio::{PcmSource, SampleFilter};
use crate::config::AnalysisConfig;
use crate::types::mean_power;

/// Samples of already scanned history tolerated before the buffer is
/// compacted.
const COMPACT_SLACK: usize = 1 << 16;

/// A padded span of PCM cut out of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
    pub frames: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BelowThreshold,
    AboveThreshold { start: u64, quiet: usize },
}

pub struct SegmentDetector {
    power_cutoff: f64,
    hope_samples: usize,
    window: usize,
    min_segment: usize,
    front_padding: usize,
    back_padding: usize,
    max_segment: usize,
    filter: Option<Box<dyn SampleFilter>>,

    buffer: Vec<f64>,
    /// Stream offset of `buffer[0]`.
    base: u64,
    /// Stream offset of the next window to scan.
    cursor: u64,
    state: State,
    exhausted: bool,
    last_id: u32,
}

impl SegmentDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            power_cutoff: config.power_cutoff,
            hope_samples: config.hope_samples(),
            window: config.window.max(1),
            min_segment: config.min_segment,
            front_padding: config.front_padding,
            back_padding: config.back_padding,
            max_segment: config.max_segment.max(TRANSFORM_SIZE),
            filter: None,
            buffer: Vec::new(),
            base: 0,
            cursor: 0,
            state: State::BelowThreshold,
            exhausted: false,
            last_id: 0,
        }
    }

    pub fn set_power_cutoff(&mut self, cutoff: f64) {
        self.power_cutoff = cutoff;
    }

    /// Sets the quiet tolerance in seconds.
    pub fn set_hope_time(&mut self, seconds: f64) {
        self.hope_samples = (SAMPLE_RATE as f64 * seconds.max(0.0)) as usize;
    }

    pub fn set_filter(&mut self, filter: Option<Box<dyn SampleFilter>>) {
        self.filter = filter;
    }

    /// Id given to the most recent sample.
    pub fn last_id(&self) -> u32 {
        self.last_id
    }

    pub fn reset_ids(&mut self) {
        self.last_id = 0;
    }

    /// Prepares for a new stream. Sample ids keep counting.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.base = 0;
        self.cursor = 0;
        self.state = State::BelowThreshold;
        self.exhausted = false;
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
    }

    fn end(&self) -> u64 {
        self.base + self.buffer.len() as u64
    }

    fn index(&self, offset: u64) -> usize {
        (offset - self.base) as usize
    }

    /// Reads until the buffer reaches stream offset `upto`. Returns `false`
    /// when the source ran dry first.
    fn fill(&mut self, source: &mut dyn PcmSource, upto: u64) -> bool {
        while self.end() < upto {
            if !source.read_possible() {
                self.exhausted = true;
                return false;
            }
            let raw = source.read();
            let value = match self.filter.as_mut() {
                Some(filter) => filter.apply(raw),
                None => raw,
            };
            self.buffer.push(value);
        }
        true
    }

    /// Drops history more than `front_padding` samples before the cursor.
    fn compact(&mut self) {
        let keep_from = self.cursor.saturating_sub(self.front_padding as u64).max(self.base);
        let excess = self.index(keep_from);
        if excess >= COMPACT_SLACK {
            self.buffer.drain(..excess);
            self.base = keep_from;
        }
    }

    /// Next event in `source`, or `None` once the stream is exhausted.
    pub fn next_segment(&mut self, source: &mut dyn PcmSource) -> Option<Segment> {
        if self.exhausted {
            return None;
        }
        loop {
            let window_end = self.cursor + self.window as u64;
            if !self.fill(source, window_end) {
                return self.finish();
            }
            let power = mean_power(&self.buffer[self.index(self.cursor)..self.index(window_end)]);
            let window_start = self.cursor;
            self.cursor = window_end;

            match self.state {
                State::BelowThreshold => {
                    if power > self.power_cutoff {
                        trace!(offset = window_start, power, "event opened");
                        self.state = State::AboveThreshold {
                            start: window_start,
                            quiet: 0,
                        };
                    } else {
                        self.compact();
                    }
                }
                State::AboveThreshold { start, quiet } => {
                    let quiet = if power > self.power_cutoff {
                        0
                    } else {
                        quiet + self.window
                    };
                    let acoustic_end = window_end - quiet as u64;
                    if quiet > self.hope_samples
                        || (window_end - start) as usize >= self.max_segment
                    {
                        self.state = State::BelowThreshold;
                        if let Some(segment) = self.close(source, start, acoustic_end) {
                            return Some(segment);
                        }
                    } else {
                        self.state = State::AboveThreshold { start, quiet };
                    }
                }
            }
        }
    }

    fn close(&mut self, source: &mut dyn PcmSource, start: u64, acoustic_end: u64) -> Option<Segment> {
        let length = acoustic_end.saturating_sub(start) as usize;
        if length <= self.min_segment {
            trace!(start, length, "event too short");
            self.compact();
            return None;
        }
        let padded_start = start.saturating_sub(self.front_padding as u64).max(self.base);
        let mut padded_end = acoustic_end + self.back_padding as u64;
        if padded_end - padded_start < TRANSFORM_SIZE as u64 {
            padded_end = padded_start + TRANSFORM_SIZE as u64;
        }
        self.fill(source, padded_end);
        let padded_end = padded_end.min(self.end());
        let segment = self.cut(padded_start, padded_end);
        // Read-ahead stays buffered, so scanning resumes without a gap.
        self.exhausted = false;
        self.compact();
        Some(segment)
    }

    /// Trailing event still open when the stream ends.
    fn finish(&mut self) -> Option<Segment> {
        let State::AboveThreshold { start, .. } = self.state else {
            return None;
        };
        self.state = State::BelowThreshold;
        let end = self.end();
        if end.saturating_sub(start) < TRANSFORM_SIZE as u64 {
            return None;
        }
        let padded_start = start.saturating_sub(self.front_padding as u64).max(self.base);
        Some(self.cut(padded_start, end))
    }

    fn cut(&self, start: u64, end: u64) -> Segment {
        debug!(start, end, "segment");
        Segment {
            start,
            end,
            frames: self.buffer[self.index(start)..self.index(end)].to_vec(),
        }
    }

    /// Next event as a labelled, normalized sample. Null samples are
    /// returned too; filtering them is the caller's choice.
    pub fn next_sample(
        &mut self,
        source: &mut dyn PcmSource,
        extractor: &mut FeatureExtractor,
        label: &str,
        snr_min: f64,
    ) -> Result<Option<Sample>> {
        let Some(segment) = self.next_segment(source) else {
            return Ok(None);
        };
        self.last_id += 1;
        let info = SampleInfo::labelled(label)
            .with_id(self.last_id)
            .with_span(segment.start, segment.end);
        Sample::from_frames(segment.frames, info, extractor, snr_min).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemorySource;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            power_cutoff: 1e-4,
            ..AnalysisConfig::default()
        }
    }

    fn burst(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 0.3 * (2.0 * std::f64::consts::PI * 3_000.0 * i as f64 / 44_100.0).sin())
            .collect()
    }

    fn collect(detector: &mut SegmentDetector, samples: Vec<f64>) -> Vec<Segment> {
        let mut source = MemorySource::new(samples, "test");
        std::iter::from_fn(|| detector.next_segment(&mut source)).collect()
    }

    #[test]
    fn silence_yields_nothing() {
        let mut detector = SegmentDetector::new(&config());
        assert!(collect(&mut detector, vec![0.0; 20_000]).is_empty());
        assert!(collect(&mut detector, Vec::new()).is_empty());
    }

    #[test]
    fn single_burst_is_padded() {
        let mut samples = vec![0.0; 10_000];
        samples.extend(burst(5_000));
        samples.extend(vec![0.0; 10_000]);
        let mut detector = SegmentDetector::new(&config());
        let segments = collect(&mut detector, samples);
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.start, 10_000 - 300);
        // The burst ends on a window boundary; trailing padding follows it.
        assert!((15_000 + 290..=15_000 + 310).contains(&segment.end), "{segment:?}");
        assert_eq!(segment.frames.len() as u64, segment.end - segment.start);
    }

    #[test]
    fn short_bursts_are_dropped() {
        let mut samples = vec![0.0; 5_000];
        samples.extend(burst(1_000));
        samples.extend(vec![0.0; 5_000]);
        let mut detector = SegmentDetector::new(&config());
        assert!(collect(&mut detector, samples).is_empty());
    }

    #[test]
    fn minimum_length_ignores_back_padding() {
        // 1_904 loud samples plus 300 of padding would pass a 2_000 minimum;
        // only the acoustic span is measured.
        let mut samples = vec![0.0; 5_000];
        samples.extend(burst(1_904));
        samples.extend(vec![0.0; 5_000]);
        let mut detector = SegmentDetector::new(&config());
        assert!(collect(&mut detector, samples).is_empty());

        let mut samples = vec![0.0; 5_000];
        samples.extend(burst(2_104));
        samples.extend(vec![0.0; 5_000]);
        let mut detector = SegmentDetector::new(&config());
        let segments = collect(&mut detector, samples);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 5_000 - 300);
        assert!((7_104 + 290..=7_104 + 310).contains(&segments[0].end), "{:?}", segments[0]);
    }

    #[test]
    fn brief_dips_do_not_split_an_event() {
        let mut samples = vec![0.0; 4_000];
        samples.extend(burst(3_000));
        samples.extend(vec![0.0; 200]);
        samples.extend(burst(3_000));
        samples.extend(vec![0.0; 4_000]);
        let mut detector = SegmentDetector::new(&config());
        let segments = collect(&mut detector, samples);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].end > 10_000);
    }

    #[test]
    fn open_event_at_end_of_stream_is_emitted() {
        let mut samples = vec![0.0; 4_000];
        samples.extend(burst(3_000));
        let mut detector = SegmentDetector::new(&config());
        let segments = collect(&mut detector, samples);
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (3_700, 7_000));
    }

    #[test]
    fn long_events_are_split_at_capacity() {
        let config = AnalysisConfig {
            max_segment: 10_000,
            ..config()
        };
        let mut detector = SegmentDetector::new(&config);
        let segments = collect(&mut detector, burst(25_000));
        assert!(segments.len() >= 2);
        assert!(segments
            .iter()
            .all(|segment| segment.end - segment.start <= 10_000 + 600));
    }

    #[test]
    fn samples_get_monotonic_ids_and_labels() {
        let mut samples = vec![0.0; 4_000];
        samples.extend(burst(4_000));
        samples.extend(vec![0.0; 4_000]);
        samples.extend(burst(4_000));
        samples.extend(vec![0.0; 4_000]);
        let mut detector = SegmentDetector::new(&config());
        let mut extractor = FeatureExtractor::new();
        let mut source = MemorySource::new(samples, "BOGA_test");
        let first = detector
            .next_sample(&mut source, &mut extractor, "BOGA", 3.0)
            .unwrap()
            .unwrap();
        let second = detector
            .next_sample(&mut source, &mut extractor, "BOGA", 3.0)
            .unwrap()
            .unwrap();
        assert!(detector
            .next_sample(&mut source, &mut extractor, "BOGA", 3.0)
            .unwrap()
            .is_none());
        assert_eq!((first.id(), second.id()), (1, 2));
        assert_eq!(first.species(), 1);
        assert_eq!(first.label(), "BOGA");
        assert!(second.start() > first.end());
    }

    #[test]
    fn filter_is_applied_before_storage() {
        let mut samples = vec![0.0; 3_000];
        samples.extend(burst(4_000));
        samples.extend(vec![0.0; 3_000]);
        let mut detector = SegmentDetector::new(&config());
        detector.set_filter(Some(Box::new(|sample: f64| sample * 0.5)));
        let segments = collect(&mut detector, samples.clone());
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        let offset = segment.start as usize;
        for (i, &value) in segment.frames.iter().enumerate() {
            assert_eq!(value, samples[offset + i] * 0.5);
        }
    }
}
