#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::Path;

use birdprint::analysis::sample::SampleInfo;
use birdprint::analysis::{FeatureExtractor, Sample, SAMPLE_RATE};

pub fn silence(len: usize) -> Vec<f64> {
    vec![0.0; len]
}

pub fn tone(freq: f64, len: usize, amplitude: f64) -> Vec<f64> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f64 / SAMPLE_RATE as f64).sin())
        .collect()
}

pub fn seconds(value: f64) -> usize {
    (value * SAMPLE_RATE as f64) as usize
}

pub fn tone_sample(label: &str, id: u32, freq: f64, len: usize, amplitude: f64) -> Sample {
    let mut extractor = FeatureExtractor::new();
    let info = SampleInfo::labelled(label).with_id(id).with_span(0, len as u64);
    Sample::from_frames(tone(freq, len, amplitude), info, &mut extractor, 3.0).unwrap()
}

pub fn write_wav(path: &Path, samples: &[f64]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f64) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}
