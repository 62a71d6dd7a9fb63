//! Distance between normalized feature sequences.
//!
//! Identical inputs score 0. Two sentinels sit above every regular
//! distance: [`NULL_DISTANCE`] when either sample carries no signal and
//! [`LENGTH_MISMATCH_DISTANCE`] when durations differ by more than 2x.

use ndarray::ArrayView1;

use super::sample::Sample;

/// Returned when either sample is null.
pub const NULL_DISTANCE: f64 = 1.1;
/// Returned when one sequence is more than twice as long as the other.
pub const LENGTH_MISMATCH_DISTANCE: f64 = 1.2;

/// Mean ratio `(max + 1) / (min + 1)` over the counted bins, minus one.
///
/// A bin is counted only when `max + 1 > 1.0`, so bins that are zero in
/// both frames drop out. A frame pair with no counted bins scores 0.
pub fn frame_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let mut total = 0.0;
    let mut counted = 0usize;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let low = x.min(y) + 1.0;
        let high = x.max(y) + 1.0;
        if high > 1.0 {
            total += high / low;
            counted += 1;
        }
    }
    if counted == 0 {
        return 0.0;
    }
    total / counted as f64 - 1.0
}

/// Average frame distance over the overlapping prefix of both sequences.
pub fn sample_distance(a: &Sample, b: &Sample) -> f64 {
    if a.is_null() || b.is_null() {
        return NULL_DISTANCE;
    }
    let len_a = a.frame_vector_count();
    let len_b = b.frame_vector_count();
    if 2 * len_a < len_b || 2 * len_b < len_a {
        return LENGTH_MISMATCH_DISTANCE;
    }
    let count = len_a.min(len_b);
    if count == 0 {
        return LENGTH_MISMATCH_DISTANCE;
    }
    per_frame_distances(a, b).sum::<f64>() / count as f64
}

/// Frame-by-frame distances over the overlapping prefix.
pub fn per_frame_distances<'a>(a: &'a Sample, b: &'a Sample) -> impl Iterator<Item = f64> + 'a {
    a.frequencies()
        .rows()
        .into_iter()
        .zip(b.frequencies().rows())
        .map(|(x, y)| frame_distance(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::COUNT_FREQ;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};

    fn fingerprint(rows: usize, seed: f64) -> Sample {
        let data = Array2::from_shape_fn((rows, COUNT_FREQ), |(i, j)| {
            ((i as f64 * 0.37 + j as f64 * 0.11 + seed).sin() * 0.5 + 0.5).clamp(0.0, 1.0)
        });
        Sample::from_fingerprint(data, 1, 1)
    }

    #[test]
    fn identical_frames_have_zero_distance() {
        let frame = Array1::from_elem(COUNT_FREQ, 0.4);
        assert_eq!(frame_distance(frame.view(), frame.view()), 0.0);
    }

    #[test]
    fn frame_distance_is_mean_ratio() {
        let a = Array1::from_elem(COUNT_FREQ, 1.0);
        let b = Array1::from_elem(COUNT_FREQ, 0.0);
        assert_relative_eq!(frame_distance(a.view(), b.view()), 1.0);
        assert_relative_eq!(frame_distance(b.view(), a.view()), 1.0);
    }

    #[test]
    fn silent_bins_are_not_counted() {
        let mut a = Array1::zeros(COUNT_FREQ);
        let mut b = Array1::zeros(COUNT_FREQ);
        a[0] = 1.0;
        b[0] = 0.0;
        b[1] = 1.0;
        a[1] = 1.0;
        // Bin 0 ratio 2, bin 1 ratio 1, remaining 50 bins skipped.
        assert_relative_eq!(frame_distance(a.view(), b.view()), 0.5);
        let silent = Array1::<f64>::zeros(COUNT_FREQ);
        assert_eq!(frame_distance(silent.view(), silent.view()), 0.0);
    }

    #[test]
    fn sample_distance_is_reflexive_and_symmetric() {
        let a = fingerprint(20, 0.0);
        let b = fingerprint(20, 1.3);
        assert_eq!(sample_distance(&a, &a), 0.0);
        assert_eq!(sample_distance(&a, &b), sample_distance(&b, &a));
        assert!(sample_distance(&a, &b) > 0.0);
    }

    #[test]
    fn only_overlapping_prefix_is_compared() {
        let long = fingerprint(30, 0.0);
        let prefix = Sample::from_fingerprint(
            long.frequencies().slice(ndarray::s![..16, ..]).to_owned(),
            1,
            2,
        );
        assert_eq!(sample_distance(&long, &prefix), 0.0);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let long = fingerprint(41, 0.0);
        let short = fingerprint(20, 0.0);
        assert_eq!(sample_distance(&long, &short), LENGTH_MISMATCH_DISTANCE);
        assert_eq!(sample_distance(&short, &long), LENGTH_MISMATCH_DISTANCE);
        let edge = fingerprint(40, 0.0);
        assert!(sample_distance(&edge, &short) < LENGTH_MISMATCH_DISTANCE);
    }

    #[test]
    fn null_samples_sit_at_the_null_distance() {
        use crate::analysis::sample::SampleInfo;
        use crate::analysis::FeatureExtractor;

        let mut extractor = FeatureExtractor::new();
        let info = SampleInfo::labelled("BOGA").with_id(3);
        let silent = Sample::from_frames(vec![0.0; 4_000], info, &mut extractor, 3.0).unwrap();
        assert!(silent.is_null());

        let other = fingerprint(silent.frame_vector_count(), 0.0);
        assert_eq!(sample_distance(&silent, &other), NULL_DISTANCE);
        assert_eq!(sample_distance(&other, &silent), NULL_DISTANCE);
        assert_eq!(sample_distance(&silent, &silent), NULL_DISTANCE);
        assert_eq!(silent.differ(&other), NULL_DISTANCE);
    }
}
