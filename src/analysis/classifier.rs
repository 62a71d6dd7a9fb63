//! Nearest-neighbour classification, clustering into categories, and the
//! k-fold cross-test that ties them together.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::similarity::per_frame_distances;
use super::species::{self, UNKNOWN};
use super::Sample;
use crate::config::AnalysisConfig;

/// Starting distance for searches that must find some neighbour.
const DISTANCE_CEILING: f64 = 100.0;

/// Outcome of classifying one query.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    /// Closest learning entry under the cutoff; `None` means unknown.
    pub matched: Option<&'a Sample>,
    /// Distance to the match, or the cutoff when nothing matched.
    pub distance: f64,
}

impl<'a> Classification<'a> {
    pub fn species(&self) -> u32 {
        self.matched.map_or(UNKNOWN, Sample::species)
    }

    pub fn is_unknown(&self) -> bool {
        self.matched.is_none()
    }

    /// One result line: `query match SHORT start end distance`. Unknown
    /// results render only when `print_unknown` is set.
    pub fn report_line(&self, query: &Sample, print_unknown: bool) -> Option<String> {
        match self.matched {
            Some(matched) => Some(format!(
                "{:08} {:04} {} {} {} {}",
                query.id(),
                matched.id(),
                species::short_name(matched.species()),
                query.start(),
                query.end(),
                format_general(self.distance)
            )),
            None if print_unknown => Some(format!(
                "{:08} 0000 UNKN {} {} {}",
                query.id(),
                query.start(),
                query.end(),
                format_general(self.distance)
            )),
            None => None,
        }
    }
}

/// Linear scan for the closest learning entry. Only entries strictly closer
/// than `cutoff` can match; on ties the earliest entry wins.
pub fn classify<'a>(query: &Sample, learning: &'a [Sample], cutoff: f64) -> Classification<'a> {
    let mut best = Classification {
        matched: None,
        distance: cutoff,
    };
    for candidate in learning {
        let distance = query.differ(candidate);
        if distance < best.distance {
            best = Classification {
                matched: Some(candidate),
                distance,
            };
        }
    }
    best
}

/// One learning entry in a ranking.
#[derive(Debug, Clone)]
pub struct RankedMatch<'a> {
    pub sample: &'a Sample,
    pub distance: f64,
    /// Per-frame distances over the compared prefix; filled for the top
    /// entries only.
    pub frame_distances: Vec<f64>,
}

/// Every learning entry ordered by ascending distance to `query`, with frame
/// detail for the first `detailed` entries.
pub fn rank<'a>(query: &Sample, learning: &'a [Sample], detailed: usize) -> Vec<RankedMatch<'a>> {
    let mut ranked: Vec<RankedMatch<'a>> = learning
        .iter()
        .map(|sample| RankedMatch {
            sample,
            distance: query.differ(sample),
            frame_distances: Vec::new(),
        })
        .collect();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    for entry in ranked.iter_mut().take(detailed) {
        if !query.is_null() && !entry.sample.is_null() {
            entry.frame_distances = per_frame_distances(query, entry.sample).collect();
        }
    }
    ranked
}

/// Per-species tallies of an evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesTally {
    pub count: usize,
    /// Queries whose nearest neighbour was under the cutoff.
    pub below_cutoff: usize,
    /// Confusions keyed by the species they were taken for; key 0 counts
    /// results at or above the cutoff.
    pub mismatches: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub good: usize,
    pub count: usize,
    /// Largest distance among correct nearest neighbours.
    pub max_good: f64,
    /// Smallest distance among wrong nearest neighbours.
    pub min_bad: f64,
    pub per_species: BTreeMap<u32, SpeciesTally>,
}

impl Default for EvaluationReport {
    fn default() -> Self {
        Self {
            good: 0,
            count: 0,
            max_good: 0.0,
            min_bad: DISTANCE_CEILING,
            per_species: BTreeMap::new(),
        }
    }
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        percent(self.good, self.count)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Test result: {}/{} ({:3.2}%)",
            self.good,
            self.count,
            self.accuracy()
        )?;
        writeln!(
            f,
            "MaxGood: {}; minBad: {}",
            format_general(self.max_good),
            format_general(self.min_bad)
        )?;
        for (species_id, tally) in &self.per_species {
            if tally.mismatches.is_empty() {
                continue;
            }
            writeln!(
                f,
                "{} [{}/{}]:",
                species::short_name(*species_id),
                tally.below_cutoff,
                tally.count
            )?;
            let mut missed = 0;
            for (taken_for, times) in &tally.mismatches {
                missed += times;
                writeln!(
                    f,
                    "  >{}: {} ({:.2}%)",
                    species::short_name(*taken_for),
                    times,
                    percent(*times, tally.count)
                )?;
            }
            writeln!(f, "--- Good: {:.2}%", 100.0 - percent(missed, tally.count))?;
        }
        Ok(())
    }
}

/// Classifies every sample against `reference` and tallies agreement.
///
/// The nearest neighbour is taken without a cutoff; the cutoff only decides
/// whether a result also counts as a confident one.
pub fn evaluate(samples: &[Sample], reference: &[Sample], cutoff: f64) -> EvaluationReport {
    let mut report = EvaluationReport::default();
    for sample in samples {
        let nearest = classify(sample, reference, DISTANCE_CEILING);
        let tally = report.per_species.entry(sample.species()).or_default();
        tally.count += 1;
        report.count += 1;

        if nearest.matched.is_some() && nearest.species() == sample.species() {
            report.good += 1;
            report.max_good = report.max_good.max(nearest.distance);
        } else {
            report.min_bad = report.min_bad.min(nearest.distance);
            *tally.mismatches.entry(nearest.species()).or_default() += 1;
        }
        if nearest.distance < cutoff {
            tally.below_cutoff += 1;
        } else {
            *tally.mismatches.entry(UNKNOWN).or_default() += 1;
        }
    }
    info!(
        good = report.good,
        count = report.count,
        "evaluation finished"
    );
    report
}

/// Groups samples into categories, comparing each sample only with
/// categories of the same source label.
///
/// A sample opens a new category (a clone of itself) when no category of its
/// label exists or the closest one is further than `delta`; otherwise it is
/// absorbed by the closest category.
pub fn categorize(samples: &[Sample], delta: f64) -> Vec<Sample> {
    let mut categories: Vec<Sample> = Vec::new();
    for sample in samples {
        let mut best: Option<(usize, f64)> = None;
        for (index, category) in categories.iter().enumerate() {
            if category.label() != sample.label() {
                continue;
            }
            let distance = sample.differ(category);
            if best.map_or(distance < DISTANCE_CEILING, |(_, value)| distance < value) {
                best = Some((index, distance));
            }
        }
        match best {
            Some((index, distance)) if distance <= delta => categories[index].consume(sample),
            _ => categories.push(sample.clone()),
        }
    }
    info!(
        samples = samples.len(),
        categories = categories.len(),
        "categorization finished"
    );
    categories
}

/// Per-species outcome of the cross-test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossTally {
    pub count: usize,
    pub matched: usize,
    pub mismatches: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone)]
pub struct CrossTestReport {
    pub good: usize,
    pub count: usize,
    pub per_species: BTreeMap<u32, CrossTally>,
    /// Samples that won more correct matches than wrong ones.
    pub chosen: Vec<Sample>,
    /// Remaining samples evaluated against `chosen`.
    pub held_out: EvaluationReport,
    /// `chosen` clustered into categories.
    pub categories: Vec<Sample>,
    /// Every sample evaluated against `categories`.
    pub overall: EvaluationReport,
}

impl CrossTestReport {
    pub fn accuracy(&self) -> f64 {
        percent(self.good, self.count)
    }
}

impl fmt::Display for CrossTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cross-test results: {}/{} ({:3.2}%)",
            self.good,
            self.count,
            self.accuracy()
        )?;
        for (species_id, tally) in &self.per_species {
            writeln!(
                f,
                "{}: {}/{} ({:3.2}%)",
                species::short_name(*species_id),
                tally.matched,
                tally.count,
                percent(tally.matched, tally.count)
            )?;
            for (taken_for, times) in &tally.mismatches {
                writeln!(f, "  >{}: {}", species::short_name(*taken_for), times)?;
            }
        }
        writeln!(f, "Chosen: {}", self.chosen.len())?;
        write!(f, "{}", self.held_out)?;
        writeln!(f, "Categories: {}", self.categories.len())?;
        write!(f, "{}", self.overall)
    }
}

/// k-fold cross-test over a labelled population.
///
/// Samples are shuffled and dealt into `cross_folds` folds. Each sample is
/// matched against every other fold; the winner's score rises on a correct
/// match under the cutoff and falls otherwise. Winners with a positive score
/// form the chosen set, which is evaluated against the rest, clustered, and
/// the clusters evaluated against the whole population.
pub fn cross_test<R>(samples: &[Sample], config: &AnalysisConfig, rng: &mut R) -> CrossTestReport
where
    R: Rng + ?Sized,
{
    let folds = config.cross_folds.max(2);
    let cutoff = config.diff_cutoff;

    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.shuffle(rng);
    let fold_of = |position: usize| position % folds;

    let mut determinant = vec![0i64; samples.len()];
    let mut per_species: BTreeMap<u32, CrossTally> = BTreeMap::new();
    let mut good = 0;

    for (position, &index) in order.iter().enumerate() {
        let query = &samples[index];
        let mut best: Option<(usize, f64)> = None;
        for (other_position, &other) in order.iter().enumerate() {
            if fold_of(other_position) == fold_of(position) {
                continue;
            }
            let distance = query.differ(&samples[other]);
            if best.map_or(true, |(_, value)| distance < value) {
                best = Some((other, distance));
            }
        }

        let tally = per_species.entry(query.species()).or_default();
        tally.count += 1;
        match best {
            Some((winner, distance))
                if samples[winner].species() == query.species() && distance < cutoff =>
            {
                determinant[winner] += 1;
                good += 1;
                tally.matched += 1;
            }
            Some((winner, distance)) => {
                let taken_for = if distance >= cutoff {
                    UNKNOWN
                } else {
                    samples[winner].species()
                };
                *tally.mismatches.entry(taken_for).or_default() += 1;
                determinant[winner] -= 1;
                debug!(
                    query = query.id(),
                    winner = samples[winner].id(),
                    distance,
                    "cross-test miss"
                );
            }
            None => {
                *tally.mismatches.entry(UNKNOWN).or_default() += 1;
            }
        }
    }

    let (chosen, rest): (Vec<usize>, Vec<usize>) =
        order.iter().partition(|&&index| determinant[index] >= 1);
    let chosen: Vec<Sample> = chosen.into_iter().map(|i| samples[i].clone()).collect();
    let rest: Vec<Sample> = rest.into_iter().map(|i| samples[i].clone()).collect();
    info!(
        good,
        count = samples.len(),
        chosen = chosen.len(),
        "cross-test scored"
    );

    let held_out = evaluate(&rest, &chosen, cutoff);
    let categories = categorize(&chosen, config.categorize_delta);
    let shuffled: Vec<Sample> = order.iter().map(|&i| samples[i].clone()).collect();
    let overall = evaluate(&shuffled, &categories, cutoff);

    CrossTestReport {
        good,
        count: samples.len(),
        per_species,
        chosen,
        held_out,
        categories,
        overall,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}

/// Six significant digits without trailing zeros, switching to exponent
/// notation for very small or large magnitudes.
pub fn format_general(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let exponent = value.abs().log10().floor() as i32;
    if !(-4..6).contains(&exponent) {
        let text = format!("{value:.5e}");
        return match text.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{exp}", trim_fraction(mantissa)),
            None => text,
        };
    }
    let decimals = (5 - exponent).max(0) as usize;
    trim_fraction(&format!("{value:.decimals$}")).to_owned()
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
