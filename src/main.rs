use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{ensure, Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use birdprint::analysis::{classify, cross_test, learning, store, Sample, SampleManager};
use birdprint::config::AnalysisConfig;

const EXIT_USAGE: u8 = 5;
const EXIT_VERSION: u8 = 6;

/// Written next to the working directory when the learning set is saved.
const LEARNING_ALL_FILE: &str = "learning-all.freq";
const CATEGORIES_FILE: &str = "categories.freq";

/// Single-dash spellings still accepted on the command line.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-learning", "--learning"),
    ("-learnFile", "--learn-file"),
    ("-snr", "--snr"),
    ("-cutoff", "--cutoff"),
    ("-powerCutoff", "--power-cutoff"),
    ("-hopeTime", "--hope-time"),
    ("-crosstest", "--crosstest"),
    ("-save", "--save"),
    ("-saveLearning", "--save-learning"),
    ("-verbose", "--verbose"),
    ("-nofilter", "--nofilter"),
    ("-nounknown", "--nounknown"),
    ("-v", "--version"),
];

/// Birdprint - bird call detection and species classification
///
/// Cuts recordings into acoustic events, fingerprints each event and
/// matches it against a labelled learning set.
#[derive(Parser, Debug)]
#[command(name = "birdprint")]
#[command(version = "0.9")]
#[command(about = "Bird call detection and species classification", long_about = None)]
struct Args {
    /// Recordings to analyze (WAV, MP3, FLAC, OGG)
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Directory of labelled learning recordings
    #[arg(long, value_name = "DIR", default_value = "samples/")]
    learning: PathBuf,

    /// Read the learning set from a fingerprint file instead of a directory
    #[arg(long, value_name = "FILE")]
    learn_file: Option<PathBuf>,

    /// Minimum dynamic range for a sample to count as signal
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    snr: Option<f64>,

    /// Largest distance accepted as a match
    #[arg(long, value_name = "VALUE")]
    cutoff: Option<f64>,

    /// Window power threshold used on analyzed recordings
    #[arg(long, value_name = "VALUE")]
    power_cutoff: Option<f64>,

    /// Seconds of quiet tolerated inside one event
    #[arg(long, value_name = "SECONDS")]
    hope_time: Option<f64>,

    /// Run the k-fold cross-test over the learning set
    #[arg(long)]
    crosstest: bool,

    /// Write every analyzed event under this name prefix
    #[arg(long, value_name = "PREFIX")]
    save: Option<String>,

    /// Write every learning event under this name prefix
    #[arg(long, value_name = "PREFIX")]
    save_learning: Option<String>,

    /// Debug logging
    #[arg(long)]
    verbose: bool,

    /// Skip the band-pass pre-filter on analyzed recordings
    #[arg(long)]
    nofilter: bool,

    /// Do not print events that matched nothing
    #[arg(long)]
    nounknown: bool,

    /// JSON file with analysis settings; flags override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print a fingerprint file as text and exit
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
}

impl Args {
    /// Numeric flags must be usable thresholds. Missing or unreadable inputs
    /// are not an argument error: they are skipped while the batch runs.
    fn validate(&self) -> Result<()> {
        for (flag, value) in [
            ("--snr", self.snr),
            ("--cutoff", self.cutoff),
            ("--power-cutoff", self.power_cutoff),
            ("--hope-time", self.hope_time),
        ] {
            if let Some(value) = value {
                ensure!(value.is_finite(), "{flag} must be a finite number, got {value}");
            }
        }
        if let Some(cutoff) = self.power_cutoff {
            ensure!(cutoff >= 0.0, "--power-cutoff cannot be negative, got {cutoff}");
        }
        Ok(())
    }

    /// Settings from `--config`, with explicit flags layered on top.
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = AnalysisConfig::load(self.config.as_deref())?;
        if let Some(snr) = self.snr {
            config.snr_min = snr;
        }
        if let Some(cutoff) = self.cutoff {
            config.diff_cutoff = cutoff;
        }
        if let Some(cutoff) = self.power_cutoff {
            config.power_cutoff = cutoff;
        }
        if let Some(seconds) = self.hope_time {
            config.hope_time = seconds;
        }
        if self.nofilter {
            config.apply_filter = false;
        }
        if self.nounknown {
            config.print_unknown = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn rewrite_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            LEGACY_FLAGS
                .iter()
                .find(|(legacy, _)| arg.as_os_str() == *legacy)
                .map_or(arg, |(_, modern)| OsString::from(modern))
        })
        .collect()
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,birdprint={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let argv = rewrite_legacy_args(std::env::args_os());
    if argv.len() <= 1 {
        let _ = Args::command().print_help();
        return ExitCode::from(EXIT_USAGE);
    }

    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayVersion => ExitCode::from(EXIT_VERSION),
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };

    init_logging(args.verbose);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if let Some(path) = &args.dump {
        return dump(path);
    }

    args.validate()
        .context("Failed to validate command-line arguments")?;
    let config = args
        .analysis_config()
        .context("Failed to load analysis settings")?;

    let learning_set = load_learning(args, &config)?;
    info!(samples = learning_set.len(), "learning set ready");

    if args.crosstest {
        let report = cross_test(&learning_set, &config, &mut rand::thread_rng());
        print!("{report}");
        store::save_learning_set(&report.categories, Path::new(CATEGORIES_FILE))
            .context("Failed to save categories")?;
    }

    if !args.files.is_empty() {
        info!(files = args.files.len(), "analyzing");
        analyze_files(args, &config, &learning_set)?;
    }
    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let samples = store::read_learning_set(&mut BufReader::new(file))
        .with_context(|| format!("Failed to read fingerprints from {:?}", path))?;
    print!("{}", store::dump_text(&samples));
    Ok(())
}

fn load_learning(args: &Args, config: &AnalysisConfig) -> Result<Vec<Sample>> {
    if let Some(path) = &args.learn_file {
        return Ok(store::load_learning_file(path));
    }

    let mut manager = SampleManager::for_learning(config);
    manager.set_save_prefix(args.save_learning.as_deref());
    let samples = match learning::read_learning_dir(&args.learning, &mut manager) {
        Ok(samples) => samples,
        Err(err) => {
            warn!(dir = %args.learning.display(), error = %err, "no learning set");
            Vec::new()
        }
    };

    if args.save_learning.is_some() {
        store::save_learning_set(&samples, Path::new(LEARNING_ALL_FILE))
            .context("Failed to save learning set")?;
    }
    Ok(samples)
}

fn analyze_files(args: &Args, config: &AnalysisConfig, learning_set: &[Sample]) -> Result<()> {
    let mut manager = SampleManager::for_analysis(config);
    manager.set_save_prefix(args.save.as_deref());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for file in &args.files {
        manager.add_file(file);
        while let Some(sample) = manager.get_sample() {
            let result = classify(&sample, learning_set, config.diff_cutoff);
            if let Some(line) = result.report_line(&sample, config.print_unknown) {
                writeln!(out, "{line}")?;
            }
        }
    }
    out.flush()?;
    Ok(())
}
