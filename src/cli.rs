//! CLI interface using clap
//!
//! Defines all command-line arguments and subcommands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::core::analyze::{analyze_records, LanguageNameTable};
use crate::core::evaluate::{EvaluateOptions, LanguageRegistry};
use crate::core::generate::{GenerateOptions, GeneratorRegistry};
use crate::core::pool::{default_parallelism, CancelToken, RateLimit, RateWindow};
use crate::core::portability::{run_input_generation, run_semantic_tests, PipelineConfig};
use crate::output::json::format_json;
use crate::output::text::{format_analyze_report, format_gen_inputs_summary, format_test_summary};
use crate::output::{GenInputsSummary, TestSummary};
use crate::record::{read_regex_records, write_ndjson_file, RegexRecord};

/// Environment fallbacks for the driver directories.
const GENERATORS_DIR_ENV: &str = "REXDIFF_GENERATORS_DIR";
const DRIVERS_DIR_ENV: &str = "REXDIFF_DRIVERS_DIR";

#[derive(Parser)]
#[command(name = "rexdiff")]
#[command(
    author,
    version,
    about = "Cross-language regex differential tester: generate inputs, evaluate in many language engines, explain the disagreements.",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum RateWindowArg {
    PerSecond,
    PerMinute,
    PerHour,
}

impl From<RateWindowArg> for RateWindow {
    fn from(arg: RateWindowArg) -> Self {
        match arg {
            RateWindowArg::PerSecond => RateWindow::PerSecond,
            RateWindowArg::PerMinute => RateWindow::PerMinute,
            RateWindowArg::PerHour => RateWindow::PerHour,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate candidate test inputs for a file of regex records
    GenInputs {
        /// In: NDJSON file of regex records
        #[arg(long)]
        regex_file: PathBuf,

        /// Out: NDJSON file of pattern-with-inputs records
        #[arg(long)]
        out_file: PathBuf,

        /// Directory holding query-<generator> drivers
        /// (falls back to $REXDIFF_GENERATORS_DIR)
        #[arg(long)]
        generators_dir: Option<PathBuf>,

        /// Maximum worker threads (default: available cores)
        #[arg(long)]
        parallelism: Option<usize>,

        /// RNG seed propagated to seedable generators and to down-sampling
        #[arg(long, default_value = "1")]
        seed: u64,

        /// At most N inputs per generator; a random subset is kept when
        /// exceeded (-1 means no limit)
        #[arg(long, default_value = "1000")]
        max_inputs_per_generator: i64,

        /// Kill a generator after T seconds and salvage what it wrote
        /// (-1 means no limit)
        #[arg(long, default_value = "10")]
        generator_timeout: f64,

        /// Max task starts per rate window
        #[arg(long, requires = "rate_window")]
        rate_limit: Option<u32>,

        /// Window for --rate-limit
        #[arg(long, requires = "rate_limit")]
        rate_window: Option<RateWindowArg>,
    },

    /// Test regex records for different behavior in different languages
    Test {
        /// In: NDJSON file of regex records
        #[arg(long)]
        regex_file: PathBuf,

        /// Out: NDJSON file of regex records with witnesses populated
        #[arg(long)]
        out_file: PathBuf,

        /// Directory holding query-<generator> drivers
        /// (falls back to $REXDIFF_GENERATORS_DIR)
        #[arg(long)]
        generators_dir: Option<PathBuf>,

        /// Directory holding check-regex-behavior-in-<lang> drivers
        /// (falls back to $REXDIFF_DRIVERS_DIR)
        #[arg(long)]
        drivers_dir: Option<PathBuf>,

        /// Languages to test when a record has no supportedLangs
        /// (default: every language with a driver)
        #[arg(long, value_delimiter = ',')]
        languages: Vec<String>,

        /// Maximum worker threads (default: available cores)
        #[arg(long)]
        parallelism: Option<usize>,

        /// RNG seed for reproducibility
        #[arg(long, default_value = "1")]
        seed: u64,

        /// At most N inputs per generator (-1 means no limit)
        #[arg(long, default_value = "100")]
        max_inputs_per_generator: i64,

        /// Kill a generator after T seconds and salvage what it wrote
        /// (-1 means no limit)
        #[arg(long, default_value = "10")]
        generator_timeout: f64,

        /// Per-language evaluation timeout in seconds
        #[arg(long, default_value = "30")]
        eval_timeout: f64,

        /// Max task starts per rate window
        #[arg(long, requires = "rate_window")]
        rate_limit: Option<u32>,

        /// Window for --rate-limit
        #[arg(long, requires = "rate_limit")]
        rate_window: Option<RateWindowArg>,
    },

    /// Analyze tested records: witness kinds, language pairs, causes
    Analyze {
        /// In: NDJSON file of regex records with witnesses populated
        #[arg(long)]
        regex_file: PathBuf,

        /// Out: also write the records with unexplained witnesses here
        #[arg(long)]
        unexplained_out: Option<PathBuf>,
    },
}

/// Parse CLI arguments
pub fn parse() -> Cli {
    Cli::parse()
}

fn resolve_dir(flag: Option<PathBuf>, env_var: &str) -> Option<PathBuf> {
    flag.or_else(|| std::env::var_os(env_var).map(PathBuf::from))
}

fn rate(limit: Option<u32>, window: Option<RateWindowArg>) -> Option<RateLimit> {
    match (limit, window) {
        (Some(max_starts), Some(window)) => Some(RateLimit {
            max_starts,
            window: window.into(),
        }),
        _ => None,
    }
}

fn load_records(path: &Path) -> Result<Vec<RegexRecord>> {
    let records = read_regex_records(path)
        .with_context(|| format!("failed to read regex records from {}", path.display()))?;
    if records.is_empty() {
        bail!("no usable regex records in {}", path.display());
    }
    info!(n = records.len(), file = %path.display(), "loaded regex records");
    Ok(records)
}

/// Handle the gen-inputs command
#[allow(clippy::too_many_arguments)]
pub fn handle_gen_inputs(
    regex_file: &Path,
    out_file: &Path,
    generators_dir: Option<PathBuf>,
    parallelism: Option<usize>,
    seed: u64,
    max_inputs_per_generator: i64,
    generator_timeout: f64,
    rate_limit: Option<u32>,
    rate_window: Option<RateWindowArg>,
    format: OutputFormat,
) -> Result<String> {
    let records = load_records(regex_file)?;

    let generators_dir = resolve_dir(generators_dir, GENERATORS_DIR_ENV)
        .context("no --generators-dir given and $REXDIFF_GENERATORS_DIR is unset")?;
    let generators = GeneratorRegistry::from_dir(&generators_dir)
        .with_context(|| format!("failed to scan {}", generators_dir.display()))?;
    if generators.is_empty() {
        bail!("no query-* generator drivers in {}", generators_dir.display());
    }
    info!(generators = ?generators.names(), "using generators");

    let cfg = PipelineConfig {
        generators,
        languages: LanguageRegistry::new(),
        default_languages: Vec::new(),
        generate: GenerateOptions {
            max_inputs_per_generator,
            seed,
            timeout_secs: generator_timeout,
        },
        evaluate: EvaluateOptions::default(),
    };

    let n_regexes = records.len();
    let cancel = CancelToken::new();
    let (pools, outcome) = run_input_generation(
        records,
        &cfg,
        parallelism.unwrap_or_else(default_parallelism),
        rate(rate_limit, rate_window),
        &cancel,
    );

    let n_unique_inputs = pools.iter().map(|p| p.unique_inputs().len()).sum();
    let lines: Vec<String> = pools
        .iter()
        .map(|p| p.to_ndjson())
        .collect::<Result<_, _>>()?;
    write_ndjson_file(out_file, &lines)?;

    let summary = GenInputsSummary {
        n_regexes,
        n_completed: outcome.n_completed,
        n_failed: outcome.n_failed,
        n_unique_inputs,
        out_file: out_file.display().to_string(),
    };
    Ok(match format {
        OutputFormat::Json => format_json(&summary),
        OutputFormat::Text => format_gen_inputs_summary(&summary),
    })
}

/// Handle the test command
#[allow(clippy::too_many_arguments)]
pub fn handle_test(
    regex_file: &Path,
    out_file: &Path,
    generators_dir: Option<PathBuf>,
    drivers_dir: Option<PathBuf>,
    languages: Vec<String>,
    parallelism: Option<usize>,
    seed: u64,
    max_inputs_per_generator: i64,
    generator_timeout: f64,
    eval_timeout: f64,
    rate_limit: Option<u32>,
    rate_window: Option<RateWindowArg>,
    format: OutputFormat,
) -> Result<String> {
    let records = load_records(regex_file)?;

    // Generators are optional here: with none configured, each pattern is
    // still probed with the guaranteed input.
    let generators = match resolve_dir(generators_dir, GENERATORS_DIR_ENV) {
        Some(dir) => GeneratorRegistry::from_dir(&dir)
            .with_context(|| format!("failed to scan {}", dir.display()))?,
        None => GeneratorRegistry::default(),
    };

    let drivers_dir = resolve_dir(drivers_dir, DRIVERS_DIR_ENV)
        .context("no --drivers-dir given and $REXDIFF_DRIVERS_DIR is unset")?;
    let language_registry = LanguageRegistry::from_dir(&drivers_dir)
        .with_context(|| format!("failed to scan {}", drivers_dir.display()))?;
    if language_registry.is_empty() {
        bail!(
            "no check-regex-behavior-in-* drivers in {}",
            drivers_dir.display()
        );
    }
    info!(languages = ?language_registry.languages(), "using language drivers");

    let cfg = PipelineConfig {
        generators,
        languages: language_registry,
        default_languages: languages.iter().map(|l| l.to_lowercase()).collect(),
        generate: GenerateOptions {
            max_inputs_per_generator,
            seed,
            timeout_secs: generator_timeout,
        },
        evaluate: EvaluateOptions {
            timeout: Duration::from_secs_f64(eval_timeout.max(0.0)),
        },
    };

    let n_regexes = records.len();
    let cancel = CancelToken::new();
    let (completed, outcome) = run_semantic_tests(
        records,
        &cfg,
        parallelism.unwrap_or_else(default_parallelism),
        rate(rate_limit, rate_window),
        &cancel,
    );

    let n_with_witnesses = completed.iter().filter(|r| r.has_witnesses()).count();
    let lines: Vec<String> = completed
        .iter()
        .map(|r| r.to_ndjson())
        .collect::<Result<_, _>>()?;
    write_ndjson_file(out_file, &lines)?;

    let summary = TestSummary {
        n_regexes,
        n_completed: outcome.n_completed,
        n_failed: outcome.n_failed,
        n_with_witnesses,
        pct_with_witnesses: 100.0 * n_with_witnesses as f64 / outcome.n_completed.max(1) as f64,
        out_file: out_file.display().to_string(),
    };
    Ok(match format {
        OutputFormat::Json => format_json(&summary),
        OutputFormat::Text => format_test_summary(&summary),
    })
}

/// Handle the analyze command
pub fn handle_analyze(
    regex_file: &Path,
    unexplained_out: Option<PathBuf>,
    format: OutputFormat,
) -> Result<String> {
    let records = load_records(regex_file)?;

    let report = analyze_records(&records, &LanguageNameTable::default())?;

    if let Some(out) = unexplained_out {
        let unexplained_patterns: std::collections::BTreeSet<&str> = report
            .unexplained
            .iter()
            .map(|u| u.pattern.as_str())
            .collect();
        let lines: Vec<String> = records
            .iter()
            .filter(|r| unexplained_patterns.contains(r.pattern.as_str()))
            .map(|r| r.to_ndjson())
            .collect::<Result<_, _>>()?;
        write_ndjson_file(&out, &lines)?;
        info!(n = lines.len(), file = %out.display(), "wrote unexplained records");
    }

    Ok(match format {
        OutputFormat::Json => format_json(&report),
        OutputFormat::Text => format_analyze_report(&report),
    })
}
