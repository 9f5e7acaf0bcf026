//! Cross-language semantic portability testing
//!
//! The per-pattern pipeline: generate candidate inputs, evaluate the pattern
//! in every target language, detect semantic-difference witnesses, and write
//! the findings back onto the regex record. One pattern is the unit of
//! parallel work; patterns share nothing and run concurrently.

use tracing::{info, warn};

use crate::record::{PatternWithInputs, RegexRecord};

use super::evaluate::{evaluate_pattern, EvaluateOptions, LanguageRegistry};
use super::generate::{candidate_pool, generate_inputs, GenerateOptions, GeneratorRegistry};
use super::pool::{self, CancelToken, RateLimit};
use super::witness::detect_witnesses;

/// Everything one analysis run needs, built explicitly at startup.
pub struct PipelineConfig {
    pub generators: GeneratorRegistry,
    pub languages: LanguageRegistry,
    /// Languages to test when a record carries no `supportedLangs` of its own.
    pub default_languages: Vec<String>,
    pub generate: GenerateOptions,
    pub evaluate: EvaluateOptions,
}

impl PipelineConfig {
    fn languages_for(&self, record: &RegexRecord) -> Vec<String> {
        if !record.supported_langs.is_empty() {
            record
                .supported_langs
                .iter()
                .map(|l| l.to_lowercase())
                .collect()
        } else if !self.default_languages.is_empty() {
            self.default_languages.clone()
        } else {
            self.languages.languages()
        }
    }
}

/// Run the full pipeline for one pattern. Infallible by design: backend
/// failures degrade to reduced coverage, and the record comes back with
/// whatever was learned.
pub fn test_pattern(
    mut record: RegexRecord,
    cfg: &PipelineConfig,
    cancel: &CancelToken,
) -> RegexRecord {
    info!(pattern = %record.pattern, "testing pattern");

    let pool = match generate_inputs(&record, &cfg.generators, &cfg.generate, cancel) {
        Ok(pool) => pool,
        Err(err) => {
            warn!(pattern = %record.pattern, %err, "input generation failed, probing anyway");
            PatternWithInputs::new(record.pattern.clone())
        }
    };
    let inputs = candidate_pool(&pool, &cfg.generate);

    let languages = cfg.languages_for(&record);
    info!(
        pattern = %record.pattern,
        n_inputs = inputs.len(),
        n_languages = languages.len(),
        "evaluating"
    );

    let lang_results = evaluate_pattern(
        &record.pattern,
        &inputs,
        &languages,
        &cfg.languages,
        &cfg.evaluate,
        cancel,
    );

    let outcome = detect_witnesses(&record.pattern, &inputs, &lang_results);
    info!(
        pattern = %record.pattern,
        n_witnesses = outcome.witnesses.len(),
        n_inputs = outcome.n_unique_inputs_tested,
        "pattern complete"
    );

    record.n_unique_inputs_tested = outcome.n_unique_inputs_tested as i64;
    record.semantic_difference_witnesses = outcome.witnesses;
    record
}

/// Summary of a batch run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    pub n_tasks: usize,
    pub n_completed: usize,
    pub n_failed: usize,
}

/// Test every record across a worker pool; results preserve input order,
/// minus patterns whose worker died.
pub fn run_semantic_tests(
    records: Vec<RegexRecord>,
    cfg: &PipelineConfig,
    n_workers: usize,
    rate_limit: Option<RateLimit>,
    cancel: &CancelToken,
) -> (Vec<RegexRecord>, BatchOutcome) {
    let n_tasks = records.len();
    let results = pool::map(records, n_workers, rate_limit, cancel, |record| {
        test_pattern(record, cfg, cancel)
    });

    let completed: Vec<RegexRecord> = results.into_iter().flatten().collect();
    let outcome = BatchOutcome {
        n_tasks,
        n_completed: completed.len(),
        n_failed: n_tasks - completed.len(),
    };
    (completed, outcome)
}

/// Generate candidate inputs for every record across a worker pool.
pub fn run_input_generation(
    records: Vec<RegexRecord>,
    cfg: &PipelineConfig,
    n_workers: usize,
    rate_limit: Option<RateLimit>,
    cancel: &CancelToken,
) -> (Vec<PatternWithInputs>, BatchOutcome) {
    let n_tasks = records.len();
    let results = pool::map(records, n_workers, rate_limit, cancel, |record| {
        generate_inputs(&record, &cfg.generators, &cfg.generate, cancel)
            .map_err(|err| {
                warn!(pattern = %record.pattern, %err, "input generation failed");
                err
            })
            .ok()
    });

    let completed: Vec<PatternWithInputs> = results.into_iter().flatten().flatten().collect();
    let outcome = BatchOutcome {
        n_tasks,
        n_completed: completed.len(),
        n_failed: n_tasks - completed.len(),
    };
    (completed, outcome)
}
