//! Report types for rexdiff commands
//!
//! Everything here serializes to JSON; the text formatter renders the same
//! structures as tables.

use serde::Serialize;

/// Summary of a `rexdiff gen-inputs` run.
#[derive(Debug, Clone, Serialize)]
pub struct GenInputsSummary {
    /// Regex records read from the input file.
    pub n_regexes: usize,
    /// Records for which input generation completed.
    pub n_completed: usize,
    /// Records whose generation task failed outright.
    pub n_failed: usize,
    /// Total unique inputs across all completed records.
    pub n_unique_inputs: usize,
    /// Where the pattern-with-inputs records were written.
    pub out_file: String,
}

/// Summary of a `rexdiff test` run.
#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    /// Regex records read from the input file.
    pub n_regexes: usize,
    /// Records that completed the full pipeline.
    pub n_completed: usize,
    /// Records whose pipeline task failed outright.
    pub n_failed: usize,
    /// Completed records with at least one semantic-difference witness.
    pub n_with_witnesses: usize,
    /// Percentage of completed records with witnesses.
    pub pct_with_witnesses: f64,
    /// Where the enriched regex records were written.
    pub out_file: String,
}

/// Distribution of unique-input counts across tested regexes.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct InputStats {
    pub count: usize,
    pub mean: f64,
    pub min: i64,
    pub median: f64,
    pub max: i64,
}

/// How many regexes exhibit each witness kind. The kind flags are
/// independent, so the counts sum to more than the number of regexes.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WitnessKindCounts {
    pub no_witness: u64,
    pub any_witness: u64,
    pub match_witness: u64,
    pub substring_witness: u64,
    pub capture_witness: u64,
}

/// Disagreement counts for one unordered language pair.
#[derive(Debug, Clone, Serialize)]
pub struct LanguagePairReport {
    pub language_a: String,
    pub language_b: String,
    /// Sum of the three kind counts.
    pub witnesses: u64,
    pub match_witnesses: u64,
    pub substring_witnesses: u64,
    pub capture_witnesses: u64,
}

/// One row of the cause histogram.
#[derive(Debug, Clone, Serialize)]
pub struct CauseCount {
    pub cause: String,
    pub description: String,
    pub count: u64,
}

/// A regex with at least one witness the classifier could not explain.
#[derive(Debug, Clone, Serialize)]
pub struct UnexplainedRegex {
    pub pattern: String,
    pub n_witnesses: usize,
    pub n_unexplained: usize,
    /// The witness inputs that went unexplained.
    pub inputs: Vec<String>,
}

/// Result of `rexdiff analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub n_regexes: usize,
    pub input_stats: InputStats,
    pub witness_counts: WitnessKindCounts,
    pub language_pairs: Vec<LanguagePairReport>,
    pub causes: Vec<CauseCount>,
    pub unexplained: Vec<UnexplainedRegex>,
}
