//! Semantic-difference witness detection
//!
//! Folds per-language evaluation results into one candidate witness per
//! unique input, keeps the inputs on which languages genuinely disagreed, and
//! classifies each pattern's witness set into witness kinds.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::matching::{MatchResult, RegexEvaluationResult, SemanticDifferenceWitness};

/// The data model's invariants were violated: a logic bug, not a data
/// property. These abort loudly instead of degrading.
#[derive(Error, Debug)]
pub enum ConsistencyError {
    #[error("regex /{pattern}/ has {n_witnesses} witnesses but no witness kind was detected")]
    NoKindForWitnesses { pattern: String, n_witnesses: usize },

    #[error("outcomes compared as a difference pair are identical")]
    IdenticalOutcomes,

    #[error("witness has an outcome pair in which neither side matched")]
    NeitherSideMatched,
}

/// What witness detection found for one pattern.
#[derive(Debug, Clone)]
pub struct WitnessOutcome {
    pub witnesses: Vec<SemanticDifferenceWitness>,
    pub n_unique_inputs_tested: usize,
}

/// Fold every evaluation result into per-input witnesses and keep the true
/// ones.
///
/// Every input in the pool gets a candidate witness; languages file their
/// outcome under it as results arrive (arrival order is irrelevant thanks to
/// the match model's map semantics). An input where fewer than two distinct
/// outcomes were observed, including the all-backends-timed-out case with
/// zero outcomes, is not a witness and is dropped.
pub fn detect_witnesses(
    pattern: &str,
    inputs: &[String],
    lang_results: &BTreeMap<String, Vec<RegexEvaluationResult>>,
) -> WitnessOutcome {
    let mut candidates: HashMap<&str, SemanticDifferenceWitness> = inputs
        .iter()
        .map(|input| {
            (
                input.as_str(),
                SemanticDifferenceWitness::new(pattern, input.clone()),
            )
        })
        .collect();

    for rers in lang_results.values() {
        for rer in rers {
            match candidates.get_mut(rer.input.as_str()) {
                Some(sdw) => sdw.add_rer(rer),
                None => {
                    // A driver echoed back an input we never sent.
                    warn!(
                        pattern,
                        language = %rer.language,
                        input = %rer.input,
                        "result for an input outside the candidate pool, ignoring"
                    );
                }
            }
        }
    }

    let mut witnesses = Vec::new();
    for input in inputs {
        if let Some(sdw) = candidates.remove(input.as_str()) {
            if sdw.is_true_witness() {
                debug!(pattern, input = %sdw.input, outcomes = sdw.n_outcomes(), "true witness");
                for (mr, langs) in sdw.outcomes() {
                    debug!(result = %mr.terse(), ?langs, "  outcome");
                }
                witnesses.push(sdw);
            }
        }
    }

    WitnessOutcome {
        witnesses,
        n_unique_inputs_tested: inputs.len(),
    }
}

/// The kind of disagreement a single outcome pair demonstrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairKind {
    /// Disagree on whether the pattern matched at all.
    Match,
    /// Agree on match existence, disagree on the matched substring.
    Substring,
    /// Agree on the matched substring, disagree on capture-group contents.
    Capture,
}

/// Identify how two distinct outcomes of one witness differ.
pub fn identify_pair_kind(
    mr1: &MatchResult,
    mr2: &MatchResult,
) -> Result<PairKind, ConsistencyError> {
    if mr1.is_match() != mr2.is_match() {
        return Ok(PairKind::Match);
    }
    if !mr1.is_match() {
        // Two distinct non-matches cannot exist: no-match is canonical.
        return Err(ConsistencyError::NeitherSideMatched);
    }
    if mr1.matched_string() != mr2.matched_string() {
        return Ok(PairKind::Substring);
    }
    if mr1.capture_groups() != mr2.capture_groups() {
        return Ok(PairKind::Capture);
    }
    Err(ConsistencyError::IdenticalOutcomes)
}

/// Per-regex witness-kind flags. Independent, non-exclusive: derived by
/// scanning every witness of the pattern.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WitnessKinds {
    pub match_witness: bool,
    pub substring_witness: bool,
    pub capture_witness: bool,
}

impl WitnessKinds {
    pub fn any(&self) -> bool {
        self.match_witness || self.substring_witness || self.capture_witness
    }
}

/// Derive the witness-kind flags for one pattern's witness set.
///
/// A non-empty witness list that produces zero kind flags signals a
/// classifier bug and is surfaced as a `ConsistencyError`.
pub fn classify_witness_kinds(
    pattern: &str,
    witnesses: &[SemanticDifferenceWitness],
) -> Result<WitnessKinds, ConsistencyError> {
    let mut kinds = WitnessKinds::default();

    for sdw in witnesses {
        let outcomes = sdw.outcomes();

        let any_matched = outcomes.iter().any(|(mr, _)| mr.is_match());
        let any_missed = outcomes.iter().any(|(mr, _)| !mr.is_match());
        if any_matched && any_missed {
            kinds.match_witness = true;
        }

        let matched_strings: BTreeSet<&str> = outcomes
            .iter()
            .filter(|(mr, _)| mr.is_match())
            .map(|(mr, _)| mr.matched_string())
            .collect();
        if matched_strings.len() > 1 {
            kinds.substring_witness = true;
        }

        // Capture witness: among results that agree on the matched substring,
        // at least two distinct capture-group vectors.
        for matched_string in &matched_strings {
            let distinct_captures: BTreeSet<&[String]> = outcomes
                .iter()
                .filter(|(mr, _)| mr.is_match() && mr.matched_string() == *matched_string)
                .map(|(mr, _)| mr.capture_groups())
                .collect();
            if distinct_captures.len() > 1 {
                kinds.capture_witness = true;
            }
        }
    }

    if !witnesses.is_empty() && !kinds.any() {
        return Err(ConsistencyError::NoKindForWitnesses {
            pattern: pattern.to_string(),
            n_witnesses: witnesses.len(),
        });
    }
    Ok(kinds)
}
