//! Offline batch analysis over completed witness data
//!
//! Consumes regex records that have been through semantic testing and
//! produces: witness-kind counts, language-pair disagreement counts, a cause
//! histogram from the classifier, and the list of regexes with unexplained
//! witnesses. Pure aggregation, single-threaded, run after all parallel work
//! completes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, info};

use crate::output::{
    AnalyzeReport, CauseCount, InputStats, LanguagePairReport, UnexplainedRegex, WitnessKindCounts,
};
use crate::record::RegexRecord;

use super::classify::{Cause, CauseClassifier, CauseHistogram, ClassifyError};
use super::witness::{classify_witness_kinds, identify_pair_kind, ConsistencyError, PairKind};

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// Display names for languages, keyed by the lowercase names the drivers use.
/// Passed in explicitly; unknown languages fall back to their lowercase name.
pub struct LanguageNameTable {
    display: BTreeMap<&'static str, &'static str>,
}

impl Default for LanguageNameTable {
    fn default() -> Self {
        let display = BTreeMap::from([
            ("javascript", "JavaScript"),
            ("rust", "Rust"),
            ("php", "PHP"),
            ("python", "Python"),
            ("ruby", "Ruby"),
            ("perl", "Perl"),
            ("java", "Java"),
            ("go", "Go"),
        ]);
        Self { display }
    }
}

impl LanguageNameTable {
    pub fn display(&self, lang: &str) -> String {
        self.display
            .get(lang)
            .map(|s| s.to_string())
            .unwrap_or_else(|| lang.to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PairCounts {
    match_witnesses: u64,
    substring_witnesses: u64,
    capture_witnesses: u64,
}

impl PairCounts {
    fn add(&mut self, kind: PairKind) {
        match kind {
            PairKind::Match => self.match_witnesses += 1,
            PairKind::Substring => self.substring_witnesses += 1,
            PairKind::Capture => self.capture_witnesses += 1,
        }
    }

    fn total(&self) -> u64 {
        self.match_witnesses + self.substring_witnesses + self.capture_witnesses
    }
}

/// Accumulates witness-kind counts per unordered language pair. A given kind
/// is counted at most once per pair per regex, so a hypothesized equivalence
/// class of inputs (say, "misbehaves on any Unicode character") doesn't
/// N-count one underlying difference.
struct LanguagePairAnalysis {
    counts: BTreeMap<(String, String), PairCounts>,
}

impl LanguagePairAnalysis {
    fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    fn pair_key(lang_a: &str, lang_b: &str) -> (String, String) {
        let (a, b) = if lang_a <= lang_b {
            (lang_a, lang_b)
        } else {
            (lang_b, lang_a)
        };
        (a.to_string(), b.to_string())
    }

    fn analyze_regex(
        &mut self,
        record: &RegexRecord,
        names: &LanguageNameTable,
    ) -> Result<(), ConsistencyError> {
        let mut counted: HashMap<(String, String), BTreeSet<&'static str>> = HashMap::new();

        for sdw in &record.semantic_difference_witnesses {
            for (mr1, mr2) in sdw.outcome_pairs() {
                let kind = identify_pair_kind(mr1, mr2)?;
                let kind_tag = match kind {
                    PairKind::Match => "match",
                    PairKind::Substring => "substring",
                    PairKind::Capture => "capture",
                };
                for lang1 in sdw.langs_for(mr1) {
                    for lang2 in sdw.langs_for(mr2) {
                        let pair = Self::pair_key(&names.display(lang1), &names.display(lang2));
                        let seen = counted.entry(pair.clone()).or_default();
                        if seen.insert(kind_tag) {
                            self.counts.entry(pair).or_default().add(kind);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn into_reports(self) -> Vec<LanguagePairReport> {
        self.counts
            .into_iter()
            .filter(|(_, counts)| counts.total() > 0)
            .map(|((language_a, language_b), counts)| LanguagePairReport {
                language_a,
                language_b,
                witnesses: counts.total(),
                match_witnesses: counts.match_witnesses,
                substring_witnesses: counts.substring_witnesses,
                capture_witnesses: counts.capture_witnesses,
            })
            .collect()
    }
}

fn input_stats(records: &[RegexRecord]) -> InputStats {
    let tested: Vec<i64> = records
        .iter()
        .map(|r| r.n_unique_inputs_tested)
        .filter(|&n| n >= 0)
        .collect();
    if tested.is_empty() {
        return InputStats::default();
    }
    let mut sorted = tested.clone();
    sorted.sort_unstable();
    let count = sorted.len();
    let median = if count % 2 == 1 {
        sorted[count / 2] as f64
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
    };
    InputStats {
        count,
        mean: sorted.iter().sum::<i64>() as f64 / count as f64,
        min: sorted[0],
        median,
        max: sorted[count - 1],
    }
}

fn witness_kind_counts(records: &[RegexRecord]) -> Result<WitnessKindCounts, ConsistencyError> {
    let mut counts = WitnessKindCounts::default();
    for record in records {
        if record.has_witnesses() {
            counts.any_witness += 1;
        } else {
            counts.no_witness += 1;
        }
        let kinds = classify_witness_kinds(&record.pattern, &record.semantic_difference_witnesses)?;
        if kinds.match_witness {
            counts.match_witness += 1;
        }
        if kinds.substring_witness {
            counts.substring_witness += 1;
        }
        if kinds.capture_witness {
            counts.capture_witness += 1;
        }
    }
    Ok(counts)
}

/// Run every analysis over a batch of tested records.
pub fn analyze_records(
    records: &[RegexRecord],
    names: &LanguageNameTable,
) -> Result<AnalyzeReport, AnalyzeError> {
    info!(n_regexes = records.len(), "analyzing tested regexes");

    let witness_counts = witness_kind_counts(records)?;

    let mut pairs = LanguagePairAnalysis::new();
    for record in records {
        pairs.analyze_regex(record, names)?;
    }

    // Cause classification: every 2-combination of every witness's outcomes,
    // each classified independently.
    let classifier = CauseClassifier::new()?;
    let mut histogram = CauseHistogram::default();
    let mut unexplained = Vec::new();
    for record in records {
        if !record.has_witnesses() {
            continue;
        }
        debug!(
            pattern = %record.pattern,
            n_witnesses = record.semantic_difference_witnesses.len(),
            "classifying witnesses"
        );
        let mut unexplained_inputs = Vec::new();
        for sdw in &record.semantic_difference_witnesses {
            let mut sdw_unexplained = false;
            for (mr1, mr2) in sdw.outcome_pairs() {
                let cause = classifier.classify(sdw, mr1, mr2);
                histogram.record(cause);
                if cause == Cause::Unknown {
                    sdw_unexplained = true;
                }
            }
            if sdw_unexplained {
                unexplained_inputs.push(sdw.input.clone());
            }
        }
        if !unexplained_inputs.is_empty() {
            unexplained.push(UnexplainedRegex {
                pattern: record.pattern.clone(),
                n_witnesses: record.semantic_difference_witnesses.len(),
                n_unexplained: unexplained_inputs.len(),
                inputs: unexplained_inputs,
            });
        }
    }

    info!(n_pairs_classified = histogram.total(), "classification complete");
    let causes = histogram
        .counts()
        .map(|(cause, count)| CauseCount {
            cause: cause.label().to_string(),
            description: cause.description().to_string(),
            count,
        })
        .collect();

    Ok(AnalyzeReport {
        n_regexes: records.len(),
        input_stats: input_stats(records),
        witness_counts,
        language_pairs: pairs.into_reports(),
        causes,
        unexplained,
    })
}
