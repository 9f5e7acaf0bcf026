//! Canonical match model
//!
//! The common shape every language driver's answer is normalized into:
//! did the pattern match, what substring matched, and what did each capture
//! group hold. Two languages that behaved identically on an input must
//! compare and hash equal, so these are pure value types.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Failed to decode a wire-format (single-line JSON) value.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed {entity}: {detail}")]
    Malformed {
        entity: &'static str,
        detail: String,
    },
}

fn malformed(entity: &'static str, detail: impl Into<String>) -> WireError {
    WireError::Malformed {
        entity,
        detail: detail.into(),
    }
}

/// Serialize to a single JSON line with sorted keys.
///
/// Routing through `Value` sorts object keys (serde_json's map is a BTreeMap),
/// which keeps witness map keys byte-stable across runs.
fn to_sorted_json_line(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Contents of a successful match: the matched substring and the capture
/// groups, in group order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MatchContents {
    pub matched_string: String,
    pub capture_groups: Vec<String>,
}

impl MatchContents {
    /// Build from raw driver data. Languages disagree on whether an unmatched
    /// optional group is null, undefined, or empty; all of those normalize to
    /// `""` here so that equality stays total and the disagreement cannot
    /// masquerade as a semantic difference.
    pub fn from_raw(matched_string: impl Into<String>, capture_groups: Vec<Option<String>>) -> Self {
        Self {
            matched_string: matched_string.into(),
            capture_groups: capture_groups
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect(),
        }
    }

    /// The canonical contents of a non-match.
    pub fn empty() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.matched_string.is_empty() && self.capture_groups.is_empty()
    }

    fn to_json_value(&self) -> Value {
        json!({
            "matchedString": self.matched_string,
            "captureGroups": self.capture_groups,
        })
    }

    pub fn to_ndjson(&self) -> String {
        to_sorted_json_line(&self.to_json_value())
    }

    pub fn from_ndjson(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_json_value(&value)
    }

    fn from_json_value(value: &Value) -> Result<Self, WireError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("MatchContents", "not a JSON object"))?;
        let matched_string = obj
            .get("matchedString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let capture_groups = match obj.get("captureGroups") {
            Some(Value::Array(groups)) => groups
                .iter()
                .map(|g| g.as_str().unwrap_or_default().to_string())
                .collect(),
            _ => Vec::new(),
        };
        Ok(Self {
            matched_string,
            capture_groups,
        })
    }
}

/// The outcome of evaluating one pattern against one input in one language.
///
/// Hashable and structurally equal, so it can key the witness map: languages
/// with identical behavior collapse into one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchResult {
    matched: bool,
    contents: MatchContents,
}

impl MatchResult {
    pub fn matched(contents: MatchContents) -> Self {
        Self {
            matched: true,
            contents,
        }
    }

    /// A non-match. Contents are forced empty, upholding the invariant that
    /// `matched == false` implies empty contents.
    pub fn no_match() -> Self {
        Self {
            matched: false,
            contents: MatchContents::empty(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched
    }

    #[allow(dead_code)]
    pub fn contents(&self) -> &MatchContents {
        &self.contents
    }

    pub fn matched_string(&self) -> &str {
        &self.contents.matched_string
    }

    pub fn capture_groups(&self) -> &[String] {
        &self.contents.capture_groups
    }

    /// Wire form: the contents travel as an embedded single-line JSON string,
    /// matching the interchange format the rest of the toolchain reads.
    pub fn to_ndjson(&self) -> String {
        to_sorted_json_line(&json!({
            "matched": self.matched,
            "matchContents": self.contents.to_ndjson(),
        }))
    }

    pub fn from_ndjson(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("MatchResult", "not a JSON object"))?;
        let matched = match obj.get("matched") {
            Some(Value::Bool(b)) => *b,
            // Some drivers report 0/1 instead of a boolean.
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            other => {
                return Err(malformed(
                    "MatchResult",
                    format!("bad 'matched' field: {:?}", other),
                ))
            }
        };
        let contents = match obj.get("matchContents") {
            Some(Value::String(inner)) => MatchContents::from_ndjson(inner)?,
            Some(inner @ Value::Object(_)) => MatchContents::from_json_value(inner)?,
            None | Some(Value::Null) => MatchContents::empty(),
            other => {
                return Err(malformed(
                    "MatchResult",
                    format!("bad 'matchContents' field: {:?}", other),
                ))
            }
        };
        if matched {
            Ok(Self::matched(contents))
        } else {
            Ok(Self::no_match())
        }
    }

    /// Compact one-line rendering for log output.
    pub fn terse(&self) -> String {
        if self.matched {
            format!(
                "T {} {:?}",
                serde_json::to_string(&self.contents.matched_string).unwrap_or_default(),
                self.contents.capture_groups
            )
        } else {
            "F".to_string()
        }
    }
}

/// Result of evaluating regex X on input Y in language Z. Ephemeral: produced
/// by the evaluator and folded straight into witnesses.
#[derive(Debug, Clone)]
pub struct RegexEvaluationResult {
    pub pattern: String,
    pub input: String,
    pub language: String,
    pub match_result: MatchResult,
}

/// Tracks how every language behaved on one (pattern, input) pair.
///
/// The map groups languages by outcome; more than one distinct outcome means
/// this input witnesses a genuine cross-language semantic difference.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticDifferenceWitness {
    pub pattern: String,
    pub input: String,
    match_result_to_langs: HashMap<MatchResult, Vec<String>>,
}

impl SemanticDifferenceWitness {
    pub fn new(pattern: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            input: input.into(),
            match_result_to_langs: HashMap::new(),
        }
    }

    /// File one evaluation result under its outcome bucket. A language is
    /// never recorded twice under the same outcome, even if queried twice.
    pub fn add_rer(&mut self, rer: &RegexEvaluationResult) {
        let langs = self
            .match_result_to_langs
            .entry(rer.match_result.clone())
            .or_default();
        if !langs.iter().any(|l| l == &rer.language) {
            langs.push(rer.language.clone());
        }
    }

    /// True iff at least two distinct outcomes were observed.
    pub fn is_true_witness(&self) -> bool {
        self.match_result_to_langs.len() > 1
    }

    pub fn n_outcomes(&self) -> usize {
        self.match_result_to_langs.len()
    }

    pub fn langs_for(&self, result: &MatchResult) -> &[String] {
        self.match_result_to_langs
            .get(result)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Outcomes in a deterministic order (sorted by wire encoding).
    pub fn outcomes(&self) -> Vec<(&MatchResult, &[String])> {
        let mut entries: Vec<_> = self
            .match_result_to_langs
            .iter()
            .map(|(mr, langs)| (mr, langs.as_slice()))
            .collect();
        entries.sort_by_key(|(mr, _)| mr.to_ndjson());
        entries
    }

    /// All 2-combinations of distinct outcomes, deterministically ordered.
    pub fn outcome_pairs(&self) -> Vec<(&MatchResult, &MatchResult)> {
        let outcomes = self.outcomes();
        let mut pairs = Vec::new();
        for i in 0..outcomes.len() {
            for j in (i + 1)..outcomes.len() {
                pairs.push((outcomes[i].0, outcomes[j].0));
            }
        }
        pairs
    }

    /// Invert the map: which outcome did each language report.
    #[allow(dead_code)]
    pub fn lang_to_result(&self) -> HashMap<&str, &MatchResult> {
        let mut inverted = HashMap::new();
        for (mr, langs) in &self.match_result_to_langs {
            for lang in langs {
                inverted.insert(lang.as_str(), mr);
            }
        }
        inverted
    }

    pub fn to_ndjson(&self) -> String {
        let mut map = Map::new();
        for (mr, langs) in self.outcomes() {
            map.insert(mr.to_ndjson(), json!(langs));
        }
        to_sorted_json_line(&json!({
            "pattern": self.pattern,
            "input": self.input,
            "matchResultToLangs": Value::Object(map),
        }))
    }

    pub fn from_ndjson(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("SemanticDifferenceWitness", "not a JSON object"))?;
        let pattern = obj
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("SemanticDifferenceWitness", "missing 'pattern'"))?
            .to_string();
        let input = obj
            .get("input")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("SemanticDifferenceWitness", "missing 'input'"))?
            .to_string();

        let mut match_result_to_langs = HashMap::new();
        if let Some(Value::Object(map)) = obj.get("matchResultToLangs") {
            for (mr_json, langs) in map {
                let mr = MatchResult::from_ndjson(mr_json)?;
                let langs: Vec<String> = match langs {
                    Value::Array(items) => items
                        .iter()
                        .map(|l| l.as_str().unwrap_or_default().to_string())
                        .collect(),
                    _ => {
                        return Err(malformed(
                            "SemanticDifferenceWitness",
                            "language list is not an array",
                        ))
                    }
                };
                match_result_to_langs.insert(mr, langs);
            }
        }

        Ok(Self {
            pattern,
            input,
            match_result_to_langs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_ab() -> MatchResult {
        MatchResult::matched(MatchContents::from_raw(
            "ab",
            vec![Some("a".to_string()), Some("b".to_string())],
        ))
    }

    #[test]
    fn test_match_result_equality_is_structural() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let r1 = result_ab();
        let r2 = result_ab();
        assert_eq!(r1, r2);

        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        r1.hash(&mut h1);
        r2.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn test_null_capture_groups_normalize_to_empty() {
        let contents = MatchContents::from_raw("xy", vec![Some("x".to_string()), None, None]);
        assert_eq!(contents.capture_groups, vec!["x", "", ""]);
    }

    #[test]
    fn test_no_match_has_empty_contents() {
        let r = MatchResult::no_match();
        assert!(!r.is_match());
        assert!(r.contents().is_empty());
    }

    #[test]
    fn test_add_rer_deduplicates_language_per_outcome() {
        let mut sdw = SemanticDifferenceWitness::new("a", "a");
        let rer = RegexEvaluationResult {
            pattern: "a".to_string(),
            input: "a".to_string(),
            language: "python".to_string(),
            match_result: result_ab(),
        };
        sdw.add_rer(&rer);
        sdw.add_rer(&rer);
        assert_eq!(sdw.langs_for(&result_ab()), ["python"]);
    }

    #[test]
    fn test_identical_outcomes_are_not_a_witness() {
        let mut sdw = SemanticDifferenceWitness::new("a", "b");
        for lang in ["python", "ruby", "go"] {
            sdw.add_rer(&RegexEvaluationResult {
                pattern: "a".to_string(),
                input: "b".to_string(),
                language: lang.to_string(),
                match_result: MatchResult::no_match(),
            });
        }
        assert_eq!(sdw.n_outcomes(), 1);
        assert!(!sdw.is_true_witness());
    }

    #[test]
    fn test_disagreement_is_a_witness() {
        let mut sdw = SemanticDifferenceWitness::new("a", "a");
        sdw.add_rer(&RegexEvaluationResult {
            pattern: "a".to_string(),
            input: "a".to_string(),
            language: "python".to_string(),
            match_result: result_ab(),
        });
        sdw.add_rer(&RegexEvaluationResult {
            pattern: "a".to_string(),
            input: "a".to_string(),
            language: "javascript".to_string(),
            match_result: MatchResult::no_match(),
        });
        assert!(sdw.is_true_witness());
        assert_eq!(sdw.outcome_pairs().len(), 1);
    }

    #[test]
    fn test_match_result_ndjson_round_trip() {
        let r = result_ab();
        let line = r.to_ndjson();
        assert!(!line.contains('\n'));
        let back = MatchResult::from_ndjson(&line).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn test_match_result_accepts_integer_matched_field() {
        let r = MatchResult::from_ndjson(
            r#"{"matched": 1, "matchContents": {"matchedString": "q", "captureGroups": [null]}}"#,
        )
        .unwrap();
        assert!(r.is_match());
        assert_eq!(r.matched_string(), "q");
        assert_eq!(r.capture_groups(), [""]);
    }

    #[test]
    fn test_witness_ndjson_round_trip() {
        let mut sdw = SemanticDifferenceWitness::new("(a)|b", "ab");
        sdw.add_rer(&RegexEvaluationResult {
            pattern: "(a)|b".to_string(),
            input: "ab".to_string(),
            language: "perl".to_string(),
            match_result: result_ab(),
        });
        sdw.add_rer(&RegexEvaluationResult {
            pattern: "(a)|b".to_string(),
            input: "ab".to_string(),
            language: "rust".to_string(),
            match_result: MatchResult::no_match(),
        });

        let line = sdw.to_ndjson();
        assert!(!line.contains('\n'));
        let back = SemanticDifferenceWitness::from_ndjson(&line).unwrap();
        assert_eq!(sdw, back);
        assert_eq!(back.langs_for(&MatchResult::no_match()), ["rust"]);
    }

    #[test]
    fn test_lang_to_result_inverts_the_map() {
        let mut sdw = SemanticDifferenceWitness::new("x", "x");
        sdw.add_rer(&RegexEvaluationResult {
            pattern: "x".to_string(),
            input: "x".to_string(),
            language: "go".to_string(),
            match_result: MatchResult::no_match(),
        });
        let inverted = sdw.lang_to_result();
        assert_eq!(inverted["go"], &MatchResult::no_match());
    }
}
