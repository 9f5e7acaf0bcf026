//! Multi-language evaluation dispatch
//!
//! For a pattern and a pool of candidate inputs, ask each target language's
//! external driver how the pattern behaves. One batch call per language
//! (pattern plus all inputs in a single query file), bounded by a wall-clock
//! timeout. A language whose driver times out, crashes, or rejects the
//! pattern's syntax simply contributes no results, never an error for the
//! pattern as a whole.
//!
//! Drivers use search (partial-match) semantics: the pattern may match
//! anywhere in the input. This is fixed by the driver contract so results
//! stay comparable across languages.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::matching::{MatchContents, MatchResult, RegexEvaluationResult};
use super::pool::CancelToken;
use super::process::{run_with_deadline, scratch_file, ProcessOutcome};

/// Default per-language budget. Querying even a large input batch is fast;
/// anything that hits this is stuck in super-linear matching.
pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(30);

const DRIVER_PREFIX: &str = "check-regex-behavior-in-";

#[derive(Error, Debug)]
enum LangQueryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("driver response was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("driver exited with {0}")]
    DriverFailed(String),

    #[error("driver timed out")]
    TimedOut,

    #[error("run cancelled")]
    Cancelled,

    #[error("malformed driver response: {0}")]
    Malformed(String),
}

/// Maps each target language to its evaluation driver. Built explicitly at
/// startup from a driver directory or individual insertions.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    drivers: BTreeMap<String, PathBuf>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover `check-regex-behavior-in-<lang>` drivers in a directory.
    /// The JavaScript driver is conventionally named after node; it is filed
    /// under "javascript".
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        let mut registry = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(rest) = name.strip_prefix(DRIVER_PREFIX) else {
                continue;
            };
            let lang = rest.split('.').next().unwrap_or(rest);
            let lang = if lang == "node" { "javascript" } else { lang };
            registry.insert(lang, path.clone());
        }
        Ok(registry)
    }

    pub fn insert(&mut self, language: &str, driver: PathBuf) {
        self.drivers.insert(language.to_lowercase(), driver);
    }

    pub fn driver_for(&self, language: &str) -> Option<&Path> {
        self.drivers.get(&language.to_lowercase()).map(PathBuf::as_path)
    }

    pub fn languages(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluateOptions {
    pub timeout: Duration,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }
}

/// Raw driver response, as written to the output channel by every language
/// driver. `matched` arrives as a bool from some drivers and 0/1 from others.
#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(rename = "validPattern", default)]
    valid_pattern: Option<RawBool>,
    #[serde(default)]
    results: Vec<RawInputResult>,
}

#[derive(Debug, Deserialize)]
struct RawInputResult {
    input: String,
    matched: RawBool,
    #[serde(rename = "matchContents", default)]
    match_contents: Option<RawMatchContents>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMatchContents {
    #[serde(rename = "matchedString", default)]
    matched_string: Option<String>,
    #[serde(rename = "captureGroups", default)]
    capture_groups: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBool {
    Bool(bool),
    Int(i64),
}

impl RawBool {
    fn as_bool(&self) -> bool {
        match self {
            RawBool::Bool(b) => *b,
            RawBool::Int(i) => *i != 0,
        }
    }
}

/// Evaluate `pattern` against `inputs` in each of `languages`.
///
/// Returns `language -> results`, in the given language order. Languages that
/// contributed nothing (timeout, crash, unsupported syntax) are absent.
pub fn evaluate_pattern(
    pattern: &str,
    inputs: &[String],
    languages: &[String],
    registry: &LanguageRegistry,
    opts: &EvaluateOptions,
    cancel: &CancelToken,
) -> BTreeMap<String, Vec<RegexEvaluationResult>> {
    let mut lang_results = BTreeMap::new();

    // The same query file serves every language.
    let query_file = match write_query_file(pattern, inputs) {
        Ok(file) => file,
        Err(err) => {
            warn!(pattern, %err, "could not stage query file, no languages evaluated");
            return lang_results;
        }
    };

    for language in languages {
        if cancel.is_cancelled() {
            break;
        }
        let language = language.to_lowercase();
        let Some(driver) = registry.driver_for(&language) else {
            warn!(%language, "no driver registered, skipping");
            continue;
        };
        match query_language(pattern, query_file.path(), &language, driver, opts, cancel) {
            Ok(Some(rers)) => {
                info!(%language, n_results = rers.len(), "language evaluated");
                lang_results.insert(language, rers);
            }
            Ok(None) => {
                // Syntax incompatibility is not, by itself, a semantic
                // difference; the language just sits this pattern out.
                info!(%language, pattern, "pattern not supported, excluding language");
            }
            Err(LangQueryError::Cancelled) => break,
            Err(err) => {
                warn!(%language, pattern, %err, "language contributed no results");
            }
        }
    }

    lang_results
}

fn write_query_file(pattern: &str, inputs: &[String]) -> io::Result<tempfile::NamedTempFile> {
    let mut query_file = scratch_file("rexdiff-eval-query-")?;
    let query = json!({
        "pattern": pattern,
        "inputs": inputs,
    });
    query_file.write_all(query.to_string().as_bytes())?;
    query_file.flush()?;
    Ok(query_file)
}

/// Run one language driver over the batch. `Ok(None)` means the pattern is
/// not valid in this language's engine.
fn query_language(
    pattern: &str,
    query_file: &Path,
    language: &str,
    driver: &Path,
    opts: &EvaluateOptions,
    cancel: &CancelToken,
) -> Result<Option<Vec<RegexEvaluationResult>>, LangQueryError> {
    // Batch answers can be large; route stdout through a file so pipe
    // buffering can't wedge the driver.
    let out_file = scratch_file("rexdiff-eval-out-")?;
    let mut command = Command::new(driver);
    command
        .arg(query_file)
        .stdout(out_file.reopen()?)
        .stdin(Stdio::null());
    debug!(%language, driver = %driver.display(), "querying driver");

    let outcome = run_with_deadline(&mut command, Some(opts.timeout), cancel)?;
    match outcome {
        ProcessOutcome::Completed(status) if status.success() => {}
        ProcessOutcome::Completed(status) => {
            return Err(LangQueryError::DriverFailed(status.to_string()));
        }
        ProcessOutcome::TimedOut => return Err(LangQueryError::TimedOut),
        ProcessOutcome::Cancelled => return Err(LangQueryError::Cancelled),
    }

    let contents = std::fs::read_to_string(out_file.path())?;
    let response: RawResponse = serde_json::from_str(contents.trim())?;

    if let Some(valid) = &response.valid_pattern {
        if !valid.as_bool() {
            return Ok(None);
        }
    }

    let mut rers = Vec::with_capacity(response.results.len());
    for result in response.results {
        let match_result = if result.matched.as_bool() {
            let contents = result.match_contents.ok_or_else(|| {
                LangQueryError::Malformed("matched result without matchContents".to_string())
            })?;
            MatchResult::matched(MatchContents::from_raw(
                contents.matched_string.unwrap_or_default(),
                contents.capture_groups,
            ))
        } else {
            MatchResult::no_match()
        };
        rers.push(RegexEvaluationResult {
            pattern: pattern.to_string(),
            input: result.input,
            language: language.to_string(),
            match_result,
        });
    }
    Ok(Some(rers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn write_driver(dir: &Path, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn inputs(strings: &[&str]) -> Vec<String> {
        strings.iter().map(|s| s.to_string()).collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_registry_discovery_maps_node_to_javascript() {
        let dir = tempfile::tempdir().unwrap();
        write_driver(dir.path(), "check-regex-behavior-in-node.js", "#!/bin/sh\n");
        write_driver(dir.path(), "check-regex-behavior-in-ruby.rb", "#!/bin/sh\n");
        let registry = LanguageRegistry::from_dir(dir.path()).unwrap();
        assert_eq!(registry.languages(), ["javascript", "ruby"]);
        assert!(registry.driver_for("JavaScript").is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_driver_produces_rers() {
        let dir = tempfile::tempdir().unwrap();
        // Fixed answer regardless of query: "ab" matched, "zz" did not.
        write_driver(
            dir.path(),
            "check-regex-behavior-in-python.py",
            concat!(
                "#!/bin/sh\n",
                r#"printf '{"validPattern": true, "results": [{"input": "ab", "matched": 1, "matchContents": {"matchedString": "ab", "captureGroups": ["a", null]}}, {"input": "zz", "matched": 0, "matchContents": {}}]}'"#,
                "\n"
            ),
        );
        let registry = LanguageRegistry::from_dir(dir.path()).unwrap();
        let results = evaluate_pattern(
            "(a)(c)?b",
            &inputs(&["ab", "zz"]),
            &["python".to_string()],
            &registry,
            &EvaluateOptions::default(),
            &CancelToken::new(),
        );

        let rers = &results["python"];
        assert_eq!(rers.len(), 2);
        assert!(rers[0].match_result.is_match());
        assert_eq!(rers[0].match_result.matched_string(), "ab");
        // Null capture group normalized to "".
        assert_eq!(rers[0].match_result.capture_groups(), ["a", ""]);
        assert!(!rers[1].match_result.is_match());
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_pattern_excludes_language() {
        let dir = tempfile::tempdir().unwrap();
        write_driver(
            dir.path(),
            "check-regex-behavior-in-go",
            "#!/bin/sh\nprintf '{\"validPattern\": false, \"results\": []}'\n",
        );
        let registry = LanguageRegistry::from_dir(dir.path()).unwrap();
        let results = evaluate_pattern(
            r"(?<=x)y",
            &inputs(&["xy"]),
            &["go".to_string()],
            &registry,
            &EvaluateOptions::default(),
            &CancelToken::new(),
        );
        assert!(results.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_driver_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_driver(
            dir.path(),
            "check-regex-behavior-in-java.pl",
            "#!/bin/sh\nsleep 30\n",
        );
        write_driver(
            dir.path(),
            "check-regex-behavior-in-rust",
            concat!(
                "#!/bin/sh\n",
                r#"printf '{"validPattern": true, "results": [{"input": "a", "matched": 0}]}'"#,
                "\n"
            ),
        );
        let registry = LanguageRegistry::from_dir(dir.path()).unwrap();
        let opts = EvaluateOptions {
            timeout: Duration::from_millis(300),
        };
        let results = evaluate_pattern(
            "(a+)+$",
            &inputs(&["a"]),
            &["java".to_string(), "rust".to_string()],
            &registry,
            &opts,
            &CancelToken::new(),
        );
        // Java timed out; rust still answered.
        assert!(!results.contains_key("java"));
        assert_eq!(results["rust"].len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_crashing_driver_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_driver(dir.path(), "check-regex-behavior-in-perl.pl", "#!/bin/sh\nexit 9\n");
        let registry = LanguageRegistry::from_dir(dir.path()).unwrap();
        let results = evaluate_pattern(
            "a",
            &inputs(&["a"]),
            &["perl".to_string()],
            &registry,
            &EvaluateOptions::default(),
            &CancelToken::new(),
        );
        assert!(results.is_empty());
    }
}
