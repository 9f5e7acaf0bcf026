//! NDJSON record model
//!
//! Every pipeline stage exchanges newline-delimited JSON, one record per line,
//! with a `type` discriminator so stages can be run and restarted
//! independently. Parse failures skip the offending line and keep going; a
//! bad record never sinks a batch.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::matching::{SemanticDifferenceWitness, WireError};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wire format error: {0}")]
    Wire(#[from] WireError),
}

fn untested() -> i64 {
    -1
}

/// A unique regex pattern under study, with its provenance counts and (after
/// testing) its semantic-difference witnesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexRecord {
    pub pattern: String,

    /// Distinct modules using this pattern, per package registry.
    #[serde(rename = "useCount_registry_to_nModules", default)]
    pub use_count_registry_to_n_modules: BTreeMap<String, u64>,

    /// Posts containing this pattern, per internet-source type.
    #[serde(rename = "useCount_IStype_to_nPosts", default)]
    pub use_count_internet_source_to_n_posts: BTreeMap<String, u64>,

    /// Languages whose engines accept this pattern's syntax.
    #[serde(rename = "supportedLangs", default)]
    pub supported_langs: Vec<String>,

    /// -1 until the pattern has been through semantic testing.
    #[serde(rename = "nUniqueInputsTested", default = "untested")]
    pub n_unique_inputs_tested: i64,

    /// Witnesses travel as embedded single-line JSON strings, the same
    /// convention the rest of the toolchain reads and writes.
    #[serde(
        rename = "semanticDifferenceWitnesses",
        default,
        with = "witness_lines"
    )]
    pub semantic_difference_witnesses: Vec<SemanticDifferenceWitness>,
}

impl RegexRecord {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            use_count_registry_to_n_modules: BTreeMap::new(),
            use_count_internet_source_to_n_posts: BTreeMap::new(),
            supported_langs: Vec::new(),
            n_unique_inputs_tested: untested(),
            semantic_difference_witnesses: Vec::new(),
        }
    }

    /// Mark one more module using this pattern in the given registry.
    #[allow(dead_code)]
    pub fn used_in_registry(&mut self, registry: &str) {
        *self
            .use_count_registry_to_n_modules
            .entry(registry.to_string())
            .or_insert(0) += 1;
    }

    /// Mark one more post containing this pattern from the given source type.
    #[allow(dead_code)]
    pub fn used_in_internet_source(&mut self, source_type: &str) {
        *self
            .use_count_internet_source_to_n_posts
            .entry(source_type.to_string())
            .or_insert(0) += 1;
    }

    pub fn has_witnesses(&self) -> bool {
        !self.semantic_difference_witnesses.is_empty()
    }

    pub fn to_ndjson(&self) -> Result<String, RecordError> {
        ndjson_line(&Record::Regex(self.clone()))
    }

    pub fn from_ndjson(line: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// A pattern plus the candidate test strings each generator proposed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternWithInputs {
    pub pattern: String,

    /// Generator name -> strings it produced. Provenance is kept for
    /// reporting; correctness only needs the union.
    #[serde(rename = "stringsByProducer", default)]
    pub strings_by_producer: BTreeMap<String, Vec<String>>,
}

impl PatternWithInputs {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            strings_by_producer: BTreeMap::new(),
        }
    }

    /// Total inputs across producers, duplicates included.
    pub fn total_inputs(&self) -> usize {
        self.strings_by_producer.values().map(Vec::len).sum()
    }

    pub fn unique_inputs(&self) -> BTreeSet<&str> {
        self.strings_by_producer
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn to_ndjson(&self) -> Result<String, RecordError> {
        ndjson_line(&Record::PatternWithInputs(self.clone()))
    }

    pub fn from_ndjson(line: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Tagged union over every record subtype. Deserialization dispatches on the
/// `type` field; no runtime registry needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Record {
    Regex(RegexRecord),
    #[serde(rename = "RegexPatternAndInputs")]
    PatternWithInputs(PatternWithInputs),
}

/// Encode any record as a single JSON line with sorted keys.
pub fn ndjson_line<T: Serialize>(value: &T) -> Result<String, RecordError> {
    let line = serde_json::to_string(&serde_json::to_value(value)?)?;
    debug_assert!(!line.contains('\n'));
    Ok(line)
}

/// Read regex records from an NDJSON file. Blank lines are ignored; lines
/// that fail to parse are logged and skipped.
pub fn read_regex_records(path: &Path) -> Result<Vec<RegexRecord>, RecordError> {
    read_lines_lossy(path, RegexRecord::from_ndjson)
}

/// Read pattern-with-inputs records from an NDJSON file, skipping bad lines.
#[allow(dead_code)]
pub fn read_pattern_inputs(path: &Path) -> Result<Vec<PatternWithInputs>, RecordError> {
    read_lines_lossy(path, PatternWithInputs::from_ndjson)
}

fn read_lines_lossy<T>(
    path: &Path,
    parse: impl Fn(&str) -> Result<T, RecordError>,
) -> Result<Vec<T>, RecordError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse(line) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(
                    file = %path.display(),
                    line = lineno + 1,
                    %err,
                    "skipping unparseable record"
                );
            }
        }
    }
    Ok(records)
}

/// Write one record per line to `path`.
pub fn write_ndjson_file(path: &Path, lines: &[String]) -> Result<(), RecordError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

mod witness_lines {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::core::matching::SemanticDifferenceWitness;

    pub fn serialize<S: Serializer>(
        witnesses: &[SemanticDifferenceWitness],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let lines: Vec<String> = witnesses
            .iter()
            .map(SemanticDifferenceWitness::to_ndjson)
            .collect();
        serializer.collect_seq(lines)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<SemanticDifferenceWitness>, D::Error> {
        let lines = Vec::<String>::deserialize(deserializer)?;
        lines
            .iter()
            .map(|line| SemanticDifferenceWitness::from_ndjson(line).map_err(D::Error::custom))
            .collect()
    }
}
