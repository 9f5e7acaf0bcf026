//! Input generator orchestration
//!
//! Fans a pattern out to several independent string-generation backends
//! (grammar-derivation, mutation-based, automaton-based, ...), each an
//! external driver speaking the query-file/output-file protocol. A generator
//! that crashes, times out, or emits garbage contributes nothing; the
//! orchestration itself never fails a pattern.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{PatternWithInputs, RecordError, RegexRecord};

use super::pool::CancelToken;
use super::process::{run_with_deadline, scratch_file, timeout_from_secs, ProcessOutcome};

/// Probe string added to every candidate pool, so at least one input is
/// tested even when every generator fails.
pub const PROBE_INPUT: &str = "a";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// One external input-generation backend.
#[derive(Debug, Clone)]
pub struct GeneratorSpec {
    pub name: String,
    pub driver: PathBuf,
    /// Whether the driver accepts `--seed` (deterministic generators don't).
    pub supports_seed: bool,
    /// Whether the driver accepts `--num-inputs`.
    pub supports_num_inputs: bool,
}

/// The set of generator drivers for one analysis run. Built explicitly at
/// startup; no ambient registry.
#[derive(Debug, Clone, Default)]
pub struct GeneratorRegistry {
    generators: Vec<GeneratorSpec>,
}

impl GeneratorRegistry {
    #[allow(dead_code)]
    pub fn new(generators: Vec<GeneratorSpec>) -> Self {
        Self { generators }
    }

    /// Discover `query-<name>` drivers in a directory. Known generators keep
    /// their capability flags; unrecognized drivers are assumed to take only
    /// the query/output files and a timeout.
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        let mut generators = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(name) = stem.strip_prefix("query-") else {
                continue;
            };
            let (supports_seed, supports_num_inputs) = match name {
                "rex" => (true, true),
                "brics" => (true, false),
                // EGRET, ReScue, and MutRex are deterministic.
                _ => (false, false),
            };
            generators.push(GeneratorSpec {
                name: name.to_string(),
                driver: path,
                supports_seed,
                supports_num_inputs,
            });
        }
        generators.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { generators })
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// At most this many inputs kept per generator; -1 means unbounded.
    pub max_inputs_per_generator: i64,
    /// Shared RNG seed, propagated to seedable generators and to the
    /// down-sampling step for reproducibility.
    pub seed: u64,
    /// Per-generator wall-clock budget in seconds; -1 means unbounded.
    pub timeout_secs: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_inputs_per_generator: 1000,
            seed: 1,
            timeout_secs: 10.0,
        }
    }
}

impl GenerateOptions {
    fn cap(&self) -> Option<usize> {
        usize::try_from(self.max_inputs_per_generator).ok()
    }
}

/// Query every generator for candidate inputs to `record.pattern`.
///
/// Producer names are qualified as `<generator>-<producer>` since one driver
/// may multiplex several underlying producers.
pub fn generate_inputs(
    record: &RegexRecord,
    registry: &GeneratorRegistry,
    opts: &GenerateOptions,
    cancel: &CancelToken,
) -> Result<PatternWithInputs, GenerateError> {
    let mut pool = PatternWithInputs::new(record.pattern.clone());

    for generator in &registry.generators {
        if cancel.is_cancelled() {
            break;
        }
        match query_generator(generator, record, opts, cancel) {
            Ok(produced) => {
                for (producer, inputs) in produced.strings_by_producer {
                    let kept = match opts.cap() {
                        Some(cap) if inputs.len() > cap => {
                            debug!(
                                generator = %generator.name,
                                %producer,
                                produced = inputs.len(),
                                cap,
                                "down-sampling generator output"
                            );
                            sample_up_to(inputs, cap, mix_seed(opts.seed, &producer))
                        }
                        _ => inputs,
                    };
                    info!(generator = %generator.name, %producer, n = kept.len(), "got inputs");
                    pool.strings_by_producer
                        .insert(format!("{}-{}", generator.name, producer), kept);
                }
            }
            Err(err) => {
                warn!(
                    generator = %generator.name,
                    pattern = %record.pattern,
                    %err,
                    "generator contributed nothing"
                );
            }
        }
    }

    info!(
        pattern = %record.pattern,
        n_producers = pool.strings_by_producer.len(),
        n_total_inputs = pool.total_inputs(),
        "input generation complete"
    );
    Ok(pool)
}

/// Collapse a by-producer pool into the final candidate list: apply the
/// per-generator cap, union, dedupe, and unconditionally include the probe
/// string. Deterministic for a fixed seed.
pub fn candidate_pool(pool: &PatternWithInputs, opts: &GenerateOptions) -> Vec<String> {
    let mut unique = BTreeSet::new();
    for (producer, inputs) in &pool.strings_by_producer {
        let kept: Vec<String> = match opts.cap() {
            Some(cap) if inputs.len() > cap => {
                sample_up_to(inputs.clone(), cap, mix_seed(opts.seed, producer))
            }
            _ => inputs.clone(),
        };
        unique.extend(kept);
    }
    unique.insert(PROBE_INPUT.to_string());
    unique.into_iter().collect()
}

fn query_generator(
    generator: &GeneratorSpec,
    record: &RegexRecord,
    opts: &GenerateOptions,
    cancel: &CancelToken,
) -> Result<PatternWithInputs, GenerateError> {
    let mut query_file = scratch_file("rexdiff-gen-query-")?;
    query_file.write_all(record.to_ndjson()?.as_bytes())?;
    query_file.flush()?;
    let out_file = scratch_file("rexdiff-gen-out-")?;

    let mut command = Command::new(&generator.driver);
    command
        .arg("--regex-file")
        .arg(query_file.path())
        .arg("--out-file")
        .arg(out_file.path())
        .arg("--timeout")
        .arg(opts.timeout_secs.to_string())
        .stdout(Stdio::null());
    if generator.supports_seed {
        command.arg("--seed").arg(opts.seed.to_string());
    }
    if generator.supports_num_inputs {
        if let Some(cap) = opts.cap() {
            command.arg("--num-inputs").arg(cap.to_string());
        }
    }

    let outcome = run_with_deadline(&mut command, timeout_from_secs(opts.timeout_secs), cancel)?;
    if !outcome.success() {
        match &outcome {
            ProcessOutcome::Completed(status) => {
                warn!(generator = %generator.name, ?status, "generator exited non-zero, salvaging");
            }
            ProcessOutcome::TimedOut => {
                warn!(generator = %generator.name, "generator timed out, salvaging partial output");
            }
            ProcessOutcome::Cancelled => {
                return Ok(PatternWithInputs::new(record.pattern.clone()));
            }
        }
    }

    // Whatever the driver flushed before exiting (or being killed) is kept.
    let contents = std::fs::read_to_string(out_file.path())?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(PatternWithInputs::new(record.pattern.clone()));
    }
    Ok(PatternWithInputs::from_ndjson(trimmed)?)
}

/// Keep a uniform pseudo-random subset of `cap` items. Fisher-Yates over an
/// LCG keyed by `seed`, so the same seed always keeps the same subset.
fn sample_up_to(items: Vec<String>, cap: usize, seed: u64) -> Vec<String> {
    let n = items.len();
    if n <= cap {
        return items;
    }
    let mut indices: Vec<usize> = (0..n).collect();
    let mut state = seed;
    for i in (1..n).rev() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        indices.swap(i, j);
    }
    indices.truncate(cap);
    indices.sort_unstable();

    let mut keep = vec![false; n];
    for i in indices {
        keep[i] = true;
    }
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, kept)| kept.then_some(item))
        .collect()
}

/// Derive a per-producer seed from the shared one (FNV-1a mix).
fn mix_seed(seed: u64, label: &str) -> u64 {
    let mut h = 0xcbf29ce484222325u64 ^ seed;
    for b in label.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
