//! CLI end-to-end tests
//!
//! Exercise the binary against fake shell-script backends standing in for
//! the external generator and language drivers.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn rexdiff() -> Command {
    Command::new(assert_cmd::cargo_bin!("rexdiff"))
}

fn write_driver(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A language driver with a canned JSON response.
fn canned_driver(dir: &Path, name: &str, response: &str) {
    write_driver(dir, name, &format!("#!/bin/sh\nprintf '{}'\n", response));
}

fn regex_file(dir: &Path, patterns: &[&str]) -> PathBuf {
    let path = dir.join("regexes.ndjson");
    let lines: Vec<String> = patterns
        .iter()
        .map(|p| format!(r#"{{"pattern": "{}", "type": "Regex"}}"#, p))
        .collect();
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

#[test]
fn test_help() {
    rexdiff().arg("--help").assert().success();
}

#[test]
fn test_version() {
    rexdiff()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rexdiff"));
}

#[test]
fn test_no_command_prints_usage() {
    rexdiff()
        .assert()
        .success()
        .stderr(predicate::str::contains("Usage: rexdiff"));
}

#[test]
fn test_missing_regex_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    rexdiff()
        .args([
            "test",
            "--regex-file",
            "/nonexistent/regexes.ndjson",
            "--out-file",
            dir.path().join("out.ndjson").to_str().unwrap(),
            "--drivers-dir",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_pipeline_detects_witness() {
    let dir = tempfile::tempdir().unwrap();
    let drivers = dir.path().join("drivers");
    fs::create_dir(&drivers).unwrap();
    canned_driver(
        &drivers,
        "check-regex-behavior-in-python.py",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 1, "matchContents": {"matchedString": "a", "captureGroups": []}}]}"#,
    );
    canned_driver(
        &drivers,
        "check-regex-behavior-in-go",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 0}]}"#,
    );

    let regexes = regex_file(dir.path(), &["a"]);
    let out = dir.path().join("tested.ndjson");

    rexdiff()
        .args([
            "test",
            "--regex-file",
            regexes.to_str().unwrap(),
            "--out-file",
            out.to_str().unwrap(),
            "--drivers-dir",
            drivers.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("With witnesses:    1"));

    let tested = fs::read_to_string(&out).unwrap();
    assert!(tested.contains(r#""nUniqueInputsTested":1"#));
    assert!(tested.contains("semanticDifferenceWitnesses"));
    assert!(tested.contains("python"));
    assert!(tested.contains("go"));
}

#[test]
fn test_hanging_language_degrades_gracefully() {
    // A pathological pattern, a hanging engine, and a 1-second budget: the
    // hung language contributes nothing and the witness still comes from the
    // languages that answered.
    let pathological = "a".repeat(40) + "!";
    let dir = tempfile::tempdir().unwrap();
    let drivers = dir.path().join("drivers");
    fs::create_dir(&drivers).unwrap();

    canned_driver(
        &drivers,
        "check-regex-behavior-in-python.py",
        &format!(
            r#"{{"validPattern": true, "results": [{{"input": "a", "matched": 1, "matchContents": {{"matchedString": "a", "captureGroups": ["a"]}}}}, {{"input": "{0}", "matched": 0}}]}}"#,
            pathological
        ),
    );
    canned_driver(
        &drivers,
        "check-regex-behavior-in-go",
        &format!(
            r#"{{"validPattern": true, "results": [{{"input": "a", "matched": 0}}, {{"input": "{0}", "matched": 0}}]}}"#,
            pathological
        ),
    );
    write_driver(&drivers, "check-regex-behavior-in-java.pl", "#!/bin/sh\nsleep 30\n");

    // A generator proposing the pathological input.
    let generators = dir.path().join("generators");
    fs::create_dir(&generators).unwrap();
    write_driver(
        &generators,
        "query-rex",
        &format!(
            concat!(
                "#!/bin/sh\n",
                "shift; shift; shift\n",
                "out=$1\n",
                r#"printf '{{"type":"RegexPatternAndInputs","pattern":"(a+)+$","stringsByProducer":{{"rex":["{0}"]}}}}' > "$out""#,
                "\n"
            ),
            pathological
        ),
    );

    let regexes = regex_file(dir.path(), &["(a+)+$"]);
    let out = dir.path().join("tested.ndjson");

    rexdiff()
        .args([
            "test",
            "--regex-file",
            regexes.to_str().unwrap(),
            "--out-file",
            out.to_str().unwrap(),
            "--drivers-dir",
            drivers.to_str().unwrap(),
            "--generators-dir",
            generators.to_str().unwrap(),
            "--eval-timeout",
            "1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("With witnesses:    1"));

    let tested = fs::read_to_string(&out).unwrap();
    // Probe "a" plus the pathological input.
    assert!(tested.contains(r#""nUniqueInputsTested":2"#));
    // The hung language appears in no witness.
    assert!(!tested.contains("java"));
    assert!(tested.contains("python"));
    assert!(tested.contains("go"));
}

#[test]
fn test_syntax_invalid_language_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let drivers = dir.path().join("drivers");
    fs::create_dir(&drivers).unwrap();
    canned_driver(
        &drivers,
        "check-regex-behavior-in-python.py",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 1, "matchContents": {"matchedString": "a", "captureGroups": []}}]}"#,
    );
    canned_driver(
        &drivers,
        "check-regex-behavior-in-ruby.rb",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 0}]}"#,
    );
    canned_driver(
        &drivers,
        "check-regex-behavior-in-rust",
        r#"{"validPattern": false}"#,
    );

    let regexes = regex_file(dir.path(), &["a"]);
    let out = dir.path().join("tested.ndjson");

    rexdiff()
        .args([
            "test",
            "--regex-file",
            regexes.to_str().unwrap(),
            "--out-file",
            out.to_str().unwrap(),
            "--drivers-dir",
            drivers.to_str().unwrap(),
        ])
        .assert()
        .success();

    let tested = fs::read_to_string(&out).unwrap();
    assert!(tested.contains("semanticDifferenceWitnesses"));
    // The language that rejected the pattern's syntax is absent everywhere.
    assert!(!tested.contains("rust"));
}

#[test]
fn test_gen_inputs_writes_pattern_records() {
    let dir = tempfile::tempdir().unwrap();
    let generators = dir.path().join("generators");
    fs::create_dir(&generators).unwrap();
    write_driver(
        &generators,
        "query-rex",
        concat!(
            "#!/bin/sh\n",
            "shift; shift; shift\n",
            "out=$1\n",
            r#"printf '{"type":"RegexPatternAndInputs","pattern":"a","stringsByProducer":{"rex":["aa","ab"]}}' > "$out""#,
            "\n"
        ),
    );

    let regexes = regex_file(dir.path(), &["a"]);
    let out = dir.path().join("inputs.ndjson");

    rexdiff()
        .args([
            "gen-inputs",
            "--regex-file",
            regexes.to_str().unwrap(),
            "--out-file",
            out.to_str().unwrap(),
            "--generators-dir",
            generators.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unique inputs:     2"));

    let generated = fs::read_to_string(&out).unwrap();
    assert!(generated.contains(r#""type":"RegexPatternAndInputs""#));
    assert!(generated.contains("rex-rex"));
}

#[test]
fn test_analyze_after_test() {
    let dir = tempfile::tempdir().unwrap();
    let drivers = dir.path().join("drivers");
    fs::create_dir(&drivers).unwrap();
    canned_driver(
        &drivers,
        "check-regex-behavior-in-python.py",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 1, "matchContents": {"matchedString": "a", "captureGroups": []}}]}"#,
    );
    canned_driver(
        &drivers,
        "check-regex-behavior-in-go",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 0}]}"#,
    );

    let regexes = regex_file(dir.path(), &["a"]);
    let tested = dir.path().join("tested.ndjson");

    rexdiff()
        .args([
            "test",
            "--regex-file",
            regexes.to_str().unwrap(),
            "--out-file",
            tested.to_str().unwrap(),
            "--drivers-dir",
            drivers.to_str().unwrap(),
        ])
        .assert()
        .success();

    rexdiff()
        .args(["analyze", "--regex-file", tested.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("match witness"))
        .stdout(predicate::str::contains("Go - Python"))
        .stdout(predicate::str::contains("unknown"));
}

#[test]
fn test_analyze_json_format() {
    let dir = tempfile::tempdir().unwrap();
    // Records that were tested but found no witnesses.
    let path = dir.path().join("tested.ndjson");
    fs::write(
        &path,
        r#"{"pattern": "abc", "type": "Regex", "nUniqueInputsTested": 3}"#,
    )
    .unwrap();

    rexdiff()
        .args([
            "analyze",
            "--regex-file",
            path.to_str().unwrap(),
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"no_witness\": 1"))
        .stdout(predicate::str::contains("\"n_regexes\": 1"));
}

#[test]
fn test_drivers_dir_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let drivers = dir.path().join("drivers");
    fs::create_dir(&drivers).unwrap();
    canned_driver(
        &drivers,
        "check-regex-behavior-in-python.py",
        r#"{"validPattern": true, "results": [{"input": "a", "matched": 0}]}"#,
    );

    let regexes = regex_file(dir.path(), &["a"]);
    let out = dir.path().join("tested.ndjson");

    rexdiff()
        .env("REXDIFF_DRIVERS_DIR", drivers.to_str().unwrap())
        .args([
            "test",
            "--regex-file",
            regexes.to_str().unwrap(),
            "--out-file",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("With witnesses:    0"));
}
