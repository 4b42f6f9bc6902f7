//! CLI round trip: import the fixtures, then query the written record.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

static RECORD: OnceLock<PathBuf> = OnceLock::new();

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_versestore"));
    cmd.arg("--no-color");
    cmd
}

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// Import every fixture once per test run
fn record() -> PathBuf {
    RECORD
        .get_or_init(|| {
            let dir = std::env::temp_dir()
                .join("versestore_cli")
                .join(format!("test_{}", std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).expect("Failed to create temp dir");
            let out = dir.join("eng_web.json");
            let output = bin()
                .arg("import")
                .arg(fixtures())
                .args(["--selector", "lang=eng", "--selector", "abbr=web"])
                .arg("--mapping")
                .arg(fixtures().join("mapping.vrs"))
                .arg("--out")
                .arg(&out)
                .output()
                .expect("Failed to run import");
            assert!(
                output.status.success(),
                "import failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            out
        })
        .clone()
}

fn run(args: &[&str]) -> String {
    let output = bin()
        .arg(args[0])
        .arg(record())
        .args(&args[1..])
        .output()
        .expect("Failed to run versestore");
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_cv_prints_dump_format() {
    let out = run(&["cv", "GEN", "1:2"]);
    assert!(out.contains("chapter/1"));
    assert!(out.contains("formless"));
    assert!(out.contains(">footnote<"));
    assert!(out.contains("+verse/2+"));
}

#[test]
fn test_cv_json() {
    let out = run(&["cv", "LEV", "1:1", "--json"]);
    let groups: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(groups.as_array().map(Vec::len), Some(1));
    assert!(groups[0]["openScopes"].is_array());
}

#[test]
fn test_search() {
    let out = run(&["search", "light"]);
    assert!(out.contains("GEN:"));
    let none = run(&["search", "light", "Reuben", "--all"]);
    assert!(none.contains("No matches"));
    let regex = run(&["search", "^Reub", "--regex"]);
    assert!(regex.contains("EXO:"));
}

#[test]
fn test_stats_and_dump() {
    let stats = run(&["stats"]);
    assert!(stats.contains("documents:  3"));
    assert!(stats.contains("hasMapping"));
    let dump = run(&["dump", "EXO"]);
    assert!(dump.contains("+blockTag/p+"));
    assert!(dump.contains("Reuben"));
}

#[test]
fn test_bad_reference_fails() {
    let output = bin()
        .args(["cv"])
        .arg(record())
        .args(["GEN", "5-3"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
