//! Integration tests for the labelsplit binary

use assert_cmd::Command;
use lopdf::{dictionary, Document, Object, Stream};
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("labelsplit").unwrap()
}

/// An A4 sheet; `content` is drawn on its single page
fn write_sheet(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ],
        "Contents" => Object::Reference(content_id),
        "Resources" => dictionary! {},
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog));

    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

// A black square inside the 6up cell at row 1, column 0
const ONE_LABEL: &[u8] = b"0 g 80 400 120 120 re f";

#[test]
fn test_split_writes_default_name() {
    let dir = TempDir::new().unwrap();
    let input = write_sheet(dir.path(), "orders.pdf", ONE_LABEL);

    cmd()
        .arg("split")
        .arg(&input)
        .arg("--output-dir")
        .arg(dir.path())
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Saved as"))
        .stdout(predicate::str::contains("Split_orders.pdf"))
        .stdout(predicate::str::contains("1 labels written, 5 of 6 cells blank"));

    let output = Document::load(dir.path().join("Split_orders.pdf")).unwrap();
    assert_eq!(output.get_pages().len(), 1);
}

#[test]
fn test_split_draws_progress_with_counts() {
    let dir = TempDir::new().unwrap();
    let input = write_sheet(dir.path(), "orders.pdf", ONE_LABEL);

    cmd()
        .arg("split")
        .arg(&input)
        .arg("-o")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("1/6 labels | ETA:"))
        .stderr(predicate::str::contains("[========================================] 100.0% | 6/6 labels"));
}

#[test]
fn test_split_json_report() {
    let dir = TempDir::new().unwrap();
    let input = write_sheet(dir.path(), "orders.pdf", ONE_LABEL);

    let assert = cmd()
        .args(["split", "--format", "6up", "--name", "picked", "--json"])
        .arg(&input)
        .arg("-o")
        .arg(dir.path())
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["labels_written"], 1);
    assert_eq!(report["total_cells"], 6);
    assert_eq!(report["blank_cells"], 5);
    assert!(dir.path().join("picked.pdf").exists());
}

#[test]
fn test_blank_sheet_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let input = write_sheet(dir.path(), "blank.pdf", b"");

    cmd()
        .arg("split")
        .arg(&input)
        .arg("-o")
        .arg(dir.path())
        .arg("-q")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No non-blank labels detected"));

    assert!(!dir.path().join("Split_blank.pdf").exists());
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();

    cmd()
        .arg("split")
        .arg(dir.path().join("missing.pdf"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Source file not found"));
}

#[test]
fn test_unknown_format_is_rejected() {
    cmd()
        .args(["split", "sheet.pdf", "--format", "12up"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown label format: 12up"));
}

#[test]
fn test_invalid_threshold_fails() {
    let dir = TempDir::new().unwrap();
    let input = write_sheet(dir.path(), "orders.pdf", ONE_LABEL);

    cmd()
        .arg("split")
        .arg(&input)
        .args(["--threshold", "1.5"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("blank threshold must be in (0, 1]"));
}

#[test]
fn test_scan_lists_every_cell() {
    let dir = TempDir::new().unwrap();
    let input = write_sheet(dir.path(), "orders.pdf", ONE_LABEL);

    cmd()
        .arg("scan")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("x mm    y mm"))
        // The 6up grid starts at its calibration offset of (2, -7) mm
        .stdout(predicate::str::contains("   1   0   0     2.0    -7.0"))
        .stdout(predicate::str::contains("1 of 6 cells hold a label"));

    let assert = cmd().arg("scan").arg(&input).arg("--json").assert().success();
    let scans: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let scans = scans.as_array().unwrap();
    assert_eq!(scans.len(), 6);
    let labels: Vec<_> = scans
        .iter()
        .filter(|scan| scan["blank"] == false)
        .map(|scan| (scan["cell"]["row"].clone(), scan["cell"]["col"].clone()))
        .collect();
    assert_eq!(labels, vec![(1.into(), 0.into())]);

    // Nothing written by a dry run
    assert!(!dir.path().join("Split_orders.pdf").exists());
}

#[test]
fn test_formats_listing() {
    cmd()
        .arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("6up"))
        .stdout(predicate::str::contains("45up"));

    let assert = cmd().args(["formats", "--json"]).assert().success();
    let formats: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(formats[0]["name"], "6up");
    assert_eq!(formats[0]["format"]["columns"], 2);
    assert_eq!(formats[1]["name"], "45up");
    assert_eq!(formats[1]["format"]["rows"], 9);
}
