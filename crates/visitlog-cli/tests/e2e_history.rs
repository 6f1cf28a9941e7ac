//! E2E tests for the `vl` binary: record → history → expand → verify → erase.
//!
//! Each test runs `vl` as a subprocess in an isolated temp directory, so the
//! default `.visitlog/history.sqlite3` lands inside it.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn vl_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vl"));
    cmd.current_dir(dir);
    cmd.env("VISITLOG_LOG", "error");
    cmd.env_remove("VISITLOG_DB");
    cmd.env_remove("VISITLOG_BATCH_SIZE");
    cmd.env_remove("VISITLOG_FORMAT");
    cmd
}

fn json_of(output: &std::process::Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn record(dir: &Path, entity: &str, before: &str, after: &str) -> Value {
    let output = vl_cmd(dir)
        .args([
            "record",
            entity,
            "--before",
            before,
            "--after",
            after,
            "--user-id",
            "u-1",
            "--user-name",
            "Dana",
            "--json",
        ])
        .output()
        .expect("record should not crash");
    json_of(&output)
}

fn history(dir: &Path, entity: &str) -> Value {
    let output = vl_cmd(dir)
        .args(["history", entity, "--json"])
        .output()
        .expect("history should not crash");
    json_of(&output)
}

fn agenda(text: &str) -> String {
    serde_json::json!({ "agenda": text }).to_string()
}

fn record_agenda_edits(dir: &Path, entity: &str, n: usize) {
    let mut previous = agenda("");
    for i in 1..=n {
        let next = agenda(&format!("Agenda {i}"));
        let out = record(dir, entity, &previous, &next);
        assert_eq!(out["captured"].as_array().map(Vec::len), Some(1));
        previous = next;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn record_reports_captured_events() {
    let dir = TempDir::new().expect("tempdir");
    let out = record(
        dir.path(),
        "visit-1",
        r#"{"agenda":"Plan A","notes":[{"id":"n1","text":"old"}]}"#,
        r#"{"agenda":"Plan B","notes":[{"id":"n2","text":"new"}]}"#,
    );

    assert_eq!(out["entityId"], "visit-1");
    assert_eq!(out["detected"], 3);
    let types: Vec<&str> = out["captured"]
        .as_array()
        .expect("captured array")
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert_eq!(types, vec!["agenda_edit", "note_add", "note_delete"]);
    assert_eq!(out["captured"][1]["metadata"]["noteId"], "n2");
    assert_eq!(out["captured"][0]["userName"], "Dana");
    assert!(dir.path().join(".visitlog/history.sqlite3").exists());
}

#[test]
fn formatting_only_change_records_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let out = record(dir.path(), "visit-1", &agenda("<p>Plan A</p>"), &agenda("Plan A"));
    assert_eq!(out["detected"], 0);
    assert_eq!(out["captured"].as_array().map(Vec::len), Some(0));

    let view = history(dir.path(), "visit-1");
    assert_eq!(view["recentEvents"].as_array().map(Vec::len), Some(0));
}

#[test]
fn visit_42_end_to_end() {
    let dir = TempDir::new().expect("tempdir");
    record_agenda_edits(dir.path(), "visit-42", 23);

    let view = history(dir.path(), "visit-42");
    let snapshots = view["snapshots"].as_array().expect("snapshots");
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0]["version"], 2);
    assert_eq!(snapshots[0]["title"], "Version 2");
    assert_eq!(snapshots[1]["eventCount"], 10);
    assert_eq!(snapshots[1]["summary"], "10 agenda edits");
    let recent = view["recentEvents"].as_array().expect("recent");
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0]["afterValue"], "Agenda 23");

    let snap_id = snapshots[1]["id"].as_str().expect("snapshot id");
    let expanded = json_of(
        &vl_cmd(dir.path())
            .args(["expand", "visit-42", snap_id, "--json"])
            .output()
            .expect("expand"),
    );
    let events = expanded["events"].as_array().expect("events");
    assert_eq!(events.len(), 10);
    assert_eq!(events[0]["afterValue"], "Agenda 1");

    vl_cmd(dir.path())
        .args(["verify", "visit-42", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok\tvisit-42"));

    let erased = json_of(
        &vl_cmd(dir.path())
            .args(["erase", "visit-42", "--yes", "--json"])
            .output()
            .expect("erase"),
    );
    assert_eq!(erased["eventsDeleted"], 23);
    assert_eq!(erased["snapshotsDeleted"], 2);

    let view = history(dir.path(), "visit-42");
    assert_eq!(view["snapshots"].as_array().map(Vec::len), Some(0));
    assert_eq!(view["recentEvents"].as_array().map(Vec::len), Some(0));
}

#[test]
fn erase_without_yes_is_refused() {
    let dir = TempDir::new().expect("tempdir");
    record_agenda_edits(dir.path(), "visit-2", 2);

    vl_cmd(dir.path())
        .args(["erase", "visit-2", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("confirmation_required"));

    let view = history(dir.path(), "visit-2");
    assert_eq!(view["recentEvents"].as_array().map(Vec::len), Some(2));
}

#[test]
fn expand_unknown_snapshot_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    record_agenda_edits(dir.path(), "visit-3", 1);

    vl_cmd(dir.path())
        .args(["expand", "visit-3", "snap-000000000000", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
}

#[test]
fn config_batch_size_is_respected() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(dir.path().join(".visitlog")).expect("mkdir");
    std::fs::write(
        dir.path().join(".visitlog/config.toml"),
        "[history]\nbatch_size = 2\n",
    )
    .expect("write config");

    record_agenda_edits(dir.path(), "visit-4", 5);
    let view = history(dir.path(), "visit-4");
    assert_eq!(view["snapshots"].as_array().map(Vec::len), Some(2));
    assert_eq!(view["recentEvents"].as_array().map(Vec::len), Some(1));
}

#[test]
fn zero_batch_size_is_a_config_error() {
    let dir = TempDir::new().expect("tempdir");
    vl_cmd(dir.path())
        .env("VISITLOG_BATCH_SIZE", "0")
        .args(["history", "visit-5", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn db_flag_overrides_default_location() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("custom/history.db");
    vl_cmd(dir.path())
        .args([
            "--db",
            db.to_str().expect("utf8 path"),
            "record",
            "visit-6",
            "--after",
            &agenda("x"),
            "--user-id",
            "u",
            "--user-name",
            "U",
            "--json",
        ])
        .assert()
        .success();
    assert!(db.exists());
    assert!(!dir.path().join(".visitlog/history.sqlite3").exists());
}

#[test]
fn manual_compact_backfills_with_override() {
    let dir = TempDir::new().expect("tempdir");
    record_agenda_edits(dir.path(), "visit-7", 7);

    let report = json_of(
        &vl_cmd(dir.path())
            .args(["compact", "visit-7", "--batch-size", "3", "--json"])
            .output()
            .expect("compact"),
    );
    assert_eq!(report["snapshotsCreated"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["eventsCompacted"], 6);
    assert_eq!(report["tailLen"], 1);
}

#[test]
fn pretty_history_shows_sections() {
    let dir = TempDir::new().expect("tempdir");
    record_agenda_edits(dir.path(), "visit-8", 11);

    vl_cmd(dir.path())
        .args(["history", "visit-8", "--format", "pretty"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recent Edits (visit-8)"))
        .stdout(predicate::str::contains("Version 1"))
        .stdout(predicate::str::contains("10 agenda edits"));
}
