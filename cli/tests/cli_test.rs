//! End-to-end tests for the `docsync` binary.
//!
//! Only commands that stay off the database are exercised here; the Postgres
//! backed tests live next to the store and are `#[ignore]`d.

use std::path::Path;
use std::process::{Command, Output};

fn docsync(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_docsync"))
        .args(args)
        .current_dir(dir)
        .env_remove("DATABASE_URL")
        .env_remove("SNAPSHOT_URL")
        .env("RUST_LOG", "docsync=error")
        .output()
        .expect("failed to run docsync")
}

#[test]
fn dry_run_reports_what_would_be_written() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.ndjson");
    std::fs::write(
        &snapshot,
        concat!(
            "{\"id\": \"1\", \"created\": \"2024-01-01\", \"interactions\": \"[]\"}\n",
            "{\"id\": \"2\", \"created\": \"2024-01-02\", \"score\": \"8.0\"}\n",
            "{\"created\": \"2024-01-03\"}\n",
        ),
    )
    .unwrap();

    let output = docsync(
        &["dry-run", "--snapshot", snapshot.to_str().unwrap()],
        dir.path(),
    );

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("would write 2 documents from 3 rows (1 skipped)"), "{stdout}");
    assert!(stdout.contains("new_records=2 errors=1 total_processed=3"), "{stdout}");
}

#[test]
fn dry_run_rejects_unknown_formats() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.pkl");
    std::fs::write(&snapshot, b"\x80\x04").unwrap();

    let output = docsync(
        &["dry-run", "--snapshot", snapshot.to_str().unwrap()],
        dir.path(),
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported snapshot format"));
}

#[test]
fn sync_without_database_url_fails() {
    let dir = tempfile::tempdir().unwrap();

    let output = docsync(&["sync", "--snapshot", "snapshot.jsonl"], dir.path());

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("DATABASE_URL"));
}

#[test]
fn zero_batch_size_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().unwrap();

    let output = docsync(&["dry-run", "--snapshot", "x.json", "--batch-size", "0"], dir.path());

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}
