use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let mut cmd = Command::new(cargo_bin!("novalnet-reconcile"));
    cmd.arg("tests/fixtures/outcomes.csv")
        .arg("--payments")
        .arg("tests/fixtures/payments.json")
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' \
             feature is not enabled. Falling back to In-Memory storage.",
        ))
        .stdout(predicate::str::contains("14799000000000001"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("novalnet-reconcile"));
    cmd.arg("tests/fixtures/outcomes.csv")
        .arg("--payments")
        .arg("tests/fixtures/payments.json")
        .arg("--db-path")
        .arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
