//! Tests for index persistence and the commit journal

use anyhow::Result;
use chrono::{TimeZone, Utc};
use nixdex_core::{CommitRef, EvaluationResult, Ledger, PackageSpec, Platform};
use nixdex_db::{CommitJournal, JournalRecord, LedgerStore, StoreError};
use tempfile::TempDir;

// ── fixtures ─────────────────────────────────────────────────────────────────

const SHA1: &str = "abc1234567890abcdef01234567890abcdef0123";
const SHA2: &str = "def1234567890abcdef01234567890abcdef0456";

fn commit(sha: &str, day: u32) -> CommitRef {
    CommitRef::new(sha, Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap())
}

fn sample_ledger() -> Ledger {
    let mut ledger = Ledger::new();
    ledger.merge_package(
        "ruby",
        &commit(SHA1, 13),
        &[EvaluationResult::new("ruby", Some("3.3.7".into()))],
    );
    ledger.merge_package(
        "ruby",
        &commit(SHA2, 15),
        &[EvaluationResult::new("ruby", Some("3.3.9".into()))
            .with_store_path("x86_64-linux", "/nix/store/aaa-ruby-3.3.9")],
    );
    ledger.merge_package(
        "ruby",
        &commit(SHA1, 14),
        &[EvaluationResult::new("ruby_3_3", Some("3.3.10".into()))],
    );
    ledger.merge_package(
        "python",
        &commit(SHA1, 13),
        &[EvaluationResult::new("python3", Some("3.11.7".into()))],
    );
    ledger
}

// ── LedgerStore ──────────────────────────────────────────────────────────────

#[test]
fn test_missing_file_loads_empty() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = LedgerStore::new(tmp.path().join("index.json"));
    assert!(store.load()?.is_empty());
    Ok(())
}

#[test]
fn test_blank_file_loads_empty() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("index.json");
    std::fs::write(&path, "  \n")?;
    assert!(LedgerStore::new(&path).load()?.is_empty());
    Ok(())
}

#[test]
fn test_corrupt_file_is_an_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("index.json");
    std::fs::write(&path, "{ \"pkgs\": { \"ruby\": [ }")?;

    let err = LedgerStore::new(&path).load().unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
    Ok(())
}

#[test]
fn test_save_and_load_roundtrip() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = LedgerStore::new(tmp.path().join("nested").join("index.json"));

    let ledger = sample_ledger();
    store.save(&ledger)?;
    assert_eq!(store.load()?, ledger);
    Ok(())
}

#[test]
fn test_document_layout() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = LedgerStore::new(tmp.path().join("index.json"));
    store.save(&sample_ledger())?;

    let raw = std::fs::read_to_string(store.path())?;
    let doc: serde_json::Value = serde_json::from_str(&raw)?;

    let entry = &doc["pkgs"]["ruby"]["3.3.9"];
    assert_eq!(entry["nixpkgs_commit"], SHA2);
    assert_eq!(entry["commit_timestamp"], "2025-01-15T12:00:00Z");
    assert_eq!(entry["store_paths"]["x86_64-linux"], "/nix/store/aaa-ruby-3.3.9");

    // no store_paths key when none were recorded
    assert!(doc["pkgs"]["ruby"]["3.3.7"].get("store_paths").is_none());
    Ok(())
}

#[test]
fn test_packages_sorted_and_versions_descending() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = LedgerStore::new(tmp.path().join("index.json"));
    store.save(&sample_ledger())?;

    let raw = std::fs::read_to_string(store.path())?;
    let python = raw.find("\"python\"").unwrap();
    let ruby = raw.find("\"ruby\"").unwrap();
    assert!(python < ruby);

    let v10 = raw.find("\"3.3.10\"").unwrap();
    let v9 = raw.find("\"3.3.9\"").unwrap();
    let v7 = raw.find("\"3.3.7\"").unwrap();
    assert!(v10 < v9 && v9 < v7, "versions should be newest first");
    Ok(())
}

#[test]
fn test_missing_store_path_for_platform_still_parses() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("index.json");
    std::fs::write(
        &path,
        r#"{"pkgs":{"ruby":{"3.3.8":{
            "nixpkgs_commit":"abc1234567890abcdef01234567890abcdef0123",
            "commit_timestamp":"2025-01-14T12:00:00+00:00",
            "store_paths":{"x86_64-linux":"/nix/store/ccc"}}}}}"#,
    )?;

    let ledger = LedgerStore::new(&path).load()?;
    let entry = ledger.get("ruby", "3.3.8").unwrap();
    assert_eq!(entry.store_path(&Platform::from("aarch64-darwin")), None);
    Ok(())
}

#[test]
fn test_save_replaces_previous_document() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = LedgerStore::new(tmp.path().join("index.json"));

    store.save(&sample_ledger())?;
    store.save(&Ledger::new())?;

    assert!(store.load()?.is_empty());
    // only the index itself is left behind, no temp files
    let leftovers = std::fs::read_dir(tmp.path())?.count();
    assert_eq!(leftovers, 1);
    Ok(())
}

// ── CommitJournal ────────────────────────────────────────────────────────────

const NO_SYSTEMS: &[&str] = &[];

fn spec(name: &str, attributes: &[&str]) -> PackageSpec {
    PackageSpec::new(name, attributes.iter().map(|a| a.to_string()).collect())
}

#[test]
fn test_commit_tracking() -> Result<()> {
    let tmp = TempDir::new()?;
    let journal = CommitJournal::open(tmp.path())?;
    let ruby = spec("ruby", &["ruby"]);
    let packages = vec![ruby.clone()];

    assert!(!journal.is_covered(SHA1, &packages, &[])?);
    let c = commit(SHA1, 1);
    journal.mark_processed(&c, &JournalRecord::new(&c).with_package(&ruby, NO_SYSTEMS))?;

    assert!(journal.is_covered(SHA1, &packages, &[])?);
    // Different SHA not affected
    assert!(!journal.is_covered(SHA2, &packages, &[])?);
    assert_eq!(journal.processed_commit_count(), 1);
    Ok(())
}

#[test]
fn test_new_package_is_not_covered() -> Result<()> {
    let tmp = TempDir::new()?;
    let journal = CommitJournal::open(tmp.path())?;
    let c = commit(SHA1, 1);
    let ruby = spec("ruby", &["ruby"]);
    journal.mark_processed(&c, &JournalRecord::new(&c).with_package(&ruby, &["x86_64-linux"]))?;

    let both = vec![spec("python", &["python3"]), ruby.clone()];
    assert!(!journal.is_covered(SHA1, &both, &[])?);

    let darwin = vec!["aarch64-darwin".to_string()];
    assert!(!journal.is_covered(SHA1, &[ruby], &darwin)?);
    Ok(())
}

#[test]
fn test_new_attribute_is_not_covered() -> Result<()> {
    let tmp = TempDir::new()?;
    let journal = CommitJournal::open(tmp.path())?;
    let c = commit(SHA1, 1);
    journal.mark_processed(
        &c,
        &JournalRecord::new(&c).with_package(&spec("ruby", &["ruby"]), NO_SYSTEMS),
    )?;

    let widened = spec("ruby", &["ruby", "ruby_3_2"]);
    assert!(!journal.is_covered(SHA1, &[widened], &[])?);
    // Dropping an attribute from the config keeps the commit covered
    assert!(journal.is_covered(SHA1, &[spec("ruby", &[])], &[])?);
    Ok(())
}

#[test]
fn test_records_are_widened_per_package() -> Result<()> {
    let tmp = TempDir::new()?;
    let journal = CommitJournal::open(tmp.path())?;
    let c = commit(SHA1, 1);
    let ruby = spec("ruby", &["ruby"]);
    let python = spec("python", &["python3"]);

    journal.mark_processed(&c, &JournalRecord::new(&c).with_package(&ruby, &["x86_64-linux"]))?;
    journal.mark_processed(&c, &JournalRecord::new(&c).with_package(&python, &["aarch64-darwin"]))?;

    let record = journal.get(SHA1)?.unwrap();
    assert_eq!(record.packages.len(), 2);
    assert_eq!(record.committed_at(), Some(c.timestamp));

    // Systems are tracked per package, never pooled across packages
    let darwin = vec!["aarch64-darwin".to_string()];
    assert!(journal.is_covered(SHA1, &[python], &darwin)?);
    assert!(!journal.is_covered(SHA1, &[ruby], &darwin)?);
    Ok(())
}

#[test]
fn test_journal_survives_reopen_and_clear() -> Result<()> {
    let tmp = TempDir::new()?;
    let c = commit(SHA2, 2);
    {
        let journal = CommitJournal::open(tmp.path())?;
        journal.mark_processed(&c, &JournalRecord::new(&c).with_package(&spec("ruby", &["ruby"]), NO_SYSTEMS))?;
        journal.flush()?;
    }

    let journal = CommitJournal::open(tmp.path())?;
    assert_eq!(journal.processed_commit_count(), 1);
    journal.clear()?;
    assert_eq!(journal.processed_commit_count(), 0);
    Ok(())
}

#[test]
fn test_invalid_sha_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    let journal = CommitJournal::open(tmp.path())?;
    assert!(matches!(journal.get("not-a-sha"), Err(StoreError::InvalidSha(_))));
    assert!(matches!(journal.get("abcd"), Err(StoreError::InvalidSha(_))));
    Ok(())
}
