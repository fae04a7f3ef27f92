//! Stats command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use nixdex_db::CommitJournal;
use std::path::{Path, PathBuf};

use super::load_index;
use crate::helpers::default_journal_path;

/// Displays index and journal statistics
pub fn cmd_stats(index: &Path, journal: Option<PathBuf>) -> Result<()> {
    let ledger = load_index(index)?;

    println!("{}", "Index Statistics:".bright_cyan().bold());
    println!("  {}: {}", "Packages".bright_yellow(), ledger.package_count().to_string().bold());
    println!("  {}: {}", "Versions".bright_yellow(), ledger.version_count().to_string().bold());
    for name in ledger.package_names() {
        let count = ledger.versions(name).map_or(0, |v| v.len());
        println!("    {} {}", name, format!("({})", count).dimmed());
    }

    // Opening creates the directory, so only look at an existing journal
    let journal_path = journal.unwrap_or_else(|| default_journal_path(index));
    if journal_path.exists() {
        let journal = CommitJournal::open(&journal_path)
            .with_context(|| format!("Failed to open journal at {:?}", journal_path))?;
        println!(
            "  {}: {}",
            "Processed commits".bright_yellow(),
            journal.processed_commit_count().to_string().bold()
        );
    } else {
        println!("  {}: {}", "Processed commits".bright_yellow(), "no journal".dimmed());
    }
    Ok(())
}
