//! Versions command implementation

use anyhow::Result;
use colored::Colorize;
use nixdex_core::{list_versions, Platform};
use std::path::Path;
use tabled::{
    settings::{object::Rows, Color, Modify, Style},
    Table,
};

use super::load_index;
use crate::helpers::similar_packages;
use crate::output::VersionRow;

/// Lists the versions of `package`, newest first
pub fn cmd_versions(package: &str, index: &Path, system: Option<&str>, limit: usize, show_all: bool) -> Result<()> {
    let ledger = load_index(index)?;
    let platform = system.map(Platform::from);

    let mut found = match list_versions(&ledger, package, platform.as_ref()) {
        Ok(found) => found,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            if ledger.versions(package).is_none() {
                let suggestions = similar_packages(&ledger, package);
                if !suggestions.is_empty() {
                    eprintln!("\n{} Did you mean: {}", "💡".yellow(), suggestions.join(", ").bold());
                }
            }
            std::process::exit(1);
        }
    };
    found.reverse();

    let total_count = found.len();
    let newest = found[0].0;
    let oldest = found[total_count - 1].0;

    println!("\n{} {}", "📦".bright_cyan(), package.bold().bright_white());
    println!("{}", "━".repeat(60).bright_black());
    println!(
        "  {} {}  {} {}  {} {}",
        "Total:".bright_yellow(),
        total_count.to_string().bold(),
        "Newest:".bright_green(),
        newest.green().bold(),
        "Oldest:".bright_blue(),
        oldest.blue()
    );
    println!();

    let display_limit = if show_all { total_count } else { limit.min(total_count) };
    let rows: Vec<VersionRow> = found
        .iter()
        .take(display_limit)
        .map(|(version, entry)| VersionRow::new(version, entry, platform.as_ref()))
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Color::FG_BRIGHT_CYAN));
    println!("{}", table);

    if display_limit < total_count {
        println!(
            "\n  {} and {} more versions (use {} to see all)",
            "...".dimmed(),
            (total_count - display_limit).to_string().bold(),
            "-a".bright_cyan()
        );
    }

    Ok(())
}
