//! Find command implementation

use anyhow::{bail, Result};
use colored::Colorize;
use nixdex_core::{find_artifact, LookupError, Platform};
use std::path::Path;

use super::load_index;
use crate::helpers::{similar_packages, split_package_spec};

/// Prints the store path of `package@version` on `system`
pub fn cmd_find(spec: &str, index: &Path, system: &str) -> Result<()> {
    let Some((package, version)) = split_package_spec(spec) else {
        bail!("Expected <package>@<version>, got '{}'", spec);
    };
    let ledger = load_index(index)?;

    match find_artifact(&ledger, package, version, &Platform::from(system)) {
        Ok(path) => {
            println!("{}", path);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            if matches!(e, LookupError::UnknownPackage { .. }) {
                let suggestions = similar_packages(&ledger, package);
                if !suggestions.is_empty() {
                    eprintln!("\n{} Did you mean: {}", "💡".yellow(), suggestions.join(", ").bold());
                }
            }
            std::process::exit(1);
        }
    }
}
