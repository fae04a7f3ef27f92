//! Command implementations

mod find;
mod index;
mod stats;
mod versions;

pub use find::cmd_find;
pub use index::{cmd_index, IndexArgs};
pub use stats::cmd_stats;
pub use versions::cmd_versions;

use anyhow::{Context, Result};
use nixdex_core::Ledger;
use nixdex_db::LedgerStore;
use std::path::Path;

/// Loads the index for a read-only command
fn load_index(path: &Path) -> Result<Ledger> {
    LedgerStore::new(path)
        .load()
        .with_context(|| format!("Failed to load index {:?}", path))
}
