//! Nixdex DB - Persistence for the version index
//!
//! Two stores live here:
//! - [`LedgerStore`]: the JSON index document consumed by the plugin,
//!   always written atomically
//! - [`CommitJournal`]: a sled tree of commits already merged, used to skip
//!   work when a run is resumed

mod error;
mod journal;
mod store;

pub use error::StoreError;
pub use journal::{CommitJournal, JournalRecord, PackageCoverage};
pub use store::LedgerStore;
