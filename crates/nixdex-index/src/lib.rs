//! Nixdex Index - Indexing engine for Nixpkgs package versions
//!
//! This crate is responsible for:
//! - Discovering one representative commit per time window via the GitHub API
//! - Positioning a sparse Nixpkgs checkout at each commit
//! - Evaluating configured attributes (versions, optionally store paths)
//! - Merging results into the ledger and persisting it with checkpoints
//!
//! The history API, checkout and evaluator are traits so the [`Driver`] can
//! run against the in-memory [`fakes`].

pub mod checkout;
pub mod discovery;
pub mod driver;
pub mod evaluator;
pub mod fakes;
pub mod formatting;
pub mod github;
pub mod process;
pub mod stats;

pub use checkout::{Checkout, CheckoutError, CheckoutErrorKind, GitCheckout};
pub use discovery::{windows, CommitDiscovery, DiscoveryRequest, Order, Window};
pub use driver::{Driver, DriverOptions};
pub use evaluator::{
    classify_stderr, AttributeEvaluator, EvalError, EvalFailure, EvalFailureKind, Evaluator, NixEvaluator,
    PackageEvaluation,
};
pub use github::{DiscoveryError, GitHubClient, HistoryApi, RateLimit, RetryPolicy};
pub use stats::{IndexStats, Phase};
