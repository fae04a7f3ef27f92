//! Index command implementation

use anyhow::{Context, Result};
use nixdex_core::{parse_instant, parse_interval, IndexConfig, Ledger};
use nixdex_db::{CommitJournal, LedgerStore};
use nixdex_index::{Driver, DriverOptions, GitCheckout, GitHubClient, NixEvaluator, Order};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use crate::helpers::default_journal_path;

/// Arguments of `nixpkgs-index index`
pub struct IndexArgs {
    pub config: PathBuf,
    pub index: PathBuf,
    pub repo: PathBuf,
    pub since: Option<String>,
    pub until: Option<String>,
    pub interval: String,
    pub max_steps: Option<usize>,
    pub order: Order,
    pub checkpoint_every: usize,
    pub jobs: usize,
    pub rebuild: bool,
    pub journal: Option<PathBuf>,
    pub no_journal: bool,
    pub github_token: Option<String>,
}

/// Indexes Nixpkgs history into the version index
pub async fn cmd_index(args: IndexArgs) -> Result<()> {
    let config = IndexConfig::load(&args.config)
        .with_context(|| format!("Invalid configuration {:?}", args.config))?;

    let since = args
        .since
        .as_deref()
        .map(parse_instant)
        .transpose()
        .context("Invalid --since")?;
    let until = args
        .until
        .as_deref()
        .map(parse_instant)
        .transpose()
        .context("Invalid --until")?;
    let step = parse_interval(&args.interval).context("Invalid --interval")?;

    let store = LedgerStore::new(&args.index);
    let mut ledger = if args.rebuild {
        log::info!("Rebuilding index {:?} from scratch", args.index);
        Ledger::new()
    } else {
        store
            .load()
            .with_context(|| format!("Failed to load index {:?}", args.index))?
    };
    log::info!(
        "Loaded index with {} packages, {} versions",
        ledger.package_count(),
        ledger.version_count()
    );

    log::info!("Preparing Nixpkgs checkout at {:?}", args.repo);
    let checkout = GitCheckout::init(&args.repo, &config.github.remote, config.evaluation.fetch_timeout())
        .await
        .context("Failed to prepare Nixpkgs checkout")?;
    let history = GitHubClient::new(&config.github, args.github_token)
        .context("Failed to create GitHub client")?;
    let evaluator = NixEvaluator::new(config.evaluation.eval_timeout());

    // Opened last so a failed setup leaves the journal untouched
    let journal = if args.no_journal {
        None
    } else {
        let path = args.journal.unwrap_or_else(|| default_journal_path(&args.index));
        let journal = CommitJournal::open(&path)
            .with_context(|| format!("Failed to open journal at {:?}", path))?;
        if args.rebuild {
            journal.clear().context("Failed to clear journal")?;
        }
        log::info!("Journal: {} commits already processed", journal.processed_commit_count());
        Some(journal)
    };

    let options = DriverOptions {
        since,
        until,
        step,
        order: args.order,
        max_steps: args.max_steps,
        checkpoint_every: args.checkpoint_every,
        jobs: args.jobs,
    };
    log::info!(
        "Indexing {} packages on {} (step {}h, {:?})",
        config.packages.len(),
        config.branch,
        step.num_hours(),
        options.order
    );

    let mut driver = Driver::new(&config, history, checkout, evaluator, store, options);
    if let Some(journal) = journal {
        driver = driver.with_journal(journal);
    }

    let stop = driver.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current commit");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let stats = driver.run(&mut ledger).await.context("Indexing failed")?;
    log::debug!("{}", stats);
    Ok(())
}
