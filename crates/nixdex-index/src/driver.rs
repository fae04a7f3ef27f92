//! Indexing driver
//!
//! Discover → check out → evaluate → merge, one commit at a time, then
//! persist. Failures are isolated at their level: a failed evaluation drops
//! that attribute, a failed checkout skips the commit, and only fatal
//! conditions (a write to the index or journal failing) end the run early.

use crate::checkout::Checkout;
use crate::discovery::{CommitDiscovery, DiscoveryRequest, Order, DEFAULT_MAX_STEPS};
use crate::evaluator::{AttributeEvaluator, Evaluator, PackageEvaluation};
use crate::formatting::{format_duration, format_number};
use crate::github::HistoryApi;
use crate::stats::{IndexStats, Phase};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use nixdex_core::{CommitRef, EvalOptions, IndexConfig, Ledger, MergeOutcome, PackageSpec};
use nixdex_db::{CommitJournal, JournalRecord, LedgerStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Knobs for one indexing run
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub step: TimeDelta,
    pub order: Order,
    /// Maximum commits to check out (already indexed ones don't count)
    pub max_steps: Option<usize>,
    /// Persist every N merged commits; 0 persists only at the end
    pub checkpoint_every: usize,
    /// Packages evaluated concurrently within one commit
    pub jobs: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            step: TimeDelta::days(7),
            order: Order::NewestFirst,
            max_steps: None,
            checkpoint_every: 10,
            jobs: 4,
        }
    }
}

/// Runs the indexing loop over injected history, checkout and evaluator
pub struct Driver<H, C, E> {
    history: H,
    checkout: C,
    evaluator: E,
    branch: String,
    packages: Vec<PackageSpec>,
    eval: EvalOptions,
    store: LedgerStore,
    journal: Option<CommitJournal>,
    options: DriverOptions,
    stop: Arc<AtomicBool>,
    last_phase: Mutex<Phase>,
}

impl<H, C, E> Driver<H, C, E>
where
    H: HistoryApi,
    C: Checkout,
    E: Evaluator,
{
    pub fn new(
        config: &IndexConfig,
        history: H,
        checkout: C,
        evaluator: E,
        store: LedgerStore,
        options: DriverOptions,
    ) -> Self {
        Self {
            history,
            checkout,
            evaluator,
            branch: config.branch.clone(),
            packages: config.packages.clone(),
            eval: config.evaluation.clone(),
            store,
            journal: None,
            options,
            stop: Arc::new(AtomicBool::new(false)),
            last_phase: Mutex::new(Phase::Discovering),
        }
    }

    /// Skips commits the journal already covers and records merged ones
    pub fn with_journal(mut self, journal: CommitJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Setting the flag stops the run after the commit in progress
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Terminal phase of the last run: `Done` or `Aborted`
    pub fn phase(&self) -> Phase {
        *self.last_phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.last_phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn checkout(&self) -> &C {
        &self.checkout
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    fn discovery_request(&self) -> DiscoveryRequest {
        // With a lower bound the range decides; otherwise leave room for
        // already indexed commits that don't count as steps
        let max_windows = match self.options.since {
            Some(_) => None,
            None => Some(self.options.max_steps.unwrap_or(0).max(DEFAULT_MAX_STEPS)),
        };
        DiscoveryRequest {
            branch: self.branch.clone(),
            since: self.options.since,
            until: self.options.until,
            step: self.options.step,
            max_windows,
            order: self.options.order,
        }
    }

    /// Runs discovery to exhaustion (or `max_steps`, or a stop request) and
    /// merges everything into `ledger`, persisting through the store.
    pub async fn run(&self, ledger: &mut Ledger) -> Result<IndexStats> {
        let start_time = Instant::now();
        let mut stats = IndexStats::default();

        let result = self.run_loop(ledger, &mut stats, start_time).await;
        stats.elapsed_time = start_time.elapsed();

        match result {
            Ok(()) => {
                stats.phase = Phase::Done;
                self.set_phase(Phase::Done);
                self.log_summary(&stats);
                Ok(stats)
            }
            Err(e) => {
                log::error!("Indexing aborted while {}: {:#}", stats.phase, e);
                self.set_phase(Phase::Aborted);
                Err(e)
            }
        }
    }

    async fn run_loop(&self, ledger: &mut Ledger, stats: &mut IndexStats, start_time: Instant) -> Result<()> {
        let systems: Vec<String> = self
            .eval
            .target_systems()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut unjournaled: Vec<(CommitRef, JournalRecord)> = Vec::new();
        let mut since_checkpoint = 0;

        stats.phase = Phase::Discovering;
        let mut discovery = CommitDiscovery::start(&self.history, &self.discovery_request()).await;

        log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                log::warn!("Stop requested, finishing up");
                stats.interrupted = true;
                break;
            }
            if let Some(max) = self.options.max_steps {
                if stats.processed + stats.skipped >= max {
                    log::info!("Reached max steps: {}", max);
                    break;
                }
            }

            stats.phase = Phase::Discovering;
            let Some(commit) = discovery.next_commit().await else {
                break;
            };

            if self.is_journaled(&commit, &systems) {
                log::debug!("Commit {} already indexed, skipping", commit);
                stats.already_indexed += 1;
                continue;
            }

            stats.phase = Phase::CheckingOut;
            if let Err(e) = self.checkout.ensure(&commit).await {
                log::warn!("Skipping commit {}: {}", commit, e);
                stats.skipped += 1;
                continue;
            }

            stats.phase = Phase::Evaluating;
            let evaluations = self.evaluate_commit().await;
            let failed: usize = evaluations.iter().map(PackageEvaluation::failed).sum();
            stats.evaluations_failed += failed;

            if evaluations.iter().all(|e| e.results.is_empty()) {
                log::warn!("Skipping commit {}: no attribute evaluated ({} failures)", commit, failed);
                stats.skipped += 1;
                continue;
            }

            stats.phase = Phase::Merging;
            let mut outcome = MergeOutcome::default();
            let mut record = JournalRecord::new(&commit);
            for (spec, evaluation) in self.packages.iter().zip(&evaluations) {
                outcome.absorb(ledger.merge_package(&spec.name, &commit, &evaluation.results));
                // Transient failures keep the package out of the journal
                if evaluation.is_complete() {
                    record = record.with_package(spec, &systems);
                }
            }
            stats.processed += 1;
            stats.versions_inserted += outcome.inserted;
            stats.versions_replaced += outcome.replaced;
            if !record.is_empty() {
                unjournaled.push((commit.clone(), record));
            }

            log::info!(
                "✓ {} | {} new, {} updated, {} unchanged | {} evaluations failed",
                commit,
                outcome.inserted,
                outcome.replaced,
                outcome.unchanged,
                failed
            );

            since_checkpoint += 1;
            if self.options.checkpoint_every > 0 && since_checkpoint >= self.options.checkpoint_every {
                stats.phase = Phase::Persisting;
                self.persist(ledger, &mut unjournaled)?;
                stats.checkpoints += 1;
                since_checkpoint = 0;
                self.log_progress(stats, start_time);
            }
        }

        let ds = discovery.stats();
        log::debug!(
            "Discovery: {} windows queried, {} empty, {} failed",
            ds.windows,
            ds.empty,
            ds.failed
        );

        stats.phase = Phase::Persisting;
        self.persist(ledger, &mut unjournaled)
    }

    /// Evaluates every package at the current checkout, `jobs` at a time.
    /// Results come back in configuration order.
    async fn evaluate_commit(&self) -> Vec<PackageEvaluation> {
        let evaluator = AttributeEvaluator::new(&self.evaluator, self.checkout.path(), &self.eval);
        let evaluator = &evaluator;
        stream::iter(&self.packages)
            .map(move |spec| evaluator.evaluate_package(spec))
            .buffered(self.options.jobs.max(1))
            .collect()
            .await
    }

    fn is_journaled(&self, commit: &CommitRef, systems: &[String]) -> bool {
        let Some(journal) = &self.journal else {
            return false;
        };
        match journal.is_covered(&commit.sha, &self.packages, systems) {
            Ok(covered) => covered,
            Err(e) => {
                log::warn!("Journal lookup for {} failed: {}", commit.short(), e);
                false
            }
        }
    }

    /// Writes the ledger atomically, then journals the commits it contains.
    fn persist(&self, ledger: &Ledger, unjournaled: &mut Vec<(CommitRef, JournalRecord)>) -> Result<()> {
        let save_start = Instant::now();
        self.store
            .save(ledger)
            .with_context(|| format!("Failed to write index {:?}", self.store.path()))?;
        log::debug!("Index saved ({:.2}s)", save_start.elapsed().as_secs_f64());

        // Only now are these commits' merges durable
        if let Some(journal) = &self.journal {
            for (commit, record) in unjournaled.iter() {
                journal
                    .mark_processed(commit, record)
                    .with_context(|| format!("Failed to journal commit {}", commit.short()))?;
            }
            journal.flush().context("Failed to flush journal")?;
            log::debug!("Marked {} commits as processed", unjournaled.len());
        }
        unjournaled.clear();
        Ok(())
    }

    fn log_progress(&self, stats: &IndexStats, start_time: Instant) {
        let elapsed = start_time.elapsed();
        let speed = if elapsed.as_secs_f64() > 0.0 {
            stats.processed as f64 / elapsed.as_secs_f64() * 60.0
        } else {
            0.0
        };
        log::info!(
            "⚡ Checkpoint #{} | Commits: {} | Versions: {} new, {} updated | Speed: {:.1} commits/min | Elapsed: {}",
            stats.checkpoints,
            format_number(stats.processed),
            format_number(stats.versions_inserted),
            format_number(stats.versions_replaced),
            speed,
            format_duration(elapsed)
        );
    }

    fn log_summary(&self, stats: &IndexStats) {
        log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if stats.interrupted {
            log::info!("⏹  Indexing interrupted, progress saved");
        } else {
            log::info!("✅ Indexing completed!");
        }
        log::info!("📊 Final Statistics:");
        log::info!("   • Total time:         {}", format_duration(stats.elapsed_time));
        log::info!(
            "   • Commits processed:  {} ({} skipped, {} already indexed)",
            format_number(stats.processed),
            format_number(stats.skipped),
            format_number(stats.already_indexed)
        );
        log::info!(
            "   • Versions:           {} new, {} updated",
            format_number(stats.versions_inserted),
            format_number(stats.versions_replaced)
        );
        if stats.evaluations_failed > 0 {
            log::warn!("   • Failed evaluations: {}", format_number(stats.evaluations_failed));
        } else {
            log::info!("   • Failed evaluations: 0");
        }
    }
}
