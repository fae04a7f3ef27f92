//! nixpkgs-index - Builds and queries a version index of Nixpkgs packages
//!
//! Provides:
//! - Indexing of Nixpkgs history into a JSON version index
//! - Listing the versions recorded for a package
//! - Resolving `package@version` to a store path for one platform

mod commands;
mod helpers;
mod output;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use nixdex_index::Order;
use std::path::PathBuf;

use commands::{cmd_find, cmd_index, cmd_stats, cmd_versions, IndexArgs};

#[derive(Parser)]
#[command(name = "nixpkgs-index")]
#[command(about = "Index which package versions Nixpkgs shipped, and at which commit", long_about = None)]
#[command(version)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Explicit log filter, overrides -v (e.g. "nixdex_index=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrderArg {
    /// Newest window first
    Newest,
    /// Oldest window first
    Oldest,
}

impl From<OrderArg> for Order {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Newest => Order::NewestFirst,
            OrderArg::Oldest => Order::OldestFirst,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Indexes Nixpkgs history into the version index
    Index {
        /// Indexer configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Version index to update (JSON)
        #[arg(short, long)]
        index: PathBuf,

        /// Working directory for the sparse Nixpkgs checkout
        #[arg(short, long, default_value = "./nixpkgs")]
        repo: PathBuf,

        /// Oldest instant to index (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Newest instant to index (default: branch HEAD)
        #[arg(long)]
        until: Option<String>,

        /// Width of one discovery window (e.g. 12h, 7d)
        #[arg(long, default_value = "7d")]
        interval: String,

        /// Maximum number of commits to check out
        #[arg(short, long)]
        max_steps: Option<usize>,

        /// Order in which windows are visited
        #[arg(long, value_enum, default_value = "newest")]
        order: OrderArg,

        /// Save the index every N merged commits (0: only at the end)
        #[arg(long, default_value = "10")]
        checkpoint_every: usize,

        /// Packages evaluated concurrently
        #[arg(short, long, default_value = "4")]
        jobs: usize,

        /// Start from an empty index and forget processed commits
        #[arg(long)]
        rebuild: bool,

        /// Do not skip or record processed commits
        #[arg(long)]
        no_journal: bool,

        /// Journal directory (default: next to the index)
        #[arg(long)]
        journal: Option<PathBuf>,

        /// GitHub token for the commit history API
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,
    },

    /// Lists the versions recorded for a package
    Versions {
        /// Package name as configured (e.g. "ruby")
        package: String,

        /// Version index (JSON)
        #[arg(short, long)]
        index: PathBuf,

        /// Only versions with a store path for this system
        #[arg(short, long)]
        system: Option<String>,

        /// Maximum number of versions to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Show all versions (no limit)
        #[arg(short, long)]
        all: bool,
    },

    /// Prints the store path of package@version for one system
    Find {
        /// Package and version, e.g. "ruby@3.3.9"
        spec: String,

        /// Version index (JSON)
        #[arg(short, long)]
        index: PathBuf,

        /// Target system, e.g. "x86_64-linux"
        #[arg(short, long)]
        system: String,
    },

    /// Shows index statistics
    Stats {
        /// Version index (JSON)
        #[arg(short, long)]
        index: PathBuf,

        /// Journal directory (default: next to the index)
        #[arg(long)]
        journal: Option<PathBuf>,
    },
}

fn log_filter(verbose: u8, explicit: Option<&str>) -> String {
    if let Some(filter) = explicit {
        return filter.to_string();
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose, cli.log_level.as_deref())),
    )
    .init();

    match cli.command {
        Commands::Index {
            config,
            index,
            repo,
            since,
            until,
            interval,
            max_steps,
            order,
            checkpoint_every,
            jobs,
            rebuild,
            no_journal,
            journal,
            github_token,
        } => {
            let args = IndexArgs {
                config,
                index,
                repo,
                since,
                until,
                interval,
                max_steps,
                order: order.into(),
                checkpoint_every,
                jobs,
                rebuild,
                journal,
                no_journal,
                github_token,
            };
            cmd_index(args).await?;
        }
        Commands::Versions {
            package,
            index,
            system,
            limit,
            all,
        } => {
            cmd_versions(&package, &index, system.as_deref(), limit, all)?;
        }
        Commands::Find { spec, index, system } => {
            cmd_find(&spec, &index, &system)?;
        }
        Commands::Stats { index, journal } => {
            cmd_stats(&index, journal)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_levels() {
        assert_eq!(log_filter(0, None), "info");
        assert_eq!(log_filter(1, None), "debug");
        assert_eq!(log_filter(3, None), "trace");
        assert_eq!(log_filter(2, Some("warn")), "warn");
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
