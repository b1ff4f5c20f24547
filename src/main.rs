//! Sitemap Harvester main entry point
//!
//! This is the command-line interface for the sitemap-driven listing harvester.

use anyhow::Context;
use clap::Parser;
use sitemap_harvester::config::{load_config_with_hash, Config, FileConfigProvider};
use sitemap_harvester::crawler::{
    BatchScope, HttpTransport, Orchestrator, RunOutcome, SharedStorage, SitemapResolver,
};
use sitemap_harvester::events::TracingSink;
use sitemap_harvester::output::{
    load_statistics, print_batch_summary, print_items, print_statistics,
};
use sitemap_harvester::storage::SqliteStorage;
use sitemap_harvester::BatchStatus;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Sitemap Harvester: a fail-fast listing ingester
///
/// Resolves the configured sitemap, extracts the most recent record pages in
/// ascending ID order and stores each record once. The first record that
/// cannot be extracted stops the batch.
#[derive(Parser, Debug)]
#[command(name = "sitemap-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A fail-fast sitemap-driven listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "range"])]
    stats: bool,

    /// Harvest every record with MIN <= ID <= MAX instead of the window
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    range: Option<Vec<i64>>,
}

impl Cli {
    fn scope(&self) -> anyhow::Result<BatchScope> {
        match self.range.as_deref() {
            None => Ok(BatchScope::Window),
            Some(&[min, max]) if min <= max => Ok(BatchScope::Range { min, max }),
            Some(&[min, max]) => anyhow::bail!("--range MIN must not exceed MAX ({} > {})", min, max),
            Some(_) => anyhow::bail!("--range takes exactly two IDs"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let scope = cli.scope()?;

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, scope).await?;
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_harvest(&config, &cli.config, scope).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitemap_harvester=info,warn"),
            1 => EnvFilter::new("sitemap_harvester=debug,info"),
            2 => EnvFilter::new("sitemap_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: resolves the sitemap and lists the items
async fn handle_dry_run(config: &Config, scope: BatchScope) -> anyhow::Result<()> {
    println!("=== Sitemap Harvester Dry Run ===\n");

    let batch = &config.batch;
    println!("Batch Configuration:");
    println!("  Sitemap: {}", batch.sitemap_url);
    println!("  Window size: {}", batch.window_size);
    println!("  Primary selector: {}", batch.primary_selector);
    println!("  Secondary selector: {}", batch.secondary_selector);
    println!(
        "  Retries: {} (base delay {}ms)",
        batch.max_retries, batch.base_delay_ms
    );
    println!("  Fetch timeout: {}ms", batch.fetch_timeout_ms);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!();

    let transport = HttpTransport::new(&config.user_agent).context("Failed to build HTTP client")?;
    let resolver = SitemapResolver::new(Arc::new(transport), batch.fetch_timeout());
    let references = match scope {
        BatchScope::Window => resolver.resolve(&batch.sitemap_url, batch.window_size).await?,
        BatchScope::Range { min, max } => {
            resolver.resolve_range(&batch.sitemap_url, min, max).await?
        }
    };

    print_items(&references);
    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: &Config,
    config_path: &Path,
    scope: BatchScope,
) -> anyhow::Result<ExitCode> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let storage: SharedStorage = Arc::new(Mutex::new(storage));
    let transport = HttpTransport::new(&config.user_agent).context("Failed to build HTTP client")?;

    let orchestrator = Arc::new(Orchestrator::new(
        storage,
        Arc::new(FileConfigProvider::new(config_path)),
        Arc::new(transport),
    ));
    orchestrator.subscribe(Arc::new(TracingSink));

    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current item");
                orchestrator.stop();
            }
        })
    };

    let outcome = orchestrator.run_scoped(scope).await;
    interrupt.abort();

    match outcome {
        RunOutcome::Finished(summary) => {
            print_batch_summary(&summary);
            if summary.status == BatchStatus::Failed {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        RunOutcome::AlreadyRunning => {
            println!("A batch is already running");
            Ok(ExitCode::SUCCESS)
        }
    }
}
