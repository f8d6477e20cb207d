//! Listing-Atlas main entry point
//!
//! This is the command-line interface for the Listing-Atlas hierarchy crawler.

use anyhow::{bail, Context};
use clap::Parser;
use listing_atlas::config::{load_config_with_hash, Config};
use listing_atlas::crawler::{crawl, CrawlMode, WalkPlan};
use listing_atlas::output::{load_statistics, print_statistics, render_summary};
use listing_atlas::storage::{EntityStore, SqliteStore};
use listing_atlas::{Level, ScopeFilter};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Listing-Atlas: a resumable hierarchy crawler
///
/// Listing-Atlas walks a site's browse pages from regions down to single
/// listings, recording the crawl status of every node so that any run can
/// be interrupted and re-run until everything is finished.
#[derive(Parser, Debug)]
#[command(name = "listing-atlas")]
#[command(version = "1.0.0")]
#[command(about = "A resumable hierarchy crawler", long_about = None)]
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

    /// Re-read the root page for regions before walking
    #[arg(long, conflicts_with = "details")]
    seed: bool,

    /// Crawl a single level (region, sub-region, postal-area, street)
    #[arg(long, value_name = "LEVEL", conflicts_with_all = ["through", "details"])]
    level: Option<Level>,

    /// Stop the walk after this level
    #[arg(long, value_name = "LEVEL", conflicts_with = "details")]
    through: Option<Level>,

    /// Restrict the crawl to one region key
    #[arg(long, value_name = "KEY")]
    region: Option<String>,

    /// Fetch listing details instead of walking the hierarchy
    #[arg(long)]
    details: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,
}

impl Cli {
    fn filter(&self) -> ScopeFilter {
        self.region
            .as_ref()
            .map_or_else(ScopeFilter::all, |key| ScopeFilter::region(key.as_str()))
    }

    fn mode(&self) -> anyhow::Result<CrawlMode> {
        if self.details {
            return Ok(CrawlMode::Details(self.filter()));
        }

        let mut plan = match self.level {
            Some(Level::Listing) => bail!("listings have no child pages; use --details"),
            Some(level) => WalkPlan::single(level),
            None => WalkPlan::default(),
        };
        if let Some(through) = self.through {
            if through == Level::Listing {
                bail!("--through must be a level above listing");
            }
            plan.through = through;
        }
        plan.filter = self.filter();
        plan.seed = self.seed;
        Ok(CrawlMode::Walk(plan))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let mode = cli.mode()?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &mode)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, mode).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_atlas=info,warn"),
            1 => EnvFilter::new("listing_atlas=debug,info"),
            2 => EnvFilter::new("listing_atlas=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, mode: &CrawlMode) -> anyhow::Result<()> {
    println!("=== Listing-Atlas Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Cool-down: {}s after {} consecutive parse failures",
        config.crawler.cooldown_secs, config.crawler.failure_threshold
    );
    println!(
        "  Bulk insert chunking from {} records",
        config.crawler.minimal_chunk_size * config.crawler.minimal_chunk_size
    );
    println!("  Block resolver: {:?}", config.crawler.block_resolver);

    println!("\nSite:");
    println!("  Root page: {}{}", config.site.base_url, config.site.root_path);
    println!("  List selector: {}", config.site.list_selector);
    println!("  Item selector: {}", config.site.item_selector);
    println!("  Block signatures: {}", config.site.block_signatures.join(", "));
    println!("  Detail fields: {}", config.site.detail_fields.len());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");

    let path = Path::new(&config.output.database_path);
    if !path.exists() {
        println!("✓ Would create the database and seed regions from the root page");
        return Ok(());
    }

    let store = SqliteStore::new(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    match mode {
        CrawlMode::Walk(plan) => {
            for level in plan.levels() {
                let pending = store.select_incomplete(level, &plan.filter)?.len();
                println!("✓ Would crawl {} {} nodes", pending, level);
            }
        }
        CrawlMode::Details(filter) => {
            let pending = store.select_incomplete_details(filter)?.len();
            println!("✓ Would fetch details of {} listings", pending);
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let store = SqliteStore::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    // Load statistics
    let stats = load_statistics(&store)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, mode: CrawlMode) -> anyhow::Result<()> {
    match &mode {
        CrawlMode::Walk(plan) => tracing::info!(
            "Walking {} through {}{}",
            plan.from,
            plan.through,
            plan.filter
                .region_key()
                .map(|r| format!(" in region {}", r))
                .unwrap_or_default()
        ),
        CrawlMode::Details(_) => tracing::info!("Fetching listing details"),
    }

    match crawl(config, mode).await {
        Ok(summary) => {
            tracing::info!("Crawl completed successfully");
            print!("{}", render_summary(&summary));
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
