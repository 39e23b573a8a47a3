//! facetdb command-line tool
//!
//! Operates on a journal-backed selector registry in `--data-dir`.
//!
//! # Examples
//!
//! ```bash
//! # Bind two selectors to a facet
//! facetctl add 0x1111111111111111111111111111111111111111 0xcdffacc6 0x52ef6b2c
//!
//! # Remove one again
//! facetctl remove 0x52ef6b2c
//!
//! # Apply a batch of cut groups from JSON
//! facetctl apply upgrade.json
//!
//! # Inspect
//! facetctl resolve 0xcdffacc6
//! facetctl facets
//! facetctl slots
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use facetdb::registry::load_batch;
use facetdb::{
    metrics, FacetAddress, FacetCut, JournalStore, RegistryConfig, Selector, SelectorRegistry,
    SlotArray,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// facetdb - compact selector registry
#[derive(Parser, Debug)]
#[command(name = "facetctl")]
#[command(version = facetdb::VERSION)]
#[command(about = "Manage a selector → facet registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "FACETDB_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory path (overrides configuration)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log directory path (overrides configuration)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bind selectors to a facet, adding or replacing as needed
    Add {
        /// Facet address (0x + 40 hex digits)
        facet: FacetAddress,
        /// Selectors (0x + 8 hex digits)
        #[arg(required = true)]
        selectors: Vec<Selector>,
    },

    /// Remove selectors
    Remove {
        #[arg(required = true)]
        selectors: Vec<Selector>,
    },

    /// Apply a JSON batch of cut groups atomically
    Apply {
        /// Path to a JSON array of {"facet": ..., "selectors": [...]}
        batch: PathBuf,
    },

    /// Print the facet bound to a selector
    Resolve { selector: Selector },

    /// List facets and their selectors
    Facets,

    /// Dump the slot array
    Slots,

    /// Check registry invariants
    Verify,

    /// Rewrite the journal as a single snapshot
    Compact,

    /// Print metrics in Prometheus text format
    Metrics,

    /// Print the effective configuration
    Config,

    /// Show version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = effective_config(&cli)?;
    setup_logging(&config, cli.no_color)?;
    metrics::init_metrics();

    match cli.command {
        Commands::Add { facet, selectors } => {
            cut_command(&config, vec![FacetCut::new(facet, selectors)])
        }
        Commands::Remove { selectors } => cut_command(&config, vec![FacetCut::remove(selectors)]),
        Commands::Apply { batch } => {
            let cuts = load_batch(&batch)
                .with_context(|| format!("Failed to load batch {}", batch.display()))?;
            cut_command(&config, cuts)
        }
        Commands::Resolve { selector } => {
            let registry = open_registry(&config)?;
            match registry.resolve(selector) {
                Some(facet) => println!("{}", facet),
                None => anyhow::bail!("{} is not registered", selector),
            }
            Ok(())
        }
        Commands::Facets => facets_command(&config),
        Commands::Slots => slots_command(&config),
        Commands::Verify => {
            let registry = open_registry(&config)?;
            registry.verify()?;
            println!(
                "✅ Registry consistent: {} selectors ({})",
                registry.len(),
                registry.header()
            );
            Ok(())
        }
        Commands::Compact => {
            let mut registry = open_registry(&config)?;
            let before = registry.store().stats();
            registry.compact()?;
            let after = registry.store().stats();
            println!(
                "✅ Journal compacted: {} → {} bytes",
                before.journal_bytes, after.journal_bytes
            );
            Ok(())
        }
        Commands::Metrics => {
            // Populate the live gauge from disk
            open_registry(&config)?;
            print!("{}", metrics::export_metrics());
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Version => {
            println!("facetdb {}", facetdb::VERSION);
            Ok(())
        }
    }
}

/// Configuration file and environment, then command-line overrides
fn effective_config(cli: &Cli) -> anyhow::Result<RegistryConfig> {
    let mut config = RegistryConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Setup logging with rolling files and console output
fn setup_logging(config: &RegistryConfig, no_color: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log dir {}", config.log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "facetdb.log");

    let log_level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    // Console stays quiet below warn so command output is scriptable
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!no_color)
                .with_filter(tracing_subscriber::filter::LevelFilter::WARN),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn open_registry(config: &RegistryConfig) -> anyhow::Result<SelectorRegistry<JournalStore>> {
    let store = JournalStore::open(&config.data_dir, config.journal_options())
        .with_context(|| format!("Failed to open journal in {}", config.data_dir.display()))?;
    let registry = SelectorRegistry::with_options(store, config.registry_options())?;
    Ok(registry)
}

fn cut_command(config: &RegistryConfig, cuts: Vec<FacetCut>) -> anyhow::Result<()> {
    let mut registry = open_registry(config)?;
    info!(groups = cuts.len(), data_dir = ?config.data_dir, "Applying cut batch");

    let report = match registry.apply_cut(&cuts) {
        Ok(report) => report,
        Err(e) if e.is_caller_error() => {
            warn!(error = %e, "Cut batch rejected");
            anyhow::bail!("Batch rejected, nothing changed: {}", e);
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "✅ {} selectors changed: {} added, {} replaced, {} removed ({} word reads, {} word writes)",
        report.changed(),
        report.added,
        report.replaced,
        report.removed,
        report.word_reads,
        report.word_writes
    );
    println!("Selectors: {} ({})", registry.len(), registry.header());
    Ok(())
}

fn facets_command(config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = open_registry(config)?;
    let facets = registry.facets();

    if facets.is_empty() {
        println!("No facets registered.");
        return Ok(());
    }

    println!("Facets ({})", facets.len());
    println!("───────────────────────────────");
    for facet in facets {
        println!("{} ({} selectors)", facet.address, facet.selectors.len());
        for selector in facet.selectors {
            println!("  • {}", selector);
        }
    }
    Ok(())
}

fn slots_command(config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = open_registry(config)?;
    let header = registry.header();
    let store = registry.store();

    println!("Header: {}", header);
    for index in 0..store.group_count() {
        let word = store.read_group(index)?;
        let cells: Vec<String> = word
            .selectors(header.occupancy(index))
            .map(|selector| selector.to_string())
            .collect();
        println!("  [{:>4}] {}", index, cells.join(" "));
    }
    Ok(())
}
