mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quotedb_core::{SeriesStore, SeriesTable, SymbolInfo};
use quotedb_data::{csv_loader, MemoryStore, PostgresStore};
use quotedb_engine::{
    CommitMode, IndicatorOutcome, IndicatorRegistry, IndicatorUpdater, SweepOptions, SweepReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "quotedb")]
#[command(about = "Daily price store with incrementally maintained indicators")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Register a symbol, import its history, and compute indicators
    Add {
        symbol: String,

        /// Path to CSV price file
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        exchange: Option<String>,

        #[arg(long)]
        sector: Option<String>,

        #[arg(long)]
        industry: Option<String>,
    },

    /// Append new bars to an existing symbol
    Import {
        symbol: String,

        /// Path to CSV price file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Fill missing indicator values for one symbol
    Update {
        symbol: String,

        #[command(flatten)]
        sweep: SweepArgs,

        /// Recompute and overwrite every value past the warm-up
        #[arg(long)]
        rebuild: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fill missing indicator values for every symbol
    Sync {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a symbol and all of its data
    Delete { symbol: String },

    /// List registered symbols
    Symbols,

    /// List the indicator catalog in sweep order
    Indicators,

    /// Print the most recent rows of a symbol as CSV
    Show {
        symbol: String,

        /// Number of rows
        #[arg(long, default_value = "10")]
        last: usize,

        /// Indicator columns to include (default: every stored column)
        #[arg(short, long = "indicator")]
        indicators: Vec<String>,
    },

    /// Compute indicators for a CSV file without a database; CSV to stdout
    Compute {
        /// Path to CSV price file
        #[arg(short, long)]
        file: PathBuf,

        /// Indicator columns to output (default: the configured selection)
        #[arg(short, long = "indicator")]
        indicators: Vec<String>,
    },
}

#[derive(clap::Args)]
struct SweepArgs {
    /// Scan the full history for holes instead of only the latest row
    #[arg(long)]
    check_all: bool,

    /// Compute and report without writing
    #[arg(long)]
    no_commit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level(cli.log_level.clone())));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let registry = Arc::new(IndicatorRegistry::standard()?);

    match &cli.command {
        Commands::Indicators => {
            print_catalog(&registry);
            return Ok(());
        }
        Commands::Compute { file, indicators } => {
            return compute_offline(file, indicators.clone(), registry, &config).await;
        }
        _ => {}
    }

    let store = PostgresStore::connect(&config.database_url(cli.database_url.clone())).await?;
    store.migrate().await?;
    let updater = IndicatorUpdater::new(store, registry)
        .with_selection(config.engine.indicators.clone())?;

    match cli.command {
        Commands::Migrate => {
            println!("Database schema is up to date");
        }
        Commands::Add {
            symbol,
            file,
            name,
            exchange,
            sector,
            industry,
        } => {
            let info = SymbolInfo {
                name,
                exchange,
                sector,
                industry,
                ..SymbolInfo::new(&symbol)
            };
            if !updater.store().register_symbol(&info).await? {
                bail!("Symbol {} is already registered", info.symbol);
            }
            let count = import_bars(updater.store(), &info.symbol, &file).await?;
            println!("Added {} with {} bars", info.symbol, count);

            let options = sweep_options(&config, false, false, false);
            let update = updater.update_with(&info.symbol, options).await?;
            print_report(&update.report, false)?;
        }
        Commands::Import { symbol, file } => {
            let count = import_bars(updater.store(), &symbol, &file).await?;
            println!("Imported {} bars for {}", count, symbol);
        }
        Commands::Update {
            symbol,
            sweep,
            rebuild,
            json,
        } => {
            let options = sweep_options(&config, sweep.check_all, sweep.no_commit, rebuild);
            let update = updater.update_with(&symbol, options).await?;
            print_report(&update.report, json)?;
            if !update.pending.is_empty() {
                println!("{} updates not committed", update.pending.len());
            }
        }
        Commands::Sync { sweep, json } => {
            let options = sweep_options(&config, sweep.check_all, sweep.no_commit, false);
            let mut failed = 0;
            for (symbol, result) in updater.sync_all(options).await? {
                match result {
                    Ok(update) => print_report(&update.report, json)?,
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", symbol, e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} symbols failed", failed);
            }
        }
        Commands::Delete { symbol } => {
            if updater.store().delete_symbol(&symbol).await? {
                println!("Deleted {}", symbol);
            } else {
                bail!("Symbol {} is not registered", symbol);
            }
        }
        Commands::Symbols => {
            for symbol in updater.store().symbols().await? {
                println!("{}", symbol);
            }
        }
        Commands::Show {
            symbol,
            last,
            indicators,
        } => {
            let table = updater.store().load_series(&symbol).await?;
            let tail = tail(&table, last)?;
            let columns = if indicators.is_empty() {
                stored_columns(updater.registry(), &tail)
            } else {
                indicators
            };
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            csv_loader::write_series_csv(std::io::stdout().lock(), &tail, &columns)?;
        }
        Commands::Indicators | Commands::Compute { .. } => {}
    }

    Ok(())
}

fn sweep_options(config: &Config, check_all: bool, no_commit: bool, rebuild: bool) -> SweepOptions {
    SweepOptions {
        check_all: check_all || config.engine.check_all,
        commit: if no_commit {
            CommitMode::Deferred
        } else {
            config.engine.commit
        },
        rebuild,
    }
}

async fn import_bars<S: SeriesStore>(store: &S, symbol: &str, file: &Path) -> Result<u64> {
    tracing::info!(file = %file.display(), symbol = %symbol, "Importing CSV data");
    let bars = csv_loader::load_bars_from_csv(file)?;
    let count = store
        .append_bars(symbol, &bars)
        .await
        .with_context(|| format!("Import into {} failed", symbol))?;
    tracing::info!(count, "Data import complete");
    Ok(count)
}

async fn compute_offline(
    file: &Path,
    indicators: Vec<String>,
    registry: Arc<IndicatorRegistry>,
    config: &Config,
) -> Result<()> {
    let symbol = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "csv".to_string());

    let selection = if indicators.is_empty() {
        config.engine.indicators.clone()
    } else {
        indicators
    };
    let updater = IndicatorUpdater::new(MemoryStore::new(), registry)
        .with_selection(selection.clone())?;
    updater.store().register_symbol(&SymbolInfo::new(&symbol)).await?;
    import_bars(updater.store(), &symbol, file).await?;

    let options = SweepOptions {
        check_all: true,
        ..SweepOptions::default()
    };
    let update = updater.update_with(&symbol, options).await?;
    for (indicator, error) in update.report.failures() {
        tracing::warn!(indicator, error = %error, "Indicator failed");
    }

    let columns: Vec<String> = if selection.is_empty() {
        updater
            .registry()
            .sweep_order()
            .map(|d| d.name().to_string())
            .collect()
    } else {
        selection
    };
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    let table = updater.store().load_series(&symbol).await?;
    csv_loader::write_series_csv(std::io::stdout().lock(), &table, &columns)?;
    Ok(())
}

fn tail(table: &SeriesTable, last: usize) -> Result<SeriesTable> {
    let start = table.len().saturating_sub(last);
    Ok(SeriesTable::new(
        table.symbol(),
        table.observations()[start..].to_vec(),
        table.rows()[start..].to_vec(),
    )?)
}

/// Catalog columns that hold at least one value in `table`, in sweep order.
fn stored_columns(registry: &IndicatorRegistry, table: &SeriesTable) -> Vec<String> {
    registry
        .sweep_order()
        .map(|d| d.name())
        .filter(|name| table.rows().iter().any(|r| r.get(name).is_some()))
        .map(str::to_string)
        .collect()
}

fn print_catalog(registry: &IndicatorRegistry) {
    println!("{:<24} {:>6} {:>6}  inputs", "name", "length", "warmup");
    for def in registry.sweep_order() {
        let length = def.length().map(|l| l.to_string()).unwrap_or_else(|| "-".into());
        let inputs = if def.inputs().is_empty() {
            "-".to_string()
        } else {
            def.inputs().join(", ")
        };
        println!("{:<24} {:>6} {:>6}  {}", def.name(), length, def.warmup(), inputs);
    }
}

fn print_report(report: &SweepReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {} rows filled, {} written{}",
        report.symbol,
        report.rows_filled(),
        report.rows_written,
        if report.committed { "" } else { " (not committed)" }
    );
    for entry in &report.indicators {
        match &entry.outcome {
            IndicatorOutcome::Filled { rows, start, end } => {
                println!("  {:<24} filled {} rows, window [{}, {})", entry.indicator, rows, start, end);
            }
            IndicatorOutcome::UpToDate => {}
            IndicatorOutcome::Failed { error } => {
                println!("  {:<24} failed: {}", entry.indicator, error);
            }
            IndicatorOutcome::Skipped { blocked_by } => {
                println!("  {:<24} skipped, blocked by {}", entry.indicator, blocked_by);
            }
        }
    }
    Ok(())
}
