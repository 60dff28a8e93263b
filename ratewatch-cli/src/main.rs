//! Ratewatch CLI: offline replay and snapshot commands.
//!
//! Commands:
//! - `replay` — replay CSV candle files through the engine and write JSON reports
//! - `snapshot` — build the live book from CSV files and print ticker snapshots
//! - `config` — print the effective engine configuration and its fingerprint

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ratewatch_core::data::{InMemoryCalendar, InMemoryPositions};
use ratewatch_core::Config;
use ratewatch_runner::data_loader::TIMESTAMP_FORMAT;
use ratewatch_runner::{
    discover_symbols, load_symbols, Orchestrator, ReplayOptions, ReplayProvider, RunnerConfig,
    TickerBook,
};

#[derive(Parser)]
#[command(name = "ratewatch", about = "Ratewatch — multi-timeframe signal engine")]
struct Cli {
    /// Runner config (TOML). Flags below override its values.
    #[arg(long, global = true)]
    runner_config: Option<PathBuf>,

    /// Engine config (TOML). Overrides `core_config` from the runner config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory with one `<SYMBOL>.csv` per symbol.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Worker threads.
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay candle files one candle at a time and report rating changes.
    Replay {
        /// Symbols to replay. Defaults to the runner config, then every CSV in the data dir.
        symbols: Vec<String>,

        /// Candles used to build each ticker before stepping.
        #[arg(long)]
        warmup: Option<usize>,

        /// Push, roll back and re-push every step, failing on any difference.
        #[arg(long, default_value_t = false)]
        verify_rollback: bool,

        /// Directory for `<SYMBOL>.replay.json` reports. Without it a summary is printed.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print JSON snapshots of every ticker.
    Snapshot {
        symbols: Vec<String>,

        /// Only use candles up to this time (`YYYY-MM-DD HH:MM:SS`).
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Print the effective engine configuration.
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut runner = match &cli.runner_config {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("loading runner config {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        runner.data_dir = dir;
    }
    if let Some(n) = cli.workers {
        runner.workers = n;
    }
    if let Some(path) = cli.config {
        runner.core_config = Some(path);
    }
    runner.validate()?;
    let core = Arc::new(runner.core().context("loading engine config")?);

    match cli.command {
        Commands::Replay {
            symbols,
            warmup,
            verify_rollback,
            output,
        } => {
            if let Some(w) = warmup {
                runner.warmup = w;
            }
            runner.verify_rollback |= verify_rollback;
            run_replay_cmd(&runner, core, symbols, output.as_deref())
        }
        Commands::Snapshot { symbols, as_of } => run_snapshot_cmd(&runner, core, symbols, as_of),
        Commands::Config => {
            println!("# fingerprint {}", core.fingerprint());
            print!("{}", core.to_toml_string()?);
            Ok(())
        }
    }
}

fn resolve_symbols(runner: &RunnerConfig, cli_symbols: Vec<String>) -> Result<Vec<String>> {
    let symbols = if !cli_symbols.is_empty() {
        cli_symbols
    } else if !runner.symbols.is_empty() {
        runner.symbols.clone()
    } else {
        discover_symbols(&runner.data_dir)?
    };
    if symbols.is_empty() {
        bail!("no symbols found in {}", runner.data_dir.display());
    }
    Ok(symbols)
}

/// Load the candle files, skipping symbols that fail to load.
fn load_provider(runner: &RunnerConfig, symbols: &[String]) -> (ReplayProvider, Vec<String>) {
    let mut loaded = Vec::new();
    for (symbol, result) in load_symbols(&runner.data_dir, symbols) {
        match result {
            Ok(candles) => loaded.push((symbol, candles)),
            Err(e) => warn!(symbol = %symbol, error = %e, "skipping symbol"),
        }
    }
    let names = loaded.iter().map(|(s, _)| s.clone()).collect();
    (ReplayProvider::new(loaded), names)
}

fn run_replay_cmd(
    runner: &RunnerConfig,
    core: Arc<Config>,
    symbols: Vec<String>,
    output: Option<&Path>,
) -> Result<()> {
    let symbols = resolve_symbols(runner, symbols)?;
    let (provider, symbols) = load_provider(runner, &symbols);
    let orch = Orchestrator::new(core, runner.workers)?;
    let opts = ReplayOptions {
        warmup: runner.warmup,
        verify_rollback: runner.verify_rollback,
    };

    if let Some(dir) = output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output dir {}", dir.display()))?;
    }

    let mut failures = 0;
    for (symbol, result) in orch.replay_all(&provider, &symbols, opts) {
        let report = match result {
            Ok(r) => r,
            Err(e) => {
                eprintln!("{symbol}: {e}");
                failures += 1;
                continue;
            }
        };
        match output {
            Some(dir) => {
                let path = dir.join(format!("{symbol}.replay.json"));
                std::fs::write(&path, report.to_json()?)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(symbol = %symbol, path = %path.display(), "report written");
            }
            None => {
                let last = report.steps.last();
                println!(
                    "{symbol}: {} steps, last rating {}, {} transitions, {} rollbacks verified",
                    report.steps.len(),
                    last.map_or("-", |s| s.rating.label()),
                    report.transitions.values().sum::<usize>(),
                    report.verified_rollbacks,
                );
            }
        }
    }

    if failures > 0 {
        bail!("{failures} symbol(s) failed to replay");
    }
    Ok(())
}

fn run_snapshot_cmd(
    runner: &RunnerConfig,
    core: Arc<Config>,
    symbols: Vec<String>,
    as_of: Option<String>,
) -> Result<()> {
    let symbols = resolve_symbols(runner, symbols)?;
    let (provider, symbols) = load_provider(runner, &symbols);

    match as_of {
        Some(s) => {
            let cutoff = NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                .with_context(|| format!("parsing --as-of '{s}' (expected {TIMESTAMP_FORMAT})"))?;
            for symbol in &symbols {
                provider.seek(symbol, 0);
                while provider
                    .peek_next(symbol)
                    .is_some_and(|ts| ts <= cutoff)
                {
                    provider.advance(symbol);
                }
            }
        }
        None => provider.seek_end(),
    }

    let orch = Orchestrator::new(core, runner.workers)?;
    let book = TickerBook::new();
    orch.initial_load(
        &book,
        &symbols,
        &provider,
        &InMemoryPositions::default(),
        &InMemoryCalendar::default(),
    );

    println!("{}", serde_json::to_string_pretty(&book.snapshots())?);
    Ok(())
}
