use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use smartdca::models::{Candle, MarketSnapshot, Position, StakeLimits};
use smartdca::policy::{AveragingPolicy, TickDecision};
use smartdca::strategy::{SignalSet, SmartScalping, Strategy};
use smartdca::PolicyConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Risk-scaled position averaging for DCA scalping strategies
#[derive(Parser)]
#[command(name = "smartdca")]
#[command(about = "Sizing, averaging and stop decisions for DCA positions", long_about = None)]
struct Cli {
    /// Policy config file (TOML); SMARTDCA__* env vars override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the config, then print the effective values
    Check,

    /// Stake for one entry
    Size {
        /// Wallet balance in quote currency
        #[arg(short, long)]
        balance: f64,

        #[arg(short, long, default_value = "1")]
        leverage: f64,

        #[arg(long)]
        min_stake: f64,

        #[arg(long)]
        max_stake: f64,

        /// 0 for the initial entry, n for the n-th averaging add
        #[arg(short, long, default_value = "0")]
        entry_index: u32,
    },

    /// Leverage for the next entry
    Leverage {
        /// Fills the position already holds (0 for a new position)
        #[arg(short, long, default_value = "0")]
        entry_count: u32,

        /// Maximum leverage the exchange allows for the pair
        #[arg(short = 'x', long)]
        exchange_max: f64,
    },

    /// Averaging, stop and exit decision for one position tick
    Evaluate {
        /// JSON file: {position, snapshot, balance, limits}
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Derive indicators from candles and run the entry/exit signals
    Snapshot {
        #[arg(short, long)]
        instrument: String,

        /// JSON array of candles, oldest first
        #[arg(long)]
        candles: PathBuf,

        /// Candle interval in seconds, used for the gap check
        #[arg(long, default_value = "300")]
        interval: u64,
    },
}

/// One tick handed over by the host engine
#[derive(Deserialize)]
struct TickInput {
    position: Position,
    snapshot: MarketSnapshot,
    balance: f64,
    limits: StakeLimits,
}

#[derive(Serialize)]
struct SnapshotReport {
    snapshot: MarketSnapshot,
    signals: SignalSet,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = PolicyConfig::load(cli.config.as_deref()).context("Failed to load policy config")?;
    let policy = AveragingPolicy::new(config)?;

    match cli.command {
        Commands::Check => {
            tracing::info!("✅ Policy config is valid");
            print_json(policy.config())?;
        }
        Commands::Size {
            balance,
            leverage,
            min_stake,
            max_stake,
            entry_index,
        } => {
            let limits = StakeLimits::new(min_stake, max_stake);
            let decision = if entry_index == 0 {
                policy.initial_stake(balance, leverage, limits, Utc::now())?
            } else {
                policy.sizer().size(balance, leverage, limits, entry_index)?
            };
            print_json(&decision)?;
        }
        Commands::Leverage {
            entry_count,
            exchange_max,
        } => {
            let leverage = policy.leverage(entry_count, exchange_max)?;
            print_json(&serde_json::json!({ "leverage": leverage }))?;
        }
        Commands::Evaluate { input } => {
            let tick: TickInput = read_json(&input)?;
            let decision: TickDecision =
                policy.evaluate(&tick.position, &tick.snapshot, tick.balance, tick.limits);
            print_json(&decision)?;
        }
        Commands::Snapshot {
            instrument,
            candles,
            interval,
        } => {
            let candles: Vec<Candle> = read_json(&candles)?;
            smartdca::strategy::signals::validate_candle_spacing(&candles, interval)?;

            let strategy = SmartScalping::new(
                policy.config().signals.clone(),
                policy.config().indicators.clone(),
            );
            if candles.len() < strategy.min_candles_required() {
                tracing::warn!(
                    "⚠️  Only {} candles, {} needs {} for warm-up",
                    candles.len(),
                    strategy.name(),
                    strategy.min_candles_required()
                );
            }

            let snapshot =
                MarketSnapshot::from_candles(instrument, &candles, &policy.config().indicators)?;
            let signals = strategy.evaluate(&snapshot)?;
            print_json(&SnapshotReport { snapshot, signals })?;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smartdca=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
