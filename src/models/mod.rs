use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PolicyError, Result};
use crate::indicators::{calculate_atr, calculate_ema, calculate_rsi, calculate_stochastic};

/// Direction of a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One open trade on one instrument.
///
/// The entry count lives here rather than in any per-instrument table: the
/// caller passes the position in and records fills on it, so the policy itself
/// stays stateless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub instrument: String,
    pub side: Side,
    pub entry_price: f64,     // Average entry price across fills
    pub entry_count: u32,     // Successful fills so far, >= 1
    pub total_stake: f64,     // Quote currency committed across fills
    pub leverage: f64,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub peak_profit: f64,     // Highest profit ratio seen while open
    #[serde(default)]
    pub entry_order_pending: bool, // Averaging order placed, not yet filled
}

impl Position {
    /// Create a position from its initial fill
    pub fn open(
        instrument: impl Into<String>,
        side: Side,
        entry_price: f64,
        stake: f64,
        leverage: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.into(),
            side,
            entry_price,
            entry_count: 1,
            total_stake: stake,
            leverage,
            opened_at,
            peak_profit: 0.0,
            entry_order_pending: false,
        }
    }

    /// Leveraged profit ratio at `price`, relative to the average entry
    pub fn profit_ratio(&self, price: f64) -> f64 {
        let raw = match self.side {
            Side::Long => price / self.entry_price - 1.0,
            Side::Short => 1.0 - price / self.entry_price,
        };
        raw * self.leverage
    }

    /// Price movement against the position (negative when in profit)
    pub fn adverse_excursion(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => self.entry_price - price,
            Side::Short => price - self.entry_price,
        }
    }

    /// Raise `peak_profit` if `profit` is a new high. Returns the peak.
    pub fn record_profit(&mut self, profit: f64) -> f64 {
        if profit.is_finite() && profit > self.peak_profit {
            self.peak_profit = profit;
        }
        self.peak_profit
    }

    /// Apply an averaging fill: bump the entry count and re-average the entry
    /// price weighted by stake.
    ///
    /// `peak_profit` was measured against the old entry price, so it restarts
    /// at zero for the new average.
    pub fn record_fill(&mut self, price: f64, stake: f64, max_entries: u32) -> Result<()> {
        if self.entry_count >= max_entries {
            return Err(PolicyError::EntryLimit { max: max_entries });
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(PolicyError::InvalidFill(format!("price {}", price)));
        }
        if !(stake.is_finite() && stake > 0.0) {
            return Err(PolicyError::InvalidFill(format!("stake {}", stake)));
        }

        // Stake is quote currency, so quantity = stake / price
        let held_qty = self.total_stake / self.entry_price;
        let added_qty = stake / price;

        self.total_stake += stake;
        self.entry_price = self.total_stake / (held_qty + added_qty);
        self.entry_count += 1;
        self.entry_order_pending = false;
        self.peak_profit = 0.0;

        tracing::info!(
            "Averaged {} @ {:.4} (avg: {:.4}, entries: {}, stake: {:.2})",
            self.instrument,
            price,
            self.entry_price,
            self.entry_count,
            self.total_stake
        );

        Ok(())
    }

    /// Stake of the first fill, assuming equal-sized fills when not tracked separately
    pub fn average_fill_stake(&self) -> f64 {
        self.total_stake / self.entry_count.max(1) as f64
    }
}

/// Read-only view of the latest indicator values for one instrument
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub instrument: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub price: f64,
    pub atr: Option<f64>,
    pub rsi: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
}

/// Periods used to derive a snapshot from candles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub atr_period: usize,
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub stoch_fastk_period: usize,
    pub stoch_slowk_period: usize,
    pub stoch_slowd_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            rsi_period: 14,
            ema_fast_period: 20,
            ema_slow_period: 50,
            stoch_fastk_period: 5,
            stoch_slowk_period: 3,
            stoch_slowd_period: 3,
        }
    }
}

impl IndicatorConfig {
    /// Candles needed before every indicator is warm
    pub fn warmup_candles(&self) -> usize {
        let stoch = self.stoch_fastk_period + self.stoch_slowk_period + self.stoch_slowd_period - 2;
        [
            self.atr_period + 1,
            self.rsi_period + 1,
            self.ema_fast_period,
            self.ema_slow_period,
            stoch,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

impl MarketSnapshot {
    /// Snapshot with only a price; indicators unavailable
    pub fn at_price(instrument: impl Into<String>, price: f64) -> Self {
        Self {
            instrument: instrument.into(),
            price,
            ..Default::default()
        }
    }

    /// Derive a snapshot from the last candle of `candles`.
    ///
    /// Indicators without enough warm-up history are left as `None`.
    pub fn from_candles(
        instrument: impl Into<String>,
        candles: &[Candle],
        config: &IndicatorConfig,
    ) -> Result<Self> {
        let last = candles
            .last()
            .ok_or(PolicyError::MissingInput { field: "candles" })?;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let stoch = calculate_stochastic(
            candles,
            config.stoch_fastk_period,
            config.stoch_slowk_period,
            config.stoch_slowd_period,
        );

        let snapshot = Self {
            instrument: instrument.into(),
            timestamp: Some(last.timestamp),
            price: last.close,
            atr: calculate_atr(candles, config.atr_period),
            rsi: calculate_rsi(&closes, config.rsi_period),
            ema_fast: calculate_ema(&closes, config.ema_fast_period),
            ema_slow: calculate_ema(&closes, config.ema_slow_period),
            stoch_k: stoch.map(|(k, _)| k),
            stoch_d: stoch.map(|(_, d)| d),
        };

        if candles.len() < config.warmup_candles() {
            tracing::debug!(
                "Snapshot for {} built from {} candles, warm-up needs {}",
                snapshot.instrument,
                candles.len(),
                config.warmup_candles()
            );
        }

        Ok(snapshot)
    }
}

/// Exchange-imposed bounds on a single stake
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StakeLimits {
    pub min_stake: f64,
    pub max_stake: f64,
}

impl StakeLimits {
    pub fn new(min_stake: f64, max_stake: f64) -> Self {
        Self { min_stake, max_stake }
    }
}
