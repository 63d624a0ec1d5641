//! Policy configuration.
//!
//! One versioned struct enumerates every field the policy reads. Loading is
//! layered: built-in defaults, then an optional TOML file, then environment
//! variables prefixed `SMARTDCA` with `__` as the section separator
//! (e.g. `SMARTDCA__SIZING__RISK_FRACTION=0.01`).

use std::path::Path;

use chrono::NaiveTime;
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::IndicatorConfig;
use crate::strategy::signals::SignalConfig;

/// The only config schema version this build understands
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub version: u32,
    pub sizing: SizingConfig,
    pub averaging: AveragingConfig,
    pub stop: StopConfig,
    pub leverage: LeverageConfig,
    pub exit: ExitConfig,
    pub indicators: IndicatorConfig,
    pub signals: SignalConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sizing: SizingConfig::default(),
            averaging: AveragingConfig::default(),
            stop: StopConfig::default(),
            leverage: LeverageConfig::default(),
            exit: ExitConfig::default(),
            indicators: IndicatorConfig::default(),
            signals: SignalConfig::default(),
        }
    }
}

/// Risk Sizer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    pub risk_fraction: f64,     // Share of balance risked on the initial entry
    pub stake_multiplier: f64,  // Geometric step per averaging entry
    pub min_entry_capital: Option<f64>,
    pub max_entry_capital: Option<f64>,
    pub trading_hours: Option<TradingHours>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_fraction: 0.02,
            stake_multiplier: 1.6,
            min_entry_capital: None,
            max_entry_capital: None,
            trading_hours: None,
        }
    }
}

/// UTC time-of-day window for initial entries. `end` before `start` wraps midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TradingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Averaging Trigger settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AveragingConfig {
    pub enabled: bool,
    pub max_entries: u32, // Including the initial fill
    pub trigger: TriggerMode,
    pub add_stake: AddStakeMode,
}

impl Default for AveragingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 3,
            trigger: TriggerMode::default(),
            add_stake: AddStakeMode::Geometric,
        }
    }
}

/// When an averaging entry fires
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerMode {
    /// Adverse move of at least `ATR * atr_multiplier * entry_count`
    AtrExcursion { atr_multiplier: f64 },
    /// Profit ratio at or below `threshold` (negative)
    ProfitDrawdown { threshold: f64 },
}

impl Default for TriggerMode {
    fn default() -> Self {
        TriggerMode::AtrExcursion { atr_multiplier: 1.5 }
    }
}

/// How large an averaging entry is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddStakeMode {
    /// Risk Sizer stake scaled by `stake_multiplier^entry_index`
    Geometric,
    /// Exchange minimum stake
    MinStake,
    /// Same stake as the average fill so far
    InitialStake,
}

/// Stop Policy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StopConfig {
    pub static_stoploss: f64,
    pub entry_table: Vec<EntryStop>,
    pub profit_table: Vec<ProfitStop>,
    pub atr_trail: Option<AtrTrail>,
    pub ratchet: RatchetMode,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            static_stoploss: -0.10,
            entry_table: vec![
                EntryStop { min_entries: 1, fraction: -0.10 },
                EntryStop { min_entries: 2, fraction: -0.07 },
                EntryStop { min_entries: 3, fraction: -0.05 },
            ],
            profit_table: vec![ProfitStop { threshold: 0.02, fraction: -0.01 }],
            atr_trail: None,
            ratchet: RatchetMode::Latched,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EntryStop {
    pub min_entries: u32,
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProfitStop {
    pub threshold: f64,
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AtrTrail {
    pub multiplier: f64,
}

/// Which profit figure feeds the profit ratchet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RatchetMode {
    /// Peak profit seen on the position; a pull-back keeps the tighter stop
    #[default]
    Latched,
    /// Current profit only; a pull-back can loosen the stop again
    Recompute,
}

/// Leverage selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeverageConfig {
    pub max_leverage: f64,      // Cap before the exchange limit applies
    pub scale_by_entries: bool, // Divide by the number of fills so far
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            max_leverage: 3.0,
            scale_by_entries: true,
        }
    }
}

/// Early exit rules checked on every tick, ahead of the stop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExitConfig {
    /// Profit ratio that closes the position outright
    pub take_profit: Option<f64>,
    /// Close a long when RSI is overbought, a short when oversold
    pub rsi_exit: bool,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit: Some(0.03),
            rsi_exit: true,
        }
    }
}

impl PolicyConfig {
    /// Load defaults, then `path` (TOML) if given, then `SMARTDCA__*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("SMARTDCA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PolicyConfig = settings.try_deserialize()?;
        config.validate()?;

        tracing::info!(
            "Loaded policy config v{} (max entries: {}, static stop: {:.2}%)",
            config.version,
            config.averaging.max_entries,
            config.stop.static_stoploss * 100.0
        );

        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: PolicyConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the policy cannot act on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        self.validate_sizing()?;
        self.validate_averaging()?;
        self.validate_stop()?;
        self.validate_leverage_and_exit()?;
        self.validate_indicators()?;
        self.signals.validate()?;
        Ok(())
    }

    fn validate_sizing(&self) -> Result<(), ConfigError> {
        let s = &self.sizing;
        if !(s.risk_fraction.is_finite() && s.risk_fraction > 0.0 && s.risk_fraction <= 1.0) {
            return Err(invalid(format!(
                "sizing.risk_fraction must be in (0, 1], got {}",
                s.risk_fraction
            )));
        }
        if !(s.stake_multiplier.is_finite() && s.stake_multiplier > 0.0) {
            return Err(invalid(format!(
                "sizing.stake_multiplier must be positive, got {}",
                s.stake_multiplier
            )));
        }
        for (name, bound) in [
            ("min_entry_capital", s.min_entry_capital),
            ("max_entry_capital", s.max_entry_capital),
        ] {
            if let Some(v) = bound {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(invalid(format!("sizing.{} must be >= 0, got {}", name, v)));
                }
            }
        }
        if let (Some(min), Some(max)) = (s.min_entry_capital, s.max_entry_capital) {
            if min > max {
                return Err(invalid(format!(
                    "sizing.min_entry_capital ({}) exceeds max_entry_capital ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }

    fn validate_averaging(&self) -> Result<(), ConfigError> {
        let a = &self.averaging;
        if a.enabled && a.max_entries == 0 {
            return Err(invalid("averaging.max_entries must be >= 1 when averaging is enabled"));
        }
        match a.trigger {
            TriggerMode::AtrExcursion { atr_multiplier } => {
                if !(atr_multiplier.is_finite() && atr_multiplier > 0.0) {
                    return Err(invalid(format!(
                        "averaging.trigger.atr_multiplier must be positive, got {}",
                        atr_multiplier
                    )));
                }
            }
            TriggerMode::ProfitDrawdown { threshold } => {
                if !(threshold.is_finite() && threshold < 0.0) {
                    return Err(invalid(format!(
                        "averaging.trigger.threshold must be negative, got {}",
                        threshold
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_stop(&self) -> Result<(), ConfigError> {
        let s = &self.stop;
        if !(s.static_stoploss.is_finite() && (-1.0..0.0).contains(&s.static_stoploss)) {
            return Err(invalid(format!(
                "stop.static_stoploss must be in [-1, 0), got {}",
                s.static_stoploss
            )));
        }

        for row in &s.entry_table {
            check_fraction("stop.entry_table", row.fraction)?;
        }
        for pair in s.entry_table.windows(2) {
            if pair[1].min_entries <= pair[0].min_entries {
                return Err(invalid("stop.entry_table must be sorted by ascending min_entries"));
            }
            if pair[1].fraction < pair[0].fraction {
                return Err(invalid(
                    "stop.entry_table fractions must not loosen as entries grow",
                ));
            }
        }

        for row in &s.profit_table {
            check_fraction("stop.profit_table", row.fraction)?;
            if !row.threshold.is_finite() {
                return Err(invalid("stop.profit_table thresholds must be finite"));
            }
        }
        for pair in s.profit_table.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(invalid("stop.profit_table must be sorted by ascending threshold"));
            }
            if pair[1].fraction < pair[0].fraction {
                return Err(invalid(
                    "stop.profit_table fractions must not loosen as profit grows",
                ));
            }
        }

        if let Some(trail) = s.atr_trail {
            if !(trail.multiplier.is_finite() && trail.multiplier > 0.0) {
                return Err(invalid(format!(
                    "stop.atr_trail.multiplier must be positive, got {}",
                    trail.multiplier
                )));
            }
        }
        Ok(())
    }

    fn validate_leverage_and_exit(&self) -> Result<(), ConfigError> {
        let max = self.leverage.max_leverage;
        if !(max.is_finite() && max > 0.0) {
            return Err(invalid(format!("leverage.max_leverage must be positive, got {}", max)));
        }
        if let Some(target) = self.exit.take_profit {
            if !(target.is_finite() && target > 0.0) {
                return Err(invalid(format!("exit.take_profit must be positive, got {}", target)));
            }
        }
        Ok(())
    }

    fn validate_indicators(&self) -> Result<(), ConfigError> {
        let i = &self.indicators;
        let periods = [
            i.atr_period,
            i.rsi_period,
            i.ema_fast_period,
            i.ema_slow_period,
            i.stoch_fastk_period,
            i.stoch_slowk_period,
            i.stoch_slowd_period,
        ];
        if periods.contains(&0) {
            return Err(invalid("indicator periods must be >= 1"));
        }
        Ok(())
    }
}

fn check_fraction(table: &str, fraction: f64) -> Result<(), ConfigError> {
    if fraction.is_finite() && (-1.0..=0.0).contains(&fraction) {
        Ok(())
    } else {
        Err(invalid(format!("{} fractions must be in [-1, 0], got {}", table, fraction)))
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
