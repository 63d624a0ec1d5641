use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Candle;

/// Thresholds for the scalping entry/exit table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub stoch_overbought: f64,
    pub stoch_oversold: f64,
    pub trend_strength: f64, // EMA spread (relative) that counts as trending
    pub score_rsi_buy: f64,  // RSI under this in an uptrend lifts the score
    pub score_rsi_sell: f64, // RSI over this in a downtrend lowers it
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            stoch_overbought: 80.0,
            stoch_oversold: 20.0,
            trend_strength: 0.02,
            score_rsi_buy: 40.0,
            score_rsi_sell: 60.0,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let oscillators = [
            ("rsi_overbought", self.rsi_overbought),
            ("rsi_oversold", self.rsi_oversold),
            ("stoch_overbought", self.stoch_overbought),
            ("stoch_oversold", self.stoch_oversold),
            ("score_rsi_buy", self.score_rsi_buy),
            ("score_rsi_sell", self.score_rsi_sell),
        ];
        for (name, value) in oscillators {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "signals.{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if self.rsi_oversold >= self.rsi_overbought
            || self.stoch_oversold >= self.stoch_overbought
        {
            return Err(ConfigError::Invalid(
                "signals oversold thresholds must sit below overbought".to_string(),
            ));
        }
        if !(self.trend_strength.is_finite() && self.trend_strength >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "signals.trend_strength must be >= 0, got {}",
                self.trend_strength
            )));
        }
        Ok(())
    }
}

/// Entry/exit flags for one tick, one per direction
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SignalSet {
    pub enter_long: bool,
    pub enter_short: bool,
    pub exit_long: bool,
    pub exit_short: bool,
    pub condition: MarketCondition,
    pub score: u8, // 1 (strong sell) ..= 9 (strong buy), 5 neutral
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Uptrend,
    #[default]
    Ranging,
    Downtrend,
}

/// Validate that candles are sorted and evenly spaced
///
/// # Tolerance
/// Allows up to 1.5x the expected interval (e.g., 22.5 min for 15 min candles)
pub fn validate_candle_spacing(
    candles: &[Candle],
    expected_interval_secs: u64,
) -> anyhow::Result<()> {
    let max_gap_secs = expected_interval_secs + expected_interval_secs / 2;

    for window in candles.windows(2) {
        let gap = (window[1].timestamp - window[0].timestamp).num_seconds();

        if gap <= 0 {
            anyhow::bail!(
                "Candles are not strictly ordered at {}",
                window[1].timestamp.format("%Y-%m-%d %H:%M")
            );
        }

        if gap as u64 > max_gap_secs {
            anyhow::bail!(
                "Data gap: {}s between {} and {} (expected ~{}s)",
                gap,
                window[0].timestamp.format("%Y-%m-%d %H:%M"),
                window[1].timestamp.format("%Y-%m-%d %H:%M"),
                expected_interval_secs
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candles_at(minutes: &[i64]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        minutes
            .iter()
            .map(|&m| Candle {
                timestamp: base + chrono::Duration::minutes(m),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_default_config_valid() {
        assert!(SignalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = SignalConfig {
            rsi_oversold: 75.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_spacing_ok() {
        assert!(validate_candle_spacing(&candles_at(&[0, 15, 30, 45]), 900).is_ok());
        assert!(validate_candle_spacing(&candles_at(&[0]), 900).is_ok());
    }

    #[test]
    fn test_spacing_gap() {
        let err = validate_candle_spacing(&candles_at(&[0, 15, 60]), 900).unwrap_err();
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn test_spacing_unsorted() {
        assert!(validate_candle_spacing(&candles_at(&[0, 30, 15]), 900).is_err());
    }
}
