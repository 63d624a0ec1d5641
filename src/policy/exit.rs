use serde::{Deserialize, Serialize};

use crate::config::ExitConfig;
use crate::models::{MarketSnapshot, Position, Side};
use crate::strategy::SignalConfig;

/// Why a position should be closed before its stop is hit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    RsiExitLong,
    RsiExitShort,
}

/// Profit target plus an RSI check against the position's side
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPolicy {
    take_profit: Option<f64>,
    rsi_exit: bool,
    rsi_overbought: f64,
    rsi_oversold: f64,
}

impl ExitPolicy {
    pub fn from_config(config: &ExitConfig, signals: &SignalConfig) -> Self {
        Self {
            take_profit: config.take_profit,
            rsi_exit: config.rsi_exit,
            rsi_overbought: signals.rsi_overbought,
            rsi_oversold: signals.rsi_oversold,
        }
    }

    /// First exit rule that fires, if any.
    ///
    /// The profit target is checked first. A missing RSI only skips the RSI rule.
    pub fn exit_reason(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
    ) -> Option<ExitReason> {
        let profit = position.profit_ratio(snapshot.price);
        if let Some(target) = self.take_profit {
            if profit.is_finite() && profit >= target {
                tracing::info!(
                    "🎯 {} take profit at {:.2}% (target {:.2}%)",
                    position.instrument,
                    profit * 100.0,
                    target * 100.0
                );
                return Some(ExitReason::TakeProfit);
            }
        }

        if !self.rsi_exit {
            return None;
        }
        let rsi = snapshot.rsi.filter(|r| r.is_finite())?;
        let reason = match position.side {
            Side::Long if rsi > self.rsi_overbought => ExitReason::RsiExitLong,
            Side::Short if rsi < self.rsi_oversold => ExitReason::RsiExitShort,
            _ => return None,
        };

        tracing::info!("{} {:?} (RSI {:.1})", position.instrument, reason, rsi);
        Some(reason)
    }
}
