use super::{
    signals::{MarketCondition, SignalConfig, SignalSet},
    Strategy,
};
use crate::error::{required, Result};
use crate::models::{IndicatorConfig, MarketSnapshot};

/// EMA trend scalper with RSI and Stochastic exits
///
/// - Long when the fast EMA is above the slow EMA, price is above the fast
///   EMA and RSI is not overbought; short is the mirror image.
/// - Exit on a Stochastic extreme, an RSI extreme, or a trend flip.
/// - Averaging and stops are left to the policy.
#[derive(Debug, Clone, Default)]
pub struct SmartScalping {
    signals: SignalConfig,
    indicators: IndicatorConfig,
}

impl SmartScalping {
    pub fn new(signals: SignalConfig, indicators: IndicatorConfig) -> Self {
        Self {
            signals,
            indicators,
        }
    }

    /// Trend direction and strength from the EMA pair
    pub fn market_condition(&self, ema_fast: f64, ema_slow: f64) -> MarketCondition {
        let strength = (ema_fast - ema_slow).abs() / ema_slow;
        if strength <= self.signals.trend_strength {
            MarketCondition::Ranging
        } else if ema_fast > ema_slow {
            MarketCondition::Uptrend
        } else {
            MarketCondition::Downtrend
        }
    }

    /// 1..=9 conviction score; later rules override earlier ones
    pub fn score(&self, uptrend: bool, rsi: f64, stoch_k: f64, stoch_d: f64) -> u8 {
        let c = &self.signals;
        let mut score = 5;

        if uptrend {
            if rsi < c.score_rsi_buy {
                score = 7;
            }
            if rsi < c.rsi_oversold {
                score = 8;
            }
            if stoch_k < c.stoch_oversold && stoch_d < c.stoch_oversold {
                score = 9;
            }
        } else {
            if rsi > c.score_rsi_sell {
                score = 3;
            }
            if rsi > c.rsi_overbought {
                score = 2;
            }
            if stoch_k > c.stoch_overbought && stoch_d > c.stoch_overbought {
                score = 1;
            }
        }

        score
    }
}

impl Strategy for SmartScalping {
    fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<SignalSet> {
        let c = &self.signals;
        let price = crate::error::finite(snapshot.price, "price")?;
        let ema_fast = required(snapshot.ema_fast, "ema_fast")?;
        let ema_slow = required(snapshot.ema_slow, "ema_slow")?;
        let rsi = required(snapshot.rsi, "rsi")?;
        let stoch_k = required(snapshot.stoch_k, "stoch_k")?;
        let stoch_d = required(snapshot.stoch_d, "stoch_d")?;

        // Equal EMAs count as a downtrend
        let uptrend = ema_fast > ema_slow;
        let downtrend = ema_fast < ema_slow;

        let signals = SignalSet {
            enter_long: uptrend && rsi < c.rsi_overbought && price > ema_fast,
            enter_short: downtrend && rsi > c.rsi_oversold && price < ema_fast,
            exit_long: (stoch_k > c.stoch_overbought && stoch_d > c.stoch_overbought)
                || rsi > c.rsi_overbought
                || downtrend,
            exit_short: (stoch_k < c.stoch_oversold && stoch_d < c.stoch_oversold)
                || rsi < c.rsi_oversold
                || uptrend,
            condition: self.market_condition(ema_fast, ema_slow),
            score: self.score(uptrend, rsi, stoch_k, stoch_d),
        };

        tracing::debug!(
            "🔍 {} {}: {:?} score={} long={} short={} (RSI {:.1}, K {:.1}, D {:.1})",
            self.name(),
            snapshot.instrument,
            signals.condition,
            signals.score,
            signals.enter_long,
            signals.enter_short,
            rsi,
            stoch_k,
            stoch_d
        );

        Ok(signals)
    }

    fn name(&self) -> &str {
        "SmartScalping"
    }

    fn min_candles_required(&self) -> usize {
        self.indicators.warmup_candles()
    }
}
