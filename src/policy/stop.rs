use serde::{Deserialize, Serialize};

use crate::config::{AtrTrail, EntryStop, ProfitStop, RatchetMode, StopConfig};
use crate::models::{MarketSnapshot, Position};

/// Which rule produced the stop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopSource {
    Static,
    EntryCount,
    ProfitRatchet,
    AtrTrail,
}

/// Relative stop-loss fraction, always in `[static_stoploss, 0]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StopLevel {
    pub fraction: f64,
    pub source: StopSource,
}

/// Picks the tightest stop among the entry-count table, the profit ratchet
/// and an optional ATR trail, floored at the static stoploss.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPolicy {
    static_stoploss: f64,
    entry_table: Vec<EntryStop>,
    profit_table: Vec<ProfitStop>,
    atr_trail: Option<AtrTrail>,
    ratchet: RatchetMode,
}

impl StopPolicy {
    pub fn from_config(config: &StopConfig) -> Self {
        Self {
            static_stoploss: config.static_stoploss,
            entry_table: config.entry_table.clone(),
            profit_table: config.profit_table.clone(),
            atr_trail: config.atr_trail,
            ratchet: config.ratchet,
        }
    }

    pub fn static_stoploss(&self) -> f64 {
        self.static_stoploss
    }

    /// Stop for a bare `(entry_count, profit)` pair against `static_stoploss`.
    /// A non-finite profit skips the profit ratchet.
    pub fn stop_level(
        &self,
        entry_count: u32,
        unrealized_profit: f64,
        static_stoploss: f64,
    ) -> StopLevel {
        self.resolve(entry_count, unrealized_profit, None, static_stoploss)
    }

    /// Stop for a live position at the snapshot price
    pub fn for_position(&self, position: &Position, snapshot: &MarketSnapshot) -> StopLevel {
        let profit = position.profit_ratio(snapshot.price);
        let ratchet_profit = match self.ratchet {
            // f64::max ignores a NaN side, so a missing price still uses the peak
            RatchetMode::Latched => profit.max(position.peak_profit),
            RatchetMode::Recompute => profit,
        };

        let trail = self.atr_trail.and_then(|trail| {
            let atr = snapshot.atr.filter(|a| a.is_finite() && *a >= 0.0)?;
            let price = Some(snapshot.price).filter(|p| p.is_finite() && *p > 0.0)?;
            Some(-(atr * trail.multiplier / price))
        });

        let level = self.resolve(position.entry_count, ratchet_profit, trail, self.static_stoploss);

        tracing::debug!(
            "{} stop {:.2}% via {:?} (profit {:.2}%, entries {})",
            position.instrument,
            level.fraction * 100.0,
            level.source,
            profit * 100.0,
            position.entry_count
        );

        level
    }

    fn resolve(
        &self,
        entry_count: u32,
        profit: f64,
        trail: Option<f64>,
        static_stoploss: f64,
    ) -> StopLevel {
        let floor = if static_stoploss.is_finite() {
            static_stoploss.clamp(-1.0, 0.0)
        } else {
            self.static_stoploss
        };

        let mut best = StopLevel {
            fraction: floor,
            source: StopSource::Static,
        };
        let mut consider = |fraction: f64, source: StopSource| {
            if fraction.is_finite() && fraction > best.fraction {
                best = StopLevel { fraction, source };
            }
        };

        // Last row whose min_entries is reached; the table is sorted ascending
        if let Some(row) = self.entry_table.iter().rev().find(|r| r.min_entries <= entry_count) {
            consider(row.fraction, StopSource::EntryCount);
        }

        if profit.is_finite() {
            for row in self.profit_table.iter().filter(|r| profit >= r.threshold) {
                consider(row.fraction, StopSource::ProfitRatchet);
            }
        }

        if let Some(fraction) = trail {
            consider(fraction, StopSource::AtrTrail);
        }

        best.fraction = best.fraction.min(0.0);
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::{TimeZone, Utc};

    fn policy() -> StopPolicy {
        StopPolicy::from_config(&StopConfig::default())
    }

    fn position(price: f64) -> Position {
        let opened = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Position::open("DOGE/USDT", Side::Long, price, 20.0, 1.0, opened)
    }

    #[test]
    fn test_profit_ratchet_tightens() {
        let level = policy().stop_level(1, 0.025, -0.05);
        assert_eq!(level.fraction, -0.01);
        assert_eq!(level.source, StopSource::ProfitRatchet);
    }

    #[test]
    fn test_entry_table_tightens_with_entries() {
        let p = policy();
        assert_eq!(p.stop_level(1, 0.0, -0.10).fraction, -0.10);
        assert_eq!(p.stop_level(2, 0.0, -0.10).fraction, -0.07);
        assert_eq!(p.stop_level(3, 0.0, -0.10).fraction, -0.05);
        assert_eq!(p.stop_level(9, 0.0, -0.10).fraction, -0.05);
    }

    #[test]
    fn test_never_looser_than_static() {
        // Entry table says -0.10 but the static floor is -0.08
        let level = policy().stop_level(1, 0.0, -0.08);
        assert_eq!(level.fraction, -0.08);
        assert_eq!(level.source, StopSource::Static);
    }

    #[test]
    fn test_nan_profit_falls_back() {
        let level = policy().stop_level(1, f64::NAN, -0.10);
        assert_eq!(level.fraction, -0.10);

        let level = policy().stop_level(1, 0.5, f64::NAN);
        assert_eq!(level.fraction, -0.01);
    }

    #[test]
    fn test_latched_ratchet_survives_pullback() {
        let p = policy();
        let mut pos = position(100.0);

        pos.record_profit(pos.profit_ratio(103.0));
        let level = p.for_position(&pos, &MarketSnapshot::at_price("DOGE/USDT", 103.0));
        assert_eq!(level.fraction, -0.01);

        // Back to +0.5%: still the tight stop
        let level = p.for_position(&pos, &MarketSnapshot::at_price("DOGE/USDT", 100.5));
        assert_eq!(level.fraction, -0.01);
        assert_eq!(level.source, StopSource::ProfitRatchet);
    }

    #[test]
    fn test_latched_ratchet_restarts_after_fill() {
        let p = policy();
        let mut pos = position(100.0);
        pos.record_profit(pos.profit_ratio(103.0));

        pos.record_fill(90.0, 20.0, 3).unwrap();
        let level = p.for_position(&pos, &MarketSnapshot::at_price("DOGE/USDT", 94.0));
        assert_eq!(level.fraction, -0.07);
        assert_eq!(level.source, StopSource::EntryCount);
    }

    #[test]
    fn test_recompute_ratchet_loosens_after_pullback() {
        let config = StopConfig {
            ratchet: RatchetMode::Recompute,
            ..StopConfig::default()
        };
        let p = StopPolicy::from_config(&config);
        let mut pos = position(100.0);

        pos.record_profit(pos.profit_ratio(103.0));
        let level = p.for_position(&pos, &MarketSnapshot::at_price("DOGE/USDT", 100.5));
        assert_eq!(level.fraction, -0.10);
        assert_eq!(level.source, StopSource::Static);
    }

    #[test]
    fn test_atr_trail_candidate() {
        let config = StopConfig {
            atr_trail: Some(AtrTrail { multiplier: 2.5 }),
            ..StopConfig::default()
        };
        let p = StopPolicy::from_config(&config);
        let pos = position(100.0);

        // 2 * 2.5 / 100 = 5% trail, tighter than the -10% entry stop
        let snapshot = MarketSnapshot {
            atr: Some(2.0),
            ..MarketSnapshot::at_price("DOGE/USDT", 100.0)
        };
        let level = p.for_position(&pos, &snapshot);
        assert!((level.fraction + 0.05).abs() < 1e-12);
        assert_eq!(level.source, StopSource::AtrTrail);

        // Warm-up: no ATR, trail skipped
        let level = p.for_position(&pos, &MarketSnapshot::at_price("DOGE/USDT", 100.0));
        assert_eq!(level.fraction, -0.10);
        assert_eq!(level.source, StopSource::Static);
    }
}
