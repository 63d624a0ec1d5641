// Entry/exit signal rules evaluated over a MarketSnapshot
pub mod scalping;
pub mod signals;

pub use scalping::SmartScalping;
pub use signals::{MarketCondition, SignalConfig, SignalSet};

use crate::error::Result;
use crate::models::MarketSnapshot;

/// Base trait for signal strategies
pub trait Strategy: Send + Sync {
    /// Entry/exit flags for the latest snapshot
    fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<SignalSet>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required before every indicator is warm
    fn min_candles_required(&self) -> usize;
}
