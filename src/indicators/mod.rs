// Technical indicators used to build a MarketSnapshot.
// Each function takes a price/candle window and returns the latest value,
// or None while the window is shorter than the warm-up period.

pub mod atr;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;

pub use atr::{calculate_atr, calculate_atr_series, true_ranges};
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;
pub use stochastic::calculate_stochastic;
