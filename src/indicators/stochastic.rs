use crate::indicators::calculate_sma;
use crate::models::Candle;

/// Slow Stochastic oscillator, returning the latest `(slow %K, slow %D)`.
///
/// Fast %K = 100 * (close - lowest low) / (highest high - lowest low) over
/// `fastk_period`; slow %K is its SMA over `slowk_period`, slow %D the SMA of
/// slow %K over `slowd_period`. Defaults in the strategy are 5/3/3.
pub fn calculate_stochastic(
    candles: &[Candle],
    fastk_period: usize,
    slowk_period: usize,
    slowd_period: usize,
) -> Option<(f64, f64)> {
    if fastk_period == 0 || slowk_period == 0 || slowd_period == 0 {
        return None;
    }
    if candles.len() < fastk_period {
        return None;
    }

    let fast_k: Vec<f64> = candles
        .windows(fastk_period)
        .map(|window| {
            let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let close = window[window.len() - 1].close;
            let range = highest - lowest;
            if range == 0.0 {
                50.0
            } else {
                100.0 * (close - lowest) / range
            }
        })
        .collect();

    if fast_k.len() < slowk_period {
        return None;
    }

    let slow_k: Vec<f64> = fast_k
        .windows(slowk_period)
        .map(|w| w.iter().sum::<f64>() / slowk_period as f64)
        .collect();

    let d = calculate_sma(&slow_k, slowd_period)?;
    let k = *slow_k.last()?;
    Some((k, d))
}
