/// Relative Strength Index (RSI), Wilder-smoothed
///
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// The first average gain/loss is a simple mean over `period` changes; later
/// changes are folded in with Wilder's smoothing, matching TA-Lib's RSI.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    let n = period as f64;
    for change in &changes[period..] {
        avg_gain = (avg_gain * (n - 1.0) + change.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-change).max(0.0)) / n;
    }

    if avg_loss == 0.0 {
        // Flat series has no direction
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
