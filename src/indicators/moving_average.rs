/// Simple Moving Average over the last `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values[values.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    let seed = calculate_sma(values.get(..period)?, period)?;
    let alpha = 2.0 / (period as f64 + 1.0);

    Some(
        values[period..]
            .iter()
            .fold(seed, |ema, value| ema + alpha * (value - ema)),
    )
}
