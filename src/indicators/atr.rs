/// Average True Range (ATR)
///
/// Volatility measure used to scale averaging thresholds and trailing stops.
/// True Range is the greatest of:
/// - High - Low
/// - |High - Previous Close|
/// - |Low - Previous Close|
///
/// Smoothed with Wilder's method, seeded by the simple mean of the first
/// `period` true ranges.
use crate::models::Candle;

/// True ranges for every candle after the first
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect()
}

/// Latest ATR value, or None with fewer than `period + 1` candles
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period).last().copied()
}

/// ATR values from the first warm candle onward
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let ranges = true_ranges(candles);
    let seed = ranges[..period].iter().sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(ranges.len() - period + 1);
    series.push(seed);

    let mut atr = seed;
    for tr in &ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        series.push(atr);
    }

    series
}
