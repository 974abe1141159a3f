//! Simple Moving Average: arithmetic mean of the last `window` values.

pub fn sma(series: &[f64], window: usize) -> Option<f64> {
    if window == 0 || series.len() < window {
        return None;
    }
    let tail = &series[series.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}
