//! Exponential Moving Average over the last `window` values.
//!
//! k = 2/(n+1), seeded with the first in-window value, then
//! e = x*k + e*(1-k) for each later value in the window.

pub fn ema(series: &[f64], window: usize) -> Option<f64> {
    if window == 0 || series.len() < window {
        return None;
    }
    let k = 2.0 / (window as f64 + 1.0);
    let tail = &series[series.len() - window..];
    let mut e = tail[0];
    for &x in &tail[1..] {
        e = x * k + e * (1.0 - k);
    }
    Some(e)
}
