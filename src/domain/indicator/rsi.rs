//! RSI (Relative Strength Index) over the last `window` price changes.
//!
//! RSI = 100 - 100 / (1 + gains / losses), summed over the window.
//! If losses == 0: RSI = 100.
//!
//! Needs `window + 1` points to form `window` deltas.

pub fn rsi(series: &[f64], window: usize) -> Option<f64> {
    if window == 0 || series.len() <= window {
        return None;
    }

    let tail = &series[series.len() - window - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in tail.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    if losses == 0.0 {
        return Some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + gains / losses))
}
