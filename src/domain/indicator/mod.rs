//! Technical indicators over a close-price series.
//!
//! Every indicator is a pure function of the tail of the series: it reads at
//! most the last `window` (+1 for RSI) values, never mutates the series, and
//! returns `None` when there is not enough history or the window is zero.

pub mod ema;
pub mod rsi;
pub mod sma;

use std::fmt;
use std::str::FromStr;

pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;

/// Indicator identity as named in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
}

impl IndicatorKind {
    pub fn compute(self, series: &[f64], window: usize) -> Option<f64> {
        match self {
            IndicatorKind::Sma => sma(series, window),
            IndicatorKind::Ema => ema(series, window),
            IndicatorKind::Rsi => rsi(series, window),
        }
    }

    /// Minimum series length for a defined value.
    pub fn required_history(self, window: usize) -> usize {
        match self {
            IndicatorKind::Sma | IndicatorKind::Ema => window,
            IndicatorKind::Rsi => window.saturating_add(1),
        }
    }
}

impl FromStr for IndicatorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sma" => Ok(IndicatorKind::Sma),
            "ema" => Ok(IndicatorKind::Ema),
            "rsi" => Ok(IndicatorKind::Rsi),
            _ => Err(()),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma => write!(f, "sma"),
            IndicatorKind::Ema => write!(f, "ema"),
            IndicatorKind::Rsi => write!(f, "rsi"),
        }
    }
}
