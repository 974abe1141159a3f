//! Run summary statistics.

use serde::{Deserialize, Serialize};

use crate::domain::audit::AuditTrail;
use crate::domain::ledger::{Ledger, TracePoint};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub initial_cash: f64,
    pub final_equity: f64,
    pub pnl: f64,
    #[serde(rename = "return")]
    pub total_return: f64,
    pub fills: usize,
    pub sharpe: Option<f64>,
    pub config_hash: String,
    /// Completed bars, i.e. trace length.
    pub bars: usize,
}

impl Summary {
    pub fn compute(ledger: &Ledger, audit: &AuditTrail, config_hash: &str) -> Self {
        let pnl = ledger.pnl();
        let total_return = if ledger.initial_cash > 0.0 {
            pnl / ledger.initial_cash
        } else {
            0.0
        };

        Summary {
            initial_cash: ledger.initial_cash,
            final_equity: ledger.equity,
            pnl,
            total_return,
            fills: audit.count("fill"),
            sharpe: sharpe_ratio(&ledger.trace),
            config_hash: config_hash.to_string(),
            bars: ledger.trace.len(),
        }
    }
}

/// Annualized Sharpe ratio of bar-over-bar equity returns: mean over
/// sample standard deviation, scaled by √252.
///
/// `None` with fewer than 3 trace points, fewer than 2 usable returns
/// (a return needs a positive previous equity), or zero dispersion.
pub fn sharpe_ratio(trace: &[TracePoint]) -> Option<f64> {
    if trace.len() < 3 {
        return None;
    }

    let returns: Vec<f64> = trace
        .windows(2)
        .filter(|w| w[0].equity > 0.0)
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect();

    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if std_dev == 0.0 || !std_dev.is_finite() {
        return None;
    }
    Some(mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt())
}
