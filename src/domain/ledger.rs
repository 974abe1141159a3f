//! Cash, position, and equity state for one run, plus the per-bar trace.

use serde::{Deserialize, Serialize};

use crate::domain::audit::to_jsonl;
use crate::domain::error::SimError;

/// One trace record per completed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub ts: i64,
    pub close: f64,
    pub position: f64,
    pub cash: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub initial_cash: f64,
    pub cash: f64,
    pub position: f64,
    pub equity: f64,
    /// High-water mark of `equity`; never decreases.
    pub equity_peak: f64,
    pub trace: Vec<TracePoint>,
}

impl Ledger {
    pub fn new(initial_cash: f64) -> Self {
        Ledger {
            initial_cash,
            cash: initial_cash,
            position: 0.0,
            equity: initial_cash,
            equity_peak: initial_cash,
            trace: Vec::new(),
        }
    }

    /// Recompute `equity = cash + position * close`.
    pub fn mark_to_market(&mut self, close: f64) -> f64 {
        self.equity = self.cash + self.position * close;
        self.equity
    }

    /// Raise the high-water mark if equity made a new high. Returns whether it did.
    pub fn update_peak(&mut self) -> bool {
        if self.equity > self.equity_peak {
            self.equity_peak = self.equity;
            true
        } else {
            false
        }
    }

    pub fn record(&mut self, ts: i64, close: f64) {
        self.trace.push(TracePoint {
            ts,
            close,
            position: self.position,
            cash: self.cash,
            equity: self.equity,
        });
    }

    pub fn pnl(&self) -> f64 {
        self.equity - self.initial_cash
    }

    pub fn trace_jsonl(&self) -> Result<String, SimError> {
        to_jsonl(&self.trace)
    }
}
