//! Pre-trade and post-trade risk checks plus the daily loss window.
//!
//! Limits at or above [`DISABLED_AT`] are treated as disabled. The
//! per-trade check estimates only the fee drag of the trade, not adverse
//! price movement.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::bar::day_bucket;
use crate::domain::execution::{ExecutionPolicy, Side};
use crate::domain::ledger::Ledger;

/// Limits at or above this value are disabled.
pub const DISABLED_AT: f64 = 1e17;
/// Default for every monetary/quantity limit.
pub const UNBOUNDED: f64 = 1e18;

pub fn is_enabled(limit: f64) -> bool {
    limit < DISABLED_AT
}

fn unbounded() -> f64 {
    UNBOUNDED
}
fn no_drawdown_limit() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    #[serde(default = "unbounded")]
    pub max_position: f64,
    #[serde(default = "unbounded")]
    pub max_notional: f64,
    #[serde(default = "no_drawdown_limit")]
    pub max_drawdown: f64,
    #[serde(default = "unbounded")]
    pub daily_loss_limit: f64,
    #[serde(default = "unbounded")]
    pub per_trade_loss_limit: f64,
    /// When engaged, every BUY is denied; position-reducing sells still pass.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub kill_switch: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            max_position: UNBOUNDED,
            max_notional: UNBOUNDED,
            max_drawdown: no_drawdown_limit(),
            daily_loss_limit: UNBOUNDED,
            per_trade_loss_limit: UNBOUNDED,
            kill_switch: false,
        }
    }
}

impl RiskLimits {
    pub fn paper() -> Self {
        RiskLimits {
            max_position: 1e7,
            max_notional: 1e11,
            max_drawdown: 0.25,
            daily_loss_limit: 5e6,
            per_trade_loss_limit: 1e6,
            kill_switch: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    KillSwitch,
    PositionLimit,
    NotionalLimit,
    PerTradeLossLimit,
}

impl Denial {
    pub fn as_str(self) -> &'static str {
        match self {
            Denial::KillSwitch => "kill_switch",
            Denial::PositionLimit => "position_limit",
            Denial::NotionalLimit => "notional_limit",
            Denial::PerTradeLossLimit => "per_trade_loss_limit",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal, run-terminating risk condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    Drawdown,
    DailyLoss,
}

impl Breach {
    pub fn as_str(self) -> &'static str {
        match self {
            Breach::Drawdown => "drawdown_breach",
            Breach::DailyLoss => "daily_loss_limit",
        }
    }
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate an intent before any fill, in order: kill switch (buys only),
/// projected position, notional, estimated per-trade fee.
pub fn pre_trade_check(
    limits: &RiskLimits,
    policy: &ExecutionPolicy,
    side: Side,
    qty: f64,
    price: f64,
    position: f64,
) -> Result<(), Denial> {
    if limits.kill_switch && side == Side::Buy {
        return Err(Denial::KillSwitch);
    }
    let projected = position + side.sign() * qty;
    if projected.abs() > limits.max_position {
        return Err(Denial::PositionLimit);
    }
    if qty * price > limits.max_notional {
        return Err(Denial::NotionalLimit);
    }
    if is_enabled(limits.per_trade_loss_limit) {
        let (_, fee) = policy.price_and_fee(side, qty, price);
        if fee > limits.per_trade_loss_limit {
            return Err(Denial::PerTradeLossLimit);
        }
    }
    Ok(())
}

/// Current drawdown from the high-water mark; zero when the peak is not positive.
pub fn drawdown(peak: f64, equity: f64) -> f64 {
    if peak > 0.0 {
        (peak - equity) / peak
    } else {
        0.0
    }
}

/// Raise the ledger's peak if needed, then test drawdown against the limit.
pub fn post_trade_check(limits: &RiskLimits, ledger: &mut Ledger) -> Result<(), Breach> {
    if ledger.update_peak() {
        return Ok(());
    }
    if drawdown(ledger.equity_peak, ledger.equity) > limits.max_drawdown {
        return Err(Breach::Drawdown);
    }
    Ok(())
}

/// Rolling per-calendar-day loss anchor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailyWindow {
    /// Timestamp of the first bar of the tracked day; `None` before the first bar.
    pub start_ts: Option<i64>,
    pub start_equity: f64,
    pub loss: f64,
}

impl DailyWindow {
    /// Re-anchor on the first bar of a new day. `equity` is the equity
    /// carried into this bar. Returns whether the window was reset.
    pub fn roll(&mut self, ts: i64, equity: f64) -> bool {
        let same_day = self
            .start_ts
            .is_some_and(|start| day_bucket(start) == day_bucket(ts));
        if same_day {
            return false;
        }
        self.start_ts = Some(ts);
        self.start_equity = equity;
        self.loss = 0.0;
        true
    }

    /// Update the accumulated loss and test it against the daily limit.
    pub fn check(&mut self, limits: &RiskLimits, equity: f64) -> Result<(), Breach> {
        if !is_enabled(limits.daily_loss_limit) {
            return Ok(());
        }
        self.loss = (self.start_equity - equity).max(0.0);
        if self.loss > limits.daily_loss_limit {
            return Err(Breach::DailyLoss);
        }
        Ok(())
    }
}
