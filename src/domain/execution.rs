//! Order execution: slippage and fee model, slicing algorithms, and the
//! fill primitive that mutates the ledger.
//!
//! Effective price is `ref * (1 ± slip_bps / 10_000)` (worse for the
//! taker in both directions) and the fee is `effective * qty * fee_bps / 10_000`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::audit::{AuditKind, AuditTrail};
use crate::domain::ledger::Ledger;

const BPS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwapPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_slices")]
    pub slices: u32,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vwap_window")]
    pub window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PovPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_participation")]
    pub participation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcebergPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_child_size")]
    pub child_size: f64,
}

fn default_slices() -> u32 {
    10
}
fn default_duration_ms() -> i64 {
    600_000
}
fn default_vwap_window() -> usize {
    50
}
fn default_participation() -> f64 {
    0.1
}
fn default_child_size() -> f64 {
    1000.0
}
fn default_fee_bps() -> f64 {
    0.2
}
fn default_slip_bps() -> f64 {
    0.8
}

impl Default for TwapPolicy {
    fn default() -> Self {
        TwapPolicy {
            enabled: false,
            slices: default_slices(),
            duration_ms: default_duration_ms(),
        }
    }
}

impl Default for VwapPolicy {
    fn default() -> Self {
        VwapPolicy {
            enabled: false,
            window: default_vwap_window(),
        }
    }
}

impl Default for PovPolicy {
    fn default() -> Self {
        PovPolicy {
            enabled: false,
            participation: default_participation(),
        }
    }
}

impl Default for IcebergPolicy {
    fn default() -> Self {
        IcebergPolicy {
            enabled: false,
            child_size: default_child_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    #[serde(default = "default_fee_bps")]
    pub fee_bps: f64,
    #[serde(default = "default_slip_bps")]
    pub slip_bps: f64,
    #[serde(default)]
    pub twap: TwapPolicy,
    #[serde(default)]
    pub vwap: VwapPolicy,
    #[serde(default)]
    pub pov: PovPolicy,
    #[serde(default)]
    pub iceberg: IcebergPolicy,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        ExecutionPolicy {
            fee_bps: default_fee_bps(),
            slip_bps: default_slip_bps(),
            twap: TwapPolicy::default(),
            vwap: VwapPolicy::default(),
            pov: PovPolicy::default(),
            iceberg: IcebergPolicy::default(),
        }
    }
}

/// The slicing mode in force for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlicingMode {
    Single,
    Twap { slices: u32, duration_ms: i64 },
    Vwap { window: usize },
    Pov { participation: f64 },
    Iceberg { child_size: f64 },
}

impl ExecutionPolicy {
    /// First enabled mode in the order TWAP, VWAP, POV, iceberg.
    pub fn active_mode(&self) -> SlicingMode {
        if self.twap.enabled {
            SlicingMode::Twap {
                slices: self.twap.slices,
                duration_ms: self.twap.duration_ms,
            }
        } else if self.vwap.enabled {
            SlicingMode::Vwap {
                window: self.vwap.window,
            }
        } else if self.pov.enabled {
            SlicingMode::Pov {
                participation: self.pov.participation,
            }
        } else if self.iceberg.enabled {
            SlicingMode::Iceberg {
                child_size: self.iceberg.child_size,
            }
        } else {
            SlicingMode::Single
        }
    }

    pub fn enabled_modes(&self) -> usize {
        [
            self.twap.enabled,
            self.vwap.enabled,
            self.pov.enabled,
            self.iceberg.enabled,
        ]
        .into_iter()
        .filter(|e| *e)
        .count()
    }

    /// Effective price and fee for `qty` at reference `price`.
    pub fn price_and_fee(&self, side: Side, qty: f64, price: f64) -> (f64, f64) {
        let effective = price + side.sign() * price * self.slip_bps / BPS;
        let fee = effective * qty * self.fee_bps / BPS;
        (effective, fee)
    }
}

/// An approved intent ready for execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub side: Side,
    pub qty: f64,
    /// Reference price, normally the bar close.
    pub price: f64,
    pub ts: i64,
}

/// Market data visible to the slicer on the current bar.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot<'a> {
    /// Close series up to and including the current bar.
    pub closes: &'a [f64],
    pub bar_volume: f64,
}

/// Apply one fill against the ledger at reference price `price`.
///
/// BUY fills whole or not at all (`insufficient_cash`). SELL quantity is
/// clamped to the long position; any clamped amount is recorded as an
/// `insufficient_position` reject. Returns the quantity actually filled.
pub fn apply_fill(
    policy: &ExecutionPolicy,
    side: Side,
    qty: f64,
    price: f64,
    ts: i64,
    ledger: &mut Ledger,
    audit: &mut AuditTrail,
) -> f64 {
    if qty.is_nan() || qty <= 0.0 {
        return 0.0;
    }

    match side {
        Side::Buy => {
            let (effective, fee) = policy.price_and_fee(side, qty, price);
            let cost = effective * qty + fee;
            if ledger.cash < cost {
                tracing::debug!(ts, qty, cost, cash = ledger.cash, "buy rejected");
                audit.append(ts, AuditKind::reject_order("insufficient_cash", side, qty));
                return 0.0;
            }
            ledger.cash -= cost;
            ledger.position += qty;
            audit.append(
                ts,
                AuditKind::Fill {
                    side,
                    qty,
                    price: effective,
                    fee,
                },
            );
            qty
        }
        Side::Sell => {
            let available = ledger.position.max(0.0);
            let sell_qty = qty.min(available);
            if sell_qty > 0.0 {
                let (effective, fee) = policy.price_and_fee(side, sell_qty, price);
                ledger.cash += effective * sell_qty - fee;
                ledger.position -= sell_qty;
                audit.append(
                    ts,
                    AuditKind::Fill {
                        side,
                        qty: sell_qty,
                        price: effective,
                        fee,
                    },
                );
            }
            if sell_qty < qty {
                audit.append(
                    ts,
                    AuditKind::reject_order("insufficient_position", side, qty - sell_qty),
                );
            }
            sell_qty
        }
    }
}

/// Execute an order under the policy's active slicing mode. Returns the
/// total quantity filled across all child fills.
pub fn execute(
    policy: &ExecutionPolicy,
    order: &Order,
    market: &MarketSnapshot<'_>,
    ledger: &mut Ledger,
    audit: &mut AuditTrail,
) -> f64 {
    match policy.active_mode() {
        SlicingMode::Single => apply_fill(
            policy,
            order.side,
            order.qty,
            order.price,
            order.ts,
            ledger,
            audit,
        ),
        SlicingMode::Twap {
            slices,
            duration_ms,
        } => {
            let mut filled = 0.0;
            for (i, (child, ts)) in
                twap_schedule(order.qty, order.ts, slices, duration_ms).enumerate()
            {
                let f = apply_fill(policy, order.side, child, order.price, ts, ledger, audit);
                filled += f;
                if f <= 0.0 {
                    tracing::debug!(slice = i, "twap stopped on empty child fill");
                    break;
                }
            }
            filled
        }
        SlicingMode::Vwap { window } => {
            let reference = vwap_price(market.closes, window).unwrap_or(order.price);
            apply_fill(
                policy, order.side, order.qty, reference, order.ts, ledger, audit,
            )
        }
        SlicingMode::Pov { participation } => {
            let qty = pov_quantity(order.qty, participation, market.bar_volume);
            apply_fill(policy, order.side, qty, order.price, order.ts, ledger, audit)
        }
        SlicingMode::Iceberg { child_size } => {
            let child_size = child_size.max(1.0);
            let children = (order.qty / child_size).ceil();
            let mut remaining = order.qty;
            let mut filled = 0.0;
            let mut sent = 0.0;
            while remaining > 0.0 && sent < children {
                let child = child_size.min(remaining);
                let f = apply_fill(policy, order.side, child, order.price, order.ts, ledger, audit);
                filled += f;
                sent += 1.0;
                let left = remaining - f;
                if f < child || left >= remaining {
                    break;
                }
                remaining = left;
            }
            filled
        }
    }
}

/// Child quantities and timestamps for a TWAP order. Children are equal
/// except the last, which absorbs the rounding remainder; child `i` is
/// stamped `ts + i * floor(duration_ms / slices)`. Children are produced
/// lazily, so a caller that stops early never builds the rest.
pub fn twap_schedule(
    qty: f64,
    ts: i64,
    slices: u32,
    duration_ms: i64,
) -> impl Iterator<Item = (f64, i64)> {
    let slices = slices.max(1);
    let per = qty / f64::from(slices);
    let step = duration_ms.div_euclid(i64::from(slices));
    (0..slices).map(move |i| {
        let child = if i + 1 == slices {
            qty - per * f64::from(slices - 1)
        } else {
            per
        };
        (child, ts.saturating_add(i64::from(i) * step))
    })
}

/// Equal-weighted mean of the trailing `window` closes; `None` on an empty series.
pub fn vwap_price(closes: &[f64], window: usize) -> Option<f64> {
    if closes.is_empty() {
        return None;
    }
    let w = window.clamp(1, closes.len());
    let tail = &closes[closes.len() - w..];
    Some(tail.iter().sum::<f64>() / w as f64)
}

/// `participation * max(1, bar_volume)`, capped at the requested quantity.
pub fn pov_quantity(qty: f64, participation: f64, bar_volume: f64) -> f64 {
    qty.min(participation * bar_volume.max(1.0))
}
