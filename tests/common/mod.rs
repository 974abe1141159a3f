#![allow(dead_code)]

use simtrader::domain::bar::Bar;
use simtrader::domain::config::SimConfig;
use simtrader::domain::control_plane::ControlPlane;
use simtrader::domain::error::SimError;
use simtrader::domain::strategy::{RuleSpec, StrategyConfig};
use simtrader::ports::data_port::TextSource;
use std::collections::HashMap;

pub const DAY0: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z
pub const MINUTE: i64 = 60_000;

pub fn make_bar(ts: i64, close: f64) -> Bar {
    Bar {
        ts,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000.0,
    }
}

/// One bar per close, `step` milliseconds apart starting at `DAY0`.
pub fn make_bars(closes: &[f64], step: i64) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(DAY0 + i as i64 * step, c))
        .collect()
}

pub fn rule(condition: &str, action: &str, qty: Option<f64>) -> RuleSpec {
    RuleSpec {
        condition: condition.to_string(),
        action: action.to_string(),
        qty,
    }
}

pub fn rule_chain(rules: Vec<RuleSpec>) -> StrategyConfig {
    StrategyConfig {
        rules,
        ..StrategyConfig::default()
    }
}

/// Unbounded limits, zero friction, and a strategy that buys `qty` once.
pub fn buy_once_config(qty: f64) -> SimConfig {
    let mut config = SimConfig::default();
    config.execution.fee_bps = 0.0;
    config.execution.slip_bps = 0.0;
    config.strategy = rule_chain(vec![rule("position == 0", "BUY", Some(qty))]);
    config
}

/// Serves fixed text per location; unknown locations fail.
pub struct MockTextSource {
    pub texts: HashMap<String, String>,
}

impl MockTextSource {
    pub fn new() -> Self {
        Self {
            texts: HashMap::new(),
        }
    }

    pub fn with_text(mut self, location: &str, text: &str) -> Self {
        self.texts.insert(location.to_string(), text.to_string());
        self
    }
}

impl TextSource for MockTextSource {
    fn fetch_text(&self, location: &str) -> Result<String, SimError> {
        self.texts
            .get(location)
            .cloned()
            .ok_or_else(|| SimError::DataSource {
                reason: format!("no text at {}", location),
            })
    }
}

pub fn paper_plane() -> ControlPlane {
    ControlPlane::new(SimConfig::paper(), Box::new(MockTextSource::new())).unwrap()
}

pub fn bars_csv(bars: &[Bar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.ts, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    out
}
