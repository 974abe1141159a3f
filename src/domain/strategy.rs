//! Strategy configuration and compilation.
//!
//! A strategy is a `rule_chain`: named numeric parameters plus an ordered
//! list of `{if, do, qty}` rules. It is compiled once per run into
//! [`Strategy`], whose conditions are typed trees.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::SimError;
use crate::domain::rule::{Action, StrategyRule};
use crate::domain::rule_eval::{resolve_window, Environment, evaluate_rules};
use crate::domain::rule_parser;

pub const RULE_CHAIN: &str = "rule_chain";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(rename = "if", default)]
    pub condition: String,
    #[serde(rename = "do")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
}

fn default_kind() -> String {
    RULE_CHAIN.to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            kind: default_kind(),
            params: BTreeMap::new(),
            rules: Vec::new(),
        }
    }
}

impl StrategyConfig {
    /// The shipped SMA crossover with an RSI filter.
    pub fn sma_rsi_crossover() -> Self {
        let params = [("fast", 20.0), ("slow", 100.0), ("rsiw", 14.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        StrategyConfig {
            kind: default_kind(),
            params,
            rules: vec![
                RuleSpec {
                    condition: "sma(close,fast)>sma(close,slow) and rsi(close,rsiw)<70".into(),
                    action: "BUY".into(),
                    qty: Some(1000.0),
                },
                RuleSpec {
                    condition: "sma(close,fast)<sma(close,slow) or rsi(close,rsiw)>80".into(),
                    action: "SELL_ALL".into(),
                    qty: None,
                },
            ],
        }
    }

    pub fn compile(&self) -> Result<Strategy, SimError> {
        if self.kind != RULE_CHAIN {
            return Err(SimError::invalid(
                "strategy.type",
                format!("unsupported strategy type '{}'", self.kind),
            ));
        }

        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, spec)| compile_rule(index, spec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Strategy {
            params: self.params.clone(),
            rules,
        })
    }
}

fn compile_rule(index: usize, spec: &RuleSpec) -> Result<StrategyRule, SimError> {
    let condition = rule_parser::parse(&spec.condition).map_err(|source| SimError::RuleParse {
        index,
        condition: spec.condition.clone(),
        source,
    })?;

    let quantity = || -> Result<f64, SimError> {
        match spec.qty {
            Some(q) if q.is_finite() && q > 0.0 => Ok(q),
            Some(q) => Err(SimError::RuleInvalid {
                index,
                reason: format!("quantity must be positive, got {}", q),
            }),
            None => Err(SimError::RuleInvalid {
                index,
                reason: format!("{} requires a quantity", spec.action.to_uppercase()),
            }),
        }
    };

    let action = match spec.action.trim().to_uppercase().as_str() {
        "BUY" => Action::Buy(quantity()?),
        "SELL" => Action::Sell(quantity()?),
        "SELL_ALL" => Action::SellAll,
        "HOLD" => Action::Hold,
        other => {
            return Err(SimError::RuleInvalid {
                index,
                reason: format!("unknown action '{}'", other),
            });
        }
    };

    Ok(StrategyRule { condition, action })
}

/// A compiled rule chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub params: BTreeMap<String, f64>,
    pub rules: Vec<StrategyRule>,
}

impl Strategy {
    /// Evaluate the chain for one bar.
    pub fn decide(&self, close: &[f64], position: f64) -> Option<Action> {
        let env = Environment::new(close, &self.params, position);
        evaluate_rules(&self.rules, &env)
    }

    /// Bars of history needed before every resolvable indicator is defined.
    pub fn warmup_bars(&self) -> usize {
        let env = Environment::new(&[], &self.params, 0.0);
        self.rules
            .iter()
            .filter_map(|r| r.condition.as_ref())
            .flat_map(|c| c.indicator_calls())
            .filter_map(|call| {
                resolve_window(&call.window, &env).map(|w| call.kind.required_history(w))
            })
            .max()
            .unwrap_or(0)
    }
}
