//! Rule evaluation engine.
//!
//! Evaluates compiled conditions against the per-bar environment.
//!
//! # Evaluation Semantics
//!
//! - Comparisons whose operands do not resolve (unknown name, unknown
//!   function, indicator without enough history) are `false`, never errors
//! - `And`/`Or` nodes short-circuit; the tree is left-deep so chains fold
//!   in textual order
//! - A rule chain fires the action of the first rule whose condition holds
//!   (or has no condition); later rules are not evaluated

use std::collections::BTreeMap;

use crate::domain::rule::{Action, Condition, IndicatorCall, Operand, StrategyRule, WindowRef};

/// Values visible to conditions on one bar.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub close: &'a [f64],
    pub params: &'a BTreeMap<String, f64>,
    pub position: f64,
}

impl<'a> Environment<'a> {
    pub fn new(close: &'a [f64], params: &'a BTreeMap<String, f64>, position: f64) -> Self {
        Self {
            close,
            params,
            position,
        }
    }

    /// Scalar lookup: strategy parameters shadow built-in names.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        if let Some(v) = self.params.get(name) {
            return Some(*v);
        }
        match name {
            "position" => Some(self.position),
            _ => None,
        }
    }

    pub fn series(&self, name: &str) -> Option<&'a [f64]> {
        match name {
            "close" => Some(self.close),
            _ => None,
        }
    }
}

/// First action whose rule fires, or `None` when no rule fires.
pub fn evaluate_rules(rules: &[StrategyRule], env: &Environment<'_>) -> Option<Action> {
    rules
        .iter()
        .find(|rule| match &rule.condition {
            None => true,
            Some(cond) => evaluate(cond, env),
        })
        .map(|rule| rule.action)
}

pub fn evaluate(condition: &Condition, env: &Environment<'_>) -> bool {
    match condition {
        Condition::Compare(cmp) => {
            match (resolve_operand(&cmp.lhs, env), resolve_operand(&cmp.rhs, env)) {
                (Some(lhs), Some(rhs)) => cmp.op.apply(lhs, rhs),
                _ => false,
            }
        }
        Condition::And(lhs, rhs) => evaluate(lhs, env) && evaluate(rhs, env),
        Condition::Or(lhs, rhs) => evaluate(lhs, env) || evaluate(rhs, env),
    }
}

pub fn resolve_operand(operand: &Operand, env: &Environment<'_>) -> Option<f64> {
    match operand {
        Operand::Literal(v) => Some(*v),
        Operand::Name(name) => env.scalar(name),
        Operand::Indicator(call) => resolve_indicator(call, env),
        Operand::UnknownCall(_) => None,
    }
}

fn resolve_indicator(call: &IndicatorCall, env: &Environment<'_>) -> Option<f64> {
    let series = env.series(&call.series)?;
    let window = resolve_window(&call.window, env)?;
    call.kind.compute(series, window)
}

/// Window sizes come from literals or parameters; parameter values are
/// truncated toward zero. Non-positive windows do not resolve.
pub fn resolve_window(window: &WindowRef, env: &Environment<'_>) -> Option<usize> {
    let raw = match window {
        WindowRef::Literal(n) => *n as f64,
        WindowRef::Param(name) => env.scalar(name)?,
    };
    if !raw.is_finite() || raw.trunc() < 1.0 {
        return None;
    }
    Some(raw.trunc() as usize)
}
