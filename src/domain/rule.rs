//! Rule AST data structures.
//!
//! This module defines the compiled form of a rule chain:
//! - `Operand`: what can be compared (literals, named values, indicator calls)
//! - `IndicatorCall`: an indicator applied to a named series with a window
//! - `Condition`: comparisons joined by `and`/`or`, folded strictly left to right
//! - `Action` / `StrategyRule`: what fires when a condition holds

use crate::domain::indicator::IndicatorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(f64),
    /// A strategy parameter, `position`, or any other environment name.
    Name(String),
    Indicator(IndicatorCall),
    /// A call to a function that is not a known indicator. Never resolves.
    UnknownCall(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorCall {
    pub kind: IndicatorKind,
    pub series: String,
    pub window: WindowRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowRef {
    Literal(i64),
    Param(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl CompareOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: Operand,
    pub op: CompareOp,
    pub rhs: Operand,
}

/// Boolean condition tree.
///
/// The parser builds `And`/`Or` nodes left-deep, so `a or b and c` is
/// `(a or b) and c`: mixed chains fold in textual order with no precedence.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Comparison),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Indicator calls referenced anywhere in the condition.
    pub fn indicator_calls(&self) -> Vec<&IndicatorCall> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a IndicatorCall>) {
        match self {
            Condition::Compare(cmp) => {
                for operand in [&cmp.lhs, &cmp.rhs] {
                    if let Operand::Indicator(call) = operand {
                        out.push(call);
                    }
                }
            }
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_calls(out);
                r.collect_calls(out);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Buy(f64),
    Sell(f64),
    SellAll,
    Hold,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Buy(_) => "BUY",
            Action::Sell(_) => "SELL",
            Action::SellAll => "SELL_ALL",
            Action::Hold => "HOLD",
        }
    }
}

/// One compiled rule. `condition == None` means "always true".
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRule {
    pub condition: Option<Condition>,
    pub action: Action,
}
