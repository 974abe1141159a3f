//! Bar-by-bar simulation loop for one backtest run.
//!
//! Per bar, in order:
//! 1. append the close to the series
//! 2. evaluate the rule chain
//! 3. roll the daily window (anchored on the equity carried into the bar)
//! 4. pre-trade check, then execute
//! 5. recompute equity
//! 6. daily loss check; a breach halts before the trace append
//! 7. drawdown check, trace append; a breach halts after the append
//!
//! A drawdown-breaching bar is therefore in the trace; a daily-loss-breaching
//! bar is not.

use crate::domain::audit::{AuditKind, AuditTrail};
use crate::domain::bar::Bar;
use crate::domain::config::SimConfig;
use crate::domain::config_validation::validate_config;
use crate::domain::error::SimError;
use crate::domain::execution::{MarketSnapshot, Order, Side, execute};
use crate::domain::ledger::{Ledger, TracePoint};
use crate::domain::metrics::Summary;
use crate::domain::risk::{self, Breach, DailyWindow};
use crate::domain::rule::Action;
use crate::domain::strategy::Strategy;

/// Mutable state owned by exactly one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub ledger: Ledger,
    pub close: Vec<f64>,
    pub bar_volume: f64,
    pub daily: DailyWindow,
}

impl SimulationState {
    pub fn new(initial_cash: f64) -> Self {
        SimulationState {
            ledger: Ledger::new(initial_cash),
            close: Vec::new(),
            bar_volume: 0.0,
            daily: DailyWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub summary: Summary,
    pub audit: AuditTrail,
    pub trace: Vec<TracePoint>,
    /// The circuit breaker that stopped the run early, if any.
    pub halt: Option<Breach>,
}

impl RunOutcome {
    pub fn trace_jsonl(&self) -> Result<String, SimError> {
        crate::domain::audit::to_jsonl(&self.trace)
    }
}

/// Run one backtest over `bars` (ascending by timestamp).
///
/// Denials and breaches are outcomes, not errors: they land in the audit
/// trail and the run still produces a summary. `Err` means the config was
/// invalid or the ledger reached a non-finite state.
pub fn run_backtest(config: &SimConfig, bars: &[Bar]) -> Result<RunOutcome, SimError> {
    validate_config(config)?;
    let strategy = config.strategy.compile()?;
    let config_hash = config.content_hash()?;

    let mut audit = AuditTrail::new();
    let start_ts = bars.first().map(|b| b.ts).unwrap_or_default();
    audit.append(
        start_ts,
        AuditKind::ConfigSnapshot {
            hash: config_hash.clone(),
        },
    );

    tracing::info!(
        bars = bars.len(),
        rules = strategy.rules.len(),
        warmup = strategy.warmup_bars(),
        mode = ?config.execution.active_mode(),
        hash = %config_hash,
        "run started"
    );

    let mut state = SimulationState::new(config.initial_cash);
    let mut halt = None;

    for bar in bars {
        if let Some(breach) = step(config, &strategy, bar, &mut state, &mut audit)? {
            tracing::warn!(ts = bar.ts, reason = %breach, equity = state.ledger.equity, "circuit breaker");
            audit.append(bar.ts, AuditKind::circuit_breaker(breach.as_str()));
            halt = Some(breach);
            break;
        }
    }

    let summary = Summary::compute(&state.ledger, &audit, &config_hash);
    tracing::info!(
        final_equity = summary.final_equity,
        pnl = summary.pnl,
        fills = summary.fills,
        bars = summary.bars,
        halted = halt.is_some(),
        "run finished"
    );

    Ok(RunOutcome {
        summary,
        audit,
        trace: state.ledger.trace,
        halt,
    })
}

/// Process one bar. Returns the breach that must halt the run, if any.
fn step(
    config: &SimConfig,
    strategy: &Strategy,
    bar: &Bar,
    state: &mut SimulationState,
    audit: &mut AuditTrail,
) -> Result<Option<Breach>, SimError> {
    state.close.push(bar.close);
    state.bar_volume = bar.volume;

    let intent = strategy.decide(&state.close, state.ledger.position);
    state.daily.roll(bar.ts, state.ledger.equity);

    if let Some(action) = intent {
        act(config, action, bar, state, audit);
    }

    let equity = state.ledger.mark_to_market(bar.close);
    if !equity.is_finite() {
        return Err(SimError::Run {
            reason: format!("non-finite equity at ts {}", bar.ts),
        });
    }

    if let Err(breach) = state.daily.check(&config.risk, equity) {
        return Ok(Some(breach));
    }

    let post = risk::post_trade_check(&config.risk, &mut state.ledger);
    state.ledger.record(bar.ts, bar.close);
    Ok(post.err())
}

fn act(
    config: &SimConfig,
    action: Action,
    bar: &Bar,
    state: &mut SimulationState,
    audit: &mut AuditTrail,
) {
    let (side, qty, report_no_fill) = match action {
        Action::Buy(qty) => (Side::Buy, qty, true),
        Action::Sell(qty) => (Side::Sell, qty, true),
        Action::SellAll if state.ledger.position > 0.0 => {
            (Side::Sell, state.ledger.position, false)
        }
        Action::SellAll | Action::Hold => return,
    };

    let check = risk::pre_trade_check(
        &config.risk,
        &config.execution,
        side,
        qty,
        bar.close,
        state.ledger.position,
    );
    if let Err(denial) = check {
        tracing::debug!(ts = bar.ts, %side, qty, reason = %denial, "intent denied");
        audit.append(bar.ts, AuditKind::reject_order(denial.as_str(), side, qty));
        return;
    }

    let order = Order {
        side,
        qty,
        price: bar.close,
        ts: bar.ts,
    };
    let market = MarketSnapshot {
        closes: &state.close,
        bar_volume: state.bar_volume,
    };
    let filled = execute(&config.execution, &order, &market, &mut state.ledger, audit);
    if filled <= 0.0 && report_no_fill {
        audit.append(bar.ts, AuditKind::reject_order("no_fill", side, qty));
    }
}
