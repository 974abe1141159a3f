//! Append-only structured event trail.
//!
//! Each record serialises as one flat JSON object carrying `ts` and an
//! `event` tag plus event-specific fields:
//!
//! ```text
//! {"ts":1704067200000,"event":"fill","side":"BUY","qty":1000.0,"price":100.08,"fee":2.0016}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::error::SimError;
use crate::domain::execution::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: i64,
    #[serde(flatten)]
    pub kind: AuditKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditKind {
    ConfigSnapshot {
        hash: String,
    },
    Fill {
        side: Side,
        qty: f64,
        price: f64,
        fee: f64,
    },
    Reject {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        side: Option<Side>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qty: Option<f64>,
    },
    CircuitBreaker {
        reason: String,
    },
    ConfigCommit {
        actor: String,
        role: String,
        cid: String,
    },
    ConfigRollback {
        actor: String,
        role: String,
        error: String,
    },
    ModuleRegister {
        kind: String,
        name: String,
        actor: String,
        role: String,
    },
    StreamTick {
        name: String,
        rows: usize,
    },
    StreamError {
        name: String,
        error: String,
    },
    RunError {
        error: String,
    },
}

impl AuditKind {
    pub fn name(&self) -> &'static str {
        match self {
            AuditKind::ConfigSnapshot { .. } => "config_snapshot",
            AuditKind::Fill { .. } => "fill",
            AuditKind::Reject { .. } => "reject",
            AuditKind::CircuitBreaker { .. } => "circuit_breaker",
            AuditKind::ConfigCommit { .. } => "config_commit",
            AuditKind::ConfigRollback { .. } => "config_rollback",
            AuditKind::ModuleRegister { .. } => "module_register",
            AuditKind::StreamTick { .. } => "stream_tick",
            AuditKind::StreamError { .. } => "stream_error",
            AuditKind::RunError { .. } => "run_error",
        }
    }

    pub fn reject(reason: &str) -> Self {
        AuditKind::Reject {
            reason: reason.to_string(),
            side: None,
            qty: None,
        }
    }

    pub fn reject_order(reason: &str, side: Side, qty: f64) -> Self {
        AuditKind::Reject {
            reason: reason.to_string(),
            side: Some(side),
            qty: Some(qty),
        }
    }

    pub fn circuit_breaker(reason: &str) -> Self {
        AuditKind::CircuitBreaker {
            reason: reason.to_string(),
        }
    }
}

/// Ordered event log. Events can only be appended; a fresh trail is
/// created for every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, ts: i64, kind: AuditKind) {
        self.events.push(AuditEvent { ts, kind });
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events with the given `event` tag.
    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| e.kind.name() == event).count()
    }

    pub fn last(&self) -> Option<&AuditEvent> {
        self.events.last()
    }

    /// One JSON object per line, in append order.
    pub fn to_jsonl(&self) -> Result<String, SimError> {
        to_jsonl(&self.events)
    }
}

pub(crate) fn to_jsonl<T: Serialize>(records: &[T]) -> Result<String, SimError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}
