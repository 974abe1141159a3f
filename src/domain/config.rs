//! Full simulation configuration and its content hash.
//!
//! The configuration is a single JSON document:
//!
//! ```json
//! {
//!   "seed": 123456789,
//!   "initial_cash": 100000000.0,
//!   "risk": {"max_position": 1e7, "max_drawdown": 0.25},
//!   "execution": {"fee_bps": 0.2, "slip_bps": 0.8, "twap": {"enabled": false}},
//!   "strategy": {"type": "rule_chain", "params": {}, "rules": []},
//!   "rbac": {"roles": {"admin": {"caps": ["config.write"]}}},
//!   "profile": "paper"
//! }
//! ```
//!
//! Every field is optional and falls back to its documented default.

use serde::{Deserialize, Serialize};

use crate::domain::error::SimError;
use crate::domain::execution::ExecutionPolicy;
use crate::domain::rbac::Rbac;
use crate::domain::risk::RiskLimits;
use crate::domain::strategy::StrategyConfig;

fn default_seed() -> u64 {
    123_456_789
}
fn default_initial_cash() -> f64 {
    100_000_000.0
}
fn default_profile() -> String {
    "paper".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub execution: ExecutionPolicy,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub rbac: Rbac,
    #[serde(default = "default_profile")]
    pub profile: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            seed: default_seed(),
            initial_cash: default_initial_cash(),
            risk: RiskLimits::default(),
            execution: ExecutionPolicy::default(),
            strategy: StrategyConfig::default(),
            rbac: Rbac::default(),
            profile: default_profile(),
        }
    }
}

impl SimConfig {
    /// The reference paper-trading profile.
    pub fn paper() -> Self {
        let mut execution = ExecutionPolicy::default();
        execution.twap.duration_ms = 900_000;
        SimConfig {
            risk: RiskLimits::paper(),
            execution,
            strategy: StrategyConfig::sma_rsi_crossover(),
            rbac: Rbac::standard(),
            ..SimConfig::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, SimError> {
        serde_json::from_str(text).map_err(|e| SimError::ConfigParse {
            reason: e.to_string(),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deterministic content hash: BLAKE3 over the compact JSON form with
    /// keys in sorted order, hex encoded.
    pub fn content_hash(&self) -> Result<String, SimError> {
        let canonical = serde_json::to_value(self)?;
        Ok(content_hash_of(&canonical))
    }
}

/// BLAKE3 hex digest of a JSON value's compact, key-sorted encoding.
pub fn content_hash_of(value: &serde_json::Value) -> String {
    blake3::hash(value.to_string().as_bytes()).to_hex().to_string()
}
