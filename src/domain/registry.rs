//! Named module fragments and shape-based classification.
//!
//! A module is one of four closed fragment kinds:
//!
//! - `data`: where bars come from (`embedded_csv`, `http_text`, `json_schema`)
//! - `strategy`: a full rule chain that replaces the active strategy
//! - `exec`: execution keys shallow-merged onto the active policy
//! - `risk`: limit values that overwrite the active risk limits
//!
//! Fragments are parsed and validated at registration, so a registered
//! module is always applicable at run time.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::bar::{Bar, RawBar, normalize_bars, parse_csv};
use crate::domain::config_validation::{validate_execution, validate_risk};
use crate::domain::error::SimError;
use crate::domain::execution::ExecutionPolicy;
use crate::domain::risk::RiskLimits;
use crate::domain::strategy::{RULE_CHAIN, StrategyConfig};
use crate::ports::data_port::TextSource;

const DATA_TYPES: [&str; 3] = ["embedded_csv", "http_text", "json_schema"];
const EXEC_KEYS: [&str; 4] = ["twap", "vwap", "pov", "iceberg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleKind {
    Data,
    Strategy,
    Exec,
    Risk,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 4] = [
        ModuleKind::Data,
        ModuleKind::Strategy,
        ModuleKind::Exec,
        ModuleKind::Risk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Data => "data",
            ModuleKind::Strategy => "strategy",
            ModuleKind::Exec => "exec",
            ModuleKind::Risk => "risk",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SimError::ModuleRejected {
                reason: format!("unknown module kind '{}'", s),
            })
    }
}

fn default_format() -> String {
    "csv".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataFragment {
    EmbeddedCsv {
        csv: String,
    },
    HttpText {
        #[serde(default)]
        url: String,
        #[serde(default = "default_format")]
        format: String,
    },
    JsonSchema {
        #[serde(default)]
        data: Vec<RawBar>,
    },
}

impl DataFragment {
    /// Parse a data payload. A bare `{"csv": ...}` without a type tag is
    /// embedded CSV.
    pub fn from_value(value: &Value) -> Result<Self, SimError> {
        let untagged_csv = value
            .as_object()
            .filter(|obj| !obj.contains_key("type"))
            .and_then(|obj| obj.get("csv"))
            .and_then(Value::as_str);
        let fragment = match untagged_csv {
            Some(csv) => DataFragment::EmbeddedCsv {
                csv: csv.to_string(),
            },
            None => DataFragment::deserialize(value).map_err(|e| rejected("data", e))?,
        };
        fragment.check()?;
        Ok(fragment)
    }

    fn check(&self) -> Result<(), SimError> {
        match self {
            DataFragment::EmbeddedCsv { csv } => parse_csv(csv).map(drop),
            DataFragment::HttpText { format, .. } => check_format(format),
            DataFragment::JsonSchema { data } => {
                for raw in data {
                    raw.normalize()?;
                }
                Ok(())
            }
        }
    }

    /// Produce normalized bars. `url_override` replaces the fragment's URL
    /// for remote text; the text itself comes from `source`.
    pub fn load(
        &self,
        url_override: Option<&str>,
        source: &dyn TextSource,
    ) -> Result<Vec<Bar>, SimError> {
        match self {
            DataFragment::EmbeddedCsv { csv } => parse_csv(csv),
            DataFragment::HttpText { url, format } => {
                check_format(format)?;
                let location = url_override.unwrap_or(url);
                if location.is_empty() {
                    return Err(SimError::DataSource {
                        reason: "http_text module has no url".into(),
                    });
                }
                let text = source.fetch_text(location)?;
                parse_csv(&text)
            }
            DataFragment::JsonSchema { data } => {
                let bars = data
                    .iter()
                    .map(RawBar::normalize)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(normalize_bars(bars))
            }
        }
    }
}

fn check_format(format: &str) -> Result<(), SimError> {
    if format != "csv" {
        return Err(SimError::DataFormat {
            reason: format!("unsupported text format '{}'", format),
        });
    }
    Ok(())
}

/// Execution keys applied one by one over the active policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecFragment(pub Map<String, Value>);

impl ExecFragment {
    pub fn from_value(value: &Value) -> Result<Self, SimError> {
        let map = value.as_object().cloned().ok_or_else(|| SimError::ModuleRejected {
            reason: "exec module must be a JSON object".into(),
        })?;
        let fragment = ExecFragment(map);
        fragment.apply(&ExecutionPolicy::default())?;
        Ok(fragment)
    }

    /// Shallow merge: each top-level key replaces the same key of `base`.
    pub fn apply(&self, base: &ExecutionPolicy) -> Result<ExecutionPolicy, SimError> {
        let merged: ExecutionPolicy = merge_keys(base, &self.0)?;
        validate_execution(&merged)?;
        Ok(merged)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskFragment {
    #[serde(default)]
    pub limits: Map<String, Value>,
    #[serde(default)]
    pub kill_switch: Option<bool>,
}

impl RiskFragment {
    pub fn from_value(value: &Value) -> Result<Self, SimError> {
        let fragment = RiskFragment::deserialize(value).map_err(|e| rejected("risk", e))?;
        fragment.apply(&RiskLimits::default())?;
        Ok(fragment)
    }

    /// Overwrite the limit fields named in `limits`, then engage or release
    /// the kill switch if the fragment sets it.
    pub fn apply(&self, base: &RiskLimits) -> Result<RiskLimits, SimError> {
        let mut merged: RiskLimits = merge_keys(base, &self.limits)?;
        if let Some(engaged) = self.kill_switch {
            merged.kill_switch = engaged;
        }
        validate_risk(&merged)?;
        Ok(merged)
    }
}

fn merge_keys<T>(base: &T, overrides: &Map<String, Value>) -> Result<T, SimError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(base)?;
    if let Value::Object(fields) = &mut value {
        for (key, v) in overrides {
            fields.insert(key.clone(), v.clone());
        }
    }
    serde_json::from_value(value).map_err(|e| SimError::ModuleRejected {
        reason: format!("cannot apply module: {}", e),
    })
}

fn rejected(kind: &str, err: serde_json::Error) -> SimError {
    SimError::ModuleRejected {
        reason: format!("invalid {} module: {}", kind, err),
    }
}

#[derive(Debug, Clone)]
pub enum Module {
    Data(DataFragment),
    Strategy(StrategyConfig),
    Exec(ExecFragment),
    Risk(RiskFragment),
}

impl Module {
    /// Parse and validate a payload as a module of `kind`.
    pub fn parse(kind: ModuleKind, value: &Value) -> Result<Self, SimError> {
        match kind {
            ModuleKind::Data => DataFragment::from_value(value).map(Module::Data),
            ModuleKind::Strategy => {
                let strategy =
                    StrategyConfig::deserialize(value).map_err(|e| rejected("strategy", e))?;
                strategy.compile()?;
                Ok(Module::Strategy(strategy))
            }
            ModuleKind::Exec => ExecFragment::from_value(value).map(Module::Exec),
            ModuleKind::Risk => RiskFragment::from_value(value).map(Module::Risk),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Module::Data(_) => ModuleKind::Data,
            Module::Strategy(_) => ModuleKind::Strategy,
            Module::Exec(_) => ModuleKind::Exec,
            Module::Risk(_) => ModuleKind::Risk,
        }
    }
}

/// Classify an undeclared payload by its documented discriminant fields,
/// checked in order: data, strategy, exec, risk. `None` when nothing
/// matches.
pub fn classify(value: &Value) -> Option<ModuleKind> {
    let obj = value.as_object()?;
    let type_tag = obj.get("type").and_then(Value::as_str);

    if obj.contains_key("csv") || type_tag.is_some_and(|t| DATA_TYPES.contains(&t)) {
        return Some(ModuleKind::Data);
    }
    if obj.contains_key("rules") && type_tag == Some(RULE_CHAIN) {
        return Some(ModuleKind::Strategy);
    }
    if EXEC_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return Some(ModuleKind::Exec);
    }
    if obj.contains_key("limits") || obj.contains_key("kill_switch") {
        return Some(ModuleKind::Risk);
    }
    None
}

/// Registered modules, keyed by kind and then by name. Re-registering a
/// name replaces the earlier module.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    data: BTreeMap<String, DataFragment>,
    strategy: BTreeMap<String, StrategyConfig>,
    exec: BTreeMap<String, ExecFragment>,
    risk: BTreeMap<String, RiskFragment>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, module: Module) {
        let name = name.to_string();
        match module {
            Module::Data(m) => {
                self.data.insert(name, m);
            }
            Module::Strategy(m) => {
                self.strategy.insert(name, m);
            }
            Module::Exec(m) => {
                self.exec.insert(name, m);
            }
            Module::Risk(m) => {
                self.risk.insert(name, m);
            }
        }
    }

    pub fn data(&self, name: &str) -> Result<&DataFragment, SimError> {
        self.data.get(name).ok_or_else(|| not_found(ModuleKind::Data, name))
    }

    pub fn strategy(&self, name: &str) -> Result<&StrategyConfig, SimError> {
        self.strategy
            .get(name)
            .ok_or_else(|| not_found(ModuleKind::Strategy, name))
    }

    pub fn exec(&self, name: &str) -> Result<&ExecFragment, SimError> {
        self.exec.get(name).ok_or_else(|| not_found(ModuleKind::Exec, name))
    }

    pub fn risk(&self, name: &str) -> Result<&RiskFragment, SimError> {
        self.risk.get(name).ok_or_else(|| not_found(ModuleKind::Risk, name))
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: ModuleKind) -> Vec<&str> {
        match kind {
            ModuleKind::Data => self.data.keys().map(String::as_str).collect(),
            ModuleKind::Strategy => self.strategy.keys().map(String::as_str).collect(),
            ModuleKind::Exec => self.exec.keys().map(String::as_str).collect(),
            ModuleKind::Risk => self.risk.keys().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() + self.strategy.len() + self.exec.len() + self.risk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(kind: ModuleKind, name: &str) -> SimError {
    SimError::ModuleNotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}
