//! Capability-gated control surface: config commits, module registration,
//! data ingestion, and runs.
//!
//! The committed configuration and the current data set are held behind
//! `Arc`s. A run clones both handles up front, so a commit or a data swap
//! that lands mid-run never changes what that run sees. Wrap the plane in
//! [`SharedControlPlane`] to serve concurrent callers; [`run_shared`] holds
//! the lock only while composing a run, never while simulating it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::domain::audit::{AuditKind, AuditTrail};
use crate::domain::bar::{Bar, normalize_bars};
use crate::domain::config::{SimConfig, content_hash_of};
use crate::domain::config_validation::validate_config;
use crate::domain::error::SimError;
use crate::domain::rbac::Capability;
use crate::domain::registry::{Module, ModuleKind, ModuleRegistry, classify};
use crate::domain::simulation::{RunOutcome, run_backtest};
use crate::ports::data_port::TextSource;
use crate::ports::report_port::ReportPort;

pub type SharedControlPlane = Arc<RwLock<ControlPlane>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub ts: i64,
    pub actor: String,
    pub role: String,
    pub cid: String,
}

/// What to run: the caller's identity plus optional named modules layered
/// over the committed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub actor: String,
    pub role: String,
    /// Data module to load instead of the current data set.
    pub data: Option<String>,
    /// Overrides the data module's URL for remote text.
    pub url: Option<String>,
    pub strategy: Option<String>,
    pub exec: Option<String>,
    pub risk: Option<String>,
}

impl RunRequest {
    pub fn new(actor: &str, role: &str) -> Self {
        RunRequest {
            actor: actor.to_string(),
            role: role.to_string(),
            ..RunRequest::default()
        }
    }
}

/// A fully composed run, detached from the control plane.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub config: SimConfig,
    pub bars: Arc<Vec<Bar>>,
}

impl PreparedRun {
    pub fn execute(&self) -> Result<RunOutcome, SimError> {
        if self.bars.is_empty() {
            return Err(SimError::NoData);
        }
        run_backtest(&self.config, &self.bars)
    }
}

pub struct ControlPlane {
    committed: Arc<SimConfig>,
    data: Arc<Vec<Bar>>,
    registry: ModuleRegistry,
    commits: Vec<CommitRecord>,
    audit: AuditTrail,
    text_source: Box<dyn TextSource + Send + Sync>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ControlPlane {
    /// Start from an initial configuration, which must itself be valid.
    pub fn new(
        config: SimConfig,
        text_source: Box<dyn TextSource + Send + Sync>,
    ) -> Result<Self, SimError> {
        validate_config(&config)?;
        Ok(ControlPlane {
            committed: Arc::new(config),
            data: Arc::new(Vec::new()),
            registry: ModuleRegistry::new(),
            commits: Vec::new(),
            audit: AuditTrail::new(),
            text_source,
        })
    }

    pub fn into_shared(self) -> SharedControlPlane {
        Arc::new(RwLock::new(self))
    }

    pub fn committed(&self) -> Arc<SimConfig> {
        Arc::clone(&self.committed)
    }

    pub fn data(&self) -> Arc<Vec<Bar>> {
        Arc::clone(&self.data)
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    /// Control-plane events: commits, rollbacks, registrations, stream
    /// activity, denials and run errors. Per-run events live in each
    /// [`RunOutcome`].
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    fn authorize(&mut self, role: &str, capabilities: &[Capability]) -> Result<(), SimError> {
        if self.committed.rbac.allows_any(role, capabilities) {
            return Ok(());
        }
        let capability = capabilities
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        tracing::warn!(role, capability = %capability, "rbac denied");
        self.audit.append(now_ms(), AuditKind::reject("rbac_denied"));
        Err(SimError::RbacDenied {
            role: role.to_string(),
            capability,
        })
    }

    /// Replace the committed configuration as one unit. Returns the new
    /// commit id (the config's content hash).
    pub fn commit(&mut self, actor: &str, role: &str, candidate: SimConfig) -> Result<String, SimError> {
        self.commit_with(actor, role, || Ok(candidate))
    }

    /// Like [`commit`](Self::commit), for a JSON document. Malformed JSON
    /// rolls back like any other invalid candidate.
    pub fn commit_json(&mut self, actor: &str, role: &str, text: &str) -> Result<String, SimError> {
        self.commit_with(actor, role, || SimConfig::from_json(text))
    }

    fn commit_with(
        &mut self,
        actor: &str,
        role: &str,
        candidate: impl FnOnce() -> Result<SimConfig, SimError>,
    ) -> Result<String, SimError> {
        self.authorize(role, &[Capability::ConfigWrite])?;

        let snapshot = Arc::clone(&self.committed);
        let installed = candidate().and_then(|config| {
            self.committed = Arc::new(config);
            validate_config(&self.committed)?;
            self.committed.content_hash()
        });

        let ts = now_ms();
        match installed {
            Ok(cid) => {
                tracing::info!(actor, role, cid = %cid, "config committed");
                self.commits.push(CommitRecord {
                    ts,
                    actor: actor.to_string(),
                    role: role.to_string(),
                    cid: cid.clone(),
                });
                self.audit.append(
                    ts,
                    AuditKind::ConfigCommit {
                        actor: actor.to_string(),
                        role: role.to_string(),
                        cid: cid.clone(),
                    },
                );
                Ok(cid)
            }
            Err(err) => {
                self.committed = snapshot;
                tracing::warn!(actor, role, error = %err, "config rolled back");
                self.audit.append(
                    ts,
                    AuditKind::ConfigRollback {
                        actor: actor.to_string(),
                        role: role.to_string(),
                        error: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Register a module of a declared kind under `name`.
    pub fn register_module(
        &mut self,
        actor: &str,
        role: &str,
        kind: ModuleKind,
        name: &str,
        payload: &Value,
    ) -> Result<(), SimError> {
        self.authorize(role, &[Capability::ModuleLoad, Capability::ImportPlugin])?;
        self.register(actor, role, kind, name, payload)
    }

    /// Register a module whose kind is detected from its shape. The name is
    /// `name`, else the payload's `name` field, else `<kind>_<hash prefix>`.
    pub fn import_plugin(
        &mut self,
        actor: &str,
        role: &str,
        name: Option<&str>,
        payload: &Value,
    ) -> Result<(ModuleKind, String), SimError> {
        self.authorize(role, &[Capability::ModuleLoad, Capability::ImportPlugin])?;

        let Some(kind) = classify(payload) else {
            tracing::warn!(actor, role, "unrecognized plugin shape");
            self.audit.append(now_ms(), AuditKind::reject("unknown_plugin_type"));
            return Err(SimError::ModuleRejected {
                reason: "payload matches no module kind".into(),
            });
        };

        let name = match name.filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => match payload.get("name").and_then(Value::as_str) {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => format!("{}_{}", kind, &content_hash_of(payload)[..8]),
            },
        };

        self.register(actor, role, kind, &name, payload)?;
        Ok((kind, name))
    }

    fn register(
        &mut self,
        actor: &str,
        role: &str,
        kind: ModuleKind,
        name: &str,
        payload: &Value,
    ) -> Result<(), SimError> {
        let module = match Module::parse(kind, payload) {
            Ok(module) => module,
            Err(err) => {
                tracing::warn!(kind = %kind, name, error = %err, "module rejected");
                self.audit.append(now_ms(), AuditKind::reject(err.reason_code()));
                return Err(err);
            }
        };

        self.registry.insert(name, module);
        tracing::info!(kind = %kind, name, actor, role, "module registered");
        self.audit.append(
            now_ms(),
            AuditKind::ModuleRegister {
                kind: kind.to_string(),
                name: name.to_string(),
                actor: actor.to_string(),
                role: role.to_string(),
            },
        );
        Ok(())
    }

    /// Swap in a new current data set. Returns the normalized bar count.
    pub fn replace_data(&mut self, role: &str, bars: Vec<Bar>) -> Result<usize, SimError> {
        self.authorize(role, &[Capability::DataIngest])?;
        Ok(self.install_data(bars))
    }

    /// Load a registered data module into the current data set.
    pub fn ingest_module(
        &mut self,
        role: &str,
        name: &str,
        url: Option<&str>,
    ) -> Result<usize, SimError> {
        self.authorize(role, &[Capability::DataIngest])?;
        let bars = self
            .registry
            .data(name)?
            .load(url, self.text_source.as_ref())?;
        Ok(self.install_data(bars))
    }

    /// Record one successful poll from an external stream and swap its bars in.
    pub fn stream_tick(&mut self, role: &str, name: &str, bars: Vec<Bar>) -> Result<usize, SimError> {
        self.authorize(role, &[Capability::StreamManage])?;
        let rows = self.install_data(bars);
        tracing::debug!(stream = name, rows, "stream tick");
        self.audit.append(
            now_ms(),
            AuditKind::StreamTick {
                name: name.to_string(),
                rows,
            },
        );
        Ok(rows)
    }

    /// Record a failed poll. The current data set is left alone.
    pub fn stream_error(&mut self, role: &str, name: &str, error: &str) -> Result<(), SimError> {
        self.authorize(role, &[Capability::StreamManage])?;
        tracing::warn!(stream = name, error, "stream error");
        self.audit.append(
            now_ms(),
            AuditKind::StreamError {
                name: name.to_string(),
                error: error.to_string(),
            },
        );
        Ok(())
    }

    fn install_data(&mut self, bars: Vec<Bar>) -> usize {
        let bars = normalize_bars(bars);
        let rows = bars.len();
        self.data = Arc::new(bars);
        tracing::info!(rows, "data set replaced");
        rows
    }

    /// Compose the working config and data snapshot for a run. Named
    /// modules are applied to a copy; the committed config is never touched.
    pub fn prepare_run(&self, request: &RunRequest) -> Result<PreparedRun, SimError> {
        if !self.committed.rbac.allows(&request.role, Capability::RunExecute) {
            return Err(SimError::RbacDenied {
                role: request.role.clone(),
                capability: Capability::RunExecute.to_string(),
            });
        }

        let mut config = SimConfig::clone(&self.committed);
        if let Some(name) = &request.strategy {
            config.strategy = self.registry.strategy(name)?.clone();
        }
        if let Some(name) = &request.exec {
            config.execution = self.registry.exec(name)?.apply(&config.execution)?;
        }
        if let Some(name) = &request.risk {
            config.risk = self.registry.risk(name)?.apply(&config.risk)?;
        }

        let bars = match &request.data {
            Some(name) => Arc::new(
                self.registry
                    .data(name)?
                    .load(request.url.as_deref(), self.text_source.as_ref())?,
            ),
            None => Arc::clone(&self.data),
        };

        Ok(PreparedRun { config, bars })
    }

    /// Compose and execute a run. Failures, panics included, are recorded
    /// in the control audit trail and returned; the plane stays usable.
    pub fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, SimError> {
        let result = contain(|| {
            self.prepare_run(request)
                .and_then(|prepared| prepared.execute())
        });
        if let Err(err) = &result {
            self.record_run_failure(request, err);
        }
        result
    }

    fn record_run_failure(&mut self, request: &RunRequest, err: &SimError) {
        let ts = now_ms();
        match err {
            SimError::RbacDenied { .. } => {
                tracing::warn!(actor = %request.actor, role = %request.role, "run denied");
                self.audit.append(ts, AuditKind::reject("rbac_denied"));
            }
            _ => {
                tracing::error!(actor = %request.actor, role = %request.role, error = %err, "run failed");
                self.audit.append(
                    ts,
                    AuditKind::RunError {
                        error: err.to_string(),
                    },
                );
            }
        }
    }

    /// Write a finished run's artifacts through `sink`.
    pub fn export(
        &mut self,
        role: &str,
        outcome: &RunOutcome,
        sink: &dyn ReportPort,
    ) -> Result<(), SimError> {
        self.authorize(role, &[Capability::ExportFiles])?;
        sink.write_run(outcome)
    }
}

fn poisoned<T>(_: T) -> SimError {
    SimError::Run {
        reason: "control plane lock poisoned".into(),
    }
}

/// Run `f`, turning a panic into a run-level error so a faulty run never
/// takes the control plane down with it.
fn contain<T, F>(f: F) -> Result<T, SimError>
where
    F: FnOnce() -> Result<T, SimError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(SimError::Run {
            reason: format!("internal fault: {}", panic_message(payload.as_ref())),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Run against a shared plane. The read lock is held only while composing
/// the run, so commits and data swaps proceed while it simulates.
pub fn run_shared(plane: &SharedControlPlane, request: &RunRequest) -> Result<RunOutcome, SimError> {
    let prepared = contain(|| plane.read().map_err(poisoned)?.prepare_run(request));
    let result = prepared.and_then(|prepared| contain(|| prepared.execute()));
    if let Err(err) = &result {
        plane
            .write()
            .map_err(poisoned)?
            .record_run_failure(request, err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::MS_PER_DAY;
    use serde_json::json;
    use std::cell::RefCell;
    use std::thread;

    struct Offline;

    impl TextSource for Offline {
        fn fetch_text(&self, location: &str) -> Result<String, SimError> {
            Err(SimError::DataSource {
                reason: format!("offline: {}", location),
            })
        }
    }

    struct Faulty;

    impl TextSource for Faulty {
        fn fetch_text(&self, location: &str) -> Result<String, SimError> {
            panic!("source fault at {location}");
        }
    }

    struct Capture(RefCell<Vec<usize>>);

    impl ReportPort for Capture {
        fn write_run(&self, outcome: &RunOutcome) -> Result<(), SimError> {
            self.0.borrow_mut().push(outcome.summary.bars);
            Ok(())
        }
    }

    fn plane() -> ControlPlane {
        ControlPlane::new(SimConfig::paper(), Box::new(Offline)).unwrap()
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                ts: i as i64 * MS_PER_DAY,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
            })
            .collect()
    }

    fn buy_once() -> Value {
        json!({
            "type": "rule_chain",
            "name": "buy_once",
            "rules": [{"if": "position == 0", "do": "BUY", "qty": 1000}]
        })
    }

    #[test]
    fn commit_installs_and_records() {
        let mut cp = plane();
        let mut candidate = SimConfig::paper();
        candidate.execution.fee_bps = 0.5;
        let expected = candidate.content_hash().unwrap();

        let cid = cp.commit("alice", "admin", candidate).unwrap();
        assert_eq!(cid, expected);
        assert_eq!(cp.committed().execution.fee_bps, 0.5);
        assert_eq!(cp.commits().len(), 1);
        assert_eq!(cp.commits()[0].actor, "alice");
        assert_eq!(cp.audit().count("config_commit"), 1);
    }

    #[test]
    fn invalid_commit_restores_snapshot() {
        let mut cp = plane();
        let before = cp.committed().content_hash().unwrap();

        let mut candidate = SimConfig::paper();
        candidate.execution.twap.slices = 0;
        let err = cp.commit("alice", "admin", candidate).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { .. }));

        assert_eq!(cp.committed().content_hash().unwrap(), before);
        assert!(cp.commits().is_empty());
        assert_eq!(cp.audit().count("config_rollback"), 1);
        assert_eq!(cp.audit().count("config_commit"), 0);
    }

    #[test]
    fn malformed_json_commit_rolls_back() {
        let mut cp = plane();
        let before = cp.committed().content_hash().unwrap();
        let err = cp.commit_json("alice", "admin", "{\"seed\":").unwrap_err();
        assert_eq!(err.reason_code(), "bad_json");
        assert_eq!(cp.committed().content_hash().unwrap(), before);
        assert_eq!(cp.audit().count("config_rollback"), 1);
    }

    #[test]
    fn commit_requires_config_write() {
        let mut cp = plane();
        let before = cp.committed().content_hash().unwrap();
        for role in ["ops", "viewer", "nobody"] {
            let err = cp.commit("bob", role, SimConfig::default()).unwrap_err();
            assert_eq!(err.reason_code(), "rbac_denied");
        }
        assert_eq!(cp.committed().content_hash().unwrap(), before);
        assert_eq!(cp.audit().count("config_commit"), 0);
        assert_eq!(cp.audit().count("config_rollback"), 0);
        assert_eq!(cp.audit().count("reject"), 3);
    }

    #[test]
    fn commit_uses_the_committed_role_table() {
        let mut cp = plane();
        let mut locked = SimConfig::paper();
        locked.rbac.roles.remove("admin");
        cp.commit("alice", "admin", locked).unwrap();
        assert!(cp.commit("alice", "admin", SimConfig::paper()).is_err());
    }

    #[test]
    fn import_names_from_payload_or_hash() {
        let mut cp = plane();
        let (kind, name) = cp.import_plugin("ann", "ops", None, &buy_once()).unwrap();
        assert_eq!(kind, ModuleKind::Strategy);
        assert_eq!(name, "buy_once");

        let exec = json!({"twap": {"enabled": true}});
        let (kind, name) = cp.import_plugin("ann", "ops", None, &exec).unwrap();
        assert_eq!(kind, ModuleKind::Exec);
        assert_eq!(name, format!("exec_{}", &content_hash_of(&exec)[..8]));

        let (_, name) = cp.import_plugin("ann", "ops", Some("slow"), &exec).unwrap();
        assert_eq!(name, "slow");
        assert_eq!(cp.audit().count("module_register"), 3);
    }

    #[test]
    fn import_rejects_unrecognized_shape() {
        let mut cp = plane();
        let err = cp.import_plugin("ann", "admin", None, &json!({})).unwrap_err();
        assert_eq!(err.reason_code(), "unknown_plugin_type");
        assert!(cp.registry().is_empty());
        assert_eq!(cp.audit().count("reject"), 1);
    }

    #[test]
    fn module_registration_gate() {
        let mut cp = plane();
        let payload = json!({"limits": {"max_position": 5.0}});
        let err = cp
            .register_module("v", "viewer", ModuleKind::Risk, "tight", &payload)
            .unwrap_err();
        assert_eq!(err.reason_code(), "rbac_denied");
        assert!(cp.registry().is_empty());

        cp.register_module("o", "ops", ModuleKind::Risk, "tight", &payload)
            .unwrap();
        assert_eq!(cp.registry().names(ModuleKind::Risk), vec!["tight"]);
    }

    #[test]
    fn bad_module_registers_nothing() {
        let mut cp = plane();
        let err = cp
            .register_module("a", "admin", ModuleKind::Exec, "x", &json!([1]))
            .unwrap_err();
        assert!(matches!(err, SimError::ModuleRejected { .. }));
        assert!(cp.registry().is_empty());
        assert_eq!(cp.audit().count("module_register"), 0);
    }

    #[test]
    fn run_applies_modules_without_touching_committed() {
        let mut cp = plane();
        let before = cp.committed().content_hash().unwrap();
        cp.replace_data("ops", bars(&[100.0, 101.0, 102.0])).unwrap();
        cp.import_plugin("a", "admin", None, &buy_once()).unwrap();
        cp.import_plugin("a", "admin", Some("tight"), &json!({"limits": {"max_position": 500.0}}))
            .unwrap();

        let mut request = RunRequest::new("a", "ops");
        request.strategy = Some("buy_once".into());
        request.risk = Some("tight".into());
        let outcome = cp.run(&request).unwrap();

        assert_eq!(outcome.summary.fills, 0);
        assert_eq!(outcome.audit.count("reject"), 3);
        assert_eq!(outcome.summary.bars, 3);
        assert_eq!(cp.committed().content_hash().unwrap(), before);
        assert_ne!(outcome.summary.config_hash, before);
    }

    #[test]
    fn run_with_data_module() {
        let mut cp = plane();
        cp.import_plugin(
            "a",
            "admin",
            Some("inline"),
            &json!({"csv": "ts,open,high,low,close\n1,1,1,1,1\n2,2,2,2,2\n"}),
        )
        .unwrap();
        let mut request = RunRequest::new("a", "ops");
        request.data = Some("inline".into());
        assert_eq!(cp.run(&request).unwrap().summary.bars, 2);
        assert!(cp.data().is_empty());
    }

    #[test]
    fn remote_data_failure_is_run_error() {
        let mut cp = plane();
        cp.import_plugin(
            "a",
            "admin",
            Some("remote"),
            &json!({"type": "http_text", "url": "http://example.invalid/bars.csv"}),
        )
        .unwrap();
        let mut request = RunRequest::new("a", "ops");
        request.data = Some("remote".into());
        let err = cp.run(&request).unwrap_err();
        assert!(matches!(err, SimError::DataSource { .. }));
        assert_eq!(cp.audit().count("run_error"), 1);
    }

    #[test]
    fn faulting_run_is_contained() {
        let mut cp = ControlPlane::new(SimConfig::paper(), Box::new(Faulty)).unwrap();
        cp.import_plugin(
            "a",
            "admin",
            Some("remote"),
            &json!({"type": "http_text", "url": "mem://bars"}),
        )
        .unwrap();
        let mut request = RunRequest::new("a", "ops");
        request.data = Some("remote".into());

        match cp.run(&request) {
            Err(SimError::Run { reason }) => assert!(reason.contains("source fault at mem://bars")),
            other => panic!("expected run error, got {other:?}"),
        }
        assert_eq!(cp.audit().count("run_error"), 1);

        cp.replace_data("ops", bars(&[1.0, 2.0])).unwrap();
        assert_eq!(cp.run(&RunRequest::new("a", "ops")).unwrap().summary.bars, 2);

        let shared = cp.into_shared();
        let err = run_shared(&shared, &request).unwrap_err();
        assert_eq!(err.reason_code(), "run_error");
        assert_eq!(shared.read().unwrap().audit().count("run_error"), 2);
        assert!(run_shared(&shared, &RunRequest::new("a", "ops")).is_ok());
    }

    #[test]
    fn huge_indicator_window_runs_without_signal() {
        let mut cp = plane();
        cp.replace_data("ops", bars(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        cp.import_plugin(
            "a",
            "admin",
            Some("huge"),
            &json!({
                "type": "rule_chain",
                "params": {"w": 1e30},
                "rules": [{"if": "rsi(close,w) > 50", "do": "BUY", "qty": 1}]
            }),
        )
        .unwrap();
        let mut request = RunRequest::new("a", "ops");
        request.strategy = Some("huge".into());
        let outcome = cp.run(&request).unwrap();
        assert_eq!(outcome.summary.fills, 0);
        assert_eq!(outcome.summary.bars, 4);
    }

    #[test]
    fn run_denied_and_no_data() {
        let mut cp = plane();
        let err = cp.run(&RunRequest::new("v", "viewer")).unwrap_err();
        assert_eq!(err.reason_code(), "rbac_denied");
        assert_eq!(cp.audit().count("reject"), 1);

        let err = cp.run(&RunRequest::new("o", "ops")).unwrap_err();
        assert!(matches!(err, SimError::NoData));
        assert_eq!(cp.audit().count("run_error"), 1);

        cp.replace_data("ops", bars(&[1.0, 2.0])).unwrap();
        assert!(cp.run(&RunRequest::new("o", "ops")).is_ok());
    }

    #[test]
    fn unknown_module_name_fails_run() {
        let mut cp = plane();
        cp.replace_data("ops", bars(&[1.0])).unwrap();
        let mut request = RunRequest::new("o", "ops");
        request.exec = Some("missing".into());
        let err = cp.run(&request).unwrap_err();
        assert_eq!(err.reason_code(), "module_not_found");
    }

    #[test]
    fn stream_events_and_data_swap() {
        let mut cp = plane();
        assert_eq!(cp.stream_tick("ops", "feed", bars(&[1.0, 2.0, 3.0])).unwrap(), 3);
        cp.stream_error("ops", "feed", "timeout").unwrap();
        assert_eq!(cp.data().len(), 3);
        assert_eq!(cp.audit().count("stream_tick"), 1);
        assert_eq!(cp.audit().count("stream_error"), 1);
        assert!(cp.stream_tick("viewer", "feed", Vec::new()).is_err());
        assert_eq!(cp.data().len(), 3);
    }

    #[test]
    fn ingest_module_replaces_current_data() {
        let mut cp = plane();
        cp.register_module(
            "a",
            "admin",
            ModuleKind::Data,
            "inline",
            &json!({"type": "embedded_csv", "csv": "ts,open,high,low,close\n5,1,1,1,1\n"}),
        )
        .unwrap();
        assert_eq!(cp.ingest_module("ops", "inline", None).unwrap(), 1);
        assert_eq!(cp.data()[0].ts, 5);
    }

    #[test]
    fn snapshot_survives_data_swap() {
        let mut cp = plane();
        cp.replace_data("ops", bars(&[1.0, 2.0])).unwrap();
        let prepared = cp.prepare_run(&RunRequest::new("o", "ops")).unwrap();
        cp.replace_data("ops", bars(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(prepared.execute().unwrap().summary.bars, 2);
    }

    #[test]
    fn export_is_gated() {
        let mut cp = plane();
        cp.replace_data("ops", bars(&[1.0, 2.0])).unwrap();
        let outcome = cp.run(&RunRequest::new("o", "ops")).unwrap();
        let sink = Capture(RefCell::new(Vec::new()));
        cp.export("viewer", &outcome, &sink).unwrap();
        assert!(cp.export("nobody", &outcome, &sink).is_err());
        assert_eq!(*sink.0.borrow(), vec![2]);
    }

    #[test]
    fn concurrent_runs_see_consistent_snapshots() {
        let mut cp = plane();
        cp.replace_data("ops", bars(&[100.0, 101.0, 99.0, 102.0])).unwrap();
        let shared = cp.into_shared();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || run_shared(&shared, &RunRequest::new("o", "ops")))
            })
            .collect();
        {
            let mut guard = shared.write().unwrap();
            guard.stream_tick("ops", "feed", bars(&[100.0, 101.0])).unwrap();
        }

        for handle in handles {
            let outcome = handle.join().unwrap().unwrap();
            assert!(outcome.summary.bars == 4 || outcome.summary.bars == 2);
            assert_eq!(outcome.trace.len(), outcome.summary.bars);
        }
        assert_eq!(run_shared(&shared, &RunRequest::new("o", "ops")).unwrap().summary.bars, 2);
    }
}
