//! Run artifact writer implementing ReportPort.
//!
//! Writes three files into the output directory:
//! - `audit.jsonl`: one audit event per line
//! - `trace.jsonl`: one trace point per line
//! - `summary.json`: the run summary, pretty-printed

use crate::domain::error::SimError;
use crate::domain::simulation::RunOutcome;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::{Path, PathBuf};

pub const AUDIT_FILE: &str = "audit.jsonl";
pub const TRACE_FILE: &str = "trace.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

pub struct JsonlReportAdapter {
    out_dir: PathBuf,
}

impl JsonlReportAdapter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl ReportPort for JsonlReportAdapter {
    fn write_run(&self, outcome: &RunOutcome) -> Result<(), SimError> {
        fs::create_dir_all(&self.out_dir)?;

        let audit = outcome.audit.to_jsonl()?;
        let trace = outcome.trace_jsonl()?;
        let summary = serde_json::to_string_pretty(&outcome.summary)?;

        fs::write(self.out_dir.join(AUDIT_FILE), audit)?;
        fs::write(self.out_dir.join(TRACE_FILE), trace)?;
        fs::write(self.out_dir.join(SUMMARY_FILE), summary)?;

        tracing::info!(dir = %self.out_dir.display(), events = outcome.audit.len(), "report written");
        Ok(())
    }
}
