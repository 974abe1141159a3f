//! Report sink port for run artifacts.

use crate::domain::error::SimError;
use crate::domain::simulation::RunOutcome;

/// Port for persisting a finished run: audit trail, trace, and summary.
pub trait ReportPort {
    fn write_run(&self, outcome: &RunOutcome) -> Result<(), SimError>;
}
