//! Domain error types.

/// A parse error with position information for rule conditions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for simtrader.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("config parse error: {reason}")]
    ConfigParse { reason: String },

    #[error("invalid config value {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("invalid rule {index}: {source}")]
    RuleParse {
        index: usize,
        condition: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid rule {index}: {reason}")]
    RuleInvalid { index: usize, reason: String },

    #[error("role '{role}' lacks capability {capability}")]
    RbacDenied { role: String, capability: String },

    #[error("module rejected: {reason}")]
    ModuleRejected { reason: String },

    #[error("no {kind} module named '{name}'")]
    ModuleNotFound { kind: String, name: String },

    #[error("data format error: {reason}")]
    DataFormat { reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no bars loaded")]
    NoData,

    #[error("run failed: {reason}")]
    Run { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Stable snake_case reason code surfaced to callers and the audit trail.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SimError::ConfigParse { .. } => "bad_json",
            SimError::ConfigInvalid { .. } => "invalid_config",
            SimError::RuleParse { .. } | SimError::RuleInvalid { .. } => "invalid_rule",
            SimError::RbacDenied { .. } => "rbac_denied",
            SimError::ModuleRejected { .. } => "unknown_plugin_type",
            SimError::ModuleNotFound { .. } => "module_not_found",
            SimError::DataFormat { .. } => "bad_data",
            SimError::DataSource { .. } => "data_source",
            SimError::NoData => "no_data",
            SimError::Run { .. } => "run_error",
            SimError::Json(_) => "bad_json",
            SimError::Io(_) => "io_error",
        }
    }

    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        SimError::ConfigInvalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&SimError> for std::process::ExitCode {
    fn from(err: &SimError) -> Self {
        let code: u8 = match err {
            SimError::Io(_) => 1,
            SimError::ConfigParse { .. } | SimError::ConfigInvalid { .. } | SimError::Json(_) => 2,
            SimError::RbacDenied { .. } => 3,
            SimError::RuleParse { .. } | SimError::RuleInvalid { .. } => 4,
            SimError::DataFormat { .. } | SimError::DataSource { .. } | SimError::NoData => 5,
            SimError::ModuleRejected { .. } | SimError::ModuleNotFound { .. } => 6,
            SimError::Run { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_context_points_at_position() {
        let err = ParseError {
            message: "expected comparison operator".into(),
            position: 4,
        };
        let rendered = err.display_with_context("fast slow");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "fast slow");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn reason_codes_are_stable() {
        let denied = SimError::RbacDenied {
            role: "viewer".into(),
            capability: "config.write".into(),
        };
        assert_eq!(denied.reason_code(), "rbac_denied");
        assert_eq!(
            SimError::ModuleRejected {
                reason: "empty".into()
            }
            .reason_code(),
            "unknown_plugin_type"
        );
        assert_eq!(SimError::NoData.reason_code(), "no_data");
    }
}
