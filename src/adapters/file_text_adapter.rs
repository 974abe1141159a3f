//! Disk-backed text source for `http_text` data modules and CLI inputs.

use crate::domain::error::SimError;
use crate::ports::data_port::TextSource;
use std::fs;
use std::path::PathBuf;

/// Resolves locations against a base directory. Accepts plain paths and
/// `file://` URLs; network schemes are refused.
pub struct FileTextSource {
    base_path: PathBuf,
}

impl FileTextSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, SimError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(SimError::DataSource {
                reason: format!("network fetch not available for {}", location),
            });
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(self.base_path.join(path))
    }
}

impl TextSource for FileTextSource {
    fn fetch_text(&self, location: &str) -> Result<String, SimError> {
        let path = self.resolve(location)?;
        tracing::debug!(path = %path.display(), "reading text source");
        fs::read_to_string(&path).map_err(|e| SimError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
    }
}
