//! Text retrieval port for data fragments that live outside the payload.

use crate::domain::error::SimError;

/// Fetches the raw text behind a location (URL, path). Implementations do
/// their blocking I/O before the text reaches the core.
pub trait TextSource {
    fn fetch_text(&self, location: &str) -> Result<String, SimError>;
}
