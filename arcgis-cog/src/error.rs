use std::path::PathBuf;

/// Failure kinds raised by the download and conversion pipeline.
///
/// Functions return `anyhow::Result`; these variants travel inside the
/// `anyhow::Error` so callers can `downcast_ref::<ArcgisError>()` when they
/// need to branch on the kind.
#[derive(Debug, thiserror::Error)]
pub enum ArcgisError {
    /// The tile query returned no object ids
    #[error("No data available with these parameters")]
    NoData,

    /// The server answered with an `{"error": {...}}` envelope
    #[error("{code}: {message} (details: {detail})")]
    Service {
        code: i64,
        message: String,
        detail: String,
    },

    /// The server answered with JSON that lacks the expected shape
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The tile content request kept failing at the transport level
    #[error("Request to {url} failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// An external GDAL tool exited with a non-zero status
    #[error("{tool} failed with {status}")]
    ToolFailed { tool: String, status: String },

    /// The boundary file could be opened but holds no geometry
    #[error("No geometry found in boundary file {0:?}")]
    EmptyBoundary(PathBuf),
}

impl ArcgisError {
    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        ArcgisError::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
