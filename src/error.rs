use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors that abort the processing of an archive request.
///
/// Every variant is fatal to the current request. Soft per-record problems
/// never surface here; they are counted by the normalizer instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("The service is loading and is temporarily unavailable.")]
    NotReady,

    #[error("{0}")]
    Validation(String),

    #[error("Failed to download file: {url} ({reason})")]
    Download { url: String, reason: String },

    #[error("Failed to extract archive: {0}")]
    Extraction(String),

    #[error("Expected to find files {expected:?} in archive '{archive}', found={found:?}")]
    MissingFiles {
        archive: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unsupported evalMethod '{0}'")]
    UnsupportedTransform(String),

    #[error("Invalid coefSI expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Failed to publish {failed} message(s): {reason}")]
    Publish { failed: usize, reason: String },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Failed to read shapefile {path}: {reason}")]
    Shapefile { path: String, reason: String },

    #[error("Unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Status code reported to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_)
            | PipelineError::UnsupportedTransform(_)
            | PipelineError::InvalidExpression { .. }
            | PipelineError::MissingFiles { .. } => StatusCode::BAD_REQUEST,
            PipelineError::NotReady | PipelineError::Download { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Extraction(_)
            | PipelineError::Publish { .. }
            | PipelineError::Workspace(_)
            | PipelineError::Shapefile { .. }
            | PipelineError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            PipelineError::Validation("Missing 'url' attribute !".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::UnsupportedTransform("explode".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(PipelineError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            PipelineError::Download {
                url: "http://example.com/a.zip".into(),
                reason: "timeout".into()
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PipelineError::Publish {
                failed: 3,
                reason: "broker down".into()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn io_errors_are_unexpected() {
        let err: PipelineError = std::io::Error::other("disk full").into();
        assert!(matches!(err, PipelineError::Unexpected(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
