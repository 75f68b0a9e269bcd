use thiserror::Error;

/// Failures of the extractor and interpolator.
///
/// Every variant aborts the call that raised it; nothing is retried and no
/// partial output is returned.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Audio source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Degenerate signal: {0}")]
    DegenerateSignal(String),

    #[error("Invalid section count: requested {requested}, {available} frames available")]
    InvalidSectionCount { requested: usize, available: usize },

    #[error("Invalid interpolation request: {0}")]
    InvalidInterpolationRequest(String),

    #[error("Invalid analysis parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, PulseError>;
