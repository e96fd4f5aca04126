use thiserror::Error;

/// Error kinds surfaced by the resampler core, per the documented
/// propagation policy: compute errors are structured results, cache and
/// separator failures are recovered locally, and cancellation aborts the
/// whole render.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("input not found: {0}")]
    NotFound(String),

    #[error("internal failure: {0}")]
    Internal(String),

    #[error("render cancelled")]
    Cancelled,

    #[error("vocoder invocation failed: {0}")]
    VocoderFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Maps to the HTTP status code the `/` resample endpoint returns.
    pub fn status_code(&self) -> u16 {
        match self {
            RenderError::InvalidArgument(_) => 400,
            RenderError::NotFound(_) => 404,
            RenderError::Cancelled => 499,
            RenderError::Internal(_) | RenderError::VocoderFailure(_) | RenderError::Io(_) => 500,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
