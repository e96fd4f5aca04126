use thiserror::Error;

/// All DSP preconditions raise this; the render core maps it to
/// `RenderError::InvalidArgument`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type DspResult<T> = Result<T, DspError>;
