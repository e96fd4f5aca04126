//! Layered configuration, mirroring the `config`-crate pattern of
//! `File::with_name("config/default")` < `config/{env}` < environment
//! variables with a `RESAMPLER__` prefix.

pub mod settings;

pub use settings::{load_settings, HnSepConfig, Settings, VocoderConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
