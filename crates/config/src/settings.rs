//! The `[Sampler]` settings section.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Opaque model backend configuration: where to find the vocoder or
/// separator's weights. The render core never looks inside this; it
/// only passes it to whichever `VocoderModel`/`SeparatorModel`
/// implementation it was given.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VocoderConfig {
    #[serde(default)]
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HnSepConfig {
    #[serde(default)]
    pub model_path: Option<String>,
}

/// Settings for the `Sampler` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub cache_path: Option<String>,
    pub max_workers: usize,
    pub sample_rate: u32,
    pub hop_size: usize,
    pub origin_hop_size: usize,
    pub n_fft: usize,
    pub win_size: usize,
    pub num_mels: usize,
    pub mel_f_min: f64,
    pub mel_f_max: f64,
    pub fill: usize,
    pub peak_limit: f32,
    pub wave_norm: bool,
    pub loop_mode: bool,
    pub vocoder: VocoderConfig,
    pub hn_sep: HnSepConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 8572,
            cache_path: None,
            max_workers: 2,
            sample_rate: 44100,
            hop_size: 512,
            origin_hop_size: 128,
            n_fft: 2048,
            win_size: 2048,
            num_mels: 128,
            mel_f_min: 40.0,
            mel_f_max: 16000.0,
            fill: 8,
            peak_limit: 0.9,
            wave_norm: true,
            loop_mode: false,
            vocoder: VocoderConfig::default(),
            hn_sep: HnSepConfig::default(),
        }
    }
}

/// Loads settings from `config/default.{yaml,toml}` < `config/{env}` <
/// `RESAMPLER__*` environment variables, falling back to documented
/// defaults if no files are present.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));
    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix("RESAMPLER")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.max_workers == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_workers".into(),
            message: "must be at least 1".into(),
        });
    }
    if settings.n_fft == 0 || !settings.n_fft.is_power_of_two() {
        return Err(ConfigError::InvalidValue {
            field: "n_fft".into(),
            message: "must be a power of two".into(),
        });
    }
    if settings.mel_f_max <= settings.mel_f_min {
        return Err(ConfigError::InvalidValue {
            field: "mel_f_max".into(),
            message: "must exceed mel_f_min".into(),
        });
    }
    Ok(())
}
