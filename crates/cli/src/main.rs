//! UTAU resampler CLI bridge: parses the host's space-delimited
//! argument line and either renders in-process or forwards the
//! request as JSON to a running resample server.

mod args;
mod pitchbend;

use std::process::ExitCode;
use std::sync::Arc;

use utau_config::Settings;
use utau_core::{AudioIo, CancellationToken, HoundAudioIo, RenderParams};
use utau_render::{FallbackSeparator, FallbackVocoder, RenderOrchestrator};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let params = match args::parse_args(&raw) {
        Ok(params) => params,
        Err(message) => {
            eprintln!("argument error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let result = match std::env::var("RESAMPLER_SERVER_URL") {
        Ok(url) => dispatch_to_server(&url, &params),
        Err(_) => dispatch_in_process(&params),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("render failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch_in_process(params: &RenderParams) -> Result<(), String> {
    let env = std::env::var("RESAMPLER_ENV").ok();
    let settings = utau_config::load_settings(env.as_deref()).unwrap_or_else(|e| {
        eprintln!("warning: failed to load config: {e}. Using defaults.");
        Settings::default()
    });

    let vocoder = Arc::new(FallbackVocoder);
    let separator = Arc::new(FallbackSeparator);
    let orchestrator = RenderOrchestrator::new(settings, vocoder, separator);
    let audio_io: Box<dyn AudioIo> = Box::new(HoundAudioIo);
    let cancel = CancellationToken::new();

    orchestrator
        .render(params, audio_io.as_ref(), &cancel)
        .map_err(|e| e.to_string())
}

fn dispatch_to_server(base_url: &str, params: &RenderParams) -> Result<(), String> {
    let body = serde_json::json!({
        "inputFile": params.input_path,
        "outputFile": params.output_path,
        "pitchMidi": params.pitch_midi,
        "velocity": params.velocity,
        "flags": params.flags,
        "offset": params.offset_ms,
        "length": params.length_ms,
        "consonant": params.consonant_ms,
        "cutoff": params.cutoff_ms,
        "volume": params.volume_pct,
        "modulation": params.modulation,
        "tempo": params.tempo_bpm,
        "pitchBendCents": params.pitch_bend_cents,
    });

    let client = reqwest::blocking::Client::new();
    let response = client
        .post(base_url)
        .json(&body)
        .send()
        .map_err(|e| format!("request to {base_url} failed: {e}"))?;

    if response.status().is_success() {
        Ok(())
    } else {
        let status = response.status();
        let text = response.text().unwrap_or_default();
        Err(format!("server returned {status}: {text}"))
    }
}
