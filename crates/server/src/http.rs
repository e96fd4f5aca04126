//! The Resample RPC: `GET /` for a status probe, `POST /` to render.
//! Both sides of the wire are plain text, not JSON — this mirrors the
//! UTAU resampler server contract host editors already speak.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use utau_core::{CancellationToken, Flags, RenderError, RenderParams};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResampleRequest {
    #[serde(rename = "inputFile")]
    pub input_file: String,
    #[serde(rename = "outputFile")]
    pub output_file: String,
    #[serde(rename = "pitchMidi")]
    pub pitch_midi: i32,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[serde(default)]
    pub flags: Flags,
    #[serde(default)]
    pub offset: f64,
    pub length: f64,
    #[serde(default)]
    pub consonant: f64,
    #[serde(default)]
    pub cutoff: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub modulation: f64,
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default, rename = "pitchBendCents")]
    pub pitch_bend_cents: Vec<f64>,
}

fn default_velocity() -> f64 {
    100.0
}
fn default_volume() -> f64 {
    100.0
}
fn default_tempo() -> f64 {
    120.0
}

struct ApiError(RenderError);

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.0.to_string()).into_response()
    }
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "Server Ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Server Initializing").into_response()
    }
}

async fn resample(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResampleRequest>,
) -> Result<String, ApiError> {
    let input_file = req.input_file.clone();
    let output_file = req.output_file.clone();
    let params = RenderParams {
        input_path: req.input_file,
        output_path: req.output_file,
        pitch_midi: req.pitch_midi,
        velocity: req.velocity,
        flags: req.flags,
        offset_ms: req.offset,
        length_ms: req.length,
        consonant_ms: req.consonant,
        cutoff_ms: req.cutoff,
        volume_pct: req.volume,
        modulation: req.modulation,
        tempo_bpm: req.tempo,
        pitch_bend_cents: req.pitch_bend_cents,
    };
    let cancel = CancellationToken::new();
    state.pool.submit(params, cancel).await?;

    let stem_in = Path::new(&input_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(input_file);
    let file_out = Path::new(&output_file)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(output_file);
    Ok(format!("Success: '{stem_in}' -> '{file_out}'"))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status).post(resample))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use utau_config::Settings;

    #[tokio::test]
    async fn status_reports_ready_once_constructed() {
        let settings = Settings {
            max_workers: 2,
            ..Settings::default()
        };
        let state = Arc::new(AppState::new(settings));
        let response = status(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn request_deserializes_camel_case_wire_fields() {
        let body = r#"{
            "inputFile": "a.wav",
            "outputFile": "b.wav",
            "pitchMidi": 69,
            "offset": 0,
            "length": 1000
        }"#;
        let req: ResampleRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.input_file, "a.wav");
        assert_eq!(req.output_file, "b.wav");
        assert_eq!(req.pitch_midi, 69);
        assert_eq!(req.length, 1000.0);
        assert_eq!(req.velocity, 100.0);
    }
}
