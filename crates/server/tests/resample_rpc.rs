//! Exercises the resample RPC over a real HTTP connection: binds the
//! router to an ephemeral port, then drives it with `reqwest` the way
//! a host editor would.

use std::sync::Arc;

use utau_config::Settings;
use utau_server::{create_router, AppState};

async fn spawn_server() -> String {
    let settings = Settings {
        max_workers: 1,
        ..Settings::default()
    };
    let state = Arc::new(AppState::new(settings));
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn write_sine_wav(path: &std::path::Path, sample_rate: u32, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (sample_rate as f64 * seconds) as usize;
    for i in 0..n {
        let t = i as f64 / sample_rate as f64;
        let sample = (t * 220.0 * std::f64::consts::TAU).sin() * 0.3;
        writer.write_sample((sample * i16::MAX as f64) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[tokio::test]
async fn status_probe_returns_plain_text_ready() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client.get(&base).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Server Ready");
}

#[tokio::test]
async fn resample_round_trips_a_wav_and_returns_plain_text_success() {
    let base = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("a.wav");
    let output_path = dir.path().join("b.wav");
    write_sine_wav(&input_path, 44100, 1.0);

    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "inputFile": input_path.to_string_lossy(),
        "outputFile": output_path.to_string_lossy(),
        "pitchMidi": 69,
        "offset": 0.0,
        "length": 300.0,
        "consonant": 30.0,
        "cutoff": 50.0,
    });
    let response = client.post(&base).json(&body).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let text = response.text().await.unwrap();
    assert!(text.starts_with("Success: 'a' -> "));
    assert!(output_path.exists());
}

#[tokio::test]
async fn resample_missing_input_file_returns_not_found_status() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "inputFile": "/no/such/file.wav",
        "outputFile": "/tmp/whatever.wav",
        "pitchMidi": 69,
        "length": 300.0,
    });
    let response = client.post(&base).json(&body).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
