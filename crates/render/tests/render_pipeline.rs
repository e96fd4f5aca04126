//! End-to-end exercise of `RenderOrchestrator::render`: synthesize a
//! short sine WAV, render it, and check the output file is a playable
//! WAV of roughly the requested duration.

use std::sync::Arc;

use utau_config::Settings;
use utau_core::{AudioIo, CancellationToken, Flags, HoundAudioIo, RenderParams};
use utau_render::{FallbackSeparator, FallbackVocoder, RenderOrchestrator};

fn write_sine_wav(path: &std::path::Path, sample_rate: u32, seconds: f64, freq: f64) {
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
        let sample = (t * freq * std::f64::consts::TAU).sin() * 0.3;
        writer.write_sample((sample * i16::MAX as f64) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn base_params(input_path: String, output_path: String) -> RenderParams {
    RenderParams {
        input_path,
        output_path,
        pitch_midi: 69,
        velocity: 100.0,
        flags: Flags::default(),
        offset_ms: 0.0,
        length_ms: 500.0,
        consonant_ms: 50.0,
        cutoff_ms: 100.0,
        volume_pct: 100.0,
        modulation: 0.0,
        tempo_bpm: 120.0,
        pitch_bend_cents: vec![0.0, 50.0, -50.0, 0.0],
    }
}

#[test]
fn renders_a_wav_of_roughly_the_requested_length() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    let output_path = dir.path().join("out.wav");
    write_sine_wav(&input_path, 44100, 1.0, 220.0);

    let mut settings = Settings::default();
    settings.cache_path = Some(dir.path().join("cache").to_string_lossy().into_owned());
    let vocoder = Arc::new(FallbackVocoder);
    let separator = Arc::new(FallbackSeparator);
    let orchestrator = RenderOrchestrator::new(settings, vocoder, separator);
    let audio_io = HoundAudioIo;
    let cancel = CancellationToken::new();

    let params = base_params(
        input_path.to_string_lossy().into_owned(),
        output_path.to_string_lossy().into_owned(),
    );
    orchestrator.render(&params, &audio_io, &cancel).unwrap();

    let reader = hound::WavReader::open(&output_path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 44100);
    let samples = reader.len() as f64 / spec.sample_rate as f64;
    assert!(samples > 0.3 && samples < 0.8, "rendered {samples}s");
}

#[test]
fn discard_output_sentinel_skips_synthesis_but_still_populates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    write_sine_wav(&input_path, 44100, 1.0, 220.0);

    let mut settings = Settings::default();
    let cache_dir = dir.path().join("cache");
    settings.cache_path = Some(cache_dir.to_string_lossy().into_owned());
    let vocoder = Arc::new(FallbackVocoder);
    let separator = Arc::new(FallbackSeparator);
    let orchestrator = RenderOrchestrator::new(settings, vocoder, separator);
    let audio_io = HoundAudioIo;
    let cancel = CancellationToken::new();

    let params = base_params(input_path.to_string_lossy().into_owned(), "nul".into());
    orchestrator.render(&params, &audio_io, &cancel).unwrap();

    assert!(cache_dir.exists(), "feature cache should be populated even when output is discarded");
}

#[test]
fn re_renders_hit_the_feature_cache() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    let output_path = dir.path().join("out.wav");
    write_sine_wav(&input_path, 44100, 1.0, 220.0);

    let mut settings = Settings::default();
    settings.cache_path = Some(dir.path().join("cache").to_string_lossy().into_owned());
    let orchestrator = RenderOrchestrator::new(
        settings,
        Arc::new(FallbackVocoder),
        Arc::new(FallbackSeparator),
    );
    let audio_io = HoundAudioIo;

    let params = base_params(
        input_path.to_string_lossy().into_owned(),
        output_path.to_string_lossy().into_owned(),
    );
    orchestrator.render(&params, &audio_io, &CancellationToken::new()).unwrap();
    let first_write = std::fs::metadata(&output_path).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(10));
    orchestrator.render(&params, &audio_io, &CancellationToken::new()).unwrap();
    let second_write = std::fs::metadata(&output_path).unwrap().modified().unwrap();
    assert!(second_write >= first_write);
}
