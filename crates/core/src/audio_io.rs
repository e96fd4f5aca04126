//! Mono WAV I/O: a thin, concrete implementation over `hound` so the
//! crate is runnable end to end, hidden behind [`AudioIo`] so the
//! render core stays decoupled from the concrete codec.

use rubato::{FftFixedIn, Resampler};
use std::path::Path;

use crate::error::{RenderError, RenderResult};

/// Reads and writes mono, 32-bit-float-in-memory PCM audio.
pub trait AudioIo: Send + Sync {
    /// Reads a mono WAV file and resamples it to `target_rate` if needed.
    fn read_mono(&self, path: &Path, target_rate: u32) -> RenderResult<Vec<f32>>;

    /// Writes `samples` as 16-bit PCM mono WAV at `sample_rate`.
    fn write_mono_pcm16(&self, path: &Path, samples: &[f32], sample_rate: u32) -> RenderResult<()>;
}

/// `hound`-backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoundAudioIo;

impl AudioIo for HoundAudioIo {
    fn read_mono(&self, path: &Path, target_rate: u32) -> RenderResult<Vec<f32>> {
        if !path.exists() {
            return Err(RenderError::NotFound(path.display().to_string()));
        }
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| RenderError::Internal(format!("failed to open wav {}: {e}", path.display())))?;
        let spec = reader.spec();
        let source_rate = spec.sample_rate;
        let channels = spec.channels as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| RenderError::Internal(e.to_string()))?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| RenderError::Internal(e.to_string()))?,
        };

        let mono = downmix(&samples, channels);
        if source_rate == target_rate {
            Ok(mono)
        } else {
            resample(&mono, source_rate, target_rate)
        }
    }

    fn write_mono_pcm16(&self, path: &Path, samples: &[f32], sample_rate: u32) -> RenderResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| RenderError::Internal(format!("failed to create wav {}: {e}", path.display())))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm16 = (clamped * i16::MAX as f32) as i16;
            writer
                .write_sample(pcm16)
                .map_err(|e| RenderError::Internal(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| RenderError::Internal(e.to_string()))?;
        Ok(())
    }
}

fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// High-quality resampling via an FFT-based sinc resampler, with a
/// linear fallback for buffers too short to fill a chunk.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> RenderResult<Vec<f32>> {
    if samples.len() < 64 {
        return Ok(resample_linear(samples, from_rate, to_rate));
    }
    let chunk_size = samples.len().min(1024);
    let samples_f64: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    match FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1) {
        Ok(mut resampler) => {
            let input_frames = vec![samples_f64];
            match resampler.process(&input_frames, None) {
                Ok(output_frames) => Ok(output_frames[0].iter().map(|&s| s as f32).collect()),
                Err(e) => {
                    tracing::warn!("rubato processing failed, using linear fallback: {e}");
                    Ok(resample_linear(samples, from_rate, to_rate))
                }
            }
        }
        Err(e) => {
            tracing::warn!("rubato planner failed, using linear fallback: {e}");
            Ok(resample_linear(samples, from_rate, to_rate))
        }
    }
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = src_pos.floor() as usize;
            let frac = (src_pos - idx as f64) as f32;
            let a = samples.get(idx).copied().unwrap_or(0.0);
            let b = samples.get(idx + 1).copied().unwrap_or(a);
            a + (b - a) * frac
        })
        .collect()
}
