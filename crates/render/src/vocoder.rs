//! Opaque model backends. The orchestrator only ever sees these two
//! traits; it never inspects mel shapes or model internals beyond
//! calling through the interface.

use utau_core::{RenderError, RenderResult};
use utau_dsp::FloatMatrix;

/// Turns a log-mel spectrogram plus an f0 track back into a waveform.
pub trait VocoderModel: Send + Sync {
    fn synthesize(&self, mel: &FloatMatrix, f0: &[f64], sample_rate: u32) -> RenderResult<Vec<f64>>;
}

/// Extracts the harmonic component of `samples`, a waveform of the
/// same length. Implementations run their own internal STFT/mask/ISTFT;
/// on any internal failure they should fall back to returning a copy
/// of the input rather than propagating the error.
pub trait SeparatorModel: Send + Sync {
    fn separate_harmonic(&self, samples: &[f64], sample_rate: u32) -> RenderResult<Vec<f64>>;
}

/// Deterministic stand-in used when no model path is configured: additive
/// sine synthesis driven by f0, enough to keep the pipeline runnable end
/// to end without a real vocoder checkpoint.
pub struct FallbackVocoder;

impl VocoderModel for FallbackVocoder {
    fn synthesize(&self, mel: &FloatMatrix, f0: &[f64], sample_rate: u32) -> RenderResult<Vec<f64>> {
        if mel.cols() != f0.len() {
            return Err(RenderError::InvalidArgument(format!(
                "mel has {} frames but f0 has {} entries",
                mel.cols(),
                f0.len()
            )));
        }
        let hop = 256usize;
        let mut out = vec![0.0f64; mel.cols() * hop];
        let mut phase = 0.0f64;
        for (frame, &f0_hz) in f0.iter().enumerate() {
            let energy: f32 = (0..mel.rows()).map(|r| mel.get(r, frame).exp()).sum();
            let amplitude = (energy / mel.rows().max(1) as f32).min(1.0) as f64;
            let freq = if f0_hz > 0.0 { f0_hz } else { 0.0 };
            for i in 0..hop {
                let sample_idx = frame * hop + i;
                if freq > 0.0 {
                    out[sample_idx] = amplitude * phase.sin();
                    phase += 2.0 * std::f64::consts::PI * freq / sample_rate as f64;
                }
            }
        }
        Ok(out)
    }
}

/// No model configured: returns a copy of the input, the same
/// no-op fallback a real separator takes on internal failure.
pub struct FallbackSeparator;

impl SeparatorModel for FallbackSeparator {
    fn separate_harmonic(&self, samples: &[f64], _sample_rate: u32) -> RenderResult<Vec<f64>> {
        Ok(samples.to_vec())
    }
}

#[cfg(feature = "onnx")]
mod onnx_backend {
    use super::*;
    use ndarray::{Array2, Array3};
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    pub struct OrtVocoder {
        session: Session,
    }

    impl OrtVocoder {
        pub fn load(model_path: impl AsRef<Path>) -> RenderResult<OrtVocoder> {
            let session = Session::builder()
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?;
            Ok(OrtVocoder { session })
        }
    }

    impl VocoderModel for OrtVocoder {
        fn synthesize(
            &self,
            mel: &FloatMatrix,
            f0: &[f64],
            _sample_rate: u32,
        ) -> RenderResult<Vec<f64>> {
            let mel_array = Array3::from_shape_fn((1, mel.rows(), mel.cols()), |(_, r, c)| {
                mel.get(r, c)
            });
            let f0_array = Array2::from_shape_vec((1, f0.len()), f0.to_vec())
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?;
            let mel_tensor = Tensor::from_array(mel_array)
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?;
            let f0_tensor = Tensor::from_array(f0_array)
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?;
            let outputs = self
                .session
                .run(ort::inputs!["mel" => mel_tensor, "f0" => f0_tensor]
                    .map_err(|e| RenderError::VocoderFailure(e.to_string()))?)
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?;
            let (_, wav) = outputs[0]
                .try_extract_raw_tensor::<f32>()
                .map_err(|e| RenderError::VocoderFailure(e.to_string()))?;
            Ok(wav.iter().map(|v| *v as f64).collect())
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx_backend::OrtVocoder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_vocoder_produces_expected_length() {
        let mel = FloatMatrix::zeros(4, 3);
        let f0 = vec![100.0, 100.0, 100.0];
        let wav = FallbackVocoder.synthesize(&mel, &f0, 44100).unwrap();
        assert_eq!(wav.len(), 3 * 256);
    }

    #[test]
    fn fallback_vocoder_rejects_length_mismatch() {
        let mel = FloatMatrix::zeros(4, 3);
        let f0 = vec![100.0, 100.0];
        assert!(FallbackVocoder.synthesize(&mel, &f0, 44100).is_err());
    }

    #[test]
    fn fallback_separator_passes_samples_through() {
        let samples = vec![1.0, 2.0, -3.0];
        let harmonic = FallbackSeparator.separate_harmonic(&samples, 44100).unwrap();
        assert_eq!(harmonic, samples);
    }
}
