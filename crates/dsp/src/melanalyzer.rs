//! Pitch-aware mel spectrogram extraction.
//!
//! A naive mel extraction re-pitches the whole spectral envelope along
//! with the fundamental, smearing formants. Instead we run the STFT at
//! a widened FFT/window size proportional to the pitch ratio, then
//! resample the bin axis back down to the base bin count by linear
//! interpolation before mel projection — the same number of bins now
//! span a narrower analysis band, which is what keeps formants
//! anchored while the source is conceptually shifted.

use std::sync::Arc;

use crate::error::{DspError, DspResult};
use crate::matrix::FloatMatrix;
use crate::melbank::mel_filterbank;
use crate::stft::stft_with_pad;

pub struct MelAnalyzerConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub win_len: usize,
    pub hop: usize,
    pub num_mels: usize,
    pub f_min: f64,
    pub f_max: f64,
}

/// Extracts a `num_mels x num_frames` log-mel spectrogram from `signal`,
/// widening the analysis window by `2^(key_shift_semitones/12)` and the
/// hop by `speed`, then linearly resampling the bin axis back to the
/// configured bin count before mel projection.
pub fn extract_mel(
    signal: &[f64],
    config: &MelAnalyzerConfig,
    key_shift_semitones: f64,
    speed: f64,
) -> DspResult<FloatMatrix> {
    if speed <= 0.0 {
        return Err(DspError::InvalidArgument("speed must be positive".into()));
    }
    let factor = 2f64.powf(key_shift_semitones / 12.0);
    let n_fft_new = (config.n_fft as f64 * factor).round().max(1.0) as usize;
    let win_len_new = (config.win_len as f64 * factor).round().max(1.0) as usize;
    let win_len_new = win_len_new.min(n_fft_new);
    let hop_new = (config.hop as f64 * speed).round().max(1.0) as usize;

    // Pad by (winLenNew - hopNew)/2 left and the remainder right, not
    // the STFT engine's default nFft/2 centering.
    let half_span = win_len_new.saturating_sub(hop_new);
    let pad_left = half_span / 2;
    let pad_right = (half_span + 1) / 2;
    let spectrogram = stft_with_pad(signal, n_fft_new, win_len_new, hop_new, pad_left, pad_right)?;
    let mut magnitude = spectrogram.magnitude();

    let base_bins = config.n_fft / 2 + 1;
    if key_shift_semitones != 0.0 {
        magnitude = crop_and_rescale_bins(&magnitude, base_bins, factor)?;
    }

    let filterbank: Arc<FloatMatrix> = mel_filterbank(
        config.sample_rate,
        config.n_fft,
        config.num_mels,
        config.f_min,
        config.f_max,
    )?;
    let mel = filterbank.matmul(&magnitude)?;
    Ok(log_compress(&mel))
}

/// Rescales `magnitude`'s bin axis to `target_bins` rows by linearly
/// interpolating source bins at position `target / factor` for each
/// target bin. Target positions that fall outside the source bin
/// range are left at zero.
fn crop_and_rescale_bins(
    magnitude: &FloatMatrix,
    target_bins: usize,
    factor: f64,
) -> DspResult<FloatMatrix> {
    let num_frames = magnitude.cols();
    let source_bins = magnitude.rows();
    let mut out = FloatMatrix::zeros(target_bins, num_frames);
    if source_bins == 0 {
        return Ok(out);
    }
    for target in 0..target_bins {
        let src_pos = target as f64 / factor;
        if src_pos < 0.0 || src_pos > (source_bins - 1) as f64 {
            continue;
        }
        let lo = src_pos.floor() as usize;
        let hi = (lo + 1).min(source_bins - 1);
        let frac = (src_pos - lo as f64) as f32;
        for frame in 0..num_frames {
            let a = magnitude.get(lo, frame);
            let b = magnitude.get(hi, frame);
            out.set(target, frame, a + (b - a) * frac);
        }
    }
    Ok(out)
}

const LOG_FLOOR: f32 = 1e-5;

fn log_compress(mel: &FloatMatrix) -> FloatMatrix {
    let mut out = FloatMatrix::zeros(mel.rows(), mel.cols());
    for row in 0..mel.rows() {
        for (col, value) in mel.row(row).iter().enumerate() {
            out.set(row, col, value.max(LOG_FLOOR).ln());
        }
    }
    out
}
