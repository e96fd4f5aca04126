//! Slaney-scale triangular mel filter bank.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DspError, DspResult};
use crate::matrix::FloatMatrix;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FilterbankKey {
    sample_rate: u32,
    n_fft: usize,
    num_mels: usize,
    f_min_milli_hz: i64,
    f_max_milli_hz: i64,
}

static FILTERBANK_CACHE: Lazy<RwLock<HashMap<FilterbankKey, Arc<FloatMatrix>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

const MEL_BREAK_HZ: f64 = 1000.0;
const MEL_BREAK: f64 = MEL_BREAK_HZ / 200.0 * 3.0;
const LOG_STEP: f64 = 0.06875177742094912; // ln(6.4) / 27, Slaney's log-region step

fn hz_to_mel(hz: f64) -> f64 {
    if hz < MEL_BREAK_HZ {
        hz / (200.0 / 3.0)
    } else {
        MEL_BREAK + (hz / MEL_BREAK_HZ).ln() / LOG_STEP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel < MEL_BREAK {
        mel * (200.0 / 3.0)
    } else {
        MEL_BREAK_HZ * (LOG_STEP * (mel - MEL_BREAK)).exp()
    }
}

/// Builds (or fetches the memoized) Slaney-scale triangular filter bank
/// as a `num_mels x (n_fft/2 + 1)` matrix, each row area-normalized so
/// a constant-energy input produces roughly constant mel energy.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    num_mels: usize,
    f_min: f64,
    f_max: f64,
) -> DspResult<Arc<FloatMatrix>> {
    if n_fft == 0 || num_mels == 0 {
        return Err(DspError::InvalidArgument(
            "n_fft and num_mels must be nonzero".into(),
        ));
    }
    if f_max <= f_min || f_min < 0.0 {
        return Err(DspError::InvalidArgument(
            "f_max must exceed f_min, and f_min must be nonnegative".into(),
        ));
    }
    let key = FilterbankKey {
        sample_rate,
        n_fft,
        num_mels,
        f_min_milli_hz: (f_min * 1000.0).round() as i64,
        f_max_milli_hz: (f_max * 1000.0).round() as i64,
    };
    if let Some(matrix) = FILTERBANK_CACHE.read().get(&key) {
        return Ok(matrix.clone());
    }

    let num_bins = n_fft / 2 + 1;
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let mel_points: Vec<f64> = (0..num_mels + 2)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (num_mels + 1) as f64)
        .collect();
    let hz_points: Vec<f64> = mel_points.iter().map(|m| mel_to_hz(*m)).collect();
    let bin_freqs: Vec<f64> = (0..num_bins)
        .map(|b| b as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mut matrix = FloatMatrix::zeros(num_mels, num_bins);
    for m in 0..num_mels {
        let left = hz_points[m];
        let center = hz_points[m + 1];
        let right = hz_points[m + 2];
        let rise = (center - left).max(1e-12);
        let fall = (right - center).max(1e-12);
        let mut area = 0.0f64;
        let mut weights = vec![0.0f64; num_bins];
        for (b, &freq) in bin_freqs.iter().enumerate() {
            let weight = if freq < left || freq > right {
                0.0
            } else if freq <= center {
                (freq - left) / rise
            } else {
                (right - freq) / fall
            };
            weights[b] = weight;
            area += weight;
        }
        if area > 1e-12 {
            let norm = 2.0 / (right - left).max(1e-12);
            for (b, w) in weights.iter().enumerate() {
                matrix.set(m, b, (w * norm) as f32);
            }
        }
    }

    let matrix = Arc::new(matrix);
    FILTERBANK_CACHE.write().insert(key, matrix.clone());
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hz_mel_roundtrip() {
        for hz in [50.0, 500.0, 1000.0, 4000.0, 16000.0] {
            let mel = hz_to_mel(hz);
            let back = mel_to_hz(mel);
            assert!((back - hz).abs() < 1e-6, "hz={hz} back={back}");
        }
    }

    #[test]
    fn filterbank_shape_matches_request() {
        let fb = mel_filterbank(44100, 2048, 128, 40.0, 16000.0).unwrap();
        assert_eq!(fb.rows(), 128);
        assert_eq!(fb.cols(), 1025);
    }

    #[test]
    fn filterbank_rows_have_positive_energy() {
        let fb = mel_filterbank(44100, 2048, 40, 40.0, 16000.0).unwrap();
        for m in 0..fb.rows() {
            let sum: f32 = fb.row(m).iter().sum();
            assert!(sum > 0.0, "row {m} has zero energy");
        }
    }

    #[test]
    fn filterbank_is_memoized() {
        let a = mel_filterbank(44100, 2048, 128, 40.0, 16000.0).unwrap();
        let b = mel_filterbank(44100, 2048, 128, 40.0, 16000.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn rejects_invalid_range() {
        assert!(mel_filterbank(44100, 2048, 128, 16000.0, 40.0).is_err());
    }
}
