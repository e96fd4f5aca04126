//! STFT/ISTFT with reflect padding and overlap-add reconstruction.
//!
//! Frame-level FFTs run in parallel via `rayon` once a clip has enough
//! frames to make the fork/join overhead worth it.

use rayon::prelude::*;

use crate::error::{DspError, DspResult};
use crate::fft::fft;
use crate::matrix::ComplexSpectrogram;

/// Below this frame count, parallel iteration isn't worth the overhead.
const PARALLEL_FRAME_THRESHOLD: usize = 32;

/// Periodic (DFT-even) Hann window of length `n`, matching the
/// convention used by the analysis/synthesis pair below.
pub fn hann_window(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

/// Index into `signal` (length `n`) that sample `i` (possibly negative
/// or beyond `n`) reflects to, mirroring at each boundary without
/// repeating the edge sample.
pub fn reflect_index(i: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut m = i % period;
    if m < 0 {
        m += period;
    }
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

fn reflect_pad_asym(signal: &[f64], pad_left: usize, pad_right: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return vec![0.0; pad_left + pad_right];
    }
    (0..pad_left + n + pad_right)
        .map(|i| signal[reflect_index(i as isize - pad_left as isize, n)])
        .collect()
}

/// Forward STFT. Pads the signal by reflection so the first frame is
/// centered on sample 0, producing `1 + floor(len / hop)` frames.
pub fn stft(
    signal: &[f64],
    n_fft: usize,
    win_len: usize,
    hop: usize,
) -> DspResult<ComplexSpectrogram> {
    stft_with_pad(signal, n_fft, win_len, hop, n_fft / 2, n_fft / 2)
}

/// Forward STFT with an explicit, possibly asymmetric, reflect-pad
/// width on each side instead of the default `n_fft/2` centering.
pub fn stft_with_pad(
    signal: &[f64],
    n_fft: usize,
    win_len: usize,
    hop: usize,
    pad_left: usize,
    pad_right: usize,
) -> DspResult<ComplexSpectrogram> {
    if n_fft == 0 || win_len == 0 || hop == 0 {
        return Err(DspError::InvalidArgument(
            "n_fft, win_len, and hop must all be nonzero".into(),
        ));
    }
    if win_len > n_fft {
        return Err(DspError::InvalidArgument(
            "win_len must not exceed n_fft".into(),
        ));
    }
    let window = hann_window(win_len);
    let padded = reflect_pad_asym(signal, pad_left, pad_right);
    let usable = padded.len().saturating_sub(n_fft);
    let num_frames = if padded.len() >= n_fft {
        usable / hop + 1
    } else {
        0
    };
    let num_bins = n_fft / 2 + 1;

    let compute_frame = |frame_idx: usize| -> (Vec<f64>, Vec<f64>) {
        let start = frame_idx * hop;
        let mut re = vec![0.0; n_fft];
        let mut im = vec![0.0; n_fft];
        let win_offset = (n_fft - win_len) / 2;
        for i in 0..win_len {
            re[win_offset + i] = padded[start + win_offset + i] * window[i];
        }
        fft(&mut re, &mut im, false).expect("fixed-size fft on frame buffers cannot fail");
        re.truncate(num_bins);
        im.truncate(num_bins);
        (re, im)
    };

    let frames: Vec<(Vec<f64>, Vec<f64>)> = if num_frames >= PARALLEL_FRAME_THRESHOLD {
        (0..num_frames).into_par_iter().map(compute_frame).collect()
    } else {
        (0..num_frames).map(compute_frame).collect()
    };

    let mut real = vec![0.0f32; num_bins * num_frames];
    let mut imag = vec![0.0f32; num_bins * num_frames];
    for (frame_idx, (re, im)) in frames.into_iter().enumerate() {
        for bin in 0..num_bins {
            real[frame_idx * num_bins + bin] = re[bin] as f32;
            imag[frame_idx * num_bins + bin] = im[bin] as f32;
        }
    }

    Ok(ComplexSpectrogram {
        real,
        imag,
        num_bins,
        num_frames,
    })
}

/// Inverse STFT via overlap-add with window-sum-square normalization.
/// Returns a signal trimmed back to `output_len` samples, undoing the
/// forward centering pad.
pub fn istft(
    spectrogram: &ComplexSpectrogram,
    n_fft: usize,
    win_len: usize,
    hop: usize,
    output_len: usize,
) -> DspResult<Vec<f64>> {
    if n_fft == 0 || win_len == 0 || hop == 0 {
        return Err(DspError::InvalidArgument(
            "n_fft, win_len, and hop must all be nonzero".into(),
        ));
    }
    let expected_bins = n_fft / 2 + 1;
    if spectrogram.num_bins != expected_bins {
        return Err(DspError::InvalidArgument(format!(
            "spectrogram has {} bins, expected {} for n_fft={}",
            spectrogram.num_bins, expected_bins, n_fft
        )));
    }
    let window = hann_window(win_len);
    let pad = n_fft / 2;
    let total_len = (spectrogram.num_frames.saturating_sub(1)) * hop + n_fft;
    let mut signal = vec![0.0f64; total_len];
    let mut weight = vec![0.0f64; total_len];
    let win_offset = (n_fft - win_len) / 2;

    for frame_idx in 0..spectrogram.num_frames {
        let mut re = vec![0.0f64; n_fft];
        let mut im = vec![0.0f64; n_fft];
        for bin in 0..spectrogram.num_bins {
            let r = spectrogram.real[frame_idx * spectrogram.num_bins + bin] as f64;
            let i = spectrogram.imag[frame_idx * spectrogram.num_bins + bin] as f64;
            re[bin] = r;
            im[bin] = i;
            if bin != 0 && !(n_fft % 2 == 0 && bin == n_fft / 2) {
                re[n_fft - bin] = r;
                im[n_fft - bin] = -i;
            }
        }
        fft(&mut re, &mut im, true).expect("fixed-size ifft on frame buffers cannot fail");

        let start = frame_idx * hop;
        for i in 0..win_len {
            let sample_idx = start + win_offset + i;
            signal[sample_idx] += re[win_offset + i] * window[i];
            weight[sample_idx] += window[i] * window[i];
        }
    }

    for i in 0..total_len {
        if weight[i] > 1e-8 {
            signal[i] /= weight[i];
        }
    }

    let trimmed: Vec<f64> = signal
        .into_iter()
        .skip(pad)
        .take(output_len)
        .collect();
    let mut result = trimmed;
    result.resize(output_len, 0.0);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_endpoints_are_near_zero() {
        let w = hann_window(1024);
        assert!(w[0] < 1e-9);
        assert!((w[512] - 1.0).abs() < 0.01);
    }

    #[test]
    fn stft_istft_roundtrip_reconstructs_signal() {
        let n = 8000;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 16000.0).sin())
            .collect();
        let spec = stft(&signal, 1024, 1024, 256).unwrap();
        let recon = istft(&spec, 1024, 1024, 256, n).unwrap();
        assert_eq!(recon.len(), n);
        let interior = 1024..(n - 1024);
        let max_err = interior
            .map(|i| (recon[i] - signal[i]).abs())
            .fold(0.0, f64::max);
        assert!(max_err < 0.05, "max_err={max_err}");
    }

    #[test]
    fn stft_rejects_win_len_larger_than_nfft() {
        let signal = vec![0.0; 100];
        assert!(stft(&signal, 256, 512, 64).is_err());
    }

    #[test]
    fn stft_frame_count_matches_formula() {
        let signal = vec![0.0; 2048];
        let spec = stft(&signal, 512, 512, 128).unwrap();
        assert_eq!(spec.num_bins, 257);
        assert!(spec.num_frames > 0);
    }

    #[test]
    fn parallel_and_serial_paths_agree() {
        let n = 20000;
        let signal: Vec<f64> = (0..n).map(|i| (i as f64 * 0.01).sin()).collect();
        let small_hop_spec = stft(&signal, 512, 512, 32).unwrap();
        assert!(small_hop_spec.num_frames >= PARALLEL_FRAME_THRESHOLD);
        let recon = istft(&small_hop_spec, 512, 512, 32, n).unwrap();
        assert_eq!(recon.len(), n);
    }

    #[test]
    fn asymmetric_pad_differs_from_centered_pad() {
        let signal = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let centered = stft(&signal, 4, 4, 2).unwrap();
        let asym = stft_with_pad(&signal, 4, 4, 2, 1, 2).unwrap();
        assert_ne!(centered.num_frames, asym.num_frames);
    }

    #[test]
    fn reflect_index_mirrors_without_repeating_edge() {
        assert_eq!(reflect_index(-1, 4), 1);
        assert_eq!(reflect_index(-2, 4), 2);
        assert_eq!(reflect_index(4, 4), 2);
        assert_eq!(reflect_index(5, 4), 1);
    }
}
