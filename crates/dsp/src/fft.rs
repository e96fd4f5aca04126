//! FFT core: cached radix-2 Cooley-Tukey for power-of-two sizes,
//! Bluestein's chirp transform as the arbitrary-length fallback.
//!
//! Plans are memoized process-wide by `N`, built once, then shared
//! read-only across threads.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{DspError, DspResult};

static PLAN_CACHE: Lazy<RwLock<HashMap<usize, Arc<FftPlan>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the process-wide plan for size `n`, building it on first use.
pub fn plan_for(n: usize) -> DspResult<Arc<FftPlan>> {
    if n == 0 {
        return Err(DspError::InvalidArgument("fft size must be >= 1".into()));
    }
    if let Some(plan) = PLAN_CACHE.read().get(&n) {
        return Ok(plan.clone());
    }
    let plan = Arc::new(FftPlan::build(n));
    PLAN_CACHE.write().insert(n, plan.clone());
    Ok(plan)
}

enum PlanKind {
    Radix2 {
        bit_reverse: Vec<usize>,
        twiddles_re: Vec<f64>,
        twiddles_im: Vec<f64>,
    },
    Bluestein {
        m: usize,
        chirp_re: Vec<f64>,
        chirp_im: Vec<f64>,
        kernel_fft_re: Vec<f64>,
        kernel_fft_im: Vec<f64>,
        inner: Arc<FftPlan>,
    },
}

pub struct FftPlan {
    n: usize,
    kind: PlanKind,
}

impl FftPlan {
    fn build(n: usize) -> FftPlan {
        if n.is_power_of_two() {
            FftPlan {
                n,
                kind: build_radix2(n),
            }
        } else {
            FftPlan {
                n,
                kind: build_bluestein(n),
            }
        }
    }
}

fn build_radix2(n: usize) -> PlanKind {
    let bits = n.trailing_zeros();
    let bit_reverse: Vec<usize> = (0..n).map(|i| reverse_bits(i, bits)).collect();
    let half = n / 2;
    let mut twiddles_re = vec![0.0; half.max(1)];
    let mut twiddles_im = vec![0.0; half.max(1)];
    for k in 0..half {
        let angle = -2.0 * PI * k as f64 / n as f64;
        twiddles_re[k] = angle.cos();
        twiddles_im[k] = angle.sin();
    }
    PlanKind::Radix2 {
        bit_reverse,
        twiddles_re,
        twiddles_im,
    }
}

fn reverse_bits(mut value: usize, bits: u32) -> usize {
    let mut result = 0usize;
    for _ in 0..bits {
        result = (result << 1) | (value & 1);
        value >>= 1;
    }
    result
}

fn next_power_of_two(value: usize) -> usize {
    let mut m = 1usize;
    while m < value {
        m <<= 1;
    }
    m
}

fn build_bluestein(n: usize) -> PlanKind {
    let m = next_power_of_two(2 * n - 1);
    let two_n = 2 * n;
    let mut chirp_re = vec![0.0; n];
    let mut chirp_im = vec![0.0; n];
    for k in 0..n {
        // k*k mod 2N keeps the angle's magnitude bounded for large k.
        let k_sq_mod = ((k as u128 * k as u128) % two_n as u128) as f64;
        let angle = -PI * k_sq_mod / n as f64;
        chirp_re[k] = angle.cos();
        chirp_im[k] = angle.sin();
    }

    let mut kernel_re = vec![0.0; m];
    let mut kernel_im = vec![0.0; m];
    // h[k] = conj(chirp[k]), placed at index k and, by h[-k] = h[k]
    // symmetry, mirrored at index m - k.
    kernel_re[0] = chirp_re[0];
    kernel_im[0] = -chirp_im[0];
    for k in 1..n {
        kernel_re[k] = chirp_re[k];
        kernel_im[k] = -chirp_im[k];
        kernel_re[m - k] = chirp_re[k];
        kernel_im[m - k] = -chirp_im[k];
    }

    let inner = Arc::new(FftPlan {
        n: m,
        kind: build_radix2(m),
    });
    radix2_transform_in_place(&mut kernel_re, &mut kernel_im, &inner, false);

    PlanKind::Bluestein {
        m,
        chirp_re,
        chirp_im,
        kernel_fft_re: kernel_re,
        kernel_fft_im: kernel_im,
        inner,
    }
}

fn radix2_transform_in_place(real: &mut [f64], imag: &mut [f64], plan: &FftPlan, inverse: bool) {
    let PlanKind::Radix2 {
        bit_reverse,
        twiddles_re,
        twiddles_im,
    } = &plan.kind
    else {
        panic!("radix2_transform_in_place called with a non-radix2 plan");
    };
    let n = plan.n;
    if n <= 1 {
        return;
    }
    for i in 0..n {
        let j = bit_reverse[i];
        if j > i {
            real.swap(i, j);
            imag.swap(i, j);
        }
    }

    let mut len = 2usize;
    while len <= n {
        let half = len / 2;
        let table_step = n / len;
        let mut start = 0usize;
        while start < n {
            for k in 0..half {
                let twiddle_idx = k * table_step;
                let wre = twiddles_re[twiddle_idx];
                let wim = if inverse {
                    -twiddles_im[twiddle_idx]
                } else {
                    twiddles_im[twiddle_idx]
                };
                let i = start + k;
                let j = i + half;
                let tre = real[j] * wre - imag[j] * wim;
                let tim = real[j] * wim + imag[j] * wre;
                real[j] = real[i] - tre;
                imag[j] = imag[i] - tim;
                real[i] += tre;
                imag[i] += tim;
            }
            start += len;
        }
        len <<= 1;
    }

    if inverse {
        let scale = 1.0 / n as f64;
        for v in real.iter_mut() {
            *v *= scale;
        }
        for v in imag.iter_mut() {
            *v *= scale;
        }
    }
}

fn bluestein_forward(real: &mut [f64], imag: &mut [f64], n: usize, plan: &PlanKind) {
    let PlanKind::Bluestein {
        m,
        chirp_re,
        chirp_im,
        kernel_fft_re,
        kernel_fft_im,
        inner,
    } = plan
    else {
        panic!("bluestein_forward called with a non-bluestein plan");
    };
    let m = *m;
    let mut a_re = vec![0.0; m];
    let mut a_im = vec![0.0; m];
    for k in 0..n {
        a_re[k] = real[k] * chirp_re[k] - imag[k] * chirp_im[k];
        a_im[k] = real[k] * chirp_im[k] + imag[k] * chirp_re[k];
    }
    radix2_transform_in_place(&mut a_re, &mut a_im, inner, false);
    for i in 0..m {
        let are = a_re[i];
        let aim = a_im[i];
        let kre = kernel_fft_re[i];
        let kim = kernel_fft_im[i];
        a_re[i] = are * kre - aim * kim;
        a_im[i] = are * kim + aim * kre;
    }
    radix2_transform_in_place(&mut a_re, &mut a_im, inner, true);
    for k in 0..n {
        real[k] = a_re[k] * chirp_re[k] - a_im[k] * chirp_im[k];
        imag[k] = a_re[k] * chirp_im[k] + a_im[k] * chirp_re[k];
    }
}

/// Transforms `real`/`imag` in place. `inverse` applies `1/N` scaling.
/// Preconditions: `real.len() == imag.len() == N >= 1`.
pub fn fft(real: &mut [f64], imag: &mut [f64], inverse: bool) -> DspResult<()> {
    let n = real.len();
    if imag.len() != n {
        return Err(DspError::InvalidArgument(
            "real and imaginary buffers must have equal length".into(),
        ));
    }
    if n == 0 {
        return Err(DspError::InvalidArgument("fft size must be >= 1".into()));
    }
    if n == 1 {
        return Ok(());
    }
    let plan = plan_for(n)?;
    match &plan.kind {
        PlanKind::Radix2 { .. } => {
            radix2_transform_in_place(real, imag, &plan, inverse);
        }
        PlanKind::Bluestein { .. } => {
            if !inverse {
                bluestein_forward(real, imag, n, &plan.kind);
            } else {
                for v in imag.iter_mut() {
                    *v = -*v;
                }
                bluestein_forward(real, imag, n, &plan.kind);
                let scale = 1.0 / n as f64;
                for v in real.iter_mut() {
                    *v *= scale;
                }
                for v in imag.iter_mut() {
                    *v = -*v * scale;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dft(real: &[f64], imag: &[f64], inverse: bool) -> (Vec<f64>, Vec<f64>) {
        let n = real.len();
        let mut out_re = vec![0.0; n];
        let mut out_im = vec![0.0; n];
        let sign = if inverse { 1.0 } else { -1.0 };
        for k in 0..n {
            let mut sre = 0.0;
            let mut sim = 0.0;
            for t in 0..n {
                let angle = sign * 2.0 * PI * (k * t) as f64 / n as f64;
                let (s, c) = angle.sin_cos();
                sre += real[t] * c - imag[t] * s;
                sim += real[t] * s + imag[t] * c;
            }
            if inverse {
                sre /= n as f64;
                sim /= n as f64;
            }
            out_re[k] = sre;
            out_im[k] = sim;
        }
        (out_re, out_im)
    }

    fn linf(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn roundtrip_power_of_two() {
        for &n in &[2usize, 4, 8, 16, 64, 256, 1024, 4096] {
            let mut re: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
            let mut im = vec![0.0; n];
            let original = re.clone();
            fft(&mut re, &mut im, false).unwrap();
            fft(&mut re, &mut im, true).unwrap();
            assert!(linf(&re, &original) < 1e-4, "n={n} failed roundtrip");
        }
    }

    #[test]
    fn bluestein_matches_naive_dft() {
        for &n in &[3usize, 5, 7, 1025, 2047] {
            let re: Vec<f64> = (0..n).map(|i| ((i * 7 + 1) as f64 * 0.123).cos()).collect();
            let im = vec![0.0; n];
            let (expected_re, expected_im) = naive_dft(&re, &im, false);
            let mut got_re = re.clone();
            let mut got_im = im.clone();
            fft(&mut got_re, &mut got_im, false).unwrap();
            assert!(linf(&got_re, &expected_re) < 1e-3, "n={n} re mismatch");
            assert!(linf(&got_im, &expected_im) < 1e-3, "n={n} im mismatch");
        }
    }

    #[test]
    fn bluestein_roundtrip() {
        for &n in &[3usize, 5, 1025] {
            let mut re: Vec<f64> = (0..n).map(|i| (i as f64 * 0.9).sin()).collect();
            let mut im = vec![0.0; n];
            let original = re.clone();
            fft(&mut re, &mut im, false).unwrap();
            fft(&mut re, &mut im, true).unwrap();
            assert!(linf(&re, &original) < 1e-3);
        }
    }

    #[test]
    fn n_equals_one_is_noop() {
        let mut re = vec![42.0];
        let mut im = vec![7.0];
        fft(&mut re, &mut im, false).unwrap();
        assert_eq!(re, vec![42.0]);
        assert_eq!(im, vec![7.0]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut re = vec![0.0; 4];
        let mut im = vec![0.0; 3];
        assert!(fft(&mut re, &mut im, false).is_err());
    }

    #[test]
    fn plans_are_memoized() {
        let a = plan_for(256).unwrap();
        let b = plan_for(256).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
