//! Post-render effects chain: amplitude-from-pitch, growl, RMS
//! loudness normalization, and peak limiting. Each stage mutates the
//! waveform in place and is a no-op at its flag's neutral value, so the
//! orchestrator can always run the whole chain unconditionally.

const GROWL_HIGHPASS_HZ: f64 = 400.0;
const GROWL_LFO_HZ: f64 = 80.0;
const TARGET_RMS: f64 = 0.15848932;
const POST_BLEND_PEAK_CEILING: f64 = 0.8912509;

/// Linear interpolation of `ys` over `xs` at `x`, clamped to the first
/// or last value outside `[xs[0], xs[last]]`. `xs` must be sorted and
/// non-empty.
fn linear_interp(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    if n == 1 {
        return ys[0];
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let idx = match xs.binary_search_by(|probe| probe.partial_cmp(&x).unwrap()) {
        Ok(i) => return ys[i],
        Err(i) => i - 1,
    };
    let (x0, x1) = (xs[idx], xs[idx + 1]);
    let (y0, y1) = (ys[idx], ys[idx + 1]);
    let frac = (x - x0) / (x1 - x0).max(1e-12);
    y0 + (y1 - y0) * frac
}

/// Modulates amplitude by the rate of change of the MIDI pitch curve:
/// `gain = 5^(1e-4 * clamp(depth_a, -100, 100) * d(midi)/dt)`, sampled
/// per mel frame then linearly interpolated onto audio samples. Sharp
/// pitch swings get louder (or quieter, for negative `depth_a`) than
/// held notes.
///
/// `midi_curve`/`frame_times` are parallel per-frame arrays; `wave[i]`
/// corresponds to time `wave_start_sec + i / sample_rate`.
pub fn apply_amplitude_from_pitch(
    wave: &mut [f64],
    midi_curve: &[f64],
    frame_times: &[f64],
    wave_start_sec: f64,
    sample_rate: u32,
    depth_a: i32,
) {
    if depth_a == 0 || midi_curve.len() != frame_times.len() || frame_times.len() < 2 {
        return;
    }
    let clamped_a = depth_a.clamp(-100, 100) as f64;
    let n = frame_times.len();
    let mut gains = Vec::with_capacity(n);
    for i in 0..n {
        let (lo, hi) = if i == 0 {
            (0, 1)
        } else if i == n - 1 {
            (n - 2, n - 1)
        } else {
            (i - 1, i + 1)
        };
        let dt = frame_times[hi] - frame_times[lo];
        let derivative = if dt.abs() > 1e-12 {
            (midi_curve[hi] - midi_curve[lo]) / dt
        } else {
            0.0
        };
        gains.push(5f64.powf(1e-4 * clamped_a * derivative));
    }
    for (i, sample) in wave.iter_mut().enumerate() {
        let t = wave_start_sec + i as f64 / sample_rate as f64;
        *sample *= linear_interp(frame_times, &gains, t);
    }
}

/// A 400Hz one-pole highpass mixed back against an 80Hz square LFO:
/// `band = highpassed * (1 + 0.15*(HG/100)*lfo)`,
/// `output = (input - highpassed) + band`.
pub fn apply_growl(wave: &mut [f64], strength_hg: i32, sample_rate: u32) {
    if strength_hg == 0 || wave.is_empty() {
        return;
    }
    let depth = strength_hg as f64 / 100.0;
    let dt = 1.0 / sample_rate as f64;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * GROWL_HIGHPASS_HZ);
    let alpha = rc / (rc + dt);

    let mut prev_input = wave[0];
    let mut prev_highpassed = 0.0f64;
    for (i, sample) in wave.iter_mut().enumerate() {
        let input = *sample;
        let highpassed = alpha * (prev_highpassed + input - prev_input);
        let t = i as f64 * dt;
        let lfo = (2.0 * std::f64::consts::PI * GROWL_LFO_HZ * t).sin().signum();
        let band = highpassed * (1.0 + 0.15 * depth * lfo);
        *sample = (input - highpassed) + band;
        prev_input = input;
        prev_highpassed = highpassed;
    }
}

/// Blends `wave` toward a fixed reference RMS loudness ([`TARGET_RMS`],
/// about -16dB) by `blend_p` percent, then clamps the post-blend peak
/// to [`POST_BLEND_PEAK_CEILING`] (about -1dB) if it was exceeded. This
/// ceiling is separate from the final configured peak limiter.
pub fn normalize_loudness(wave: &mut [f64], blend_p: i32) {
    if blend_p == 0 || wave.is_empty() {
        return;
    }
    let blend = (blend_p as f64 / 100.0).clamp(0.0, 1.0);
    let rms = (wave.iter().map(|s| s * s).sum::<f64>() / wave.len() as f64).sqrt();
    if rms < 1e-9 {
        return;
    }
    let target_gain = TARGET_RMS / rms;
    let gain = 1.0 + blend * (target_gain - 1.0);
    for sample in wave.iter_mut() {
        *sample *= gain;
    }
    let peak = wave.iter().map(|s| s.abs()).fold(0.0_f64, f64::max);
    if peak > POST_BLEND_PEAK_CEILING {
        let ceiling_ratio = POST_BLEND_PEAK_CEILING / peak;
        for sample in wave.iter_mut() {
            *sample *= ceiling_ratio;
        }
    }
}

/// Hard peak limiter: if `peak > limit`, scales the whole wave down so
/// the peak lands exactly on `limit`.
pub fn apply_peak_limit(wave: &mut [f64], limit: f32) {
    let limit = limit as f64;
    if limit <= 0.0 {
        return;
    }
    let peak = wave.iter().map(|s| s.abs()).fold(0.0_f64, f64::max);
    if peak <= limit || peak <= 1e-8 {
        return;
    }
    let ratio = limit / peak;
    for sample in wave.iter_mut() {
        *sample *= ratio;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_from_pitch_is_noop_at_zero_depth() {
        let mut wave = vec![1.0, 1.0, 1.0];
        let midi = vec![69.0, 70.0, 69.0];
        let times = vec![0.0, 0.01, 0.02];
        let original = wave.clone();
        apply_amplitude_from_pitch(&mut wave, &midi, &times, 0.0, 44100, 0);
        assert_eq!(wave, original);
    }

    #[test]
    fn amplitude_from_pitch_boosts_rising_pitch_for_positive_depth() {
        let midi = vec![69.0, 70.0, 71.0];
        let times = vec![0.0, 0.01, 0.02];
        let mut rising = vec![1.0, 1.0, 1.0];
        apply_amplitude_from_pitch(&mut rising, &midi, &times, 0.0, 44100, 50);
        // Constant positive derivative throughout -> gain > 1 everywhere.
        assert!(rising.iter().all(|&s| s > 1.0));
    }

    #[test]
    fn growl_is_noop_at_zero_strength() {
        let mut wave = vec![1.0; 100];
        let original = wave.clone();
        apply_growl(&mut wave, 0, 44100);
        assert_eq!(wave, original);
    }

    #[test]
    fn growl_introduces_sub_harmonic_amplitude_modulation() {
        let n = 44100;
        let mut wave: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / 44100.0).sin())
            .collect();
        let original = wave.clone();
        apply_growl(&mut wave, 80, 44100);
        assert_ne!(wave, original);
    }

    #[test]
    fn loudness_normalize_moves_rms_toward_target() {
        let mut wave = vec![0.5; 1000];
        normalize_loudness(&mut wave, 100);
        let rms = (wave.iter().map(|s| s * s).sum::<f64>() / wave.len() as f64).sqrt();
        assert!((rms - TARGET_RMS).abs() < 1e-6);
    }

    #[test]
    fn loudness_normalize_clamps_post_blend_peak() {
        // A single huge outlier sample keeps RMS low (so the blend gain
        // is large) while the peak itself would blow past the ceiling.
        let mut wave = vec![0.01; 999];
        wave.push(50.0);
        normalize_loudness(&mut wave, 100);
        let peak = wave.iter().map(|s| s.abs()).fold(0.0, f64::max);
        assert!(peak <= POST_BLEND_PEAK_CEILING + 1e-6);
    }

    #[test]
    fn peak_limit_caps_maximum_amplitude() {
        let mut wave = vec![2.0, -2.0, 0.5];
        apply_peak_limit(&mut wave, 0.9);
        let peak = wave.iter().map(|s| s.abs()).fold(0.0, f64::max);
        assert!((peak - 0.9).abs() < 1e-9);
    }

    #[test]
    fn peak_limit_is_noop_below_threshold() {
        let mut wave = vec![0.1, -0.2, 0.3];
        let original = wave.clone();
        apply_peak_limit(&mut wave, 0.9);
        assert_eq!(wave, original);
    }
}
