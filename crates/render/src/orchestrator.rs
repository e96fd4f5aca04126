//! Render orchestration: the pipeline a single `render` call walks
//! end to end, from reading the source sample to writing the rendered
//! wave. Cancellation is polled between stages rather than inside any
//! single numeric loop.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use utau_config::Settings;
use utau_core::{AudioIo, CancellationToken, Flags, RenderError, RenderParams, RenderResult};
use utau_dsp::{reflect_index, AkimaInterpolator, FloatMatrix, MelAnalyzerConfig};

use crate::cache::{CachedFeatures, FeatureCache};
use crate::hnsep::apply_hn_sep_flags;
use crate::vocoder::{SeparatorModel, VocoderModel};

pub struct RenderOrchestrator {
    settings: Settings,
    vocoder: Arc<dyn VocoderModel>,
    separator: Arc<dyn SeparatorModel>,
    cache: FeatureCache,
}

impl RenderOrchestrator {
    pub fn new(
        settings: Settings,
        vocoder: Arc<dyn VocoderModel>,
        separator: Arc<dyn SeparatorModel>,
    ) -> RenderOrchestrator {
        let cache_root = settings
            .cache_path
            .clone()
            .unwrap_or_else(|| "cache".to_string());
        RenderOrchestrator {
            settings,
            vocoder,
            separator,
            cache: FeatureCache::new(cache_root),
        }
    }

    pub fn render(
        &self,
        params: &RenderParams,
        audio_io: &dyn AudioIo,
        cancel: &CancellationToken,
    ) -> RenderResult<()> {
        cancel.check()?;

        let flags = params.flags.clamped();
        let sample_rate = self.settings.sample_rate;
        let input_samples = audio_io.read_mono(Path::new(&params.input_path), sample_rate)?;
        if input_samples.is_empty() {
            return Err(RenderError::InvalidArgument("input sample is empty".into()));
        }
        let samples_f64: Vec<f64> = input_samples.iter().map(|&s| s as f64).collect();
        cancel.check()?;

        let mixed_samples = if flags.engages_hnsep() {
            apply_hn_sep_flags(&samples_f64, &flags, &self.separator, sample_rate)?
        } else {
            samples_f64
        };
        cancel.check()?;

        let features = self.load_or_compute_features(&mixed_samples, &flags)?;
        cancel.check()?;

        if params.is_discard_output() {
            debug!("output path is the discard sentinel, stopping after feature extraction");
            return Ok(());
        }

        let cols = features.mel.cols();
        if cols == 0 {
            return Err(RenderError::InvalidArgument("extracted mel has no frames".into()));
        }

        // Step 3: time axes.
        let thop_origin = self.settings.origin_hop_size as f64 / sample_rate as f64;
        let thop = self.settings.hop_size as f64 / sample_rate as f64;
        let mut t_area_origin: Vec<f64> =
            (0..cols).map(|i| i as f64 * thop_origin + thop_origin / 2.0).collect();
        let mut mel = features.mel.clone();

        // Step 4: derived times.
        let vel = 2f64.powf(1.0 - params.velocity / 100.0).max(1e-9);
        let start = params.offset_ms / 1000.0;
        let cutoff_sec = params.cutoff_ms / 1000.0;
        let total_time = t_area_origin[cols - 1] + thop_origin / 2.0;
        let end = if params.cutoff_ms < 0.0 {
            start - cutoff_sec
        } else {
            total_time - cutoff_sec
        };
        let con = start + params.consonant_ms / 1000.0;
        let length_req = params.length_ms / 1000.0;
        let mut stretch_length = end - con;

        // Step 5: loop mode.
        if self.settings.loop_mode || flags.he {
            let left = nearest_index(con, thop_origin, mel.cols());
            let right = (nearest_index(end, thop_origin, mel.cols()) + 1).max(left + 1).min(mel.cols());
            let left = left.min(right - 1);
            let pad_loop_size = (length_req / thop_origin).floor().max(0.0) as usize + 1;
            mel = build_looped_mel(&mel, left, right, pad_loop_size);
            t_area_origin = (0..mel.cols())
                .map(|i| i as f64 * thop_origin + thop_origin / 2.0)
                .collect();
            stretch_length = pad_loop_size as f64 * thop_origin;
        }

        // Step 6: stretch schedule.
        let scaling_ratio = if stretch_length < length_req && stretch_length > 1e-8 {
            length_req / stretch_length
        } else {
            1.0
        };
        let stretched_n_frames =
            ((con * vel + (total_time - con) * scaling_ratio) / thop).floor().max(0.0) as usize + 1;

        // Step 7: trim.
        let fill = self.settings.fill as isize;
        let start_left_mel_frames = ((start * vel + thop / 2.0) / thop).floor() as isize;
        let cut_left = (start_left_mel_frames - fill).max(0) as usize;
        let end_right_mel_frames =
            stretched_n_frames as isize - ((length_req + con * vel + thop / 2.0) / thop).floor() as isize;
        let cut_right = (end_right_mel_frames - fill).max(0) as usize;
        let keep_start = cut_left.min(stretched_n_frames);
        let keep_end = stretched_n_frames.saturating_sub(cut_right).max(keep_start);

        // Step 8: warp kept frame times.
        let last_origin_time = *t_area_origin.last().unwrap();
        let warped_times: Vec<f64> = (keep_start..keep_end)
            .map(|i| {
                let t = i as f64 * thop + thop / 2.0;
                let warped = if t < vel * con {
                    t / vel
                } else {
                    con + (t - vel * con) / scaling_ratio
                };
                warped.clamp(0.0, last_origin_time)
            })
            .collect();

        // Step 9: resample mel per row at warped times.
        let final_mel = resample_mel_rows(&mel, &t_area_origin, &warped_times);
        cancel.check()?;

        // Step 10: pitch curve.
        let start_sec = start * vel - cut_left as f64 * thop;
        let tick_seconds = params.tick_seconds();
        let interp = build_midi_interpolator(
            params.pitch_midi,
            &params.pitch_bend_cents,
            tick_seconds,
            flags.t,
            start_sec,
        )?;
        let local_frame_times: Vec<f64> =
            (0..final_mel.cols()).map(|j| start_sec + j as f64 * thop).collect();
        let midi_curve = interp.eval_many(&local_frame_times);
        let f0_track: Vec<f64> = midi_curve.iter().map(|&m| midi_to_hz(m)).collect();

        // Step 11: synthesize, then trim to [startSec, endSec) samples.
        let synthesized = self.vocoder.synthesize(&final_mel, &f0_track, sample_rate)?;
        cancel.check()?;

        let end_sec = length_req + con * vel - cut_left as f64 * thop;
        let start_sample = (start_sec.max(0.0) * sample_rate as f64).floor() as usize;
        let end_sample = (end_sec.max(0.0) * sample_rate as f64).floor() as usize;
        let final_len = end_sample.saturating_sub(start_sample);
        let mut wave = trim_or_pad(&synthesized, start_sample, final_len);

        // Step 12: post-effects, in documented order.
        crate::post_effects::apply_amplitude_from_pitch(
            &mut wave,
            &midi_curve,
            &local_frame_times,
            start_sec,
            sample_rate,
            flags.a,
        );
        if features.scale > 1e-12 {
            for sample in wave.iter_mut() {
                *sample /= features.scale;
            }
        }
        crate::post_effects::apply_growl(&mut wave, flags.hg, sample_rate);
        if self.settings.wave_norm {
            crate::post_effects::normalize_loudness(&mut wave, flags.p);
        }
        crate::post_effects::apply_peak_limit(&mut wave, self.settings.peak_limit);
        let volume_gain = params.volume_pct / 100.0;
        for sample in wave.iter_mut() {
            *sample *= volume_gain;
        }

        // Step 13: emit.
        let wave_f32: Vec<f32> = wave.iter().map(|&s| s as f32).collect();
        audio_io.write_mono_pcm16(Path::new(&params.output_path), &wave_f32, sample_rate)?;
        info!(output = %params.output_path, samples = wave_f32.len(), "render complete");
        Ok(())
    }

    /// Step 2: either a cache hit, or read-mono-audio's already-mixed
    /// samples run through the mel analyzer, with the result cached
    /// (unless the `G` flag bypasses the cache).
    fn load_or_compute_features(&self, samples: &[f64], flags: &Flags) -> RenderResult<CachedFeatures> {
        let bypass_cache = flags.should_bypass_cache();
        let cache_key = FeatureCache::key_for(samples, flags);
        if !bypass_cache {
            if let Some(cached) = self.cache.load(&cache_key) {
                return Ok(cached);
            }
        }
        let computed = self.compute_features(samples, flags.g as f64 / 100.0)?;
        if !bypass_cache {
            self.cache.store(&cache_key, &computed)?;
        }
        Ok(computed)
    }

    fn compute_features(&self, samples: &[f64], key_shift_semitones: f64) -> RenderResult<CachedFeatures> {
        let peak = samples.iter().map(|s| s.abs()).fold(0.0_f64, f64::max);
        let scale = if peak >= 0.5 { 0.5 / peak } else { 1.0 };
        let scaled: Vec<f64> = samples.iter().map(|&s| s * scale).collect();

        let config = MelAnalyzerConfig {
            sample_rate: self.settings.sample_rate,
            n_fft: self.settings.n_fft,
            win_len: self.settings.win_size,
            hop: self.settings.origin_hop_size,
            num_mels: self.settings.num_mels,
            f_min: self.settings.mel_f_min,
            f_max: self.settings.mel_f_max,
        };
        let mel = utau_dsp::extract_mel(&scaled, &config, key_shift_semitones, 1.0)
            .map_err(|e| RenderError::InvalidArgument(e.to_string()))?;
        Ok(CachedFeatures { mel, scale })
    }
}

/// `440 * 2^((midi-69)/12)`.
fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

/// Nearest mel-frame index whose area time `i*thop_origin + thop_origin/2`
/// is closest to `t`, clamped to `[0, cols-1]`.
fn nearest_index(t: f64, thop_origin: f64, cols: usize) -> usize {
    if cols == 0 {
        return 0;
    }
    let raw = ((t - thop_origin / 2.0) / thop_origin).round();
    raw.clamp(0.0, (cols - 1) as f64) as usize
}

/// Slices `mel`'s columns to `[left, right)`, then reflect-pads that
/// window by `pad_loop_size` additional columns and prepends the
/// untouched prefix `[0, left)`.
fn build_looped_mel(mel: &FloatMatrix, left: usize, right: usize, pad_loop_size: usize) -> FloatMatrix {
    let rows = mel.rows();
    let window_cols = right.saturating_sub(left).max(1);
    let mut out = FloatMatrix::zeros(rows, left + window_cols + pad_loop_size);
    for col in 0..left {
        for row in 0..rows {
            out.set(row, col, mel.get(row, col));
        }
    }
    for col in 0..window_cols {
        for row in 0..rows {
            out.set(row, left + col, mel.get(row, left + col));
        }
    }
    for col in 0..pad_loop_size {
        let src = reflect_index(window_cols as isize + col as isize, window_cols);
        for row in 0..rows {
            out.set(row, left + window_cols + col, mel.get(row, left + src));
        }
    }
    out
}

/// Per-row linear interpolation of `mel` over `xs` (one entry per
/// column) at each of `targets`, producing a `mel.rows() x
/// targets.len()` matrix.
fn resample_mel_rows(mel: &FloatMatrix, xs: &[f64], targets: &[f64]) -> FloatMatrix {
    let rows = mel.rows();
    let mut out = FloatMatrix::zeros(rows, targets.len());
    if xs.is_empty() {
        return out;
    }
    let n = xs.len();
    for (col, &t) in targets.iter().enumerate() {
        let (lo, hi, frac) = if t <= xs[0] {
            (0, 0usize.min(n - 1), 0.0)
        } else if t >= xs[n - 1] {
            (n - 1, n - 1, 0.0)
        } else {
            match xs.binary_search_by(|probe| probe.partial_cmp(&t).unwrap()) {
                Ok(i) => (i, i, 0.0),
                Err(i) => {
                    let lo = i - 1;
                    let frac = (t - xs[lo]) / (xs[i] - xs[lo]).max(1e-12);
                    (lo, i, frac)
                }
            }
        };
        for row in 0..rows {
            let a = mel.get(row, lo) as f64;
            let b = mel.get(row, hi) as f64;
            out.set(row, col, (a + (b - a) * frac) as f32);
        }
    }
    out
}

fn trim_or_pad(samples: &[f64], start: usize, len: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(samples.get(start + i).copied().unwrap_or(0.0));
    }
    out
}

/// Builds the Akima interpolator over the pitch-bend curve's knot
/// times (tick-spaced, anchored at `start_sec`) and knot MIDI values
/// (base note plus bend cents plus the `T` pitch-shift flag).
fn build_midi_interpolator(
    pitch_midi: i32,
    pitch_bend_cents: &[f64],
    tick_seconds: f64,
    t_flag: i32,
    start_sec: f64,
) -> RenderResult<AkimaInterpolator> {
    let base = pitch_midi as f64 + t_flag as f64 / 100.0;
    if pitch_bend_cents.len() < 2 {
        let first_cents = pitch_bend_cents.first().copied().unwrap_or(0.0);
        let xs = vec![start_sec, start_sec + tick_seconds.abs().max(1e-6)];
        let ys = vec![base + first_cents / 100.0, base + first_cents / 100.0];
        return AkimaInterpolator::new(&xs, &ys)
            .map_err(|e| RenderError::InvalidArgument(e.to_string()));
    }
    let xs: Vec<f64> = (0..pitch_bend_cents.len())
        .map(|i| i as f64 * tick_seconds + start_sec)
        .collect();
    let ys: Vec<f64> = pitch_bend_cents.iter().map(|c| base + c / 100.0).collect();
    AkimaInterpolator::new(&xs, &ys).map_err(|e| RenderError::InvalidArgument(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_69_is_440hz() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_index_clamps_to_bounds() {
        assert_eq!(nearest_index(-5.0, 0.01, 10), 0);
        assert_eq!(nearest_index(1000.0, 0.01, 10), 9);
    }

    #[test]
    fn build_looped_mel_grows_column_count() {
        let mel = FloatMatrix::from_rows(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let looped = build_looped_mel(&mel, 1, 3, 5);
        assert_eq!(looped.cols(), 1 + 2 + 5);
    }

    #[test]
    fn resample_mel_rows_interpolates_linearly() {
        let mel = FloatMatrix::from_rows(1, 3, vec![0.0, 10.0, 20.0]).unwrap();
        let xs = vec![0.0, 1.0, 2.0];
        let targets = vec![0.5, 1.5];
        let resampled = resample_mel_rows(&mel, &xs, &targets);
        assert!((resampled.get(0, 0) - 5.0).abs() < 1e-6);
        assert!((resampled.get(0, 1) - 15.0).abs() < 1e-6);
    }

    #[test]
    fn trim_or_pad_zero_fills_beyond_source() {
        let samples = vec![1.0, 2.0, 3.0];
        let out = trim_or_pad(&samples, 1, 4);
        assert_eq!(out, vec![2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn midi_interpolator_holds_flat_with_single_knot() {
        let interp = build_midi_interpolator(69, &[], 0.005, 0, 0.0).unwrap();
        assert!((interp.eval(0.0) - 69.0).abs() < 1e-9);
        assert!((interp.eval(1.0) - 69.0).abs() < 1e-9);
    }

    #[test]
    fn midi_interpolator_follows_bend_curve() {
        let interp = build_midi_interpolator(69, &[0.0, 1200.0], 0.005, 0, 0.0).unwrap();
        assert!((interp.eval(0.005) - 81.0).abs() < 1e-6);
    }
}
