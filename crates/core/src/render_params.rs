//! Render request parameters.

use crate::flags::Flags;

/// Everything a single `render` call needs: the source/destination
/// paths, the target pitch and timing, and the pitch-bend curve.
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub input_path: String,
    pub output_path: String,
    pub pitch_midi: i32,
    pub velocity: f64,
    pub flags: Flags,
    pub offset_ms: f64,
    pub length_ms: f64,
    pub consonant_ms: f64,
    pub cutoff_ms: f64,
    pub volume_pct: f64,
    pub modulation: f64,
    pub tempo_bpm: f64,
    pub pitch_bend_cents: Vec<f64>,
}

impl RenderParams {
    /// Tick spacing in seconds: `60 / (tempo * 96)`.
    pub fn tick_seconds(&self) -> f64 {
        60.0 / (self.tempo_bpm * 96.0)
    }

    /// True when the output path is the UTAU "discard" sentinel:
    /// case-insensitive `"nul"`.
    pub fn is_discard_output(&self) -> bool {
        self.output_path.eq_ignore_ascii_case("nul")
    }
}
