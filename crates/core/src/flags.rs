//! The UTAU flag record and its cache signature.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn clamp_i32(value: i32, lo: i32, hi: i32) -> i32 {
    value.clamp(lo, hi)
}

/// Integer knobs controlling formant shift, breath/voice mix, growl,
/// loudness blend, pitch shift, tension, amplitude-from-pitch depth, and
/// the two boolean behavior switches. All fields are clamped on
/// construction via [`Flags::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flags {
    /// Formant/gender shift, cents / 100 = semitones. Range -600..600.
    pub g: i32,
    /// Breath gain %, range 0..500.
    #[serde(rename = "Hb")]
    pub hb: i32,
    /// Voice gain %, range 0..150.
    #[serde(rename = "Hv")]
    pub hv: i32,
    /// Growl strength, range 0..100.
    #[serde(rename = "HG")]
    pub hg: i32,
    /// Loudness-normalize blend, range 0..100.
    #[serde(rename = "P")]
    pub p: i32,
    /// Pitch shift in cents, range -1200..1200.
    pub t: i32,
    /// Tension, range -100..100.
    #[serde(rename = "Ht")]
    pub ht: i32,
    /// Amplitude-from-pitch depth, range -100..100.
    #[serde(rename = "A")]
    pub a: i32,
    /// Force regeneration, bypass the feature cache.
    #[serde(rename = "G")]
    pub g_force_regen: bool,
    /// Mel loop mode.
    #[serde(rename = "He")]
    pub he: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            g: 0,
            hb: 100,
            hv: 100,
            hg: 0,
            p: 100,
            t: 0,
            ht: 0,
            a: 0,
            g_force_regen: false,
            he: false,
        }
    }
}

impl Flags {
    /// Clamps every field to its declared range.
    pub fn clamped(&self) -> Flags {
        Flags {
            g: clamp_i32(self.g, -600, 600),
            hb: clamp_i32(self.hb, 0, 500),
            hv: clamp_i32(self.hv, 0, 150),
            hg: clamp_i32(self.hg, 0, 100),
            p: clamp_i32(self.p, 0, 100),
            t: clamp_i32(self.t, -1200, 1200),
            ht: clamp_i32(self.ht, -100, 100),
            a: clamp_i32(self.a, -100, 100),
            g_force_regen: self.g_force_regen,
            he: self.he,
        }
    }

    /// `G` bypasses the feature cache entirely.
    pub fn should_bypass_cache(&self) -> bool {
        self.g_force_regen
    }

    /// First six hex characters of `SHA-256("g=<g>;Hb=<Hb>;Hv=<Hv>;Ht=<Ht>")`.
    /// Only the flags that affect cached mel/separator features participate.
    pub fn signature(&self) -> String {
        let clamped = self.clamped();
        let message = format!(
            "g={};Hb={};Hv={};Ht={}",
            clamped.g, clamped.hb, clamped.hv, clamped.ht
        );
        let digest = Sha256::digest(message.as_bytes());
        let hex = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        hex[..6].to_string()
    }

    /// True when the separator/mix stage must actually run: a nonzero
    /// tension or a breath/voice gain mismatch.
    pub fn engages_hnsep(&self) -> bool {
        let c = self.clamped();
        c.ht != 0 || c.hb != c.hv
    }
}
