//! Parses the space-delimited resampler argument line into
//! [`RenderParams`]. The UTAU host always passes input/output/pitch/
//! velocity first, but the flags token and trailing timing/tempo
//! tokens are all individually optional, so positions after flags
//! shift depending on what's actually present.

use utau_core::{Flags, RenderParams};

use crate::pitchbend::decode_pitch_bend;

pub fn parse_args(raw: &[String]) -> Result<RenderParams, String> {
    if raw.len() < 5 {
        return Err(format!(
            "expected at least 5 arguments (input output pitch velocity length_ms), got {}",
            raw.len()
        ));
    }

    let input_path = raw[0].clone();
    let output_path = raw[1].clone();
    let pitch_midi = note_to_midi(&raw[2])?;
    let velocity: f64 = raw[3]
        .parse()
        .map_err(|_| format!("invalid velocity: {}", raw[3]))?;

    let mut idx = 4;
    let flags = if raw.get(idx).map(|s| looks_like_flags(s)).unwrap_or(false) {
        let f = parse_flags(&raw[idx]);
        idx += 1;
        f
    } else {
        Flags::default()
    };

    let offset_ms = take_f64(raw, &mut idx, 0.0);
    let length_ms = take_f64(raw, &mut idx, 0.0);
    if length_ms <= 0.0 {
        return Err("length_ms must be positive".to_string());
    }
    let consonant_ms = take_f64(raw, &mut idx, 0.0);
    let cutoff_ms = take_f64(raw, &mut idx, 0.0);
    let volume_pct = take_f64(raw, &mut idx, 100.0);
    let modulation = take_f64(raw, &mut idx, 0.0);
    let tempo_bpm = raw.get(idx).map(|s| parse_tempo(s)).unwrap_or(120.0);
    idx += 1;
    let pitch_bend_cents = raw
        .get(idx)
        .map(|s| decode_pitch_bend(s))
        .unwrap_or_default();

    Ok(RenderParams {
        input_path,
        output_path,
        pitch_midi,
        velocity,
        flags,
        offset_ms,
        length_ms,
        consonant_ms,
        cutoff_ms,
        volume_pct,
        modulation,
        tempo_bpm,
        pitch_bend_cents,
    })
}

fn take_f64(raw: &[String], idx: &mut usize, default: f64) -> f64 {
    let value = raw
        .get(*idx)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(default);
    *idx += 1;
    value
}

/// A flags token starts with a letter; every numeric positional token
/// (offset, length, ...) starts with a digit, `-`, or `.`. That's
/// enough to tell a present-but-empty flags slot from a shifted one.
fn looks_like_flags(s: &str) -> bool {
    s.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
}

fn parse_tempo(s: &str) -> f64 {
    s.trim_start_matches('!').parse().unwrap_or(120.0)
}

/// Accepts either a bare MIDI number or a note name like `C4`, `A#3`,
/// `Db5`.
fn note_to_midi(s: &str) -> Result<i32, String> {
    if let Ok(n) = s.parse::<i32>() {
        return Ok(n);
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return Err("empty note name".to_string());
    }
    let base = match chars[0].to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        other => return Err(format!("invalid note letter: {other}")),
    };
    let mut i = 1;
    let mut accidental = 0i32;
    while i < chars.len() && (chars[i] == '#' || chars[i] == 'b') {
        accidental += if chars[i] == '#' { 1 } else { -1 };
        i += 1;
    }
    let octave_str: String = chars[i..].iter().collect();
    let octave: i32 = octave_str
        .parse()
        .map_err(|_| format!("invalid octave in note name: {s}"))?;
    Ok((octave + 1) * 12 + base + accidental)
}

fn parse_flags(s: &str) -> Flags {
    const KEYS: [&str; 9] = ["Hb", "Hv", "Hg", "Ht", "He", "g", "t", "P", "A"];
    let mut flags = Flags::default();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let remaining: String = chars[i..].iter().collect();
        let matched = KEYS.iter().find(|k| remaining.starts_with(*k));
        let Some(key) = matched else {
            i += 1;
            continue;
        };
        i += key.len();
        if *key == "He" {
            flags.he = true;
            continue;
        }
        let start = i;
        if i < chars.len() && chars[i] == '-' {
            i += 1;
        }
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let number: i32 = chars[start..i].iter().collect::<String>().parse().unwrap_or(0);
        match *key {
            "g" => flags.g = number,
            "Hb" => flags.hb = number,
            "Hv" => flags.hv = number,
            "Hg" => flags.hg = number,
            "Ht" => flags.ht = number,
            "t" => flags.t = number,
            "P" => flags.p = number,
            "A" => flags.a = number,
            _ => {}
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_argument_line() {
        let raw: Vec<String> = vec![
            "in.wav", "out.wav", "C4", "100", "g5Hb80Hv120", "0", "500", "100", "0", "100", "0",
            "120", "AA#2",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let params = parse_args(&raw).unwrap();
        assert_eq!(params.pitch_midi, 60);
        assert_eq!(params.velocity, 100.0);
        assert_eq!(params.flags.g, 5);
        assert_eq!(params.flags.hb, 80);
        assert_eq!(params.flags.hv, 120);
        assert_eq!(params.length_ms, 500.0);
        assert_eq!(params.tempo_bpm, 120.0);
        assert_eq!(params.pitch_bend_cents.len(), 4);
    }

    #[test]
    fn recovers_when_flags_token_is_missing() {
        // No flags token: the 5th position is numeric (offset), so it
        // should be treated as offset_ms, not misparsed as flags.
        let raw: Vec<String> = vec!["in.wav", "out.wav", "A4", "100", "0", "500"]
            .into_iter()
            .map(String::from)
            .collect();
        let params = parse_args(&raw).unwrap();
        assert_eq!(params.flags, Flags::default());
        assert_eq!(params.offset_ms, 0.0);
        assert_eq!(params.length_ms, 500.0);
    }

    #[test]
    fn note_names_resolve_to_midi() {
        assert_eq!(note_to_midi("A4").unwrap(), 69);
        assert_eq!(note_to_midi("C4").unwrap(), 60);
        assert_eq!(note_to_midi("C#4").unwrap(), 61);
        assert_eq!(note_to_midi("Db4").unwrap(), 61);
        assert_eq!(note_to_midi("69").unwrap(), 69);
    }

    #[test]
    fn tempo_strips_bang_prefix() {
        assert_eq!(parse_tempo("!140"), 140.0);
        assert_eq!(parse_tempo("140"), 140.0);
    }

    #[test]
    fn rejects_nonpositive_length() {
        let raw: Vec<String> = vec!["in.wav", "out.wav", "C4", "100", "0"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(parse_args(&raw).is_err());
    }

    #[test]
    fn rejects_too_few_arguments() {
        let raw: Vec<String> = vec!["in.wav", "out.wav"].into_iter().map(String::from).collect();
        assert!(parse_args(&raw).is_err());
    }
}
