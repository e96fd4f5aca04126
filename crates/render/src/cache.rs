//! Content-addressed feature cache.
//!
//! Mel spectrograms are expensive to recompute, so each render keys
//! them by a hash of the source audio plus the subset of flags that
//! change the cached numbers (see [`Flags::signature`]). Writes go to
//! a temp file in the same directory and are renamed into place, so a
//! reader never observes a partially written entry.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use utau_core::{Flags, RenderError, RenderResult};
use utau_dsp::FloatMatrix;

const MAGIC: &[u8; 4] = b"UTAC";
const FORMAT_VERSION: u32 = 2;

/// The mel spectrogram extracted from a source sample, plus the
/// normalization scale applied to the audio before extraction (see
/// [`crate::orchestrator::RenderOrchestrator::render`] step 2). The
/// scale must be undone on the synthesized waveform during rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFeatures {
    pub mel: FloatMatrix,
    pub scale: f64,
}

pub struct FeatureCache {
    root: PathBuf,
}

impl FeatureCache {
    pub fn new(root: impl Into<PathBuf>) -> FeatureCache {
        FeatureCache { root: root.into() }
    }

    /// Hashes the raw audio samples and the flag signature into a
    /// filesystem-safe cache key.
    pub fn key_for(samples: &[f64], flags: &Flags) -> String {
        let mut hasher = Sha256::new();
        for s in samples {
            hasher.update(s.to_le_bytes());
        }
        let audio_hash = hasher.finalize();
        let audio_hex = audio_hash.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        format!("{}-{}", &audio_hex[..16], flags.signature())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.melcache"))
    }

    pub fn load(&self, key: &str) -> Option<CachedFeatures> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => match decode(&bytes) {
                Ok(features) => {
                    debug!(key, "feature cache hit");
                    Some(features)
                }
                Err(err) => {
                    warn!(key, %err, "discarding corrupt cache entry");
                    None
                }
            },
            Err(_) => None,
        }
    }

    pub fn store(&self, key: &str, features: &CachedFeatures) -> RenderResult<()> {
        fs::create_dir_all(&self.root)?;
        let bytes = encode(features);
        let final_path = self.path_for(key);
        let tmp_path = self.root.join(format!(".{key}.{}.tmp", std::process::id()));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

fn encode(features: &CachedFeatures) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(features.mel.rows() as u32).to_le_bytes());
    out.extend_from_slice(&(features.mel.cols() as u32).to_le_bytes());
    for v in features.mel.as_slice() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&features.scale.to_le_bytes());
    out
}

fn decode(bytes: &[u8]) -> RenderResult<CachedFeatures> {
    let mut cursor = bytes;
    let mut magic = [0u8; 4];
    read_exact(&mut cursor, &mut magic)?;
    if &magic != MAGIC {
        return Err(RenderError::Internal("bad cache file magic".into()));
    }
    let version = read_u32(&mut cursor)?;
    if version != FORMAT_VERSION {
        return Err(RenderError::Internal(format!(
            "unsupported cache format version {version}"
        )));
    }
    let rows = read_u32(&mut cursor)? as usize;
    let cols = read_u32(&mut cursor)? as usize;
    let mut mel_data = vec![0f32; rows * cols];
    for slot in mel_data.iter_mut() {
        *slot = read_f32(&mut cursor)?;
    }
    let mel = FloatMatrix::from_rows(rows, cols, mel_data)
        .map_err(|e| RenderError::Internal(e.to_string()))?;
    let scale = read_f64(&mut cursor)?;
    Ok(CachedFeatures { mel, scale })
}

fn read_exact(cursor: &mut &[u8], buf: &mut [u8]) -> RenderResult<()> {
    cursor
        .read_exact(buf)
        .map_err(|_| RenderError::Internal("truncated cache file".into()))
}

fn read_u32(cursor: &mut &[u8]) -> RenderResult<u32> {
    let mut buf = [0u8; 4];
    read_exact(cursor, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32(cursor: &mut &[u8]) -> RenderResult<f32> {
    let mut buf = [0u8; 4];
    read_exact(cursor, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_f64(cursor: &mut &[u8]) -> RenderResult<f64> {
    let mut buf = [0u8; 8];
    read_exact(cursor, &mut buf)?;
    Ok(f64::from_le_bytes(buf))
}
