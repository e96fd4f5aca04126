//! Pure numeric DSP: FFT, STFT/ISTFT, the dense matrix kernel, the mel
//! filter bank and pitch-aware analyzer, and Akima interpolation. No
//! I/O, no async, no knowledge of UTAU request shapes — everything
//! here operates on plain slices and matrices.

pub mod akima;
pub mod error;
pub mod fft;
pub mod matrix;
pub mod melanalyzer;
pub mod melbank;
pub mod stft;

pub use akima::AkimaInterpolator;
pub use error::{DspError, DspResult};
pub use matrix::{ComplexSpectrogram, FloatMatrix};
pub use melanalyzer::{extract_mel, MelAnalyzerConfig};
pub use melbank::mel_filterbank;
pub use stft::{hann_window, istft, reflect_index, stft, stft_with_pad};
