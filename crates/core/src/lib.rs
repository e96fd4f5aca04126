//! Shared data model for the UTAU-compatible resampler: flags, render
//! parameters, errors, cancellation, and WAV I/O.

pub mod audio_io;
pub mod cancel;
pub mod error;
pub mod flags;
pub mod render_params;

pub use audio_io::{AudioIo, HoundAudioIo};
pub use cancel::CancellationToken;
pub use error::{RenderError, RenderResult};
pub use flags::Flags;
pub use render_params::RenderParams;
