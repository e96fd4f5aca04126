//! Render orchestration: the feature cache, the harmonic/noise
//! separator bridge, the post-effects chain, the opaque vocoder
//! interface, and the pipeline that ties them together.

pub mod cache;
pub mod hnsep;
pub mod orchestrator;
pub mod post_effects;
pub mod vocoder;

pub use cache::{CachedFeatures, FeatureCache};
pub use orchestrator::RenderOrchestrator;
pub use vocoder::{FallbackSeparator, FallbackVocoder, SeparatorModel, VocoderModel};

#[cfg(feature = "onnx")]
pub use vocoder::OrtVocoder;
