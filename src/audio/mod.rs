//! Audio processing modules
//!
//! - Audio file loading and decoding (WAV, FLAC)
//! - Sample rate conversion to the model rate
//! - Segmentation into fixed-length normalized windows

mod loader;
mod resampler;
mod segmenter;

pub use loader::{AudioLoader, AudioSample};
pub use resampler::resample;
pub use segmenter::{Segment, Segmenter};
