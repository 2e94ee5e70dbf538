//! # SincNet
//!
//! Speaker identification directly from raw audio waveforms. A bank of
//! band-pass filters with learnable cutoff frequencies replaces the usual
//! fixed spectrogram front-end; their impulse responses are synthesized on
//! the fly, windowed, and convolved against fixed-length waveform
//! segments before a stacked convolution / dense classifier assigns
//! speaker probabilities.
//!
//! ## Architecture
//!
//! ```text
//! Audio file -> mono f32 -> Segmenter [B, 1, 3200]
//!   -> SincConvolution [B, 40, 2950] -> ClassifierStack -> logits
//!   -> softmax -> speaker probabilities
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sincnet::SpeakerIdentifier;
//!
//! let identifier = SpeakerIdentifier::load("model", &candle_core::Device::Cpu)?;
//! let best = identifier.top("utterance.flac")?;
//! println!("{} ({:.1}%)", best.label, best.probability * 100.0);
//! ```

// Allow dead code for infrastructure that may be used in the future
#![allow(dead_code)]
// Require docs for public items, but not struct fields (too verbose)
#![warn(missing_docs)]
#![allow(rustdoc::missing_crate_level_docs)]

pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod model;
pub mod train;

// Re-exports for convenience
pub use config::SincNetConfig;
pub use error::{Error, Result};
pub use inference::{Prediction, SpeakerIdentifier};
pub use model::SincNet;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate the pipeline operates at (16 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
