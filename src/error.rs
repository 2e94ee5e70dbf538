//! Error types for the speaker identification pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of the pipeline.
///
/// Construction-time validation failures (mode, sample rate, kernel length)
/// are fatal. Per-sample degeneracies (zero-variance segment, empty segment
/// set) are recoverable: callers skip the offending sample and continue.
#[derive(Debug, Error)]
pub enum Error {
    /// Dataset mode string was not one of `train`, `val`, `test`.
    #[error("invalid dataset mode \"{0}\" (expected train, val or test)")]
    InvalidMode(String),

    /// A segment has zero variance, so unit-variance normalization is
    /// undefined.
    #[error("segment has zero variance, cannot normalize")]
    DegenerateSegment,

    /// Sample rates must be positive.
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// The sinc kernel must be strictly shorter than a segment.
    #[error("filter kernel ({kernel} taps) does not fit in a segment of {segment} samples")]
    KernelLongerThanSegment {
        /// Kernel length in taps.
        kernel: usize,
        /// Segment length in samples.
        segment: usize,
    },

    /// An audio file yielded no usable segments after denoising.
    #[error("no usable segments in {}", .0.display())]
    EmptySegmentSet(PathBuf),

    /// A dataset ended up with no segments at all.
    #[error("dataset contains no segments")]
    EmptyDataset,

    /// File extension or stream contents we cannot decode.
    #[error("unsupported audio file {}: {reason}", .path.display())]
    UnsupportedAudio {
        /// Offending file.
        path: PathBuf,
        /// What made it undecodable.
        reason: String,
    },

    /// Tensor backend error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// WAV decode error.
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    /// FLAC decode error.
    #[error("flac: {0}")]
    Flac(#[from] symphonia::core::errors::Error),

    /// Resampler could not be constructed for the requested rates.
    #[error("resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Resampling failed.
    #[error("resample: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// Label map / config serialization error.
    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
