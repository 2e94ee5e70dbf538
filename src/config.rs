//! Pipeline configuration.
//!
//! Every tunable of the front-end and classifier lives in one explicit
//! struct that is passed into the constructors, serialized next to the
//! trained weights, and validated once up front.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration shared by the segmenter, the sinc filter bank and the
/// classifier stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SincNetConfig {
    /// Sample rate every waveform is converted to before segmentation (Hz).
    pub sample_rate: u32,
    /// Duration of one segment in seconds.
    pub wavetime: f32,
    /// Denoise gate: samples below this fraction of the peak amplitude are
    /// discarded before chunking.
    pub denoise_threshold: f32,
    /// Number of band-pass filters in the sinc bank.
    pub n_filters: usize,
    /// Sinc kernel length in taps (odd).
    pub kernel_len: usize,
    /// Output channels of the two convolution blocks.
    pub cnn_channels: [usize; 2],
    /// Kernel size of the convolution blocks (no padding).
    pub cnn_kernel: usize,
    /// Width of the three dense blocks.
    pub dense_dim: usize,
    /// Dropout rate applied after the pooled sinc features (training only).
    pub dropout: f32,
}

impl Default for SincNetConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            wavetime: 0.2,
            denoise_threshold: 0.01,
            n_filters: 40,
            kernel_len: 251,
            cnn_channels: [60, 60],
            cnn_kernel: 5,
            dense_dim: 2048,
            dropout: 0.2,
        }
    }
}

impl SincNetConfig {
    /// Segment length in samples: `round(wavetime * sample_rate)`.
    pub fn segment_len(&self) -> usize {
        (self.wavetime * self.sample_rate as f32).round() as usize
    }

    /// Nyquist frequency in Hz.
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Time length of the sinc feature map: `segment_len - kernel_len + 1`.
    pub fn feature_map_len(&self) -> Result<usize> {
        let n = self.segment_len();
        if self.kernel_len >= n {
            return Err(Error::KernelLongerThanSegment {
                kernel: self.kernel_len,
                segment: n,
            });
        }
        Ok(n - self.kernel_len + 1)
    }

    /// Input width of the first dense block after pooling, the two
    /// convolution blocks and flattening.
    pub fn flattened_dim(&self) -> Result<usize> {
        let mut t = self.feature_map_len()? / 2;
        // each no-padding convolution shrinks time by kernel - 1
        for _ in &self.cnn_channels {
            t = t.saturating_sub(self.cnn_kernel - 1);
        }
        Ok(self.cnn_channels[1] * t)
    }

    /// Check the invariants the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(self.sample_rate));
        }
        self.feature_map_len()?;
        Ok(())
    }

    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
