//! Speaker identification from audio files.
//!
//! Orchestrates the full inference path: decode, resample to the model
//! rate, segment, run the network, and average the per-segment softmax
//! probabilities into one ranking per file.

use std::path::Path;

use candle_core::Device;

use crate::audio::{AudioLoader, Segmenter};
use crate::config::SincNetConfig;
use crate::dataset::{batch_tensor, LabelEncoder};
use crate::error::{Error, Result};
use crate::model::{load_checkpoint, SincNet};

/// One ranked speaker hypothesis.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Speaker name from the label map.
    pub label: String,
    /// Mean softmax probability across the file's segments.
    pub probability: f32,
}

/// Loaded model plus everything needed to go from a file path to a
/// speaker ranking.
pub struct SpeakerIdentifier {
    model: SincNet,
    config: SincNetConfig,
    labels: LabelEncoder,
    segmenter: Segmenter,
    device: Device,
}

impl SpeakerIdentifier {
    /// Load a trained checkpoint directory.
    pub fn load<P: AsRef<Path>>(dir: P, device: &Device) -> Result<Self> {
        let (model, config, labels) = load_checkpoint(dir.as_ref(), device)?;
        let segmenter = Segmenter::new(&config);
        Ok(Self {
            model,
            config,
            labels,
            segmenter,
            device: device.clone(),
        })
    }

    /// Rank all known speakers for one audio file, most likely first.
    ///
    /// Fails with [`Error::EmptySegmentSet`] when the file is too short or
    /// too quiet to yield a single segment; callers decide whether that
    /// skips the file or aborts.
    pub fn identify<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Prediction>> {
        let path = path.as_ref();
        let audio = AudioLoader::load(path, self.config.sample_rate)?;
        let segments = self.segmenter.segment(&audio)?;
        if segments.is_empty() {
            return Err(Error::EmptySegmentSet(path.to_path_buf()));
        }

        let batch = batch_tensor(segments.iter(), &self.device)?;
        let probabilities = self.model.probabilities(&batch)?;
        let mean: Vec<f32> = probabilities.mean(0)?.to_vec1()?;

        let mut ranking: Vec<Prediction> = mean
            .iter()
            .enumerate()
            .map(|(id, &probability)| Prediction {
                label: self
                    .labels
                    .decode(id as u32)
                    .unwrap_or("<unknown>")
                    .to_string(),
                probability,
            })
            .collect();
        ranking.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Ok(ranking)
    }

    /// Most likely speaker for one audio file.
    pub fn top<P: AsRef<Path>>(&self, path: P) -> Result<Prediction> {
        let ranking = self.identify(path)?;
        ranking.into_iter().next().ok_or(Error::EmptyDataset)
    }

    /// The model configuration the checkpoint was trained with.
    pub fn config(&self) -> &SincNetConfig {
        &self.config
    }

    /// The speaker label map.
    pub fn labels(&self) -> &LabelEncoder {
        &self.labels
    }

    /// The loaded network.
    pub fn model(&self) -> &SincNet {
        &self.model
    }
}
