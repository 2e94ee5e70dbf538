//! Full speaker-identification network.
//!
//! Wires the sinc convolution front-end to the classifier stack and owns
//! checkpointing: weights as safetensors via the `VarMap`, configuration
//! and label map as JSON beside them.

use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{ops, VarBuilder, VarMap};

use crate::config::SincNetConfig;
use crate::dataset::LabelEncoder;
use crate::error::Result;
use crate::model::classifier::ClassifierStack;
use crate::model::sinc::{SincConvolution, SincFilterBank};

/// Weights file inside a checkpoint directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// Configuration file inside a checkpoint directory.
pub const CONFIG_FILE: &str = "config.json";
/// Label map file inside a checkpoint directory.
pub const LABELS_FILE: &str = "labels.json";

/// Sinc front-end plus classifier stack.
pub struct SincNet {
    sinc: SincConvolution,
    classifier: ClassifierStack,
    sample_rate: u32,
    n_classes: usize,
}

impl SincNet {
    /// Build a freshly initialized network. All trainable state, including
    /// the sinc cutoffs, is registered in `varmap`.
    pub fn new(
        config: &SincNetConfig,
        n_classes: usize,
        varmap: &VarMap,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;
        let bank = SincFilterBank::new(config, varmap, device)?;
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let classifier = ClassifierStack::new(config, n_classes, vb.pp("classifier"))?;
        Ok(Self {
            sinc: SincConvolution::new(bank),
            classifier,
            sample_rate: config.sample_rate,
            n_classes,
        })
    }

    /// Segments `(B, 1, N)` to logits `(B, n_classes)`.
    pub fn forward_t(&self, segments: &Tensor, train: bool) -> Result<Tensor> {
        let features = self.sinc.forward(segments, self.sample_rate)?;
        self.classifier.forward_t(&features, train)
    }

    /// Eval-mode softmax class probabilities, `(B, n_classes)`.
    pub fn probabilities(&self, segments: &Tensor) -> Result<Tensor> {
        let logits = self.forward_t(segments, false)?;
        ops::softmax(&logits, D::Minus1).map_err(Into::into)
    }

    /// The learned filter bank.
    pub fn filter_bank(&self) -> &SincFilterBank {
        self.sinc.bank()
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// Write weights, configuration and label map into `dir`.
pub fn save_checkpoint(
    dir: &Path,
    varmap: &VarMap,
    config: &SincNetConfig,
    labels: &LabelEncoder,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    varmap.save(dir.join(WEIGHTS_FILE))?;
    config.save(dir.join(CONFIG_FILE))?;
    labels.save(dir.join(LABELS_FILE))?;
    Ok(())
}

/// Restore a checkpoint written by [`save_checkpoint`].
pub fn load_checkpoint(
    dir: &Path,
    device: &Device,
) -> Result<(SincNet, SincNetConfig, LabelEncoder)> {
    let config = SincNetConfig::load(dir.join(CONFIG_FILE))?;
    let labels = LabelEncoder::load(dir.join(LABELS_FILE))?;
    let mut varmap = VarMap::new();
    let model = SincNet::new(&config, labels.len(), &varmap, device)?;
    varmap.load(dir.join(WEIGHTS_FILE))?;
    Ok((model, config, labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> SincNetConfig {
        SincNetConfig {
            wavetime: 0.05,
            n_filters: 8,
            kernel_len: 51,
            cnn_channels: [12, 12],
            dense_dim: 32,
            ..Default::default()
        }
    }

    #[test]
    fn test_forward_shapes() {
        let config = tiny_config();
        let varmap = VarMap::new();
        let model = SincNet::new(&config, 6, &varmap, &Device::Cpu).unwrap();

        let n = config.segment_len();
        let segments = Tensor::randn(0f32, 1.0, (3, 1, n), &Device::Cpu).unwrap();
        let logits = model.forward_t(&segments, false).unwrap();
        assert_eq!(logits.dims(), &[3, 6]);
    }

    #[test]
    fn test_probabilities_normalized() {
        let config = tiny_config();
        let varmap = VarMap::new();
        let model = SincNet::new(&config, 4, &varmap, &Device::Cpu).unwrap();

        let n = config.segment_len();
        let segments = Tensor::randn(0f32, 1.0, (2, 1, n), &Device::Cpu).unwrap();
        let probs: Vec<Vec<f32>> = model.probabilities(&segments).unwrap().to_vec2().unwrap();
        for row in probs {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "probabilities sum to {sum}");
            assert!(row.iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let config = tiny_config();
        let varmap = VarMap::new();
        let model = SincNet::new(&config, 3, &varmap, &Device::Cpu).unwrap();
        let labels = LabelEncoder::from_labels(["spk_a", "spk_b", "spk_c"]);

        let dir = std::env::temp_dir().join("sincnet_checkpoint_test");
        save_checkpoint(&dir, &varmap, &config, &labels).unwrap();
        let (restored, loaded_config, loaded_labels) =
            load_checkpoint(&dir, &Device::Cpu).unwrap();

        assert_eq!(loaded_config, config);
        assert_eq!(loaded_labels.labels(), labels.labels());

        // identical weights must give identical outputs
        let n = config.segment_len();
        let segments = Tensor::randn(0f32, 1.0, (2, 1, n), &Device::Cpu).unwrap();
        let a: Vec<Vec<f32>> = model.forward_t(&segments, false).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = restored.forward_t(&segments, false).unwrap().to_vec2().unwrap();
        for (ra, rb) in a.iter().zip(&b) {
            for (va, vb) in ra.iter().zip(rb) {
                assert!((va - vb).abs() < 1e-5);
            }
        }
    }
}
