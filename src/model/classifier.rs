//! Classifier stages consuming the sinc feature map.
//!
//! Fixed pipeline: time max-pool (window 2), ReLU, dropout, two
//! convolution blocks (kernel 5, no padding), then three dense blocks with
//! per-batch normalization and a final projection to class logits. All
//! weights here use Xavier-uniform initialization with constant 0.01
//! biases; only the sinc layer is initialized differently.

use candle_core::Tensor;
use candle_nn::{
    batch_norm, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, Dropout, Init, Linear, Module,
    ModuleT, VarBuilder,
};

use crate::config::SincNetConfig;
use crate::error::Result;

fn xavier_linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let bound = (6.0 / (in_dim + out_dim) as f64).sqrt();
    let weight = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    let bias = vb.get_with_hints((out_dim,), "bias", Init::Const(0.01))?;
    Ok(Linear::new(weight, Some(bias)))
}

fn xavier_conv1d(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    vb: VarBuilder,
) -> Result<Conv1d> {
    let fan_in = in_channels * kernel;
    let fan_out = out_channels * kernel;
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    let weight = vb.get_with_hints(
        (out_channels, in_channels, kernel),
        "weight",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    let bias = vb.get_with_hints((out_channels,), "bias", Init::Const(0.01))?;
    Ok(Conv1d::new(weight, Some(bias), Conv1dConfig::default()))
}

/// Linear projection, ReLU, then batch normalization with running
/// statistics and learnable scale/shift.
struct DenseBlock {
    linear: Linear,
    norm: BatchNorm,
}

impl DenseBlock {
    fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            linear: xavier_linear(in_dim, out_dim, vb.pp("linear"))?,
            norm: batch_norm(out_dim, BatchNormConfig::default(), vb.pp("norm"))?,
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.linear.forward(x)?.relu()?;
        self.norm.forward_t(&x, train).map_err(Into::into)
    }
}

/// The stacked convolution / dense classifier.
pub struct ClassifierStack {
    dropout: Dropout,
    conv1: Conv1d,
    conv2: Conv1d,
    dense1: DenseBlock,
    dense2: DenseBlock,
    dense3: DenseBlock,
    output: Linear,
}

impl ClassifierStack {
    /// Build the stack for `n_classes` speakers.
    pub fn new(config: &SincNetConfig, n_classes: usize, vb: VarBuilder) -> Result<Self> {
        let [c1, c2] = config.cnn_channels;
        Ok(Self {
            dropout: Dropout::new(config.dropout),
            conv1: xavier_conv1d(config.n_filters, c1, config.cnn_kernel, vb.pp("conv1"))?,
            conv2: xavier_conv1d(c1, c2, config.cnn_kernel, vb.pp("conv2"))?,
            dense1: DenseBlock::new(config.flattened_dim()?, config.dense_dim, vb.pp("dense1"))?,
            dense2: DenseBlock::new(config.dense_dim, config.dense_dim, vb.pp("dense2"))?,
            dense3: DenseBlock::new(config.dense_dim, config.dense_dim, vb.pp("dense3"))?,
            output: xavier_linear(config.dense_dim, n_classes, vb.pp("output"))?,
        })
    }

    /// Feature map `(B, F, T)` to logits `(B, n_classes)`.
    ///
    /// Dropout and batch statistics are active only when `train` is set.
    pub fn forward_t(&self, features: &Tensor, train: bool) -> Result<Tensor> {
        let x = max_pool_time(features, 2)?;
        let x = x.relu()?;
        let x = self.dropout.forward(&x, train)?;
        let x = self.conv1.forward(&x)?.relu()?;
        let x = self.conv2.forward(&x)?.relu()?;
        let x = x.flatten_from(1)?;
        let x = self.dense1.forward_t(&x, train)?;
        let x = self.dense2.forward_t(&x, train)?;
        let x = self.dense3.forward_t(&x, train)?;
        self.output.forward(&x).map_err(Into::into)
    }
}

/// Max-pool a `(B, C, T)` tensor over time, stride equal to the window.
fn max_pool_time(x: &Tensor, window: usize) -> Result<Tensor> {
    let pooled = x.unsqueeze(2)?.max_pool2d((1, window))?;
    pooled.squeeze(2).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn tiny_config() -> SincNetConfig {
        SincNetConfig {
            wavetime: 0.05, // 800-sample segments keep the test fast
            n_filters: 8,
            kernel_len: 51,
            cnn_channels: [12, 12],
            dense_dim: 32,
            ..Default::default()
        }
    }

    fn stack(config: &SincNetConfig, n_classes: usize) -> (ClassifierStack, VarMap) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let stack = ClassifierStack::new(config, n_classes, vb).unwrap();
        (stack, varmap)
    }

    #[test]
    fn test_logit_shape() {
        let config = tiny_config();
        let (stack, _varmap) = stack(&config, 5);
        let t = config.feature_map_len().unwrap();
        let features = Tensor::randn(0f32, 1.0, (3, 8, t), &Device::Cpu).unwrap();
        let logits = stack.forward_t(&features, false).unwrap();
        assert_eq!(logits.dims(), &[3, 5]);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        // dropout must be inert outside training
        let config = tiny_config();
        let (stack, _varmap) = stack(&config, 4);
        let t = config.feature_map_len().unwrap();
        let features = Tensor::randn(0f32, 1.0, (2, 8, t), &Device::Cpu).unwrap();
        let a: Vec<Vec<f32>> = stack.forward_t(&features, false).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = stack.forward_t(&features, false).unwrap().to_vec2().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bias_initialization() {
        let config = tiny_config();
        let (_stack, varmap) = stack(&config, 4);
        let vars = varmap.data().lock().unwrap();
        let bias = vars.get("conv1.bias").expect("conv1 bias registered");
        let values: Vec<f32> = bias.as_tensor().to_vec1().unwrap();
        assert!(values.iter().all(|v| (v - 0.01).abs() < 1e-7));
    }

    #[test]
    fn test_max_pool_halves_time() {
        let x = Tensor::from_vec(
            vec![1f32, 3.0, 2.0, 0.0, -1.0, 5.0],
            (1, 1, 6),
            &Device::Cpu,
        )
        .unwrap();
        let pooled = max_pool_time(&x, 2).unwrap();
        assert_eq!(pooled.dims(), &[1, 1, 3]);
        let values: Vec<f32> = pooled.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(values, vec![3.0, 2.0, 5.0]);
    }
}
