//! Learned sinc band-pass filter bank and its convolution stage.
//!
//! The front-end replaces a fixed spectrogram with a bank of band-pass
//! filters whose impulse responses are synthesized on the fly from
//! learnable cutoff frequencies:
//!
//! ```text
//! g[n] = 2*f2*sinc(2*pi*f2*n) - 2*f1*sinc(2*pi*f1*n)      n in [0, L)
//! kernel[n] = g[n] * (0.54 - 0.46*cos(2*pi*n / L))
//! ```
//!
//! with cutoffs in cycles per sample and the `sinc(0) = 1` convention.
//! Kernels are recomputed on every forward pass because the cutoffs move
//! between optimizer steps; synthesis is a pure function of the current
//! parameters and the sample rate.

use std::f64::consts::PI;

use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;

use crate::config::SincNetConfig;
use crate::error::{Error, Result};

/// Bank of band-pass filters parameterized by learnable cutoffs.
///
/// Each filter owns a low cutoff `low_hz[i]` and a bandwidth `band_hz[i]`,
/// both in Hz. The high cutoff is derived as `|low| + |band|`, so
/// `0 <= low <= high` holds for any parameter values the optimizer reaches.
pub struct SincFilterBank {
    low_hz: Var,
    band_hz: Var,
    /// Fixed Hamming taper, shape `(1, L)`.
    window: Tensor,
    n_filters: usize,
    kernel_len: usize,
}

impl SincFilterBank {
    /// Initialize a bank with cutoffs drawn uniformly in `[0, nyquist]`.
    ///
    /// The initial bandwidth of filter `i` is `|low_i - r_i|` for a second
    /// uniform draw `r_i`. Both vectors are registered in `varmap` under
    /// `sinc.low_hz` / `sinc.band_hz` so the optimizer updates them and
    /// checkpoints carry them.
    pub fn new(config: &SincNetConfig, varmap: &VarMap, device: &Device) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(config.sample_rate));
        }
        let nyquist = config.nyquist();

        let low = Tensor::rand(0f32, nyquist, (config.n_filters,), device)?;
        let second = Tensor::rand(0f32, nyquist, (config.n_filters,), device)?;
        let band = (&low - &second)?.abs()?;

        let low_hz = Var::from_tensor(&low)?;
        let band_hz = Var::from_tensor(&band)?;
        {
            let mut data = varmap.data().lock().unwrap();
            data.insert("sinc.low_hz".to_string(), low_hz.clone());
            data.insert("sinc.band_hz".to_string(), band_hz.clone());
        }

        Ok(Self {
            low_hz,
            band_hz,
            window: hamming_window(config.kernel_len, device)?,
            n_filters: config.n_filters,
            kernel_len: config.kernel_len,
        })
    }

    /// Synthesize the `(F, 1, L)` kernel tensor for a batch at `sample_rate`.
    pub fn kernels(&self, sample_rate: u32) -> Result<Tensor> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        let sr = sample_rate as f64;

        // cutoffs in cycles/sample, as column vectors for broadcasting
        let low = (self.low_hz.abs()? / sr)?.unsqueeze(1)?;
        let high = ((self.low_hz.abs()? + self.band_hz.abs()?)? / sr)?.unsqueeze(1)?;

        let offsets =
            Tensor::arange(0f32, self.kernel_len as f32, self.low_hz.device())?.unsqueeze(0)?;

        let pass = (scaled_sinc(&high, &offsets)? - scaled_sinc(&low, &offsets)?)?;
        let windowed = pass.broadcast_mul(&self.window)?;
        windowed.unsqueeze(1).map_err(Into::into)
    }

    /// Current `(low, high)` cutoffs in Hz.
    pub fn cutoffs_hz(&self) -> Result<(Vec<f32>, Vec<f32>)> {
        let low = self.low_hz.abs()?;
        let high = (&low + self.band_hz.abs()?)?;
        Ok((low.to_vec1()?, high.to_vec1()?))
    }

    /// The two learnable parameter vectors, for optimizers that iterate
    /// over parameters directly instead of going through the `VarMap`.
    pub fn parameters(&self) -> Vec<Var> {
        vec![self.low_hz.clone(), self.band_hz.clone()]
    }

    /// Number of filters in the bank.
    pub fn n_filters(&self) -> usize {
        self.n_filters
    }

    /// Kernel length in taps.
    pub fn kernel_len(&self) -> usize {
        self.kernel_len
    }
}

/// `2*f*sinc(2*pi*f*n)` over the broadcast of `f: (F, 1)` and `n: (1, L)`.
///
/// `sinc(0) = 1` is enforced exactly with a mask, so the `n = 0` tap equals
/// `2*f` bit-for-bit and a zero cutoff contributes zero instead of NaN.
fn scaled_sinc(f: &Tensor, n: &Tensor) -> Result<Tensor> {
    let arg = (f.broadcast_mul(n)? * (2.0 * PI))?;
    let ones = Tensor::ones(arg.shape(), arg.dtype(), arg.device())?;
    let at_zero = arg.eq(0f32)?;
    let safe = at_zero.where_cond(&ones, &arg)?;
    let sinc = at_zero.where_cond(&ones, &(safe.sin()? / &safe)?)?;
    (sinc.broadcast_mul(f)? * 2.0).map_err(Into::into)
}

/// Hamming taper `w[n] = 0.54 - 0.46*cos(2*pi*n / L)`, shaped `(1, L)`.
fn hamming_window(len: usize, device: &Device) -> Result<Tensor> {
    let taps: Vec<f32> = (0..len)
        .map(|n| (0.54 - 0.46 * (2.0 * PI * n as f64 / len as f64).cos()) as f32)
        .collect();
    Tensor::from_vec(taps, (1, len), device).map_err(Into::into)
}

/// Applies the filter bank to a segment batch by 1-D cross-correlation,
/// stride 1, no padding.
pub struct SincConvolution {
    bank: SincFilterBank,
}

impl SincConvolution {
    /// Wrap a filter bank.
    pub fn new(bank: SincFilterBank) -> Self {
        Self { bank }
    }

    /// The underlying filter bank.
    pub fn bank(&self) -> &SincFilterBank {
        &self.bank
    }

    /// Convolve a `(B, 1, N)` segment batch into a `(B, F, N - L + 1)`
    /// feature map.
    pub fn forward(&self, segments: &Tensor, sample_rate: u32) -> Result<Tensor> {
        let (_batch, _channels, n) = segments.dims3()?;
        let l = self.bank.kernel_len();
        if l >= n {
            return Err(Error::KernelLongerThanSegment {
                kernel: l,
                segment: n,
            });
        }
        let kernels = self.bank.kernels(sample_rate)?;
        segments.conv1d(&kernels, 0, 1, 1, 1).map_err(Into::into)
    }
}
