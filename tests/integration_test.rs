//! Integration tests for the speaker identification pipeline.
//!
//! Exercises the path from raw waveform to class probabilities on
//! synthetic audio.

use candle_core::{Device, Tensor};
use candle_nn::VarMap;

use sincnet::audio::{AudioSample, Segment, Segmenter};
use sincnet::dataset::{batch_tensor, LabelEncoder, SplitMode};
use sincnet::model::{SincConvolution, SincFilterBank};
use sincnet::{Error, SincNet, SincNetConfig};

/// A waveform loud enough that the denoise gate keeps every sample.
fn voiced_waveform(len: usize, sample_rate: u32) -> AudioSample {
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 + 0.3 * (2.0 * std::f32::consts::PI * 180.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 1333.0 * t).sin()
        })
        .collect();
    AudioSample::new(samples, sample_rate)
}

/// A 50,000-sample waveform at 16 kHz with 0.2 s segments: after the gate
/// removes the silent stretch, 48,000 samples remain, giving 15 full
/// segments with the 800-sample remainder discarded.
#[test]
fn test_segmenter_end_to_end() {
    let config = SincNetConfig::default();
    assert_eq!(config.segment_len(), 3200);

    let mut audio = voiced_waveform(48_000, 16_000);
    audio.samples.extend(std::iter::repeat(1e-4).take(2_000));
    assert_eq!(audio.samples.len(), 50_000);

    let segments = Segmenter::new(&config).segment(&audio).unwrap();
    assert_eq!(segments.len(), 15);
    for segment in &segments {
        assert_eq!(segment.len(), 3200);
        let n = segment.len() as f32;
        let mean = segment.samples().iter().sum::<f32>() / n;
        let var = segment
            .samples()
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f32>()
            / n;
        assert!(mean.abs() < 1e-3);
        assert!((var - 1.0).abs() < 1e-2);
    }
}

#[test]
fn test_short_sample_yields_no_segments() {
    let config = SincNetConfig::default();
    let audio = voiced_waveform(3_000, 16_000);
    let segments = Segmenter::new(&config).segment(&audio).unwrap();
    assert!(segments.is_empty());
}

#[test]
fn test_degenerate_segment_raises_not_nan() {
    let err = Segment::normalized(&[1.0f32; 3200]).unwrap_err();
    assert!(matches!(err, Error::DegenerateSegment));
}

#[test]
fn test_sinc_feature_map_length() {
    // 3200-sample segments against 251-tap kernels leave 2950 output steps
    let config = SincNetConfig::default();
    let varmap = VarMap::new();
    let bank = SincFilterBank::new(&config, &varmap, &Device::Cpu).unwrap();
    let conv = SincConvolution::new(bank);

    let audio = voiced_waveform(16_000, 16_000);
    let segments = Segmenter::new(&config).segment(&audio).unwrap();
    let batch = batch_tensor(segments.iter(), &Device::Cpu).unwrap();

    let features = conv.forward(&batch, config.sample_rate).unwrap();
    assert_eq!(features.dims(), &[segments.len(), 40, 2950]);
}

#[test]
fn test_kernels_stable_across_calls() {
    let config = SincNetConfig::default();
    let varmap = VarMap::new();
    let bank = SincFilterBank::new(&config, &varmap, &Device::Cpu).unwrap();

    let first: Vec<Vec<f32>> = bank
        .kernels(config.sample_rate)
        .unwrap()
        .squeeze(1)
        .unwrap()
        .to_vec2()
        .unwrap();
    let second: Vec<Vec<f32>> = bank
        .kernels(config.sample_rate)
        .unwrap()
        .squeeze(1)
        .unwrap()
        .to_vec2()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_full_forward_pass() {
    let config = SincNetConfig {
        wavetime: 0.05,
        n_filters: 8,
        kernel_len: 51,
        cnn_channels: [12, 12],
        dense_dim: 32,
        ..Default::default()
    };
    let varmap = VarMap::new();
    let model = SincNet::new(&config, 5, &varmap, &Device::Cpu).unwrap();

    let audio = voiced_waveform(8_000, 16_000);
    let segments = Segmenter::new(&config).segment(&audio).unwrap();
    assert!(!segments.is_empty());

    let batch = batch_tensor(segments.iter(), &Device::Cpu).unwrap();
    let probabilities: Vec<Vec<f32>> = model.probabilities(&batch).unwrap().to_vec2().unwrap();
    assert_eq!(probabilities.len(), segments.len());
    for row in probabilities {
        assert_eq!(row.len(), 5);
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(row.iter().all(|p| p.is_finite()));
    }
}

#[test]
fn test_training_step_updates_cutoffs() {
    use candle_nn::optim::{AdamW, ParamsAdamW};
    use candle_nn::{loss, Optimizer};

    let config = SincNetConfig {
        wavetime: 0.05,
        n_filters: 4,
        kernel_len: 31,
        cnn_channels: [6, 6],
        dense_dim: 16,
        ..Default::default()
    };
    let varmap = VarMap::new();
    let model = SincNet::new(&config, 3, &varmap, &Device::Cpu).unwrap();
    let (low_before, _) = model.filter_bank().cutoffs_hz().unwrap();

    let n = config.segment_len();
    let segments = Tensor::randn(0f32, 1.0, (4, 1, n), &Device::Cpu).unwrap();
    let targets = Tensor::from_vec(vec![0u32, 1, 2, 0], 4, &Device::Cpu).unwrap();

    let mut optimizer = AdamW::new(varmap.all_vars(), ParamsAdamW::default()).unwrap();
    let logits = model.forward_t(&segments, true).unwrap();
    let batch_loss = loss::cross_entropy(&logits, &targets).unwrap();
    optimizer.backward_step(&batch_loss).unwrap();

    // the cutoffs are learnable: one optimizer step must move them
    let (low_after, _) = model.filter_bank().cutoffs_hz().unwrap();
    assert_ne!(low_before, low_after);
}

#[test]
fn test_label_round_trip() {
    let encoder = LabelEncoder::from_labels(["alice", "bob", "carol"]);
    for label in encoder.labels() {
        let id = encoder.encode(label).unwrap();
        assert_eq!(encoder.decode(id), Some(label.as_str()));
    }
    assert_eq!(encoder.len(), 3);
}

#[test]
fn test_invalid_mode_is_fatal() {
    assert!(matches!(
        "production".parse::<SplitMode>(),
        Err(Error::InvalidMode(_))
    ));
}
