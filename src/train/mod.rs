//! Gradient training for the speaker classifier.
//!
//! The loop is deliberately plain: shuffled mini-batches, AdamW over every
//! registered variable (sinc cutoffs included), cross-entropy loss, and a
//! periodic validation pass that keeps the best checkpoint on disk.

use std::path::Path;

use candle_core::{Device, D};
use candle_nn::optim::{AdamW, ParamsAdamW};
use candle_nn::{loss, Optimizer, VarMap};
use rand::seq::SliceRandom;
use tracing::info;

use crate::config::SincNetConfig;
use crate::dataset::{LabelEncoder, SpeakerDataset};
use crate::error::{Error, Result};
use crate::model::{save_checkpoint, SincNet};

/// Hyper-parameters of the training loop.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Number of passes over the training split.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// AdamW learning rate.
    pub lr: f64,
    /// Validate (and maybe checkpoint) every N epochs.
    pub test_every: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 128,
            lr: 1e-3,
            test_every: 5,
        }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    /// Best validation accuracy reached.
    pub best_accuracy: f32,
    /// Mean training loss of the final epoch.
    pub final_loss: f32,
}

/// Owns everything a training run needs besides the data.
pub struct Trainer<'a> {
    model: &'a SincNet,
    varmap: &'a VarMap,
    config: &'a SincNetConfig,
    labels: &'a LabelEncoder,
    device: &'a Device,
}

impl<'a> Trainer<'a> {
    /// Bundle a freshly built model with its variable map and metadata.
    pub fn new(
        model: &'a SincNet,
        varmap: &'a VarMap,
        config: &'a SincNetConfig,
        labels: &'a LabelEncoder,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            varmap,
            config,
            labels,
            device,
        }
    }

    /// Run the loop, writing the best checkpoint into `out_dir`.
    pub fn run(
        &self,
        train_set: &SpeakerDataset,
        val_set: &SpeakerDataset,
        opts: &TrainOptions,
        out_dir: &Path,
    ) -> Result<TrainSummary> {
        if train_set.is_empty() || val_set.is_empty() {
            return Err(Error::EmptyDataset);
        }

        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: opts.lr,
                ..Default::default()
            },
        )?;

        let mut indices: Vec<usize> = (0..train_set.len()).collect();
        let mut rng = rand::thread_rng();
        let mut best_accuracy = 0f32;
        let mut final_loss = 0f32;

        for epoch in 1..=opts.epochs {
            indices.shuffle(&mut rng);

            let mut epoch_loss = 0f32;
            let mut batches = 0usize;
            for chunk in indices.chunks(opts.batch_size) {
                let (segments, targets) = train_set.batch(chunk, self.device)?;
                let logits = self.model.forward_t(&segments, true)?;
                let batch_loss = loss::cross_entropy(&logits, &targets)?;
                optimizer.backward_step(&batch_loss)?;
                epoch_loss += batch_loss.to_scalar::<f32>()?;
                batches += 1;
            }
            final_loss = epoch_loss / batches.max(1) as f32;
            info!("epoch {epoch}/{}: loss {final_loss:.4}", opts.epochs);

            if epoch % opts.test_every == 0 || epoch == opts.epochs {
                let accuracy = evaluate(self.model, val_set, opts.batch_size, self.device)?;
                info!("epoch {epoch}: val accuracy {:.2}%", accuracy * 100.0);
                if accuracy > best_accuracy {
                    best_accuracy = accuracy;
                    save_checkpoint(out_dir, self.varmap, self.config, self.labels)?;
                    info!("saved checkpoint to {}", out_dir.display());
                }
            }
        }

        Ok(TrainSummary {
            best_accuracy,
            final_loss,
        })
    }
}

/// Segment-level accuracy of `model` on a dataset split.
pub fn evaluate(
    model: &SincNet,
    set: &SpeakerDataset,
    batch_size: usize,
    device: &Device,
) -> Result<f32> {
    if set.is_empty() {
        return Err(Error::EmptyDataset);
    }

    let indices: Vec<usize> = (0..set.len()).collect();
    let mut correct = 0usize;
    for chunk in indices.chunks(batch_size) {
        let (segments, targets) = set.batch(chunk, device)?;
        let predicted = model.forward_t(&segments, false)?.argmax(D::Minus1)?;
        let predicted: Vec<u32> = predicted.to_vec1()?;
        let targets: Vec<u32> = targets.to_vec1()?;
        correct += predicted
            .iter()
            .zip(&targets)
            .filter(|(p, t)| p == t)
            .count();
    }
    Ok(correct as f32 / set.len() as f32)
}
