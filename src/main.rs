//! SincNet CLI - train and run speaker identification on raw waveforms

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use candle_core::Device;
use candle_nn::VarMap;
use sincnet::dataset::{scan_labels, SpeakerDataset, SplitMode};
use sincnet::model::{CONFIG_FILE, LABELS_FILE};
use sincnet::train::{evaluate, TrainOptions, Trainer};
use sincnet::{SincNet, SincNetConfig, SpeakerIdentifier, VERSION};

/// SincNet - speaker identification with a learned sinc filter front-end
#[derive(Parser, Debug)]
#[command(name = "sincnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use CPU instead of GPU
    #[arg(long, global = true)]
    cpu: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model on a directory tree of speaker recordings
    Train {
        /// Dataset root: one subdirectory of .flac/.wav files per speaker
        #[arg(short, long)]
        data: PathBuf,

        /// Output directory for the checkpoint
        #[arg(short, long, default_value = "model")]
        output: PathBuf,

        /// Number of training epochs
        #[arg(long, default_value = "50")]
        epochs: usize,

        /// Mini-batch size
        #[arg(long, default_value = "128")]
        batch_size: usize,

        /// AdamW learning rate
        #[arg(long, default_value = "0.001")]
        lr: f64,

        /// Validate every N epochs
        #[arg(long, default_value = "5")]
        test_every: usize,
    },

    /// Identify the speaker of an audio file
    Identify {
        /// Path to a trained checkpoint directory
        #[arg(short, long, default_value = "model")]
        model: PathBuf,

        /// Audio file to identify
        #[arg(short, long)]
        audio: PathBuf,

        /// How many ranked speakers to print
        #[arg(long, default_value = "5")]
        top: usize,
    },

    /// Evaluate a trained model on the held-out test split
    Eval {
        /// Path to a trained checkpoint directory
        #[arg(short, long, default_value = "model")]
        model: PathBuf,

        /// Dataset root the model was trained on
        #[arg(short, long)]
        data: PathBuf,

        /// Mini-batch size
        #[arg(long, default_value = "128")]
        batch_size: usize,
    },

    /// Show checkpoint information
    Info {
        /// Path to a trained checkpoint directory
        #[arg(short, long, default_value = "model")]
        model: PathBuf,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb
}

fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        Ok(Device::cuda_if_available(0)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("SincNet v{}", VERSION);
    let device = select_device(cli.cpu)?;

    match cli.command {
        Commands::Train {
            data,
            output,
            epochs,
            batch_size,
            lr,
            test_every,
        } => {
            let config = SincNetConfig::default();
            config.validate().context("Invalid configuration")?;

            let labels = scan_labels(&data).context("Failed to scan dataset root")?;
            info!("{} speakers under {}", labels.len(), data.display());

            let pb = create_progress_bar("Segmenting dataset...");
            let train_set = SpeakerDataset::build(&data, SplitMode::Train, &config, &labels)?;
            let val_set = SpeakerDataset::build(&data, SplitMode::Val, &config, &labels)?;
            pb.finish_with_message(format!(
                "{} train / {} val segments",
                train_set.len(),
                val_set.len()
            ));

            let varmap = VarMap::new();
            let model = SincNet::new(&config, labels.len(), &varmap, &device)?;

            let opts = TrainOptions {
                epochs,
                batch_size,
                lr,
                test_every,
            };
            let trainer = Trainer::new(&model, &varmap, &config, &labels, &device);
            let summary = trainer
                .run(&train_set, &val_set, &opts, &output)
                .context("Training failed")?;

            info!(
                "done: best val accuracy {:.2}%, final loss {:.4}",
                summary.best_accuracy * 100.0,
                summary.final_loss
            );
            Ok(())
        }

        Commands::Identify { model, audio, top } => {
            let identifier = SpeakerIdentifier::load(&model, &device)
                .context("Failed to load checkpoint")?;
            let ranking = identifier.identify(&audio)?;

            println!("Speaker ranking for {}:", audio.display());
            for (rank, prediction) in ranking.iter().take(top).enumerate() {
                println!(
                    "  {}. {:<20} {:6.2}%",
                    rank + 1,
                    prediction.label,
                    prediction.probability * 100.0
                );
            }
            Ok(())
        }

        Commands::Eval {
            model,
            data,
            batch_size,
        } => {
            let identifier = SpeakerIdentifier::load(&model, &device)
                .context("Failed to load checkpoint")?;
            let test_set = SpeakerDataset::build(
                &data,
                SplitMode::Test,
                identifier.config(),
                identifier.labels(),
            )?;
            info!("{} test segments", test_set.len());

            let accuracy = evaluate(identifier.model(), &test_set, batch_size, &device)?;
            println!("Test accuracy: {:.2}%", accuracy * 100.0);
            Ok(())
        }

        Commands::Info { model } => {
            let config = SincNetConfig::load(model.join(CONFIG_FILE))
                .context("Failed to load checkpoint config")?;
            let labels = sincnet::dataset::LabelEncoder::load(model.join(LABELS_FILE))
                .context("Failed to load label map")?;

            println!("{config:#?}");
            println!(
                "segment: {} samples, feature map: {} x {}",
                config.segment_len(),
                config.n_filters,
                config.feature_map_len()?
            );
            println!("{} speakers: {}", labels.len(), labels.labels().join(", "));
            Ok(())
        }
    }
}
