//! Training entry point: configuration file handling and the epoch loop.

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use burn::{
    backend::Autodiff,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use tracing::info;
use vegann_burn::{
    DOWNSAMPLE_FACTOR, Phase, SegBatch, SegBatcher, VegAnnDataset, VegAnnModelConfig,
    VegAnnTrainer,
    augmentation::{Compose, HorizontalFlip, PairedResize, PairedTransform, RandomCrop},
    default_optimizer,
};

use crate::{
    backend::{SelectedBackend, create_device},
    dataset::VegDirDataset,
};

/// Training run configuration, loaded from a JSON file.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Model configuration.
    pub model: VegAnnModelConfig,

    /// Directory containing the training `images/` and `masks/`.
    pub train_data_dir: String,

    /// Directory containing the validation `images/` and `masks/`.
    pub valid_data_dir: String,

    /// Directory for checkpoints and the final model.
    #[config(default = "String::from(\"artifacts\")")]
    pub artifact_dir: String,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    #[config(default = 50)]
    pub num_epochs: usize,

    #[config(default = 8)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    /// Square size images and masks are resized to before batching.
    #[config(default = 512)]
    pub image_size: u32,

    /// Checkpoint save frequency, in epochs.
    #[config(default = 5)]
    pub save_step: usize,

    /// Random seed for reproducibility.
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Loads a training configuration from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration {}", path.display()))?;
        let config: Self = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Saves this configuration to a JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.image_size as usize % DOWNSAMPLE_FACTOR != 0 {
            bail!(
                "image_size {} must be divisible by {DOWNSAMPLE_FACTOR}",
                self.image_size
            );
        }
        for dir in [&self.train_data_dir, &self.valid_data_dir] {
            if !Path::new(dir).is_dir() {
                bail!("data directory not found: {dir}");
            }
        }
        Ok(())
    }
}

/// Runs training from a configuration file path, on the selected backend.
pub fn run_training(config_path: impl AsRef<Path>) -> Result<()> {
    let config_path = config_path.as_ref();
    if !config_path.exists() {
        bail!("configuration file not found: {}", config_path.display());
    }

    let config = TrainingConfig::load_json(config_path)?;
    config.validate()?;

    let device = create_device();
    run_training_on_device::<Autodiff<SelectedBackend>>(device, config)
}

/// Runs the full training loop on a specific device.
pub fn run_training_on_device<B: AutodiffBackend>(
    device: B::Device,
    config: TrainingConfig,
) -> Result<()> {
    info!(?device, "initializing segmentation training");
    B::seed(config.seed);

    fs::create_dir_all(&config.artifact_dir)
        .with_context(|| format!("cannot create artifact directory {}", config.artifact_dir))?;
    config.save_json(Path::new(&config.artifact_dir).join("config.json"))?;

    let model = config.model.init::<B>(&device)?;
    let optimizer = default_optimizer().init();
    let mut trainer = VegAnnTrainer::new(model, optimizer, config.learning_rate);

    let train_loader = create_train_dataloader::<B>(&config)?;
    let valid_loader = create_valid_dataloader::<B>(&config)?;

    info!(epochs = config.num_epochs, "starting training");
    for epoch in 1..=config.num_epochs {
        let mut train_loss = 0.0;
        let mut train_batches = 0_usize;
        for batch in train_loader.iter() {
            train_loss += trainer.train_step(&batch);
            train_batches += 1;
        }
        let metrics = trainer.epoch_end(Phase::Train);
        info!(
            epoch,
            loss = train_loss / train_batches.max(1) as f64,
            iou = metrics.get("train_dataset_iou").copied().unwrap_or(f64::NAN),
            "train epoch complete"
        );

        let mut valid_loss = 0.0;
        let mut valid_batches = 0_usize;
        for batch in valid_loader.iter() {
            valid_loss += trainer.valid_step(&batch);
            valid_batches += 1;
        }
        let metrics = trainer.epoch_end(Phase::Valid);
        info!(
            epoch,
            loss = valid_loss / valid_batches.max(1) as f64,
            iou = metrics.get("valid_dataset_iou").copied().unwrap_or(f64::NAN),
            "valid epoch complete"
        );

        if epoch % config.save_step == 0 {
            let path = Path::new(&config.artifact_dir).join(format!("checkpoint-{epoch}"));
            trainer
                .model()
                .clone()
                .save_file(&path, &CompactRecorder::new())
                .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
            info!(epoch, path = %path.display(), "checkpoint saved");
        }
    }

    let final_path = Path::new(&config.artifact_dir).join("final_model");
    trainer
        .model()
        .clone()
        .save_file(&final_path, &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("failed to save final model: {e}"))?;

    info!("training completed");
    Ok(())
}

fn train_transform(size: u32) -> Box<dyn PairedTransform> {
    Box::new(Compose(vec![
        Box::new(HorizontalFlip { probability: 0.5 }),
        Box::new(RandomCrop {
            border_fraction: 0.1,
        }),
        Box::new(PairedResize {
            width: size,
            height: size,
        }),
    ]))
}

fn valid_transform(size: u32) -> Box<dyn PairedTransform> {
    Box::new(PairedResize {
        width: size,
        height: size,
    })
}

fn create_train_dataloader<B: AutodiffBackend>(
    config: &TrainingConfig,
) -> Result<Arc<dyn DataLoader<B, SegBatch<B>>>> {
    let dataset = VegAnnDataset::with_transform(
        VegDirDataset::new(&config.train_data_dir)?,
        train_transform(config.image_size),
    );

    Ok(DataLoaderBuilder::new(SegBatcher::<B>::new())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset))
}

fn create_valid_dataloader<B: AutodiffBackend>(
    config: &TrainingConfig,
) -> Result<Arc<dyn DataLoader<B::InnerBackend, SegBatch<B::InnerBackend>>>> {
    let dataset = VegAnnDataset::with_transform(
        VegDirDataset::new(&config.valid_data_dir)?,
        valid_transform(config.image_size),
    );

    Ok(DataLoaderBuilder::new(SegBatcher::<B::InnerBackend>::new())
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(dataset))
}

#[cfg(test)]
mod tests {
    use vegann_burn::{Arch, Encoder};

    use super::*;

    fn config() -> TrainingConfig {
        TrainingConfig::new(
            VegAnnModelConfig::new(Arch::Unet, Encoder::Small),
            "train".into(),
            "valid".into(),
        )
    }

    #[test]
    fn defaults_match_the_documented_run_settings() {
        let config = config();

        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.num_epochs, 50);
        assert_eq!(config.image_size, 512);
        assert_eq!(config.artifact_dir, "artifacts");
    }

    #[test]
    fn image_size_must_be_divisible_by_the_downsample_factor() {
        let config = config().with_image_size(500);

        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trip_preserves_the_configuration() {
        let config = config().with_batch_size(2).with_seed(7);

        let json = serde_json::to_string(&config).unwrap();
        let restored: TrainingConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.batch_size, 2);
        assert_eq!(restored.seed, 7);
        assert_eq!(restored.train_data_dir, "train");
    }
}
