//! Binary vegetation/ground segmentation for crop imagery, built on burn.
//!
//! The crate provides the full training stack: a dataset adapter with
//! paired augmentation, a UNet segmentation model with Dice loss, an
//! explicit training harness with per-epoch metrics, and a visualization
//! helper for overlaying predicted labels on images.

pub mod augmentation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod training;
pub mod visualize;

pub use config::{Arch, DOWNSAMPLE_FACTOR, Encoder, PreprocessingParams};
pub use dataset::{RawSegItem, SegBatch, SegBatcher, SegRecord, VegAnnDataset};
pub use error::{VegAnnError, VegAnnResult};
pub use loss::{DiceLoss, DiceLossConfig};
pub use metrics::{ConfusionStats, Reduction, get_stats};
pub use model::{VegAnnModel, VegAnnModelConfig};
pub use training::{
    LEARNING_RATE, MetricSink, Phase, SegStepOutput, TracingSink, VegAnnTrainer, default_optimizer,
};
pub use visualize::{GROUND_RGB, VEGETATION_RGB, color_transform_veg_ground};
