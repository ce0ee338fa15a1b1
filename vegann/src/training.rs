//! Training harness for the segmentation model.
//!
//! The harness is a plain state object driven by an external loop: callers
//! feed it batches phase by phase and close each epoch explicitly. Confusion
//! statistics accumulate per phase and collapse into named metrics at epoch
//! end, where they are handed to a pluggable sink.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{ElementConversion, activation::sigmoid, backend::AutodiffBackend},
};
use tracing::{debug, info};

use crate::{
    config::DOWNSAMPLE_FACTOR,
    dataset::SegBatch,
    metrics::{ConfusionStats, Reduction, get_stats},
    model::VegAnnModel,
};

/// Default learning rate for the Adam optimizer.
pub const LEARNING_RATE: f64 = 1e-4;

/// The optimizer configuration used for training runs.
pub fn default_optimizer() -> AdamConfig {
    AdamConfig::new()
}

/// Which loop a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Valid,
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Train => "train",
            Self::Valid => "valid",
            Self::Test => "test",
        };
        f.write_str(label)
    }
}

/// Loss and confusion counts produced by one forward pass over a batch.
pub struct SegStepOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub stats: ConfusionStats,
}

impl<B: Backend> VegAnnModel<B> {
    /// Runs one forward pass: loss plus thresholded confusion counts.
    ///
    /// Panics if the batch violates the model's contract: spatial dims must
    /// be divisible by the encoder's downsampling factor, and masks must be
    /// strictly binary.
    pub fn shared_step(&self, batch: &SegBatch<B>) -> SegStepOutput<B> {
        let [_, _, height, width] = batch.images.dims();
        assert!(
            height % DOWNSAMPLE_FACTOR == 0 && width % DOWNSAMPLE_FACTOR == 0,
            "image size {width}x{height} is not divisible by {DOWNSAMPLE_FACTOR}"
        );

        let max = batch.masks.clone().max().into_scalar().elem::<i64>();
        let min = batch.masks.clone().min().into_scalar().elem::<i64>();
        assert!(
            min >= 0 && max <= 1,
            "mask values must be 0 or 1, found range [{min}, {max}]"
        );

        let logits = self.forward(batch.images.clone());
        let loss = self.loss.forward(logits.clone(), batch.masks.clone());

        let predictions = sigmoid(logits).greater_elem(0.5).int();
        let stats = get_stats(predictions, batch.masks.clone());

        SegStepOutput { loss, stats }
    }
}

/// Receiver for the metrics produced at the end of each epoch.
pub trait MetricSink: Send {
    fn publish(&mut self, phase: Phase, metrics: &BTreeMap<String, f64>);
}

/// Default sink that emits each metric as a structured log event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn publish(&mut self, phase: Phase, metrics: &BTreeMap<String, f64>) {
        for (name, value) in metrics {
            info!(%phase, metric = name.as_str(), value, "epoch metric");
        }
    }
}

/// Stateful trainer driving optimization and metric aggregation.
pub struct VegAnnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<VegAnnModel<B>, B>,
{
    model: VegAnnModel<B>,
    optim: O,
    learning_rate: f64,
    outputs: HashMap<Phase, Vec<ConfusionStats>>,
    sink: Box<dyn MetricSink>,
}

impl<B, O> VegAnnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<VegAnnModel<B>, B>,
{
    pub fn new(model: VegAnnModel<B>, optim: O, learning_rate: f64) -> Self {
        Self::with_sink(model, optim, learning_rate, Box::new(TracingSink))
    }

    pub fn with_sink(
        model: VegAnnModel<B>,
        optim: O,
        learning_rate: f64,
        sink: Box<dyn MetricSink>,
    ) -> Self {
        Self {
            model,
            optim,
            learning_rate,
            outputs: HashMap::new(),
            sink,
        }
    }

    pub fn model(&self) -> &VegAnnModel<B> {
        &self.model
    }

    /// One optimization step; returns the batch loss.
    pub fn train_step(&mut self, batch: &SegBatch<B>) -> f64 {
        let output = self.model.shared_step(batch);
        let loss_value = output.loss.clone().into_scalar().elem::<f64>();

        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optim
            .step(self.learning_rate, self.model.clone(), grads);

        self.record(Phase::Train, output.stats);
        loss_value
    }

    /// One evaluation step on the validation split; returns the batch loss.
    pub fn valid_step(&mut self, batch: &SegBatch<B::InnerBackend>) -> f64 {
        self.eval_step(Phase::Valid, batch)
    }

    /// One evaluation step on the test split; returns the batch loss.
    pub fn test_step(&mut self, batch: &SegBatch<B::InnerBackend>) -> f64 {
        self.eval_step(Phase::Test, batch)
    }

    fn eval_step(&mut self, phase: Phase, batch: &SegBatch<B::InnerBackend>) -> f64 {
        let output = self.model.valid().shared_step(batch);
        let loss_value = output.loss.into_scalar().elem::<f64>();

        self.record(phase, output.stats);
        loss_value
    }

    fn record(&mut self, phase: Phase, stats: ConfusionStats) {
        self.outputs.entry(phase).or_default().push(stats);
    }

    /// Closes the given phase for this epoch.
    ///
    /// Drains the accumulated statistics, reduces them into named metrics,
    /// publishes them to the sink, and returns them. A phase that saw no
    /// batches yields an empty map.
    pub fn epoch_end(&mut self, phase: Phase) -> BTreeMap<String, f64> {
        let Some(buffers) = self.outputs.remove(&phase) else {
            debug!(%phase, "no batches recorded for phase this epoch");
            return BTreeMap::new();
        };

        let metrics = aggregate_epoch(phase, ConfusionStats::concat(buffers));
        self.sink.publish(phase, &metrics);
        metrics
    }
}

fn aggregate_epoch(phase: Phase, stats: ConfusionStats) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for (scope, reduction) in [
        ("per_image", Reduction::MicroImagewise),
        ("dataset", Reduction::Micro),
    ] {
        metrics.insert(format!("{phase}_{scope}_iou"), stats.iou(reduction));
        metrics.insert(format!("{phase}_{scope}_f1"), stats.f1(reduction));
        metrics.insert(format!("{phase}_{scope}_acc"), stats.accuracy(reduction));
    }
    metrics
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use burn::backend::{Autodiff, NdArray};

    use super::*;
    use crate::{
        config::{Arch, Encoder},
        model::VegAnnModelConfig,
    };

    type TestBackend = Autodiff<NdArray>;
    type TestDevice = <TestBackend as Backend>::Device;

    fn model(device: &TestDevice) -> VegAnnModel<TestBackend> {
        VegAnnModelConfig::new(Arch::Unet, Encoder::Small)
            .init(device)
            .unwrap()
    }

    fn trainer(device: &TestDevice) -> VegAnnTrainer<TestBackend, impl Optimizer<VegAnnModel<TestBackend>, TestBackend>> {
        VegAnnTrainer::new(model(device), default_optimizer().init(), LEARNING_RATE)
    }

    fn batch<B: Backend>(size: usize, device: &B::Device) -> SegBatch<B> {
        SegBatch {
            images: Tensor::zeros([1, 3, size, size], device),
            masks: Tensor::zeros([1, 1, size, size], device),
            ids: vec![0],
        }
    }

    #[test]
    fn train_epoch_produces_all_six_metrics() {
        let device = TestDevice::default();
        let mut trainer = trainer(&device);

        let loss = trainer.train_step(&batch(32, &device));
        assert!(loss.is_finite());

        let metrics = trainer.epoch_end(Phase::Train);
        assert_eq!(metrics.len(), 6);
        assert!(metrics.keys().all(|k| k.starts_with("train_")));
        for key in [
            "train_per_image_iou",
            "train_per_image_f1",
            "train_per_image_acc",
            "train_dataset_iou",
            "train_dataset_f1",
            "train_dataset_acc",
        ] {
            assert!(metrics.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn epoch_end_drains_the_phase_buffer() {
        let device = TestDevice::default();
        let mut trainer = trainer(&device);

        trainer.train_step(&batch(32, &device));
        assert_eq!(trainer.epoch_end(Phase::Train).len(), 6);
        assert!(trainer.epoch_end(Phase::Train).is_empty());
    }

    #[test]
    fn phases_accumulate_independently() {
        let device = TestDevice::default();
        let mut trainer = trainer(&device);

        trainer.train_step(&batch(32, &device));
        trainer.valid_step(&batch(32, &Default::default()));

        let valid = trainer.epoch_end(Phase::Valid);
        assert!(valid.keys().all(|k| k.starts_with("valid_")));
        // The train buffer is untouched by closing the valid phase.
        assert_eq!(trainer.epoch_end(Phase::Train).len(), 6);
    }

    #[test]
    #[should_panic(expected = "not divisible")]
    fn rejects_sizes_the_encoder_cannot_downsample() {
        let device = TestDevice::default();
        let mut trainer = trainer(&device);

        trainer.train_step(&batch(48, &device));
    }

    #[test]
    #[should_panic(expected = "mask values")]
    fn rejects_unscaled_masks() {
        let device = TestDevice::default();
        let mut trainer = trainer(&device);

        let batch = SegBatch::<TestBackend> {
            images: Tensor::zeros([1, 3, 32, 32], &device),
            masks: Tensor::ones([1, 1, 32, 32], &device) * 255,
            ids: vec![0],
        };
        trainer.train_step(&batch);
    }

    #[test]
    fn metrics_reach_the_sink() {
        #[derive(Default)]
        struct Capture(Arc<Mutex<Vec<(Phase, usize)>>>);

        impl MetricSink for Capture {
            fn publish(&mut self, phase: Phase, metrics: &BTreeMap<String, f64>) {
                self.0.lock().unwrap().push((phase, metrics.len()));
            }
        }

        let device = TestDevice::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut trainer = VegAnnTrainer::with_sink(
            model(&device),
            default_optimizer().init(),
            LEARNING_RATE,
            Box::new(Capture(Arc::clone(&seen))),
        );

        trainer.train_step(&batch(32, &device));
        trainer.epoch_end(Phase::Train);

        assert_eq!(seen.lock().unwrap().as_slice(), &[(Phase::Train, 6)]);
    }
}
