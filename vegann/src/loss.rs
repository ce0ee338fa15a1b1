//! Soft Dice loss for binary segmentation from raw logits.

use core::marker::PhantomData;

use burn::{prelude::*, tensor::activation::sigmoid};

/// Configuration for [`DiceLoss`].
#[derive(Config, Debug)]
pub struct DiceLossConfig {
    /// Additive smoothing applied to numerator and denominator.
    #[config(default = 0.0)]
    pub smooth: f32,
    /// Lower bound on the denominator to keep the ratio finite.
    #[config(default = 1e-7)]
    pub epsilon: f32,
}

impl DiceLossConfig {
    pub fn init<B: Backend>(&self) -> DiceLoss<B> {
        DiceLoss {
            smooth: self.smooth,
            epsilon: self.epsilon,
            _backend: PhantomData,
        }
    }
}

/// Soft Dice loss over a whole batch.
///
/// Probabilities come from a sigmoid applied internally, so the model's
/// forward pass stays in logit space. The overlap statistics are pooled
/// across every sample and pixel in the batch before forming the ratio.
#[derive(Module, Debug)]
pub struct DiceLoss<B: Backend> {
    smooth: f32,
    epsilon: f32,
    _backend: PhantomData<B>,
}

impl<B: Backend> DiceLoss<B> {
    /// Computes `1 - dice` for a batch of logits against integer targets.
    pub fn forward(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        let probs = sigmoid(logits).flatten::<1>(0, 3);
        let targets = targets.float().flatten::<1>(0, 3);

        let intersection = (probs.clone() * targets.clone()).sum();
        let cardinality = probs.sum() + targets.sum();

        let dice = (intersection * 2.0 + self.smooth)
            / (cardinality + self.smooth).clamp_min(self.epsilon);

        dice.neg() + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn logits_for(targets: &[i64]) -> Vec<f32> {
        // Large-magnitude logits so sigmoid saturates to ~0 or ~1.
        targets
            .iter()
            .map(|&t| if t == 1 { 20.0 } else { -20.0 })
            .collect()
    }

    #[test]
    fn perfect_prediction_gives_near_zero_loss() {
        let device = Default::default();
        let targets = [1_i64, 0, 1, 1, 0, 0, 1, 0];
        let logits = Tensor::<TestBackend, 1>::from_floats(logits_for(&targets).as_slice(), &device)
            .reshape([1, 1, 2, 4]);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints(targets, &device)
            .reshape([1, 1, 2, 4]);

        let loss = DiceLossConfig::new().init().forward(logits, targets);

        assert!(loss.into_scalar() < 1e-4);
    }

    #[test]
    fn inverted_prediction_gives_full_loss() {
        let device = Default::default();
        let targets = [1_i64, 0, 1, 0];
        let inverted: Vec<i64> = targets.iter().map(|&t| 1 - t).collect();
        let logits = Tensor::<TestBackend, 1>::from_floats(logits_for(&inverted).as_slice(), &device)
            .reshape([1, 1, 1, 4]);
        let targets =
            Tensor::<TestBackend, 1, Int>::from_ints(targets, &device).reshape([1, 1, 1, 4]);

        let loss = DiceLossConfig::new().init().forward(logits, targets);

        assert!(loss.into_scalar() > 0.999);
    }

    #[test]
    fn all_empty_without_smoothing_stays_finite() {
        let device = Default::default();
        let logits =
            Tensor::<TestBackend, 4>::from_floats([[[[-20.0_f32, -20.0, -20.0, -20.0]]]], &device);
        let targets = Tensor::<TestBackend, 4, Int>::from_ints([[[[0, 0, 0, 0]]]], &device);

        let loss = DiceLossConfig::new().init().forward(logits, targets);
        let value = loss.into_scalar();

        assert!(value.is_finite());
    }

    #[test]
    fn smoothing_rewards_empty_agreement() {
        let device = Default::default();
        let logits =
            Tensor::<TestBackend, 4>::from_floats([[[[-20.0_f32, -20.0, -20.0, -20.0]]]], &device);
        let targets = Tensor::<TestBackend, 4, Int>::from_ints([[[[0, 0, 0, 0]]]], &device);

        let loss = DiceLossConfig::new()
            .with_smooth(1.0)
            .init()
            .forward(logits, targets);

        // With smoothing, perfectly agreeing empties score dice ~= 1.
        assert!(loss.into_scalar() < 1e-4);
    }
}
