//! Confusion-matrix statistics and segmentation metrics.
//!
//! Statistics are collected per image so both pooled ("dataset") and
//! per-image-averaged scores can be derived from the same buffers after an
//! epoch. A sample with a zero denominator scores 1.0, which keeps empty
//! images from dragging per-image averages down when the model correctly
//! predicts nothing.

use burn::prelude::*;

/// How per-image confusion counts are reduced into a single score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Pool counts over all images first, then form the ratio once.
    Micro,
    /// Form the ratio per image, then average the ratios.
    MicroImagewise,
}

/// Per-image confusion counts for a binary segmentation task.
///
/// Each vector holds one entry per image; entries from several batches can
/// be concatenated and reduced at epoch end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfusionStats {
    pub true_positive: Vec<f32>,
    pub false_positive: Vec<f32>,
    pub false_negative: Vec<f32>,
    pub true_negative: Vec<f32>,
}

impl ConfusionStats {
    /// Number of images these counts cover.
    pub fn len(&self) -> usize {
        self.true_positive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.true_positive.is_empty()
    }

    /// Concatenates a sequence of per-batch stats into one buffer.
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut out = Self::default();
        for part in parts {
            out.true_positive.extend(part.true_positive);
            out.false_positive.extend(part.false_positive);
            out.false_negative.extend(part.false_negative);
            out.true_negative.extend(part.true_negative);
        }
        out
    }

    /// Intersection over union: `tp / (tp + fp + fn)`.
    pub fn iou(&self, reduction: Reduction) -> f64 {
        self.score_with(reduction, |tp, fp, fne, _tn| (tp, tp + fp + fne))
    }

    /// F1 score: `2 tp / (2 tp + fp + fn)`.
    pub fn f1(&self, reduction: Reduction) -> f64 {
        self.score_with(reduction, |tp, fp, fne, _tn| {
            (2.0 * tp, 2.0 * tp + fp + fne)
        })
    }

    /// Pixel accuracy: `(tp + tn) / (tp + fp + fn + tn)`.
    pub fn accuracy(&self, reduction: Reduction) -> f64 {
        self.score_with(reduction, |tp, fp, fne, tn| (tp + tn, tp + fp + fne + tn))
    }

    fn score_with<F>(&self, reduction: Reduction, ratio_parts: F) -> f64
    where
        F: Fn(f64, f64, f64, f64) -> (f64, f64),
    {
        let samples = (0..self.len()).map(|i| {
            (
                f64::from(self.true_positive[i]),
                f64::from(self.false_positive[i]),
                f64::from(self.false_negative[i]),
                f64::from(self.true_negative[i]),
            )
        });

        match reduction {
            Reduction::Micro => {
                let (mut tp, mut fp, mut fne, mut tn) = (0.0, 0.0, 0.0, 0.0);
                for (s_tp, s_fp, s_fn, s_tn) in samples {
                    tp += s_tp;
                    fp += s_fp;
                    fne += s_fn;
                    tn += s_tn;
                }
                let (num, den) = ratio_parts(tp, fp, fne, tn);
                ratio(num, den)
            }
            Reduction::MicroImagewise => {
                if self.is_empty() {
                    return 0.0;
                }
                let mut total = 0.0;
                for (tp, fp, fne, tn) in samples {
                    let (num, den) = ratio_parts(tp, fp, fne, tn);
                    total += ratio(num, den);
                }
                total / self.len() as f64
            }
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        1.0
    } else {
        num / den
    }
}

/// Computes per-image confusion counts for binary predictions.
///
/// Both tensors are `[N, 1, H, W]` with values in {0, 1}.
pub fn get_stats<B: Backend>(
    predictions: Tensor<B, 4, Int>,
    targets: Tensor<B, 4, Int>,
) -> ConfusionStats {
    let [batch_size, _, height, width] = predictions.dims();
    let pixels = (height * width) as f32;

    let predictions = predictions.float().flatten::<2>(1, 3);
    let targets = targets.float().flatten::<2>(1, 3);

    let true_positive = (predictions.clone() * targets.clone()).sum_dim(1);
    let false_positive = predictions.sum_dim(1) - true_positive.clone();
    let false_negative = targets.sum_dim(1) - true_positive.clone();
    let true_negative =
        true_positive.clone().neg() - false_positive.clone() - false_negative.clone() + pixels;

    let read = |t: Tensor<B, 2>| -> Vec<f32> {
        t.into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap_or_else(|_| vec![0.0; batch_size])
    };

    ConfusionStats {
        true_positive: read(true_positive),
        false_positive: read(false_positive),
        false_negative: read(false_negative),
        true_negative: read(true_negative),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn stats_for(pred: &[i64], target: &[i64]) -> ConfusionStats {
        let device = Default::default();
        let len = pred.len();
        let pred = Tensor::<TestBackend, 1, Int>::from_ints(pred, &device)
            .reshape([1, 1, 1, len]);
        let target = Tensor::<TestBackend, 1, Int>::from_ints(target, &device)
            .reshape([1, 1, 1, len]);
        get_stats(pred, target)
    }

    #[test]
    fn counts_match_hand_computed_confusion() {
        let stats = stats_for(&[1, 1, 0, 0], &[1, 0, 1, 0]);

        assert_eq!(stats.true_positive, vec![1.0]);
        assert_eq!(stats.false_positive, vec![1.0]);
        assert_eq!(stats.false_negative, vec![1.0]);
        assert_eq!(stats.true_negative, vec![1.0]);
    }

    #[test]
    fn perfect_prediction_scores_one_under_both_reductions() {
        let stats = stats_for(&[1, 0, 1, 1], &[1, 0, 1, 1]);

        for reduction in [Reduction::Micro, Reduction::MicroImagewise] {
            assert_eq!(stats.iou(reduction), 1.0);
            assert_eq!(stats.f1(reduction), 1.0);
            assert_eq!(stats.accuracy(reduction), 1.0);
        }
    }

    #[test]
    fn complementary_prediction_scores_zero_iou() {
        let stats = stats_for(&[1, 0, 1, 0], &[0, 1, 0, 1]);

        assert_eq!(stats.iou(Reduction::Micro), 0.0);
        assert_eq!(stats.accuracy(Reduction::Micro), 0.0);
    }

    #[test]
    fn identical_images_make_reductions_agree() {
        let one = stats_for(&[1, 1, 0, 0], &[1, 0, 1, 0]);
        let many = ConfusionStats::concat(vec![one.clone(), one.clone(), one.clone()]);

        assert_eq!(many.len(), 3);
        for reduction in [Reduction::Micro, Reduction::MicroImagewise] {
            assert!((many.iou(reduction) - one.iou(reduction)).abs() < 1e-12);
            assert!((many.f1(reduction) - one.f1(reduction)).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_images_lift_per_image_average_only() {
        // Image A: perfect empty prediction. Image B: half-right vegetation.
        let empty = stats_for(&[0, 0, 0, 0], &[0, 0, 0, 0]);
        let half = stats_for(&[1, 1, 0, 0], &[1, 0, 1, 0]);
        let stats = ConfusionStats::concat(vec![empty, half]);

        // Per-image: empty scores 1.0 by convention, half scores 1/3.
        let per_image = stats.iou(Reduction::MicroImagewise);
        assert!((per_image - (1.0 + 1.0 / 3.0) / 2.0).abs() < 1e-12);

        // Pooled: the empty image contributes nothing but true negatives.
        let pooled = stats.iou(Reduction::Micro);
        assert!((pooled - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_images_reduces_to_defined_values() {
        let stats = ConfusionStats::default();

        assert!(stats.is_empty());
        assert_eq!(stats.iou(Reduction::MicroImagewise), 0.0);
        // Pooled ratio over zero counts hits the zero-denominator convention.
        assert_eq!(stats.iou(Reduction::Micro), 1.0);
    }
}
