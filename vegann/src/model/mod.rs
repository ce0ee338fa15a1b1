//! Segmentation model: a UNet encoder/decoder behind a small facade that
//! owns input normalization and the training loss.

mod blocks;

pub use blocks::{DoubleConv, DoubleConvConfig, DownStage, DownStageConfig, UpStage, UpStageConfig};

use burn::{
    module::Ignored,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};

use crate::{
    config::{Arch, Encoder, PreprocessingParams},
    error::{VegAnnError, VegAnnResult},
    loss::{DiceLoss, DiceLossConfig},
};

/// Number of encoder stages; the input is downsampled by `2^STAGES`.
const STAGES: usize = 5;

/// UNet with five encoder stages and mirrored decoder stages.
///
/// Channel widths double per stage starting from the encoder's base width.
/// The output is raw logits, one channel per class.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoders: Vec<DownStage<B>>,
    bottleneck: DoubleConv<B>,
    decoders: Vec<UpStage<B>>,
    head: Conv2d<B>,
}

impl<B: Backend> UNet<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = x;
        for encoder in &self.encoders {
            let (pooled, skip) = encoder.forward(x);
            skips.push(skip);
            x = pooled;
        }

        let mut x = self.bottleneck.forward(x);
        for decoder in &self.decoders {
            // Decoders run deepest-first; consume skips back to front.
            let skip = skips.pop().unwrap_or_else(|| x.clone());
            x = decoder.forward(x, skip);
        }

        self.head.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct UNetConfig {
    in_channels: usize,
    out_classes: usize,
    base_channels: usize,
    #[config(default = "0.2")]
    dropout: f64,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let widths: Vec<usize> = (0..STAGES).map(|i| self.base_channels << i).collect();
        let deepest = widths[STAGES - 1];

        let mut encoders = Vec::with_capacity(STAGES);
        let mut in_ch = self.in_channels;
        for &width in &widths {
            encoders.push(
                DownStageConfig::new(
                    DoubleConvConfig::new(in_ch, width).with_dropout(self.dropout),
                )
                .init(device),
            );
            in_ch = width;
        }

        let bottleneck = DoubleConvConfig::new(deepest, deepest * 2)
            .with_dropout(self.dropout)
            .init(device);

        let mut decoders = Vec::with_capacity(STAGES);
        let mut in_ch = deepest * 2;
        for &width in widths.iter().rev() {
            decoders.push(
                UpStageConfig::new(
                    in_ch,
                    width,
                    DoubleConvConfig::new(width * 2, width).with_dropout(self.dropout),
                )
                .init(device),
            );
            in_ch = width;
        }

        UNet {
            encoders,
            bottleneck,
            decoders,
            head: Conv2dConfig::new([self.base_channels, self.out_classes], [1, 1]).init(device),
        }
    }
}

/// Configuration for [`VegAnnModel`].
#[derive(Config, Debug)]
pub struct VegAnnModelConfig {
    pub arch: Arch,
    pub encoder: Encoder,
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 1)]
    pub out_classes: usize,
    #[config(default = "0.2")]
    pub dropout: f64,
}

impl VegAnnModelConfig {
    /// Builds the model, rejecting configurations the trainer cannot run.
    pub fn init<B: Backend>(&self, device: &B::Device) -> VegAnnResult<VegAnnModel<B>> {
        if self.arch != Arch::Unet {
            return Err(VegAnnError::UnsupportedArch {
                arch: self.arch.as_str().to_owned(),
            });
        }
        if self.in_channels != 3 {
            return Err(VegAnnError::InvalidConfiguration {
                reason: format!(
                    "expected 3 input channels to match the RGB preprocessing statistics, got {}",
                    self.in_channels
                ),
            });
        }
        if self.out_classes != 1 {
            return Err(VegAnnError::InvalidConfiguration {
                reason: format!(
                    "binary segmentation expects a single output class, got {}",
                    self.out_classes
                ),
            });
        }

        let unet = UNetConfig::new(self.in_channels, self.out_classes, self.encoder.base_channels())
            .with_dropout(self.dropout)
            .init(device);

        Ok(VegAnnModel {
            unet,
            preprocessing: Ignored(self.encoder.preprocessing_params()),
            loss: DiceLossConfig::new().init(),
        })
    }
}

/// Binary vegetation/ground segmentation model.
///
/// Accepts images in `[0, 1]`, normalizes them with the encoder's fixed
/// per-channel statistics, and returns raw logits of the same spatial size.
#[derive(Module, Debug)]
pub struct VegAnnModel<B: Backend> {
    unet: UNet<B>,
    pub(crate) preprocessing: Ignored<PreprocessingParams>,
    pub(crate) loss: DiceLoss<B>,
}

impl<B: Backend> VegAnnModel<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = images.device();
        let mean = Tensor::<B, 1>::from_floats(self.preprocessing.0.mean, &device)
            .reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(self.preprocessing.0.std, &device)
            .reshape([1, 3, 1, 1]);

        let x = (images - mean) / std;
        self.unet.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn config() -> VegAnnModelConfig {
        VegAnnModelConfig::new(Arch::Unet, Encoder::Small)
    }

    #[test]
    fn forward_keeps_spatial_size_with_one_logit_channel() {
        let device = Default::default();
        let model = config().init::<TestBackend>(&device).unwrap();

        let logits = model.forward(Tensor::zeros([2, 3, 32, 32], &device));

        assert_eq!(logits.dims(), [2, 1, 32, 32]);
    }

    #[test]
    fn unsupported_arch_is_rejected() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let result = VegAnnModelConfig::new(Arch::Fpn, Encoder::Small)
            .init::<TestBackend>(&device);

        assert!(matches!(result, Err(VegAnnError::UnsupportedArch { .. })));
    }

    #[test]
    fn non_rgb_input_is_rejected() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let result = VegAnnModelConfig::new(Arch::Unet, Encoder::Small)
            .with_in_channels(1)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(VegAnnError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn multiclass_output_is_rejected() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let result = VegAnnModelConfig::new(Arch::Unet, Encoder::Small)
            .with_out_classes(2)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(VegAnnError::InvalidConfiguration { .. })
        ));
    }
}
