//! Building blocks for the segmentation decoder/encoder.

use burn::{
    nn::{
        Dropout, DropoutConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

/// Two 3x3 same-padded convolutions with ReLU and dropout in between.
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    activation: Relu,
    dropout: Dropout,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);
        let x = self.conv2.forward(x);

        self.activation.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct DoubleConvConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "0.2")]
    dropout: f64,
}

impl DoubleConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoubleConv<B> {
        DoubleConv {
            conv1: Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([self.out_channels, self.out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Encoder stage: convolutions followed by a 2x downsampling pool.
///
/// Returns the pooled features plus the pre-pool features for the skip
/// connection to the matching decoder stage.
#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    conv: DoubleConv<B>,
    pool: MaxPool2d,
}

impl<B: Backend> DownStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let skip = self.conv.forward(x);
        let x = self.pool.forward(skip.clone());

        (x, skip)
    }
}

#[derive(Config, Debug)]
pub struct DownStageConfig {
    conv: DoubleConvConfig,
}

impl DownStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DownStage<B> {
        DownStage {
            conv: self.conv.init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

/// Decoder stage: 2x transposed-conv upsampling, skip concatenation,
/// then convolutions.
#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    upsample: ConvTranspose2d<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> UpStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.upsample.forward(x);
        let x = Tensor::cat(vec![x, skip], 1);

        self.conv.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct UpStageConfig {
    in_channels: usize,
    out_channels: usize,
    conv: DoubleConvConfig,
}

impl UpStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UpStage<B> {
        UpStage {
            upsample: ConvTranspose2dConfig::new([self.in_channels, self.out_channels], [2, 2])
                .with_stride([2, 2])
                .init(device),
            conv: self.conv.init(device),
        }
    }
}
