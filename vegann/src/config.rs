//! Architecture and encoder identifiers plus the normalization statistics
//! tied to each encoder.

use burn::prelude::*;

/// Spatial downsampling applied by the encoder: five stages of factor 2.
///
/// Input height and width must both be divisible by this value, otherwise the
/// skip connections between encoder and decoder stages cannot be concatenated.
pub const DOWNSAMPLE_FACTOR: usize = 32;

/// Segmentation decoder architecture.
///
/// Only [`Arch::Unet`] has a built-in decoder; the remaining identifiers are
/// accepted so configurations naming them fail with a typed error instead of
/// silently building the wrong model.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Arch {
    Unet,
    UnetPlusPlus,
    Fpn,
}

impl Arch {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unet => "unet",
            Self::UnetPlusPlus => "unetplusplus",
            Self::Fpn => "fpn",
        }
    }
}

/// Encoder selection. Variants fix the base channel width of the five-stage
/// convolutional encoder and carry the normalization statistics the encoder
/// expects on its input.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Encoder {
    Small,
    Base,
    Wide,
}

impl Encoder {
    /// Channel width of the first encoder stage; later stages double it.
    pub const fn base_channels(&self) -> usize {
        match self {
            Self::Small => 16,
            Self::Base => 32,
            Self::Wide => 64,
        }
    }

    /// Total spatial downsampling of the encoder.
    pub const fn downsample_factor(&self) -> usize {
        DOWNSAMPLE_FACTOR
    }

    /// Per-channel mean/std the encoder expects its input normalized with.
    pub const fn preprocessing_params(&self) -> PreprocessingParams {
        match self {
            Self::Small | Self::Base | Self::Wide => PreprocessingParams::imagenet(),
        }
    }
}

/// Per-channel input normalization statistics, RGB order.
///
/// Plain configuration data attached to the model for its whole lifetime;
/// never a trainable parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingParams {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl PreprocessingParams {
    /// The ImageNet statistics shared by all built-in encoders.
    pub const fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_widths_double_from_small_to_wide() {
        assert_eq!(Encoder::Small.base_channels(), 16);
        assert_eq!(Encoder::Base.base_channels(), 32);
        assert_eq!(Encoder::Wide.base_channels(), 64);
    }

    #[test]
    fn preprocessing_params_are_imagenet_statistics() {
        let params = Encoder::Base.preprocessing_params();
        assert_eq!(params.mean, [0.485, 0.456, 0.406]);
        assert_eq!(params.std, [0.229, 0.224, 0.225]);
    }

    #[test]
    fn arch_identifiers_roundtrip_to_lowercase_names() {
        assert_eq!(Arch::Unet.as_str(), "unet");
        assert_eq!(Arch::Fpn.as_str(), "fpn");
    }
}
