//! Paired image/mask augmentation.
//!
//! Every transform receives the image and its mask together and must apply
//! the identical spatial perturbation to both, otherwise the pixel labels no
//! longer line up with the pixels they describe. That joint application is
//! the whole contract of [`PairedTransform`]; photometric changes are free to
//! touch the image alone.

use image::{imageops, imageops::FilterType, GrayImage, RgbImage};
use rand::Rng;

/// A spatially consistent transform over an (image, mask) pair.
pub trait PairedTransform: Send + Sync {
    fn apply(&self, image: RgbImage, mask: GrayImage) -> (RgbImage, GrayImage);
}

/// Mirrors image and mask around the vertical axis with the given probability.
#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    pub probability: f64,
}

impl PairedTransform for HorizontalFlip {
    fn apply(&self, image: RgbImage, mask: GrayImage) -> (RgbImage, GrayImage) {
        let mut rng = rand::rng();
        if rng.random_bool(self.probability) {
            (imageops::flip_horizontal(&image), imageops::flip_horizontal(&mask))
        } else {
            (image, mask)
        }
    }
}

/// Crops a random window out of image and mask, keeping at least
/// `1 - 2 * border_fraction` of each side.
#[derive(Debug, Clone)]
pub struct RandomCrop {
    pub border_fraction: f32,
}

impl PairedTransform for RandomCrop {
    fn apply(&self, image: RgbImage, mask: GrayImage) -> (RgbImage, GrayImage) {
        let mut rng = rand::rng();
        let (width, height) = image.dimensions();

        let border_x = (width as f32 * self.border_fraction) as u32;
        let border_y = (height as f32 * self.border_fraction) as u32;
        if 2 * border_x >= width || 2 * border_y >= height {
            return (image, mask);
        }

        let crop_width = rng.random_range(width - 2 * border_x..=width);
        let crop_height = rng.random_range(height - 2 * border_y..=height);

        let max_x = width - crop_width;
        let max_y = height - crop_height;
        let x = if max_x > 0 { rng.random_range(0..max_x) } else { 0 };
        let y = if max_y > 0 { rng.random_range(0..max_y) } else { 0 };

        let image = imageops::crop_imm(&image, x, y, crop_width, crop_height).to_image();
        let mask = imageops::crop_imm(&mask, x, y, crop_width, crop_height).to_image();

        (image, mask)
    }
}

/// Resizes both members of the pair to a fixed size.
///
/// The image is resampled with Lanczos3; the mask with nearest neighbor so
/// its values stay within the original label set.
#[derive(Debug, Clone)]
pub struct PairedResize {
    pub width: u32,
    pub height: u32,
}

impl PairedTransform for PairedResize {
    fn apply(&self, image: RgbImage, mask: GrayImage) -> (RgbImage, GrayImage) {
        let image = imageops::resize(&image, self.width, self.height, FilterType::Lanczos3);
        let mask = imageops::resize(&mask, self.width, self.height, FilterType::Nearest);
        (image, mask)
    }
}

/// Applies a sequence of paired transforms in order.
pub struct Compose(pub Vec<Box<dyn PairedTransform>>);

impl PairedTransform for Compose {
    fn apply(&self, image: RgbImage, mask: GrayImage) -> (RgbImage, GrayImage) {
        self.0
            .iter()
            .fold((image, mask), |(image, mask), transform| {
                transform.apply(image, mask)
            })
    }
}
