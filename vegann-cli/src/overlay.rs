//! Overlay subcommand: blends class colors over an image and writes a PNG.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb32FImage, RgbImage};
use tracing::info;
use vegann_burn::color_transform_veg_ground;

use crate::dataset::binarize_mask;

/// Settings for one overlay render.
#[derive(Debug, Clone)]
pub struct OverlayArgs {
    pub alpha_ground: f32,
    pub alpha_vegetation: f32,
}

/// Reads an image and a label mask, blends the class colors, and saves the
/// result as PNG.
pub fn run_overlay(
    image_path: impl AsRef<Path>,
    mask_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    args: &OverlayArgs,
) -> Result<()> {
    let image_path = image_path.as_ref();
    let mask_path = mask_path.as_ref();
    let output_path = output_path.as_ref();

    let image = image::open(image_path)
        .with_context(|| format!("cannot open image {}", image_path.display()))?
        .to_rgb8();
    let labels = binarize_mask(
        image::open(mask_path)
            .with_context(|| format!("cannot open mask {}", mask_path.display()))?
            .to_luma8(),
    );

    let blended = color_transform_veg_ground(
        &to_float_255(&image),
        &labels,
        args.alpha_ground,
        args.alpha_vegetation,
    )?;

    to_u8(&blended)
        .save(output_path)
        .with_context(|| format!("cannot write {}", output_path.display()))?;

    info!(output = %output_path.display(), "overlay written");
    Ok(())
}

/// Converts an 8-bit image to floats on the 0-255 scale.
fn to_float_255(image: &RgbImage) -> Rgb32FImage {
    let (width, height) = image.dimensions();
    Rgb32FImage::from_fn(width, height, |x, y| {
        let p = image.get_pixel(x, y).0;
        image::Rgb([f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
    })
}

fn to_u8(image: &Rgb32FImage) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let p = image.get_pixel(x, y).0;
        image::Rgb([
            p[0].round().clamp(0.0, 255.0) as u8,
            p[1].round().clamp(0.0, 255.0) as u8,
            p[2].round().clamp(0.0, 255.0) as u8,
        ])
    })
}

#[cfg(test)]
mod tests {
    use vegann_burn::GROUND_RGB;

    use super::*;

    #[test]
    fn float_conversion_keeps_the_255_scale() {
        let image = RgbImage::from_pixel(1, 1, image::Rgb([97, 65, 38]));

        let float = to_float_255(&image);

        assert_eq!(float.get_pixel(0, 0).0, GROUND_RGB);
    }

    #[test]
    fn u8_conversion_rounds_and_clamps() {
        let float = Rgb32FImage::from_pixel(1, 1, image::Rgb([117.4, 300.0, -4.0]));

        let out = to_u8(&float);

        assert_eq!(out.get_pixel(0, 0).0, [117, 255, 0]);
    }
}
