//! Visualization helper blending class colors over an image.

use image::{GrayImage, Rgb32FImage};

use crate::error::{VegAnnError, VegAnnResult};

/// Overlay color for ground pixels (label 0), in 0-255 scale.
pub const GROUND_RGB: [f32; 3] = [97.0, 65.0, 38.0];
/// Overlay color for vegetation pixels (label 1), in 0-255 scale.
pub const VEGETATION_RGB: [f32; 3] = [34.0, 139.0, 34.0];

/// Blends class colors into an image according to a label map.
///
/// Ground pixels blend toward brown with `alpha_ground`, vegetation pixels
/// toward green with `alpha_vegetation`; any other label leaves the pixel
/// untouched. The input image uses the 0-255 float scale and is not
/// modified; the blended copy is returned.
pub fn color_transform_veg_ground(
    image: &Rgb32FImage,
    labels: &GrayImage,
    alpha_ground: f32,
    alpha_vegetation: f32,
) -> VegAnnResult<Rgb32FImage> {
    if image.dimensions() != labels.dimensions() {
        let (image_width, image_height) = image.dimensions();
        let (label_width, label_height) = labels.dimensions();
        return Err(VegAnnError::DimensionMismatch {
            image_width,
            image_height,
            label_width,
            label_height,
        });
    }

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (color, alpha) = match labels.get_pixel(x, y).0[0] {
            0 => (GROUND_RGB, alpha_ground),
            1 => (VEGETATION_RGB, alpha_vegetation),
            _ => continue,
        };
        for c in 0..3 {
            pixel.0[c] = pixel.0[c] * (1.0 - alpha) + alpha * color[c];
        }
    }

    Ok(out)
}
