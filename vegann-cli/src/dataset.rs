//! On-disk dataset layout: `<root>/images/*` paired with `<root>/masks/*`.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use burn::data::dataset::Dataset;
use image::GrayImage;
use tracing::warn;
use vegann_burn::RawSegItem;

/// Mask values above this are treated as vegetation.
const MASK_THRESHOLD: u8 = 127;

/// Dataset reading image/mask pairs from a directory tree.
///
/// Pairs are matched by file stem, so `images/plot_01.jpg` goes with
/// `masks/plot_01.png`. Images without a matching mask are rejected at
/// construction; decoding happens lazily in [`Dataset::get`].
pub struct VegDirDataset {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl VegDirDataset {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let images = index_by_stem(&root.join("images"))?;
        let masks = index_by_stem(&root.join("masks"))?;

        let mut pairs = Vec::with_capacity(images.len());
        for (stem, image_path) in images {
            match masks.get(&stem) {
                Some(mask_path) => pairs.push((image_path, mask_path.clone())),
                None => bail!("no mask found for image {}", image_path.display()),
            }
        }

        if pairs.is_empty() {
            bail!("no image/mask pairs found under {}", root.display());
        }

        Ok(Self { pairs })
    }

    pub fn pair_paths(&self, index: usize) -> Option<&(PathBuf, PathBuf)> {
        self.pairs.get(index)
    }
}

fn index_by_stem(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("cannot read directory {}", dir.display()))?;

    let mut index = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(previous) = index.insert(stem.to_owned(), path.clone()) {
            bail!(
                "ambiguous stem {stem:?}: {} and {}",
                previous.display(),
                path.display()
            );
        }
    }
    Ok(index)
}

/// Clamps a grayscale mask to binary labels.
pub fn binarize_mask(mask: GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        image::Luma([u8::from(mask.get_pixel(x, y).0[0] > MASK_THRESHOLD)])
    })
}

impl Dataset<RawSegItem> for VegDirDataset {
    fn get(&self, index: usize) -> Option<RawSegItem> {
        let (image_path, mask_path) = self.pairs.get(index)?;

        let image = match image::open(image_path) {
            Ok(image) => image.to_rgb8(),
            Err(error) => {
                warn!(path = %image_path.display(), %error, "failed to decode image");
                return None;
            }
        };
        let mask = match image::open(mask_path) {
            Ok(mask) => binarize_mask(mask.to_luma8()),
            Err(error) => {
                warn!(path = %mask_path.display(), %error, "failed to decode mask");
                return None;
            }
        };

        Some(RawSegItem { image, mask })
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn binarize_maps_around_the_threshold() {
        let mask = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 127, 128, 255][x as usize]]));

        let binary = binarize_mask(mask);

        let values: Vec<u8> = binary.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 0, 1, 1]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let result = VegDirDataset::new("/definitely/not/here");

        assert!(result.is_err());
    }
}
