//! Dataset adapter for vegetation/ground segmentation.
//!
//! Wraps any dataset that yields raw image/mask pairs and turns each item
//! into a fixed-shape numeric record: channel-first float image scaled to
//! [0, 1] and an integer mask with an explicit singleton class dimension.
//! Mask values are passed through untouched so labeling mistakes (a 0-255
//! mask instead of a 0-1 one) surface at step time instead of being papered
//! over here.

use std::marker::PhantomData;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use image::{GrayImage, RgbImage};

use crate::augmentation::PairedTransform;

/// A single raw item as the underlying dataset provides it.
#[derive(Debug, Clone)]
pub struct RawSegItem {
    /// RGB image, HxWx3, 8-bit.
    pub image: RgbImage,
    /// Class mask, HxW, values expected in {0, 1}.
    pub mask: GrayImage,
}

/// One preprocessed record, ready for batching.
#[derive(Debug, Clone)]
pub struct SegRecord {
    /// Index of the item in the underlying dataset.
    pub id: usize,
    /// Channel-first image data, [3, H, W], values in [0, 1].
    pub image: Vec<f32>,
    /// Mask data with leading singleton class dimension, [1, H, W].
    pub mask: Vec<i64>,
    pub height: usize,
    pub width: usize,
}

/// Adapter from raw image/mask items to [`SegRecord`]s.
///
/// An optional paired transform runs before conversion; it receives image and
/// mask together so both see the same spatial perturbation.
pub struct VegAnnDataset<D> {
    inner: D,
    transform: Option<Box<dyn PairedTransform>>,
}

impl<D> VegAnnDataset<D>
where
    D: Dataset<RawSegItem>,
{
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            transform: None,
        }
    }

    pub fn with_transform(inner: D, transform: Box<dyn PairedTransform>) -> Self {
        Self {
            inner,
            transform: Some(transform),
        }
    }

    fn image_to_chw(image: &RgbImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);
        let plane = height * width;

        let mut data = vec![0.0_f32; 3 * plane];
        for (x, y, pixel) in image.enumerate_pixels() {
            let idx = y as usize * width + x as usize;
            for c in 0..3 {
                data[c * plane + idx] = f32::from(pixel.0[c]) / 255.0;
            }
        }
        data
    }

    fn mask_to_class_plane(mask: &GrayImage) -> Vec<i64> {
        mask.as_raw().iter().map(|&v| i64::from(v)).collect()
    }
}

impl<D> Dataset<SegRecord> for VegAnnDataset<D>
where
    D: Dataset<RawSegItem>,
{
    fn get(&self, index: usize) -> Option<SegRecord> {
        let item = self.inner.get(index)?;

        let (image, mask) = match &self.transform {
            Some(transform) => transform.apply(item.image, item.mask),
            None => (item.image, item.mask),
        };

        let (width, height) = image.dimensions();

        Some(SegRecord {
            id: index,
            image: Self::image_to_chw(&image),
            mask: Self::mask_to_class_plane(&mask),
            height: height as usize,
            width: width as usize,
        })
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// A batch of records stacked along the leading dimension.
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    /// Images, [N, 3, H, W], values in [0, 1].
    pub images: Tensor<B, 4>,
    /// Masks, [N, 1, H, W].
    pub masks: Tensor<B, 4, Int>,
    /// Underlying dataset indices, one per record.
    pub ids: Vec<usize>,
}

/// Batcher converting vectors of [`SegRecord`] into a [`SegBatch`].
#[derive(Clone, Default)]
pub struct SegBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> SegBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegRecord, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegRecord>, device: &B::Device) -> SegBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);
        let mut ids = Vec::with_capacity(batch_size);

        for item in items {
            let image = Tensor::<B, 3>::from_data(
                TensorData::new(item.image, [3, item.height, item.width]),
                device,
            );
            let mask = Tensor::<B, 3, Int>::from_data(
                TensorData::new(item.mask, [1, item.height, item.width]),
                device,
            );

            images.push(image);
            masks.push(mask);
            ids.push(item.id);
        }

        SegBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack(masks, 0),
            ids,
        }
    }
}
