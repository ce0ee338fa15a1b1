//! Command-line training and visualization for vegetation/ground
//! segmentation.

pub mod backend;
pub mod dataset;
pub mod overlay;
pub mod training;
