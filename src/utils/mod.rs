//! Utility helpers

pub mod mask;

pub use mask::{binarize, create_box_mask, create_sphere_mask};
