//! Bone-Morphometry: trabecular bone metrics from 3D intensity volumes
//!
//! This crate computes the classic plate-model morphometry metrics of
//! trabecular bone from CT-like volumes, for a whole region or as dense
//! per-voxel feature maps.
//!
//! # Metrics
//! - BV/TV: bone volume fraction
//! - Tb.N: trabecular number
//! - Tb.Th: trabecular thickness
//! - Tb.Sp: trabecular separation
//! - BS/BV: bone surface to volume ratio
//!
//! # Modules
//! - `volume`: image and mask containers, neighbour access with constant boundary
//! - `morphometry`: global scan, sliding-window scan, NaN/Inf repair
//! - `feature_map`: five-channel per-voxel output
//! - `cache`: memoised feature maps keyed on input identity
//! - `nifti_io`: NIfTI-1 reading and writing
//! - `utils`: ROI mask builders
//!
//! # Example
//! ```
//! use bone_morphometry::{compute_global, MorphometryParams, NoMask, Volume};
//!
//! let vol = Volume::from_fn((10, 10, 10), (1.0, 1.0, 1.0), |i, _, _| {
//!     if i < 5 { 2000.0 } else { 0.0 }
//! })
//! .unwrap();
//! let result = compute_global(&vol, NoMask, &MorphometryParams::new(1000.0)).unwrap();
//! assert_eq!(result.bvtv, 0.5);
//! ```

// Core modules
pub mod error;
pub mod volume;
pub mod feature_map;

// Algorithm modules
pub mod morphometry;
pub mod cache;
pub mod utils;

// I/O modules
pub mod nifti_io;

pub use cache::MorphometryCache;
pub use error::MorphometryError;
pub use feature_map::{Feature, FeatureMap, FEATURE_COUNT};
pub use morphometry::{
    compute_global, compute_global_partitioned, compute_local, compute_local_with_progress,
    repair, repair_in_place, Direction, GlobalResult, LocalMorphometryParams, MorphometryParams,
    TransitionCounts,
};
pub use volume::{Mask, MaskAccess, NoMask, Region, Volume, VolumeAccess};
