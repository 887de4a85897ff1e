//! Bone morphometry scanners
//!
//! - `global`: single-pass face counting over the whole volume, partitioned
//!   across worker threads and reduced into one [`GlobalResult`]
//! - `local`: the same counting over a sliding window around every voxel,
//!   producing a five-channel [`FeatureMap`](crate::feature_map::FeatureMap)
//! - `repair`: replaces NaN/Inf entries of a feature map with per-channel
//!   finite extremes
//!
//! A voxel is bone iff its intensity is `>= threshold`.

pub mod counts;
pub mod global;
pub mod local;
pub mod repair;

pub use counts::{Direction, GlobalResult, TransitionCounts};
pub use global::{compute_global, compute_global_partitioned, scan_partition};
pub use local::{compute_local, compute_local_with_progress, scan_window};
pub use repair::{channel_extremes, repair, repair_in_place};

use crate::error::MorphometryError;

/// Parameters for whole-volume morphometry
#[derive(Clone, Debug, PartialEq)]
pub struct MorphometryParams {
    /// Intensity at or above which a voxel is bone (default 1)
    pub threshold: f64,
}

impl Default for MorphometryParams {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl MorphometryParams {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn validate(&self) -> Result<(), MorphometryError> {
        validate_threshold(self.threshold)
    }
}

/// Parameters for sliding-window feature maps
#[derive(Clone, Debug, PartialEq)]
pub struct LocalMorphometryParams {
    /// Intensity at or above which a voxel is bone (default 1)
    pub threshold: f64,
    /// Window half-size per axis in voxels (default 2, i.e. 5x5x5)
    pub radius: [usize; 3],
}

impl Default for LocalMorphometryParams {
    fn default() -> Self {
        Self { threshold: 1.0, radius: [2, 2, 2] }
    }
}

impl LocalMorphometryParams {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, ..Default::default() }
    }

    /// Isotropic window radius
    pub fn with_radius(mut self, radius: usize) -> Self {
        self.radius = [radius; 3];
        self
    }

    pub fn with_radius_xyz(mut self, radius: [usize; 3]) -> Self {
        self.radius = radius;
        self
    }

    /// Number of offsets visited per output voxel, saturating at `usize::MAX`
    pub fn window_len(&self) -> usize {
        self.radius
            .iter()
            .map(|&r| r.saturating_mul(2).saturating_add(1))
            .fold(1usize, |acc, w| acc.saturating_mul(w))
    }

    pub fn validate(&self) -> Result<(), MorphometryError> {
        validate_threshold(self.threshold)?;
        match signed_radius(self.radius) {
            Some(_) => Ok(()),
            None => Err(MorphometryError::InvalidRadius(self.radius)),
        }
    }
}

/// Radius as signed offsets, `None` unless `2r + 1` fits in `isize` on every axis
pub(crate) fn signed_radius(radius: [usize; 3]) -> Option<[isize; 3]> {
    let mut out = [0isize; 3];
    for (o, &r) in out.iter_mut().zip(radius.iter()) {
        let r = isize::try_from(r).ok()?;
        r.checked_mul(2)?.checked_add(1)?;
        *o = r;
    }
    Some(out)
}

fn validate_threshold(threshold: f64) -> Result<(), MorphometryError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(MorphometryError::InvalidThreshold(threshold))
    }
}
