//! NaN/Inf replacement for feature maps
//!
//! Degenerate windows (all bone, no bone, nothing in scope) leave NaN or
//! infinite values in a feature map. Each is replaced with the extreme of the
//! finite values seen in the same channel, which keeps colormaps usable:
//!
//! | channel      | NaN  | ±Inf |
//! |--------------|------|------|
//! | BVTV..TbSp   | min  | max  |
//! | BSBV         | max  | min  |
//!
//! Two passes: a parallel min/max reduction, then a parallel replacement.
//! A channel without any finite value falls back to 0 for both extremes.

use rayon::prelude::*;

use crate::feature_map::{Feature, FeatureMap, FEATURE_COUNT};

/// Running finite min/max per channel
#[derive(Debug, Clone, Copy)]
struct Extremes {
    min: [f64; FEATURE_COUNT],
    max: [f64; FEATURE_COUNT],
}

impl Extremes {
    fn empty() -> Self {
        Self {
            min: [f64::INFINITY; FEATURE_COUNT],
            max: [f64::NEG_INFINITY; FEATURE_COUNT],
        }
    }

    fn include(mut self, voxel: &[f64; FEATURE_COUNT]) -> Self {
        for c in 0..FEATURE_COUNT {
            let v = voxel[c];
            if v.is_finite() {
                self.min[c] = self.min[c].min(v);
                self.max[c] = self.max[c].max(v);
            }
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for c in 0..FEATURE_COUNT {
            self.min[c] = self.min[c].min(other.min[c]);
            self.max[c] = self.max[c].max(other.max[c]);
        }
        self
    }
}

/// Finite `(min, max)` of every channel; `(0, 0)` for a channel with no
/// finite values
pub fn channel_extremes(map: &FeatureMap) -> [(f64, f64); FEATURE_COUNT] {
    let ext = map
        .voxels()
        .par_iter()
        .fold(Extremes::empty, |acc, v| acc.include(v))
        .reduce(Extremes::empty, Extremes::merge);

    std::array::from_fn(|c| {
        if ext.min[c] <= ext.max[c] {
            (ext.min[c], ext.max[c])
        } else {
            (0.0, 0.0)
        }
    })
}

#[inline]
fn replacement(channel: usize, value: f64, (min, max): (f64, f64)) -> f64 {
    let inverted = channel == Feature::Bsbv.index();
    if value.is_nan() {
        if inverted { max } else { min }
    } else if value.is_infinite() {
        if inverted { min } else { max }
    } else {
        value
    }
}

/// Replace every non-finite entry in place; finite entries are untouched
pub fn repair_in_place(map: &mut FeatureMap) {
    let extremes = channel_extremes(map);

    map.voxels_mut().par_iter_mut().for_each(|voxel| {
        for (c, v) in voxel.iter_mut().enumerate() {
            *v = replacement(c, *v, extremes[c]);
        }
    });
}

/// Repaired copy of a feature map
pub fn repair(map: &FeatureMap) -> FeatureMap {
    let mut out = map.clone();
    repair_in_place(&mut out);
    out
}
