//! Five-channel feature map produced by the local scanner
//!
//! One `[BVTV, TbN, TbTh, TbSp, BSBV]` tuple per voxel, in the same Fortran
//! order and extent as the source volume.

use crate::error::MorphometryError;

/// Number of channels in a feature map
pub const FEATURE_COUNT: usize = 5;

/// Feature-map channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Bvtv = 0,
    Tbn = 1,
    Tbth = 2,
    Tbsp = 3,
    Bsbv = 4,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] =
        [Feature::Bvtv, Feature::Tbn, Feature::Tbth, Feature::Tbsp, Feature::Bsbv];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Feature::Bvtv => "BVTV",
            Feature::Tbn => "TbN",
            Feature::Tbth => "TbTh",
            Feature::Tbsp => "TbSp",
            Feature::Bsbv => "BSBV",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    voxels: Vec<[f64; FEATURE_COUNT]>,
    dims: (usize, usize, usize),
}

impl FeatureMap {
    pub fn new(
        voxels: Vec<[f64; FEATURE_COUNT]>,
        dims: (usize, usize, usize),
    ) -> Result<Self, MorphometryError> {
        let expected = dims.0 * dims.1 * dims.2;
        if voxels.len() != expected {
            return Err(MorphometryError::SizeMismatch { expected, actual: voxels.len() });
        }
        Ok(Self { voxels, dims })
    }

    /// All-zero map
    pub fn zeros(dims: (usize, usize, usize)) -> Self {
        Self { voxels: vec![[0.0; FEATURE_COUNT]; dims.0 * dims.1 * dims.2], dims }
    }

    /// Build from channel-major planes (`channels[c][voxel]`)
    pub fn from_channels(
        channels: &[Vec<f64>],
        dims: (usize, usize, usize),
    ) -> Result<Self, MorphometryError> {
        if channels.len() != FEATURE_COUNT {
            return Err(MorphometryError::SizeMismatch {
                expected: FEATURE_COUNT,
                actual: channels.len(),
            });
        }
        let n = dims.0 * dims.1 * dims.2;
        for channel in channels {
            if channel.len() != n {
                return Err(MorphometryError::SizeMismatch { expected: n, actual: channel.len() });
            }
        }
        let voxels = (0..n)
            .map(|v| std::array::from_fn(|c| channels[c][v]))
            .collect();
        Ok(Self { voxels, dims })
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn voxels(&self) -> &[[f64; FEATURE_COUNT]] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [[f64; FEATURE_COUNT]] {
        &mut self.voxels
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<[f64; FEATURE_COUNT]> {
        let (nx, ny, nz) = self.dims;
        if i >= nx || j >= ny || k >= nz {
            return None;
        }
        Some(self.voxels[i + j * nx + k * nx * ny])
    }

    /// Copy one channel out as a flat volume
    pub fn channel(&self, feature: Feature) -> Vec<f64> {
        let c = feature.index();
        self.voxels.iter().map(|v| v[c]).collect()
    }

    /// Count of NaN or infinite entries across all channels
    pub fn count_non_finite(&self) -> usize {
        self.voxels
            .iter()
            .flat_map(|v| v.iter())
            .filter(|x| !x.is_finite())
            .count()
    }
}
