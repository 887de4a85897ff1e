//! Volume and mask accessors
//!
//! Voxel data is stored flattened in Fortran order (x varies fastest) to
//! match the NIfTI convention: `index = i + j*nx + k*nx*ny`.
//!
//! Reads outside the grid use constant extension: a [`Volume`] returns its
//! boundary value (0 by default) for any location outside its extent. A
//! [`Mask`] instead reports `None` outside its own extent, which the scanners
//! treat as masked out.

use crate::error::MorphometryError;

/// Read access to a 3D intensity grid
pub trait VolumeAccess: Sync {
    /// Voxel counts (nx, ny, nz)
    fn extent(&self) -> (usize, usize, usize);

    /// Physical voxel size (sx, sy, sz)
    fn spacing(&self) -> (f64, f64, f64);

    /// Intensity at a voxel location, with constant extension outside the grid
    fn intensity_at(&self, i: isize, j: isize, k: isize) -> f64;
}

/// Read access to a region-of-interest mask
///
/// A location is in scope iff the mask value there exists and is nonzero.
pub trait MaskAccess: Sync {
    /// Mask value at a location, `None` outside the mask's own extent
    fn mask_value_at(&self, i: isize, j: isize, k: isize) -> Option<f64>;

    fn is_in_scope(&self, i: isize, j: isize, k: isize) -> bool {
        matches!(self.mask_value_at(i, j, k), Some(v) if v != 0.0)
    }
}

/// Absent mask: every location, inside the grid or not, is in scope
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMask;

impl MaskAccess for NoMask {
    #[inline]
    fn mask_value_at(&self, _i: isize, _j: isize, _k: isize) -> Option<f64> {
        Some(1.0)
    }
}

impl<M: MaskAccess + ?Sized> MaskAccess for &M {
    #[inline]
    fn mask_value_at(&self, i: isize, j: isize, k: isize) -> Option<f64> {
        (**self).mask_value_at(i, j, k)
    }
}

impl<M: MaskAccess> MaskAccess for Option<M> {
    #[inline]
    fn mask_value_at(&self, i: isize, j: isize, k: isize) -> Option<f64> {
        match self {
            Some(mask) => mask.mask_value_at(i, j, k),
            None => Some(1.0),
        }
    }
}

/// Axis-aligned box of voxels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: (usize, usize, usize),
    pub size: (usize, usize, usize),
}

impl Region {
    pub fn new(start: (usize, usize, usize), size: (usize, usize, usize)) -> Self {
        Self { start, size }
    }

    pub fn contains(&self, i: usize, j: usize, k: usize) -> bool {
        i >= self.start.0 && i < self.start.0 + self.size.0
            && j >= self.start.1 && j < self.start.1 + self.size.1
            && k >= self.start.2 && k < self.start.2 + self.size.2
    }

    /// True if the region lies entirely inside a grid of the given extent
    pub fn fits_in(&self, dims: (usize, usize, usize)) -> bool {
        self.start.0 + self.size.0 <= dims.0
            && self.start.1 + self.size.1 <= dims.1
            && self.start.2 + self.size.2 <= dims.2
    }
}

/// Check extent and spacing before any scan starts
pub fn validate_geometry(
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
) -> Result<(), MorphometryError> {
    if dims.0 == 0 || dims.1 == 0 || dims.2 == 0 {
        return Err(MorphometryError::EmptyExtent { dims });
    }
    let (sx, sy, sz) = voxel_size;
    let ok = |s: f64| s.is_finite() && s > 0.0;
    if !(ok(sx) && ok(sy) && ok(sz)) {
        return Err(MorphometryError::InvalidSpacing { spacing: voxel_size });
    }
    Ok(())
}

#[inline]
fn linear_index(dims: (usize, usize, usize), i: isize, j: isize, k: isize) -> Option<usize> {
    let (nx, ny, nz) = dims;
    if i < 0 || j < 0 || k < 0 {
        return None;
    }
    let (i, j, k) = (i as usize, j as usize, k as usize);
    if i >= nx || j >= ny || k >= nz {
        return None;
    }
    Some(i + j * nx + k * nx * ny)
}

/// In-memory intensity volume
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Vec<f64>,
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    boundary_value: f64,
}

impl Volume {
    /// Wrap a flattened Fortran-order buffer
    ///
    /// Fails if the buffer length does not match `nx*ny*nz`, an axis is empty,
    /// or a spacing component is not a finite positive number.
    pub fn new(
        data: Vec<f64>,
        dims: (usize, usize, usize),
        voxel_size: (f64, f64, f64),
    ) -> Result<Self, MorphometryError> {
        validate_geometry(dims, voxel_size)?;
        let expected = dims.0 * dims.1 * dims.2;
        if data.len() != expected {
            return Err(MorphometryError::SizeMismatch { expected, actual: data.len() });
        }
        Ok(Self { data, dims, voxel_size, boundary_value: 0.0 })
    }

    /// Build a volume by evaluating `f(i, j, k)` at every voxel
    pub fn from_fn<F>(
        dims: (usize, usize, usize),
        voxel_size: (f64, f64, f64),
        f: F,
    ) -> Result<Self, MorphometryError>
    where
        F: Fn(usize, usize, usize) -> f64,
    {
        let (nx, ny, nz) = dims;
        let mut data = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(f(i, j, k));
                }
            }
        }
        Self::new(data, dims, voxel_size)
    }

    /// Set the constant returned for reads outside the grid
    pub fn with_boundary_value(mut self, value: f64) -> Self {
        self.boundary_value = value;
        self
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    pub fn voxel_size(&self) -> (f64, f64, f64) {
        self.voxel_size
    }

    pub fn boundary_value(&self) -> f64 {
        self.boundary_value
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        linear_index(self.dims, i as isize, j as isize, k as isize).map(|idx| self.data[idx])
    }

    /// Copy a sub-box into a new volume with the same spacing and boundary value
    pub fn crop(&self, region: &Region) -> Result<Self, MorphometryError> {
        if !region.fits_in(self.dims) {
            return Err(MorphometryError::SizeMismatch {
                expected: self.len(),
                actual: region.size.0 * region.size.1 * region.size.2,
            });
        }
        let (x0, y0, z0) = region.start;
        let cropped = Self::from_fn(region.size, self.voxel_size, |i, j, k| {
            let idx = (x0 + i) + (y0 + j) * self.dims.0 + (z0 + k) * self.dims.0 * self.dims.1;
            self.data[idx]
        })?;
        Ok(cropped.with_boundary_value(self.boundary_value))
    }
}

impl VolumeAccess for Volume {
    fn extent(&self) -> (usize, usize, usize) {
        self.dims
    }

    fn spacing(&self) -> (f64, f64, f64) {
        self.voxel_size
    }

    #[inline]
    fn intensity_at(&self, i: isize, j: isize, k: isize) -> f64 {
        match linear_index(self.dims, i, j, k) {
            Some(idx) => self.data[idx],
            None => self.boundary_value,
        }
    }
}

/// Region-of-interest mask; nonzero voxels are in scope
///
/// The extent need not match the volume's. Locations outside the mask's own
/// extent are out of scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Vec<f64>,
    dims: (usize, usize, usize),
}

impl Mask {
    pub fn new(data: Vec<f64>, dims: (usize, usize, usize)) -> Result<Self, MorphometryError> {
        if dims.0 == 0 || dims.1 == 0 || dims.2 == 0 {
            return Err(MorphometryError::EmptyExtent { dims });
        }
        let expected = dims.0 * dims.1 * dims.2;
        if data.len() != expected {
            return Err(MorphometryError::SizeMismatch { expected, actual: data.len() });
        }
        Ok(Self { data, dims })
    }

    /// Build from a binary `u8` mask (the layout the mask helpers produce)
    pub fn from_u8(mask: &[u8], dims: (usize, usize, usize)) -> Result<Self, MorphometryError> {
        Self::new(mask.iter().map(|&m| m as f64).collect(), dims)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    /// Number of nonzero voxels
    pub fn count_in_scope(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }
}

impl MaskAccess for Mask {
    #[inline]
    fn mask_value_at(&self, i: isize, j: isize, k: isize) -> Option<f64> {
        linear_index(self.dims, i, j, k).map(|idx| self.data[idx])
    }
}
