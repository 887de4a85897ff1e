//! Region-of-interest mask helpers
//!
//! Masks are flattened binary `u8` buffers in Fortran order
//! (`index = x + y*nx + z*nx*ny`); wrap them with [`Mask::from_u8`](crate::volume::Mask::from_u8).

use crate::volume::{Region, Volume};

/// Binary mask that is 1 inside an axis-aligned box
///
/// Parts of the box beyond the grid are ignored.
pub fn create_box_mask(dims: (usize, usize, usize), region: &Region) -> Vec<u8> {
    let (nx, ny, nz) = dims;
    let mut mask = vec![0u8; nx * ny * nz];

    let x0 = region.start.0.min(nx);
    let x1 = (region.start.0 + region.size.0).min(nx);
    let y1 = (region.start.1 + region.size.1).min(ny);
    let z1 = (region.start.2 + region.size.2).min(nz);

    for k in region.start.2..z1 {
        for j in region.start.1..y1 {
            let row = j * nx + k * nx * ny;
            mask[row + x0..row + x1].fill(1);
        }
    }

    mask
}

/// Binary sphere mask: 1 where the voxel centre lies within `radius` voxels
/// of `center`
pub fn create_sphere_mask(
    dims: (usize, usize, usize),
    center: (f64, f64, f64),
    radius: f64,
) -> Vec<u8> {
    let (nx, ny, nz) = dims;
    let r2 = radius * radius;

    let mut mask = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        let dz = k as f64 - center.2;
        for j in 0..ny {
            let dy = j as f64 - center.1;
            for i in 0..nx {
                let dx = i as f64 - center.0;
                mask.push(u8::from(dx * dx + dy * dy + dz * dz <= r2));
            }
        }
    }
    mask
}

/// Binary mask of voxels at or above `threshold`
pub fn binarize(volume: &Volume, threshold: f64) -> Vec<u8> {
    volume.data().iter().map(|&v| u8::from(v >= threshold)).collect()
}
