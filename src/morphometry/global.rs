//! Whole-volume morphometry
//!
//! The voxel index range is cut into contiguous partitions. Each partition is
//! scanned on a rayon worker into its own [`TransitionCounts`]; the partial
//! counts are summed after all workers have joined. No state is shared while
//! scanning.

use std::ops::Range;

use rayon::prelude::*;

use super::counts::{Direction, GlobalResult, TransitionCounts};
use super::MorphometryParams;
use crate::error::MorphometryError;
use crate::volume::{validate_geometry, MaskAccess, VolumeAccess};

/// Partitions handed to each rayon worker by [`compute_global`]
const PARTITIONS_PER_THREAD: usize = 4;

/// Count in-scope voxels, bone voxels and bone-to-void faces over a range of
/// linear (Fortran order) voxel indices
///
/// Out-of-scope voxels are skipped entirely. Neighbours outside the grid read
/// the volume's boundary value.
pub fn scan_partition<V, M>(
    volume: &V,
    mask: &M,
    threshold: f64,
    range: Range<usize>,
) -> TransitionCounts
where
    V: VolumeAccess + ?Sized,
    M: MaskAccess + ?Sized,
{
    let (nx, ny, _) = volume.extent();
    let slice = nx * ny;
    let mut counts = TransitionCounts::default();

    for idx in range {
        let i = (idx % nx) as isize;
        let j = ((idx / nx) % ny) as isize;
        let k = (idx / slice) as isize;

        if !mask.is_in_scope(i, j, k) {
            continue;
        }
        counts.in_scope += 1;

        if volume.intensity_at(i, j, k) < threshold {
            continue;
        }
        counts.bone += 1;

        for direction in Direction::ALL {
            let (di, dj, dk) = direction.neighbor_offset();
            if volume.intensity_at(i + di, j + dj, k + dk) < threshold {
                counts.record_face(direction);
            }
        }
    }

    counts
}

/// Global morphometry with a partition count chosen from the rayon pool size
pub fn compute_global<V, M>(
    volume: &V,
    mask: M,
    params: &MorphometryParams,
) -> Result<GlobalResult, MorphometryError>
where
    V: VolumeAccess + ?Sized,
    M: MaskAccess,
{
    let partitions = rayon::current_num_threads().max(1) * PARTITIONS_PER_THREAD;
    compute_global_partitioned(volume, mask, params, partitions)
}

/// Global morphometry over exactly `partitions` disjoint index ranges
///
/// The partition count is capped at the voxel count. Results are identical
/// for every partition count.
pub fn compute_global_partitioned<V, M>(
    volume: &V,
    mask: M,
    params: &MorphometryParams,
    partitions: usize,
) -> Result<GlobalResult, MorphometryError>
where
    V: VolumeAccess + ?Sized,
    M: MaskAccess,
{
    params.validate()?;
    validate_geometry(volume.extent(), volume.spacing())?;
    if partitions == 0 {
        return Err(MorphometryError::InvalidPartitions(partitions));
    }

    let (nx, ny, nz) = volume.extent();
    let n_total = nx * ny * nz;
    let n_parts = partitions.min(n_total);
    let threshold = params.threshold;

    let counts = (0..n_parts)
        .into_par_iter()
        .map(|p| {
            let start = p * n_total / n_parts;
            let end = (p + 1) * n_total / n_parts;
            scan_partition(volume, &mask, threshold, start..end)
        })
        .reduce(TransitionCounts::default, |a, b| a + b);

    Ok(GlobalResult::from_counts(counts, volume.spacing()))
}
