//! Sliding-window morphometry feature maps
//!
//! Every output voxel gets the five metrics of its own neighbourhood window.
//! Windows are independent, so z-slices of the output are filled in parallel.
//!
//! Inside a window:
//! - offsets that are out of scope (outside the mask's extent or zero in the
//!   mask) are skipped; without a mask every offset is in scope, including
//!   those past the grid edge, which read the boundary value
//! - a face is counted only if the neighbouring offset is itself inside the
//!   window

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::counts::{Direction, GlobalResult, TransitionCounts};
use super::{signed_radius, LocalMorphometryParams};
use crate::error::MorphometryError;
use crate::feature_map::{FeatureMap, FEATURE_COUNT};
use crate::volume::{validate_geometry, MaskAccess, VolumeAccess};

/// Accumulate counts over the window centred on `center`
///
/// A radius rejected by [`LocalMorphometryParams::validate`] yields empty
/// counts.
pub fn scan_window<V, M>(
    volume: &V,
    mask: &M,
    threshold: f64,
    radius: [usize; 3],
    center: (isize, isize, isize),
) -> TransitionCounts
where
    V: VolumeAccess + ?Sized,
    M: MaskAccess + ?Sized,
{
    let mut counts = TransitionCounts::default();
    let Some([rx, ry, rz]) = signed_radius(radius) else {
        return counts;
    };
    let (ci, cj, ck) = center;

    for dk in -rz..=rz {
        for dj in -ry..=ry {
            for di in -rx..=rx {
                let (x, y, z) = (ci + di, cj + dj, ck + dk);

                if !mask.is_in_scope(x, y, z) {
                    continue;
                }
                counts.in_scope += 1;

                if volume.intensity_at(x, y, z) < threshold {
                    continue;
                }
                counts.bone += 1;

                for direction in Direction::ALL {
                    let (ui, uj, uk) = direction.neighbor_offset();
                    if (di + ui).abs() > rx || (dj + uj).abs() > ry || (dk + uk).abs() > rz {
                        continue;
                    }
                    if volume.intensity_at(x + ui, y + uj, z + uk) < threshold {
                        counts.record_face(direction);
                    }
                }
            }
        }
    }

    counts
}

/// Compute the five-channel feature map of a volume
///
/// Masked-out voxels get an all-zero tuple. Degenerate windows produce
/// NaN/Inf; pass the result through [`repair`](super::repair::repair) before
/// display.
pub fn compute_local<V, M>(
    volume: &V,
    mask: M,
    params: &LocalMorphometryParams,
) -> Result<FeatureMap, MorphometryError>
where
    V: VolumeAccess + ?Sized,
    M: MaskAccess,
{
    compute_local_with_progress(volume, mask, params, |_, _| {})
}

/// Compute the feature map, reporting `(completed_slices, total_slices)`
///
/// The callback is invoked from worker threads, once per finished z-slice,
/// in completion order.
pub fn compute_local_with_progress<V, M, F>(
    volume: &V,
    mask: M,
    params: &LocalMorphometryParams,
    progress_callback: F,
) -> Result<FeatureMap, MorphometryError>
where
    V: VolumeAccess + ?Sized,
    M: MaskAccess,
    F: Fn(usize, usize) + Sync,
{
    params.validate()?;
    validate_geometry(volume.extent(), volume.spacing())?;

    let (nx, ny, nz) = volume.extent();
    let spacing = volume.spacing();
    let threshold = params.threshold;
    let radius = params.radius;
    let completed = AtomicUsize::new(0);

    let mut output = FeatureMap::zeros((nx, ny, nz));

    output
        .voxels_mut()
        .par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slice)| {
            for j in 0..ny {
                for i in 0..nx {
                    let center = (i as isize, j as isize, k as isize);
                    slice[i + j * nx] = if mask.is_in_scope(center.0, center.1, center.2) {
                        let counts = scan_window(volume, &mask, threshold, radius, center);
                        GlobalResult::from_counts(counts, spacing).features()
                    } else {
                        [0.0; FEATURE_COUNT]
                    };
                }
            }
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress_callback(done, nz);
        });

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_map::Feature;
    use crate::volume::{Mask, NoMask, Volume};
    use std::sync::Mutex;

    fn assert_close(actual: f64, expected: f64, what: &str) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "{}: expected {}, got {}",
            what, expected, actual
        );
    }

    #[test]
    fn test_window_across_planar_interface() {
        // Bone for i <= 2, radius 1 window centred on the last bone plane
        let vol = Volume::from_fn((5, 5, 5), (1.0, 1.0, 1.0), |i, _, _| {
            if i <= 2 { 10.0 } else { 0.0 }
        })
        .unwrap();

        let counts = scan_window(&vol, &NoMask, 5.0, [1, 1, 1], (2, 2, 2));
        assert_eq!(counts.in_scope, 27);
        assert_eq!(counts.bone, 18);
        assert_eq!(counts.faces, [0, 9, 0, 0, 0, 0]);

        let map = compute_local(&vol, NoMask, &LocalMorphometryParams::new(5.0).with_radius(1))
            .unwrap();
        let v = map.get(2, 2, 2).unwrap();
        assert_close(v[Feature::Bvtv.index()], 2.0 / 3.0, "BVTV");
        assert_close(v[Feature::Tbn.index()], 1.0 / 9.0, "TbN");
        assert_close(v[Feature::Tbth.index()], 6.0, "TbTh");
        assert_close(v[Feature::Tbsp.index()], 3.0, "TbSp");
        assert_close(v[Feature::Bsbv.index()], 1.0 / 3.0, "BSBV");
    }

    #[test]
    fn test_corner_window_without_mask_counts_outside_grid() {
        let vol = Volume::new(vec![10.0; 27], (3, 3, 3), (1.0, 1.0, 1.0)).unwrap();
        let counts = scan_window(&vol, &NoMask, 5.0, [1, 1, 1], (0, 0, 0));

        assert_eq!(counts.in_scope, 27);
        assert_eq!(counts.bone, 8);
        assert_eq!(counts.faces, [4, 0, 4, 0, 4, 0]);

        let r = GlobalResult::from_counts(counts, (1.0, 1.0, 1.0));
        assert_close(r.bvtv, 8.0 / 27.0, "BVTV");
        assert_close(r.tbn, 4.0 / 27.0, "TbN");
        assert_close(r.tbth, 2.0, "TbTh");
        assert_close(r.tbsp, 4.75, "TbSp");
        assert_close(r.bsbv, 1.0, "BSBV");
    }

    #[test]
    fn test_corner_window_with_mask_skips_outside_mask() {
        let vol = Volume::new(vec![10.0; 27], (3, 3, 3), (1.0, 1.0, 1.0)).unwrap();
        let mask = Mask::new(vec![1.0; 27], (3, 3, 3)).unwrap();
        let counts = scan_window(&vol, &mask, 5.0, [1, 1, 1], (0, 0, 0));

        assert_eq!(counts.in_scope, 8);
        assert_eq!(counts.bone, 8);
        // Neighbour reads are not masked: the grid edge still reads as void
        assert_eq!(counts.faces, [4, 0, 4, 0, 4, 0]);
    }

    #[test]
    fn test_uniform_bone_interior_is_degenerate() {
        let vol = Volume::new(vec![10.0; 125], (5, 5, 5), (1.0, 1.0, 1.0)).unwrap();
        let map = compute_local(&vol, NoMask, &LocalMorphometryParams::new(5.0).with_radius(1))
            .unwrap();
        let v = map.get(2, 2, 2).unwrap();

        assert_eq!(v[0], 1.0);
        assert_eq!(v[1], 0.0);
        assert_eq!(v[2], f64::INFINITY);
        assert!(v[3].is_nan());
        assert_eq!(v[4], 0.0);
    }

    #[test]
    fn test_zero_mask_value_inside_extent_is_skipped() {
        // All bone; only the grid centre is zeroed in an otherwise full mask
        let vol = Volume::new(vec![10.0; 27], (3, 3, 3), (1.0, 1.0, 1.0)).unwrap();
        let mut m = vec![1.0; 27];
        m[13] = 0.0;
        let mask = Mask::new(m, (3, 3, 3)).unwrap();

        let counts = scan_window(&vol, &mask, 5.0, [1, 1, 1], (0, 0, 0));
        assert_eq!(counts.in_scope, 7, "zeroed mask voxel must not be counted");
        assert_eq!(counts.bone, 7);
        assert_eq!(counts.faces, [4, 0, 4, 0, 4, 0]);

        let map = compute_local(&vol, &mask, &LocalMorphometryParams::new(5.0).with_radius(1))
            .unwrap();
        let v = map.get(0, 0, 0).unwrap();
        assert_close(v[Feature::Bvtv.index()], 1.0, "BVTV");
        assert_close(v[Feature::Tbn.index()], 4.0 / 7.0, "TbN");
        assert_close(v[Feature::Tbth.index()], 1.75, "TbTh");
        assert_close(v[Feature::Tbsp.index()], 0.0, "TbSp");
        assert_close(v[Feature::Bsbv.index()], 8.0 / 7.0, "BSBV");
    }

    #[test]
    fn test_masked_out_voxels_are_zero() {
        let vol = Volume::new(vec![10.0; 27], (3, 3, 3), (1.0, 1.0, 1.0)).unwrap();
        let mut m = vec![1.0; 27];
        m[13] = 0.0; // centre voxel
        let mask = Mask::new(m, (3, 3, 3)).unwrap();

        let map = compute_local(&vol, &mask, &LocalMorphometryParams::new(5.0)).unwrap();
        assert_eq!(map.get(1, 1, 1), Some([0.0; FEATURE_COUNT]));
        assert_ne!(map.get(0, 0, 0), Some([0.0; FEATURE_COUNT]));
    }

    #[test]
    fn test_mask_smaller_than_volume() {
        let vol = Volume::new(vec![10.0; 64], (4, 4, 4), (1.0, 1.0, 1.0)).unwrap();
        let mask = Mask::new(vec![1.0; 8], (2, 2, 2)).unwrap();

        let map = compute_local(&vol, &mask, &LocalMorphometryParams::new(5.0).with_radius(1))
            .unwrap();
        assert_eq!(map.dims(), (4, 4, 4));
        assert_eq!(map.get(3, 3, 3), Some([0.0; FEATURE_COUNT]));
        assert_eq!(map.get(0, 0, 0).map(|v| v[0]), Some(1.0));
    }

    #[test]
    fn test_parallel_matches_sequential_windows() {
        let vol = Volume::from_fn((6, 5, 4), (0.5, 1.0, 2.0), |i, j, k| {
            ((i * 3 + j * 5 + k * 7) % 4) as f64
        })
        .unwrap();
        let params = LocalMorphometryParams::new(2.0).with_radius_xyz([1, 2, 1]);
        let map = compute_local(&vol, NoMask, &params).unwrap();

        for k in 0..4 {
            for j in 0..5 {
                for i in 0..6 {
                    let counts = scan_window(
                        &vol, &NoMask, 2.0, params.radius, (i as isize, j as isize, k as isize),
                    );
                    let expected = GlobalResult::from_counts(counts, (0.5, 1.0, 2.0)).features();
                    let actual = map.get(i, j, k).unwrap();
                    for c in 0..FEATURE_COUNT {
                        assert_eq!(actual[c].to_bits(), expected[c].to_bits());
                    }
                }
            }
        }
    }

    #[test]
    fn test_progress_reports_every_slice() {
        let vol = Volume::new(vec![0.0; 2 * 2 * 6], (2, 2, 6), (1.0, 1.0, 1.0)).unwrap();
        let calls = Mutex::new(Vec::new());

        compute_local_with_progress(&vol, NoMask, &LocalMorphometryParams::default(), |done, total| {
            calls.lock().unwrap().push((done, total));
        })
        .unwrap();

        let mut calls = calls.into_inner().unwrap();
        calls.sort();
        assert_eq!(calls, (1..=6).map(|d| (d, 6)).collect::<Vec<_>>());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let vol = Volume::new(vec![0.0; 8], (2, 2, 2), (1.0, 1.0, 1.0)).unwrap();
        let err = compute_local(&vol, NoMask, &LocalMorphometryParams::new(f64::NEG_INFINITY));
        assert!(matches!(err, Err(MorphometryError::InvalidThreshold(_))));
    }

    #[test]
    fn test_oversized_radius_rejected_before_scan() {
        let vol = Volume::new(vec![10.0; 8], (2, 2, 2), (1.0, 1.0, 1.0)).unwrap();
        let params = LocalMorphometryParams::new(5.0).with_radius(usize::MAX);

        let err = compute_local(&vol, NoMask, &params);
        assert_eq!(err, Err(MorphometryError::InvalidRadius([usize::MAX; 3])));

        let counts = scan_window(&vol, &NoMask, 5.0, params.radius, (0, 0, 0));
        assert_eq!(counts, TransitionCounts::default());
    }
}
