//! Common test utilities for bone-morphometry integration tests

#![allow(dead_code)]

use bone_morphometry::{FeatureMap, Mask, Volume, FEATURE_COUNT};

/// Cube of side `n` that is bone for `i < split` and void elsewhere
pub fn half_bone_volume(n: usize, split: usize, bone: f64, void: f64) -> Volume {
    Volume::from_fn((n, n, n), (1.0, 1.0, 1.0), |i, _, _| if i < split { bone } else { void })
        .expect("valid half-bone geometry")
}

/// Stack of bone plates normal to x: `thickness` bone slices every `period`
pub fn plate_volume(
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    period: usize,
    thickness: usize,
) -> Volume {
    Volume::from_fn(dims, voxel_size, |i, _, _| {
        if i % period < thickness { 2000.0 } else { 0.0 }
    })
    .expect("valid plate geometry")
}

/// Deterministic xorshift noise in `[0, 1)`, reproducible across runs
pub struct Noise(u64);

impl Noise {
    pub fn new(seed: u64) -> Self {
        Noise(seed.max(1))
    }

    pub fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Random intensities in `[0, 2000)`
pub fn noise_volume(dims: (usize, usize, usize), voxel_size: (f64, f64, f64), seed: u64) -> Volume {
    let mut noise = Noise::new(seed);
    let data = (0..dims.0 * dims.1 * dims.2).map(|_| noise.next_f64() * 2000.0).collect();
    Volume::new(data, dims, voxel_size).expect("valid noise geometry")
}

/// Random binary mask with roughly `fraction` of voxels in scope
pub fn noise_mask(dims: (usize, usize, usize), fraction: f64, seed: u64) -> Mask {
    let mut noise = Noise::new(seed);
    let data = (0..dims.0 * dims.1 * dims.2)
        .map(|_| if noise.next_f64() < fraction { 1.0 } else { 0.0 })
        .collect();
    Mask::new(data, dims).expect("valid mask geometry")
}

/// Relative closeness that treats equal infinities and NaN pairs as equal
pub fn close(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs()))
}

pub fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(close(actual, expected, 1e-12), "{}: expected {}, got {}", what, expected, actual);
}

/// Largest absolute channel difference between two maps, ignoring non-finite pairs
pub fn max_abs_diff(a: &FeatureMap, b: &FeatureMap) -> f64 {
    a.voxels()
        .iter()
        .zip(b.voxels())
        .flat_map(|(va, vb)| (0..FEATURE_COUNT).map(move |c| (va[c], vb[c])))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
