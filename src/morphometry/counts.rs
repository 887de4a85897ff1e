//! Face-transition counters and metric derivation
//!
//! Sign convention: a bone voxel whose neighbour at `-1` along an axis is
//! void records a `Pos` transition for that axis; a void neighbour at `+1`
//! records a `Neg` transition. Only the per-axis sums enter the metrics, so
//! the labelling never changes a result.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::feature_map::FEATURE_COUNT;

/// Signed axis direction of a bone-to-void face crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    XPos,
    XNeg,
    YPos,
    YNeg,
    ZPos,
    ZNeg,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::XPos,
        Direction::XNeg,
        Direction::YPos,
        Direction::YNeg,
        Direction::ZPos,
        Direction::ZNeg,
    ];

    /// Offset of the neighbour whose voidness this direction counts
    pub const fn neighbor_offset(self) -> (isize, isize, isize) {
        match self {
            Direction::XPos => (-1, 0, 0),
            Direction::XNeg => (1, 0, 0),
            Direction::YPos => (0, -1, 0),
            Direction::YNeg => (0, 1, 0),
            Direction::ZPos => (0, 0, -1),
            Direction::ZNeg => (0, 0, 1),
        }
    }

    /// Axis index: 0 = x, 1 = y, 2 = z
    pub const fn axis(self) -> usize {
        match self {
            Direction::XPos | Direction::XNeg => 0,
            Direction::YPos | Direction::YNeg => 1,
            Direction::ZPos | Direction::ZNeg => 2,
        }
    }

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::XPos => "X",
            Direction::XNeg => "XO",
            Direction::YPos => "Y",
            Direction::YNeg => "YO",
            Direction::ZPos => "Z",
            Direction::ZNeg => "ZO",
        }
    }
}

/// Counters accumulated by one scan (a partition, a window, or a full reduction)
///
/// Addition is plain integer addition, so any partitioning and any merge
/// order produce identical totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionCounts {
    /// Voxels inside the mask
    pub in_scope: u64,
    /// In-scope voxels with intensity >= threshold
    pub bone: u64,
    /// Face transitions, indexed in [`Direction::ALL`] order
    pub faces: [u64; 6],
}

impl TransitionCounts {
    #[inline]
    pub fn record_face(&mut self, direction: Direction) {
        self.faces[direction.slot()] += 1;
    }

    pub fn face(&self, direction: Direction) -> u64 {
        self.faces[direction.slot()]
    }

    /// Sum of both signed directions along one axis
    pub fn axis_total(&self, axis: usize) -> u64 {
        self.faces[2 * axis] + self.faces[2 * axis + 1]
    }
}

impl AddAssign for TransitionCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.in_scope += rhs.in_scope;
        self.bone += rhs.bone;
        for (a, b) in self.faces.iter_mut().zip(rhs.faces.iter()) {
            *a += *b;
        }
    }
}

impl Add for TransitionCounts {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for TransitionCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Morphometry metrics derived from accumulated counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalResult {
    /// Bone volume fraction
    pub bvtv: f64,
    /// Trabecular number
    pub tbn: f64,
    /// Trabecular thickness
    pub tbth: f64,
    /// Trabecular separation
    pub tbsp: f64,
    /// Bone surface to bone volume ratio
    pub bsbv: f64,
    /// Linear face densities per axis (PlX, PlY, PlZ)
    pub pl: [f64; 3],
    pub counts: TransitionCounts,
}

impl GlobalResult {
    /// Derive the metrics from counters and physical spacing
    ///
    /// Evaluation order is fixed so results are bit-reproducible. Zero
    /// in-scope or zero bone counts give NaN/Inf, which are returned as-is.
    pub fn from_counts(counts: TransitionCounts, spacing: (f64, f64, f64)) -> Self {
        let n = counts.in_scope as f64;
        let spacing = [spacing.0, spacing.1, spacing.2];

        let mut pl = [0.0f64; 3];
        for (axis, p) in pl.iter_mut().enumerate() {
            let faces = counts.axis_total(axis) as f64;
            *p = (faces / 2.0) / (n * spacing[axis]) * 2.0;
        }

        let bvtv = counts.bone as f64 / n;
        let tbn = (pl[0] + pl[1] + pl[2]) / 3.0;

        Self {
            bvtv,
            tbn,
            tbth: bvtv / tbn,
            tbsp: (1.0 - bvtv) / tbn,
            bsbv: 2.0 * (tbn / bvtv),
            pl,
            counts,
        }
    }

    /// The five metrics in feature-map channel order
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [self.bvtv, self.tbn, self.tbth, self.tbsp, self.bsbv]
    }
}

impl fmt::Display for GlobalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BVTV: {}", self.bvtv)?;
        writeln!(f, "TbN: {}", self.tbn)?;
        writeln!(f, "TbTh: {}", self.tbth)?;
        writeln!(f, "TbSp: {}", self.tbsp)?;
        writeln!(f, "BSBV: {}", self.bsbv)?;
        writeln!(f, "PlX: {}", self.pl[0])?;
        writeln!(f, "PlY: {}", self.pl[1])?;
        writeln!(f, "PlZ: {}", self.pl[2])?;
        writeln!(f, "NumVoxelsInsideMask: {}", self.counts.in_scope)?;
        write!(f, "NumBoneVoxels: {}", self.counts.bone)?;
        for direction in Direction::ALL {
            write!(f, "\nNum{}: {}", direction.label(), self.counts.face(direction))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(in_scope: u64, bone: u64, faces: [u64; 6]) -> TransitionCounts {
        TransitionCounts { in_scope, bone, faces }
    }

    #[test]
    fn test_direction_offsets_are_opposite_pairs() {
        for pair in Direction::ALL.chunks(2) {
            let a = pair[0].neighbor_offset();
            let b = pair[1].neighbor_offset();
            assert_eq!((a.0 + b.0, a.1 + b.1, a.2 + b.2), (0, 0, 0));
            assert_eq!(pair[0].axis(), pair[1].axis());
        }
    }

    #[test]
    fn test_add_and_sum() {
        let a = counts(10, 4, [1, 2, 3, 4, 5, 6]);
        let b = counts(5, 1, [0, 1, 0, 1, 0, 1]);

        let total = a + b;
        assert_eq!(total, counts(15, 5, [1, 3, 3, 5, 5, 7]));
        assert_eq!(vec![a, b].into_iter().sum::<TransitionCounts>(), total);
        assert_eq!(vec![b, a].into_iter().sum::<TransitionCounts>(), total);
        assert_eq!(total.axis_total(1), 8);
    }

    #[test]
    fn test_metrics_closed_form() {
        // 1000 voxels, 500 bone, 100 faces crossing x only
        let c = counts(1000, 500, [0, 100, 0, 0, 0, 0]);
        let r = GlobalResult::from_counts(c, (1.0, 1.0, 1.0));

        assert_eq!(r.bvtv, 0.5);
        assert!((r.pl[0] - 0.1).abs() < 1e-12);
        assert_eq!(r.pl[1], 0.0);
        assert!((r.tbn - 0.1 / 3.0).abs() < 1e-12);
        assert!((r.tbth - 15.0).abs() < 1e-9);
        assert!((r.tbsp - 15.0).abs() < 1e-9);
        assert!((r.bsbv - 2.0 * (0.1 / 3.0) / 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_spacing_scales_linear_density() {
        let c = counts(100, 50, [10, 10, 10, 10, 10, 10]);
        let iso = GlobalResult::from_counts(c, (1.0, 1.0, 1.0));
        let aniso = GlobalResult::from_counts(c, (2.0, 1.0, 0.5));

        assert!((aniso.pl[0] - iso.pl[0] / 2.0).abs() < 1e-12);
        assert_eq!(aniso.pl[1], iso.pl[1]);
        assert!((aniso.pl[2] - iso.pl[2] * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_counts_are_degenerate_not_panics() {
        let r = GlobalResult::from_counts(TransitionCounts::default(), (1.0, 1.0, 1.0));
        assert!(r.bvtv.is_nan());
        assert!(r.tbn.is_nan());
        assert!(r.bsbv.is_nan());
    }

    #[test]
    fn test_no_bone_gives_zero_bvtv() {
        let r = GlobalResult::from_counts(counts(8, 0, [0; 6]), (1.0, 1.0, 1.0));
        assert_eq!(r.bvtv, 0.0);
        assert_eq!(r.tbn, 0.0);
        assert!(r.tbth.is_nan());
        assert_eq!(r.tbsp, f64::INFINITY);
        assert!(r.bsbv.is_nan());
    }

    #[test]
    fn test_display_lists_counters() {
        let r = GlobalResult::from_counts(counts(10, 5, [1, 2, 3, 4, 5, 6]), (1.0, 1.0, 1.0));
        let text = r.to_string();
        assert!(text.contains("BVTV: 0.5"));
        assert!(text.contains("NumVoxelsInsideMask: 10"));
        assert!(text.contains("NumXO: 2"));
        assert!(text.contains("NumZO: 6"));
    }
}
