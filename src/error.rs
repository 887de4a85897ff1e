//! Error type shared by the scanners and the I/O layer
//!
//! Degenerate numeric results (empty windows, all-bone or all-void regions)
//! are not errors; they surface as NaN/Inf in the metric values.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum MorphometryError {
    /// Buffer length does not match the product of the extent
    SizeMismatch { expected: usize, actual: usize },
    /// One or more axes have zero voxels
    EmptyExtent { dims: (usize, usize, usize) },
    /// Spacing components must be finite and strictly positive
    InvalidSpacing { spacing: (f64, f64, f64) },
    /// Threshold must be finite
    InvalidThreshold(f64),
    /// Explicit partition count must be at least one
    InvalidPartitions(usize),
    /// Window radius too large to index (`2r + 1` must fit in `isize`)
    InvalidRadius([usize; 3]),
    /// Input is not (at least) three dimensional
    UnsupportedDimensions(usize),
    Io(String),
}

impl fmt::Display for MorphometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected} voxels, got {actual}")
            }
            Self::EmptyExtent { dims } => {
                write!(f, "empty extent {}x{}x{}", dims.0, dims.1, dims.2)
            }
            Self::InvalidSpacing { spacing } => write!(
                f,
                "invalid spacing ({}, {}, {}): components must be finite and > 0",
                spacing.0, spacing.1, spacing.2
            ),
            Self::InvalidThreshold(t) => write!(f, "invalid threshold {t}: must be finite"),
            Self::InvalidPartitions(n) => write!(f, "invalid partition count {n}: must be >= 1"),
            Self::InvalidRadius(r) => {
                write!(f, "invalid window radius {:?}: window width overflows", r)
            }
            Self::UnsupportedDimensions(n) => {
                write!(f, "expected at least a 3D volume, got {n}D")
            }
            Self::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for MorphometryError {}

impl From<String> for MorphometryError {
    fn from(msg: String) -> Self {
        Self::Io(msg)
    }
}
