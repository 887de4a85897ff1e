//! Memoised local feature maps
//!
//! A feature map is expensive to compute and is requested repeatedly while
//! a viewer redraws. The cache keeps the most recent result and returns it as
//! long as the same volume, mask and parameters are asked for again.
//!
//! Inputs are identified by `Arc` pointer, not by content. Replacing the
//! volume with a new `Arc` (even with equal data) triggers a recompute.

use std::sync::Arc;

use crate::error::MorphometryError;
use crate::feature_map::FeatureMap;
use crate::morphometry::{compute_local, repair_in_place, LocalMorphometryParams};
use crate::volume::{Mask, Volume};

struct CacheKey {
    volume: Arc<Volume>,
    mask: Option<Arc<Mask>>,
    threshold_bits: u64,
    radius: [usize; 3],
    repaired: bool,
}

impl CacheKey {
    fn matches(
        &self,
        volume: &Arc<Volume>,
        mask: Option<&Arc<Mask>>,
        params: &LocalMorphometryParams,
        repaired: bool,
    ) -> bool {
        let same_mask = match (&self.mask, mask) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        Arc::ptr_eq(&self.volume, volume)
            && same_mask
            && self.threshold_bits == params.threshold.to_bits()
            && self.radius == params.radius
            && self.repaired == repaired
    }
}

/// Single-entry cache for [`compute_local`] results
#[derive(Default)]
pub struct MorphometryCache {
    entry: Option<(CacheKey, Arc<FeatureMap>)>,
    hits: usize,
    misses: usize,
}

impl MorphometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached map for these inputs, computing it on a miss
    ///
    /// With `repaired` set the stored map has already been passed through
    /// [`repair_in_place`]. Errors leave the previous entry in place.
    pub fn get_or_compute(
        &mut self,
        volume: &Arc<Volume>,
        mask: Option<&Arc<Mask>>,
        params: &LocalMorphometryParams,
        repaired: bool,
    ) -> Result<Arc<FeatureMap>, MorphometryError> {
        if let Some((key, map)) = &self.entry {
            if key.matches(volume, mask, params, repaired) {
                self.hits += 1;
                return Ok(Arc::clone(map));
            }
        }

        let mut map = compute_local(volume.as_ref(), mask.map(|m| m.as_ref()), params)?;
        if repaired {
            repair_in_place(&mut map);
        }
        let map = Arc::new(map);

        self.misses += 1;
        self.entry = Some((
            CacheKey {
                volume: Arc::clone(volume),
                mask: mask.cloned(),
                threshold_bits: params.threshold.to_bits(),
                radius: params.radius,
                repaired,
            },
            Arc::clone(&map),
        ));
        Ok(map)
    }

    /// Drop the cached entry and release the inputs it holds
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_populated(&self) -> bool {
        self.entry.is_some()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
