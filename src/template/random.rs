use std::collections::BTreeMap;

use rand::Rng;
use rand::RngExt;
use thiserror::Error;

use crate::core::block::BlockId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// Weight increases must add something; zero (and by type, negative)
    /// amounts are refused.
    #[error("weight amount must be positive")]
    InvalidWeight,

    /// Sampling from a region with no weighted entries.
    #[error("random region has no weighted entries")]
    EmptyRegion,
}

/// A weighted-outcome table over block identities. An operator builds one
/// up by repeated weight increases; at placement time one entry is drawn
/// proportionally to its accumulated weight.
#[derive(Clone, Debug, Default)]
pub struct RandomRegion {
    weights: BTreeMap<BlockId, u32>,
    changed: bool,
}

impl RandomRegion {
    pub fn new() -> Self {
        RandomRegion::default()
    }

    /// Adds `amount` to the existing weight for `block`, creating the
    /// entry at zero first. Weights accumulate, they are never overwritten.
    pub fn increase_weight(&mut self, block: BlockId, amount: u32) -> Result<(), RegionError> {
        if amount == 0 {
            return Err(RegionError::InvalidWeight);
        }
        *self.weights.entry(block).or_insert(0) += amount;
        self.changed = true;
        Ok(())
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.values().map(|&w| w as u64).sum()
    }

    /// A region is placeable once it has at least one weighted entry.
    pub fn is_valid(&self) -> bool {
        self.total_weight() > 0
    }

    /// Draws one entry with probability proportional to its weight.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<BlockId, RegionError> {
        let total = self.total_weight();
        if total == 0 {
            return Err(RegionError::EmptyRegion);
        }
        let draw = rng.random_range(0..total);
        let mut bound = 0u64;
        for (&block, &weight) in &self.weights {
            bound += weight as u64;
            if draw < bound {
                return Ok(block);
            }
        }
        // Unreachable: the cumulative bound reaches `total` and draw < total.
        Err(RegionError::EmptyRegion)
    }

    pub fn entries(&self) -> &BTreeMap<BlockId, u32> {
        &self.weights
    }

    pub fn has_changes(&self) -> bool {
        self.changed
    }

    pub fn clear_changes(&mut self) {
        self.changed = false;
    }
}

/// Structural equality on the weight table only; the dirty bit is
/// bookkeeping, not identity.
impl PartialEq for RandomRegion {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights
    }
}

impl Eq for RandomRegion {}
