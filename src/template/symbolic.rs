use std::collections::BTreeMap;

use rand::Rng;
use rand::RngExt;

use crate::core::block::BlockId;

/// The fixed marker palette: eleven distinct glazed-terracotta style blocks
/// used to stand in for abstract random regions in the live world. The
/// palette is presentation data; the authoritative region link travels as
/// the region id attached to the placed item, never the token itself.
pub const PALETTE: [BlockId; 11] = [
    BlockId::new(219, 0), // purple
    BlockId::new(220, 0), // white
    BlockId::new(221, 0), // orange
    BlockId::new(222, 0), // magenta
    BlockId::new(223, 0), // light blue
    BlockId::new(224, 0), // yellow
    BlockId::new(225, 0), // lime
    BlockId::new(226, 0), // pink
    BlockId::new(227, 0), // gray
    BlockId::new(228, 0), // silver
    BlockId::new(229, 0), // cyan
];

/// Assigns palette tokens to random-region ids. Tokens are handed out
/// randomly from the unused pool; when the pool runs dry it is refilled to
/// the full palette, so collisions across regions become possible and are
/// accepted.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolicPalette {
    assigned: BTreeMap<u32, BlockId>,
    unused: Vec<BlockId>,
}

impl Default for SymbolicPalette {
    fn default() -> Self {
        SymbolicPalette {
            assigned: BTreeMap::new(),
            unused: PALETTE.to_vec(),
        }
    }
}

impl SymbolicPalette {
    pub fn new() -> Self {
        SymbolicPalette::default()
    }

    /// Rebuilds assignments from a decoded document. Restored tokens that
    /// exactly match a palette entry leave the unused pool so a freshly
    /// loaded island does not reissue a token already bound to a region.
    pub fn restore(assigned: BTreeMap<u32, BlockId>) -> Self {
        let mut unused = PALETTE.to_vec();
        for token in assigned.values() {
            if let Some(i) = unused.iter().position(|t| t == token) {
                unused.remove(i);
            }
        }
        SymbolicPalette { assigned, unused }
    }

    /// Token for a region id, assigning one on first use. Idempotent for
    /// an already-assigned id.
    pub fn token_for<R: Rng + ?Sized>(&mut self, region: u32, rng: &mut R) -> BlockId {
        if let Some(&token) = self.assigned.get(&region) {
            return token;
        }
        if self.unused.is_empty() {
            self.unused = PALETTE.to_vec();
        }
        let token = self.unused.swap_remove(rng.random_range(0..self.unused.len()));
        self.assigned.insert(region, token);
        token
    }

    /// Explicit override. A token the region previously held goes back to
    /// the unused pool.
    pub fn reassign(&mut self, region: u32, token: BlockId) {
        if let Some(old) = self.assigned.insert(region, token) {
            self.unused.push(old);
        }
    }

    pub fn assignments(&self) -> &BTreeMap<u32, BlockId> {
        &self.assigned
    }
}
