use serde::{Deserialize, Serialize};

/// Opaque block identity: a `(kind, variant)` pair of small integers.
/// The host world assigns the numeric meaning; this crate only moves
/// them around and writes them out.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
)]
pub struct BlockId {
    pub kind: u16,
    pub variant: u16,
}

impl BlockId {
    pub const AIR: BlockId = BlockId::new(0, 0);

    pub const fn new(kind: u16, variant: u16) -> Self {
        BlockId { kind, variant }
    }

    pub fn is_air(&self) -> bool {
        self.kind == 0
    }

    /// Token string form: `"kind"` when the variant is the default zero,
    /// otherwise `"kind:variant"`.
    pub fn token(&self) -> String {
        if self.variant == 0 {
            self.kind.to_string()
        } else {
            format!("{}:{}", self.kind, self.variant)
        }
    }

    /// Parses `"kind"` or `"kind:variant"`. Returns None on anything
    /// non-numeric or with extra segments.
    pub fn parse_token(token: &str) -> Option<BlockId> {
        let mut parts = token.split(':');
        let kind = parts.next()?.parse().ok()?;
        let variant = match parts.next() {
            Some(v) => v.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(BlockId::new(kind, variant))
    }
}
