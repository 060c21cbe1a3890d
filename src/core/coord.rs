use serde::{Deserialize, Serialize};

/// Absolute or relative block position. Hashable so sparse per-coordinate
/// maps can key on the position directly instead of a formatted string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        BlockPos { x, y, z }
    }

    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }

    /// Colon-joined key form used by the document maps.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.x, self.y, self.z)
    }

    pub fn parse_key(key: &str) -> Option<BlockPos> {
        let mut parts = key.split(':');
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(BlockPos::new(x, y, z))
    }
}

/// Chunk column coordinates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        ChunkPos { x, z }
    }
}

/// A bounding box with per-axis min/max resolved. Corners may be given in
/// any order; only this normalized form is ever stored or compared against.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Bounds {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl Bounds {
    pub fn normalized(a: BlockPos, b: BlockPos) -> Self {
        Bounds {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Position relative to the min corner.
    pub fn rel(&self, pos: BlockPos) -> BlockPos {
        BlockPos::new(pos.x - self.min.x, pos.y - self.min.y, pos.z - self.min.z)
    }

    pub fn chunk_min(&self) -> ChunkPos {
        self.min.chunk()
    }

    pub fn chunk_max(&self) -> ChunkPos {
        self.max.chunk()
    }

    /// Whether the chunk column intersects the box's X/Z extent.
    pub fn contains_chunk(&self, chunk: ChunkPos) -> bool {
        chunk.x >= self.chunk_min().x
            && chunk.x <= self.chunk_max().x
            && chunk.z >= self.chunk_min().z
            && chunk.z <= self.chunk_max().z
    }
}
