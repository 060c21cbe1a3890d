use rustc_hash::FxHashMap;

use crate::constants::*;
use crate::core::block::BlockId;
use crate::core::coord::ChunkPos;

/// A 16 x WORLD_HEIGHT x 16 column of blocks, addressed by local x/z and
/// absolute y. Storage is sparse: cells not present read as air. Cloneable
/// so the export path can snapshot resident chunks for the background
/// encoder without holding the live world.
#[derive(Clone, Debug)]
pub struct Chunk {
    pos: ChunkPos,
    blocks: FxHashMap<(i32, i32, i32), BlockId>,
}

impl Chunk {
    pub fn new(pos: ChunkPos) -> Self {
        Chunk {
            pos,
            blocks: FxHashMap::default(),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn block_at(&self, lx: i32, y: i32, lz: i32) -> BlockId {
        if lx < 0 || lx >= CHUNK_SIZE || lz < 0 || lz >= CHUNK_SIZE || y < 0 || y >= WORLD_HEIGHT {
            return BlockId::AIR;
        }
        self.blocks.get(&(lx, y, lz)).copied().unwrap_or(BlockId::AIR)
    }

    pub fn set_block(&mut self, lx: i32, y: i32, lz: i32, block: BlockId) {
        if lx < 0 || lx >= CHUNK_SIZE || lz < 0 || lz >= CHUNK_SIZE || y < 0 || y >= WORLD_HEIGHT {
            return;
        }
        if block.is_air() {
            self.blocks.remove(&(lx, y, lz));
        } else {
            self.blocks.insert((lx, y, lz), block);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_cells_read_as_air() {
        let chunk = Chunk::new(ChunkPos::new(0, 0));
        assert_eq!(chunk.block_at(3, 64, 9), BlockId::AIR);
    }

    #[test]
    fn test_set_and_get_block() {
        let mut chunk = Chunk::new(ChunkPos::new(2, -1));
        chunk.set_block(1, 70, 15, BlockId::new(4, 2));
        assert_eq!(chunk.block_at(1, 70, 15), BlockId::new(4, 2));
        chunk.set_block(1, 70, 15, BlockId::AIR);
        assert_eq!(chunk.block_at(1, 70, 15), BlockId::AIR);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_out_of_range_is_air() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(16, 10, 0, BlockId::new(1, 0));
        chunk.set_block(0, -1, 0, BlockId::new(1, 0));
        chunk.set_block(0, WORLD_HEIGHT, 0, BlockId::new(1, 0));
        assert!(chunk.is_empty());
        assert_eq!(chunk.block_at(16, 10, 0), BlockId::AIR);
    }
}
