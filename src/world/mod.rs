//! World access seam.
//! The host world is an opaque provider of per-block lookups keyed by
//! chunk; this module defines that boundary plus an in-memory provider
//! used by tests and the demo CLI.

use rustc_hash::FxHashMap;
use std::collections::HashSet;

use crate::core::block::BlockId;
use crate::core::chunk::Chunk;
use crate::core::coord::{BlockPos, ChunkPos};

/// The world/chunk provider boundary. `chunk` hands out owned snapshots so
/// the caller can queue them for background work without borrowing the
/// live world.
pub trait WorldProvider {
    fn is_loaded(&self, world: &str) -> bool;

    /// One load attempt. Idempotent; returns whether the world is loaded
    /// afterwards.
    fn load(&mut self, world: &str) -> bool;

    /// Snapshot of a resident chunk, or None when the world is not loaded
    /// or the chunk is not resident yet.
    fn chunk(&self, world: &str, pos: ChunkPos) -> Option<Chunk>;
}

/// In-memory provider: named worlds holding resident chunks, with an
/// explicit loaded set so tests can exercise the load-retry and
/// missing-chunk paths.
#[derive(Default)]
pub struct MemoryWorld {
    worlds: FxHashMap<String, FxHashMap<ChunkPos, Chunk>>,
    loaded: HashSet<String>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        MemoryWorld::default()
    }

    /// Registers a world name without marking it loaded.
    pub fn add_world(&mut self, world: impl Into<String>) {
        self.worlds.entry(world.into()).or_default();
    }

    pub fn mark_loaded(&mut self, world: &str) {
        if self.worlds.contains_key(world) {
            self.loaded.insert(world.to_string());
        }
    }

    pub fn insert_chunk(&mut self, world: &str, chunk: Chunk) {
        if let Some(chunks) = self.worlds.get_mut(world) {
            chunks.insert(chunk.pos(), chunk);
        }
    }

    /// Sets a block at an absolute position, creating the owning chunk on
    /// demand.
    pub fn set_block(&mut self, world: &str, pos: BlockPos, block: BlockId) {
        let Some(chunks) = self.worlds.get_mut(world) else {
            return;
        };
        let cpos = pos.chunk();
        let chunk = chunks.entry(cpos).or_insert_with(|| Chunk::new(cpos));
        chunk.set_block(pos.x & 0xf, pos.y, pos.z & 0xf, block);
    }
}

impl WorldProvider for MemoryWorld {
    fn is_loaded(&self, world: &str) -> bool {
        self.loaded.contains(world)
    }

    fn load(&mut self, world: &str) -> bool {
        self.mark_loaded(world);
        self.is_loaded(world)
    }

    fn chunk(&self, world: &str, pos: ChunkPos) -> Option<Chunk> {
        if !self.is_loaded(world) {
            return None;
        }
        self.worlds.get(world)?.get(&pos).cloned()
    }
}
