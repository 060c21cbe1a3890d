use std::collections::BTreeMap;

use rand::Rng;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::core::block::BlockId;
use crate::core::chunk::Chunk;
use crate::core::coord::{BlockPos, Bounds, ChunkPos};
use crate::template::document::{
    DocumentError, EMPTY_TABLE_KEY, EMPTY_TABLE_VALUE, FORMAT_VERSION, TemplateDocument,
};
use crate::template::random::RandomRegion;
use crate::template::symbolic::SymbolicPalette;

/// One cell of a template structure: either a literal block, or a
/// reference into the document's compacted random-region list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cell {
    Block(BlockId),
    Random(u32),
}

impl Cell {
    pub fn encode(&self) -> String {
        match self {
            Cell::Block(id) => format!("0:{}", id.token()),
            Cell::Random(local) => format!("1:{}", local),
        }
    }

    pub fn parse(cell: &str) -> Option<Cell> {
        let (marker, rest) = cell.split_once(':')?;
        match marker {
            "0" => BlockId::parse_token(rest).map(Cell::Block),
            "1" => rest.parse().ok().map(Cell::Random),
            _ => None,
        }
    }
}

/// The in-memory aggregate an operator works on: a named bounded region of
/// a world, the positions tagged as randomized, the owned random-region
/// catalog and the marker-token palette.
///
/// Region ids are assigned monotonically on insertion and never reused
/// within a session; removing a region leaves a hole. A random-block entry
/// pointing into such a hole simply means "no randomization" wherever it
/// is looked up.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateIsland {
    name: String,
    start: Option<BlockPos>,
    end: Option<BlockPos>,
    world: Option<String>,
    randoms: BTreeMap<u32, RandomRegion>,
    next_random: u32,
    random_blocks: FxHashMap<BlockPos, u32>,
    symbolic: SymbolicPalette,
    structure: FxHashMap<BlockPos, Cell>,
    changed: bool,
}

impl TemplateIsland {
    pub fn new(name: impl Into<String>) -> Self {
        TemplateIsland {
            name: name.into(),
            start: None,
            end: None,
            world: None,
            randoms: BTreeMap::new(),
            next_random: 0,
            random_blocks: FxHashMap::default(),
            symbolic: SymbolicPalette::new(),
            structure: FxHashMap::default(),
            changed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Option<BlockPos> {
        self.start
    }

    pub fn set_start(&mut self, pos: BlockPos) {
        self.start = Some(pos);
        self.changed = true;
    }

    pub fn end(&self) -> Option<BlockPos> {
        self.end
    }

    pub fn set_end(&mut self, pos: BlockPos) {
        self.end = Some(pos);
        self.changed = true;
    }

    pub fn world(&self) -> Option<&str> {
        self.world.as_deref()
    }

    pub fn set_world(&mut self, world: impl Into<String>) {
        self.world = Some(world.into());
        self.changed = true;
    }

    /// The normalized bounding box, available once both corners are set.
    pub fn bounds(&self) -> Option<Bounds> {
        Some(Bounds::normalized(self.start?, self.end?))
    }

    pub fn ready_to_export(&self) -> bool {
        self.start.is_some() && self.end.is_some() && self.world.is_some()
    }

    /// Registers a region and returns its id.
    pub fn add_random(&mut self, random: RandomRegion) -> u32 {
        let id = self.next_random;
        self.next_random += 1;
        self.randoms.insert(id, random);
        self.changed = true;
        id
    }

    pub fn remove_random(&mut self, id: u32) -> bool {
        if self.randoms.remove(&id).is_none() {
            return false;
        }
        self.changed = true;
        true
    }

    pub fn random(&self, id: u32) -> Option<&RandomRegion> {
        self.randoms.get(&id)
    }

    pub fn random_mut(&mut self, id: u32) -> Option<&mut RandomRegion> {
        self.randoms.get_mut(&id)
    }

    pub fn randoms(&self) -> impl Iterator<Item = (u32, &RandomRegion)> {
        self.randoms.iter().map(|(&id, r)| (id, r))
    }

    /// Tags a position as randomized. Refused for an unknown region id.
    pub fn set_block_random(&mut self, pos: BlockPos, id: u32) -> bool {
        if !self.randoms.contains_key(&id) {
            return false;
        }
        self.random_blocks.insert(pos, id);
        self.changed = true;
        true
    }

    pub fn random_at(&self, pos: BlockPos) -> Option<u32> {
        self.random_blocks.get(&pos).copied()
    }

    pub fn symbolic_token<R: Rng + ?Sized>(&mut self, id: u32, rng: &mut R) -> BlockId {
        self.symbolic.token_for(id, rng)
    }

    pub fn set_symbolic(&mut self, id: u32, token: BlockId) {
        self.symbolic.reassign(id, token);
        self.changed = true;
    }

    pub fn structure(&self) -> &FxHashMap<BlockPos, Cell> {
        &self.structure
    }

    /// True when the island itself or any of its regions changed since the
    /// last checkpoint. Queried on demand; regions carry no back-reference.
    pub fn has_changes(&self) -> bool {
        self.changed || self.randoms.values().any(|r| r.has_changes())
    }

    pub fn clear_changes(&mut self) {
        self.changed = false;
        for random in self.randoms.values_mut() {
            random.clear_changes();
        }
    }

    fn weight_table(random: &RandomRegion) -> BTreeMap<String, Value> {
        if !random.is_valid() {
            let mut table = BTreeMap::new();
            table.insert(EMPTY_TABLE_KEY.to_string(), Value::from(EMPTY_TABLE_VALUE));
            return table;
        }
        random
            .entries()
            .iter()
            .map(|(block, &weight)| (block.token(), Value::from(weight)))
            .collect()
    }

    /// The checkpoint form: bounding metadata, the full random-block index,
    /// the symbolic map, and every region's weight table keyed by its id
    /// (holes preserved). The voxel payload is only produced by `export`.
    pub fn save_document(&self) -> TemplateDocument {
        let mut doc = TemplateDocument {
            version: Some(Value::from(FORMAT_VERSION)),
            name: Some(self.name.clone()),
            level: self.world.clone(),
            startcoord: self.start,
            endcoord: self.end,
            ..TemplateDocument::default()
        };
        for (&pos, &id) in &self.random_blocks {
            doc.random_blocks.insert(pos.key(), id);
        }
        for (&id, token) in self.symbolic.assignments() {
            doc.symbolic.insert(id, token.token());
        }
        for (&id, random) in &self.randoms {
            doc.randoms.insert(id, Self::weight_table(random));
        }
        doc
    }

    /// Walks every block inside the normalized box and produces the
    /// portable document. `chunks` must cover every chunk the box
    /// intersects; columns whose chunk is absent are skipped entirely.
    ///
    /// Regions referenced by at least one exported cell are renumbered
    /// densely from 0 in first-seen order, and only those make it into the
    /// document's random table. Returns None when the box or world is not
    /// set yet.
    pub fn export(&self, chunks: &[Chunk]) -> Option<TemplateDocument> {
        if !self.ready_to_export() {
            return None;
        }
        let bounds = self.bounds()?;

        let mut by_pos: FxHashMap<ChunkPos, &Chunk> = FxHashMap::default();
        for chunk in chunks {
            by_pos.insert(chunk.pos(), chunk);
        }

        let mut used: Vec<u32> = Vec::new();
        let mut structure = BTreeMap::new();
        for x in bounds.min.x..=bounds.max.x {
            for z in bounds.min.z..=bounds.max.z {
                let Some(chunk) = by_pos.get(&BlockPos::new(x, 0, z).chunk()) else {
                    continue;
                };
                for y in bounds.min.y..=bounds.max.y {
                    let block = chunk.block_at(x & 0xf, y, z & 0xf);
                    if block.is_air() {
                        continue;
                    }
                    let pos = BlockPos::new(x, y, z);
                    let cell = match self.random_blocks.get(&pos) {
                        Some(&id) => {
                            // A stale or still-empty region must not leave
                            // a broken reference in the document.
                            let Some(random) = self.randoms.get(&id) else {
                                continue;
                            };
                            if !random.is_valid() {
                                continue;
                            }
                            let local = match used.iter().position(|&u| u == id) {
                                Some(i) => i,
                                None => {
                                    used.push(id);
                                    used.len() - 1
                                }
                            };
                            Cell::Random(local as u32)
                        }
                        None => Cell::Block(block),
                    };
                    structure.insert(bounds.rel(pos).key(), cell.encode());
                }
            }
        }

        let mut doc = TemplateDocument {
            version: Some(Value::from(FORMAT_VERSION)),
            name: Some(self.name.clone()),
            structure,
            ..TemplateDocument::default()
        };
        for (local, id) in used.iter().enumerate() {
            doc.randoms
                .insert(local as u32, Self::weight_table(&self.randoms[id]));
        }
        Some(doc)
    }

    /// Rebuilds an island from a decoded document. Region ids are
    /// re-assigned densely in key order (id holes in a checkpoint
    /// collapse), weight-table entries that do not parse are dropped, and
    /// the palette pool is restored so bound tokens are not reissued.
    pub fn from_document(doc: &TemplateDocument) -> Result<TemplateIsland, DocumentError> {
        doc.checked_version()?;
        let name = doc.name.clone().ok_or(DocumentError::MissingIdentity)?;

        let mut island = TemplateIsland::new(name);
        island.world = doc.level.clone();
        island.start = doc.startcoord;
        island.end = doc.endcoord;

        for (key, &id) in &doc.random_blocks {
            if let Some(pos) = BlockPos::parse_key(key) {
                island.random_blocks.insert(pos, id);
            }
        }

        let mut assigned = BTreeMap::new();
        for (&id, token) in &doc.symbolic {
            if let Some(block) = BlockId::parse_token(token) {
                assigned.insert(id, block);
            }
        }
        island.symbolic = SymbolicPalette::restore(assigned);

        for table in doc.randoms.values() {
            let mut random = RandomRegion::new();
            for (token, value) in table {
                let (Some(block), Some(weight)) = (BlockId::parse_token(token), value.as_u64())
                else {
                    continue;
                };
                if let Ok(amount) = u32::try_from(weight) {
                    if amount > 0 {
                        let _ = random.increase_weight(block, amount);
                    }
                }
            }
            island.randoms.insert(island.next_random, random);
            island.next_random += 1;
        }

        for (key, cell) in &doc.structure {
            let (Some(pos), Some(cell)) = (BlockPos::parse_key(key), Cell::parse(cell)) else {
                continue;
            };
            island.structure.insert(pos, cell);
        }

        // A freshly decoded island is a checkpoint, not a pending edit.
        island.clear_changes();
        Ok(island)
    }

    /// Resolves the decoded structure back into placeable blocks for one
    /// chunk column. `anchor` is the world position of the template's min
    /// corner. Random cells sample their region; cells that cannot be
    /// resolved are skipped.
    pub fn blocks_for_chunk<R: Rng + ?Sized>(
        &self,
        anchor: BlockPos,
        chunk: ChunkPos,
        rng: &mut R,
    ) -> Vec<(BlockPos, BlockId)> {
        let mut blocks = Vec::new();
        for (&rel, cell) in &self.structure {
            let pos = BlockPos::new(anchor.x + rel.x, anchor.y + rel.y, anchor.z + rel.z);
            if pos.chunk() != chunk {
                continue;
            }
            let block = match cell {
                Cell::Block(id) => *id,
                Cell::Random(local) => match self.randoms.get(local) {
                    Some(random) => match random.sample(rng) {
                        Ok(block) => block,
                        Err(_) => continue,
                    },
                    None => continue,
                },
            };
            blocks.push((pos, block));
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::document;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn region(entries: &[(BlockId, u32)]) -> RandomRegion {
        let mut random = RandomRegion::new();
        for &(block, weight) in entries {
            random.increase_weight(block, weight).unwrap();
        }
        random
    }

    fn boxed_island(start: BlockPos, end: BlockPos) -> TemplateIsland {
        let mut island = TemplateIsland::new("test");
        island.set_start(start);
        island.set_end(end);
        island.set_world("overworld");
        island
    }

    #[test]
    fn test_export_literal_and_random_cells() {
        let mut island = boxed_island(BlockPos::new(0, 0, 0), BlockPos::new(10, 10, 10));
        let id = island.add_random(region(&[(BlockId::new(1, 0), 1)]));
        island.set_block_random(BlockPos::new(0, 0, 0), id);

        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(0, 0, 0, BlockId::new(9, 0));
        chunk.set_block(1, 2, 3, BlockId::new(7, 0));
        chunk.set_block(2, 2, 2, BlockId::new(8, 5));

        let doc = island.export(&[chunk]).unwrap();
        assert_eq!(doc.structure["0:0:0"], "1:0");
        assert_eq!(doc.structure["1:2:3"], "0:7");
        assert_eq!(doc.structure["2:2:2"], "0:8:5");
        assert_eq!(doc.structure.len(), 3);
        assert_eq!(doc.randoms.len(), 1);
        assert_eq!(doc.randoms[&0]["1"], Value::from(1));
    }

    #[test]
    fn test_export_relative_coords_with_offset_box() {
        let mut island = boxed_island(BlockPos::new(37, 70, -12), BlockPos::new(20, 60, -5));
        let mut chunk = Chunk::new(ChunkPos::new(1, -1));
        // Absolute (25, 65, -10) -> relative (5, 5, 2) against min (20, 60, -12).
        chunk.set_block(25 & 0xf, 65, -10 & 0xf, BlockId::new(3, 0));
        let doc = island.export(&[chunk]).unwrap();
        assert_eq!(doc.structure["5:5:2"], "0:3");

        let bounds = island.bounds().unwrap();
        for key in doc.structure.keys() {
            let rel = BlockPos::parse_key(key).unwrap();
            assert!(rel.x >= 0 && rel.y >= 0 && rel.z >= 0);
            assert!(rel.x <= bounds.max.x - bounds.min.x);
            assert!(rel.y <= bounds.max.y - bounds.min.y);
            assert!(rel.z <= bounds.max.z - bounds.min.z);
        }
    }

    #[test]
    fn test_export_skips_stale_and_invalid_regions() {
        let mut island = boxed_island(BlockPos::new(0, 0, 0), BlockPos::new(5, 5, 5));
        let stale = island.add_random(region(&[(BlockId::new(1, 0), 1)]));
        island.set_block_random(BlockPos::new(0, 0, 0), stale);
        island.remove_random(stale);

        let empty = island.add_random(RandomRegion::new());
        island.set_block_random(BlockPos::new(1, 0, 0), empty);

        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(0, 0, 0, BlockId::new(4, 0));
        chunk.set_block(1, 0, 0, BlockId::new(4, 0));
        chunk.set_block(2, 0, 0, BlockId::new(4, 0));

        let doc = island.export(&[chunk]).unwrap();
        // Both randomized cells are dropped rather than emitted broken.
        assert_eq!(doc.structure.len(), 1);
        assert_eq!(doc.structure["2:0:0"], "0:4");
        assert!(doc.randoms.is_empty());
    }

    #[test]
    fn test_export_compacts_to_distinct_used_regions() {
        let mut island = boxed_island(BlockPos::new(0, 0, 0), BlockPos::new(5, 5, 5));
        let r0 = island.add_random(region(&[(BlockId::new(1, 0), 1)]));
        let r1 = island.add_random(region(&[(BlockId::new(2, 0), 2)]));
        island.add_random(region(&[(BlockId::new(3, 0), 3)])); // never referenced

        // Scan order is x, then z, then y: (0,0,0) first, then (0,0,1).
        island.set_block_random(BlockPos::new(0, 0, 0), r1);
        island.set_block_random(BlockPos::new(0, 0, 1), r0);
        island.set_block_random(BlockPos::new(1, 0, 0), r0);

        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        for (lx, lz) in [(0, 0), (0, 1), (1, 0)] {
            chunk.set_block(lx, 0, lz, BlockId::new(9, 0));
        }

        let doc = island.export(&[chunk]).unwrap();
        assert_eq!(doc.structure["0:0:0"], "1:0");
        assert_eq!(doc.structure["0:0:1"], "1:1");
        assert_eq!(doc.structure["1:0:0"], "1:1");
        assert_eq!(doc.randoms.len(), 2);
        assert_eq!(doc.randoms[&0]["2"], Value::from(2));
        assert_eq!(doc.randoms[&1]["1"], Value::from(1));
    }

    #[test]
    fn test_export_skips_columns_without_chunk() {
        let mut island = boxed_island(BlockPos::new(0, 0, 0), BlockPos::new(20, 5, 5));
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(0, 0, 0, BlockId::new(6, 0));
        // Chunk (1, 0) is not supplied; its columns vanish from the sweep.
        let doc = island.export(&[chunk]).unwrap();
        assert_eq!(doc.structure.len(), 1);
    }

    #[test]
    fn test_export_not_ready_returns_none() {
        let island = TemplateIsland::new("unset");
        assert!(island.export(&[]).is_none());
    }

    #[test]
    fn test_export_decode_roundtrip() {
        let mut island = boxed_island(BlockPos::new(-3, 10, -3), BlockPos::new(12, 30, 12));
        let id = island.add_random(region(&[(BlockId::new(1, 0), 1), (BlockId::new(2, 3), 4)]));
        island.set_block_random(BlockPos::new(0, 12, 0), id);

        let mut chunks = vec![Chunk::new(ChunkPos::new(-1, -1))];
        chunks.push(Chunk::new(ChunkPos::new(0, 0)));
        chunks[1].set_block(0, 12, 0, BlockId::new(5, 0));
        chunks[1].set_block(4, 15, 4, BlockId::new(6, 1));
        chunks[0].set_block(15, 11, 15, BlockId::new(7, 0));

        let doc = island.export(&chunks).unwrap();
        let decoded = document::decode(&doc.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.structure().len(), doc.structure.len());
        for (key, cell) in &doc.structure {
            let pos = BlockPos::parse_key(key).unwrap();
            assert_eq!(decoded.structure()[&pos].encode(), *cell);
        }
        // Region table survives with the same weights.
        let (rid, random) = decoded.randoms().next().unwrap();
        assert_eq!(rid, 0);
        assert_eq!(random.entries()[&BlockId::new(2, 3)], 4);
    }

    #[test]
    fn test_save_document_roundtrip_with_placeholder() {
        let mut island = boxed_island(BlockPos::new(1, 2, 3), BlockPos::new(4, 5, 6));
        let filled = island.add_random(region(&[(BlockId::new(8, 0), 2)]));
        let hollow = island.add_random(RandomRegion::new());
        island.set_block_random(BlockPos::new(2, 3, 4), filled);
        let mut rng = StdRng::seed_from_u64(5);
        let token = island.symbolic_token(filled, &mut rng);

        let doc = island.save_document();
        assert_eq!(doc.level.as_deref(), Some("overworld"));
        assert_eq!(doc.randoms[&hollow][EMPTY_TABLE_KEY], Value::from(EMPTY_TABLE_VALUE));

        let decoded = document::decode(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.random_at(BlockPos::new(2, 3, 4)), Some(filled));
        assert_eq!(decoded.randoms().count(), 2);
        assert!(decoded.random(hollow).is_some_and(|r| !r.is_valid()));
        // The bound token must not be reissued to a fresh region id.
        let mut decoded = decoded;
        let reissued = decoded.symbolic_token(99, &mut rng);
        assert_ne!(reissued, token);
    }

    #[test]
    fn test_set_block_random_requires_known_id() {
        let mut island = TemplateIsland::new("x");
        assert!(!island.set_block_random(BlockPos::new(0, 0, 0), 3));
        assert_eq!(island.random_at(BlockPos::new(0, 0, 0)), None);
    }

    #[test]
    fn test_region_ids_are_never_reused() {
        let mut island = TemplateIsland::new("x");
        let a = island.add_random(RandomRegion::new());
        island.remove_random(a);
        let b = island.add_random(RandomRegion::new());
        assert_ne!(a, b);
    }

    #[test]
    fn test_dirty_flag_aggregates_regions() {
        let mut island = TemplateIsland::new("x");
        let id = island.add_random(region(&[(BlockId::new(1, 0), 1)]));
        island.clear_changes();
        assert!(!island.has_changes());

        island
            .random_mut(id)
            .unwrap()
            .increase_weight(BlockId::new(1, 0), 2)
            .unwrap();
        assert!(island.has_changes());
        island.clear_changes();
        assert!(!island.has_changes());
    }

    #[test]
    fn test_blocks_for_chunk_resolves_structure() {
        let mut island = boxed_island(BlockPos::new(0, 0, 0), BlockPos::new(3, 3, 3));
        let id = island.add_random(region(&[(BlockId::new(11, 2), 1)]));
        island.set_block_random(BlockPos::new(0, 0, 0), id);

        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(0, 0, 0, BlockId::new(9, 0));
        chunk.set_block(1, 1, 1, BlockId::new(4, 0));

        let doc = island.export(&[chunk]).unwrap();
        let decoded = document::decode(&doc.to_bytes().unwrap()).unwrap();

        let anchor = BlockPos::new(32, 5, 32);
        let mut rng = StdRng::seed_from_u64(3);
        let mut blocks = decoded.blocks_for_chunk(anchor, ChunkPos::new(2, 2), &mut rng);
        blocks.sort_by_key(|(pos, _)| (pos.x, pos.y, pos.z));
        assert_eq!(
            blocks,
            vec![
                (BlockPos::new(32, 5, 32), BlockId::new(11, 2)),
                (BlockPos::new(33, 6, 33), BlockId::new(4, 0)),
            ]
        );
        // A chunk outside the template yields nothing.
        assert!(
            decoded
                .blocks_for_chunk(anchor, ChunkPos::new(5, 5), &mut rng)
                .is_empty()
        );
    }
}
