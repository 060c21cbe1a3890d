// World constants
pub const WORLD_HEIGHT: i32 = 256;
pub const CHUNK_SIZE: i32 = 16;

// Background encoding constants
pub const ENCODE_QUEUE_DEPTH: usize = 64;
pub const MAX_ENCODE_WORKERS: usize = 4;
