// Core module with fundamental types
pub mod core;

// Template module with the data model and document format
pub mod template;

// World module with the chunk provider seam
pub mod world;

// Session module with the per-operator export orchestration
pub mod session;

// Background encoding and persistence
pub mod encoder;
pub mod store;

// Other modules
pub mod constants;
pub mod utils;

// Re-exports
pub use constants::*;
pub use core::{BlockId, BlockPos, Bounds, Chunk, ChunkPos};
pub use encoder::{EncodeJob, EncodeOutcome, EncodePool, JobKind};
pub use session::{OperatorSession, SessionError, SessionEvent, SessionState};
pub use store::{DirStore, MemStore, TemplateStore};
pub use template::{
    Cell, DocumentError, RandomRegion, RegionError, SymbolicPalette, TemplateDocument,
    TemplateIsland,
};
pub use world::{MemoryWorld, WorldProvider};
