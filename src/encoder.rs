//! Background template encoding
//!
//! Serializing and persisting a template can touch thousands of blocks,
//! so it runs off the primary thread. Uses crossbeam channels for
//! inter-thread communication; submission and completion polling are both
//! non-blocking.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::constants::{ENCODE_QUEUE_DEPTH, MAX_ENCODE_WORKERS};
use crate::core::chunk::Chunk;
use crate::store::TemplateStore;
use crate::template::island::TemplateIsland;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobKind {
    /// Checkpoint the island's metadata (no voxel payload).
    Save,
    /// Full export: walk the chunk queue and emit the structure document.
    Export,
}

/// A unit of background work: an immutable island snapshot plus the chunk
/// queue collected for it. Snapshotting at dispatch time keeps operator
/// edits during encoding from racing the in-flight encode.
pub struct EncodeJob {
    pub kind: JobKind,
    pub island: TemplateIsland,
    pub chunks: Vec<Chunk>,
}

/// Completion report delivered back to the submitting session.
pub struct EncodeOutcome {
    pub kind: JobKind,
    pub island: String,
    pub elapsed: Duration,
    pub result: Result<(), String>,
}

/// Worker pool that encodes and persists template documents.
pub struct EncodePool {
    request_tx: Sender<EncodeJob>,
    result_rx: Receiver<EncodeOutcome>,
}

impl EncodePool {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self::with_worker_count(num_cpus::get().min(MAX_ENCODE_WORKERS), store)
    }

    pub fn with_worker_count(num_workers: usize, store: Arc<dyn TemplateStore>) -> Self {
        // Bounded channels prevent unbounded memory growth
        let (request_tx, request_rx) = bounded::<EncodeJob>(ENCODE_QUEUE_DEPTH);
        let (result_tx, result_rx) = bounded::<EncodeOutcome>(ENCODE_QUEUE_DEPTH);

        for worker_id in 0..num_workers.max(1) {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let store = Arc::clone(&store);

            thread::Builder::new()
                .name(format!("encode-worker-{}", worker_id))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        let started = Instant::now();
                        let island = job.island.name().to_string();
                        let result = run_job(&job, store.as_ref());
                        if tx
                            .send(EncodeOutcome {
                                kind: job.kind,
                                island,
                                elapsed: started.elapsed(),
                                result,
                            })
                            .is_err()
                        {
                            // Submitting side has closed, exit
                            break;
                        }
                    }
                })
                .expect("Failed to spawn encode worker");
        }

        EncodePool {
            request_tx,
            result_rx,
        }
    }

    /// Non-blocking submit. A full or closed queue hands the job back so
    /// the caller can release its locks instead of leaking them.
    pub fn submit(&self, job: EncodeJob) -> Result<(), EncodeJob> {
        self.request_tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
        })
    }

    /// Poll for one completed job (non-blocking).
    pub fn poll_result(&self) -> Option<EncodeOutcome> {
        self.result_rx.try_recv().ok()
    }
}

fn run_job(job: &EncodeJob, store: &dyn TemplateStore) -> Result<(), String> {
    let doc = match job.kind {
        JobKind::Save => job.island.save_document(),
        JobKind::Export => job
            .island
            .export(&job.chunks)
            .ok_or_else(|| "island is not ready to export".to_string())?,
    };
    let bytes = doc.to_bytes().map_err(|e| e.to_string())?;
    store.put(job.island.name(), &bytes).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockId;
    use crate::core::coord::BlockPos;
    use crate::store::MemStore;
    use crate::template::document;

    fn wait_for_outcome(pool: &EncodePool) -> EncodeOutcome {
        for _ in 0..500 {
            if let Some(outcome) = pool.poll_result() {
                return outcome;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("encode job did not complete");
    }

    #[test]
    fn test_save_job_persists_document() {
        let store = Arc::new(MemStore::default());
        let pool = EncodePool::with_worker_count(1, store.clone());

        let mut island = TemplateIsland::new("atoll");
        island.set_world("overworld");
        island.set_start(BlockPos::new(0, 0, 0));
        island.set_end(BlockPos::new(4, 4, 4));

        pool.submit(EncodeJob {
            kind: JobKind::Save,
            island,
            chunks: Vec::new(),
        })
        .unwrap_or_else(|_| panic!("submit failed"));

        let outcome = wait_for_outcome(&pool);
        assert_eq!(outcome.kind, JobKind::Save);
        assert_eq!(outcome.island, "atoll");
        assert!(outcome.result.is_ok());

        let decoded = document::decode(&store.get("atoll").unwrap()).unwrap();
        assert_eq!(decoded.name(), "atoll");
        assert_eq!(decoded.world(), Some("overworld"));
    }

    #[test]
    fn test_export_job_without_box_reports_error() {
        let store = Arc::new(MemStore::default());
        let pool = EncodePool::with_worker_count(1, store);

        pool.submit(EncodeJob {
            kind: JobKind::Export,
            island: TemplateIsland::new("bare"),
            chunks: Vec::new(),
        })
        .unwrap_or_else(|_| panic!("submit failed"));

        let outcome = wait_for_outcome(&pool);
        assert_eq!(outcome.kind, JobKind::Export);
        assert!(outcome.result.is_err());
    }

    #[test]
    fn test_export_job_uses_block_id_air_skip() {
        let store = Arc::new(MemStore::default());
        let pool = EncodePool::with_worker_count(1, store.clone());

        let mut island = TemplateIsland::new("skerry");
        island.set_world("overworld");
        island.set_start(BlockPos::new(0, 0, 0));
        island.set_end(BlockPos::new(7, 7, 7));

        let mut chunk = Chunk::new(crate::core::coord::ChunkPos::new(0, 0));
        chunk.set_block(3, 3, 3, BlockId::new(12, 0));

        pool.submit(EncodeJob {
            kind: JobKind::Export,
            island,
            chunks: vec![chunk],
        })
        .unwrap_or_else(|_| panic!("submit failed"));

        let outcome = wait_for_outcome(&pool);
        assert!(outcome.result.is_ok());
        let decoded = document::decode(&store.get("skerry").unwrap()).unwrap();
        assert_eq!(decoded.structure().len(), 1);
    }
}
