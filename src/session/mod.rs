//! Per-operator sessions.
//!
//! A session owns at most one checked-out island and drives the export
//! orchestration: resolving the bounding box to a chunk set, waiting for
//! asynchronously delivered chunk loads, and dispatching the collected
//! snapshot to the background encoder. All session state is mutated on the
//! primary thread; "waiting" is state retained between notification
//! callbacks, never a blocking call.

use std::collections::VecDeque;

use rand::Rng;
use thiserror::Error;

use crate::core::block::BlockId;
use crate::core::chunk::Chunk;
use crate::core::coord::{BlockPos, ChunkPos};
use crate::encoder::{EncodeJob, EncodePool, JobKind};
use crate::template::island::TemplateIsland;
use crate::template::random::RandomRegion;
use crate::world::WorldProvider;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no island is checked out")]
    NoIsland,

    #[error("island start and end coordinates and world must be set first")]
    NotReady,

    #[error("an island is exporting in the background, wait until it is finished")]
    Busy,

    #[error("island world \"{0}\" is missing")]
    WorldUnavailable(String),

    #[error("background encoder rejected the job")]
    Dispatch,
}

/// Single-flight guard for the session. The source system tracked three
/// independent booleans for this; one enum keeps the combinations that
/// never made sense unrepresentable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    Idle,
    Saving,
    Exporting,
    Interacting,
}

/// User-facing progress reports, drained by whoever presents them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    ExportQueued { island: String },
    AwaitingChunks { missing: usize },
    ChunkLoaded { chunk: ChunkPos, remaining: usize },
    Encoding { island: String },
    ExportFinished { island: String },
    ExportFailed { island: String, reason: String },
    ExportAborted { world: String },
    SaveQueued { island: String },
    SaveFinished { island: String },
    SaveFailed { island: String, reason: String },
}

/// A region definition carried on a placeable item. On placement the
/// session re-resolves it against the island's catalog or registers it.
#[derive(Clone, Debug)]
pub struct RegionPayload {
    pub region: RandomRegion,
    pub id: Option<u32>,
}

/// What a placement (or break) resolves to: the authoritative region id
/// and the symbolic token that represents it in the live world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub region_id: u32,
    pub token: BlockId,
}

/// An export waiting on chunk loads. The island rides along so the box
/// membership check can be recomputed from it on every notification.
struct ExportTask {
    island: TemplateIsland,
    queue: Vec<Chunk>,
    missing: usize,
}

pub struct OperatorSession {
    operator: String,
    island: Option<TemplateIsland>,
    state: SessionState,
    pending: Option<ExportTask>,
    pool: EncodePool,
    events: VecDeque<SessionEvent>,
}

impl OperatorSession {
    pub fn new(operator: impl Into<String>, pool: EncodePool) -> Self {
        OperatorSession {
            operator: operator.into(),
            island: None,
            state: SessionState::Idle,
            pending: None,
            pool,
            events: VecDeque::new(),
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn island(&self) -> Option<&TemplateIsland> {
        self.island.as_ref()
    }

    pub fn island_mut(&mut self) -> Option<&mut TemplateIsland> {
        self.island.as_mut()
    }

    /// Drains the queued progress events.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Checks out an island for editing. Refused while an export of the
    /// previously checked-out island is still in flight.
    pub fn check_out(&mut self, island: TemplateIsland) -> Result<(), SessionError> {
        if self.state == SessionState::Exporting {
            return Err(SessionError::Busy);
        }
        self.island = Some(island);
        Ok(())
    }

    /// Queues a background checkpoint of the checked-out island. Quietly
    /// does nothing when the session is busy, nothing is checked out, or
    /// there are no pending changes.
    pub fn save(&mut self) -> Result<bool, SessionError> {
        if self.state != SessionState::Idle {
            return Ok(false);
        }
        let Some(island) = &self.island else {
            return Ok(false);
        };
        if !island.has_changes() {
            return Ok(false);
        }

        let name = island.name().to_string();
        tracing::debug!("Saving island \"{}\"", name);
        let job = EncodeJob {
            kind: JobKind::Save,
            island: island.clone(),
            chunks: Vec::new(),
        };
        if self.pool.submit(job).is_err() {
            self.events.push_back(SessionEvent::SaveFailed {
                island: name,
                reason: "background encoder unavailable".to_string(),
            });
            return Err(SessionError::Dispatch);
        }
        self.state = SessionState::Saving;
        self.events.push_back(SessionEvent::SaveQueued { island: name });
        Ok(true)
    }

    /// Requests an export of the checked-out island. The island leaves the
    /// checkout slot for the duration; a new checkout is refused until the
    /// export finishes.
    ///
    /// World resolution makes exactly one load attempt. If the world is
    /// still unavailable afterwards the export aborts: the session resets
    /// to idle with no queued state and the island returns to the checkout
    /// slot.
    pub fn export<W: WorldProvider>(&mut self, world: &mut W) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::Busy);
        }
        let island = match self.island.take() {
            None => return Err(SessionError::NoIsland),
            Some(island) if !island.ready_to_export() => {
                self.island = Some(island);
                return Err(SessionError::NotReady);
            }
            Some(island) => island,
        };
        let Some(bounds) = island.bounds() else {
            self.island = Some(island);
            return Err(SessionError::NotReady);
        };

        self.state = SessionState::Exporting;
        self.events.push_back(SessionEvent::ExportQueued {
            island: island.name().to_string(),
        });

        let world_name = island.world().unwrap_or_default().to_string();
        if !world.is_loaded(&world_name) {
            world.load(&world_name);
            if !world.is_loaded(&world_name) {
                self.state = SessionState::Idle;
                self.pending = None;
                self.island = Some(island);
                self.events.push_back(SessionEvent::ExportAborted {
                    world: world_name.clone(),
                });
                tracing::warn!("Export aborted, world \"{}\" is missing", world_name);
                return Err(SessionError::WorldUnavailable(world_name));
            }
        }

        let cmin = bounds.chunk_min();
        let cmax = bounds.chunk_max();
        let mut queue = Vec::new();
        let mut missing = 0usize;
        for cx in cmin.x..=cmax.x {
            for cz in cmin.z..=cmax.z {
                match world.chunk(&world_name, ChunkPos::new(cx, cz)) {
                    Some(chunk) => queue.push(chunk),
                    None => missing += 1,
                }
            }
        }

        let task = ExportTask {
            island,
            queue,
            missing,
        };
        if task.missing == 0 {
            self.begin_encode(task)
        } else {
            tracing::info!(
                "Waiting for {} chunks of \"{}\" to load",
                task.missing,
                world_name
            );
            self.events.push_back(SessionEvent::AwaitingChunks {
                missing: task.missing,
            });
            self.pending = Some(task);
            Ok(())
        }
    }

    /// Chunk-load notification from the host world. Ignored while no
    /// export is awaiting chunks, for other worlds, and for chunks outside
    /// the active export's box (recomputed from the retained island on
    /// every call).
    pub fn on_chunk_load(&mut self, chunk: &Chunk, world_name: &str) {
        if self.state != SessionState::Exporting {
            return;
        }
        let Some(task) = self.pending.as_mut() else {
            return;
        };
        if task.island.world() != Some(world_name) {
            return;
        }
        let Some(bounds) = task.island.bounds() else {
            return;
        };
        if !bounds.contains_chunk(chunk.pos()) {
            return;
        }

        task.queue.push(chunk.clone());
        task.missing = task.missing.saturating_sub(1);
        let remaining = task.missing;
        self.events.push_back(SessionEvent::ChunkLoaded {
            chunk: chunk.pos(),
            remaining,
        });
        if remaining == 0 {
            if let Some(task) = self.pending.take() {
                let _ = self.begin_encode(task);
            }
        }
    }

    /// Hands the collected snapshot to the background encoder. On a
    /// dispatch failure the session releases its lock and keeps the island
    /// instead of leaving the export dangling.
    fn begin_encode(&mut self, task: ExportTask) -> Result<(), SessionError> {
        let name = task.island.name().to_string();
        self.events.push_back(SessionEvent::Encoding {
            island: name.clone(),
        });
        let job = EncodeJob {
            kind: JobKind::Export,
            island: task.island,
            chunks: task.queue,
        };
        if let Err(job) = self.pool.submit(job) {
            self.state = SessionState::Idle;
            self.island = Some(job.island);
            self.events.push_back(SessionEvent::ExportFailed {
                island: name,
                reason: "background encoder unavailable".to_string(),
            });
            return Err(SessionError::Dispatch);
        }
        Ok(())
    }

    /// Drains encoder completions, re-entering them on the primary thread.
    pub fn pump(&mut self) {
        while let Some(outcome) = self.pool.poll_result() {
            match outcome.kind {
                JobKind::Save => {
                    if self.state == SessionState::Saving {
                        self.state = SessionState::Idle;
                    }
                    match outcome.result {
                        Ok(()) => {
                            if let Some(island) = &mut self.island {
                                if island.name() == outcome.island {
                                    island.clear_changes();
                                }
                            }
                            tracing::debug!(
                                "Island \"{}\" save completed ({:.2?})",
                                outcome.island,
                                outcome.elapsed
                            );
                            self.events.push_back(SessionEvent::SaveFinished {
                                island: outcome.island,
                            });
                        }
                        Err(reason) => {
                            tracing::warn!(
                                "Island \"{}\" save failed: {}",
                                outcome.island,
                                reason
                            );
                            self.events.push_back(SessionEvent::SaveFailed {
                                island: outcome.island,
                                reason,
                            });
                        }
                    }
                }
                JobKind::Export => {
                    if self.state == SessionState::Exporting {
                        self.state = SessionState::Idle;
                    }
                    match outcome.result {
                        Ok(()) => {
                            tracing::info!(
                                "Island \"{}\" export completed ({:.2?})",
                                outcome.island,
                                outcome.elapsed
                            );
                            self.events.push_back(SessionEvent::ExportFinished {
                                island: outcome.island,
                            });
                        }
                        Err(reason) => {
                            tracing::warn!(
                                "Island \"{}\" export failed: {}",
                                outcome.island,
                                reason
                            );
                            self.events.push_back(SessionEvent::ExportFailed {
                                island: outcome.island,
                                reason,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Opens the weight-editing interaction for a randomized block, if the
    /// position is one and nothing else is running. Stale region
    /// references read as "not randomized".
    pub fn begin_interact(&mut self, pos: BlockPos) -> Option<u32> {
        if self.state != SessionState::Idle {
            return None;
        }
        let island = self.island.as_ref()?;
        let id = island.random_at(pos)?;
        island.random(id)?;
        self.state = SessionState::Interacting;
        Some(id)
    }

    pub fn end_interact(&mut self) {
        if self.state == SessionState::Interacting {
            self.state = SessionState::Idle;
        }
    }

    /// Placement of an item carrying a region payload: reuse the payload's
    /// region id when it still resolves to a structurally equal region,
    /// otherwise register the payload as a new region. The returned token
    /// is what actually goes into the world in the item's place.
    pub fn place_random_item<R: Rng + ?Sized>(
        &mut self,
        pos: BlockPos,
        payload: &RegionPayload,
        rng: &mut R,
    ) -> Result<Placement, SessionError> {
        let island = self.island.as_mut().ok_or(SessionError::NoIsland)?;
        let region_id = match payload.id {
            Some(id) if island.random(id) == Some(&payload.region) => id,
            _ => island.add_random(payload.region.clone()),
        };
        island.set_block_random(pos, region_id);
        let token = island.symbolic_token(region_id, rng);
        Ok(Placement { region_id, token })
    }

    /// Breaking a randomized block reports what to hand back to the
    /// operator: the region id and its current symbolic token.
    pub fn break_random_block<R: Rng + ?Sized>(
        &mut self,
        pos: BlockPos,
        rng: &mut R,
    ) -> Option<Placement> {
        let island = self.island.as_mut()?;
        let id = island.random_at(pos)?;
        island.random(id)?;
        let token = island.symbolic_token(id, rng);
        Some(Placement {
            region_id: id,
            token,
        })
    }

    /// Session teardown checkpoints whatever is still dirty.
    pub fn close(&mut self) {
        let _ = self.save();
    }
}
