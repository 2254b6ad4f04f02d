//! Collective-communication substrate.
//!
//! The coordination layer assumes a transport offering collective
//! delivery (all-gather, gather, broadcast, barrier) plus a non-blocking
//! signal cell that sums per-worker frames. Two backends ship here:
//! [`LocalCollective`] for the degenerate single-node case and
//! [`InProcessFabric`] which runs a whole cluster inside one process,
//! used by tests and by embedders that colocate workers.

use quarry_core::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// Per-worker contribution to the summed signal aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalFrame {
    /// Units of work processed by the contributing worker
    pub nodes: u64,
    /// 1 when the contributing worker has requested a stop, else 0
    pub stops: u64,
}

impl SignalFrame {
    /// Create a new signal frame
    #[must_use]
    pub const fn new(nodes: u64, stops: u64) -> Self {
        Self { nodes, stops }
    }
}

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Endpoint for a rank was requested twice
    #[error("Endpoint for rank {0} already taken")]
    EndpointTaken(usize),

    /// Rank outside the fabric
    #[error("Rank {rank} outside fabric of size {size}")]
    RankOutOfRange {
        /// The offending rank
        rank: usize,
        /// The fabric size
        size: usize,
    },

    /// Broadcast root provided no payload
    #[error("Broadcast root provided no payload")]
    MissingPayload,

    /// A collective round was torn down while still in use
    #[error("Collective round vanished mid-flight")]
    RoundVanished,
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            reason: err.to_string(),
        }
    }
}

/// Collective transport seam
///
/// Every worker must reach the same collective call in the same logical
/// round; the blocking operations are the only cross-process suspension
/// points in the coordination layer. `post_signals`/`poll_signals` are
/// non-blocking and allocation-free, suitable for the search hot loop.
#[async_trait::async_trait]
pub trait Collective: Send + Sync {
    /// The fixed worker count
    fn size(&self) -> usize;

    /// This worker's rank
    fn rank(&self) -> usize;

    /// Contribute one payload and receive every worker's, indexed by rank
    async fn all_gather(&self, payload: Vec<u8>) -> CoreResult<Vec<Vec<u8>>>;

    /// Contribute one payload; the root receives all of them
    async fn gather(&self, root: usize, payload: Vec<u8>) -> CoreResult<Option<Vec<Vec<u8>>>>;

    /// Receive the root's payload on every worker
    async fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> CoreResult<Vec<u8>>;

    /// Block until every worker has arrived
    async fn barrier(&self) -> CoreResult<()>;

    /// Publish this worker's current signal frame (non-blocking)
    fn post_signals(&self, frame: SignalFrame);

    /// Probe the cluster-wide frame sum (non-blocking)
    fn poll_signals(&self) -> Option<SignalFrame>;
}

/// Encode a value with the wire codec
pub(crate) fn encode<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    Ok(postcard::to_allocvec(value)?)
}

/// Decode a value with the wire codec
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Single-node backend: every collective is a local pass-through and the
/// signal cell never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCollective;

impl LocalCollective {
    /// Create the single-node backend
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Collective for LocalCollective {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    async fn all_gather(&self, payload: Vec<u8>) -> CoreResult<Vec<Vec<u8>>> {
        Ok(vec![payload])
    }

    async fn gather(&self, _root: usize, payload: Vec<u8>) -> CoreResult<Option<Vec<Vec<u8>>>> {
        Ok(Some(vec![payload]))
    }

    async fn broadcast(&self, _root: usize, payload: Option<Vec<u8>>) -> CoreResult<Vec<u8>> {
        payload.ok_or_else(|| TransportError::MissingPayload.into())
    }

    async fn barrier(&self) -> CoreResult<()> {
        Ok(())
    }

    fn post_signals(&self, _frame: SignalFrame) {}

    fn poll_signals(&self) -> Option<SignalFrame> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    AllGather,
    Gather,
    Broadcast,
    Barrier,
}

struct RoundState {
    slots: Vec<Option<Vec<u8>>>,
    deposits: usize,
    readers: usize,
}

impl RoundState {
    fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            deposits: 0,
            readers: 0,
        }
    }
}

#[derive(Default)]
struct SignalCell {
    nodes: AtomicU64,
    stops: AtomicU64,
}

struct FabricShared {
    size: usize,
    cells: Vec<SignalCell>,
    rounds: Mutex<HashMap<(Op, u64), RoundState>>,
    notify: Notify,
}

impl FabricShared {
    fn lock_rounds(&self) -> std::sync::MutexGuard<'_, HashMap<(Op, u64), RoundState>> {
        self.rounds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Slot-based rendezvous shared by all collective operations.
    ///
    /// `needed` deposits complete the round; every rank reads the slots
    /// exactly once and the last reader tears the round down.
    async fn rendezvous(
        &self,
        op: Op,
        round: u64,
        rank: usize,
        deposit: Option<Vec<u8>>,
        needed: usize,
    ) -> CoreResult<Vec<Option<Vec<u8>>>> {
        {
            let mut rounds = self.lock_rounds();
            let state = rounds
                .entry((op, round))
                .or_insert_with(|| RoundState::new(self.size));
            if let Some(bytes) = deposit {
                state.slots[rank] = Some(bytes);
                state.deposits += 1;
            }
            if state.deposits >= needed {
                self.notify.notify_waiters();
            }
        }

        loop {
            let notified = self.notify.notified();
            {
                let mut rounds = self.lock_rounds();
                match rounds.get_mut(&(op, round)) {
                    Some(state) if state.deposits >= needed => {
                        let slots = state.slots.clone();
                        state.readers += 1;
                        if state.readers == self.size {
                            rounds.remove(&(op, round));
                        }
                        return Ok(slots);
                    }
                    Some(_) => {}
                    None => return Err(TransportError::RoundVanished.into()),
                }
            }
            notified.await;
        }
    }
}

/// In-process cluster fabric
///
/// Builds `size` endpoints sharing slot-based collectives and per-rank
/// signal cells. Each endpoint is handed out exactly once, which is the
/// double-init guard for membership.
pub struct InProcessFabric {
    shared: Arc<FabricShared>,
    taken: Vec<AtomicBool>,
}

impl InProcessFabric {
    /// Create a fabric for `size` workers
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Setup`] if `size` is zero.
    pub fn new(size: usize) -> CoreResult<Arc<Self>> {
        if size == 0 {
            return Err(CoreError::Setup {
                reason: "fabric size must be at least 1".to_string(),
            });
        }
        let shared = Arc::new(FabricShared {
            size,
            cells: (0..size).map(|_| SignalCell::default()).collect(),
            rounds: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        });
        Ok(Arc::new(Self {
            shared,
            taken: (0..size).map(|_| AtomicBool::new(false)).collect(),
        }))
    }

    /// Take the endpoint for a rank
    ///
    /// # Errors
    ///
    /// Returns an error if the rank is out of range or its endpoint was
    /// already taken.
    pub fn endpoint(&self, rank: usize) -> Result<FabricEndpoint, TransportError> {
        if rank >= self.shared.size {
            return Err(TransportError::RankOutOfRange {
                rank,
                size: self.shared.size,
            });
        }
        if self.taken[rank].swap(true, Ordering::AcqRel) {
            return Err(TransportError::EndpointTaken(rank));
        }
        Ok(FabricEndpoint {
            shared: Arc::clone(&self.shared),
            rank,
            rounds: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        })
    }

    /// The fabric's worker count
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.size
    }
}

/// One worker's handle onto an [`InProcessFabric`]
pub struct FabricEndpoint {
    shared: Arc<FabricShared>,
    rank: usize,
    // Per-op round counters; ranks stay aligned because every worker
    // drives the same collective sequence.
    rounds: [AtomicU64; 4],
}

impl FabricEndpoint {
    fn next_round(&self, op: Op) -> u64 {
        let idx = match op {
            Op::AllGather => 0,
            Op::Gather => 1,
            Op::Broadcast => 2,
            Op::Barrier => 3,
        };
        self.rounds[idx].fetch_add(1, Ordering::Relaxed)
    }

    fn unwrap_slots(slots: Vec<Option<Vec<u8>>>) -> CoreResult<Vec<Vec<u8>>> {
        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| TransportError::RoundVanished.into()))
            .collect()
    }
}

#[async_trait::async_trait]
impl Collective for FabricEndpoint {
    fn size(&self) -> usize {
        self.shared.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    async fn all_gather(&self, payload: Vec<u8>) -> CoreResult<Vec<Vec<u8>>> {
        let round = self.next_round(Op::AllGather);
        let slots = self
            .shared
            .rendezvous(Op::AllGather, round, self.rank, Some(payload), self.shared.size)
            .await?;
        Self::unwrap_slots(slots)
    }

    async fn gather(&self, root: usize, payload: Vec<u8>) -> CoreResult<Option<Vec<Vec<u8>>>> {
        if root >= self.shared.size {
            return Err(TransportError::RankOutOfRange {
                rank: root,
                size: self.shared.size,
            }
            .into());
        }
        let round = self.next_round(Op::Gather);
        let slots = self
            .shared
            .rendezvous(Op::Gather, round, self.rank, Some(payload), self.shared.size)
            .await?;
        if self.rank == root {
            Ok(Some(Self::unwrap_slots(slots)?))
        } else {
            Ok(None)
        }
    }

    async fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> CoreResult<Vec<u8>> {
        if root >= self.shared.size {
            return Err(TransportError::RankOutOfRange {
                rank: root,
                size: self.shared.size,
            }
            .into());
        }
        let deposit = if self.rank == root {
            Some(payload.ok_or(TransportError::MissingPayload)?)
        } else {
            None
        };
        let round = self.next_round(Op::Broadcast);
        let mut slots = self
            .shared
            .rendezvous(Op::Broadcast, round, root, deposit, 1)
            .await?;
        slots
            .swap_remove(root)
            .ok_or_else(|| TransportError::RoundVanished.into())
    }

    async fn barrier(&self) -> CoreResult<()> {
        let round = self.next_round(Op::Barrier);
        self.shared
            .rendezvous(Op::Barrier, round, self.rank, Some(Vec::new()), self.shared.size)
            .await?;
        Ok(())
    }

    fn post_signals(&self, frame: SignalFrame) {
        let cell = &self.shared.cells[self.rank];
        cell.nodes.store(frame.nodes, Ordering::Relaxed);
        cell.stops.store(frame.stops, Ordering::Relaxed);
    }

    fn poll_signals(&self) -> Option<SignalFrame> {
        let mut sum = SignalFrame::default();
        for cell in &self.shared.cells {
            sum.nodes += cell.nodes.load(Ordering::Relaxed);
            sum.stops += cell.stops.load(Ordering::Relaxed);
        }
        Some(sum)
    }
}
