//! Exchange/merge protocol for shared results.
//!
//! At a fixed iteration cadence each worker drains its exchange buffer
//! and takes part in an all-to-all round; received records are offered to
//! the local result store, whose own acceptance rule decides what wins.
//! The protocol guarantees at-least-once delivery of drained records
//! within a completed round, nothing more: a failed round is skipped and
//! the search continues on local information.

use crate::buffer::ExchangeBuffer;
use crate::collective::{Collective, decode, encode};
use crate::store::ResultStore;
use quarry_core::{CoreResult, ResultRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Outcome of one exchange round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The round completed; `sent` records went out, `merged` came in
    Completed {
        /// Records drained and shared by this worker
        sent: usize,
        /// Records received from other workers and offered to the store
        merged: usize,
    },
    /// The transport failed; the round was skipped and logged
    Skipped,
    /// Single-node mode; nothing to exchange
    LocalOnly,
}

/// Iteration-cadenced result exchange
pub struct ExchangeProtocol {
    collective: Arc<dyn Collective>,
    buffer: Arc<ExchangeBuffer>,
    store: Arc<dyn ResultStore>,
    interval: u64,
    iterations: AtomicU64,
    rounds: AtomicU64,
}

impl ExchangeProtocol {
    /// Create the protocol
    ///
    /// `interval` is the number of search iterations between rounds; the
    /// cadence is iteration-count based so runs stay reproducible.
    #[must_use]
    pub fn new(
        collective: Arc<dyn Collective>,
        buffer: Arc<ExchangeBuffer>,
        store: Arc<dyn ResultStore>,
        interval: u64,
    ) -> Self {
        Self {
            collective,
            buffer,
            store,
            interval,
            iterations: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
        }
    }

    /// Count one search iteration; true when an exchange round is due
    ///
    /// Every worker drives the same loop, so all workers see the same
    /// round boundaries.
    pub fn note_iteration(&self) -> bool {
        let n = self.iterations.fetch_add(1, Ordering::Relaxed) + 1;
        n % self.interval == 0
    }

    /// Rounds completed so far (skipped rounds included)
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Drain the buffer and run one all-to-all exchange round
    ///
    /// Every worker must reach this call in the same logical round. On
    /// transport failure the round is skipped: the drained records are
    /// folded back into the local store so local information survives,
    /// and only the cross-worker share is lost.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if a received batch cannot be decoded;
    /// transport failures are absorbed as [`RoundOutcome::Skipped`].
    pub async fn run_round(&self) -> CoreResult<RoundOutcome> {
        let round = self.rounds.fetch_add(1, Ordering::Relaxed);
        let drained = self.buffer.drain();

        if self.collective.size() == 1 {
            return Ok(RoundOutcome::LocalOnly);
        }

        let sent = drained.len();
        let payload = encode(&drained)?;
        let batches = match self.collective.all_gather(payload).await {
            Ok(batches) => batches,
            Err(err) => {
                warn!(round, error = %err, "exchange round skipped");
                for record in &drained {
                    self.store.merge(record);
                }
                return Ok(RoundOutcome::Skipped);
            }
        };

        let own_rank = self.collective.rank();
        let mut merged = 0;
        for (rank, bytes) in batches.iter().enumerate() {
            if rank == own_rank {
                continue;
            }
            let records: Vec<ResultRecord> = decode(bytes)?;
            for record in &records {
                self.store.merge(record);
            }
            merged += records.len();
        }

        debug!(round, sent, merged, "exchange round completed");
        Ok(RoundOutcome::Completed { sent, merged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{InProcessFabric, LocalCollective, SignalFrame, TransportError};
    use crate::store::MemoryStore;
    use quarry_core::{Answer, Bound, CoreError, Fingerprint};

    fn record(key: u64, depth: i32) -> ResultRecord {
        ResultRecord::new(
            Fingerprint::new(key),
            depth,
            0,
            Bound::Exact,
            Answer::new(key),
            0,
        )
    }

    fn protocol_over(
        collective: Arc<dyn Collective>,
        interval: u64,
    ) -> (ExchangeProtocol, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let protocol = ExchangeProtocol::new(
            collective,
            Arc::new(ExchangeBuffer::new(8)),
            Arc::clone(&store) as Arc<dyn ResultStore>,
            interval,
        );
        (protocol, store)
    }

    #[test]
    fn test_note_iteration_cadence() {
        let (protocol, _) = protocol_over(Arc::new(LocalCollective::new()), 4);
        let due: Vec<bool> = (0..8).map(|_| protocol.note_iteration()).collect();
        assert_eq!(due, vec![false, false, false, true, false, false, false, true]);
    }

    #[tokio::test]
    async fn test_single_node_round_is_noop() {
        let (protocol, store) = protocol_over(Arc::new(LocalCollective::new()), 1);
        protocol.buffer.offer(record(1, 10));

        let outcome = protocol.run_round().await.unwrap();
        assert_eq!(outcome, RoundOutcome::LocalOnly);
        // Nothing is delivered anywhere, and the buffer still drains.
        assert!(store.is_empty());
        assert!(protocol.buffer.is_empty());
    }

    #[tokio::test]
    async fn test_two_workers_exchange_records() {
        let fabric = InProcessFabric::new(2).unwrap();
        let (protocol_a, store_a) = protocol_over(Arc::new(fabric.endpoint(0).unwrap()), 1);
        let (protocol_b, store_b) = protocol_over(Arc::new(fabric.endpoint(1).unwrap()), 1);

        protocol_a.buffer.offer(record(1, 10));
        protocol_a.buffer.offer(record(2, 7));
        protocol_b.buffer.offer(record(3, 5));

        let task_a = tokio::spawn(async move { (protocol_a.run_round().await, store_a) });
        let task_b = tokio::spawn(async move { (protocol_b.run_round().await, store_b) });

        let (outcome_a, store_a) = task_a.await.unwrap();
        let (outcome_b, store_b) = task_b.await.unwrap();

        assert_eq!(outcome_a.unwrap(), RoundOutcome::Completed { sent: 2, merged: 1 });
        assert_eq!(outcome_b.unwrap(), RoundOutcome::Completed { sent: 1, merged: 2 });

        // Each worker now holds the other's records (self-delivery is
        // skipped, so local stores only gain what came from elsewhere).
        assert_eq!(store_a.len(), 1);
        assert!(store_a.lookup(Fingerprint::new(3)).is_some());
        assert_eq!(store_b.len(), 2);
        assert!(store_b.lookup(Fingerprint::new(1)).is_some());
        assert!(store_b.lookup(Fingerprint::new(2)).is_some());
    }

    #[tokio::test]
    async fn test_empty_buffers_still_complete_round() {
        let fabric = InProcessFabric::new(2).unwrap();
        let (protocol_a, _) = protocol_over(Arc::new(fabric.endpoint(0).unwrap()), 1);
        let (protocol_b, _) = protocol_over(Arc::new(fabric.endpoint(1).unwrap()), 1);

        let task_a = tokio::spawn(async move { protocol_a.run_round().await });
        let task_b = tokio::spawn(async move { protocol_b.run_round().await });

        assert_eq!(
            task_a.await.unwrap().unwrap(),
            RoundOutcome::Completed { sent: 0, merged: 0 }
        );
        assert_eq!(
            task_b.await.unwrap().unwrap(),
            RoundOutcome::Completed { sent: 0, merged: 0 }
        );
    }

    struct FailingCollective;

    #[async_trait::async_trait]
    impl Collective for FailingCollective {
        fn size(&self) -> usize {
            2
        }
        fn rank(&self) -> usize {
            0
        }
        async fn all_gather(&self, _payload: Vec<u8>) -> CoreResult<Vec<Vec<u8>>> {
            Err(TransportError::RoundVanished.into())
        }
        async fn gather(&self, _root: usize, _payload: Vec<u8>) -> CoreResult<Option<Vec<Vec<u8>>>> {
            Err(TransportError::RoundVanished.into())
        }
        async fn broadcast(&self, _root: usize, _payload: Option<Vec<u8>>) -> CoreResult<Vec<u8>> {
            Err(TransportError::RoundVanished.into())
        }
        async fn barrier(&self) -> CoreResult<()> {
            Err(TransportError::RoundVanished.into())
        }
        fn post_signals(&self, _frame: SignalFrame) {}
        fn poll_signals(&self) -> Option<SignalFrame> {
            None
        }
    }

    #[tokio::test]
    async fn test_transport_failure_skips_round() {
        let (protocol, store) = protocol_over(Arc::new(FailingCollective), 1);
        protocol.buffer.offer(record(1, 10));

        let outcome = protocol.run_round().await.unwrap();
        assert_eq!(outcome, RoundOutcome::Skipped);

        // The drained records survive locally; only the share is lost.
        assert!(store.lookup(Fingerprint::new(1)).is_some());
        assert!(protocol.buffer.is_empty());

        // A skipped round is not fatal: the next round can still run.
        assert_eq!(protocol.rounds(), 1);
        let outcome = protocol.run_round().await.unwrap();
        assert_eq!(outcome, RoundOutcome::Skipped);
        assert_eq!(protocol.rounds(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let fabric = InProcessFabric::new(2).unwrap();
        let (protocol_a, store_a) = protocol_over(Arc::new(fabric.endpoint(0).unwrap()), 1);
        let (protocol_b, _store_b) = protocol_over(Arc::new(fabric.endpoint(1).unwrap()), 1);

        // The same record is shared in two consecutive rounds.
        protocol_b.buffer.offer(record(9, 6));

        let task_b = tokio::spawn(async move {
            protocol_b.run_round().await.unwrap();
            protocol_b.buffer.offer(record(9, 6));
            protocol_b.run_round().await.unwrap();
        });
        let task_a = tokio::spawn(async move {
            protocol_a.run_round().await.unwrap();
            protocol_a.run_round().await.unwrap();
            store_a
        });

        task_b.await.unwrap();
        let store_a = task_a.await.unwrap();
        assert_eq!(store_a.len(), 1);
        assert_eq!(store_a.lookup(Fingerprint::new(9)).unwrap().depth, 6);
    }
}
