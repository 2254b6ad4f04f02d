//! Cluster context facade.
//!
//! One explicitly initialized context object per worker wires the whole
//! coordination layer together: membership, exchange buffer and
//! protocol, consensus, statistics, cancellation, and the input relay.
//! The search algorithm talks only to this facade; whether the backend
//! is a real cluster or the single-node degenerate case is decided once
//! at construction, never at the call sites.

use crate::buffer::{self, ExchangeBuffer, Offer};
use crate::collective::{Collective, LocalCollective};
use crate::consensus::{ConsensusProcedure, SelectionPolicy};
use crate::exchange::{ExchangeProtocol, RoundOutcome};
use crate::input::InputRelay;
use crate::membership::Membership;
use crate::signals::{SignalChannel, SignalPoll};
use crate::stats::WorkCounter;
use crate::store::ResultStore;
use quarry_core::{AnswerCandidate, CoreError, CoreResult, ResultRecord, WorkerId};
use std::io::BufRead;
use std::sync::Arc;
use tracing::info;

/// Cluster configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Exchange buffer capacity
    pub buffer_capacity: usize,
    /// Search iterations between exchange rounds
    pub exchange_interval: u64,
    /// Records at or below this depth are kept local, never shared
    pub share_depth_min: i32,
    /// Final-answer selection policy
    pub policy: SelectionPolicy,
}

impl ClusterConfig {
    /// Create a config with the default tuning
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_capacity: buffer::DEFAULT_CAPACITY,
            exchange_interval: 1024,
            share_depth_min: 5,
            policy: SelectionPolicy::default(),
        }
    }

    /// Set the exchange buffer capacity
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the exchange cadence in search iterations
    #[must_use]
    pub fn with_exchange_interval(mut self, interval: u64) -> Self {
        self.exchange_interval = interval;
        self
    }

    /// Set the minimum depth worth sharing
    #[must_use]
    pub fn with_share_depth_min(mut self, depth: i32) -> Self {
        self.share_depth_min = depth;
        self
    }

    /// Set the final-answer selection policy
    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn validate(&self) -> CoreResult<()> {
        if self.buffer_capacity == 0 {
            return Err(CoreError::Validation {
                field: "buffer_capacity".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.exchange_interval == 0 {
            return Err(CoreError::Validation {
                field: "exchange_interval".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-worker coordination context
pub struct ClusterContext {
    membership: Membership,
    buffer: Arc<ExchangeBuffer>,
    store: Arc<dyn ResultStore>,
    exchange: ExchangeProtocol,
    consensus: ConsensusProcedure,
    counter: Arc<WorkCounter>,
    signals: SignalChannel,
    input: InputRelay,
    config: ClusterConfig,
}

impl ClusterContext {
    /// Initialize the context over a collective backend
    ///
    /// Establishes membership against the backend and wires every
    /// component. Called once per worker; the backend itself guards
    /// against a rank being initialized twice.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Setup`] or [`CoreError::Validation`] if the
    /// membership or configuration is invalid. Setup failures are fatal
    /// to the run; no partial-cluster operation is attempted.
    pub fn init(
        config: ClusterConfig,
        store: Arc<dyn ResultStore>,
        collective: Arc<dyn Collective>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let membership = Membership::establish(
            WorkerId::new(collective.rank() as u32),
            collective.size(),
        )?;

        let buffer = Arc::new(ExchangeBuffer::new(config.buffer_capacity));
        let counter = Arc::new(WorkCounter::new());
        let exchange = ExchangeProtocol::new(
            Arc::clone(&collective),
            Arc::clone(&buffer),
            Arc::clone(&store),
            config.exchange_interval,
        );
        let consensus = ConsensusProcedure::new(Arc::clone(&collective), config.policy);
        let signals = SignalChannel::new(Arc::clone(&collective), Arc::clone(&counter));
        let input = InputRelay::new(Arc::clone(&collective));

        info!(
            rank = membership.rank().rank(),
            size = membership.size(),
            "cluster context initialized"
        );

        Ok(Self {
            membership,
            buffer,
            store,
            exchange,
            consensus,
            counter,
            signals,
            input,
            config,
        })
    }

    /// Initialize the degenerate single-node context
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the configuration is invalid.
    pub fn single_node(config: ClusterConfig, store: Arc<dyn ResultStore>) -> CoreResult<Self> {
        Self::init(config, store, Arc::new(LocalCollective::new()))
    }

    /// Tear the context down
    ///
    /// Safe to call after a partially failed setup; the backend is
    /// released when the last handle drops.
    pub fn finalize(self) {
        info!(rank = self.membership.rank().rank(), "cluster context finalized");
    }

    /// The fixed worker count
    #[must_use]
    pub fn size(&self) -> usize {
        self.membership.size()
    }

    /// This worker's identity
    #[must_use]
    pub fn rank(&self) -> WorkerId {
        self.membership.rank()
    }

    /// Check whether this worker is the root (leader)
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.membership.is_root()
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Record a discovered result
    ///
    /// Always merged into the local store; offered for cluster-wide
    /// sharing only when derived deeply enough to be worth the wire.
    pub fn save(&self, record: ResultRecord) -> Offer {
        self.store.merge(&record);
        if self.size() > 1 && record.depth > self.config.share_depth_min {
            self.buffer.offer(record)
        } else {
            Offer::Rejected
        }
    }

    /// Count one search iteration; true when an exchange round is due
    pub fn note_iteration(&self) -> bool {
        self.exchange.note_iteration()
    }

    /// Run one exchange round
    ///
    /// Every worker must reach this call in the same logical round; drive
    /// it from [`Self::note_iteration`] so all workers agree on round
    /// boundaries.
    ///
    /// # Errors
    ///
    /// Returns an encoding error on a malformed batch; transport failures
    /// skip the round.
    pub async fn exchange_round(&self) -> CoreResult<RoundOutcome> {
        self.exchange.run_round().await
    }

    /// Count one iteration and run an exchange round when one is due
    ///
    /// Convenience for the common search-loop shape; returns `None` when
    /// no round was due.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::exchange_round`] errors.
    pub async fn exchange_if_due(&self) -> CoreResult<Option<RoundOutcome>> {
        if self.note_iteration() {
            Ok(Some(self.exchange_round().await?))
        } else {
            Ok(None)
        }
    }

    /// Add processed work units (hot path)
    pub fn add_nodes(&self, nodes: u64) {
        self.counter.add(nodes);
    }

    /// Cluster-wide nodes searched: local count plus the last learned
    /// remainder from the signal aggregate
    #[must_use]
    pub fn nodes_searched(&self) -> u64 {
        self.counter.total()
    }

    /// Report this worker's final candidate and learn the cluster's answer
    ///
    /// # Errors
    ///
    /// Returns a transport or encoding error if the consensus round fails.
    pub async fn decide(&self, mine: AnswerCandidate) -> CoreResult<AnswerCandidate> {
        self.consensus.decide(mine).await
    }

    /// Reset the cancellation channel and statistics at search start
    pub fn signals_init(&self) {
        self.signals.init();
    }

    /// Non-blocking stop check for the search hot loop
    pub fn signals_poll(&self) -> SignalPoll {
        self.signals.poll()
    }

    /// Request a cluster-wide stop (idempotent)
    pub fn request_stop(&self) {
        self.signals.request_stop();
    }

    /// Full cancellation barrier at search end
    ///
    /// # Errors
    ///
    /// Returns a transport error if the rendezvous cannot complete.
    pub async fn signals_sync(&self) -> CoreResult<()> {
        self.signals.sync().await
    }

    /// Current cancellation state
    #[must_use]
    pub fn signal_state(&self) -> crate::signals::SignalState {
        self.signals.state()
    }

    /// Read the next shared command line (root reads, all receive)
    ///
    /// # Errors
    ///
    /// Returns a transport error if the broadcast fails.
    pub async fn next_line<R: BufRead>(&self, input: &mut R) -> CoreResult<Option<String>> {
        self.input.next_line(input).await
    }
}
