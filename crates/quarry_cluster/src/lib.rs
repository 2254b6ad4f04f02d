//! QUARRY Cluster
//!
//! Distributed-search coordination: best-result exchange, final-answer
//! consensus, cluster-wide statistics, and cooperative cancellation.
//! Degrades to a correct, zero-overhead single-node system when
//! clustering is disabled.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod collective;
pub mod consensus;
pub mod context;
pub mod exchange;
pub mod input;
pub mod membership;
pub mod signals;
pub mod stats;
pub mod store;

pub use buffer::{ExchangeBuffer, Offer};
pub use collective::{
    Collective, FabricEndpoint, InProcessFabric, LocalCollective, SignalFrame, TransportError,
};
pub use consensus::{ConsensusProcedure, SelectionPolicy, select};
pub use context::{ClusterConfig, ClusterContext};
pub use exchange::{ExchangeProtocol, RoundOutcome};
pub use input::InputRelay;
pub use membership::Membership;
pub use signals::{SignalChannel, SignalPoll, SignalState};
pub use stats::WorkCounter;
pub use store::{MemoryStore, ResultStore};
