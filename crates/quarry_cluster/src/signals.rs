//! Cooperative cancellation channel.
//!
//! Two tiers: a cheap non-blocking [`SignalChannel::poll`] for the search
//! hot loop, and an occasional [`SignalChannel::sync`] rendezvous that
//! guarantees every worker has observed the terminal state. Stop requests
//! propagate as summed [`SignalFrame`]s through the collective's signal
//! cells; the same frames carry the work counts that feed the statistics
//! aggregate.
//!
//! Per-worker state machine: `Idle -> StopRequested -> Acknowledged`.
//! Only an explicit [`SignalChannel::init`] returns to `Idle`.

use crate::collective::{Collective, SignalFrame};
use crate::stats::WorkCounter;
use quarry_core::CoreResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Channel state, advanced monotonically within one search
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalState {
    /// No stop condition observed
    Idle,
    /// A stop has been requested somewhere in the cluster
    StopRequested,
    /// Every worker is known to have observed the stop
    Acknowledged,
}

impl SignalState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::StopRequested,
            _ => Self::Acknowledged,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::StopRequested => 1,
            Self::Acknowledged => 2,
        }
    }
}

/// Result of a non-blocking poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPoll {
    /// No stop observed; keep searching
    Continue,
    /// A stop has been observed; wind down
    Stop,
}

/// Cooperative cancellation channel for one worker
pub struct SignalChannel {
    collective: Arc<dyn Collective>,
    counter: Arc<WorkCounter>,
    state: AtomicU8,
    stop_flag: AtomicBool,
}

impl SignalChannel {
    /// Create a channel over a collective backend
    #[must_use]
    pub fn new(collective: Arc<dyn Collective>, counter: Arc<WorkCounter>) -> Self {
        Self {
            collective,
            counter,
            state: AtomicU8::new(SignalState::Idle.as_u8()),
            stop_flag: AtomicBool::new(false),
        }
    }

    /// Current channel state
    pub fn state(&self) -> SignalState {
        SignalState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Reset to `Idle` at the start of a search
    ///
    /// Also zeroes the work counter and this worker's published frame.
    pub fn init(&self) {
        self.counter.reset();
        self.stop_flag.store(false, Ordering::Release);
        self.state
            .store(SignalState::Idle.as_u8(), Ordering::Release);
        self.collective.post_signals(SignalFrame::default());
    }

    /// Request a cluster-wide stop (idempotent)
    ///
    /// The request travels through the channel like anyone else's: this
    /// worker itself observes "stop" on its next poll.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// Check whether this worker has posted a stop request
    pub fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Non-blocking stop check for the search hot loop
    ///
    /// Publishes this worker's frame, probes the cluster sum, refreshes
    /// the remote work aggregate, and reports whether any worker has
    /// requested a stop. Single-node mode never reports a stop here;
    /// local cancellation is the search's own responsibility then.
    pub fn poll(&self) -> SignalPoll {
        if self.collective.size() == 1 {
            return SignalPoll::Continue;
        }

        let sent = SignalFrame::new(
            self.counter.local(),
            u64::from(self.stop_flag.load(Ordering::Acquire)),
        );
        self.collective.post_signals(sent);

        if let Some(sum) = self.collective.poll_signals() {
            self.counter.set_others(sum.nodes.saturating_sub(sent.nodes));
            if sum.stops > 0 {
                // Echo the stop so this worker counts toward the
                // cluster-wide total from now on.
                self.stop_flag.store(true, Ordering::Release);
                let _ = self.state.compare_exchange(
                    SignalState::Idle.as_u8(),
                    SignalState::StopRequested.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                return SignalPoll::Stop;
            }
        }

        if self.state() >= SignalState::StopRequested {
            SignalPoll::Stop
        } else {
            SignalPoll::Continue
        }
    }

    /// Full synchronization barrier at search end
    ///
    /// Blocks until every worker has posted a stop, then rendezvouses and
    /// moves this worker to `Acknowledged`. Expensive; call a bounded
    /// number of times per search.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the rendezvous cannot complete.
    pub async fn sync(&self) -> CoreResult<()> {
        // Reaching sync is itself a terminal decision.
        self.stop_flag.store(true, Ordering::Release);

        if self.collective.size() > 1 {
            loop {
                self.poll();
                if let Some(sum) = self.collective.poll_signals() {
                    if sum.stops as usize >= self.collective.size() {
                        break;
                    }
                }
                tokio::task::yield_now().await;
            }
            self.collective.barrier().await?;
        }

        self.state
            .store(SignalState::Acknowledged.as_u8(), Ordering::Release);
        Ok(())
    }
}
