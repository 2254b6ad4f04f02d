//! Final-answer consensus.
//!
//! Run once per search, after every worker has locally finished: each
//! worker reports one [`AnswerCandidate`], the root collects all of them,
//! applies a deterministic selection policy, and the winner is broadcast
//! back so every worker returns the same final answer.

use crate::collective::{Collective, decode, encode};
use quarry_core::{AnswerCandidate, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Policy for picking the cluster's final answer
///
/// The weighting of score against depth is a policy choice, not a law;
/// both variants are deterministic for the same multiset of candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Highest score, then greatest depth, then lowest origin rank
    #[default]
    ScoreFirst,
    /// Each candidate's answer accumulates `score - min_score + depth`
    /// votes; the answer with the strictly highest total wins, scanned in
    /// rank order, and its best candidate is chosen score-first
    DepthWeightedVotes,
}

fn score_first_wins(challenger: &AnswerCandidate, incumbent: &AnswerCandidate) -> bool {
    if challenger.score != incumbent.score {
        return challenger.score > incumbent.score;
    }
    if challenger.depth != incumbent.depth {
        return challenger.depth > incumbent.depth;
    }
    challenger.origin < incumbent.origin
}

fn select_score_first(candidates: &[AnswerCandidate]) -> AnswerCandidate {
    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if score_first_wins(candidate, &best) {
            best = *candidate;
        }
    }
    best
}

fn select_depth_weighted(candidates: &[AnswerCandidate]) -> AnswerCandidate {
    let min_score = candidates
        .iter()
        .map(|c| c.score)
        .min()
        .unwrap_or_default();

    // Widen before subtracting so extreme score spreads cannot overflow.
    let mut votes: HashMap<_, i64> = HashMap::new();
    for candidate in candidates {
        *votes.entry(candidate.answer).or_insert(0) +=
            i64::from(candidate.score) - i64::from(min_score) + i64::from(candidate.depth);
    }

    // Scan in rank order with a strict comparison so the first-seen
    // answer keeps a tie, then settle on that answer's best candidate.
    let mut winner = candidates[0];
    let mut best_vote = votes[&winner.answer];
    for candidate in &candidates[1..] {
        let vote = votes[&candidate.answer];
        if vote > best_vote {
            best_vote = vote;
            winner = *candidate;
        }
    }

    let mut best = winner;
    for candidate in candidates {
        if candidate.answer == winner.answer && score_first_wins(candidate, &best) {
            best = *candidate;
        }
    }
    best
}

/// Deterministically pick the winning candidate
///
/// # Errors
///
/// Returns [`CoreError::Protocol`] for an empty candidate set; a
/// correctly driven cluster always supplies exactly one candidate per
/// worker.
pub fn select(candidates: &[AnswerCandidate], policy: SelectionPolicy) -> CoreResult<AnswerCandidate> {
    if candidates.is_empty() {
        return Err(CoreError::Protocol {
            reason: "consensus over an empty candidate set".to_string(),
        });
    }
    let winner = match policy {
        SelectionPolicy::ScoreFirst => select_score_first(candidates),
        SelectionPolicy::DepthWeightedVotes => select_depth_weighted(candidates),
    };
    Ok(winner)
}

/// The cluster-wide consensus procedure
pub struct ConsensusProcedure {
    collective: Arc<dyn Collective>,
    policy: SelectionPolicy,
}

impl ConsensusProcedure {
    /// Create the procedure over a collective backend
    #[must_use]
    pub fn new(collective: Arc<dyn Collective>, policy: SelectionPolicy) -> Self {
        Self { collective, policy }
    }

    /// The active selection policy
    #[must_use]
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Report this worker's candidate and learn the cluster's answer
    ///
    /// Every worker calls this exactly once after it has finished. The
    /// root blocks until all candidates arrive, selects, and broadcasts
    /// the winner; the call returns the same winner on every worker.
    /// In single-node mode the local candidate wins outright.
    ///
    /// # Errors
    ///
    /// Returns a transport or encoding error if the collective round
    /// cannot complete.
    pub async fn decide(&self, mine: AnswerCandidate) -> CoreResult<AnswerCandidate> {
        if self.collective.size() == 1 {
            return Ok(mine);
        }

        const ROOT: usize = 0;
        let gathered = self.collective.gather(ROOT, encode(&mine)?).await?;

        let chosen = match gathered {
            Some(payloads) => {
                let candidates: Vec<AnswerCandidate> = payloads
                    .iter()
                    .map(|bytes| decode(bytes))
                    .collect::<CoreResult<_>>()?;
                let winner = select(&candidates, self.policy)?;
                debug!(
                    origin = winner.origin.rank(),
                    score = winner.score,
                    depth = winner.depth,
                    "consensus winner selected"
                );
                Some(encode(&winner)?)
            }
            None => None,
        };

        let winner_bytes = self.collective.broadcast(ROOT, chosen).await?;
        decode(&winner_bytes)
    }
}
