//! Shared search results and answer candidates.
//!
//! A [`ResultRecord`] is one discovered result worth sharing with other
//! workers; its `depth` is the quality metric used to prioritize sharing.
//! An [`AnswerCandidate`] is one worker's proposed final answer at search
//! termination. Position keys and answers are opaque to the coordination
//! layer.

use crate::id::WorkerId;
use serde::{Deserialize, Serialize};

/// Opaque fingerprint of a search position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Create a fingerprint from a raw key
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Get the raw key
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Opaque proposed move or solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Answer(u64);

impl Answer {
    /// Create an answer from a raw encoding
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw encoding
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Whether a recorded score is exact or a one-sided bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    /// The score is the true value
    Exact,
    /// The score is a lower bound on the true value
    Lower,
    /// The score is an upper bound on the true value
    Upper,
}

impl Bound {
    /// Check whether this bound kind is more informative than another.
    ///
    /// `Exact` outranks both one-sided bounds; the one-sided bounds do
    /// not outrank each other.
    #[must_use]
    pub fn outranks(&self, other: Bound) -> bool {
        matches!(self, Self::Exact) && !matches!(other, Bound::Exact)
    }
}

/// A discovered result worth sharing across the cluster
///
/// Immutable once created; ownership transfers to the exchange buffer
/// when offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Position fingerprint
    pub key: Fingerprint,
    /// Derivation depth - higher means more thoroughly derived
    pub depth: i32,
    /// Evaluation value
    pub score: i32,
    /// Whether `score` is exact or a one-sided bound
    pub bound: Bound,
    /// The move or solution found at this position
    pub answer: Answer,
    /// Auxiliary static evaluation
    pub eval: i32,
}

impl ResultRecord {
    /// Create a new result record
    #[must_use]
    pub const fn new(
        key: Fingerprint,
        depth: i32,
        score: i32,
        bound: Bound,
        answer: Answer,
        eval: i32,
    ) -> Self {
        Self {
            key,
            depth,
            score,
            bound,
            answer,
            eval,
        }
    }
}

/// One worker's proposed final answer at search termination
///
/// Produced once per worker, consumed exactly once by the consensus
/// procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    /// The proposed final answer
    pub answer: Answer,
    /// Depth that produced the answer
    pub depth: i32,
    /// Score of the answer
    pub score: i32,
    /// Worker that reported the candidate
    pub origin: WorkerId,
}

impl AnswerCandidate {
    /// Create a new answer candidate
    #[must_use]
    pub const fn new(answer: Answer, depth: i32, score: i32, origin: WorkerId) -> Self {
        Self {
            answer,
            depth,
            score,
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fingerprint_roundtrip() {
        let key = Fingerprint::new(0xdead_beef);
        assert_eq!(key.as_u64(), 0xdead_beef);
        assert_eq!(key.to_string(), "00000000deadbeef");
    }

    #[test]
    fn test_bound_outranks() {
        assert!(Bound::Exact.outranks(Bound::Lower));
        assert!(Bound::Exact.outranks(Bound::Upper));
        assert!(!Bound::Exact.outranks(Bound::Exact));
        assert!(!Bound::Lower.outranks(Bound::Upper));
        assert!(!Bound::Upper.outranks(Bound::Exact));
    }

    #[test]
    fn test_result_record_new() {
        let record = ResultRecord::new(
            Fingerprint::new(1),
            12,
            40,
            Bound::Exact,
            Answer::new(77),
            35,
        );
        assert_eq!(record.depth, 12);
        assert_eq!(record.score, 40);
        assert_eq!(record.answer, Answer::new(77));
    }

    #[test]
    fn test_answer_candidate_new() {
        let candidate = AnswerCandidate::new(Answer::new(9), 10, 50, WorkerId::new(2));
        assert_eq!(candidate.origin, WorkerId::new(2));
        assert_eq!(candidate.score, 50);
    }

    fn bound_strategy() -> impl Strategy<Value = Bound> {
        prop_oneof![Just(Bound::Exact), Just(Bound::Lower), Just(Bound::Upper)]
    }

    proptest! {
        #[test]
        fn prop_record_encoding_roundtrip(
            key in any::<u64>(),
            depth in any::<i32>(),
            score in any::<i32>(),
            bound in bound_strategy(),
            answer in any::<u64>(),
            eval in any::<i32>(),
        ) {
            let record = ResultRecord::new(
                Fingerprint::new(key),
                depth,
                score,
                bound,
                Answer::new(answer),
                eval,
            );
            let bytes = postcard::to_allocvec(&record).unwrap();
            let decoded: ResultRecord = postcard::from_bytes(&bytes).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }
}
