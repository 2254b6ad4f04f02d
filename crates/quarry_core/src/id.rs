//! Worker identities for QUARRY clusters.
//!
//! Identities are dense integer ranks in `[0, size)`, fixed for the
//! lifetime of the run. Rank 0 is always the root.

use serde::{Deserialize, Serialize};

/// Worker identifier - a worker's fixed rank within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u32);

impl WorkerId {
    /// The root (leader) identity
    pub const ROOT: Self = Self(0);

    /// Create a worker identity from a rank
    #[must_use]
    pub const fn new(rank: u32) -> Self {
        Self(rank)
    }

    /// Get the rank as a raw integer
    #[must_use]
    pub const fn rank(&self) -> u32 {
        self.0
    }

    /// Get the rank as an index
    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Check whether this identity is the root
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.0 == 0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::ROOT
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(rank: u32) -> Self {
        Self(rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_zero() {
        assert_eq!(WorkerId::ROOT.rank(), 0);
        assert!(WorkerId::ROOT.is_root());
    }

    #[test]
    fn test_non_root() {
        let id = WorkerId::new(3);
        assert_eq!(id.rank(), 3);
        assert_eq!(id.as_usize(), 3);
        assert!(!id.is_root());
    }

    #[test]
    fn test_ordering() {
        assert!(WorkerId::new(0) < WorkerId::new(1));
        assert!(WorkerId::new(1) < WorkerId::new(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(WorkerId::new(2).to_string(), "worker_2");
    }

    #[test]
    fn test_default_is_root() {
        assert_eq!(WorkerId::default(), WorkerId::ROOT);
    }
}
