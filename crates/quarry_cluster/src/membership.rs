//! Cluster membership for a fixed set of workers.
//!
//! The worker set is fixed for the lifetime of the run: `size` workers
//! with dense ranks `[0, size)`, rank 0 always the root. All queries are
//! pure and callable from any thread without synchronization.

use quarry_core::{CoreError, CoreResult, WorkerId};
use serde::{Deserialize, Serialize};

/// Fixed cluster membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    rank: WorkerId,
    size: usize,
}

impl Membership {
    /// Establish membership for this worker
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Setup`] if the size is zero or the rank is
    /// outside `[0, size)`.
    pub fn establish(rank: WorkerId, size: usize) -> CoreResult<Self> {
        if size == 0 {
            return Err(CoreError::Setup {
                reason: "cluster size must be at least 1".to_string(),
            });
        }
        if rank.as_usize() >= size {
            return Err(CoreError::Setup {
                reason: format!("rank {} outside cluster of size {}", rank, size),
            });
        }
        Ok(Self { rank, size })
    }

    /// The degenerate single-node membership
    #[must_use]
    pub const fn single() -> Self {
        Self {
            rank: WorkerId::ROOT,
            size: 1,
        }
    }

    /// Get the fixed worker count
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Get this worker's identity
    #[must_use]
    pub const fn rank(&self) -> WorkerId {
        self.rank
    }

    /// Check whether this worker is the root (leader)
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.rank.is_root()
    }

    /// Check whether clustering is effectively disabled
    #[must_use]
    pub const fn is_single(&self) -> bool {
        self.size == 1
    }
}

impl Default for Membership {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_establish_valid() {
        let membership = Membership::establish(WorkerId::new(1), 4).unwrap();
        assert_eq!(membership.size(), 4);
        assert_eq!(membership.rank(), WorkerId::new(1));
        assert!(!membership.is_root());
        assert!(!membership.is_single());
    }

    #[test]
    fn test_establish_root() {
        let membership = Membership::establish(WorkerId::ROOT, 4).unwrap();
        assert!(membership.is_root());
    }

    #[test]
    fn test_establish_zero_size() {
        let result = Membership::establish(WorkerId::ROOT, 0);
        assert!(matches!(result, Err(CoreError::Setup { .. })));
    }

    #[test]
    fn test_establish_rank_out_of_range() {
        let result = Membership::establish(WorkerId::new(4), 4);
        assert!(matches!(result, Err(CoreError::Setup { .. })));
    }

    #[test]
    fn test_single() {
        let membership = Membership::single();
        assert_eq!(membership.size(), 1);
        assert_eq!(membership.rank(), WorkerId::ROOT);
        assert!(membership.is_root());
        assert!(membership.is_single());
    }

    #[test]
    fn test_default_is_single() {
        assert_eq!(Membership::default(), Membership::single());
    }
}
