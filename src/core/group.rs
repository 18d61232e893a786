//! Collision Groups
//!
//! Group filtering decides whether two bodies may collide before any shape
//! test happens. Two bodies that share the same *negative* group never collide.
//! Every player gets its own negative group from a [`GroupAllocator`]; a
//! projectile copies its thrower's group, and all obstacles share
//! [`CollisionGroup::OBSTACLE`].

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use serde::{Serialize, Deserialize};

/// Signed collision group tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CollisionGroup(pub i32);

impl CollisionGroup {
    /// No group: filtering never excludes the body.
    pub const NONE: Self = Self(0);

    /// Shared by every obstacle. Never handed out by the allocator.
    pub const OBSTACLE: Self = Self(i32::MIN);

    /// Raw group value.
    #[inline]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Returns true if a body in this group must never collide with a body in `other`.
    #[inline]
    pub fn excludes(self, other: Self) -> bool {
        self.0 < 0 && self.0 == other.0
    }

    /// Pack into collider user data.
    #[inline]
    pub fn to_user_data(self) -> u128 {
        self.0 as u32 as u128
    }

    /// Unpack from collider user data.
    #[inline]
    pub fn from_user_data(data: u128) -> Self {
        Self(data as u32 as i32)
    }
}

impl fmt::Display for CollisionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group({})", self.0)
    }
}

/// Allocator errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    /// Every negative group above the obstacle sentinel has been handed out.
    #[error("collision groups exhausted")]
    Exhausted,
}

/// Hands out unique negative collision groups.
///
/// Values start at -1 and decrease. They are never reused, so no two players
/// alive at the same time can share a group.
#[derive(Debug)]
pub struct GroupAllocator {
    next: AtomicI32,
}

impl GroupAllocator {
    /// Create a fresh allocator starting at -1.
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(-1),
        }
    }

    /// Allocate the next unused group.
    pub fn allocate(&self) -> Result<CollisionGroup, GroupError> {
        // Once `next` reaches the sentinel it stays there.
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current > CollisionGroup::OBSTACLE.0).then(|| current - 1)
            })
            .map(CollisionGroup)
            .map_err(|_| GroupError::Exhausted)
    }

    /// Number of groups handed out so far.
    pub fn allocated(&self) -> u32 {
        let next = self.next.load(Ordering::Acquire);
        (-1i64 - next as i64) as u32
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next: i32) -> Self {
        Self {
            next: AtomicI32::new(next),
        }
    }
}

impl Default for GroupAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_negative_group_excludes_itself() {
        let group = CollisionGroup(-3);
        assert!(group.excludes(CollisionGroup(-3)));
        assert!(!group.excludes(CollisionGroup(-4)));
        assert!(!group.excludes(CollisionGroup::OBSTACLE));
    }

    #[test]
    fn test_positive_and_zero_groups_never_exclude() {
        assert!(!CollisionGroup(5).excludes(CollisionGroup(5)));
        assert!(!CollisionGroup::NONE.excludes(CollisionGroup::NONE));
    }

    #[test]
    fn test_user_data_keeps_sign() {
        for group in [CollisionGroup(-1), CollisionGroup::OBSTACLE, CollisionGroup::NONE, CollisionGroup(7)] {
            assert_eq!(CollisionGroup::from_user_data(group.to_user_data()), group);
        }
    }

    #[test]
    fn test_obstacles_exclude_each_other() {
        assert!(CollisionGroup::OBSTACLE.excludes(CollisionGroup::OBSTACLE));
    }

    #[test]
    fn test_allocator_decrements() {
        let groups = GroupAllocator::new();
        assert_eq!(groups.allocate(), Ok(CollisionGroup(-1)));
        assert_eq!(groups.allocate(), Ok(CollisionGroup(-2)));
        assert_eq!(groups.allocate(), Ok(CollisionGroup(-3)));
        assert_eq!(groups.allocated(), 3);
    }

    #[test]
    fn test_allocator_never_returns_sentinel() {
        let groups = GroupAllocator::starting_at(i32::MIN + 2);
        assert_eq!(groups.allocate(), Ok(CollisionGroup(i32::MIN + 2)));
        assert_eq!(groups.allocate(), Ok(CollisionGroup(i32::MIN + 1)));
        assert_eq!(groups.allocate(), Err(GroupError::Exhausted));
        assert_eq!(groups.allocate(), Err(GroupError::Exhausted));
    }

    #[test]
    fn test_allocator_unique_across_threads() {
        let groups = Arc::new(GroupAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let groups = groups.clone();
                std::thread::spawn(move || {
                    (0..250).map(|_| groups.allocate().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for group in handle.join().unwrap() {
                assert!(group.get() < 0);
                assert!(seen.insert(group), "duplicate group {}", group);
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
