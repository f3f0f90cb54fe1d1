//! Execution lanes.
//!
//! A lane is the single cooperative scheduling unit a session is bound to.
//! Tokio migrates tasks across OS threads, so thread identity cannot carry
//! the affinity invariant; lanes are logical tokens held in a task-local
//! slot for exactly one call tree instead. A session records the lane it was
//! opened on, and every operation checks the active lane against it.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LANE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static ACTIVE_LANE: LaneId;
}

/// Identity of one execution lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneId(u64);

impl LaneId {
    pub(crate) fn next() -> Self {
        LaneId(NEXT_LANE_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// The lane the current task is executing on, if it entered one.
    pub fn current() -> Option<LaneId> {
        ACTIVE_LANE.try_with(|lane| *lane).ok()
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane_{}", self.0)
    }
}

/// Runs `fut` with `lane` active for the duration of the call and everything
/// it awaits. Detached work spawned from inside does not inherit the lane.
pub(crate) async fn enter<F: Future>(lane: LaneId, fut: F) -> F::Output {
    ACTIVE_LANE.scope(lane, fut).await
}

/// Lane for a session being opened: the active one when the factory is
/// called from inside a scope, a fresh one otherwise.
pub(crate) fn current_or_new() -> LaneId {
    LaneId::current().unwrap_or_else(LaneId::next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_ids_are_unique() {
        let a = LaneId::next();
        let b = LaneId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_no_lane_outside_enter() {
        tokio_test::block_on(async {
            assert_eq!(LaneId::current(), None);
        });
    }

    #[test]
    fn test_enter_scopes_the_lane() {
        tokio_test::block_on(async {
            let lane = LaneId::next();
            enter(lane, async move {
                assert_eq!(LaneId::current(), Some(lane));
            })
            .await;
            assert_eq!(LaneId::current(), None);
        });
    }

    #[test]
    fn test_nested_enter_restores_outer_lane() {
        tokio_test::block_on(async {
            let outer = LaneId::next();
            let inner = LaneId::next();
            enter(outer, async move {
                enter(inner, async move {
                    assert_eq!(LaneId::current(), Some(inner));
                })
                .await;
                assert_eq!(LaneId::current(), Some(outer));
            })
            .await;
        });
    }
}
