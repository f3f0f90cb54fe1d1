use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::core::{Deadline, Timeout, TransactionMode};
use crate::session::Session;

tokio::task_local! {
    static AMBIENT: Arc<AmbientContext>;
}

/// The implicitly propagated value carrying the active session, mode, and
/// deadline for the current call tree.
///
/// Immutable after construction. Nesting layers a new context over the
/// parent's slot (same session, its own possibly tighter deadline computed at
/// nesting time) and never writes anything back to the parent.
pub struct AmbientContext {
    session: Session,
    mode: TransactionMode,
    deadline: Deadline,
    started_at: Instant,
}

impl AmbientContext {
    pub(crate) fn new(
        session: Session,
        mode: TransactionMode,
        deadline: Deadline,
        started_at: Instant,
    ) -> Self {
        Self {
            session,
            mode,
            deadline,
            started_at,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Budget left before this scope's deadline, clamped at zero.
    pub fn remaining_deadline(&self) -> Timeout {
        self.deadline.remaining()
    }
}

/// The ambient context of the current call tree, if a scope is active.
pub fn current() -> Option<Arc<AmbientContext>> {
    AMBIENT.try_with(Arc::clone).ok()
}

/// Runs `fut` with `ctx` ambient for exactly that call and its descendants.
pub(crate) async fn scope<F: Future>(ctx: Arc<AmbientContext>, fut: F) -> F::Output {
    AMBIENT.scope(ctx, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::lane::LaneId;
    use crate::session::{Session, SessionBackend};
    use crate::core::{Record, Result};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoopBackend;

    #[async_trait]
    impl SessionBackend for NoopBackend {
        async fn get(&self, _: &str, _: &str) -> Result<Option<Record>> {
            Ok(None)
        }
        async fn put(&self, _: &str, _: &str, _: Record) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn scan(&self, _: &str) -> Result<Vec<(String, Record)>> {
            Ok(Vec::new())
        }
        async fn commit(&self) -> Result<()> {
            Ok(())
        }
        async fn rollback(&self) -> Result<()> {
            Ok(())
        }
        async fn release(&self) -> Result<()> {
            Ok(())
        }
    }

    fn test_context(mode: TransactionMode, timeout: Timeout) -> Arc<AmbientContext> {
        let session = Session::bind(mode, LaneId::next(), std::sync::Arc::new(NoopBackend));
        let started = Instant::now();
        Arc::new(AmbientContext::new(
            session,
            mode,
            timeout.deadline_after(started),
            started,
        ))
    }

    #[tokio::test]
    async fn test_no_context_outside_scope() {
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_scope_sets_and_clears_context() {
        let ctx = test_context(TransactionMode::ReadWrite, Timeout::from_secs(30));
        let session_id = ctx.session().id();

        scope(ctx, async move {
            let ambient = current().expect("context must be ambient inside the scope");
            assert_eq!(ambient.session().id(), session_id);
            assert_eq!(ambient.mode(), TransactionMode::ReadWrite);
        })
        .await;

        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_nested_scope_shadows_and_restores() {
        let outer = test_context(TransactionMode::ReadWrite, Timeout::from_secs(30));
        let inner = test_context(TransactionMode::ReadOnly, Timeout::from_secs(10));
        let inner_id = inner.session().id();
        let outer_id = outer.session().id();

        scope(outer, async move {
            scope(inner, async move {
                assert_eq!(current().unwrap().session().id(), inner_id);
            })
            .await;
            assert_eq!(current().unwrap().session().id(), outer_id);
        })
        .await;
    }

    #[tokio::test]
    async fn test_remaining_deadline_tracks_elapsed_time() {
        let ctx = test_context(TransactionMode::ReadWrite, Timeout::from_secs(30));
        match ctx.remaining_deadline() {
            Timeout::Finite(left) => {
                assert!(left <= Duration::from_secs(30));
                assert!(left > Duration::from_secs(29));
            }
            Timeout::Infinite => panic!("finite scope must have a finite remainder"),
        }

        let unbounded = test_context(TransactionMode::ReadWrite, Timeout::Infinite);
        assert_eq!(unbounded.remaining_deadline(), Timeout::Infinite);
    }
}
