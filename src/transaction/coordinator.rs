use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

use super::config::CoordinatorConfig;
use super::context::{self, AmbientContext};
use crate::core::{Result, Timeout, TransactionMode, TxError};
use crate::session::factory::SessionFactory;
use crate::session::lane;
use crate::session::Session;

/// Entry point for business-layer code.
///
/// `transactional` and `read_only` run a body inside a scope. The first scope
/// on a call tree opens a session from the factory and owns its outcome:
/// commit (or release, for read sessions) on normal return, rollback on any
/// error or timeout. A scope opened while another is active reuses the
/// ambient session unconditionally: it neither commits nor rolls back, and
/// its deadline can only tighten the budget it inherited.
///
/// # Examples
///
/// ```
/// use journal_tx::{Database, Result};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let db = Database::in_memory();
///
/// db.coordinator()
///     .transactional(|| async {
///         db.accessor()
///             .write(|session| async move {
///                 session.put("members", "m-1", json!({"name": "Alice"})).await
///             })
///             .await
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TransactionCoordinator {
    factory: Arc<dyn SessionFactory>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_config(factory: Arc<dyn SessionFactory>, config: CoordinatorConfig) -> Result<Self> {
        config.validate().map_err(TxError::Config)?;
        Ok(Self { factory, config })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Runs `body` in a read-write scope with the default timeout.
    pub async fn transactional<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_scope(TransactionMode::ReadWrite, self.config.default_timeout, body)
            .await
    }

    /// Runs `body` in a read-write scope with an explicit time budget.
    pub async fn transactional_with_timeout<T, F, Fut>(&self, timeout: Timeout, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_scope(TransactionMode::ReadWrite, timeout, body).await
    }

    /// Runs `body` in a read-only scope with the default timeout.
    pub async fn read_only<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_scope(TransactionMode::ReadOnly, self.config.default_timeout, body)
            .await
    }

    /// Runs `body` in a read-only scope with an explicit time budget.
    pub async fn read_only_with_timeout<T, F, Fut>(&self, timeout: Timeout, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_scope(TransactionMode::ReadOnly, timeout, body).await
    }

    async fn run_scope<T, F, Fut>(
        &self,
        requested_mode: TransactionMode,
        requested: Timeout,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match context::current() {
            Some(parent) => self.run_nested(parent, requested_mode, requested, body).await,
            None => self.run_root(requested_mode, requested, body).await,
        }
    }

    /// A scope opened under an active one: reuse the parent's session, layer
    /// a context whose deadline is `min(requested, parent remaining)`.
    async fn run_nested<T, F, Fut>(
        &self,
        parent: Arc<AmbientContext>,
        requested_mode: TransactionMode,
        requested: Timeout,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // The effective mode is the narrower of parent and requested; a
        // read-write scope under a read-only one is rejected outright.
        let mode = match (parent.mode(), requested_mode) {
            (TransactionMode::ReadOnly, TransactionMode::ReadWrite) => {
                return Err(TxError::ReadOnlyViolation {
                    operation: "nested read-write scope".to_string(),
                });
            }
            (TransactionMode::ReadWrite, TransactionMode::ReadWrite) => TransactionMode::ReadWrite,
            _ => TransactionMode::ReadOnly,
        };

        let session = parent.session().clone();
        let started = Instant::now();
        let effective = requested.min(parent.remaining_deadline());
        let ctx = Arc::new(AmbientContext::new(
            session.clone(),
            mode,
            effective.deadline_after(started),
            started,
        ));

        debug!(
            "nested {} scope reusing {} (effective timeout {})",
            mode,
            session.id(),
            effective
        );

        let result = context::scope(ctx, run_with_deadline(effective, started, body())).await;

        // The body was cancelled mid-statement; the shared session cannot be
        // trusted to commit anymore, only the owner may roll it back.
        if matches!(result, Err(TxError::TimeoutExceeded { .. })) {
            session.poison();
        }

        result
    }

    /// The first scope on a call tree: open a session, run the body on the
    /// session's lane with the context ambient, and settle the outcome.
    async fn run_root<T, F, Fut>(
        &self,
        mode: TransactionMode,
        requested: Timeout,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = match mode {
            TransactionMode::ReadWrite => self.factory.open_write_transaction().await?,
            TransactionMode::ReadOnly => self.factory.open_read_session().await?,
        };

        let started = Instant::now();
        let ctx = Arc::new(AmbientContext::new(
            session.clone(),
            mode,
            requested.deadline_after(started),
            started,
        ));

        debug!("opened {} scope on {} (timeout {})", mode, session.id(), requested);

        let result = lane::enter(
            session.lane(),
            context::scope(ctx, run_with_deadline(requested, started, body())),
        )
        .await;

        if let Some(threshold) = self.config.slow_scope_warning {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                warn!(
                    "slow {} scope on {}: {:?} (threshold {:?})",
                    mode,
                    session.id(),
                    elapsed,
                    threshold
                );
            }
        }

        match result {
            Ok(value) => {
                self.settle_success(&session, mode).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(
                        "rollback of {} after failed scope also failed: {}",
                        session.id(),
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn settle_success(&self, session: &Session, mode: TransactionMode) -> Result<()> {
        if session.is_poisoned() {
            warn!("{} is rollback-only, refusing commit", session.id());
            if let Err(rollback_err) = session.rollback().await {
                warn!(
                    "rollback of rollback-only {} failed: {}",
                    session.id(),
                    rollback_err
                );
            }
            return Err(TxError::RollbackOnly);
        }

        match mode {
            TransactionMode::ReadWrite => {
                if let Err(err) = session.commit().await {
                    let _ = session.rollback().await;
                    return Err(err);
                }
                debug!("committed {}", session.id());
                Ok(())
            }
            TransactionMode::ReadOnly => {
                session.release().await?;
                debug!("released {}", session.id());
                Ok(())
            }
        }
    }
}

/// Applies `timeout` as a local cancellation bound around `fut`.
async fn run_with_deadline<T, Fut>(timeout: Timeout, started: Instant, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match timeout {
        Timeout::Infinite => fut.await,
        Timeout::Finite(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(TxError::TimeoutExceeded {
                elapsed: started.elapsed(),
                limit,
            }),
        },
    }
}
