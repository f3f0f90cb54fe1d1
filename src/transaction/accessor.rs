use std::future::Future;
use std::sync::Arc;

use log::warn;

use super::context;
use crate::core::{Result, TransactionMode, TxError};
use crate::session::factory::SessionFactory;
use crate::session::lane;
use crate::session::Session;

/// Session access for data-access adapters.
///
/// `read` and `write` hand the adapter's operation a session handle, valid
/// only for the duration of that one call. When a scope is active its session
/// is reused and a second session is never opened under it; outside any scope
/// a one-off session is opened, used, and finished around the single
/// operation.
pub struct SessionAccessor {
    factory: Arc<dyn SessionFactory>,
}

impl SessionAccessor {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    /// Runs a read operation. Reads are permitted under any scope mode.
    pub async fn read<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(ctx) = context::current() {
            return op(ctx.session().clone()).await;
        }

        let session = self.factory.open_read_session().await?;
        let result = lane::enter(session.lane(), op(session.clone())).await;
        match result {
            Ok(value) => {
                session.release().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(release_err) = session.release().await {
                    warn!(
                        "release of one-off read session {} failed: {}",
                        session.id(),
                        release_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Runs a write operation. Rejected before any driver call when the
    /// innermost active scope is read-only; outside any scope the operation
    /// runs in its own short write transaction.
    pub async fn write<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(ctx) = context::current() {
            if ctx.mode() == TransactionMode::ReadOnly {
                return Err(TxError::ReadOnlyViolation {
                    operation: "write".to_string(),
                });
            }
            return op(ctx.session().clone()).await;
        }

        let session = self.factory.open_write_transaction().await?;
        let result = lane::enter(session.lane(), op(session.clone())).await;
        match result {
            Ok(value) => match session.commit().await {
                Ok(()) => Ok(value),
                Err(err) => {
                    let _ = session.rollback().await;
                    Err(err)
                }
            },
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(
                        "rollback of one-off write transaction {} failed: {}",
                        session.id(),
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}
