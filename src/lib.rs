// ============================================================================
// Journal Backend Transaction Core
// ============================================================================

pub mod core;
pub mod session;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{Deadline, Record, Result, Timeout, TransactionMode, TxError};
pub use session::{
    Session, SessionBackend, SessionId,
    factory::SessionFactory,
    lane::LaneId,
};
pub use storage::MemoryDriver;
pub use transaction::{
    AmbientContext, CoordinatorConfig, SessionAccessor, TransactionCoordinator,
};

use std::sync::Arc;

// ============================================================================
// High-level API
// ============================================================================

/// Transaction coordination bundle for the backend's service layer.
///
/// Holds the coordinator (used by business services to open scopes) and the
/// accessor (used by data-access adapters to reach the scope's session) over
/// one shared session factory. This is the recommended way to wire the crate
/// into an application.
///
/// # Examples
///
/// ```
/// use journal_tx::Database;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> journal_tx::Result<()> {
/// let db = Database::in_memory();
///
/// db.transactional(|| async {
///     db.write(|session| async move {
///         session.put("members", "m-1", json!({"name": "Alice"})).await
///     })
///     .await?;
///     db.write(|session| async move {
///         session
///             .put("journal", "e-1", json!({"member": "m-1", "text": "first entry"}))
///             .await
///     })
///     .await
/// })
/// .await?;
///
/// let entry = db.read(|session| async move { session.get("journal", "e-1").await }).await?;
/// assert!(entry.is_some());
/// # Ok(())
/// # }
/// ```
pub struct Database {
    coordinator: TransactionCoordinator,
    accessor: SessionAccessor,
}

impl Database {
    /// Creates a bundle over a fresh in-memory driver.
    pub fn in_memory() -> Self {
        let factory: Arc<dyn SessionFactory> = Arc::new(MemoryDriver::new());
        Self {
            coordinator: TransactionCoordinator::new(Arc::clone(&factory)),
            accessor: SessionAccessor::new(factory),
        }
    }

    /// Creates a bundle over a custom session factory.
    pub fn with_factory(
        factory: Arc<dyn SessionFactory>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        Ok(Self {
            coordinator: TransactionCoordinator::with_config(Arc::clone(&factory), config)?,
            accessor: SessionAccessor::new(factory),
        })
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn accessor(&self) -> &SessionAccessor {
        &self.accessor
    }

    /// Runs `body` in a read-write scope with the default timeout.
    pub async fn transactional<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.coordinator.transactional(body).await
    }

    /// Runs `body` in a read-only scope with the default timeout.
    pub async fn read_only<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.coordinator.read_only(body).await
    }

    /// Runs a read operation against the ambient session, or a one-off one.
    pub async fn read<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.accessor.read(op).await
    }

    /// Runs a write operation against the ambient session, or a one-off one.
    pub async fn write<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.accessor.write(op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_database_write_then_read() {
        let db = Database::in_memory();

        db.write(|session| async move {
            session.put("members", "m-1", json!({"name": "Alice"})).await
        })
        .await
        .unwrap();

        let found = db
            .read(|session| async move { session.get("members", "m-1").await })
            .await
            .unwrap();
        assert_eq!(found, Some(json!({"name": "Alice"})));
    }

    #[tokio::test]
    async fn test_with_factory_rejects_invalid_config() {
        let factory: Arc<dyn SessionFactory> = Arc::new(MemoryDriver::new());
        let config =
            CoordinatorConfig::new().default_timeout(Timeout::Finite(std::time::Duration::ZERO));

        let result = Database::with_factory(factory, config);
        assert!(matches!(result, Err(TxError::Config(_))));
    }
}
