pub mod factory;
pub mod lane;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::core::{Record, Result, TransactionMode, TxError};
use lane::LaneId;

/// Unique identifier of an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess_{}", self.0.simple())
    }
}

/// Driver-side half of a session: the operations a handle forwards to once
/// its capability checks pass. Implementations live with the driver.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Record>>;
    async fn put(&self, table: &str, key: &str, record: Record) -> Result<()>;
    async fn delete(&self, table: &str, key: &str) -> Result<bool>;
    async fn scan(&self, table: &str) -> Result<Vec<(String, Record)>>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    async fn release(&self) -> Result<()>;
}

/// Handle to an open database session.
///
/// Cheap to clone; every clone refers to the same underlying driver session.
/// A handle is usable only for the duration of the call that obtained it and
/// only on the execution lane the factory bound it to; each operation checks
/// the lane before touching the driver. Finishing the session (commit,
/// rollback, release) is reserved to the owning scope.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    mode: TransactionMode,
    lane: LaneId,
    backend: Arc<dyn SessionBackend>,
    poisoned: Arc<AtomicBool>,
}

impl Session {
    /// Binds a new handle over a driver session. Called by factories.
    pub fn bind(mode: TransactionMode, lane: LaneId, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            id: SessionId::new(),
            mode,
            lane,
            backend,
            poisoned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    fn ensure_on_lane(&self) -> Result<()> {
        match LaneId::current() {
            Some(lane) if lane == self.lane => Ok(()),
            found => Err(TxError::SessionLaneViolation {
                expected: self.lane,
                found,
            }),
        }
    }

    pub async fn get(&self, table: &str, key: &str) -> Result<Option<Record>> {
        self.ensure_on_lane()?;
        self.backend.get(table, key).await
    }

    pub async fn scan(&self, table: &str) -> Result<Vec<(String, Record)>> {
        self.ensure_on_lane()?;
        self.backend.scan(table).await
    }

    pub async fn put(&self, table: &str, key: &str, record: Record) -> Result<()> {
        self.ensure_on_lane()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(TxError::ReadOnlyViolation {
                operation: format!("put {table}/{key}"),
            });
        }
        self.backend.put(table, key, record).await
    }

    pub async fn delete(&self, table: &str, key: &str) -> Result<bool> {
        self.ensure_on_lane()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(TxError::ReadOnlyViolation {
                operation: format!("delete {table}/{key}"),
            });
        }
        self.backend.delete(table, key).await
    }

    /// Marks the session rollback-only. Set when a nested scope's deadline
    /// expires mid-session and driver state is indeterminate.
    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        self.backend.commit().await
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        self.backend.rollback().await
    }

    pub(crate) async fn release(&self) -> Result<()> {
        self.backend.release().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("lane", &self.lane)
            .finish()
    }
}
