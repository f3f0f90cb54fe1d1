use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex;

use super::memory::{Change, MemoryStore};
use crate::core::{Record, Result, TransactionMode, TxError};
use crate::session::factory::SessionFactory;
use crate::session::lane;
use crate::session::{Session, SessionBackend};

/// In-memory session/transaction factory.
///
/// The in-process stand-in for the production database driver: write
/// transactions buffer their changes per session and apply them atomically on
/// commit; reads inside a write transaction see the session's own pending
/// changes first. Each session is bound to the execution lane active when it
/// was opened, or to a fresh lane when opened outside any scope.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    store: MemoryStore,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl SessionFactory for MemoryDriver {
    async fn open_read_session(&self) -> Result<Session> {
        let lane = lane::current_or_new();
        let backend = Arc::new(DriverSession::open(
            self.store.clone(),
            TransactionMode::ReadOnly,
        ));
        let session = Session::bind(TransactionMode::ReadOnly, lane, backend);
        debug!("opened read session {} on {}", session.id(), lane);
        Ok(session)
    }

    async fn open_write_transaction(&self) -> Result<Session> {
        let lane = lane::current_or_new();
        let backend = Arc::new(DriverSession::open(
            self.store.clone(),
            TransactionMode::ReadWrite,
        ));
        let session = Session::bind(TransactionMode::ReadWrite, lane, backend);
        debug!("opened write transaction {} on {}", session.id(), lane);
        Ok(session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Committed,
    RolledBack,
    Released,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Active => write!(f, "active"),
            Lifecycle::Committed => write!(f, "committed"),
            Lifecycle::RolledBack => write!(f, "rolled back"),
            Lifecycle::Released => write!(f, "released"),
        }
    }
}

struct SessionState {
    lifecycle: Lifecycle,
    pending: Vec<Change>,
}

/// Driver side of one session. Transitions out of `Active` exactly once.
struct DriverSession {
    store: MemoryStore,
    mode: TransactionMode,
    state: Mutex<SessionState>,
}

impl DriverSession {
    fn open(store: MemoryStore, mode: TransactionMode) -> Self {
        Self {
            store,
            mode,
            state: Mutex::new(SessionState {
                lifecycle: Lifecycle::Active,
                pending: Vec::new(),
            }),
        }
    }
}

fn closed(lifecycle: Lifecycle) -> TxError {
    TxError::SessionClosed(lifecycle.to_string())
}

#[async_trait]
impl SessionBackend for DriverSession {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Record>> {
        let state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }

        // Read-your-writes: the newest buffered change for this key wins.
        for change in state.pending.iter().rev() {
            match change {
                Change::Put {
                    table: t,
                    key: k,
                    record,
                } if t == table && k == key => return Ok(Some(record.clone())),
                Change::Delete { table: t, key: k } if t == table && k == key => return Ok(None),
                _ => {}
            }
        }
        drop(state);

        Ok(self.store.get(table, key).await)
    }

    async fn put(&self, table: &str, key: &str, record: Record) -> Result<()> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(TxError::ReadOnlyViolation {
                operation: format!("put {table}/{key}"),
            });
        }

        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }
        state.pending.push(Change::Put {
            table: table.to_string(),
            key: key.to_string(),
            record,
        });
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(TxError::ReadOnlyViolation {
                operation: format!("delete {table}/{key}"),
            });
        }

        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }

        let mut existed = None;
        for change in state.pending.iter().rev() {
            match change {
                Change::Put { table: t, key: k, .. } if t == table && k == key => {
                    existed = Some(true);
                    break;
                }
                Change::Delete { table: t, key: k } if t == table && k == key => {
                    existed = Some(false);
                    break;
                }
                _ => {}
            }
        }
        let existed = match existed {
            Some(existed) => existed,
            None => self.store.contains(table, key).await,
        };

        state.pending.push(Change::Delete {
            table: table.to_string(),
            key: key.to_string(),
        });
        Ok(existed)
    }

    async fn scan(&self, table: &str) -> Result<Vec<(String, Record)>> {
        let state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }
        let overlay: Vec<Change> = state
            .pending
            .iter()
            .filter(|change| match change {
                Change::Put { table: t, .. } | Change::Delete { table: t, .. } => t == table,
            })
            .cloned()
            .collect();
        drop(state);

        let mut rows: std::collections::BTreeMap<String, Option<Record>> = self
            .store
            .scan(table)
            .await
            .into_iter()
            .map(|(key, record)| (key, Some(record)))
            .collect();
        for change in overlay {
            match change {
                Change::Put { key, record, .. } => {
                    rows.insert(key, Some(record));
                }
                Change::Delete { key, .. } => {
                    rows.insert(key, None);
                }
            }
        }

        Ok(rows
            .into_iter()
            .filter_map(|(key, record)| record.map(|record| (key, record)))
            .collect())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }
        let changes = std::mem::take(&mut state.pending);
        let applied = changes.len();
        self.store.apply(changes).await;
        state.lifecycle = Lifecycle::Committed;
        debug!("applied {applied} buffered changes on commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }
        let discarded = state.pending.len();
        state.pending.clear();
        state.lifecycle = Lifecycle::RolledBack;
        if discarded > 0 {
            debug!("discarded {discarded} buffered changes on rollback");
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Active {
            return Err(closed(state.lifecycle));
        }
        if !state.pending.is_empty() {
            warn!(
                "releasing a session with {} uncommitted changes, discarding them",
                state.pending.len()
            );
            state.pending.clear();
        }
        state.lifecycle = Lifecycle::Released;
        Ok(())
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        // Cancellation can drop a session that never reached commit or
        // rollback; the buffered changes die with it.
        if let Ok(state) = self.state.try_lock() {
            if state.lifecycle == Lifecycle::Active && !state.pending.is_empty() {
                warn!(
                    "session dropped while active, discarding {} uncommitted changes",
                    state.pending.len()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn on_session_lane<T>(
        session: &Session,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        lane::enter(session.lane(), fut).await
    }

    #[tokio::test]
    async fn test_write_transaction_read_your_writes() {
        let driver = MemoryDriver::new();
        let session = driver.open_write_transaction().await.unwrap();

        on_session_lane(&session, async {
            session.put("members", "m-1", json!({"name": "Alice"})).await?;
            let found = session.get("members", "m-1").await?;
            assert_eq!(found, Some(json!({"name": "Alice"})));
            Ok(())
        })
        .await
        .unwrap();

        // Not visible in committed state until commit.
        assert_eq!(driver.store.get("members", "m-1").await, None);

        session.commit().await.unwrap();
        assert_eq!(
            driver.store.get("members", "m-1").await,
            Some(json!({"name": "Alice"}))
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_pending_changes() {
        let driver = MemoryDriver::new();
        let session = driver.open_write_transaction().await.unwrap();

        on_session_lane(&session, async {
            session.put("members", "m-1", json!({"name": "Alice"})).await
        })
        .await
        .unwrap();

        session.rollback().await.unwrap();
        assert_eq!(driver.store.get("members", "m-1").await, None);
    }

    #[tokio::test]
    async fn test_delete_reports_prior_existence() {
        let driver = MemoryDriver::new();
        driver
            .store
            .apply(vec![Change::Put {
                table: "members".to_string(),
                key: "m-1".to_string(),
                record: json!({"name": "Alice"}),
            }])
            .await;

        let session = driver.open_write_transaction().await.unwrap();
        on_session_lane(&session, async {
            assert!(session.delete("members", "m-1").await?);
            assert!(!session.delete("members", "m-1").await?);
            assert_eq!(session.get("members", "m-1").await?, None);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_scan_merges_pending_overlay() {
        let driver = MemoryDriver::new();
        driver
            .store
            .apply(vec![
                Change::Put {
                    table: "journal".to_string(),
                    key: "e-1".to_string(),
                    record: json!({"text": "committed"}),
                },
                Change::Put {
                    table: "journal".to_string(),
                    key: "e-2".to_string(),
                    record: json!({"text": "doomed"}),
                },
            ])
            .await;

        let session = driver.open_write_transaction().await.unwrap();
        on_session_lane(&session, async {
            session.delete("journal", "e-2").await?;
            session.put("journal", "e-3", json!({"text": "pending"})).await?;

            let rows = session.scan("journal").await?;
            let keys: Vec<&str> = rows.iter().map(|(key, _)| key.as_str()).collect();
            assert_eq!(keys, vec!["e-1", "e-3"]);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_session_finishes_exactly_once() {
        let driver = MemoryDriver::new();
        let session = driver.open_write_transaction().await.unwrap();

        session.commit().await.unwrap();
        assert!(matches!(
            session.commit().await,
            Err(TxError::SessionClosed(_))
        ));
        assert!(matches!(
            session.rollback().await,
            Err(TxError::SessionClosed(_))
        ));

        let result = on_session_lane(&session, session.get("members", "m-1")).await;
        assert!(matches!(result, Err(TxError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_read_session_sees_committed_state_only() {
        let driver = MemoryDriver::new();

        let writer = driver.open_write_transaction().await.unwrap();
        on_session_lane(&writer, async {
            writer.put("members", "m-1", json!({"name": "Alice"})).await
        })
        .await
        .unwrap();

        let reader = driver.open_read_session().await.unwrap();
        let before = on_session_lane(&reader, reader.get("members", "m-1")).await.unwrap();
        assert_eq!(before, None);

        writer.commit().await.unwrap();
        let after = on_session_lane(&reader, reader.get("members", "m-1")).await.unwrap();
        assert_eq!(after, Some(json!({"name": "Alice"})));

        reader.release().await.unwrap();
    }
}
