use async_trait::async_trait;

use super::Session;
use crate::core::Result;

/// Opens sessions and transactions against the underlying driver.
///
/// The coordinator asks the factory for a session only when no ambient scope
/// is active; nested scopes reuse the session already open. Each returned
/// session is bound to a single execution lane chosen by the factory, and the
/// caller that obtained it is responsible for finishing it exactly once.
///
/// `MemoryDriver` is the in-process implementation; a production deployment
/// wraps the real database driver behind this trait.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a read session. Read sessions never buffer writes and are
    /// released, not committed.
    async fn open_read_session(&self) -> Result<Session>;

    /// Opens a write transaction whose changes become visible only on commit.
    async fn open_write_transaction(&self) -> Result<Session>;
}
