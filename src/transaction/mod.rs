// ============================================================================
// Transaction Coordination Module
// ============================================================================
//
// Scoped transactions for the business layer: one session per top-level
// scope, shared by reference with every nested scope in the same call tree,
// with deadlines that only tighten downward and a read-only capability
// boundary enforced before the driver is touched.
//
// ============================================================================

pub mod accessor;
pub mod config;
pub mod context;
pub mod coordinator;

pub use accessor::SessionAccessor;
pub use config::CoordinatorConfig;
pub use context::AmbientContext;
pub use coordinator::TransactionCoordinator;
