pub mod error;
pub mod types;

pub use error::{Result, TxError};
pub use types::{Deadline, Record, Timeout, TransactionMode};
