use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A stored record. The driver keeps documents as JSON values; the
/// persistence-mapping layer above this crate gives them shape.
pub type Record = serde_json::Value;

/// Capability mode of a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadOnly => write!(f, "read-only"),
            TransactionMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// A requested time budget for a scope.
///
/// `Infinite` is a sentinel distinct from any finite duration so that `min`
/// composition is total and order-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    Finite(Duration),
}

impl Timeout {
    pub fn from_secs(secs: u64) -> Self {
        Timeout::Finite(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        Timeout::Finite(Duration::from_millis(millis))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Timeout::Infinite)
    }

    /// Tighter of the two budgets; `Infinite` is the identity element.
    pub fn min(self, other: Timeout) -> Timeout {
        match (self, other) {
            (Timeout::Infinite, other) => other,
            (this, Timeout::Infinite) => this,
            (Timeout::Finite(a), Timeout::Finite(b)) => Timeout::Finite(a.min(b)),
        }
    }

    /// Absolute deadline this budget yields when started at `start`.
    pub fn deadline_after(self, start: Instant) -> Deadline {
        match self {
            Timeout::Infinite => Deadline::Infinite,
            Timeout::Finite(limit) => Deadline::At(start + limit),
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Infinite => write!(f, "infinite"),
            Timeout::Finite(limit) => write!(f, "{limit:?}"),
        }
    }
}

/// Absolute expiry instant of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Infinite,
    At(Instant),
}

impl Deadline {
    /// Budget left before expiry, clamped at zero once the deadline passed.
    pub fn remaining(&self) -> Timeout {
        match self {
            Deadline::Infinite => Timeout::Infinite,
            Deadline::At(at) => Timeout::Finite(at.saturating_duration_since(Instant::now())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_infinite_is_identity() {
        let finite = Timeout::from_secs(10);
        assert_eq!(Timeout::Infinite.min(finite), finite);
        assert_eq!(finite.min(Timeout::Infinite), finite);
        assert_eq!(Timeout::Infinite.min(Timeout::Infinite), Timeout::Infinite);
    }

    #[test]
    fn test_min_is_order_independent() {
        let a = Timeout::from_secs(10);
        let b = Timeout::from_secs(30);
        assert_eq!(a.min(b), a);
        assert_eq!(b.min(a), a);
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let expired = Deadline::At(Instant::now() - Duration::from_secs(5));
        match expired.remaining() {
            Timeout::Finite(left) => assert_eq!(left, Duration::ZERO),
            Timeout::Infinite => panic!("expired deadline must stay finite"),
        }
    }

    #[test]
    fn test_remaining_of_infinite_deadline() {
        assert_eq!(Deadline::Infinite.remaining(), Timeout::Infinite);
    }

    #[test]
    fn test_deadline_after_start() {
        let start = Instant::now();
        match Timeout::from_secs(30).deadline_after(start) {
            Deadline::At(at) => assert_eq!(at, start + Duration::from_secs(30)),
            Deadline::Infinite => panic!("finite budget must yield a finite deadline"),
        }
        assert_eq!(Timeout::Infinite.deadline_after(start), Deadline::Infinite);
    }
}
