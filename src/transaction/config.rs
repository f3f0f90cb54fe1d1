use std::time::Duration;

use crate::core::Timeout;

/// Coordinator configuration
///
/// Controls the time budget applied to scopes whose callers supply none.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Budget for scopes opened without an explicit timeout
    pub default_timeout: Timeout,

    /// Root scopes slower than this are logged at warn level
    pub slow_scope_warning: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self {
            default_timeout: Timeout::from_secs(30),
            slow_scope_warning: None,
        }
    }

    /// Set the default scope timeout
    pub fn default_timeout(mut self, timeout: Timeout) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Warn about root scopes running longer than `threshold`
    pub fn slow_scope_warning(mut self, threshold: Duration) -> Self {
        self.slow_scope_warning = Some(threshold);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Timeout::Finite(limit) = self.default_timeout {
            if limit.is_zero() {
                return Err("default_timeout must be > 0".to_string());
            }
        }

        if let Some(threshold) = self.slow_scope_warning {
            if threshold.is_zero() {
                return Err("slow_scope_warning must be > 0".to_string());
            }
        }

        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
