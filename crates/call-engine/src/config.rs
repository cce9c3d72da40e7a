//! Engine configuration
//!
//! Builder-style configuration for [`CallSessionManager`]. Defaults are
//! sensible for an interactive CRM client; everything time-related is
//! overridable because test suites want millisecond bounds.
//!
//! [`CallSessionManager`]: crate::manager::CallSessionManager

use std::time::Duration;

use switchboard_voip_core::{VoipError, VoipResult};

/// Configuration for the call session manager
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Adapter used for outbound calls when the caller states no preference
    pub default_adapter: Option<String>,
    /// Endpoint identifier recorded as `from` on outbound calls until the
    /// backend reports the line it actually allocated
    pub local_line: String,
    /// Bound on call setup: time from `Initiating` until the call leaves the
    /// setup states. Expiry finalizes the call as failed.
    pub setup_timeout: Duration,
    /// Bound on a single command round-trip to an adapter
    pub command_ack_timeout: Duration,
    /// Maximum number of concurrent active calls
    pub max_concurrent_calls: usize,
}

impl EngineConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            default_adapter: None,
            local_line: "local".to_string(),
            setup_timeout: Duration::from_secs(45),
            command_ack_timeout: Duration::from_secs(5),
            max_concurrent_calls: 8,
        }
    }

    /// Set the default outbound adapter
    pub fn with_default_adapter(mut self, system: impl Into<String>) -> Self {
        self.default_adapter = Some(system.into());
        self
    }

    /// Set the local line identifier used on outbound calls
    pub fn with_local_line(mut self, line: impl Into<String>) -> Self {
        self.local_line = line.into();
        self
    }

    /// Set the call setup timeout
    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    /// Set the command acknowledgement timeout
    pub fn with_command_ack_timeout(mut self, timeout: Duration) -> Self {
        self.command_ack_timeout = timeout;
        self
    }

    /// Set the concurrent call limit
    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> VoipResult<()> {
        if self.setup_timeout.is_zero() {
            return Err(VoipError::InvalidConfiguration {
                field: "setup_timeout".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.command_ack_timeout.is_zero() {
            return Err(VoipError::InvalidConfiguration {
                field: "command_ack_timeout".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.max_concurrent_calls == 0 {
            return Err(VoipError::InvalidConfiguration {
                field: "max_concurrent_calls".to_string(),
                reason: "must allow at least one call".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
