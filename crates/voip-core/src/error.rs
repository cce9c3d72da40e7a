//! Error types for the call engine and its adapters
//!
//! Every operation on the engine or on an adapter returns a typed error
//! rather than panicking; only programmer errors (invalid configuration at
//! startup) are treated as fatal by callers. Errors carry enough structure
//! for the CRM layer to branch on without string matching.

use thiserror::Error;

use crate::call::{CallId, CallStatus};

/// Result type alias for engine and adapter operations
pub type VoipResult<T> = Result<T, VoipError>;

/// Errors raised while acquiring or releasing an adapter's backend link
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("failed to connect to backend: {reason}")]
    ConnectFailed { reason: String },

    #[error("failed to disconnect from backend: {reason}")]
    DisconnectFailed { reason: String },

    #[error("adapter is not connected")]
    NotConnected,
}

/// Errors returned by call commands and adapter operations
#[derive(Error, Debug, Clone)]
pub enum VoipError {
    /// No registered adapter can take the request
    #[error("no telephony adapter available: {reason}")]
    AdapterUnavailable { reason: String },

    /// The backend rejected call initiation
    #[error("call setup failed: {reason}")]
    CallSetupFailed { reason: String },

    /// Command not valid for the call's current status
    #[error("command rejected for call {call_id}: current status is {status:?}")]
    CommandRejected { call_id: CallId, status: CallStatus },

    /// The referenced call is not known to the engine
    #[error("call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// A bounded operation did not complete in time
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// An adapter emitted an event the state machine cannot accept
    ///
    /// Never propagated to callers as a failure: the event is dropped and
    /// this value only shows up in diagnostics.
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// Concurrent call limit reached
    #[error("too many concurrent calls: limit is {limit}")]
    TooManyCalls { limit: usize },

    /// Invalid engine configuration
    #[error("invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The owning adapter reported a backend failure
    #[error("adapter {system} error: {reason}")]
    AdapterError { system: String, reason: String },

    /// The engine has not been started (or was stopped)
    #[error("engine is not running")]
    NotRunning,

    /// Unexpected internal failure
    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl VoipError {
    /// Create an adapter-unavailable error
    pub fn adapter_unavailable(reason: impl Into<String>) -> Self {
        Self::AdapterUnavailable { reason: reason.into() }
    }

    /// Create a call-setup-failed error
    pub fn call_setup_failed(reason: impl Into<String>) -> Self {
        Self::CallSetupFailed { reason: reason.into() }
    }

    /// Create a command-rejected error for a call in the given status
    pub fn command_rejected(call_id: CallId, status: CallStatus) -> Self {
        Self::CommandRejected { call_id, status }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a protocol-violation diagnostic
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation { reason: reason.into() }
    }

    /// Create an adapter backend error
    pub fn adapter_error(system: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterError { system: system.into(), reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Whether retrying the same operation later can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            VoipError::AdapterUnavailable { .. }
            | VoipError::Timeout { .. }
            | VoipError::AdapterError { .. }
            | VoipError::TooManyCalls { .. } => true,

            VoipError::InvalidConfiguration { .. }
            | VoipError::CommandRejected { .. }
            | VoipError::CallNotFound { .. }
            | VoipError::ProtocolViolation { .. }
            | VoipError::NotRunning => false,

            VoipError::CallSetupFailed { .. } | VoipError::InternalError { .. } => false,
        }
    }

    /// Coarse error category for metrics and structured logging
    pub fn category(&self) -> &'static str {
        match self {
            VoipError::AdapterUnavailable { .. } | VoipError::AdapterError { .. } => "adapter",

            VoipError::CallSetupFailed { .. }
            | VoipError::CommandRejected { .. }
            | VoipError::CallNotFound { .. }
            | VoipError::TooManyCalls { .. } => "call",

            VoipError::Timeout { .. } => "timeout",
            VoipError::ProtocolViolation { .. } => "protocol",
            VoipError::InvalidConfiguration { .. } => "configuration",
            VoipError::NotRunning | VoipError::InternalError { .. } => "system",
        }
    }
}

impl From<ConnectionError> for VoipError {
    fn from(err: ConnectionError) -> Self {
        VoipError::AdapterUnavailable { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn command_rejected_carries_status() {
        let id = Uuid::new_v4();
        let err = VoipError::command_rejected(id, CallStatus::Initiating);
        assert_eq!(err.category(), "call");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("Initiating"));
    }

    #[test]
    fn timeouts_are_recoverable() {
        let err = VoipError::timeout("mute_call", std::time::Duration::from_millis(1500));
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "timeout");
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn connection_error_maps_to_unavailable() {
        let err: VoipError = ConnectionError::NotConnected.into();
        assert!(matches!(err, VoipError::AdapterUnavailable { .. }));
    }
}
