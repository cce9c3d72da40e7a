//! Telephony adapter contract
//!
//! Every backend — a cloud telephony API client, a PBX bridge, the mock
//! provider used in tests — plugs into the engine by implementing
//! [`VoipAdapter`]. The adapter is the sole authority for transport-level
//! state of calls it originated; the session manager never issues raw
//! transport instructions itself, it only delegates commands here and
//! consumes the event stream.
//!
//! # Contract notes
//!
//! - `connect`/`disconnect` are idempotent; connecting twice or
//!   disconnecting an unconnected adapter must not fail.
//! - Command methods (`mute_call`, `hold_call`, `end_call`, `answer_call`)
//!   are *requests*. A returned `Ok(())` means the backend accepted the
//!   request; the actual state change is acknowledged asynchronously on the
//!   event stream, and the engine only mutates call flags when that
//!   acknowledgement arrives.
//! - `start_call` must return a typed error rather than panic, and must not
//!   block past the engine's configured setup timeout (the engine enforces
//!   the bound regardless).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::CallContext;
use crate::error::{ConnectionError, VoipError};
use crate::events::{EventSink, SessionId};

/// Backend-native handle returned when a call is initiated
///
/// The engine reconciles this with the canonical call id it generated
/// before invoking the adapter; adapters never see canonical ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Adapter-native session identifier, carried on every event
    pub session_id: SessionId,
    /// System name of the adapter that owns the session
    pub system: String,
    /// Local line the backend allocated for the call, when it reports one
    pub line: Option<String>,
}

/// Capability contract every telephony backend implements
#[async_trait]
pub trait VoipAdapter: Send + Sync {
    /// Stable unique name of this backend (registry key)
    fn system_name(&self) -> &str;

    /// Acquire the backend connection; idempotent
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Release the backend connection; idempotent
    async fn disconnect(&self) -> Result<(), ConnectionError>;

    /// Register the sink this adapter pushes lifecycle events through
    ///
    /// Called once by the engine before any call traffic. Re-registering
    /// replaces the previous sink.
    async fn register_event_sink(&self, sink: EventSink);

    /// Initiate an outbound call to `target`
    async fn start_call(&self, target: &str, context: &CallContext) -> Result<CallSession, VoipError>;

    /// Answer an inbound call previously announced on the event stream
    async fn answer_call(&self, session: &SessionId) -> Result<(), VoipError>;

    /// Request microphone mute/unmute; acknowledged via `MuteChanged`
    async fn mute_call(&self, session: &SessionId, muted: bool) -> Result<(), VoipError>;

    /// Request hold/resume; acknowledged via `HoldChanged`
    async fn hold_call(&self, session: &SessionId, hold: bool) -> Result<(), VoipError>;

    /// Request call termination; acknowledged via a terminal event
    async fn end_call(&self, session: &SessionId) -> Result<(), VoipError>;
}
