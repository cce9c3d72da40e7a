//! Adapter event stream
//!
//! Adapters report call lifecycle progress by pushing [`CallEvent`]s onto an
//! [`EventSink`] the engine registers with them. Delivery is at-least-once:
//! an adapter may redeliver or coalesce events, and consumers are expected
//! to treat duplicates as no-ops rather than errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::call::HangupReason;

/// Adapter-native session identifier
///
/// Assigned by the backend when a call is initiated and carried on every
/// event for that call. The session manager reconciles these with canonical
/// call ids; nothing outside the manager needs the mapping.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh session id with the given prefix
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to a call, as reported by its adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEventKind {
    /// Backend accepted the request and is setting the call up
    Connecting,
    /// An endpoint is being alerted
    Ringing,
    /// Call was answered
    Answered,
    /// Mute command acknowledged by the backend
    MuteChanged { muted: bool },
    /// Hold command acknowledged by the backend
    HoldChanged { on_hold: bool },
    /// Call ended normally
    Disconnected { reason: HangupReason },
    /// Call ended because the backend failed
    Failed { error: String },
    /// Inbound call rang out unanswered
    Missed,
    /// Remote endpoint was busy
    Busy,
    /// Call was diverted to voicemail
    Voicemail,
    /// A new inbound call arrived on this adapter
    IncomingCall {
        from: String,
        to: String,
        display_name: Option<String>,
    },
}

impl CallEventKind {
    /// Whether this event moves the call into the terminal set
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallEventKind::Disconnected { .. }
                | CallEventKind::Failed { .. }
                | CallEventKind::Missed
                | CallEventKind::Busy
                | CallEventKind::Voicemail
        )
    }
}

/// One lifecycle event emitted by an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    /// System name of the emitting adapter
    pub system: String,
    /// Adapter-native session the event belongs to
    pub session_id: SessionId,
    /// What happened
    pub kind: CallEventKind,
    /// When the adapter observed it
    pub timestamp: DateTime<Utc>,
}

/// Delivery handle an adapter pushes its events through
///
/// Cloneable; each adapter gets its own sink stamped with its system name so
/// the consumer can attribute events without trusting adapters to fill the
/// field in themselves. Sends never block: the engine drains the channel on
/// a dedicated task.
#[derive(Debug, Clone)]
pub struct EventSink {
    system: String,
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl EventSink {
    /// Create a sink that stamps `system` on every event
    pub fn new(system: impl Into<String>, tx: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self { system: system.into(), tx }
    }

    /// System name this sink stamps on events
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Push an event for `session_id` onto the engine's queue
    ///
    /// A send failure means the engine has shut down; the event is dropped
    /// and a diagnostic logged, since there is nobody left to apply it.
    pub fn emit(&self, session_id: SessionId, kind: CallEventKind) {
        let event = CallEvent {
            system: self.system.clone(),
            session_id,
            kind,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.tx.send(event) {
            tracing::debug!(system = %self.system, "event sink closed, dropping {:?}", err.0.kind);
        }
    }
}
