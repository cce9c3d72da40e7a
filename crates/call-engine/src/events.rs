//! Engine event broadcasting
//!
//! Consumers (the CRM call bar, notification glue, tests) observe the
//! engine through a broadcast channel of [`EngineEvent`]s in addition to
//! the store's snapshot listeners. The broadcast carries deltas — which
//! call changed state and why — where the store listeners carry whole
//! snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use switchboard_voip_core::{CallDirection, CallId, CallStatus};

/// Relative urgency of an engine event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Low,
    Normal,
    High,
}

/// Details of a call status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatusInfo {
    /// Call that changed status
    pub call_id: CallId,
    /// Status after the transition
    pub new_status: CallStatus,
    /// Status before the transition (None for freshly created calls)
    pub previous_status: Option<CallStatus>,
    /// Why the transition happened, when known
    pub reason: Option<String>,
    /// When the engine applied the transition
    pub timestamp: DateTime<Utc>,
}

/// Details of a newly arrived inbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCallInfo {
    /// Canonical id assigned to the call
    pub call_id: CallId,
    /// Calling endpoint
    pub from: String,
    /// Called endpoint (the local line)
    pub to: String,
    /// Caller display name, if the backend provided one
    pub display_name: Option<String>,
    /// Adapter that owns the call
    pub voip_system: String,
    /// When the call arrived
    pub received_at: DateTime<Utc>,
}

/// Events published on the engine's broadcast channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A call changed status
    CallStateChanged {
        info: CallStatusInfo,
        priority: EventPriority,
    },
    /// A new inbound call is ringing
    IncomingCall {
        info: IncomingCallInfo,
        priority: EventPriority,
    },
    /// The selected-call pointer changed
    SelectedCallChanged {
        call_id: Option<CallId>,
    },
    /// An adapter's readiness flipped
    AdapterStatusChanged {
        system: String,
        ready: bool,
    },
}

impl EngineEvent {
    /// Build a state-change event with priority derived from the status
    pub fn state_changed(
        call_id: CallId,
        direction: CallDirection,
        previous: Option<CallStatus>,
        new_status: CallStatus,
        reason: Option<String>,
    ) -> Self {
        // Terminal transitions and incoming rings are what the UI must not
        // miss; everything else is routine progress.
        let priority = if new_status.is_terminal() {
            EventPriority::High
        } else if new_status == CallStatus::RingingInbound && direction == CallDirection::Inbound {
            EventPriority::High
        } else {
            EventPriority::Normal
        };
        EngineEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id,
                new_status,
                previous_status: previous,
                reason,
                timestamp: Utc::now(),
            },
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn terminal_transitions_are_high_priority() {
        let event = EngineEvent::state_changed(
            Uuid::new_v4(),
            CallDirection::Outbound,
            Some(CallStatus::Answered),
            CallStatus::Disconnected,
            Some("remote hangup".to_string()),
        );
        match event {
            EngineEvent::CallStateChanged { priority, info } => {
                assert_eq!(priority, EventPriority::High);
                assert_eq!(info.new_status, CallStatus::Disconnected);
                assert_eq!(info.previous_status, Some(CallStatus::Answered));
            }
            _ => panic!("expected CallStateChanged"),
        }
    }

    #[test]
    fn events_serialize_for_ui_consumers() {
        let event = EngineEvent::state_changed(
            Uuid::new_v4(),
            CallDirection::Inbound,
            None,
            CallStatus::RingingInbound,
            None,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"ringing_inbound\""));
    }

    #[test]
    fn routine_progress_is_normal_priority() {
        let event = EngineEvent::state_changed(
            Uuid::new_v4(),
            CallDirection::Outbound,
            Some(CallStatus::Initiating),
            CallStatus::RingingOutbound,
            None,
        );
        match event {
            EngineEvent::CallStateChanged { priority, .. } => {
                assert_eq!(priority, EventPriority::Normal);
            }
            _ => panic!("expected CallStateChanged"),
        }
    }
}
