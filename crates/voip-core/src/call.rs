//! Canonical call model
//!
//! This module defines the call record tracked by the engine and the
//! state-machine values it moves through. The record is transport-agnostic:
//! all backend-specific state stays inside the owning adapter, and the
//! engine only ever sees status changes through the adapter event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Direction of a call (from the CRM user's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    /// Call received from the network
    Inbound,
    /// Call initiated by the local user
    Outbound,
}

/// Current status of a call
///
/// The status graph is:
///
/// ```text
/// Initiating ─► Connecting ─► RingingOutbound ─► Answered ◄─► OnHold
///                        └──► RingingInbound  ─►    │            │
///                                                   ▼            ▼
///              { Disconnected | Failed | Missed | Busy | Voicemail }
/// ```
///
/// The bottom row is the terminal set and is absorbing. Every non-terminal
/// status may also jump directly to any terminal status, since a hangup or
/// failure can happen at any point. Backends report lifecycle progress
/// at-least-once and may coalesce steps, so forward skips (for example
/// `Initiating` straight to `Answered`) are legal; moving backwards is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Call record created, backend request not yet acknowledged
    Initiating,
    /// Backend accepted the request and is setting the call up
    Connecting,
    /// Remote endpoint is being alerted
    RingingOutbound,
    /// Local user is being alerted about an incoming call
    RingingInbound,
    /// Both parties connected, media flowing
    Answered,
    /// Connected but parked on hold
    OnHold,
    /// Ended normally by either side
    Disconnected,
    /// Ended because setup or the backend failed
    Failed,
    /// Inbound call that was never answered
    Missed,
    /// Remote endpoint was busy
    Busy,
    /// Diverted to voicemail
    Voicemail,
}

impl CallStatus {
    /// Whether this status belongs to the absorbing terminal set
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Disconnected
                | CallStatus::Failed
                | CallStatus::Missed
                | CallStatus::Busy
                | CallStatus::Voicemail
        )
    }

    /// Whether the call is alerting one of the endpoints
    pub fn is_ringing(&self) -> bool {
        matches!(self, CallStatus::RingingOutbound | CallStatus::RingingInbound)
    }

    /// Whether the call is still being set up (pre-answer, pre-terminal)
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            CallStatus::Initiating
                | CallStatus::Connecting
                | CallStatus::RingingOutbound
                | CallStatus::RingingInbound
        )
    }

    /// Whether both parties are connected (answered or on hold)
    pub fn is_connected(&self) -> bool {
        matches!(self, CallStatus::Answered | CallStatus::OnHold)
    }

    /// Setup progress rank used to tell forward skips from backward moves
    fn setup_rank(&self) -> Option<u8> {
        match self {
            CallStatus::Initiating => Some(0),
            CallStatus::Connecting => Some(1),
            CallStatus::RingingOutbound | CallStatus::RingingInbound => Some(2),
            // OnHold has no rank: it is only reachable through the
            // Answered/OnHold pair, never straight from setup.
            CallStatus::Answered => Some(3),
            _ => None,
        }
    }

    /// Check whether a transition from `self` to `next` is legal
    ///
    /// Terminal statuses absorb: nothing leaves them. Any non-terminal
    /// status may enter any terminal status. Among the non-terminal
    /// statuses, setup only moves forward, and `Answered`/`OnHold` swap
    /// freely with each other. A same-status transition is not legal here;
    /// callers treat redelivery as an idempotent no-op instead.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() {
            return true;
        }
        if *self == next {
            return false;
        }
        // Answered and OnHold form a bidirectional pair.
        if self.is_connected() && next.is_connected() {
            return true;
        }
        match (self.setup_rank(), next.setup_rank()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        }
    }

    /// Human-readable label used by the CRM call bar
    pub fn display_name(&self) -> &'static str {
        match self {
            CallStatus::Initiating => "Dialing...",
            CallStatus::Connecting => "Connecting",
            CallStatus::RingingOutbound => "Ringing",
            CallStatus::RingingInbound => "Incoming",
            CallStatus::Answered => "Connected",
            CallStatus::OnHold => "On Hold",
            CallStatus::Disconnected => "Ended",
            CallStatus::Failed => "Failed",
            CallStatus::Missed => "Missed",
            CallStatus::Busy => "Busy",
            CallStatus::Voicemail => "Voicemail",
        }
    }
}

/// Why a call reached a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HangupReason {
    /// Local user ended the call
    LocalHangup,
    /// Remote party ended the call
    RemoteHangup,
    /// Remote party rejected the call
    Rejected,
    /// Call setup exceeded its time bound
    Timeout,
    /// Backend reported an error
    Error,
}

/// CRM context attached to a call at start time
///
/// Opaque passthrough from the contact layer. The engine stores it on the
/// call record and never validates any of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallContext {
    /// Cross-reference to a CRM contact record
    pub contact_id: Option<String>,
    /// Contact entity type (lead, customer, ...)
    pub contact_type: Option<String>,
    /// Name shown on the call bar
    pub display_name: Option<String>,
    /// Call subject/reason
    pub subject: Option<String>,
}

impl CallContext {
    /// Context with just a display name
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Default::default()
        }
    }

    /// Context referencing a CRM contact
    pub fn for_contact(contact_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            contact_id: Some(contact_id.into()),
            display_name: Some(display_name.into()),
            ..Default::default()
        }
    }
}

/// Canonical record of one call attempt/session
///
/// Created by the session manager the instant a start command is accepted
/// (before the backend confirms anything) so the UI has an id to track
/// immediately. Only the manager mutates `status` and the derived fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Unique identifier, assigned at creation, immutable
    pub id: CallId,
    /// Direction of the call
    pub direction: CallDirection,
    /// Current status per the state machine
    pub status: CallStatus,
    /// Originating endpoint (number or line id)
    pub from: String,
    /// Destination endpoint (number or line id)
    pub to: String,
    /// Optional CRM contact cross-reference
    pub contact_id: Option<String>,
    /// Display name supplied by the caller, never validated
    pub contact_display_name: Option<String>,
    /// Call subject from the CRM context
    pub subject: Option<String>,
    /// Owning adapter's system name; fixes adapter affinity for the call
    pub voip_system: String,
    /// When the record was created
    pub start_time: DateTime<Utc>,
    /// When the call was answered (if it ever was)
    pub connected_time: Option<DateTime<Utc>>,
    /// When the call reached a terminal status
    pub end_time: Option<DateTime<Utc>>,
    /// Whole-second duration, derived from start and end times
    pub duration_seconds: Option<u64>,
    /// Microphone mute flag; meaningful only while answered or on hold
    pub is_muted: bool,
    /// Hold flag; meaningful only while answered or on hold
    pub is_on_hold: bool,
    /// Why the call ended; set only on the terminal transition
    pub hangup_reason: Option<HangupReason>,
    /// Backend error detail; set only on the terminal transition
    pub error_message: Option<String>,
    /// Additional free-form metadata
    pub metadata: HashMap<String, String>,
}

impl Call {
    /// Create a new outbound call record in `Initiating` state
    pub fn outbound(to: impl Into<String>, from: impl Into<String>, voip_system: impl Into<String>, context: &CallContext) -> Self {
        Self::new(CallDirection::Outbound, CallStatus::Initiating, from, to, voip_system, context)
    }

    /// Create a new inbound call record in `RingingInbound` state
    pub fn inbound(from: impl Into<String>, to: impl Into<String>, voip_system: impl Into<String>, context: &CallContext) -> Self {
        Self::new(CallDirection::Inbound, CallStatus::RingingInbound, from, to, voip_system, context)
    }

    fn new(
        direction: CallDirection,
        status: CallStatus,
        from: impl Into<String>,
        to: impl Into<String>,
        voip_system: impl Into<String>,
        context: &CallContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            status,
            from: from.into(),
            to: to.into(),
            contact_id: context.contact_id.clone(),
            contact_display_name: context.display_name.clone(),
            subject: context.subject.clone(),
            voip_system: voip_system.into(),
            start_time: Utc::now(),
            connected_time: None,
            end_time: None,
            duration_seconds: None,
            is_muted: false,
            is_on_hold: false,
            hangup_reason: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }

    /// Recompute `duration_seconds` from the stored timestamps
    ///
    /// Defined iff both `start_time` and `end_time` are set; clamped so a
    /// skewed clock can never produce a negative duration.
    pub fn recompute_duration(&mut self) {
        self.duration_seconds = self.end_time.map(|end| {
            let millis = (end - self.start_time).num_milliseconds().max(0);
            ((millis as f64) / 1000.0).round() as u64
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn terminal_statuses_absorb() {
        for terminal in [
            CallStatus::Disconnected,
            CallStatus::Failed,
            CallStatus::Missed,
            CallStatus::Busy,
            CallStatus::Voicemail,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(CallStatus::Answered));
            assert!(!terminal.can_transition_to(CallStatus::Disconnected));
        }
    }

    #[test]
    fn any_nonterminal_may_fail() {
        for status in [
            CallStatus::Initiating,
            CallStatus::Connecting,
            CallStatus::RingingOutbound,
            CallStatus::RingingInbound,
            CallStatus::Answered,
            CallStatus::OnHold,
        ] {
            assert!(status.can_transition_to(CallStatus::Failed));
            assert!(status.can_transition_to(CallStatus::Disconnected));
        }
    }

    #[test]
    fn setup_only_moves_forward() {
        assert!(CallStatus::Initiating.can_transition_to(CallStatus::Connecting));
        assert!(CallStatus::Initiating.can_transition_to(CallStatus::Answered));
        assert!(CallStatus::Connecting.can_transition_to(CallStatus::RingingOutbound));
        assert!(!CallStatus::Answered.can_transition_to(CallStatus::RingingOutbound));
        assert!(!CallStatus::RingingOutbound.can_transition_to(CallStatus::Connecting));
        assert!(!CallStatus::RingingOutbound.can_transition_to(CallStatus::RingingOutbound));
    }

    #[test]
    fn hold_pair_is_bidirectional() {
        assert!(CallStatus::Answered.can_transition_to(CallStatus::OnHold));
        assert!(CallStatus::OnHold.can_transition_to(CallStatus::Answered));
    }

    #[test]
    fn hold_is_unreachable_from_setup() {
        assert!(!CallStatus::Initiating.can_transition_to(CallStatus::OnHold));
        assert!(!CallStatus::RingingOutbound.can_transition_to(CallStatus::OnHold));
        assert!(!CallStatus::RingingInbound.can_transition_to(CallStatus::OnHold));
    }

    #[test]
    fn duration_rounds_to_whole_seconds() {
        let ctx = CallContext::named("Alice");
        let mut call = Call::outbound("+306912345", "line-1", "mock", &ctx);
        call.end_time = Some(call.start_time + Duration::milliseconds(2499));
        call.recompute_duration();
        assert_eq!(call.duration_seconds, Some(2));

        call.end_time = Some(call.start_time + Duration::milliseconds(2500));
        call.recompute_duration();
        assert_eq!(call.duration_seconds, Some(3));
    }

    #[test]
    fn duration_never_negative() {
        let ctx = CallContext::default();
        let mut call = Call::outbound("+306912345", "line-1", "mock", &ctx);
        call.end_time = Some(call.start_time - Duration::seconds(5));
        call.recompute_duration();
        assert_eq!(call.duration_seconds, Some(0));
    }

    #[test]
    fn duration_undefined_without_end_time() {
        let ctx = CallContext::default();
        let mut call = Call::outbound("+306912345", "line-1", "mock", &ctx);
        call.recompute_duration();
        assert_eq!(call.duration_seconds, None);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&CallStatus::RingingOutbound).unwrap();
        assert_eq!(json, "\"ringing_outbound\"");
        let reason = serde_json::to_string(&HangupReason::LocalHangup).unwrap();
        assert_eq!(reason, "\"local_hangup\"");
    }
}
