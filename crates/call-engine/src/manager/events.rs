//! Adapter event consumption and state transitions
//!
//! A single consumer task drains the engine's event sink, which preserves
//! the order each adapter emitted its events in. Applying an event is a
//! pure state transition on the call record: validate against the status
//! graph, mutate, publish. Illegal events are discarded with a diagnostic
//! and never crash the engine; duplicate terminal events are idempotent
//! no-ops, because adapter delivery is at-least-once.
//!
//! Every read-modify-write of a call record happens under that call's
//! serialization slot, so a command acknowledgement and a concurrently
//! issued command can never interleave on the same call.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use switchboard_voip_core::{
    Call, CallContext, CallDirection, CallEvent, CallEventKind, CallId, CallStatus, HangupReason,
};

use crate::events::{EngineEvent, EventPriority, IncomingCallInfo};
use crate::store::CallSlot;

impl super::core::CallSessionManager {
    /// Consumer loop body; runs until the channel closes or `stop` aborts it
    ///
    /// The receiver lives in the manager so a stopped engine can be started
    /// again; the lock is only ever contended by a successor of this task.
    pub(crate) async fn run_event_loop(&self) {
        loop {
            let event = self.sink_rx.lock().await.recv().await;
            match event {
                Some(event) => self.handle_adapter_event(event).await,
                None => break,
            }
        }
        debug!("Adapter event channel closed, consumer exiting");
    }

    /// Route one adapter event to the right call
    pub(crate) async fn handle_adapter_event(&self, event: CallEvent) {
        if let CallEventKind::IncomingCall { .. } = event.kind {
            self.handle_incoming(event).await;
            return;
        }

        let call_id = match self.call_mapping.get(&event.session_id) {
            Some(entry) => *entry,
            None => {
                // Sessions are forgotten once a call terminates, so a late
                // duplicate terminal event lands here; anything else is an
                // adapter talking about a call we never knew.
                if event.kind.is_terminal() {
                    debug!(
                        session = %event.session_id,
                        "terminal event for unknown session ignored"
                    );
                } else {
                    warn!(
                        system = %event.system,
                        session = %event.session_id,
                        "protocol violation: {:?} for unknown session, discarded",
                        event.kind
                    );
                }
                return;
            }
        };

        self.apply_event(call_id, event).await;
    }

    /// Apply one event to a known call, under its serialization slot
    async fn apply_event(&self, call_id: CallId, event: CallEvent) {
        let lock = self.call_lock(call_id);
        let _guard = lock.lock().await;

        let call = match self.store.locate(call_id).await {
            Some(CallSlot::Active(call)) => call,
            Some(CallSlot::Logged(_)) => {
                if event.kind.is_terminal() {
                    debug!(call = %call_id, "duplicate terminal event ignored");
                } else {
                    warn!(
                        call = %call_id,
                        "protocol violation: {:?} after terminal status, discarded",
                        event.kind
                    );
                }
                return;
            }
            None => {
                warn!(call = %call_id, "event for untracked call discarded");
                return;
            }
        };

        match event.kind {
            CallEventKind::Connecting => {
                self.transition(call, CallStatus::Connecting, None).await;
            }
            CallEventKind::Ringing => {
                let target = match call.direction {
                    CallDirection::Outbound => CallStatus::RingingOutbound,
                    CallDirection::Inbound => CallStatus::RingingInbound,
                };
                self.transition(call, target, None).await;
            }
            CallEventKind::Answered => {
                self.transition(call, CallStatus::Answered, Some("call answered".to_string()))
                    .await;
            }
            CallEventKind::MuteChanged { muted } => {
                if !call.status.is_connected() {
                    warn!(
                        call = %call_id,
                        "protocol violation: mute acknowledgement in {:?}, discarded",
                        call.status
                    );
                    return;
                }
                if call.is_muted == muted {
                    debug!(call = %call_id, "duplicate mute acknowledgement ignored");
                    return;
                }
                let _ = self.store.update_active(call_id, |c| c.is_muted = muted).await;
                info!("Call {} mute acknowledged: {}", call_id, muted);
            }
            CallEventKind::HoldChanged { on_hold } => {
                let target = if on_hold { CallStatus::OnHold } else { CallStatus::Answered };
                if call.status == target {
                    debug!(call = %call_id, "duplicate hold acknowledgement ignored");
                    return;
                }
                if !call.status.can_transition_to(target) {
                    warn!(
                        call = %call_id,
                        "protocol violation: hold acknowledgement in {:?}, discarded",
                        call.status
                    );
                    return;
                }
                let previous = call.status;
                let direction = call.direction;
                let _ = self
                    .store
                    .update_active(call_id, |c| {
                        c.status = target;
                        c.is_on_hold = on_hold;
                    })
                    .await;
                self.emit(EngineEvent::state_changed(
                    call_id,
                    direction,
                    Some(previous),
                    target,
                    Some(if on_hold { "call held" } else { "call resumed" }.to_string()),
                ));
                info!("Call {} hold acknowledged: {}", call_id, on_hold);
            }
            CallEventKind::Disconnected { reason } => {
                self.finalize_locked(
                    call,
                    CallStatus::Disconnected,
                    Some(reason),
                    None,
                    "call disconnected",
                    event.timestamp,
                )
                .await;
            }
            CallEventKind::Failed { error } => {
                self.finalize_locked(
                    call,
                    CallStatus::Failed,
                    Some(HangupReason::Error),
                    Some(error),
                    "backend failure",
                    event.timestamp,
                )
                .await;
            }
            CallEventKind::Missed => {
                self.finalize_locked(
                    call,
                    CallStatus::Missed,
                    None,
                    None,
                    "call rang out",
                    event.timestamp,
                )
                .await;
            }
            CallEventKind::Busy => {
                self.finalize_locked(
                    call,
                    CallStatus::Busy,
                    None,
                    None,
                    "remote endpoint busy",
                    event.timestamp,
                )
                .await;
            }
            CallEventKind::Voicemail => {
                self.finalize_locked(
                    call,
                    CallStatus::Voicemail,
                    None,
                    None,
                    "diverted to voicemail",
                    event.timestamp,
                )
                .await;
            }
            CallEventKind::IncomingCall { .. } => {
                // Routed in handle_adapter_event; an IncomingCall carrying a
                // session we already track is an adapter redelivery.
                debug!(call = %call_id, "duplicate incoming-call announcement ignored");
            }
        }
    }

    /// Apply a plain (non-terminal, non-flag) status transition
    ///
    /// Caller holds the call's serialization slot.
    async fn transition(&self, call: Call, target: CallStatus, reason: Option<String>) {
        if call.status == target {
            debug!(call = %call.id, "redelivered {:?} event ignored", target);
            return;
        }
        if !call.status.can_transition_to(target) {
            warn!(
                call = %call.id,
                "protocol violation: illegal transition {:?} -> {:?}, event discarded",
                call.status,
                target
            );
            return;
        }

        let previous = call.status;
        let call_id = call.id;
        let direction = call.direction;
        let _ = self
            .store
            .update_active(call_id, |c| {
                c.status = target;
                if target == CallStatus::Answered && c.connected_time.is_none() {
                    c.connected_time = Some(Utc::now());
                }
            })
            .await;

        // Reaching the answered pair ends the setup phase; the watchdog has
        // nothing left to bound.
        if target.is_connected() {
            if let Some((_, handle)) = self.watchdogs.remove(&call_id) {
                handle.abort();
            }
        }

        self.emit(EngineEvent::state_changed(call_id, direction, Some(previous), target, reason));
        info!("Call {} moved {:?} -> {:?}", call_id, previous, target);
    }

    /// Create the canonical record for an adapter-announced inbound call
    async fn handle_incoming(&self, event: CallEvent) {
        let (from, to, display_name) = match event.kind {
            CallEventKind::IncomingCall { from, to, display_name } => (from, to, display_name),
            _ => return,
        };

        if self.call_mapping.contains_key(&event.session_id) {
            debug!(session = %event.session_id, "duplicate incoming-call announcement ignored");
            return;
        }

        let context = CallContext {
            display_name: display_name.clone(),
            ..Default::default()
        };
        let call = Call::inbound(from.as_str(), to.as_str(), event.system.as_str(), &context);
        let call_id = call.id;
        let received_at = event.timestamp;

        if let Err(err) = self.store.insert_active(call).await {
            warn!("Failed to record incoming call: {}", err);
            return;
        }
        self.counters.lock().await.total_calls += 1;
        self.call_mapping.insert(event.session_id.clone(), call_id);
        self.session_mapping.insert(call_id, event.session_id);

        self.emit(EngineEvent::IncomingCall {
            info: IncomingCallInfo {
                call_id,
                from: from.clone(),
                to,
                display_name,
                voip_system: event.system,
                received_at,
            },
            priority: EventPriority::High,
        });
        self.emit(EngineEvent::state_changed(
            call_id,
            CallDirection::Inbound,
            None,
            CallStatus::RingingInbound,
            Some("incoming call".to_string()),
        ));
        self.spawn_setup_watchdog(call_id);
        info!("Incoming call {} from {}", call_id, from);
    }

    // ===== termination =====

    /// Finalize a call after taking its serialization slot
    ///
    /// No-op if the call is no longer active (a racing event already
    /// terminated it), which is what makes duplicate terminal paths safe.
    pub(crate) async fn finalize(
        &self,
        call_id: CallId,
        status: CallStatus,
        hangup_reason: Option<HangupReason>,
        error_message: Option<String>,
        why: &str,
    ) {
        let lock = self.call_lock(call_id);
        let _guard = lock.lock().await;
        if let Some(CallSlot::Active(call)) = self.store.locate(call_id).await {
            self.finalize_locked(call, status, hangup_reason, error_message, why, Utc::now())
                .await;
        }
    }

    /// Terminal transition: stamp the record, move active -> log, publish
    ///
    /// Caller holds the call's serialization slot. The store move, the
    /// selection invalidation, and the log append are one logical update.
    async fn finalize_locked(
        &self,
        mut call: Call,
        status: CallStatus,
        hangup_reason: Option<HangupReason>,
        error_message: Option<String>,
        why: &str,
        at: DateTime<Utc>,
    ) {
        if call.status.is_terminal() {
            debug!(call = %call.id, "already terminal, finalize skipped");
            return;
        }

        let previous = call.status;
        let call_id = call.id;
        let direction = call.direction;

        call.status = status;
        if call.end_time.is_none() {
            call.end_time = Some(at);
        }
        call.recompute_duration();
        if call.hangup_reason.is_none() {
            call.hangup_reason = hangup_reason;
        }
        if error_message.is_some() {
            call.error_message = error_message;
        }

        match self.store.complete(call).await {
            Ok(selection_cleared) => {
                if selection_cleared {
                    self.emit(EngineEvent::SelectedCallChanged { call_id: None });
                }
                self.emit(EngineEvent::state_changed(
                    call_id,
                    direction,
                    Some(previous),
                    status,
                    Some(why.to_string()),
                ));
                info!("Call {} finalized as {:?} ({})", call_id, status, why);
            }
            Err(err) => {
                warn!("Failed to move call {} to the log: {}", call_id, err);
            }
        }
        self.forget_call(call_id);
    }

    // ===== setup watchdog =====

    /// Bound the setup phase of a call
    ///
    /// If the call is still in a setup status (initiating, connecting, or
    /// ringing) when the configured setup timeout elapses, it is
    /// unilaterally finalized as failed with a timeout marker.
    pub(crate) fn spawn_setup_watchdog(&self, call_id: CallId) {
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let setup_timeout = self.config.setup_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(setup_timeout).await;
            // Drop our own handle before finalizing so the cleanup path
            // does not abort the task that is running it.
            manager.watchdogs.remove(&call_id);
            manager.enforce_setup_timeout(call_id).await;
        });
        self.watchdogs.insert(call_id, handle);
    }

    async fn enforce_setup_timeout(&self, call_id: CallId) {
        let lock = self.call_lock(call_id);
        let _guard = lock.lock().await;
        match self.store.locate(call_id).await {
            Some(CallSlot::Active(call)) if call.status.is_setup() => {
                warn!("Call {} stuck in {:?}, finalizing as timed out", call_id, call.status);
                self.finalize_locked(
                    call,
                    CallStatus::Failed,
                    Some(HangupReason::Timeout),
                    Some("TIMEOUT".to_string()),
                    "call setup timed out",
                    Utc::now(),
                )
                .await;
            }
            _ => {}
        }
    }
}
