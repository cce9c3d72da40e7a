//! Call control commands and selection
//!
//! Mute, hold, and end delegate to the adapter that owns the call (fixed by
//! `Call.voip_system` at creation). None of them mutate call state
//! directly: the flags and status change only when the adapter's
//! acknowledgement event comes back, which keeps the UI and the backend
//! from ever diverging on what actually happened.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::info;

use switchboard_voip_core::{
    Call, CallId, CallStatus, HangupReason, SessionId, VoipAdapter, VoipError, VoipResult,
};

use crate::events::EngineEvent;
use crate::store::CallSlot;

impl super::core::CallSessionManager {
    /// Request microphone mute/unmute for a call
    ///
    /// Valid while the call is answered or on hold; anything else is
    /// `CommandRejected` without mutating the record. `is_muted` flips when
    /// the adapter's `MuteChanged` acknowledgement arrives.
    pub async fn mute_call(&self, call_id: CallId, muted: bool) -> VoipResult<()> {
        let (adapter, session_id) = self
            .prepare_command(call_id, |status| status.is_connected())
            .await?;

        timeout(self.config.command_ack_timeout, adapter.mute_call(&session_id, muted))
            .await
            .map_err(|_| VoipError::timeout("mute_call", self.config.command_ack_timeout))??;

        info!("Mute={} requested for call {}", muted, call_id);
        Ok(())
    }

    /// Request hold or resume for a call
    ///
    /// Hold is valid from `Answered`, resume from `OnHold`. The status and
    /// `is_on_hold` flip when the adapter's `HoldChanged` acknowledgement
    /// arrives.
    pub async fn hold_call(&self, call_id: CallId, hold: bool) -> VoipResult<()> {
        let required = if hold { CallStatus::Answered } else { CallStatus::OnHold };
        let (adapter, session_id) = self
            .prepare_command(call_id, |status| status == required)
            .await?;

        timeout(self.config.command_ack_timeout, adapter.hold_call(&session_id, hold))
            .await
            .map_err(|_| VoipError::timeout("hold_call", self.config.command_ack_timeout))??;

        info!("Hold={} requested for call {}", hold, call_id);
        Ok(())
    }

    /// End a call
    ///
    /// Accepted from any non-terminal status. If the backend never got as
    /// far as allocating a session (the call is still purely local), the
    /// record is finalized directly as a local hangup; otherwise the
    /// adapter is asked to tear the call down and the terminal event does
    /// the rest.
    pub async fn end_call(&self, call_id: CallId) -> VoipResult<()> {
        let call = self.guard_command(call_id, |_| true).await?;

        let session_id = match self.session_mapping.get(&call_id) {
            Some(entry) => entry.clone(),
            None => {
                // No backend session to tear down; cancel locally.
                self.finalize(
                    call_id,
                    CallStatus::Disconnected,
                    Some(HangupReason::LocalHangup),
                    None,
                    "cancelled before backend confirmation",
                )
                .await;
                return Ok(());
            }
        };

        let adapter = self.registry.get(&call.voip_system).await?;
        timeout(self.config.command_ack_timeout, adapter.end_call(&session_id))
            .await
            .map_err(|_| VoipError::timeout("end_call", self.config.command_ack_timeout))??;

        info!("Hangup requested for call {}", call_id);
        Ok(())
    }

    // ===== selection =====

    /// Currently selected call, if any
    pub async fn get_selected_call(&self) -> Option<CallId> {
        self.store.selected_call().await
    }

    /// Select a call for the UI, or clear the selection with `None`
    ///
    /// A non-null selection must reference a call in the active set. The
    /// pointer is cleared automatically when the selected call terminates.
    pub async fn set_selected_call(&self, call_id: Option<CallId>) -> VoipResult<()> {
        self.store.set_selected_call(call_id).await?;
        self.emit(EngineEvent::SelectedCallChanged { call_id });
        Ok(())
    }

    // ===== helpers =====

    /// Validate a command against the call's current status
    ///
    /// Takes the per-call lock for the check so a concurrently applied
    /// event cannot slip between the read and the verdict. Rejection never
    /// mutates the record.
    pub(crate) async fn guard_command<F>(&self, call_id: CallId, allowed: F) -> VoipResult<Call>
    where
        F: Fn(CallStatus) -> bool,
    {
        let lock = self.call_lock(call_id);
        let _guard = lock.lock().await;

        let call = match self.store.locate(call_id).await {
            Some(CallSlot::Active(call)) => call,
            Some(CallSlot::Logged(call)) => {
                return Err(VoipError::command_rejected(call_id, call.status));
            }
            None => return Err(VoipError::CallNotFound { call_id }),
        };
        if call.status.is_terminal() || !allowed(call.status) {
            return Err(VoipError::command_rejected(call_id, call.status));
        }
        Ok(call)
    }

    /// Guard a command and resolve the owning adapter and backend session
    async fn prepare_command<F>(
        &self,
        call_id: CallId,
        allowed: F,
    ) -> VoipResult<(Arc<dyn VoipAdapter>, SessionId)>
    where
        F: Fn(CallStatus) -> bool,
    {
        let call = self.guard_command(call_id, allowed).await?;
        let session_id = self
            .session_mapping
            .get(&call_id)
            .map(|s| s.clone())
            .ok_or_else(|| VoipError::command_rejected(call_id, call.status))?;
        let adapter = self.registry.get(&call.voip_system).await?;
        Ok((adapter, session_id))
    }
}
