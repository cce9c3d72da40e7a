//! Outbound call initiation and inbound answering

use tokio::time::timeout;
use tracing::{info, warn};

use switchboard_voip_core::{
    Call, CallContext, CallId, CallStatus, HangupReason, VoipError, VoipResult,
};

use crate::events::EngineEvent;
use crate::store::CallSlot;

impl super::core::CallSessionManager {
    /// Start an outbound call
    ///
    /// The registry picks the adapter (`preferred_system` first, then the
    /// configured default, then registration order). The call record is
    /// created and inserted into the active set *before* the backend is
    /// asked to dial, so the UI has an id to track immediately; if the
    /// backend then rejects the request, the same record is finalized as
    /// failed and lands in the log.
    ///
    /// # Errors
    ///
    /// * `VoipError::NotRunning` - the manager has not been started
    /// * `VoipError::TooManyCalls` - concurrent call limit reached
    /// * `VoipError::AdapterUnavailable` - no ready adapter; no call record
    ///   is created in this case
    /// * `VoipError::CallSetupFailed` / `VoipError::Timeout` - the backend
    ///   rejected or out-waited the request; the record exists and is
    ///   already finalized as failed
    pub async fn start_call(
        &self,
        target: impl Into<String>,
        context: CallContext,
        preferred_system: Option<&str>,
    ) -> VoipResult<CallId> {
        if !self.is_running().await {
            return Err(VoipError::NotRunning);
        }
        if self.store.active_count().await >= self.config.max_concurrent_calls {
            return Err(VoipError::TooManyCalls {
                limit: self.config.max_concurrent_calls,
            });
        }

        let target = target.into();
        // Adapter selection happens before any record is created: an
        // unavailable backend must leave no trace in the store.
        let adapter = self.registry.select_for_outbound(preferred_system).await?;
        let system = adapter.system_name().to_string();

        let call = Call::outbound(
            target.as_str(),
            self.config.local_line.as_str(),
            system.as_str(),
            &context,
        );
        let call_id = call.id;
        let direction = call.direction;
        self.store.insert_active(call).await?;
        self.counters.lock().await.total_calls += 1;
        self.emit(EngineEvent::state_changed(
            call_id,
            direction,
            None,
            CallStatus::Initiating,
            Some("call created".to_string()),
        ));
        info!("Starting outbound call {} to {} via '{}'", call_id, target, system);

        match timeout(self.config.setup_timeout, adapter.start_call(&target, &context)).await {
            Ok(Ok(session)) => {
                self.call_mapping.insert(session.session_id.clone(), call_id);
                self.session_mapping.insert(call_id, session.session_id.clone());
                if let Some(line) = session.line {
                    // The backend allocated a concrete line; reflect it on
                    // the record. The call may already be terminal if setup
                    // failed instantly, in which case this is a no-op.
                    let _ = self.store.update_active(call_id, |c| c.from = line).await;
                }
                self.spawn_setup_watchdog(call_id);
                Ok(call_id)
            }
            Ok(Err(err)) => {
                warn!("Adapter '{}' rejected call {}: {}", system, call_id, err);
                self.finalize(
                    call_id,
                    CallStatus::Failed,
                    Some(HangupReason::Error),
                    Some(err.to_string()),
                    "backend rejected call setup",
                )
                .await;
                Err(err)
            }
            Err(_elapsed) => {
                let err = VoipError::timeout("start_call", self.config.setup_timeout);
                warn!("Adapter '{}' timed out starting call {}", system, call_id);
                self.finalize(
                    call_id,
                    CallStatus::Failed,
                    Some(HangupReason::Timeout),
                    Some("TIMEOUT".to_string()),
                    "call setup timed out",
                )
                .await;
                Err(err)
            }
        }
    }

    /// Answer a ringing inbound call
    ///
    /// Valid only while the call is in `RingingInbound`; the status moves
    /// to `Answered` when the adapter acknowledges on the event stream.
    pub async fn answer_call(&self, call_id: CallId) -> VoipResult<()> {
        if !self.is_running().await {
            return Err(VoipError::NotRunning);
        }

        let (system, session_id) = {
            let lock = self.call_lock(call_id);
            let _guard = lock.lock().await;

            let call = match self.store.locate(call_id).await {
                Some(CallSlot::Active(call)) => call,
                Some(CallSlot::Logged(call)) => {
                    return Err(VoipError::command_rejected(call_id, call.status));
                }
                None => return Err(VoipError::CallNotFound { call_id }),
            };
            if call.status != CallStatus::RingingInbound {
                return Err(VoipError::command_rejected(call_id, call.status));
            }
            let session_id = self
                .session_mapping
                .get(&call_id)
                .map(|s| s.clone())
                .ok_or_else(|| VoipError::internal("inbound call has no adapter session"))?;
            (call.voip_system, session_id)
        };

        let adapter = self.registry.get(&system).await?;
        timeout(self.config.command_ack_timeout, adapter.answer_call(&session_id))
            .await
            .map_err(|_| VoipError::timeout("answer_call", self.config.command_ack_timeout))??;

        info!("Answer requested for call {}", call_id);
        Ok(())
    }
}
