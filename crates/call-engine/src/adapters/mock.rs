//! Mock telephony backend
//!
//! A fully in-process adapter that simulates a call backend with
//! configurable delays and outcomes. The test suite drives every lifecycle
//! path through it; demos use it to run the engine without any real
//! telephony account.
//!
//! Each outbound call runs a small script on its own task:
//! `Connecting` → `Ringing` → the configured outcome (answer, busy, ring
//! out, voicemail). Commands are acknowledged asynchronously through the
//! event stream after a short delay, exactly like a network backend would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use switchboard_voip_core::{
    CallContext, CallEventKind, CallSession, ConnectionError, EventSink, HangupReason, SessionId,
    VoipAdapter, VoipError,
};

/// What the simulated backend does with an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Ring, then answer
    Answer,
    /// Ring, then report busy
    Busy,
    /// Ring, then ring out unanswered
    NoAnswer,
    /// Ring, then divert to voicemail
    Voicemail,
    /// Reject the call synchronously at setup
    RejectSetup,
}

struct MockSession {
    /// Set once a terminal event has been emitted; the call script checks
    /// it before every emission so a hangup silences the rest of the script
    ended: Arc<AtomicBool>,
}

/// Builder for [`MockVoipAdapter`]
pub struct MockVoipAdapterBuilder {
    system_name: String,
    behavior: MockBehavior,
    ring_delay: Duration,
    answer_delay: Duration,
    jitter: Option<Duration>,
    line: Option<String>,
}

impl MockVoipAdapterBuilder {
    /// Set the simulated outcome for outbound calls
    pub fn behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Delay from setup until the `Ringing` report
    pub fn ring_delay(mut self, delay: Duration) -> Self {
        self.ring_delay = delay;
        self
    }

    /// Delay from `Ringing` until the outcome event
    pub fn answer_delay(mut self, delay: Duration) -> Self {
        self.answer_delay = delay;
        self
    }

    /// Add up to this much random extra delay to each script step
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Line identifier reported back on started calls
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    /// Build the adapter
    pub fn build(self) -> MockVoipAdapter {
        MockVoipAdapter {
            system_name: self.system_name,
            behavior: self.behavior,
            ring_delay: self.ring_delay,
            answer_delay: self.answer_delay,
            jitter: self.jitter,
            line: self.line,
            connected: AtomicBool::new(false),
            sink: RwLock::new(None),
            sessions: DashMap::new(),
        }
    }
}

/// Simulated telephony backend
pub struct MockVoipAdapter {
    system_name: String,
    behavior: MockBehavior,
    ring_delay: Duration,
    answer_delay: Duration,
    jitter: Option<Duration>,
    line: Option<String>,
    connected: AtomicBool,
    sink: RwLock<Option<EventSink>>,
    sessions: DashMap<SessionId, MockSession>,
}

impl MockVoipAdapter {
    /// Start building a mock adapter with the given system name
    pub fn builder(system_name: impl Into<String>) -> MockVoipAdapterBuilder {
        MockVoipAdapterBuilder {
            system_name: system_name.into(),
            behavior: MockBehavior::Answer,
            ring_delay: Duration::from_millis(50),
            answer_delay: Duration::from_millis(100),
            jitter: None,
            line: None,
        }
    }

    fn step_delay(&self, base: Duration) -> Duration {
        match self.jitter {
            Some(jitter) if !jitter.is_zero() => {
                let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
                base + Duration::from_millis(extra)
            }
            _ => base,
        }
    }

    async fn sink(&self) -> Option<EventSink> {
        self.sink.read().await.clone()
    }

    /// Emit an arbitrary event for a session
    ///
    /// Test hook: lets a suite script duplicate deliveries, out-of-order
    /// events, and anything else an unruly backend might produce.
    pub async fn emit(&self, session: &SessionId, kind: CallEventKind) {
        match self.sink().await {
            Some(sink) => sink.emit(session.clone(), kind),
            None => warn!("mock adapter '{}' has no event sink", self.system_name),
        }
    }

    /// Announce an inbound call and return its backend session id
    ///
    /// The returned id can be fed back into [`emit`] to script the rest of
    /// the inbound lifecycle (`Missed`, `Disconnected`, ...).
    ///
    /// [`emit`]: MockVoipAdapter::emit
    pub async fn push_incoming(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        display_name: Option<String>,
    ) -> SessionId {
        let session_id = SessionId::generate(&self.system_name);
        self.sessions.insert(
            session_id.clone(),
            MockSession { ended: Arc::new(AtomicBool::new(false)) },
        );
        self.emit(
            &session_id,
            CallEventKind::IncomingCall {
                from: from.into(),
                to: to.into(),
                display_name,
            },
        )
        .await;
        session_id
    }

    fn live_session(&self, session: &SessionId) -> Result<Arc<AtomicBool>, VoipError> {
        let entry = self.sessions.get(session).ok_or_else(|| {
            VoipError::adapter_error(self.system_name.as_str(), format!("unknown session {}", session))
        })?;
        if entry.ended.load(Ordering::SeqCst) {
            return Err(VoipError::adapter_error(
                self.system_name.as_str(),
                format!("session {} already ended", session),
            ));
        }
        Ok(Arc::clone(&entry.ended))
    }

    fn require_connected(&self) -> Result<(), VoipError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VoipError::adapter_error(self.system_name.as_str(), "backend not connected"))
        }
    }

    /// Spawn the scripted lifecycle for an outbound call
    fn spawn_call_script(&self, session_id: SessionId, ended: Arc<AtomicBool>, sink: EventSink) {
        let behavior = self.behavior;
        let ring_delay = self.step_delay(self.ring_delay);
        let answer_delay = self.step_delay(self.answer_delay);

        tokio::spawn(async move {
            tokio::time::sleep(ring_delay / 2).await;
            if ended.load(Ordering::SeqCst) {
                return;
            }
            sink.emit(session_id.clone(), CallEventKind::Connecting);

            tokio::time::sleep(ring_delay / 2).await;
            if ended.load(Ordering::SeqCst) {
                return;
            }
            sink.emit(session_id.clone(), CallEventKind::Ringing);

            tokio::time::sleep(answer_delay).await;
            if ended.load(Ordering::SeqCst) {
                return;
            }
            match behavior {
                MockBehavior::Answer => {
                    sink.emit(session_id, CallEventKind::Answered);
                }
                MockBehavior::Busy => {
                    ended.store(true, Ordering::SeqCst);
                    sink.emit(session_id, CallEventKind::Busy);
                }
                MockBehavior::NoAnswer => {
                    ended.store(true, Ordering::SeqCst);
                    sink.emit(session_id, CallEventKind::Missed);
                }
                MockBehavior::Voicemail => {
                    ended.store(true, Ordering::SeqCst);
                    sink.emit(session_id, CallEventKind::Voicemail);
                }
                MockBehavior::RejectSetup => {}
            }
        });
    }
}

#[async_trait]
impl VoipAdapter for MockVoipAdapter {
    fn system_name(&self) -> &str {
        &self.system_name
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        // Idempotent: reconnecting an already connected backend is fine.
        self.connected.store(true, Ordering::SeqCst);
        debug!("mock adapter '{}' connected", self.system_name);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("mock adapter '{}' disconnected", self.system_name);
        Ok(())
    }

    async fn register_event_sink(&self, sink: EventSink) {
        *self.sink.write().await = Some(sink);
    }

    async fn start_call(
        &self,
        target: &str,
        _context: &CallContext,
    ) -> Result<CallSession, VoipError> {
        self.require_connected()?;
        if self.behavior == MockBehavior::RejectSetup {
            return Err(VoipError::call_setup_failed(format!(
                "backend rejected call to {}",
                target
            )));
        }
        let sink = self.sink().await.ok_or_else(|| {
            VoipError::adapter_error(self.system_name.as_str(), "no event sink registered")
        })?;

        let session_id = SessionId::generate(&self.system_name);
        let ended = Arc::new(AtomicBool::new(false));
        self.sessions.insert(
            session_id.clone(),
            MockSession { ended: Arc::clone(&ended) },
        );
        self.spawn_call_script(session_id.clone(), ended, sink);

        Ok(CallSession {
            session_id,
            system: self.system_name.clone(),
            line: self.line.clone(),
        })
    }

    async fn answer_call(&self, session: &SessionId) -> Result<(), VoipError> {
        self.require_connected()?;
        self.live_session(session)?;
        self.emit(session, CallEventKind::Answered).await;
        Ok(())
    }

    async fn mute_call(&self, session: &SessionId, muted: bool) -> Result<(), VoipError> {
        self.require_connected()?;
        self.live_session(session)?;
        self.emit(session, CallEventKind::MuteChanged { muted }).await;
        Ok(())
    }

    async fn hold_call(&self, session: &SessionId, hold: bool) -> Result<(), VoipError> {
        self.require_connected()?;
        self.live_session(session)?;
        self.emit(session, CallEventKind::HoldChanged { on_hold: hold }).await;
        Ok(())
    }

    async fn end_call(&self, session: &SessionId) -> Result<(), VoipError> {
        self.require_connected()?;
        let ended = self.live_session(session)?;
        ended.store(true, Ordering::SeqCst);
        self.emit(
            session,
            CallEventKind::Disconnected { reason: HangupReason::LocalHangup },
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn connected_adapter(behavior: MockBehavior) -> (MockVoipAdapter, mpsc::UnboundedReceiver<switchboard_voip_core::CallEvent>) {
        let adapter = MockVoipAdapter::builder("mock")
            .behavior(behavior)
            .ring_delay(Duration::from_millis(10))
            .answer_delay(Duration::from_millis(10))
            .build();
        let (tx, rx) = mpsc::unbounded_channel();
        adapter.register_event_sink(EventSink::new("mock", tx)).await;
        adapter.connect().await.unwrap();
        (adapter, rx)
    }

    #[tokio::test]
    async fn answer_script_emits_full_lifecycle() {
        let (adapter, mut rx) = connected_adapter(MockBehavior::Answer).await;
        let session = adapter
            .start_call("+306912345", &CallContext::default())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        for _ in 0..3 {
            kinds.push(rx.recv().await.unwrap().kind);
        }
        assert_eq!(
            kinds,
            vec![CallEventKind::Connecting, CallEventKind::Ringing, CallEventKind::Answered]
        );
        assert_eq!(session.system, "mock");
    }

    #[tokio::test]
    async fn end_call_silences_remaining_script() {
        let (adapter, mut rx) = connected_adapter(MockBehavior::Answer).await;
        let session = adapter
            .start_call("+306912345", &CallContext::default())
            .await
            .unwrap();

        adapter.end_call(&session.session_id).await.unwrap();

        // Drain everything the adapter will ever emit; after the hangup no
        // Answered may appear.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let mut saw_disconnect = false;
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event.kind, CallEventKind::Answered);
            if matches!(event.kind, CallEventKind::Disconnected { .. }) {
                saw_disconnect = true;
            }
        }
        assert!(saw_disconnect);
    }

    #[tokio::test]
    async fn reject_setup_fails_synchronously() {
        let (adapter, _rx) = connected_adapter(MockBehavior::RejectSetup).await;
        let err = adapter
            .start_call("+306912345", &CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VoipError::CallSetupFailed { .. }));
    }

    #[tokio::test]
    async fn disconnected_backend_refuses_commands() {
        let (adapter, _rx) = connected_adapter(MockBehavior::Answer).await;
        let session = adapter
            .start_call("+306912345", &CallContext::default())
            .await
            .unwrap();
        adapter.disconnect().await.unwrap();

        let err = adapter.mute_call(&session.session_id, true).await.unwrap_err();
        assert!(matches!(err, VoipError::AdapterError { .. }));
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let adapter = MockVoipAdapter::builder("mock").build();
        adapter.connect().await.unwrap();
        adapter.connect().await.unwrap();
        adapter.disconnect().await.unwrap();
        adapter.disconnect().await.unwrap();
    }
}
