//! Shared helpers for the engine integration tests

use std::sync::Arc;
use std::time::Duration;

use switchboard_call_engine::{
    Call, CallId, CallSessionManager, CallStatus, EngineConfig, MockVoipAdapter, VoipAdapter,
};

/// Polling interval for state assertions
const POLL: Duration = Duration::from_millis(10);
/// How long an assertion may wait before the test fails
const DEADLINE: Duration = Duration::from_secs(2);

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("switchboard_call_engine=debug,switchboard_voip_core=debug")
        .with_test_writer()
        .try_init();
}

/// Register, connect, and start a manager around one mock adapter
#[allow(dead_code)]
pub async fn spin_up(
    mock: MockVoipAdapter,
    config: EngineConfig,
) -> (Arc<CallSessionManager>, Arc<MockVoipAdapter>) {
    let system = mock.system_name().to_string();
    let mock = Arc::new(mock);
    let manager = CallSessionManager::new(config).expect("valid engine config");
    manager
        .register_adapter(mock.clone())
        .await
        .expect("adapter registers");
    manager
        .connect_adapter(&system)
        .await
        .expect("adapter connects");
    manager.start().await.expect("manager starts");
    (manager, mock)
}

/// Wait until the call reaches `status`, panicking after the deadline
#[allow(dead_code)]
pub async fn wait_for_status(manager: &CallSessionManager, call_id: CallId, status: CallStatus) -> Call {
    let start = tokio::time::Instant::now();
    loop {
        if let Ok(call) = manager.get_call(call_id).await {
            if call.status == status {
                return call;
            }
        }
        if start.elapsed() > DEADLINE {
            let current = manager.get_call(call_id).await.map(|c| c.status);
            panic!("call {} never reached {:?} (currently {:?})", call_id, status, current);
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Wait until the call shows up in the terminated log
#[allow(dead_code)]
pub async fn wait_for_logged(manager: &CallSessionManager, call_id: CallId) -> Call {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(call) = manager.call_log().await.into_iter().find(|c| c.id == call_id) {
            return call;
        }
        if start.elapsed() > DEADLINE {
            panic!("call {} never reached the log", call_id);
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Wait until some predicate over the active set holds
#[allow(dead_code)]
pub async fn wait_for_active<F>(manager: &CallSessionManager, predicate: F) -> Call
where
    F: Fn(&Call) -> bool,
{
    let start = tokio::time::Instant::now();
    loop {
        if let Some(call) = manager.active_calls().await.into_iter().find(|c| predicate(c)) {
            return call;
        }
        if start.elapsed() > DEADLINE {
            panic!("no active call matched the predicate in time");
        }
        tokio::time::sleep(POLL).await;
    }
}
