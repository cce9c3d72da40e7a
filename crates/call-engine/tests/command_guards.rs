//! Integration tests for command guards and failure semantics
//!
//! Commands invalid for the call's current status are rejected without
//! touching the record; unavailability and setup failures surface as typed
//! errors with the documented side effects.

mod common;

use std::time::Duration;

use serial_test::serial;
use switchboard_call_engine::{
    CallContext, CallSessionManager, CallStatus, EngineConfig, HangupReason, MockBehavior,
    MockVoipAdapter, VoipError,
};

use common::{init_tracing, spin_up, wait_for_logged, wait_for_status};

fn slow_answer_mock() -> MockVoipAdapter {
    // Ring quickly, then hang in ringing long enough for guards to fire.
    MockVoipAdapter::builder("mock")
        .behavior(MockBehavior::Answer)
        .ring_delay(Duration::from_millis(400))
        .answer_delay(Duration::from_secs(30))
        .build()
}

#[tokio::test]
async fn hold_during_initiating_is_rejected_without_mutation() {
    init_tracing();
    let (manager, _mock) = spin_up(slow_answer_mock(), EngineConfig::new()).await;

    let call_id = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap();

    let call = manager.get_call(call_id).await.unwrap();
    assert_eq!(call.status, CallStatus::Initiating);

    let err = manager.hold_call(call_id, true).await.unwrap_err();
    match err {
        VoipError::CommandRejected { call_id: rejected, status } => {
            assert_eq!(rejected, call_id);
            assert_eq!(status, CallStatus::Initiating);
        }
        other => panic!("expected CommandRejected, got {:?}", other),
    }

    // Rejection did not touch the record.
    let call = manager.get_call(call_id).await.unwrap();
    assert_eq!(call.status, CallStatus::Initiating);
    assert!(!call.is_on_hold);

    let err = manager.mute_call(call_id, true).await.unwrap_err();
    assert!(matches!(err, VoipError::CommandRejected { .. }));
    assert!(!manager.get_call(call_id).await.unwrap().is_muted);
}

#[tokio::test]
async fn resume_requires_on_hold_and_hold_requires_answered() {
    init_tracing();
    let mock = MockVoipAdapter::builder("mock")
        .behavior(MockBehavior::Answer)
        .ring_delay(Duration::from_millis(20))
        .answer_delay(Duration::from_millis(20))
        .build();
    let (manager, _mock) = spin_up(mock, EngineConfig::new()).await;

    let call_id = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap();
    wait_for_status(&manager, call_id, CallStatus::Answered).await;

    // Resume without a hold in place is not a valid command.
    let err = manager.hold_call(call_id, false).await.unwrap_err();
    assert!(matches!(err, VoipError::CommandRejected { .. }));

    manager.hold_call(call_id, true).await.unwrap();
    wait_for_status(&manager, call_id, CallStatus::OnHold).await;

    // A second hold while already held is likewise rejected.
    let err = manager.hold_call(call_id, true).await.unwrap_err();
    assert!(matches!(err, VoipError::CommandRejected { .. }));
}

#[tokio::test]
async fn commands_against_terminated_calls_are_rejected() {
    init_tracing();
    let mock = MockVoipAdapter::builder("mock")
        .behavior(MockBehavior::Answer)
        .ring_delay(Duration::from_millis(20))
        .answer_delay(Duration::from_millis(20))
        .build();
    let (manager, _mock) = spin_up(mock, EngineConfig::new()).await;

    let call_id = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap();
    wait_for_status(&manager, call_id, CallStatus::Answered).await;
    manager.end_call(call_id).await.unwrap();
    wait_for_logged(&manager, call_id).await;

    for result in [
        manager.mute_call(call_id, true).await,
        manager.hold_call(call_id, true).await,
        manager.end_call(call_id).await,
        manager.answer_call(call_id).await,
    ] {
        assert!(matches!(result.unwrap_err(), VoipError::CommandRejected { .. }));
    }
}

#[tokio::test]
async fn no_ready_adapter_creates_no_record() {
    init_tracing();
    let manager = CallSessionManager::new(EngineConfig::new()).unwrap();
    manager.start().await.unwrap();

    let err = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VoipError::AdapterUnavailable { .. }));

    assert_eq!(manager.active_calls().await.len(), 0);
    assert_eq!(manager.call_log().await.len(), 0);
    assert_eq!(manager.get_stats().await.total_calls, 0);
}

#[tokio::test]
async fn registered_but_disconnected_adapter_is_unavailable() {
    init_tracing();
    let (manager, _mock) = spin_up(slow_answer_mock(), EngineConfig::new()).await;
    manager.disconnect_adapter("mock").await.unwrap();

    let err = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VoipError::AdapterUnavailable { .. }));
    assert_eq!(manager.active_calls().await.len(), 0);
}

#[tokio::test]
async fn synchronous_setup_rejection_finalizes_as_failed() {
    init_tracing();
    let mock = MockVoipAdapter::builder("mock")
        .behavior(MockBehavior::RejectSetup)
        .build();
    let (manager, _mock) = spin_up(mock, EngineConfig::new()).await;

    let err = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VoipError::CallSetupFailed { .. }));

    // The record was created for the UI and immediately finalized.
    let log = manager.call_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, CallStatus::Failed);
    assert!(log[0].error_message.is_some());
    assert_eq!(manager.active_calls().await.len(), 0);
}

// Timing-sensitive: run alone so a loaded scheduler cannot skew the bound.
#[tokio::test]
#[serial]
async fn stuck_setup_is_finalized_as_timeout() {
    init_tracing();
    let config = EngineConfig::new().with_setup_timeout(Duration::from_millis(150));
    let (manager, _mock) = spin_up(slow_answer_mock(), config).await;

    let call_id = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap();

    let logged = wait_for_logged(&manager, call_id).await;
    assert_eq!(logged.status, CallStatus::Failed);
    assert_eq!(logged.hangup_reason, Some(HangupReason::Timeout));
    assert_eq!(logged.error_message.as_deref(), Some("TIMEOUT"));
}

#[tokio::test]
#[serial]
async fn answered_calls_outlive_the_setup_timeout() {
    init_tracing();
    let mock = MockVoipAdapter::builder("mock")
        .behavior(MockBehavior::Answer)
        .ring_delay(Duration::from_millis(20))
        .answer_delay(Duration::from_millis(20))
        .build();
    let config = EngineConfig::new().with_setup_timeout(Duration::from_millis(200));
    let (manager, _mock) = spin_up(mock, config).await;

    let call_id = manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap();
    wait_for_status(&manager, call_id, CallStatus::Answered).await;

    // Well past the setup bound the call is still healthy.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let call = manager.get_call(call_id).await.unwrap();
    assert_eq!(call.status, CallStatus::Answered);
}

#[tokio::test]
async fn concurrent_call_limit_is_enforced() {
    init_tracing();
    let config = EngineConfig::new().with_max_concurrent_calls(1);
    let (manager, _mock) = spin_up(slow_answer_mock(), config).await;

    manager
        .start_call("+306912345", CallContext::default(), None)
        .await
        .unwrap();
    let err = manager
        .start_call("+306954321", CallContext::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VoipError::TooManyCalls { limit: 1 }));
}

#[tokio::test]
async fn unknown_call_id_is_not_found() {
    init_tracing();
    let (manager, _mock) = spin_up(slow_answer_mock(), EngineConfig::new()).await;
    let ghost = uuid::Uuid::new_v4();
    assert!(matches!(
        manager.end_call(ghost).await.unwrap_err(),
        VoipError::CallNotFound { .. }
    ));
    assert!(matches!(
        manager.get_call(ghost).await.unwrap_err(),
        VoipError::CallNotFound { .. }
    ));
}
