//! # switchboard-call-engine
//!
//! Call-session lifecycle engine for the Switchboard CRM: the adapter
//! registry, the canonical call store, and the session manager that drives
//! the call state machine while reconciling concurrent UI commands with
//! asynchronous backend events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CRM / UI layer                │
//! └──────┬────────────────────────────▲──────────┘
//!        │ start/answer/mute/hold/end │ snapshots + events
//! ┌──────▼────────────────────────────┴──────────┐
//! │             CallSessionManager               │
//! │  ┌───────────────┐  ┌─────────────────────┐  │
//! │  │AdapterRegistry│  │      CallStore      │  │
//! │  │ readiness +   │  │ active set + log +  │  │
//! │  │ selection     │  │ selection pointer   │  │
//! │  └──────┬────────┘  └─────────────────────┘  │
//! └─────────┼────────────────────▲───────────────┘
//!           │ commands           │ CallEvent stream
//! ┌─────────▼────────────────────┴───────────────┐
//! │   VoipAdapter implementations (pluggable)    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Two independent event sources race against each other: the user clicking
//! the call bar, and the backend reporting progress. The engine gives both
//! a single consistent view by serializing every read-modify-write of a
//! call record behind a per-call slot, applying backend events in arrival
//! order, and updating flags only on backend acknowledgement.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard_call_engine::{CallSessionManager, EngineConfig, MockVoipAdapter};
//! use switchboard_voip_core::CallContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CallSessionManager::new(
//!     EngineConfig::new().with_default_adapter("mock"),
//! )?;
//! manager.register_adapter(Arc::new(MockVoipAdapter::builder("mock").build())).await?;
//! manager.connect_adapter("mock").await?;
//! manager.start().await?;
//!
//! let call_id = manager
//!     .start_call("+30 691 2345", CallContext::named("Alice"), None)
//!     .await?;
//! manager.set_selected_call(Some(call_id)).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod events;
pub mod manager;
pub mod registry;
pub mod store;

pub use adapters::{MockBehavior, MockVoipAdapter, MockVoipAdapterBuilder};
pub use config::EngineConfig;
pub use events::{CallStatusInfo, EngineEvent, EventPriority, IncomingCallInfo};
pub use manager::{CallSessionManager, EngineStats};
pub use registry::{AdapterRegistration, AdapterRegistry};
pub use store::{ActiveCallsListener, CallLogListener, CallSlot, CallStore, SubscriptionId};

// Re-export the contract layer so consumers need a single dependency.
pub use switchboard_voip_core as voip_core;
pub use switchboard_voip_core::{
    Call, CallContext, CallDirection, CallEvent, CallEventKind, CallId, CallSession, CallStatus,
    ConnectionError, EventSink, HangupReason, SessionId, VoipAdapter, VoipError, VoipResult,
};
