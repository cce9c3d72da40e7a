//! # switchboard-voip-core
//!
//! Contract layer for the Switchboard call engine: the canonical call
//! model, the telephony adapter capability trait, the adapter event stream,
//! and the shared error taxonomy.
//!
//! This crate holds everything an adapter author needs and nothing else;
//! orchestration (registries, the session manager, the call store) lives in
//! `switchboard-call-engine`.
//!
//! # Layering
//!
//! ```text
//! ┌──────────────────────────┐
//! │   CRM / UI layer         │
//! └────────────┬─────────────┘
//!              │ commands + subscriptions
//! ┌────────────▼─────────────┐
//! │ switchboard-call-engine  │
//! └────────────┬─────────────┘
//!              │ VoipAdapter + CallEvent
//! ┌────────────▼─────────────┐
//! │ switchboard-voip-core    │ ◄── this crate
//! └──────────────────────────┘
//! ```
//!
//! # Example: a minimal adapter
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use switchboard_voip_core::{
//!     CallContext, CallSession, ConnectionError, EventSink, SessionId, VoipAdapter, VoipError,
//! };
//!
//! struct NullAdapter;
//!
//! #[async_trait]
//! impl VoipAdapter for NullAdapter {
//!     fn system_name(&self) -> &str { "null" }
//!     async fn connect(&self) -> Result<(), ConnectionError> { Ok(()) }
//!     async fn disconnect(&self) -> Result<(), ConnectionError> { Ok(()) }
//!     async fn register_event_sink(&self, _sink: EventSink) {}
//!     async fn start_call(&self, _target: &str, _context: &CallContext)
//!         -> Result<CallSession, VoipError>
//!     {
//!         Err(VoipError::call_setup_failed("null adapter cannot place calls"))
//!     }
//!     async fn answer_call(&self, _s: &SessionId) -> Result<(), VoipError> { Ok(()) }
//!     async fn mute_call(&self, _s: &SessionId, _m: bool) -> Result<(), VoipError> { Ok(()) }
//!     async fn hold_call(&self, _s: &SessionId, _h: bool) -> Result<(), VoipError> { Ok(()) }
//!     async fn end_call(&self, _s: &SessionId) -> Result<(), VoipError> { Ok(()) }
//! }
//! ```

pub mod adapter;
pub mod call;
pub mod error;
pub mod events;

pub use adapter::{CallSession, VoipAdapter};
pub use call::{Call, CallContext, CallDirection, CallId, CallStatus, HangupReason};
pub use error::{ConnectionError, VoipError, VoipResult};
pub use events::{CallEvent, CallEventKind, EventSink, SessionId};
