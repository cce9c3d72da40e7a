//! Call session manager
//!
//! The orchestrator at the heart of the engine: it accepts UI commands,
//! delegates them to the owning adapter, consumes the adapter event stream,
//! and drives the call state machine. It is the concurrency boundary that
//! guarantees a single consistent view of call state even while commands
//! and backend events race each other.
//!
//! # Module layout
//!
//! - **`core`** - the [`CallSessionManager`] struct, lifecycle, stats, and
//!   adapter wiring
//! - **`calls`** - outbound initiation and inbound answering
//! - **`controls`** - mute/hold/end commands and call selection
//! - **`events`** - the event consumer loop, transition application, and
//!   the setup watchdog
//!
//! # Basic flow
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard_call_engine::{CallSessionManager, EngineConfig, MockVoipAdapter};
//! use switchboard_voip_core::CallContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CallSessionManager::new(EngineConfig::new())?;
//! manager.register_adapter(Arc::new(MockVoipAdapter::builder("mock").build())).await?;
//! manager.connect_adapter("mock").await?;
//! manager.start().await?;
//!
//! let mut events = manager.subscribe_events();
//! let call_id = manager
//!     .start_call("+30 691 2345", CallContext::named("Alice"), None)
//!     .await?;
//!
//! // State progress arrives on the broadcast channel...
//! let _ = events.recv().await;
//!
//! manager.end_call(call_id).await?;
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod calls;
pub mod controls;
pub mod core;
pub mod events;

pub use self::core::{CallSessionManager, EngineStats};
