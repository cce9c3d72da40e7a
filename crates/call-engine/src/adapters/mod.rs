//! Bundled adapter implementations
//!
//! Real deployments plug in their own backends through the
//! [`VoipAdapter`](switchboard_voip_core::VoipAdapter) trait; this module
//! only ships the mock provider used by the test suite and demos.

pub mod mock;

pub use mock::{MockBehavior, MockVoipAdapter, MockVoipAdapterBuilder};
