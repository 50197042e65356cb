//! # AVDTP Test Utilities
//!
//! Shared test utilities for the AVDTP control plane.
//!
//! This crate provides mock collaborators and fixtures for driving the
//! sans-IO engine from tests without a real link-layer controller.
//!
//! ## Modules
//!
//! - `mock_link` - Link layer that records every request
//! - `mock_timers` - Manually fired timer service and scripted security policy
//! - `fixtures` - Fixed peer addresses, SBC endpoints and a fast test config
//! - `rig` - `TestStack`, an engine plus helpers that play the remote device
//!
//! ## Usage
//!
//! ```rust,ignore
//! use avdtp_test_utils::*;
//!
//! #[test]
//! fn test_example() {
//!     let mut rig = TestStack::new();
//!     let source = rig.stack.register(sbc_endpoint(SepType::Source)).unwrap();
//!
//!     rig.stack.discover(TEST_PEER_A).unwrap();
//!     rig.complete_signaling_connect(TEST_PEER_A);
//!
//!     // Answer the discover as the peer would
//!     let sent = rig.sent_one(TEST_PEER_A);
//!     rig.peer_accepts(TEST_PEER_A, &sent, Response::Discover { endpoints: vec![] });
//! }
//! ```

pub mod fixtures;
pub mod mock_link;
pub mod mock_timers;
pub mod rig;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_link::*;
pub use mock_timers::*;
pub use rig::*;
