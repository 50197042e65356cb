//! Tokio runtime for the stack.
//!
//! ```text
//! application ──StackActorHandle──▶ StackActor ──LinkLayer──▶ link layer
//!      ▲                              │   ▲                      │
//!      └──────── AvdtEvent ───────────┘   └──── LinkIndication ──┘
//!                                         ▲
//!                          TokioTimers ───┘ (TimerFired)
//! ```
//!
//! # Modules
//!
//! - [`stack`] - `StackActor` owning one engine, and its handle
//! - [`messages`] - Request types for the actor mailbox
//! - [`timers`] - `TimerService` backed by tokio sleeps
//! - [`loopback`] - In-process link layer joining stacks on one runtime

pub mod loopback;
pub mod messages;
pub mod stack;
pub mod timers;

pub use loopback::{ChannelLink, LoopbackHub};
pub use messages::{StackMessage, StackStatus};
pub use stack::{StackActor, StackActorHandle};
pub use timers::{TimerFired, TokioTimers};
