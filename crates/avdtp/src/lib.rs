//! AVDTP control plane library.
//!
//! This library implements the signaling and stream control plane of an
//! audio/video distribution transport running over connection-oriented
//! link-layer channels:
//!
//! - Signaling message codec with fragmentation and reassembly
//! - Per-peer signaling controllers with retransmission and timers
//! - Per-endpoint stream controllers driving the stream lifecycle
//! - An adaptation layer multiplexing signaling, media and reporting
//!   channels onto link-layer channels
//! - Media packet framing for streaming endpoints
//!
//! # Architecture
//!
//! ```text
//! Avdtp engine (sans-IO, one per stack)
//! ├── CCB per remote device (signaling channel, command queue, timers)
//! ├── SCB per local stream endpoint (stream state machine, media channel)
//! └── Adaptation layer (transport-channel pool, routing table)
//! ```
//!
//! The engine does no I/O of its own. It calls out through the
//! [`LinkLayer`], [`TimerService`] and [`SecurityPolicy`] traits and is fed
//! indications and timer firings by its owner. [`actors::StackActorHandle`]
//! runs an engine on a tokio task.
//!
//! # Modules
//!
//! - [`engine`] - Stack engine and application API
//! - [`msg`] - Signaling message codec
//! - [`media`] - Media packet framing
//! - [`link`] - Link-layer, timer and security seams
//! - [`actors`] - Tokio runtime and loopback link layer
//! - [`config`] - Stack configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Metrics

pub mod actors;
pub(crate) mod ad;
pub(crate) mod ccb;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod link;
pub mod media;
pub mod msg;
pub mod observability;
pub(crate) mod registry;
pub(crate) mod scb;
pub mod types;

pub use config::{Config, ConfigError, ObservabilityConfig};
pub use engine::Avdtp;
pub use errors::{AvdtError, ProcedureError};
pub use events::{AbortCause, AvdtEvent, ConfigRejection, Outcome};
pub use link::{
    AllowAll, Authorization, CcbTimer, ChannelParams, LinkIndication, LinkLayer, SecurityPolicy,
    TimerService, TimerToken, WriteResult,
};
pub use media::{MediaHeader, MediaPacket};
pub use msg::{ErrorCode, Label, MediaCodecCap, StreamConfig};
pub use scb::{EndpointConfig, WriteOutcome};
pub use types::{
    ChannelType, Lcid, LinkState, MediaType, PeerAddr, Role, Seid, SepType, StreamHandle,
    StreamState,
};
