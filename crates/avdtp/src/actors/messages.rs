//! Message types for the stack actor.
//!
//! Requests use `tokio::sync::mpsc`; each request carries a
//! `tokio::sync::oneshot` sender for its reply. Link indications and timer
//! firings reach the actor on their own channels.

use crate::errors::AvdtError;
use crate::events::ConfigRejection;
use crate::media::MediaPacket;
use crate::msg::{ErrorCode, Label, StreamConfig};
use crate::scb::{EndpointConfig, WriteOutcome};
use crate::types::{LinkState, PeerAddr, Seid, StreamHandle, StreamState};
use bytes::Bytes;
use tokio::sync::oneshot;

/// Reply channel for requests that only succeed or fail.
pub type Reply = oneshot::Sender<Result<(), AvdtError>>;

/// Messages sent to the stack actor.
#[derive(Debug)]
pub enum StackMessage {
    Register {
        endpoint: EndpointConfig,
        respond_to: oneshot::Sender<Result<StreamHandle, AvdtError>>,
    },
    Remove {
        stream: StreamHandle,
        respond_to: Reply,
    },
    Connect {
        peer: PeerAddr,
        respond_to: Reply,
    },
    Disconnect {
        peer: PeerAddr,
        respond_to: Reply,
    },
    Discover {
        peer: PeerAddr,
        respond_to: Reply,
    },
    GetCapabilities {
        peer: PeerAddr,
        seid: Seid,
        all: bool,
        respond_to: Reply,
    },
    SetConfiguration {
        stream: StreamHandle,
        peer: PeerAddr,
        peer_seid: Seid,
        config: StreamConfig,
        respond_to: Reply,
    },
    ConfigResponse {
        stream: StreamHandle,
        label: Label,
        result: Result<(), ConfigRejection>,
        respond_to: Reply,
    },
    GetConfiguration {
        stream: StreamHandle,
        respond_to: Reply,
    },
    Open {
        stream: StreamHandle,
        respond_to: Reply,
    },
    Start {
        streams: Vec<StreamHandle>,
        respond_to: Reply,
    },
    Suspend {
        streams: Vec<StreamHandle>,
        respond_to: Reply,
    },
    Close {
        stream: StreamHandle,
        respond_to: Reply,
    },
    Abort {
        stream: StreamHandle,
        respond_to: Reply,
    },
    Reconfigure {
        stream: StreamHandle,
        config: StreamConfig,
        respond_to: Reply,
    },
    ReconfigureResponse {
        stream: StreamHandle,
        label: Label,
        result: Result<(), ConfigRejection>,
        respond_to: Reply,
    },
    Security {
        stream: StreamHandle,
        data: Bytes,
        respond_to: Reply,
    },
    SecurityResponse {
        stream: StreamHandle,
        label: Label,
        result: Result<Bytes, ErrorCode>,
        respond_to: Reply,
    },
    DelayReport {
        stream: StreamHandle,
        delay: u16,
        respond_to: Reply,
    },
    Write {
        stream: StreamHandle,
        packet: MediaPacket,
        respond_to: oneshot::Sender<Result<WriteOutcome, AvdtError>>,
    },
    StreamState {
        stream: StreamHandle,
        respond_to: oneshot::Sender<Option<StreamState>>,
    },
    LinkState {
        peer: PeerAddr,
        respond_to: oneshot::Sender<LinkState>,
    },
    GetStatus {
        respond_to: oneshot::Sender<StackStatus>,
    },
}

/// Snapshot of the stack for health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackStatus {
    /// Signaling controllers allocated.
    pub links: usize,
    /// Registered stream endpoints.
    pub endpoints: usize,
    /// Transport-channel slots in use.
    pub transport_channels: usize,
    /// Requests waiting in the mailbox.
    pub mailbox_depth: usize,
}
