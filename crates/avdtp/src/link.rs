//! Seams to the collaborators the stack does not implement: the link-layer
//! connection manager, the security subsystem and a timer service.
//!
//! The engine is synchronous; every collaborator call returns immediately and
//! completions come back as indications fed into the engine.

use crate::types::{CcbId, ChannelType, Lcid, PeerAddr, Role, StreamHandle};
use bytes::Bytes;
use std::time::Duration;

/// Parameters requested when opening a link-layer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    pub channel: ChannelType,
    pub mtu: u16,
    pub flush_timeout: u16,
}

/// Outcome of a link-layer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Queued for transmission.
    Accepted,
    /// Not accepted; the channel is congested and the caller keeps the data.
    Congested,
    /// Not accepted; the channel is gone.
    Failed,
}

/// Outbound half of the link-layer connection manager.
pub trait LinkLayer {
    /// Start connecting a channel to `peer`. Returns the channel id the
    /// connect confirm will refer to, or `None` if no request could be made.
    fn connect_req(&mut self, peer: PeerAddr, params: &ChannelParams) -> Option<Lcid>;

    /// Answer a connect indication.
    fn connect_rsp(&mut self, lcid: Lcid, accept: bool);

    /// Start closing a channel; a disconnect indication follows.
    fn disconnect_req(&mut self, lcid: Lcid);

    /// Write one packet.
    fn data_write(&mut self, lcid: Lcid, data: Bytes) -> WriteResult;
}

/// Decision of the security subsystem on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny,
    /// Decision arrives later through a security-complete indication.
    Pending,
}

/// Security check applied when a channel is opened in either direction.
pub trait SecurityPolicy {
    fn authorize(&mut self, peer: PeerAddr, channel: ChannelType, role: Role) -> Authorization;
}

/// Policy that allows every channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SecurityPolicy for AllowAll {
    fn authorize(&mut self, _peer: PeerAddr, _channel: ChannelType, _role: Role) -> Authorization {
        Authorization::Allow
    }
}

/// Timer kinds of a signaling controller; at most one is armed at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CcbTimer {
    Idle,
    Retransmit,
    Response,
}

/// Identifies an armed timer. Tokens embed the owner's generation, so a
/// firing that races a deallocation is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerToken {
    Signaling { ccb: CcbId, kind: CcbTimer },
    Transport { stream: StreamHandle },
}

/// Single-shot timer service.
pub trait TimerService {
    fn arm(&mut self, token: TimerToken, after: Duration);
    fn cancel(&mut self, token: TimerToken);
}

/// Inbound half of the link-layer connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkIndication {
    /// Remote device opened a channel towards us.
    ConnectInd { peer: PeerAddr, lcid: Lcid },
    /// Result of our `connect_req`.
    ConnectCfm { lcid: Lcid, success: bool },
    /// Channel configuration finished; the channel is usable.
    ConfigComplete { lcid: Lcid, peer_mtu: u16 },
    /// Channel closed, whether we or the peer asked.
    Disconnected { lcid: Lcid },
    /// Congestion state changed.
    Congestion { lcid: Lcid, congested: bool },
    /// Packet received.
    Data { lcid: Lcid, data: Bytes },
    /// Answer to an earlier `Authorization::Pending`.
    SecurityComplete { lcid: Lcid, granted: bool },
}

impl LinkIndication {
    #[must_use]
    pub const fn lcid(&self) -> Lcid {
        match self {
            Self::ConnectInd { lcid, .. }
            | Self::ConnectCfm { lcid, .. }
            | Self::ConfigComplete { lcid, .. }
            | Self::Disconnected { lcid }
            | Self::Congestion { lcid, .. }
            | Self::Data { lcid, .. }
            | Self::SecurityComplete { lcid, .. } => *lcid,
        }
    }
}
