//! Signaling channel controller (CCB), one per remote device.
//!
//! Owns the signaling channel lifecycle, the outbound command queue with its
//! single in-flight command, retransmission and the three mutually exclusive
//! timers. Stream controllers bind to a CCB while they hold a configuration.

mod action;
pub(crate) mod state;

use crate::errors::ProcedureError;
use crate::link::CcbTimer;
use crate::msg::{Command, Label, Reassembler, Response, SignalId};
use crate::types::{LinkState, PeerAddr, Seid, StreamHandle};
use bytes::Bytes;
use std::collections::VecDeque;

pub(crate) use state::CcbState;

/// Command waiting in the queue.
#[derive(Debug, Clone)]
pub(crate) struct PendingCommand {
    pub command: Command,
    /// Streams the command concerns; empty for discover and get-capabilities.
    pub streams: Vec<StreamHandle>,
}

impl PendingCommand {
    pub fn new(command: Command, streams: Vec<StreamHandle>) -> Self {
        Self { command, streams }
    }
}

/// The one command sent and not yet answered.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub label: Label,
    pub command: Command,
    pub packets: Vec<Bytes>,
    pub streams: Vec<StreamHandle>,
    pub retries: u8,
}

impl InFlight {
    pub fn signal(&self) -> SignalId {
        self.command.signal()
    }
}

/// Outstanding discover or get-capabilities procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Procedure {
    Discover,
    GetCapabilities { seid: Seid },
}

#[derive(Debug)]
pub(crate) struct Ccb {
    pub peer: PeerAddr,
    pub state: CcbState,
    pub ll_opened: bool,
    pub initiator: bool,
    pub congested: bool,
    pub reconn: bool,
    /// Explicit connect request keeps the channel up until an explicit
    /// disconnect; the idle timer is not armed meanwhile.
    pub held: bool,
    pub peer_mtu: u16,
    pub next_label: Label,
    pub cmd_queue: VecDeque<PendingCommand>,
    pub rsp_queue: VecDeque<Vec<Bytes>>,
    /// Packets accepted for transmission but refused by a congested link.
    pub backlog: VecDeque<Bytes>,
    pub in_flight: Option<InFlight>,
    pub timer: Option<CcbTimer>,
    pub procedure: Option<Procedure>,
    pub reassembler: Reassembler,
}

impl Ccb {
    pub fn new(peer: PeerAddr, max_message: usize) -> Self {
        Self {
            peer,
            state: CcbState::Idle,
            ll_opened: false,
            initiator: false,
            congested: false,
            reconn: false,
            held: false,
            peer_mtu: 0,
            next_label: Label::default(),
            cmd_queue: VecDeque::new(),
            rsp_queue: VecDeque::new(),
            backlog: VecDeque::new(),
            in_flight: None,
            timer: None,
            procedure: None,
            reassembler: Reassembler::new(max_message),
        }
    }

    pub fn link_state(&self) -> LinkState {
        match self.state {
            CcbState::Idle => LinkState::Idle,
            CcbState::Opening => LinkState::Opening,
            CcbState::Open => LinkState::Open,
            CcbState::Closing => LinkState::Closing,
        }
    }

    /// Label for the next command, advancing the counter.
    pub fn take_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label = label.next();
        label
    }
}

/// Correlated answer to the in-flight command.
#[derive(Debug, Clone)]
pub(crate) struct Answer {
    pub signal: SignalId,
    pub result: Result<Response, ProcedureError>,
}

#[derive(Debug, Clone)]
pub(crate) enum CcbEvent {
    DiscoverReq,
    GetCapReq { seid: Seid, all: bool },
    StartReq(PendingCommand),
    SuspendReq(PendingCommand),
    ConnectReq,
    DisconnectReq,
    DiscoverCmd { label: Label },
    GetCapCmd { label: Label, seid: Seid, all: bool },
    StartCmd { label: Label, seids: Vec<Seid> },
    SuspendCmd { label: Label, seids: Vec<Seid> },
    RcvRsp(Answer),
    SendMsg,
    RetransmitTimeout,
    ResponseTimeout,
    IdleTimeout,
    UlOpen,
    UlClose,
    LlOpen,
    LlClose,
    LlCong(bool),
}

impl CcbEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DiscoverReq => "discover_req",
            Self::GetCapReq { .. } => "getcap_req",
            Self::StartReq(_) => "start_req",
            Self::SuspendReq(_) => "suspend_req",
            Self::ConnectReq => "connect_req",
            Self::DisconnectReq => "disconnect_req",
            Self::DiscoverCmd { .. } => "discover_cmd",
            Self::GetCapCmd { .. } => "getcap_cmd",
            Self::StartCmd { .. } => "start_cmd",
            Self::SuspendCmd { .. } => "suspend_cmd",
            Self::RcvRsp(_) => "rcv_rsp",
            Self::SendMsg => "send_msg",
            Self::RetransmitTimeout => "retransmit_timeout",
            Self::ResponseTimeout => "response_timeout",
            Self::IdleTimeout => "idle_timeout",
            Self::UlOpen => "ul_open",
            Self::UlClose => "ul_close",
            Self::LlOpen => "ll_open",
            Self::LlClose => "ll_close",
            Self::LlCong(_) => "ll_cong",
        }
    }
}
