//! Stream endpoint controller (SCB), one per registered local endpoint.
//!
//! Drives the stream lifecycle Idle → Configured → Opening → Open ⇄
//! Streaming → Closing → Idle, owns the media transport channel and carries
//! the endpoint's capabilities and current configuration.

mod action;
pub(crate) mod state;

use crate::errors::ProcedureError;
use crate::events::{ConfigRejection, Outcome};
use crate::media::MediaPacket;
use crate::msg::{ErrorCode, Label, Response, SignalId, StreamConfig};
use crate::types::{CcbId, MediaType, Role, SepType, Seid, StreamState};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What an application registers: endpoint kind plus supported capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub media_type: MediaType,
    pub sep_type: SepType,
    pub capabilities: StreamConfig,
}

/// Result of handing a media packet to `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// Accepted by the link layer.
    Sent,
    /// Held because the channel became congested; sent when it clears.
    Queued,
    /// Discarded: a packet was already pending, the channel is congested or
    /// the stream is not streaming.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownKind {
    Close,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownOrigin {
    Local,
    Peer,
    Timeout,
}

/// Close or abort in progress. Its completion is reported once the media
/// transport is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Teardown {
    pub kind: TeardownKind,
    pub origin: TeardownOrigin,
    pub result: Outcome,
}

impl Teardown {
    pub const fn new(kind: TeardownKind, origin: TeardownOrigin) -> Self {
        Self {
            kind,
            origin,
            result: Ok(()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Scb {
    pub endpoint: EndpointConfig,
    pub state: StreamState,
    pub ccb: Option<CcbId>,
    pub peer_seid: Option<Seid>,
    pub in_use: bool,
    pub curr_cfg: StreamConfig,
    /// Configuration proposed by a set-configuration or reconfigure that has
    /// not completed yet.
    pub req_cfg: Option<StreamConfig>,
    pub role: Role,
    pub teardown: Option<Teardown>,
    pub pending: Option<Bytes>,
    /// `pending` was refused for congestion and already owns its sequence number.
    pub held: bool,
    pub congested: bool,
    pub sequence: u16,
    pub media_mtu: u16,
    pub tc_timer: bool,
    pub remove_pending: bool,
    /// State at the time the current event arrived.
    pub prev_state: StreamState,
    pub idle_cleanup: bool,
    pub last_write: WriteOutcome,
}

impl Scb {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            state: StreamState::Idle,
            ccb: None,
            peer_seid: None,
            in_use: false,
            curr_cfg: StreamConfig::default(),
            req_cfg: None,
            role: Role::Initiator,
            teardown: None,
            pending: None,
            held: false,
            congested: false,
            sequence: 0,
            media_mtu: 0,
            tc_timer: false,
            remove_pending: false,
            prev_state: StreamState::Idle,
            idle_cleanup: false,
            last_write: WriteOutcome::Dropped,
        }
    }

    /// Synchronisation source for outbound media: codec type plus one.
    pub fn ssrc(&self) -> u32 {
        self.curr_cfg
            .codec
            .as_ref()
            .map_or(1, |c| u32::from(c.codec_type) + 1)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ScbEvent {
    // Application requests.
    ApiSetConfigReq {
        ccb: CcbId,
        peer_seid: Seid,
        config: StreamConfig,
    },
    ApiSetConfigRsp {
        label: Label,
        result: Result<(), ConfigRejection>,
    },
    ApiGetConfigReq,
    ApiOpenReq,
    ApiCloseReq,
    ApiAbortReq,
    ApiReconfigReq {
        config: StreamConfig,
    },
    ApiReconfigRsp {
        label: Label,
        result: Result<(), ConfigRejection>,
    },
    ApiSecurityReq {
        data: Bytes,
    },
    ApiSecurityRsp {
        label: Label,
        result: Result<Bytes, ErrorCode>,
    },
    ApiDelayReportReq {
        delay: u16,
    },
    ApiWriteReq(MediaPacket),
    ApiRemove,

    // Peer commands.
    SetConfigCmd {
        label: Label,
        ccb: CcbId,
        int_seid: Seid,
        config: StreamConfig,
    },
    GetConfigCmd {
        ccb: CcbId,
        label: Label,
    },
    ReconfigCmd {
        ccb: CcbId,
        label: Label,
        config: StreamConfig,
    },
    OpenCmd {
        ccb: CcbId,
        label: Label,
    },
    StartCmd {
        label: Label,
    },
    SuspendCmd {
        label: Label,
    },
    CloseCmd {
        ccb: CcbId,
        label: Label,
    },
    AbortCmd {
        ccb: CcbId,
        label: Label,
    },
    SecurityCmd {
        ccb: CcbId,
        label: Label,
        data: Bytes,
    },
    DelayReportCmd {
        ccb: CcbId,
        label: Label,
        delay: u16,
    },

    // Peer responses, or local failures standing in for them.
    SetConfigRsp(Outcome),
    GetConfigRsp(Outcome<StreamConfig>),
    ReconfigRsp(Outcome),
    OpenRsp(Outcome),
    StartRsp(Outcome),
    SuspendRsp(Outcome),
    CloseRsp(Outcome),
    AbortRsp(Outcome),
    SecurityRsp(Outcome<Bytes>),
    DelayReportRsp(Outcome),

    // Transport and signaling channel.
    TcOpen {
        peer_mtu: u16,
    },
    TcClose,
    TcData(Bytes),
    TcCong(bool),
    TcTimeout,
    CcClose,
}

impl ScbEvent {
    /// Event for the completion of a stream command.
    pub fn from_response(signal: SignalId, result: Result<Response, ProcedureError>) -> Option<Self> {
        let done = result.clone().map(|_| ());
        Some(match signal {
            SignalId::SetConfiguration => Self::SetConfigRsp(done),
            SignalId::GetConfiguration => Self::GetConfigRsp(result.and_then(|rsp| match rsp {
                Response::Configuration { config } | Response::Capabilities { config } => Ok(config),
                _ => Err(ProcedureError::GeneralReject),
            })),
            SignalId::Reconfigure => Self::ReconfigRsp(done),
            SignalId::Open => Self::OpenRsp(done),
            SignalId::Start => Self::StartRsp(done),
            SignalId::Suspend => Self::SuspendRsp(done),
            SignalId::Close => Self::CloseRsp(done),
            SignalId::Abort => Self::AbortRsp(done),
            SignalId::Security => Self::SecurityRsp(result.map(|rsp| match rsp {
                Response::Security { data } => data,
                _ => Bytes::new(),
            })),
            SignalId::DelayReport => Self::DelayReportRsp(done),
            SignalId::Discover | SignalId::GetCapabilities | SignalId::GetAllCapabilities => {
                return None
            }
        })
    }

    /// Link, label and signal of a peer command this SCB must answer itself.
    /// Start and suspend are answered by the signaling controller.
    pub const fn peer_command(&self) -> Option<(CcbId, Label, SignalId)> {
        let (ccb, label, signal) = match self {
            Self::SetConfigCmd { ccb, label, .. } => (ccb, label, SignalId::SetConfiguration),
            Self::GetConfigCmd { ccb, label } => (ccb, label, SignalId::GetConfiguration),
            Self::ReconfigCmd { ccb, label, .. } => (ccb, label, SignalId::Reconfigure),
            Self::OpenCmd { ccb, label } => (ccb, label, SignalId::Open),
            Self::CloseCmd { ccb, label } => (ccb, label, SignalId::Close),
            Self::AbortCmd { ccb, label } => (ccb, label, SignalId::Abort),
            Self::SecurityCmd { ccb, label, .. } => (ccb, label, SignalId::Security),
            Self::DelayReportCmd { ccb, label, .. } => (ccb, label, SignalId::DelayReport),
            _ => return None,
        };
        Some((*ccb, *label, signal))
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::ApiSetConfigReq { .. } => "api_setconfig_req",
            Self::ApiSetConfigRsp { .. } => "api_setconfig_rsp",
            Self::ApiGetConfigReq => "api_getconfig_req",
            Self::ApiOpenReq => "api_open_req",
            Self::ApiCloseReq => "api_close_req",
            Self::ApiAbortReq => "api_abort_req",
            Self::ApiReconfigReq { .. } => "api_reconfig_req",
            Self::ApiReconfigRsp { .. } => "api_reconfig_rsp",
            Self::ApiSecurityReq { .. } => "api_security_req",
            Self::ApiSecurityRsp { .. } => "api_security_rsp",
            Self::ApiDelayReportReq { .. } => "api_delayreport_req",
            Self::ApiWriteReq(_) => "api_write_req",
            Self::ApiRemove => "api_remove",
            Self::SetConfigCmd { .. } => "setconfig_cmd",
            Self::GetConfigCmd { .. } => "getconfig_cmd",
            Self::ReconfigCmd { .. } => "reconfig_cmd",
            Self::OpenCmd { .. } => "open_cmd",
            Self::StartCmd { .. } => "start_cmd",
            Self::SuspendCmd { .. } => "suspend_cmd",
            Self::CloseCmd { .. } => "close_cmd",
            Self::AbortCmd { .. } => "abort_cmd",
            Self::SecurityCmd { .. } => "security_cmd",
            Self::DelayReportCmd { .. } => "delayreport_cmd",
            Self::SetConfigRsp(_) => "setconfig_rsp",
            Self::GetConfigRsp(_) => "getconfig_rsp",
            Self::ReconfigRsp(_) => "reconfig_rsp",
            Self::OpenRsp(_) => "open_rsp",
            Self::StartRsp(_) => "start_rsp",
            Self::SuspendRsp(_) => "suspend_rsp",
            Self::CloseRsp(_) => "close_rsp",
            Self::AbortRsp(_) => "abort_rsp",
            Self::SecurityRsp(_) => "security_rsp",
            Self::DelayReportRsp(_) => "delayreport_rsp",
            Self::TcOpen { .. } => "tc_open",
            Self::TcClose => "tc_close",
            Self::TcData(_) => "tc_data",
            Self::TcCong(_) => "tc_cong",
            Self::TcTimeout => "tc_timeout",
            Self::CcClose => "cc_close",
        }
    }
}
