//! Upward notifications delivered to the application.

use crate::errors::ProcedureError;
use crate::media::MediaHeader;
use crate::msg::{ErrorCode, Label, SepInfo, StreamConfig};
use crate::types::{PeerAddr, Seid, StreamHandle, StreamState};
use bytes::Bytes;

/// Why a stream was aborted without a local abort request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
    /// Peer sent an abort command.
    Peer,
    /// Transport channel failed before or during opening.
    TransportFailure,
    /// Transport channel did not connect in time.
    Timeout,
}

/// Result alias used by confirm events.
pub type Outcome<T = ()> = Result<T, ProcedureError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvdtEvent {
    /// Signaling channel to `peer` is open.
    Connected { peer: PeerAddr, initiator: bool },
    /// Signaling channel to `peer` is gone.
    Disconnected { peer: PeerAddr },

    DiscoverCfm {
        peer: PeerAddr,
        result: Outcome<Vec<SepInfo>>,
    },
    GetCapabilitiesCfm {
        peer: PeerAddr,
        seid: Seid,
        result: Outcome<StreamConfig>,
    },

    /// Peer asks to configure the endpoint; answer with `config_response`.
    ConfigInd {
        stream: StreamHandle,
        peer: PeerAddr,
        int_seid: Seid,
        label: Label,
        config: StreamConfig,
    },
    SetConfigCfm {
        stream: StreamHandle,
        result: Outcome,
    },
    GetConfigCfm {
        stream: StreamHandle,
        result: Outcome<StreamConfig>,
    },

    OpenInd { stream: StreamHandle, mtu: u16 },
    OpenCfm {
        stream: StreamHandle,
        result: Outcome<u16>,
    },
    StartInd { stream: StreamHandle },
    StartCfm { stream: StreamHandle, result: Outcome },
    SuspendInd { stream: StreamHandle },
    SuspendCfm { stream: StreamHandle, result: Outcome },
    CloseInd { stream: StreamHandle },
    CloseCfm { stream: StreamHandle, result: Outcome },
    AbortInd { stream: StreamHandle, cause: AbortCause },
    AbortCfm { stream: StreamHandle, result: Outcome },

    /// Peer asks to reconfigure; answer with `reconfigure_response`.
    ReconfigInd {
        stream: StreamHandle,
        label: Label,
        config: StreamConfig,
    },
    ReconfigCfm { stream: StreamHandle, result: Outcome },

    /// Peer sent content-protection data; answer with `security_response`.
    SecurityInd {
        stream: StreamHandle,
        label: Label,
        data: Bytes,
    },
    SecurityCfm {
        stream: StreamHandle,
        result: Outcome<Bytes>,
    },

    /// Delay in 1/10 ms, passed through verbatim.
    DelayReportInd { stream: StreamHandle, delay: u16 },
    DelayReportCfm { stream: StreamHandle, result: Outcome },

    /// Media transport closed while no close or abort was in progress.
    TransportClosed {
        stream: StreamHandle,
        old_state: StreamState,
    },

    MediaData {
        stream: StreamHandle,
        header: MediaHeader,
        payload: Bytes,
    },
    ReportData { stream: StreamHandle, data: Bytes },

    /// Media transport congestion changed.
    Congestion { stream: StreamHandle, congested: bool },
}

/// Reason code and category for rejecting a configuration indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRejection {
    pub code: ErrorCode,
    pub category: u8,
}
