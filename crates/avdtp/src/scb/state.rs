//! Stream controller transition table.

use super::ScbEvent;
use crate::types::StreamState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScbAction {
    SndSetConfigReq,
    HdlSetConfigCmd,
    SndSetConfigRsp,
    SndSetConfigRej,
    HdlSetConfigRsp,
    HdlSetConfigRej,
    SndGetConfigReq,
    HdlGetConfigCmd,
    HdlGetConfigRsp,
    SndOpenReq,
    HdlOpenCmd,
    HdlOpenRsp,
    HdlOpenRej,
    HdlTcOpen,
    HdlStartCmd,
    HdlStartRsp,
    HdlSuspendCmd,
    HdlSuspendRsp,
    SndReconfigReq,
    HdlReconfigCmd,
    SndReconfigRsp,
    HdlReconfigRsp,
    SndSecurityReq,
    HdlSecurityCmd,
    SndSecurityRsp,
    HdlSecurityRsp,
    SndDelayReportReq,
    HdlDelayReportCmd,
    HdlDelayReportRsp,
    SndCloseReq,
    HdlCloseCmd,
    HdlCloseRsp,
    SndAbortReq,
    HdlAbortCmd,
    SndAbortRsp,
    HdlAbortRsp,
    SndTcClose,
    ForceTcClose,
    HdlTcClose,
    HdlCcClose,
    ClearBinding,
    RejNotInUse,
    RejInUse,
    HdlWriteReq,
    ChkSndPkt,
    DropPkt,
    HdlPkt,
    CongState,
    SetRemove,
    Dealloc,
}

use ScbAction as A;
use ScbEvent as E;
use StreamState as S;

/// Look up `(state, event)`. `None` means no entry; peer commands without an
/// entry are rejected with `BAD_STATE` by the caller, everything else is
/// ignored.
pub(crate) fn transition(state: StreamState, event: &ScbEvent) -> Option<(StreamState, &'static [ScbAction])> {
    let active = matches!(
        state,
        S::Configured | S::Opening | S::Open | S::Streaming
    );
    let entry: (StreamState, &'static [ScbAction]) = match (state, event) {
        (S::Idle, E::ApiSetConfigReq { .. }) => (S::Configured, &[A::SndSetConfigReq]),
        (S::Idle, E::SetConfigCmd { .. }) => (S::Idle, &[A::HdlSetConfigCmd]),
        (S::Idle, E::ApiSetConfigRsp { result: Ok(()), .. }) => (S::Configured, &[A::SndSetConfigRsp]),
        (S::Idle, E::ApiSetConfigRsp { result: Err(_), .. }) => (S::Idle, &[A::SndSetConfigRej]),
        (
            S::Idle,
            E::GetConfigCmd { .. }
            | E::OpenCmd { .. }
            | E::CloseCmd { .. }
            | E::ReconfigCmd { .. }
            | E::SecurityCmd { .. }
            | E::DelayReportCmd { .. },
        ) => (S::Idle, &[A::RejNotInUse]),
        (S::Idle, E::AbortCmd { .. }) => (S::Idle, &[A::SndAbortRsp]),
        (S::Idle, E::ApiWriteReq(_)) => (S::Idle, &[A::DropPkt]),
        (S::Idle, E::ApiRemove) => (S::Idle, &[A::Dealloc]),
        (S::Idle, E::CcClose) => (S::Idle, &[A::ClearBinding]),

        (_, E::SetConfigCmd { .. }) => (state, &[A::RejInUse]),
        (_, E::CcClose) => (S::Idle, &[A::HdlCcClose]),
        (_, E::ApiRemove) => (state, &[A::SetRemove]),

        (S::Configured, E::SetConfigRsp(Ok(()))) => (S::Configured, &[A::HdlSetConfigRsp]),
        (S::Configured, E::SetConfigRsp(Err(_))) => (S::Idle, &[A::HdlSetConfigRej]),
        (S::Configured, E::ApiOpenReq) => (S::Opening, &[A::SndOpenReq]),
        (S::Configured, E::OpenCmd { .. }) => (S::Opening, &[A::HdlOpenCmd]),

        (S::Opening, E::OpenRsp(Ok(()))) => (S::Opening, &[A::HdlOpenRsp]),
        (S::Opening, E::OpenRsp(Err(_))) => (S::Configured, &[A::HdlOpenRej]),
        (S::Opening, E::TcOpen { .. }) => (S::Open, &[A::HdlTcOpen]),
        (S::Opening, E::TcClose) => (S::Idle, &[A::HdlTcClose]),
        (S::Opening, E::TcTimeout) => (S::Closing, &[A::SndAbortReq, A::SndTcClose]),

        (S::Open, E::StartCmd { .. }) => (S::Streaming, &[A::HdlStartCmd]),
        (S::Open, E::StartRsp(Ok(()))) => (S::Streaming, &[A::HdlStartRsp]),
        (S::Open, E::StartRsp(Err(_))) => (S::Open, &[A::HdlStartRsp]),
        (S::Open, E::ApiReconfigReq { .. }) => (S::Open, &[A::SndReconfigReq]),
        (S::Open, E::ReconfigCmd { .. }) => (S::Open, &[A::HdlReconfigCmd]),
        (S::Open, E::ApiReconfigRsp { .. }) => (S::Open, &[A::SndReconfigRsp]),
        (S::Open, E::ReconfigRsp(_)) => (S::Open, &[A::HdlReconfigRsp]),

        (S::Streaming, E::SuspendCmd { .. }) => (S::Open, &[A::HdlSuspendCmd]),
        (S::Streaming, E::SuspendRsp(Ok(()))) => (S::Open, &[A::HdlSuspendRsp]),
        (S::Streaming, E::SuspendRsp(Err(_))) => (S::Streaming, &[A::HdlSuspendRsp]),
        (S::Streaming, E::ApiWriteReq(_)) => (S::Streaming, &[A::HdlWriteReq, A::ChkSndPkt]),
        (S::Streaming, E::TcData(_)) => (S::Streaming, &[A::HdlPkt]),

        (S::Open | S::Streaming, E::ApiCloseReq) => (S::Closing, &[A::SndCloseReq]),
        (S::Open | S::Streaming, E::CloseCmd { .. }) => (S::Closing, &[A::HdlCloseCmd]),
        (S::Open | S::Streaming, E::TcClose) => (S::Idle, &[A::HdlTcClose]),
        (S::Open | S::Streaming, E::TcCong(_)) => (state, &[A::CongState, A::ChkSndPkt]),

        (S::Closing, E::CloseRsp(_)) => (S::Closing, &[A::HdlCloseRsp]),
        (S::Closing, E::AbortRsp(_)) => (S::Closing, &[A::HdlAbortRsp]),
        (S::Closing, E::TcClose) => (S::Idle, &[A::HdlTcClose]),
        (S::Closing, E::TcTimeout) => (S::Closing, &[A::ForceTcClose]),
        (S::Closing, E::ApiAbortReq) => (S::Closing, &[A::SndAbortReq, A::SndTcClose]),
        (S::Closing, E::AbortCmd { .. }) => (S::Closing, &[A::HdlAbortCmd, A::SndAbortRsp, A::SndTcClose]),

        (_, E::ApiAbortReq) if active => (S::Closing, &[A::SndAbortReq, A::SndTcClose]),
        (_, E::AbortCmd { .. }) if active => (S::Closing, &[A::HdlAbortCmd, A::SndAbortRsp, A::SndTcClose]),

        (_, E::ApiGetConfigReq) if active => (state, &[A::SndGetConfigReq]),
        (_, E::GetConfigCmd { .. }) if active => (state, &[A::HdlGetConfigCmd]),
        (_, E::GetConfigRsp(_)) if active => (state, &[A::HdlGetConfigRsp]),
        (_, E::ApiSecurityReq { .. }) if active => (state, &[A::SndSecurityReq]),
        (_, E::SecurityCmd { .. }) if active => (state, &[A::HdlSecurityCmd]),
        (_, E::ApiSecurityRsp { .. }) if active => (state, &[A::SndSecurityRsp]),
        (_, E::SecurityRsp(_)) if active => (state, &[A::HdlSecurityRsp]),
        (_, E::ApiDelayReportReq { .. }) if active => (state, &[A::SndDelayReportReq]),
        (_, E::DelayReportCmd { .. }) if active => (state, &[A::HdlDelayReportCmd]),
        (_, E::DelayReportRsp(_)) if active => (state, &[A::HdlDelayReportRsp]),

        _ => return None,
    };
    Some(entry)
}
