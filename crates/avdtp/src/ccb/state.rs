//! Signaling controller transition table.
//!
//! Each entry names the next state and the ordered actions to run. The state
//! is set before the first action executes.

use super::CcbEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CcbState {
    Idle,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CcbAction {
    SndDiscoverCmd,
    SndGetCapCmd,
    SndStartCmd,
    SndSuspendCmd,
    HdlDiscoverCmd,
    HdlGetCapCmd,
    HdlStartCmd,
    HdlSuspendCmd,
    HdlRsp,
    SndCmd,
    SndMsg,
    ChanOpen,
    ChanClose,
    ChkTimer,
    ChkClose,
    ClearCmds,
    CmdFail,
    RetCmd,
    SetReconn,
    ClrReconn,
    ChkReconn,
    SetConn,
    SetDisconn,
    DoDisconn,
    LlOpened,
    LlClosed,
    CongState,
}

use CcbAction as A;
use CcbEvent as E;
use CcbState as S;

/// Look up `(state, event)`. `None` means the event is ignored in `state`.
pub(crate) fn transition(state: CcbState, event: &CcbEvent) -> Option<(CcbState, &'static [CcbAction])> {
    let entry: (CcbState, &'static [CcbAction]) = match (state, event) {
        (S::Idle, E::DiscoverReq) => (S::Opening, &[A::SndDiscoverCmd, A::ChanOpen]),
        (S::Idle, E::GetCapReq { .. }) => (S::Opening, &[A::SndGetCapCmd, A::ChanOpen]),
        (S::Idle, E::ConnectReq) => (S::Opening, &[A::SetConn, A::ChanOpen]),
        (S::Idle, E::UlOpen | E::SendMsg) => (S::Opening, &[A::ChanOpen]),
        (S::Idle, E::LlOpen) => (S::Open, &[A::LlOpened]),
        (S::Idle, E::LlClose) => (S::Idle, &[A::LlClosed]),

        (S::Opening, E::DiscoverReq) => (S::Opening, &[A::SndDiscoverCmd]),
        (S::Opening, E::GetCapReq { .. }) => (S::Opening, &[A::SndGetCapCmd]),
        (S::Opening, E::ConnectReq) => (S::Opening, &[A::SetConn]),
        (S::Opening, E::DisconnectReq) => (S::Closing, &[A::SetDisconn, A::DoDisconn]),
        (S::Opening, E::UlClose) => (S::Closing, &[A::ClearCmds, A::ChanClose]),
        (S::Opening, E::LlOpen) => (S::Open, &[A::LlOpened, A::SndMsg]),
        (S::Opening, E::LlClose) => (S::Idle, &[A::LlClosed]),
        (S::Opening, E::LlCong(_)) => (S::Opening, &[A::CongState]),

        (S::Open, E::DiscoverReq) => (S::Open, &[A::SndDiscoverCmd, A::SndCmd]),
        (S::Open, E::GetCapReq { .. }) => (S::Open, &[A::SndGetCapCmd, A::SndCmd]),
        (S::Open, E::StartReq(_)) => (S::Open, &[A::SndStartCmd, A::SndCmd]),
        (S::Open, E::SuspendReq(_)) => (S::Open, &[A::SndSuspendCmd, A::SndCmd]),
        (S::Open, E::ConnectReq) => (S::Open, &[A::SetConn, A::LlOpened]),
        (S::Open, E::DisconnectReq) => (S::Closing, &[A::SetDisconn, A::DoDisconn]),
        (S::Open, E::DiscoverCmd { .. }) => (S::Open, &[A::HdlDiscoverCmd, A::SndMsg]),
        (S::Open, E::GetCapCmd { .. }) => (S::Open, &[A::HdlGetCapCmd, A::SndMsg]),
        (S::Open, E::StartCmd { .. }) => (S::Open, &[A::HdlStartCmd, A::SndMsg]),
        (S::Open, E::SuspendCmd { .. }) => (S::Open, &[A::HdlSuspendCmd, A::SndMsg]),
        (S::Open, E::RcvRsp(_)) => (S::Open, &[A::HdlRsp, A::SndCmd]),
        (S::Open, E::SendMsg) => (S::Open, &[A::SndMsg]),
        (S::Open, E::RetransmitTimeout) => (S::Open, &[A::RetCmd, A::SndCmd]),
        (S::Open, E::ResponseTimeout) => (S::Open, &[A::CmdFail, A::SndCmd]),
        (S::Open, E::IdleTimeout) => (S::Closing, &[A::ClearCmds, A::ChanClose]),
        (S::Open, E::UlOpen) => (S::Open, &[A::ChkTimer]),
        (S::Open, E::UlClose) => (S::Open, &[A::ChkClose]),
        (S::Open, E::LlClose) => (S::Idle, &[A::LlClosed]),
        (S::Open, E::LlCong(_)) => (S::Open, &[A::CongState, A::SndMsg]),

        (S::Closing, E::DiscoverReq) => (S::Closing, &[A::SndDiscoverCmd, A::SetReconn]),
        (S::Closing, E::GetCapReq { .. }) => (S::Closing, &[A::SndGetCapCmd, A::SetReconn]),
        (S::Closing, E::ConnectReq | E::UlOpen | E::SendMsg) => (S::Closing, &[A::SetReconn]),
        (S::Closing, E::DisconnectReq) => (S::Closing, &[A::SetDisconn, A::ClrReconn]),
        (S::Closing, E::LlClose) => (S::Idle, &[A::ChkReconn]),

        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ccb::{Answer, PendingCommand};
    use crate::errors::ProcedureError;
    use crate::msg::{Command, Label, SignalId};

    fn all_events() -> Vec<CcbEvent> {
        vec![
            E::DiscoverReq,
            E::GetCapReq {
                seid: crate::types::Seid::new(1).unwrap(),
                all: false,
            },
            E::StartReq(PendingCommand::new(Command::Start { seids: vec![] }, vec![])),
            E::SuspendReq(PendingCommand::new(Command::Suspend { seids: vec![] }, vec![])),
            E::ConnectReq,
            E::DisconnectReq,
            E::DiscoverCmd {
                label: Label::new(0),
            },
            E::RcvRsp(Answer {
                signal: SignalId::Open,
                result: Err(ProcedureError::Timeout),
            }),
            E::SendMsg,
            E::RetransmitTimeout,
            E::ResponseTimeout,
            E::IdleTimeout,
            E::UlOpen,
            E::UlClose,
            E::LlOpen,
            E::LlClose,
            E::LlCong(true),
        ]
    }

    #[test]
    fn test_link_close_always_reaches_idle() {
        for state in [S::Idle, S::Opening, S::Open, S::Closing] {
            let (next, _) = transition(state, &E::LlClose).unwrap();
            assert_eq!(next, S::Idle, "LL close from {state:?}");
        }
    }

    #[test]
    fn test_commands_only_handled_when_open() {
        let cmd = E::DiscoverCmd {
            label: Label::new(1),
        };
        for state in [S::Idle, S::Opening, S::Closing] {
            assert!(transition(state, &cmd).is_none(), "{state:?}");
        }
        assert!(transition(S::Open, &cmd).is_some());
    }

    #[test]
    fn test_responses_and_timeouts_ignored_unless_open() {
        for event in all_events() {
            if !matches!(
                event,
                E::RcvRsp(_) | E::RetransmitTimeout | E::ResponseTimeout | E::IdleTimeout
            ) {
                continue;
            }
            for state in [S::Idle, S::Opening, S::Closing] {
                assert!(transition(state, &event).is_none(), "{} in {state:?}", event.name());
            }
        }
    }

    #[test]
    fn test_closing_requests_schedule_reconnect() {
        for event in [E::DiscoverReq, E::ConnectReq, E::UlOpen, E::SendMsg] {
            let (next, actions) = transition(S::Closing, &event).unwrap();
            assert_eq!(next, S::Closing);
            assert!(actions.contains(&A::SetReconn), "{}", event.name());
        }
    }

    #[test]
    fn test_open_sends_after_queueing() {
        let (_, actions) = transition(S::Open, &E::DiscoverReq).unwrap();
        assert_eq!(actions, &[A::SndDiscoverCmd, A::SndCmd]);
        let (next, actions) = transition(S::Idle, &E::DiscoverReq).unwrap();
        assert_eq!(next, S::Opening);
        assert_eq!(actions, &[A::SndDiscoverCmd, A::ChanOpen]);
    }
}
