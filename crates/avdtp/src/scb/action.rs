//! Stream controller dispatch and actions.

use super::state::{transition, ScbAction};
use super::{ScbEvent, Teardown, TeardownKind, TeardownOrigin, WriteOutcome};
use crate::ad::CloseOutcome;
use crate::ccb::PendingCommand;
use crate::engine::Avdtp;
use crate::errors::ProcedureError;
use crate::events::{AbortCause, AvdtEvent};
use crate::link::{ChannelParams, LinkLayer, SecurityPolicy, TimerService, TimerToken, WriteResult};
use crate::media;
use crate::msg::{
    CapabilityError, Category, Command, ErrorCode, Label, Reject, Response, SignalId, StreamConfig,
};
use crate::observability::metrics;
use crate::types::{CcbId, ChannelType, Role, Seid, StreamHandle, StreamState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reject body for `code`, in the shape the signal requires.
fn reject_for(signal: SignalId, code: ErrorCode) -> Reject {
    match signal {
        SignalId::SetConfiguration | SignalId::Reconfigure => Reject::with_category(code, 0),
        _ => Reject::new(code),
    }
}

/// A reconfiguration must stay within what the endpoint offers.
fn check_reconfiguration(offered: &StreamConfig, update: &StreamConfig) -> Result<(), CapabilityError> {
    update.check_reconfigurable()?;
    if let Some(codec) = &update.codec {
        let same_codec = offered
            .codec
            .as_ref()
            .is_some_and(|ours| ours.media_type == codec.media_type && ours.codec_type == codec.codec_type);
        if !same_codec {
            return Err(CapabilityError::new(
                Category::MediaCodec as u8,
                ErrorCode::UNSUPPORTED_CONFIGURATION,
            ));
        }
    }
    if update.content_protection.is_some() && offered.content_protection.is_none() {
        return Err(CapabilityError::new(
            Category::ContentProtection as u8,
            ErrorCode::UNSUPPORTED_CONFIGURATION,
        ));
    }
    Ok(())
}

impl<L: LinkLayer, T: TimerService, S: SecurityPolicy> Avdtp<L, T, S> {
    /// Run one event through the stream controller table.
    ///
    /// Returns `false` if the stream is gone or the event has no entry in
    /// the current state.
    pub(crate) fn scb_event(&mut self, stream: StreamHandle, event: ScbEvent) -> bool {
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return false;
        };
        let state = scb.state;
        let Some((next, actions)) = transition(state, &event) else {
            debug!(target: "avdtp.scb", %stream, %state, event = event.name(), "Event ignored");
            return false;
        };
        if next != state {
            debug!(target: "avdtp.scb", %stream, from = %state, to = %next, event = event.name(), "State change");
        }
        scb.prev_state = state;
        scb.state = next;
        if next == StreamState::Idle && state != StreamState::Idle {
            scb.idle_cleanup = true;
        }

        for action in actions {
            if !self.scbs.contains(stream.0) {
                return true;
            }
            self.scb_action(stream, *action, &event);
        }
        self.scb_enter_idle(stream);
        true
    }

    #[allow(clippy::too_many_lines)]
    fn scb_action(&mut self, stream: StreamHandle, action: ScbAction, event: &ScbEvent) {
        match (action, event) {
            (ScbAction::SndSetConfigReq, ScbEvent::ApiSetConfigReq { ccb, peer_seid, config }) => {
                self.snd_setconfig_req(stream, *ccb, *peer_seid, config);
            }
            (
                ScbAction::HdlSetConfigCmd,
                ScbEvent::SetConfigCmd {
                    label,
                    ccb,
                    int_seid,
                    config,
                },
            ) => self.hdl_setconfig_cmd(stream, *ccb, *label, *int_seid, config),
            (ScbAction::SndSetConfigRsp, ScbEvent::ApiSetConfigRsp { label, .. }) => {
                let Some(scb) = self.scbs.get_mut(stream.0) else {
                    return;
                };
                scb.curr_cfg = scb.req_cfg.take().unwrap_or_default();
                if let Some(ccb) = scb.ccb {
                    self.ccb_event(ccb, crate::ccb::CcbEvent::UlOpen);
                    self.ccb_send_accept(ccb, *label, SignalId::SetConfiguration, Response::Empty);
                }
            }
            (
                ScbAction::SndSetConfigRej,
                ScbEvent::ApiSetConfigRsp {
                    label,
                    result: Err(rej),
                },
            ) => {
                let Some(scb) = self.scbs.get_mut(stream.0) else {
                    return;
                };
                let ccb = scb.ccb.take();
                scb.in_use = false;
                scb.peer_seid = None;
                scb.req_cfg = None;
                if let Some(ccb) = ccb {
                    let reject = Reject::with_category(rej.code, rej.category);
                    self.ccb_send_reject(ccb, *label, SignalId::SetConfiguration, reject);
                    self.ccb_event(ccb, crate::ccb::CcbEvent::UlClose);
                }
            }
            (ScbAction::HdlSetConfigRsp, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.curr_cfg = scb.req_cfg.take().unwrap_or_default();
                }
                self.events.push_back(AvdtEvent::SetConfigCfm {
                    stream,
                    result: Ok(()),
                });
            }
            (ScbAction::HdlSetConfigRej, ScbEvent::SetConfigRsp(Err(err))) => {
                self.events.push_back(AvdtEvent::SetConfigCfm {
                    stream,
                    result: Err(err.clone()),
                });
            }
            (ScbAction::ClearBinding, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.ccb = None;
                    scb.in_use = false;
                    scb.peer_seid = None;
                    scb.req_cfg = None;
                }
            }

            (ScbAction::SndGetConfigReq, _) => {
                self.scb_command(stream, |acp_seid| Command::GetConfiguration { acp_seid });
            }
            (ScbAction::HdlGetConfigCmd, ScbEvent::GetConfigCmd { ccb, label }) => {
                if let Some(config) = self.scbs.get(stream.0).map(|s| s.curr_cfg.clone()) {
                    self.ccb_send_accept(
                        *ccb,
                        *label,
                        SignalId::GetConfiguration,
                        Response::Configuration { config },
                    );
                }
            }
            (ScbAction::HdlGetConfigRsp, ScbEvent::GetConfigRsp(result)) => {
                self.events.push_back(AvdtEvent::GetConfigCfm {
                    stream,
                    result: result.clone(),
                });
            }

            (ScbAction::SndOpenReq, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.role = Role::Initiator;
                }
                self.scb_command(stream, |acp_seid| Command::Open { acp_seid });
            }
            (ScbAction::HdlOpenCmd, ScbEvent::OpenCmd { ccb, label }) => {
                self.hdl_open_cmd(stream, *ccb, *label);
            }
            (ScbAction::HdlOpenRsp, _) => self.hdl_open_rsp(stream),
            (ScbAction::HdlOpenRej, ScbEvent::OpenRsp(Err(err))) => {
                self.events.push_back(AvdtEvent::OpenCfm {
                    stream,
                    result: Err(err.clone()),
                });
            }
            (ScbAction::HdlTcOpen, ScbEvent::TcOpen { peer_mtu }) => {
                self.hdl_tc_open(stream, *peer_mtu);
            }

            (ScbAction::HdlStartCmd, _) => {
                info!(target: "avdtp.scb", %stream, "Stream started by peer");
                self.events.push_back(AvdtEvent::StartInd { stream });
            }
            (ScbAction::HdlStartRsp, ScbEvent::StartRsp(result)) => {
                self.events.push_back(AvdtEvent::StartCfm {
                    stream,
                    result: result.clone(),
                });
            }
            (ScbAction::HdlSuspendCmd, _) => {
                info!(target: "avdtp.scb", %stream, "Stream suspended by peer");
                self.events.push_back(AvdtEvent::SuspendInd { stream });
            }
            (ScbAction::HdlSuspendRsp, ScbEvent::SuspendRsp(result)) => {
                self.events.push_back(AvdtEvent::SuspendCfm {
                    stream,
                    result: result.clone(),
                });
            }

            (ScbAction::SndReconfigReq, ScbEvent::ApiReconfigReq { config }) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.req_cfg = Some(config.clone());
                }
                let config = config.clone();
                self.scb_command(stream, move |acp_seid| Command::Reconfigure { acp_seid, config });
            }
            (ScbAction::HdlReconfigCmd, ScbEvent::ReconfigCmd { ccb, label, config }) => {
                self.hdl_reconfig_cmd(stream, *ccb, *label, config);
            }
            (ScbAction::SndReconfigRsp, ScbEvent::ApiReconfigRsp { label, result }) => {
                let Some(scb) = self.scbs.get_mut(stream.0) else {
                    return;
                };
                let update = scb.req_cfg.take();
                let Some(ccb) = scb.ccb else {
                    return;
                };
                match result {
                    Ok(()) => {
                        if let Some(update) = update {
                            scb.curr_cfg.merge_reconfiguration(&update);
                        }
                        self.ccb_send_accept(ccb, *label, SignalId::Reconfigure, Response::Empty);
                    }
                    Err(rej) => {
                        let reject = Reject::with_category(rej.code, rej.category);
                        self.ccb_send_reject(ccb, *label, SignalId::Reconfigure, reject);
                    }
                }
            }
            (ScbAction::HdlReconfigRsp, ScbEvent::ReconfigRsp(result)) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    let update = scb.req_cfg.take();
                    if let (Ok(()), Some(update)) = (result, update) {
                        scb.curr_cfg.merge_reconfiguration(&update);
                    }
                }
                self.events.push_back(AvdtEvent::ReconfigCfm {
                    stream,
                    result: result.clone(),
                });
            }

            (ScbAction::SndSecurityReq, ScbEvent::ApiSecurityReq { data }) => {
                let data = data.clone();
                self.scb_command(stream, move |acp_seid| Command::Security { acp_seid, data });
            }
            (ScbAction::HdlSecurityCmd, ScbEvent::SecurityCmd { label, data, .. }) => {
                self.events.push_back(AvdtEvent::SecurityInd {
                    stream,
                    label: *label,
                    data: data.clone(),
                });
            }
            (ScbAction::SndSecurityRsp, ScbEvent::ApiSecurityRsp { label, result }) => {
                let Some(ccb) = self.scbs.get(stream.0).and_then(|s| s.ccb) else {
                    return;
                };
                match result {
                    Ok(data) => {
                        let rsp = Response::Security { data: data.clone() };
                        self.ccb_send_accept(ccb, *label, SignalId::Security, rsp);
                    }
                    Err(code) => {
                        self.ccb_send_reject(ccb, *label, SignalId::Security, Reject::new(*code));
                    }
                }
            }
            (ScbAction::HdlSecurityRsp, ScbEvent::SecurityRsp(result)) => {
                self.events.push_back(AvdtEvent::SecurityCfm {
                    stream,
                    result: result.clone(),
                });
            }

            (ScbAction::SndDelayReportReq, ScbEvent::ApiDelayReportReq { delay }) => {
                let delay = *delay;
                self.scb_command(stream, move |acp_seid| Command::DelayReport { acp_seid, delay });
            }
            (ScbAction::HdlDelayReportCmd, ScbEvent::DelayReportCmd { ccb, label, delay }) => {
                let supported = self
                    .scbs
                    .get(stream.0)
                    .is_some_and(|s| s.endpoint.capabilities.delay_reporting);
                if supported {
                    self.ccb_send_accept(*ccb, *label, SignalId::DelayReport, Response::Empty);
                    self.events.push_back(AvdtEvent::DelayReportInd {
                        stream,
                        delay: *delay,
                    });
                } else {
                    let reject = Reject::new(ErrorCode::NOT_SUPPORTED_COMMAND);
                    self.ccb_send_reject(*ccb, *label, SignalId::DelayReport, reject);
                }
            }
            (ScbAction::HdlDelayReportRsp, ScbEvent::DelayReportRsp(result)) => {
                self.events.push_back(AvdtEvent::DelayReportCfm {
                    stream,
                    result: result.clone(),
                });
            }

            (ScbAction::SndCloseReq, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.teardown = Some(Teardown::new(TeardownKind::Close, TeardownOrigin::Local));
                }
                self.scb_command(stream, |acp_seid| Command::Close { acp_seid });
            }
            (ScbAction::HdlCloseCmd, ScbEvent::CloseCmd { ccb, label }) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.teardown = Some(Teardown::new(TeardownKind::Close, TeardownOrigin::Peer));
                }
                self.ccb_send_accept(*ccb, *label, SignalId::Close, Response::Empty);
                // The initiator of the close tears the transport down.
                self.scb_arm_tc_timer(stream, self.config.tc_disconnect_timeout);
            }
            (ScbAction::HdlCloseRsp, ScbEvent::CloseRsp(result)) => {
                if let Err(err) = result {
                    if let Some(teardown) = self.scbs.get_mut(stream.0).and_then(|s| s.teardown.as_mut()) {
                        teardown.result = Err(err.clone());
                    }
                    if err.is_peer_answer() {
                        self.scb_command(stream, |acp_seid| Command::Abort { acp_seid });
                    }
                }
                self.scb_close_transport(stream);
            }

            (ScbAction::SndAbortReq, _) => {
                let origin = if matches!(event, ScbEvent::TcTimeout) {
                    TeardownOrigin::Timeout
                } else {
                    TeardownOrigin::Local
                };
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.teardown = Some(Teardown::new(TeardownKind::Abort, origin));
                }
                self.scb_command(stream, |acp_seid| Command::Abort { acp_seid });
            }
            (ScbAction::HdlAbortCmd, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.teardown = Some(Teardown::new(TeardownKind::Abort, TeardownOrigin::Peer));
                }
            }
            (ScbAction::SndAbortRsp, ScbEvent::AbortCmd { ccb, label }) => {
                self.ccb_send_accept(*ccb, *label, SignalId::Abort, Response::Empty);
            }
            (ScbAction::HdlAbortRsp, ScbEvent::AbortRsp(result)) => {
                if let Some(teardown) = self.scbs.get_mut(stream.0).and_then(|s| s.teardown.as_mut()) {
                    if teardown.kind == TeardownKind::Abort && teardown.origin == TeardownOrigin::Local {
                        teardown.result = result.clone();
                    }
                }
            }

            (ScbAction::SndTcClose, _) => self.scb_close_transport(stream),
            (ScbAction::ForceTcClose, _) => {
                if let Some(ccb) = self.scbs.get(stream.0).and_then(|s| s.ccb) {
                    for channel in [ChannelType::Media, ChannelType::Reporting] {
                        self.ad.close(&mut self.link, ccb, channel, Some(stream));
                        self.ad.forget(ccb, channel, Some(stream));
                    }
                }
                warn!(target: "avdtp.scb", %stream, "Transport close timed out");
                self.scb_event(stream, ScbEvent::TcClose);
            }
            (ScbAction::HdlTcClose, _) => {
                self.scb_cancel_tc_timer(stream);
                self.scb_report_teardown(stream);
            }
            (ScbAction::HdlCcClose, _) => {
                self.scb_cancel_tc_timer(stream);
                let pending_config = self.scbs.get(stream.0).is_some_and(|s| {
                    s.prev_state == StreamState::Configured
                        && s.role == Role::Initiator
                        && s.req_cfg.is_some()
                });
                if pending_config {
                    self.events.push_back(AvdtEvent::SetConfigCfm {
                        stream,
                        result: Err(ProcedureError::LinkClosed),
                    });
                } else {
                    self.scb_report_teardown(stream);
                }
            }

            (ScbAction::RejNotInUse | ScbAction::RejInUse, _) => {
                if let Some((ccb, label, signal)) = event.peer_command() {
                    let code = if action == ScbAction::RejInUse {
                        ErrorCode::SEP_IN_USE
                    } else {
                        ErrorCode::SEP_NOT_IN_USE
                    };
                    self.ccb_send_reject(ccb, label, signal, reject_for(signal, code));
                }
            }

            (ScbAction::HdlWriteReq, ScbEvent::ApiWriteReq(packet)) => {
                let Some(scb) = self.scbs.get_mut(stream.0) else {
                    return;
                };
                if scb.pending.is_some() || scb.congested {
                    let reason = if scb.congested { "congested" } else { "pending" };
                    scb.last_write = WriteOutcome::Dropped;
                    metrics::record_media_dropped(reason);
                    return;
                }
                scb.pending = Some(media::encode(packet, scb.sequence, scb.ssrc()));
                scb.last_write = WriteOutcome::Sent;
            }
            (ScbAction::ChkSndPkt, _) => self.scb_send_pending(stream),
            (ScbAction::DropPkt, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.last_write = WriteOutcome::Dropped;
                }
                metrics::record_media_dropped("state");
            }
            (ScbAction::HdlPkt, ScbEvent::TcData(data)) => match media::decode(data.clone()) {
                Ok((header, payload)) => {
                    self.events.push_back(AvdtEvent::MediaData {
                        stream,
                        header,
                        payload,
                    });
                }
                Err(err) => {
                    debug!(target: "avdtp.scb", %stream, error = %err, "Dropping malformed media packet");
                }
            },
            (ScbAction::CongState, ScbEvent::TcCong(congested)) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.congested = *congested;
                }
                self.events.push_back(AvdtEvent::Congestion {
                    stream,
                    congested: *congested,
                });
            }

            (ScbAction::SetRemove, _) => {
                if let Some(scb) = self.scbs.get_mut(stream.0) {
                    scb.remove_pending = true;
                }
            }
            (ScbAction::Dealloc, _) => self.scb_dealloc(stream),

            (action, event) => {
                debug!(
                    target: "avdtp.scb",
                    %stream,
                    ?action,
                    event = event.name(),
                    "Action does not apply to event"
                );
            }
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    /// Endpoint registered under a local SEID.
    pub(crate) fn scb_by_seid(&self, seid: Seid) -> Option<StreamHandle> {
        self.scbs
            .id_at(usize::from(seid.get() - 1))
            .map(StreamHandle)
    }

    /// Queue a command addressed to the peer endpoint of this stream.
    fn scb_command(&mut self, stream: StreamHandle, make: impl FnOnce(Seid) -> Command) {
        let Some((Some(ccb), Some(peer_seid))) = self.scbs.get(stream.0).map(|s| (s.ccb, s.peer_seid)) else {
            warn!(target: "avdtp.scb", %stream, "Stream has no peer to address");
            return;
        };
        self.ccb_send_command(ccb, PendingCommand::new(make(peer_seid), vec![stream]));
    }

    fn scb_arm_tc_timer(&mut self, stream: StreamHandle, after: Duration) {
        if let Some(scb) = self.scbs.get_mut(stream.0) {
            if scb.tc_timer {
                self.timers.cancel(TimerToken::Transport { stream });
            }
            scb.tc_timer = true;
            self.timers.arm(TimerToken::Transport { stream }, after);
        }
    }

    fn scb_cancel_tc_timer(&mut self, stream: StreamHandle) {
        if let Some(scb) = self.scbs.get_mut(stream.0) {
            if scb.tc_timer {
                scb.tc_timer = false;
                self.timers.cancel(TimerToken::Transport { stream });
            }
        }
    }

    /// Close the media and reporting channels; completion arrives as a
    /// transport close event.
    fn scb_close_transport(&mut self, stream: StreamHandle) {
        let Some(ccb) = self.scbs.get(stream.0).and_then(|s| s.ccb) else {
            self.scb_event(stream, ScbEvent::TcClose);
            return;
        };
        self.ad
            .close(&mut self.link, ccb, ChannelType::Reporting, Some(stream));
        match self
            .ad
            .close(&mut self.link, ccb, ChannelType::Media, Some(stream))
        {
            CloseOutcome::Immediate => {
                self.scb_event(stream, ScbEvent::TcClose);
            }
            CloseOutcome::Pending => {
                self.scb_arm_tc_timer(stream, self.config.tc_disconnect_timeout);
            }
        }
    }

    /// Report how the stream ended once its transport is gone.
    fn scb_report_teardown(&mut self, stream: StreamHandle) {
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        let old_state = scb.prev_state;
        let event = match scb.teardown.take() {
            Some(Teardown {
                kind: TeardownKind::Close,
                origin: TeardownOrigin::Local,
                result,
            }) => AvdtEvent::CloseCfm { stream, result },
            Some(Teardown {
                kind: TeardownKind::Close,
                ..
            }) => AvdtEvent::CloseInd { stream },
            Some(Teardown {
                kind: TeardownKind::Abort,
                origin: TeardownOrigin::Local,
                result,
            }) => AvdtEvent::AbortCfm { stream, result },
            Some(Teardown {
                kind: TeardownKind::Abort,
                origin: TeardownOrigin::Peer,
                ..
            }) => AvdtEvent::AbortInd {
                stream,
                cause: AbortCause::Peer,
            },
            Some(Teardown {
                kind: TeardownKind::Abort,
                origin: TeardownOrigin::Timeout,
                ..
            }) => AvdtEvent::AbortInd {
                stream,
                cause: AbortCause::Timeout,
            },
            None if old_state == StreamState::Opening => AvdtEvent::AbortInd {
                stream,
                cause: AbortCause::TransportFailure,
            },
            None => AvdtEvent::TransportClosed { stream, old_state },
        };
        self.events.push_back(event);
    }

    fn scb_send_pending(&mut self, stream: StreamHandle) {
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        let Some(ccb) = scb.ccb else {
            return;
        };
        if scb.congested {
            return;
        }
        let Some(packet) = scb.pending.take() else {
            return;
        };
        let held = std::mem::take(&mut scb.held);
        let result = self
            .ad
            .write(&mut self.link, ccb, ChannelType::Media, Some(stream), packet.clone());
        // A packet owns its sequence number once the link has taken or queued it.
        if !held && result != WriteResult::Failed {
            scb.sequence = scb.sequence.wrapping_add(1);
        }
        match result {
            WriteResult::Accepted => {}
            WriteResult::Congested => {
                scb.pending = Some(packet);
                scb.held = true;
                scb.congested = true;
                scb.last_write = WriteOutcome::Queued;
            }
            WriteResult::Failed => {
                scb.last_write = WriteOutcome::Dropped;
                metrics::record_media_dropped("write_failed");
            }
        }
    }

    fn snd_setconfig_req(&mut self, stream: StreamHandle, ccb: CcbId, peer_seid: Seid, config: &StreamConfig) {
        let Some(int_seid) = stream.seid() else {
            return;
        };
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        scb.ccb = Some(ccb);
        scb.peer_seid = Some(peer_seid);
        scb.in_use = true;
        scb.role = Role::Initiator;
        scb.req_cfg = Some(config.clone());

        self.ccb_event(ccb, crate::ccb::CcbEvent::UlOpen);
        let cmd = Command::SetConfiguration {
            acp_seid: peer_seid,
            int_seid,
            config: config.clone(),
        };
        self.ccb_send_command(ccb, PendingCommand::new(cmd, vec![stream]));
    }

    fn hdl_setconfig_cmd(
        &mut self,
        stream: StreamHandle,
        ccb: CcbId,
        label: Label,
        int_seid: Seid,
        config: &StreamConfig,
    ) {
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        if scb.in_use {
            let reject = reject_for(SignalId::SetConfiguration, ErrorCode::SEP_IN_USE);
            self.ccb_send_reject(ccb, label, SignalId::SetConfiguration, reject);
            return;
        }
        if let Err(err) = config.check_against(&scb.endpoint.capabilities) {
            let reject = Reject::with_category(err.code, err.category);
            self.ccb_send_reject(ccb, label, SignalId::SetConfiguration, reject);
            return;
        }
        scb.ccb = Some(ccb);
        scb.peer_seid = Some(int_seid);
        scb.in_use = true;
        scb.role = Role::Acceptor;
        scb.req_cfg = Some(config.clone());

        let Some(peer) = self.ccbs.get(ccb.0).map(|c| c.peer) else {
            return;
        };
        self.events.push_back(AvdtEvent::ConfigInd {
            stream,
            peer,
            int_seid,
            label,
            config: config.clone(),
        });
    }

    fn hdl_open_cmd(&mut self, stream: StreamHandle, ccb: CcbId, label: Label) {
        let Some(peer) = self.ccbs.get(ccb.0).map(|c| c.peer) else {
            return;
        };
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        scb.role = Role::Acceptor;
        let reporting = scb.curr_cfg.reporting && self.config.reporting;

        let mut reserved = self
            .ad
            .open_acceptor(ccb, peer, ChannelType::Media, Some(stream));
        if reserved.is_ok() && reporting {
            reserved = self
                .ad
                .open_acceptor(ccb, peer, ChannelType::Reporting, Some(stream));
        }
        if let Err(err) = reserved {
            warn!(target: "avdtp.scb", %stream, error = %err, "Cannot reserve transport channel");
            self.ad.forget(ccb, ChannelType::Media, Some(stream));
            self.ad.forget(ccb, ChannelType::Reporting, Some(stream));
            scb.state = StreamState::Configured;
            self.ccb_send_reject(ccb, label, SignalId::Open, Reject::new(ErrorCode::BAD_STATE));
            return;
        }
        self.ccb_send_accept(ccb, label, SignalId::Open, Response::Empty);
        self.scb_arm_tc_timer(stream, self.config.tc_connect_timeout);
    }

    fn hdl_open_rsp(&mut self, stream: StreamHandle) {
        let Some(ccb) = self.scbs.get(stream.0).and_then(|s| s.ccb) else {
            return;
        };
        let Some(peer) = self.ccbs.get(ccb.0).map(|c| c.peer) else {
            return;
        };
        let params = ChannelParams {
            channel: ChannelType::Media,
            mtu: self.config.media_mtu,
            flush_timeout: self.config.flush_timeout,
        };
        match self
            .ad
            .open_initiator(&mut self.link, ccb, peer, Some(stream), &params)
        {
            Ok(_) => self.scb_arm_tc_timer(stream, self.config.tc_connect_timeout),
            Err(err) => {
                warn!(target: "avdtp.scb", %stream, error = %err, "Cannot open media channel");
                self.scb_event(stream, ScbEvent::TcClose);
            }
        }
    }

    fn hdl_tc_open(&mut self, stream: StreamHandle, peer_mtu: u16) {
        self.scb_cancel_tc_timer(stream);
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        scb.media_mtu = peer_mtu;
        let role = scb.role;
        let open_reporting = role == Role::Initiator && scb.curr_cfg.reporting && self.config.reporting;
        let ccb = scb.ccb;
        metrics::record_transport_opened(ChannelType::Media.as_str());
        info!(target: "avdtp.scb", %stream, mtu = peer_mtu, ?role, "Stream open");

        if let (true, Some(ccb)) = (open_reporting, ccb) {
            let peer = self.ccbs.get(ccb.0).map(|c| c.peer);
            let params = ChannelParams {
                channel: ChannelType::Reporting,
                mtu: self.config.media_mtu,
                flush_timeout: self.config.flush_timeout,
            };
            if let Some(peer) = peer {
                if let Err(err) = self
                    .ad
                    .open_initiator(&mut self.link, ccb, peer, Some(stream), &params)
                {
                    warn!(target: "avdtp.scb", %stream, error = %err, "Cannot open reporting channel");
                }
            }
        }

        let event = match role {
            Role::Initiator => AvdtEvent::OpenCfm {
                stream,
                result: Ok(peer_mtu),
            },
            Role::Acceptor => AvdtEvent::OpenInd {
                stream,
                mtu: peer_mtu,
            },
        };
        self.events.push_back(event);
    }

    fn hdl_reconfig_cmd(&mut self, stream: StreamHandle, ccb: CcbId, label: Label, config: &StreamConfig) {
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        if let Err(err) = check_reconfiguration(&scb.endpoint.capabilities, config) {
            let reject = Reject::with_category(err.code, err.category);
            self.ccb_send_reject(ccb, label, SignalId::Reconfigure, reject);
            return;
        }
        scb.req_cfg = Some(config.clone());
        self.events.push_back(AvdtEvent::ReconfigInd {
            stream,
            label,
            config: config.clone(),
        });
    }

    /// Reset a stream that just reached Idle and release its link binding.
    fn scb_enter_idle(&mut self, stream: StreamHandle) {
        let Some(scb) = self.scbs.get_mut(stream.0) else {
            return;
        };
        if !scb.idle_cleanup {
            return;
        }
        scb.idle_cleanup = false;
        let ccb = scb.ccb.take();
        scb.in_use = false;
        scb.peer_seid = None;
        scb.curr_cfg = StreamConfig::default();
        scb.req_cfg = None;
        scb.teardown = None;
        scb.pending = None;
        scb.held = false;
        scb.congested = false;
        scb.media_mtu = 0;
        let remove = scb.remove_pending;
        if std::mem::take(&mut scb.tc_timer) {
            self.timers.cancel(TimerToken::Transport { stream });
        }
        info!(target: "avdtp.scb", %stream, "Stream idle");

        if let Some(ccb) = ccb {
            for channel in [ChannelType::Media, ChannelType::Reporting] {
                self.ad.close(&mut self.link, ccb, channel, Some(stream));
            }
            self.ccb_event(ccb, crate::ccb::CcbEvent::UlClose);
        }
        if remove {
            self.scb_dealloc(stream);
        }
    }

    pub(crate) fn scb_dealloc(&mut self, stream: StreamHandle) {
        self.scb_cancel_tc_timer(stream);
        if self.scbs.remove(stream.0).is_some() {
            info!(target: "avdtp.scb", %stream, "Stream endpoint removed");
        }
    }

    /// Route a peer command addressed to one endpoint.
    pub(crate) fn scb_peer_command(&mut self, ccb: CcbId, label: Label, cmd: Command) {
        let signal = cmd.signal();
        let (acp_seid, event) = match cmd {
            Command::SetConfiguration {
                acp_seid,
                int_seid,
                config,
            } => (
                acp_seid,
                ScbEvent::SetConfigCmd {
                    label,
                    ccb,
                    int_seid,
                    config,
                },
            ),
            Command::GetConfiguration { acp_seid } => (acp_seid, ScbEvent::GetConfigCmd { ccb, label }),
            Command::Reconfigure { acp_seid, config } => {
                (acp_seid, ScbEvent::ReconfigCmd { ccb, label, config })
            }
            Command::Open { acp_seid } => (acp_seid, ScbEvent::OpenCmd { ccb, label }),
            Command::Close { acp_seid } => (acp_seid, ScbEvent::CloseCmd { ccb, label }),
            Command::Abort { acp_seid } => (acp_seid, ScbEvent::AbortCmd { ccb, label }),
            Command::Security { acp_seid, data } => {
                (acp_seid, ScbEvent::SecurityCmd { ccb, label, data })
            }
            Command::DelayReport { acp_seid, delay } => {
                (acp_seid, ScbEvent::DelayReportCmd { ccb, label, delay })
            }
            Command::Discover
            | Command::GetCapabilities { .. }
            | Command::Start { .. }
            | Command::Suspend { .. } => return,
        };

        let target = self
            .scb_by_seid(acp_seid)
            .and_then(|h| self.scbs.get(h.0).map(|s| (h, s.ccb)));
        match target {
            None => {
                self.ccb_send_reject(ccb, label, signal, reject_for(signal, ErrorCode::BAD_ACP_SEID));
            }
            Some((_, Some(owner))) if owner != ccb => {
                let code = if signal == SignalId::SetConfiguration {
                    ErrorCode::SEP_IN_USE
                } else {
                    ErrorCode::BAD_ACP_SEID
                };
                self.ccb_send_reject(ccb, label, signal, reject_for(signal, code));
            }
            Some((stream, _)) => {
                if !self.scb_event(stream, event) {
                    self.ccb_send_reject(ccb, label, signal, reject_for(signal, ErrorCode::BAD_STATE));
                }
            }
        }
    }
}
