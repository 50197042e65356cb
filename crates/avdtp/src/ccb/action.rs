//! Signaling controller dispatch and actions.

use super::state::{transition, CcbAction};
use super::{Answer, CcbEvent, CcbState, InFlight, PendingCommand};
use crate::ad::CloseOutcome;
use crate::engine::Avdtp;
use crate::errors::ProcedureError;
use crate::events::AvdtEvent;
use crate::link::{CcbTimer, ChannelParams, LinkLayer, SecurityPolicy, TimerService, TimerToken, WriteResult};
use crate::msg::{
    self, Command, ErrorCode, Label, Message, MessageType, MsgError, RawMessage, Reject, Response,
    SepInfo, SignalId,
};
use crate::observability::metrics;
use crate::scb::ScbEvent;
use crate::types::{CcbId, ChannelType, Seid, StreamHandle, StreamState};
use bytes::Bytes;
use tracing::{debug, info, warn};

impl<L: LinkLayer, T: TimerService, S: SecurityPolicy> Avdtp<L, T, S> {
    /// Run one event through the signaling controller table.
    ///
    /// Returns `false` if the controller is gone or the event has no entry
    /// in the current state.
    pub(crate) fn ccb_event(&mut self, id: CcbId, event: CcbEvent) -> bool {
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return false;
        };
        let state = ccb.state;
        let Some((next, actions)) = transition(state, &event) else {
            debug!(target: "avdtp.ccb", %id, ?state, event = event.name(), "Event ignored");
            return false;
        };
        if next != state {
            debug!(target: "avdtp.ccb", %id, from = ?state, to = ?next, event = event.name(), "State change");
        }
        ccb.state = next;

        for action in actions {
            if !self.ccbs.contains(id.0) {
                break;
            }
            self.ccb_action(id, *action, &event);
        }
        true
    }

    fn ccb_action(&mut self, id: CcbId, action: CcbAction, event: &CcbEvent) {
        match action {
            CcbAction::SndDiscoverCmd => {
                self.ccb_enqueue(id, PendingCommand::new(Command::Discover, Vec::new()));
            }
            CcbAction::SndGetCapCmd => {
                if let CcbEvent::GetCapReq { seid, all } = event {
                    let cmd = Command::GetCapabilities {
                        acp_seid: *seid,
                        all: *all,
                    };
                    self.ccb_enqueue(id, PendingCommand::new(cmd, Vec::new()));
                }
            }
            CcbAction::SndStartCmd | CcbAction::SndSuspendCmd => {
                if let CcbEvent::StartReq(cmd) | CcbEvent::SuspendReq(cmd) = event {
                    self.ccb_enqueue(id, cmd.clone());
                }
            }
            CcbAction::HdlDiscoverCmd => {
                if let CcbEvent::DiscoverCmd { label } = event {
                    self.hdl_discover_cmd(id, *label);
                }
            }
            CcbAction::HdlGetCapCmd => {
                if let CcbEvent::GetCapCmd { label, seid, all } = event {
                    self.hdl_getcap_cmd(id, *label, *seid, *all);
                }
            }
            CcbAction::HdlStartCmd => {
                if let CcbEvent::StartCmd { label, seids } = event {
                    self.hdl_start_suspend_cmd(id, *label, SignalId::Start, seids);
                }
            }
            CcbAction::HdlSuspendCmd => {
                if let CcbEvent::SuspendCmd { label, seids } = event {
                    self.hdl_start_suspend_cmd(id, *label, SignalId::Suspend, seids);
                }
            }
            CcbAction::HdlRsp => {
                if let CcbEvent::RcvRsp(answer) = event {
                    self.hdl_rsp(id, answer);
                }
            }
            CcbAction::SndCmd => self.ccb_snd_cmd(id),
            CcbAction::SndMsg => self.ccb_snd_msg(id),
            CcbAction::ChanOpen => self.ccb_chan_open(id),
            CcbAction::ChanClose => self.ccb_chan_close(id),
            CcbAction::ChkTimer => {
                if self.ccbs.get(id.0).and_then(|c| c.timer) == Some(CcbTimer::Idle) {
                    self.ccb_cancel_timer(id);
                }
            }
            CcbAction::ChkClose => self.ccb_check_idle(id),
            CcbAction::ClearCmds => self.ccb_clear_commands(id, &ProcedureError::LinkClosed),
            CcbAction::CmdFail => self.ccb_fail_in_flight(id, ProcedureError::Timeout),
            CcbAction::RetCmd => self.ccb_retransmit(id),
            CcbAction::SetReconn => {
                if let Some(ccb) = self.ccbs.get_mut(id.0) {
                    ccb.reconn = true;
                }
            }
            CcbAction::ClrReconn => {
                if let Some(ccb) = self.ccbs.get_mut(id.0) {
                    ccb.reconn = false;
                }
            }
            CcbAction::ChkReconn => self.ccb_check_reconnect(id),
            CcbAction::SetConn => {
                if let Some(ccb) = self.ccbs.get_mut(id.0) {
                    ccb.held = true;
                }
                if self.ccbs.get(id.0).and_then(|c| c.timer) == Some(CcbTimer::Idle) {
                    self.ccb_cancel_timer(id);
                }
            }
            CcbAction::SetDisconn => {
                if let Some(ccb) = self.ccbs.get_mut(id.0) {
                    ccb.held = false;
                }
            }
            CcbAction::DoDisconn => self.ccb_do_disconnect(id),
            CcbAction::LlOpened => self.ccb_ll_opened(id),
            CcbAction::LlClosed => self.ccb_ll_closed(id),
            CcbAction::CongState => {
                if let (CcbEvent::LlCong(congested), Some(ccb)) = (event, self.ccbs.get_mut(id.0)) {
                    ccb.congested = *congested;
                    debug!(target: "avdtp.ccb", %id, congested, "Signaling congestion changed");
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Outbound path
    // ---------------------------------------------------------------------

    fn ccb_enqueue(&mut self, id: CcbId, cmd: PendingCommand) {
        if let Some(ccb) = self.ccbs.get_mut(id.0) {
            ccb.cmd_queue.push_back(cmd);
        }
    }

    /// Queue a stream command and kick the controller.
    pub(crate) fn ccb_send_command(&mut self, id: CcbId, cmd: PendingCommand) {
        self.ccb_enqueue(id, cmd);
        self.ccb_event(id, CcbEvent::SendMsg);
    }

    fn ccb_mtu(&self, id: CcbId) -> usize {
        let peer_mtu = self.ccbs.get(id.0).map_or(0, |c| c.peer_mtu);
        let mtu = if peer_mtu == 0 {
            self.config.signaling_mtu
        } else {
            peer_mtu
        };
        usize::from(mtu)
    }

    fn ccb_queue_response(&mut self, id: CcbId, label: Label, signal: SignalId, message: &Message) {
        let packets = msg::encode(label, signal, message, self.ccb_mtu(id));
        if let Some(ccb) = self.ccbs.get_mut(id.0) {
            ccb.rsp_queue.push_back(packets);
        }
    }

    fn ccb_queue_reject(&mut self, id: CcbId, label: Label, signal: SignalId, reject: Reject) {
        metrics::record_reject_sent(signal.as_str(), reject.code.name());
        debug!(target: "avdtp.ccb", %id, signal = signal.as_str(), code = %reject.code, "Rejecting command");
        self.ccb_queue_response(id, label, signal, &Message::Reject(reject));
    }

    /// Answer a peer command with an accept and send it.
    pub(crate) fn ccb_send_accept(&mut self, id: CcbId, label: Label, signal: SignalId, rsp: Response) {
        self.ccb_queue_response(id, label, signal, &Message::Accept(rsp));
        self.ccb_event(id, CcbEvent::SendMsg);
    }

    /// Answer a peer command with a reject and send it.
    pub(crate) fn ccb_send_reject(&mut self, id: CcbId, label: Label, signal: SignalId, reject: Reject) {
        self.ccb_queue_reject(id, label, signal, reject);
        self.ccb_event(id, CcbEvent::SendMsg);
    }

    /// Write backlogged packets until the link pushes back.
    fn ccb_flush(&mut self, id: CcbId) {
        loop {
            let Some(ccb) = self.ccbs.get_mut(id.0) else {
                return;
            };
            if ccb.congested {
                return;
            }
            let Some(packet) = ccb.backlog.front().cloned() else {
                return;
            };
            match self
                .ad
                .write(&mut self.link, id, ChannelType::Signaling, None, packet)
            {
                WriteResult::Accepted => {
                    ccb.backlog.pop_front();
                }
                WriteResult::Congested => {
                    ccb.congested = true;
                    debug!(target: "avdtp.ccb", %id, backlog = ccb.backlog.len(), "Signaling channel congested");
                    return;
                }
                WriteResult::Failed => {
                    ccb.backlog.pop_front();
                    warn!(target: "avdtp.ccb", %id, "Signaling write failed, packet dropped");
                }
            }
        }
    }

    fn ccb_snd_msg(&mut self, id: CcbId) {
        if let Some(ccb) = self.ccbs.get_mut(id.0) {
            while let Some(packets) = ccb.rsp_queue.pop_front() {
                ccb.backlog.extend(packets);
            }
        }
        self.ccb_flush(id);
        self.ccb_snd_cmd(id);
    }

    /// Send the next queued command if nothing is in flight.
    fn ccb_snd_cmd(&mut self, id: CcbId) {
        let mtu = self.ccb_mtu(id);
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        if ccb.state != CcbState::Open || ccb.in_flight.is_some() || ccb.congested {
            return;
        }
        let Some(pending) = ccb.cmd_queue.pop_front() else {
            self.ccb_check_idle(id);
            return;
        };

        let label = ccb.take_label();
        let signal = pending.command.signal();
        let packets = msg::encode(label, signal, &Message::Command(pending.command.clone()), mtu);
        ccb.backlog.extend(packets.iter().cloned());
        ccb.in_flight = Some(InFlight {
            label,
            command: pending.command,
            packets,
            streams: pending.streams,
            retries: 0,
        });
        metrics::record_command_sent(signal.as_str());
        debug!(target: "avdtp.ccb", %id, signal = signal.as_str(), label = label.get(), "Sending command");

        let kind = if signal.uses_response_timer() {
            CcbTimer::Response
        } else {
            CcbTimer::Retransmit
        };
        self.ccb_arm_timer(id, kind);
        self.ccb_flush(id);
    }

    fn ccb_retransmit(&mut self, id: CcbId) {
        let max = self.config.max_retransmissions;
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        let congested = ccb.congested;
        let Some(in_flight) = ccb.in_flight.as_mut() else {
            return;
        };
        let signal = in_flight.signal();
        if congested {
            // Peer cannot have seen the command yet; wait for the link.
            self.ccb_arm_timer(id, CcbTimer::Retransmit);
            return;
        }
        if in_flight.retries >= max {
            self.ccb_fail_in_flight(id, ProcedureError::Timeout);
            return;
        }
        in_flight.retries += 1;
        let packets = in_flight.packets.clone();
        ccb.backlog.extend(packets);
        metrics::record_retransmission(signal.as_str());
        debug!(target: "avdtp.ccb", %id, signal = signal.as_str(), "Retransmitting command");
        self.ccb_arm_timer(id, CcbTimer::Retransmit);
        self.ccb_flush(id);
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    fn ccb_arm_timer(&mut self, id: CcbId, kind: CcbTimer) {
        self.ccb_cancel_timer(id);
        let after = match kind {
            CcbTimer::Idle => self.config.idle_timeout,
            CcbTimer::Retransmit => self.config.retransmit_timeout,
            CcbTimer::Response => self.config.response_timeout,
        };
        if let Some(ccb) = self.ccbs.get_mut(id.0) {
            ccb.timer = Some(kind);
            self.timers.arm(TimerToken::Signaling { ccb: id, kind }, after);
        }
    }

    fn ccb_cancel_timer(&mut self, id: CcbId) {
        if let Some(kind) = self.ccbs.get_mut(id.0).and_then(|c| c.timer.take()) {
            self.timers.cancel(TimerToken::Signaling { ccb: id, kind });
        }
    }

    /// Arm the idle timer when the channel has nothing left to do.
    fn ccb_check_idle(&mut self, id: CcbId) {
        let bound = self.scbs.iter().any(|(_, scb)| scb.ccb == Some(id));
        let Some(ccb) = self.ccbs.get(id.0) else {
            return;
        };
        let idle = ccb.state == CcbState::Open
            && !bound
            && !ccb.held
            && ccb.in_flight.is_none()
            && ccb.cmd_queue.is_empty()
            && ccb.procedure.is_none()
            && ccb.timer.is_none();
        if idle {
            debug!(target: "avdtp.ccb", %id, "Signaling channel idle");
            self.ccb_arm_timer(id, CcbTimer::Idle);
        }
    }

    // ---------------------------------------------------------------------
    // Completion and failure
    // ---------------------------------------------------------------------

    fn hdl_rsp(&mut self, id: CcbId, answer: &Answer) {
        let Some(in_flight) = self.ccbs.get_mut(id.0).and_then(|c| c.in_flight.take()) else {
            return;
        };
        self.ccb_cancel_timer(id);
        if let Err(err) = &answer.result {
            metrics::record_command_failed(answer.signal.as_str(), err.as_str());
        }
        self.ccb_complete(id, &in_flight.command, &in_flight.streams, answer.result.clone());
    }

    fn ccb_fail_in_flight(&mut self, id: CcbId, err: ProcedureError) {
        let Some(in_flight) = self.ccbs.get_mut(id.0).and_then(|c| c.in_flight.take()) else {
            return;
        };
        self.ccb_cancel_timer(id);
        let signal = in_flight.signal();
        metrics::record_command_failed(signal.as_str(), err.as_str());
        warn!(target: "avdtp.ccb", %id, signal = signal.as_str(), error = %err, "Command failed");
        self.ccb_complete(id, &in_flight.command, &in_flight.streams, Err(err));
    }

    /// Fail the in-flight command and everything queued, in order.
    fn ccb_clear_commands(&mut self, id: CcbId, err: &ProcedureError) {
        self.ccb_cancel_timer(id);
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        let mut failed: Vec<(Command, Vec<StreamHandle>)> = Vec::new();
        if let Some(in_flight) = ccb.in_flight.take() {
            failed.push((in_flight.command, in_flight.streams));
        }
        failed.extend(ccb.cmd_queue.drain(..).map(|p| (p.command, p.streams)));
        ccb.rsp_queue.clear();
        ccb.backlog.clear();

        for (command, streams) in failed {
            metrics::record_command_failed(command.signal().as_str(), err.as_str());
            self.ccb_complete(id, &command, &streams, Err(err.clone()));
        }
    }

    /// Deliver the outcome of a command to whoever issued it.
    fn ccb_complete(
        &mut self,
        id: CcbId,
        command: &Command,
        streams: &[StreamHandle],
        result: Result<Response, ProcedureError>,
    ) {
        match command {
            Command::Discover => {
                let Some(ccb) = self.ccbs.get_mut(id.0) else {
                    return;
                };
                ccb.procedure = None;
                let peer = ccb.peer;
                let result = result.and_then(|rsp| match rsp {
                    Response::Discover { endpoints } => Ok(endpoints),
                    _ => Err(ProcedureError::GeneralReject),
                });
                self.events.push_back(AvdtEvent::DiscoverCfm { peer, result });
            }
            Command::GetCapabilities { acp_seid, .. } => {
                let Some(ccb) = self.ccbs.get_mut(id.0) else {
                    return;
                };
                ccb.procedure = None;
                let peer = ccb.peer;
                let result = result.and_then(|rsp| match rsp {
                    Response::Capabilities { config } => Ok(config),
                    _ => Err(ProcedureError::GeneralReject),
                });
                self.events.push_back(AvdtEvent::GetCapabilitiesCfm {
                    peer,
                    seid: *acp_seid,
                    result,
                });
            }
            _ => {
                for stream in streams {
                    if let Some(event) = ScbEvent::from_response(command.signal(), result.clone()) {
                        self.scb_event(*stream, event);
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Channel lifecycle
    // ---------------------------------------------------------------------

    fn ccb_chan_open(&mut self, id: CcbId) {
        // An inbound connection for this peer may already be in progress.
        if self.ad.has_slot(id, ChannelType::Signaling, None) {
            return;
        }
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        ccb.initiator = true;
        let peer = ccb.peer;
        let params = ChannelParams {
            channel: ChannelType::Signaling,
            mtu: self.config.signaling_mtu,
            flush_timeout: u16::MAX,
        };
        if let Err(err) = self
            .ad
            .open_initiator(&mut self.link, id, peer, None, &params)
        {
            warn!(target: "avdtp.ccb", %id, %peer, error = %err, "Cannot open signaling channel");
            self.ccb_event(id, CcbEvent::LlClose);
        }
    }

    fn ccb_chan_close(&mut self, id: CcbId) {
        let outcome = self
            .ad
            .close(&mut self.link, id, ChannelType::Signaling, None);
        if outcome == CloseOutcome::Immediate {
            self.ccb_event(id, CcbEvent::LlClose);
        }
    }

    fn ccb_do_disconnect(&mut self, id: CcbId) {
        self.ccb_clear_commands(id, &ProcedureError::LinkClosed);
        let bound: Vec<StreamHandle> = self
            .scbs
            .iter()
            .filter(|(_, scb)| scb.ccb == Some(id))
            .map(|(slot, _)| StreamHandle(slot))
            .collect();
        // Stream transports go first; the signaling channel closes last.
        for stream in bound {
            self.ad
                .close(&mut self.link, id, ChannelType::Media, Some(stream));
            self.ad
                .close(&mut self.link, id, ChannelType::Reporting, Some(stream));
        }
        self.ccb_chan_close(id);
    }

    fn ccb_ll_opened(&mut self, id: CcbId) {
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        ccb.ll_opened = true;
        ccb.reconn = false;
        let (peer, initiator) = (ccb.peer, ccb.initiator);
        info!(target: "avdtp.ccb", %id, %peer, initiator, "Signaling channel open");
        metrics::record_link_event("connected");
        self.events
            .push_back(AvdtEvent::Connected { peer, initiator });
    }

    fn ccb_ll_closed(&mut self, id: CcbId) {
        let bound: Vec<StreamHandle> = self
            .scbs
            .iter()
            .filter(|(_, scb)| scb.ccb == Some(id))
            .map(|(slot, _)| StreamHandle(slot))
            .collect();
        for stream in bound {
            self.scb_event(stream, ScbEvent::CcClose);
        }
        self.ccb_clear_commands(id, &ProcedureError::LinkClosed);

        if let Some(ccb) = self.ccbs.get(id.0) {
            let peer = ccb.peer;
            if ccb.ll_opened {
                info!(target: "avdtp.ccb", %id, %peer, "Signaling channel closed");
                metrics::record_link_event("disconnected");
                self.events.push_back(AvdtEvent::Disconnected { peer });
            }
        }
        self.ccb_dealloc(id);
    }

    /// Queued commands survive a reconnect; the in-flight one does not.
    fn ccb_check_reconnect(&mut self, id: CcbId) {
        if !self.ccbs.get(id.0).is_some_and(|c| c.reconn) {
            self.ccb_ll_closed(id);
            return;
        }
        self.ccb_fail_in_flight(id, ProcedureError::LinkClosed);
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        let was_open = ccb.ll_opened;
        let peer = ccb.peer;
        ccb.reconn = false;
        ccb.ll_opened = false;
        ccb.congested = false;
        ccb.peer_mtu = 0;
        ccb.rsp_queue.clear();
        ccb.backlog.clear();
        ccb.reassembler = msg::Reassembler::new(self.config.max_signaling_message);
        if was_open {
            info!(target: "avdtp.ccb", %id, %peer, "Signaling channel closed");
            metrics::record_link_event("disconnected");
            self.events.push_back(AvdtEvent::Disconnected { peer });
        }
        debug!(target: "avdtp.ccb", %id, %peer, "Reconnecting signaling channel");
        self.ccb_event(id, CcbEvent::UlOpen);
    }

    fn ccb_dealloc(&mut self, id: CcbId) {
        self.ccb_cancel_timer(id);
        self.ad.release_link(&mut self.link, id);
        if let Some(ccb) = self.ccbs.remove(id.0) {
            debug!(target: "avdtp.ccb", %id, peer = %ccb.peer, "Signaling controller released");
        }
    }

    // ---------------------------------------------------------------------
    // Peer commands handled by the signaling controller
    // ---------------------------------------------------------------------

    fn hdl_discover_cmd(&mut self, id: CcbId, label: Label) {
        let endpoints: Vec<SepInfo> = self
            .scbs
            .iter()
            .filter_map(|(slot, scb)| {
                Some(SepInfo {
                    seid: StreamHandle(slot).seid()?,
                    in_use: scb.in_use,
                    media_type: scb.endpoint.media_type,
                    sep_type: scb.endpoint.sep_type,
                })
            })
            .collect();
        let rsp = Response::Discover { endpoints };
        self.ccb_queue_response(id, label, SignalId::Discover, &Message::Accept(rsp));
    }

    fn hdl_getcap_cmd(&mut self, id: CcbId, label: Label, seid: Seid, all: bool) {
        let signal = if all {
            SignalId::GetAllCapabilities
        } else {
            SignalId::GetCapabilities
        };
        let config = self
            .scb_by_seid(seid)
            .and_then(|h| self.scbs.get(h.0))
            .map(|scb| scb.endpoint.capabilities.clone());
        match config {
            Some(config) => {
                let config = if all {
                    config
                } else {
                    config.without_delay_reporting()
                };
                let rsp = Response::Capabilities { config };
                self.ccb_queue_response(id, label, signal, &Message::Accept(rsp));
            }
            None => self.ccb_queue_reject(id, label, signal, Reject::new(ErrorCode::BAD_ACP_SEID)),
        }
    }

    /// Start and suspend are all-or-nothing: every named endpoint must be
    /// bound to this link and in the right state, otherwise the reject lists
    /// each offender. Endpoints owned by another link count as unknown.
    fn hdl_start_suspend_cmd(&mut self, id: CcbId, label: Label, signal: SignalId, seids: &[Seid]) {
        let required = if signal == SignalId::Start {
            StreamState::Open
        } else {
            StreamState::Streaming
        };
        let mut streams = Vec::with_capacity(seids.len());
        let mut offenders = Vec::new();
        let mut code = None;
        for seid in seids {
            let found = self
                .scb_by_seid(*seid)
                .and_then(|h| self.scbs.get(h.0).map(|scb| (h, scb)));
            let problem = match found {
                None => Some(ErrorCode::BAD_ACP_SEID),
                Some((_, scb)) if scb.ccb.is_some_and(|c| c != id) => Some(ErrorCode::BAD_ACP_SEID),
                Some((_, scb)) if scb.state != required => Some(ErrorCode::BAD_STATE),
                Some((handle, _)) => {
                    streams.push(handle);
                    None
                }
            };
            if let Some(problem) = problem {
                code.get_or_insert(problem);
                offenders.push(*seid);
            }
        }

        if let Some(code) = code {
            self.ccb_queue_reject(id, label, signal, Reject::with_seids(code, offenders));
            return;
        }
        if streams.is_empty() {
            self.ccb_queue_reject(id, label, signal, Reject::new(ErrorCode::BAD_LENGTH));
            return;
        }
        self.ccb_queue_response(id, label, signal, &Message::Accept(Response::Empty));
        for stream in streams {
            let event = if signal == SignalId::Start {
                ScbEvent::StartCmd { label }
            } else {
                ScbEvent::SuspendCmd { label }
            };
            self.scb_event(stream, event);
        }
    }

    // ---------------------------------------------------------------------
    // Inbound signaling
    // ---------------------------------------------------------------------

    /// Feed one inbound signaling packet through reassembly and dispatch.
    pub(crate) fn ccb_data(&mut self, id: CcbId, data: &Bytes) {
        let Some(ccb) = self.ccbs.get_mut(id.0) else {
            return;
        };
        let raw = match ccb.reassembler.push(data) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(err) => {
                debug!(target: "avdtp.msg", %id, error = %err, "Dropping signaling packet");
                return;
            }
        };
        match raw.cw.msg_type {
            MessageType::Command => self.ccb_command_in(id, &raw),
            _ => self.ccb_response_in(id, &raw),
        }
    }

    fn ccb_command_in(&mut self, id: CcbId, raw: &RawMessage) {
        let label = raw.cw.label;
        match Message::decode(raw) {
            Ok((_, Message::Command(cmd))) => self.ccb_route_command(id, label, cmd),
            Ok(_) => {}
            Err(MsgError::UnknownSignal(signal)) => {
                debug!(target: "avdtp.msg", %id, signal, "Unknown signal, sending general reject");
                self.ccb_send_general_reject(id, label, signal);
            }
            Err(err) => match SignalId::from_u8(raw.signal) {
                Some(signal) => {
                    debug!(target: "avdtp.msg", %id, signal = signal.as_str(), error = %err, "Malformed command");
                    self.ccb_send_reject(id, label, signal, Reject::for_decode_error(signal, &err));
                }
                None => self.ccb_send_general_reject(id, label, raw.signal),
            },
        }
    }

    fn ccb_send_general_reject(&mut self, id: CcbId, label: Label, signal: u8) {
        if let Some(ccb) = self.ccbs.get_mut(id.0) {
            ccb.rsp_queue.push_back(vec![msg::general_reject(label, signal)]);
        }
        self.ccb_event(id, CcbEvent::SendMsg);
    }

    fn ccb_response_in(&mut self, id: CcbId, raw: &RawMessage) {
        let Some(in_flight) = self.ccbs.get(id.0).and_then(|c| c.in_flight.as_ref()) else {
            debug!(target: "avdtp.msg", %id, "Response with nothing outstanding");
            return;
        };
        let signal = in_flight.signal();
        if raw.cw.label != in_flight.label {
            debug!(target: "avdtp.msg", %id, error = %MsgError::Uncorrelated, "Dropping response");
            return;
        }
        let result = if raw.cw.msg_type == MessageType::GeneralReject {
            Err(ProcedureError::GeneralReject)
        } else if raw.signal != signal as u8 {
            debug!(target: "avdtp.msg", %id, error = %MsgError::Uncorrelated, "Dropping response");
            return;
        } else {
            match Message::decode(raw) {
                Ok((_, Message::Accept(rsp))) => Ok(rsp),
                Ok((_, Message::Reject(rej))) => Err(ProcedureError::Rejected {
                    code: rej.code,
                    category: rej.category,
                    seids: rej.seids,
                }),
                Ok(_) => return,
                Err(err) => {
                    // Left to the retransmission or response timer.
                    debug!(target: "avdtp.msg", %id, error = %err, "Malformed response");
                    return;
                }
            }
        };
        self.ccb_event(id, CcbEvent::RcvRsp(Answer { signal, result }));
    }

    fn ccb_route_command(&mut self, id: CcbId, label: Label, cmd: Command) {
        let event = match cmd {
            Command::Discover => CcbEvent::DiscoverCmd { label },
            Command::GetCapabilities { acp_seid, all } => CcbEvent::GetCapCmd {
                label,
                seid: acp_seid,
                all,
            },
            Command::Start { seids } => CcbEvent::StartCmd { label, seids },
            Command::Suspend { seids } => CcbEvent::SuspendCmd { label, seids },
            other => {
                self.scb_peer_command(id, label, other);
                return;
            }
        };
        self.ccb_event(id, event);
    }
}
