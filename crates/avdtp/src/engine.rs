//! Stack engine: owns the control blocks and the adaptation layer.
//!
//! The engine is sans-IO. Application requests come in through the API
//! methods, link-layer indications through [`Avdtp::handle_link`] and timer
//! firings through [`Avdtp::on_timer`]. Each call runs every cascade it
//! triggers to completion before returning; results for the application are
//! queued as [`AvdtEvent`]s and taken with [`Avdtp::poll_event`].

use crate::ad::{Adaptation, Incoming, TcRef};
use crate::ccb::{Ccb, CcbEvent, PendingCommand, Procedure};
use crate::config::Config;
use crate::errors::AvdtError;
use crate::events::{AvdtEvent, ConfigRejection};
use crate::link::{
    Authorization, CcbTimer, LinkIndication, LinkLayer, SecurityPolicy, TimerService, TimerToken,
};
use crate::media::MediaPacket;
use crate::msg::{Command, ErrorCode, Label, StreamConfig};
use crate::observability::metrics;
use crate::registry::Registry;
use crate::scb::{EndpointConfig, Scb, ScbEvent, WriteOutcome};
use crate::types::{CcbId, ChannelType, LinkState, PeerAddr, Role, Seid, StreamHandle, StreamState};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// One protocol stack instance.
pub struct Avdtp<L: LinkLayer, T: TimerService, S: SecurityPolicy> {
    pub(crate) config: Config,
    pub(crate) link: L,
    pub(crate) timers: T,
    pub(crate) security: S,
    pub(crate) ccbs: Registry<Ccb>,
    pub(crate) scbs: Registry<Scb>,
    pub(crate) ad: Adaptation,
    pub(crate) events: VecDeque<AvdtEvent>,
}

impl<L: LinkLayer, T: TimerService, S: SecurityPolicy> Avdtp<L, T, S> {
    pub fn new(config: Config, link: L, timers: T, security: S) -> Self {
        Self {
            ccbs: Registry::with_capacity(config.max_links),
            scbs: Registry::with_capacity(config.max_endpoints),
            ad: Adaptation::new(config.max_links, config.max_endpoints),
            events: VecDeque::new(),
            config,
            link,
            timers,
            security,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    #[must_use]
    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    #[must_use]
    pub fn security_policy(&self) -> &S {
        &self.security
    }

    /// Next event for the application, oldest first.
    pub fn poll_event(&mut self) -> Option<AvdtEvent> {
        self.events.pop_front()
    }

    /// Take every queued event.
    pub fn drain_events(&mut self) -> Vec<AvdtEvent> {
        self.events.drain(..).collect()
    }

    /// Signaling controllers currently allocated.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.ccbs.len()
    }

    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.scbs.len()
    }

    /// Transport-channel slots in use, pending ones included.
    #[must_use]
    pub fn transport_channels(&self) -> usize {
        self.ad.slots_in_use()
    }

    // ---------------------------------------------------------------------
    // Endpoint registration
    // ---------------------------------------------------------------------

    /// Register a local stream endpoint. Its SEID is the slot index plus one.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if the capabilities carry no codec, `NoResources` if
    /// every endpoint slot is taken.
    pub fn register(&mut self, endpoint: EndpointConfig) -> Result<StreamHandle, AvdtError> {
        if endpoint.capabilities.codec.is_none() {
            return Err(AvdtError::InvalidParam(
                "endpoint capabilities must include a media codec".to_string(),
            ));
        }
        let slot = self
            .scbs
            .insert(Scb::new(endpoint))
            .ok_or(AvdtError::NoResources)?;
        let handle = StreamHandle(slot);
        info!(target: "avdtp.scb", stream = %handle, seid = ?handle.seid(), "Stream endpoint registered");
        Ok(handle)
    }

    /// Remove an endpoint. A stream that is not idle is removed once it
    /// returns to Idle.
    ///
    /// # Errors
    ///
    /// `BadHandle` if the endpoint does not exist.
    pub fn remove(&mut self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.require(stream)?;
        self.scb_event(stream, ScbEvent::ApiRemove);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Signaling channel
    // ---------------------------------------------------------------------

    /// Open the signaling channel to `peer` and keep it up until
    /// [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    ///
    /// `NoResources` if no signaling controller is free.
    pub fn connect(&mut self, peer: PeerAddr) -> Result<(), AvdtError> {
        let id = self.ccb_for_peer(peer)?;
        self.ccb_event(id, CcbEvent::ConnectReq);
        Ok(())
    }

    /// Close the signaling channel to `peer`, tearing down its streams first.
    ///
    /// # Errors
    ///
    /// `NotConnected` if there is no signaling controller for `peer`.
    pub fn disconnect(&mut self, peer: PeerAddr) -> Result<(), AvdtError> {
        let id = self.find_ccb(peer).ok_or(AvdtError::NotConnected)?;
        if !self.ccb_event(id, CcbEvent::DisconnectReq) {
            return Err(AvdtError::WrongState);
        }
        Ok(())
    }

    /// Discover the peer's endpoints. Completes with `DiscoverCfm`.
    ///
    /// # Errors
    ///
    /// `Busy` if a discover or get-capabilities is already outstanding on
    /// this link, `NoResources` if no signaling controller is free.
    pub fn discover(&mut self, peer: PeerAddr) -> Result<(), AvdtError> {
        let id = self.start_procedure(peer, Procedure::Discover)?;
        self.ccb_event(id, CcbEvent::DiscoverReq);
        Ok(())
    }

    /// Query one remote endpoint's capabilities. With `all` set the request
    /// asks for every category, delay reporting included.
    ///
    /// # Errors
    ///
    /// As for [`discover`](Self::discover).
    pub fn get_capabilities(&mut self, peer: PeerAddr, seid: Seid, all: bool) -> Result<(), AvdtError> {
        let id = self.start_procedure(peer, Procedure::GetCapabilities { seid })?;
        self.ccb_event(id, CcbEvent::GetCapReq { seid, all });
        Ok(())
    }

    #[must_use]
    pub fn link_state(&self, peer: PeerAddr) -> LinkState {
        self.find_ccb(peer)
            .and_then(|id| self.ccbs.get(id.0))
            .map_or(LinkState::Idle, Ccb::link_state)
    }

    // ---------------------------------------------------------------------
    // Stream procedures
    // ---------------------------------------------------------------------

    /// Configure a local endpoint against a remote one. Opens the signaling
    /// channel if needed. Completes with `SetConfigCfm`.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if `config` does not fit the local endpoint,
    /// `WrongState` unless the stream is idle, `NoResources` if no signaling
    /// controller is free.
    pub fn set_configuration(
        &mut self,
        stream: StreamHandle,
        peer: PeerAddr,
        peer_seid: Seid,
        config: StreamConfig,
    ) -> Result<(), AvdtError> {
        let scb = self.require(stream)?;
        if scb.state != StreamState::Idle || scb.in_use {
            return Err(AvdtError::WrongState);
        }
        config
            .check_against(&scb.endpoint.capabilities)
            .map_err(|err| {
                AvdtError::InvalidParam(format!(
                    "category {:#04x}: {}",
                    err.category, err.code
                ))
            })?;
        let ccb = self.ccb_for_peer(peer)?;
        self.api_event(
            stream,
            ScbEvent::ApiSetConfigReq {
                ccb,
                peer_seid,
                config,
            },
        )
    }

    /// Answer a `ConfigInd`.
    ///
    /// # Errors
    ///
    /// `BadHandle` or `WrongState` if no configuration is awaiting an answer.
    pub fn config_response(
        &mut self,
        stream: StreamHandle,
        label: Label,
        result: Result<(), ConfigRejection>,
    ) -> Result<(), AvdtError> {
        let scb = self.require(stream)?;
        if scb.state != StreamState::Idle || scb.req_cfg.is_none() {
            return Err(AvdtError::WrongState);
        }
        self.api_event(stream, ScbEvent::ApiSetConfigRsp { label, result })
    }

    /// Read the configuration back from the peer. Completes with
    /// `GetConfigCfm`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` unless the stream is configured.
    pub fn get_configuration(&mut self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiGetConfigReq)
    }

    /// Open the media transport. Completes with `OpenCfm`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` unless the stream is configured.
    pub fn open(&mut self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiOpenReq)
    }

    /// Start streaming on every listed stream with one command. All streams
    /// must be open and share a link. Completes with one `StartCfm` per
    /// stream.
    ///
    /// # Errors
    ///
    /// `StreamsNotReady` listing every stream that is unknown, not open or
    /// on another link; `WrongState` if the link is not open.
    pub fn start(&mut self, streams: &[StreamHandle]) -> Result<(), AvdtError> {
        let (ccb, seids) = self.check_ready(streams, StreamState::Open)?;
        let cmd = PendingCommand::new(Command::Start { seids }, streams.to_vec());
        if !self.ccb_event(ccb, CcbEvent::StartReq(cmd)) {
            return Err(AvdtError::WrongState);
        }
        Ok(())
    }

    /// Suspend every listed stream with one command. Completes with one
    /// `SuspendCfm` per stream.
    ///
    /// # Errors
    ///
    /// As for [`start`](Self::start), with streaming as the required state.
    pub fn suspend(&mut self, streams: &[StreamHandle]) -> Result<(), AvdtError> {
        let (ccb, seids) = self.check_ready(streams, StreamState::Streaming)?;
        let cmd = PendingCommand::new(Command::Suspend { seids }, streams.to_vec());
        if !self.ccb_event(ccb, CcbEvent::SuspendReq(cmd)) {
            return Err(AvdtError::WrongState);
        }
        Ok(())
    }

    /// Close the stream. Completes with `CloseCfm` once the transport is
    /// down.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` unless the stream is open or streaming.
    pub fn close(&mut self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiCloseReq)
    }

    /// Abort the stream. Completes with `AbortCfm`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` if the stream is idle.
    pub fn abort(&mut self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiAbortReq)
    }

    /// Change codec or content protection of an open stream. Completes with
    /// `ReconfigCfm`.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if `config` names other categories, `WrongState`
    /// unless the stream is open.
    pub fn reconfigure(&mut self, stream: StreamHandle, config: StreamConfig) -> Result<(), AvdtError> {
        config.check_reconfigurable().map_err(|err| {
            AvdtError::InvalidParam(format!(
                "category {:#04x} cannot be reconfigured",
                err.category
            ))
        })?;
        self.api_event(stream, ScbEvent::ApiReconfigReq { config })
    }

    /// Answer a `ReconfigInd`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` if no reconfiguration awaits an answer.
    pub fn reconfigure_response(
        &mut self,
        stream: StreamHandle,
        label: Label,
        result: Result<(), ConfigRejection>,
    ) -> Result<(), AvdtError> {
        if self.require(stream)?.req_cfg.is_none() {
            return Err(AvdtError::WrongState);
        }
        self.api_event(stream, ScbEvent::ApiReconfigRsp { label, result })
    }

    /// Send content-protection data to the peer. Completes with
    /// `SecurityCfm`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` if the stream is not configured.
    pub fn security(&mut self, stream: StreamHandle, data: Bytes) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiSecurityReq { data })
    }

    /// Answer a `SecurityInd`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` if the stream is not configured.
    pub fn security_response(
        &mut self,
        stream: StreamHandle,
        label: Label,
        result: Result<Bytes, ErrorCode>,
    ) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiSecurityRsp { label, result })
    }

    /// Report sink delay to the peer, in 1/10 ms. Completes with
    /// `DelayReportCfm`.
    ///
    /// # Errors
    ///
    /// `BadHandle`, or `WrongState` if the stream is not configured.
    pub fn delay_report(&mut self, stream: StreamHandle, delay: u16) -> Result<(), AvdtError> {
        self.api_event(stream, ScbEvent::ApiDelayReportReq { delay })
    }

    /// Send one media packet on a streaming stream.
    ///
    /// # Errors
    ///
    /// `BadHandle` if the endpoint does not exist.
    pub fn write(&mut self, stream: StreamHandle, packet: MediaPacket) -> Result<WriteOutcome, AvdtError> {
        self.require(stream)?;
        if !self.scb_event(stream, ScbEvent::ApiWriteReq(packet)) {
            metrics::record_media_dropped("state");
            return Ok(WriteOutcome::Dropped);
        }
        Ok(self
            .scbs
            .get(stream.0)
            .map_or(WriteOutcome::Dropped, |scb| scb.last_write))
    }

    #[must_use]
    pub fn stream_state(&self, stream: StreamHandle) -> Option<StreamState> {
        self.scbs.get(stream.0).map(|scb| scb.state)
    }

    /// Negotiated configuration of a stream.
    #[must_use]
    pub fn stream_config(&self, stream: StreamHandle) -> Option<&StreamConfig> {
        self.scbs.get(stream.0).map(|scb| &scb.curr_cfg)
    }

    /// Peer endpoint a stream is paired with.
    #[must_use]
    pub fn stream_peer(&self, stream: StreamHandle) -> Option<(PeerAddr, Seid)> {
        let scb = self.scbs.get(stream.0)?;
        let peer = self.ccbs.get(scb.ccb?.0)?.peer;
        Some((peer, scb.peer_seid?))
    }

    // ---------------------------------------------------------------------
    // Link-layer and timer entry points
    // ---------------------------------------------------------------------

    /// Feed one link-layer indication into the stack.
    pub fn handle_link(&mut self, indication: LinkIndication) {
        match indication {
            LinkIndication::ConnectInd { peer, lcid } => {
                let Ok(ccb) = self.ccb_for_peer(peer) else {
                    debug!(target: "avdtp.ad", %peer, %lcid, "No signaling controller for inbound connection");
                    self.link.connect_rsp(lcid, false);
                    return;
                };
                match self.ad.connect_ind(&mut self.link, ccb, peer, lcid) {
                    Incoming::Matched(tc) => {
                        match self.security.authorize(peer, tc.channel, Role::Acceptor) {
                            Authorization::Allow => self.acceptor_decision(lcid, true),
                            Authorization::Deny => self.acceptor_decision(lcid, false),
                            Authorization::Pending => {
                                debug!(target: "avdtp.ad", %lcid, "Awaiting security decision");
                            }
                        }
                    }
                    Incoming::Refused => self.release_if_unused(ccb),
                }
            }
            LinkIndication::ConnectCfm { lcid, success } => {
                let Some(tc) = self.ad.connect_cfm(lcid, success) else {
                    return;
                };
                if !success {
                    warn!(target: "avdtp.ad", %lcid, channel = tc.channel.as_str(), "Connect request failed");
                    self.tc_closed(tc);
                    return;
                }
                match self.security.authorize(tc.peer, tc.channel, Role::Initiator) {
                    Authorization::Allow => self.initiator_decision(lcid, true),
                    Authorization::Deny => self.initiator_decision(lcid, false),
                    Authorization::Pending => {
                        debug!(target: "avdtp.ad", %lcid, "Awaiting security decision");
                    }
                }
            }
            LinkIndication::SecurityComplete { lcid, granted } => match self.ad.state(lcid) {
                Some(crate::ad::TcState::SecurityAcceptor) => self.acceptor_decision(lcid, granted),
                Some(crate::ad::TcState::SecurityInitiator) => self.initiator_decision(lcid, granted),
                _ => debug!(target: "avdtp.ad", %lcid, "Security result for unknown channel"),
            },
            LinkIndication::ConfigComplete { lcid, peer_mtu } => {
                if let Some(tc) = self.ad.config_complete(lcid, peer_mtu) {
                    self.tc_opened(tc);
                }
            }
            LinkIndication::Disconnected { lcid } => {
                if let Some((tc, _)) = self.ad.disconnected(lcid) {
                    self.tc_closed(tc);
                }
            }
            LinkIndication::Congestion { lcid, congested } => {
                let Some(tc) = self.ad.route(lcid) else {
                    return;
                };
                match (tc.channel, tc.scb) {
                    (ChannelType::Signaling, _) => {
                        self.ccb_event(tc.ccb, CcbEvent::LlCong(congested));
                    }
                    (ChannelType::Media, Some(stream)) => {
                        self.scb_event(stream, ScbEvent::TcCong(congested));
                    }
                    _ => {}
                }
            }
            LinkIndication::Data { lcid, data } => {
                let Some(tc) = self.ad.route(lcid) else {
                    debug!(target: "avdtp.ad", %lcid, "Data on unknown channel");
                    return;
                };
                match (tc.channel, tc.scb) {
                    (ChannelType::Signaling, _) => self.ccb_data(tc.ccb, &data),
                    (ChannelType::Media, Some(stream)) => {
                        self.scb_event(stream, ScbEvent::TcData(data));
                    }
                    (ChannelType::Reporting, Some(stream)) => {
                        self.events.push_back(AvdtEvent::ReportData { stream, data });
                    }
                    _ => {}
                }
            }
        }
    }

    /// A timer armed through the [`TimerService`] fired.
    pub fn on_timer(&mut self, token: TimerToken) {
        match token {
            TimerToken::Signaling { ccb, kind } => {
                let live = match self.ccbs.get_mut(ccb.0) {
                    Some(c) if c.timer == Some(kind) => {
                        c.timer = None;
                        true
                    }
                    _ => false,
                };
                if !live {
                    metrics::record_timer_stale("signaling");
                    debug!(target: "avdtp.ccb", id = %ccb, ?kind, "Stale timer ignored");
                    return;
                }
                let event = match kind {
                    CcbTimer::Idle => CcbEvent::IdleTimeout,
                    CcbTimer::Retransmit => CcbEvent::RetransmitTimeout,
                    CcbTimer::Response => CcbEvent::ResponseTimeout,
                };
                self.ccb_event(ccb, event);
            }
            TimerToken::Transport { stream } => {
                let live = match self.scbs.get_mut(stream.0) {
                    Some(scb) if scb.tc_timer => {
                        scb.tc_timer = false;
                        true
                    }
                    _ => false,
                };
                if !live {
                    metrics::record_timer_stale("transport");
                    debug!(target: "avdtp.scb", %stream, "Stale timer ignored");
                    return;
                }
                self.scb_event(stream, ScbEvent::TcTimeout);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn require(&self, stream: StreamHandle) -> Result<&Scb, AvdtError> {
        self.scbs.get(stream.0).ok_or(AvdtError::BadHandle)
    }

    fn api_event(&mut self, stream: StreamHandle, event: ScbEvent) -> Result<(), AvdtError> {
        self.require(stream)?;
        if self.scb_event(stream, event) {
            Ok(())
        } else {
            Err(AvdtError::WrongState)
        }
    }

    fn find_ccb(&self, peer: PeerAddr) -> Option<CcbId> {
        self.ccbs.find(|c| c.peer == peer).map(CcbId)
    }

    /// Signaling controller for `peer`, allocating one if needed.
    fn ccb_for_peer(&mut self, peer: PeerAddr) -> Result<CcbId, AvdtError> {
        if let Some(id) = self.find_ccb(peer) {
            return Ok(id);
        }
        let max_message = self.config.max_signaling_message;
        let slot = self
            .ccbs
            .insert(Ccb::new(peer, max_message))
            .ok_or(AvdtError::NoResources)?;
        debug!(target: "avdtp.ccb", id = %CcbId(slot), %peer, "Signaling controller allocated");
        Ok(CcbId(slot))
    }

    /// A controller allocated for an inbound connection that came to nothing.
    fn release_if_unused(&mut self, id: CcbId) {
        let unused = self
            .ccbs
            .get(id.0)
            .is_some_and(|c| c.state == crate::ccb::CcbState::Idle)
            && !self.ad.has_slot(id, ChannelType::Signaling, None);
        if unused {
            self.ccb_event(id, CcbEvent::LlClose);
        }
    }

    fn start_procedure(&mut self, peer: PeerAddr, procedure: Procedure) -> Result<CcbId, AvdtError> {
        let id = self.ccb_for_peer(peer)?;
        let ccb = self.ccbs.get_mut(id.0).ok_or(AvdtError::NoResources)?;
        if ccb.procedure.is_some() {
            return Err(AvdtError::Busy);
        }
        ccb.procedure = Some(procedure);
        Ok(id)
    }

    /// Every stream must exist, be in `required` and share one open link.
    fn check_ready(
        &self,
        streams: &[StreamHandle],
        required: StreamState,
    ) -> Result<(CcbId, Vec<Seid>), AvdtError> {
        let link = streams
            .first()
            .and_then(|h| self.scbs.get(h.0))
            .and_then(|scb| scb.ccb);
        let mut seids = Vec::with_capacity(streams.len());
        let mut offenders = Vec::new();
        for stream in streams {
            let ready = self.scbs.get(stream.0).and_then(|scb| {
                (scb.state == required && scb.ccb.is_some() && scb.ccb == link)
                    .then_some(scb.peer_seid)
                    .flatten()
            });
            match ready {
                Some(seid) => seids.push(seid),
                None => offenders.push(*stream),
            }
        }
        if !offenders.is_empty() {
            return Err(AvdtError::StreamsNotReady(offenders));
        }
        match link {
            Some(ccb) if !seids.is_empty() => Ok((ccb, seids)),
            _ => Err(AvdtError::InvalidParam("no streams given".to_string())),
        }
    }

    fn acceptor_decision(&mut self, lcid: crate::types::Lcid, granted: bool) {
        if let Some(tc) = self.ad.accept_decision(&mut self.link, lcid, granted) {
            warn!(target: "avdtp.ad", %lcid, peer = %tc.peer, channel = tc.channel.as_str(), "Inbound channel denied");
            self.tc_closed(tc);
        }
    }

    fn initiator_decision(&mut self, lcid: crate::types::Lcid, granted: bool) {
        if !granted {
            warn!(target: "avdtp.ad", %lcid, "Outbound channel denied by security policy");
        }
        if let Some(tc) = self.ad.initiator_decision(&mut self.link, lcid, granted) {
            self.tc_opened(tc);
        }
    }

    fn tc_opened(&mut self, tc: TcRef) {
        match (tc.channel, tc.scb) {
            (ChannelType::Signaling, _) => {
                if let Some(ccb) = self.ccbs.get_mut(tc.ccb.0) {
                    ccb.peer_mtu = tc.peer_mtu;
                }
                metrics::record_transport_opened(ChannelType::Signaling.as_str());
                self.ccb_event(tc.ccb, CcbEvent::LlOpen);
            }
            (ChannelType::Media, Some(stream)) => {
                if !self.scb_event(stream, ScbEvent::TcOpen { peer_mtu: tc.peer_mtu }) {
                    debug!(target: "avdtp.scb", %stream, "Media channel not expected, closing");
                    self.ad
                        .close(&mut self.link, tc.ccb, ChannelType::Media, Some(stream));
                }
            }
            (ChannelType::Reporting, Some(stream)) => {
                metrics::record_transport_opened(ChannelType::Reporting.as_str());
                debug!(target: "avdtp.scb", %stream, mtu = tc.peer_mtu, "Reporting channel open");
            }
            _ => {}
        }
    }

    fn tc_closed(&mut self, tc: TcRef) {
        match (tc.channel, tc.scb) {
            (ChannelType::Signaling, _) => {
                self.ccb_event(tc.ccb, CcbEvent::LlClose);
            }
            (ChannelType::Media, Some(stream)) => {
                self.scb_event(stream, ScbEvent::TcClose);
            }
            (ChannelType::Reporting, Some(stream)) => {
                debug!(target: "avdtp.scb", %stream, "Reporting channel closed");
            }
            _ => {}
        }
    }
}

impl<L: LinkLayer, T: TimerService, S: SecurityPolicy> std::fmt::Debug for Avdtp<L, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Avdtp")
            .field("links", &self.ccbs.len())
            .field("endpoints", &self.scbs.len())
            .field("transport_slots", &self.ad.slots_in_use())
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}
