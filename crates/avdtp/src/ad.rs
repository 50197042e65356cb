//! Adaptation layer: multiplexes logical channels onto link-layer channels.
//!
//! A fixed pool of transport-channel slots tracks every link-layer channel
//! the stack owns or expects. The routing table maps (link, TCID) to the
//! channel id and the owning stream, and an LCID index gives O(1)
//! demultiplexing of inbound traffic. A slot's state and its routing entry
//! are only ever changed together, inside a single call.
//!
//! TCIDs: 0 is the signaling channel of a link; stream endpoint `n` (slot
//! index) owns media TCID `1 + 2n` and reporting TCID `2 + 2n`.

use crate::errors::ProcedureError;
use crate::link::{ChannelParams, LinkLayer, WriteResult};
use crate::types::{CcbId, ChannelType, Lcid, PeerAddr, Role, StreamHandle};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Lifecycle of one transport-channel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcState {
    /// Waiting for the peer to connect this channel.
    Accepting,
    /// Connect request sent, waiting for the confirm.
    Initiating,
    /// Connected as initiator, security decision outstanding.
    SecurityInitiator,
    /// Connect indication received, security decision outstanding.
    SecurityAcceptor,
    /// Connected, waiting for configuration to complete.
    Configuring,
    Open,
    /// Disconnect requested, waiting for the indication.
    Closing,
}

#[derive(Debug, Clone)]
pub struct TcSlot {
    pub state: TcState,
    pub ccb: CcbId,
    pub peer: PeerAddr,
    pub channel: ChannelType,
    pub tcid: u8,
    pub scb: Option<StreamHandle>,
    pub role: Role,
    pub lcid: Option<Lcid>,
    pub peer_mtu: u16,
    config_done: bool,
}

/// Snapshot of a slot handed back to the engine for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcRef {
    pub ccb: CcbId,
    pub peer: PeerAddr,
    pub channel: ChannelType,
    pub scb: Option<StreamHandle>,
    pub role: Role,
    pub peer_mtu: u16,
}

impl From<&TcSlot> for TcRef {
    fn from(slot: &TcSlot) -> Self {
        Self {
            ccb: slot.ccb,
            peer: slot.peer,
            channel: slot.channel,
            scb: slot.scb,
            role: slot.role,
            peer_mtu: slot.peer_mtu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Route {
    lcid: Lcid,
    scb: Option<StreamHandle>,
}

/// Result of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// A disconnect indication will follow.
    Pending,
    /// Nothing was connected; the caller treats the channel as closed now.
    Immediate,
}

/// Result of classifying an inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// Matched to a slot; the engine decides on security next.
    Matched(TcRef),
    /// No slot expects this connection; it has been refused.
    Refused,
}

#[derive(Debug)]
pub struct Adaptation {
    slots: Vec<Option<TcSlot>>,
    routes: Vec<Vec<Option<Route>>>,
    lcids: HashMap<Lcid, usize>,
}

impl Adaptation {
    #[must_use]
    pub fn new(max_links: usize, max_endpoints: usize) -> Self {
        let tcids = 1 + 2 * max_endpoints;
        Self {
            slots: vec![None; max_links * tcids],
            routes: vec![vec![None; tcids]; max_links],
            lcids: HashMap::new(),
        }
    }

    #[must_use]
    pub fn tcid(channel: ChannelType, scb: Option<StreamHandle>) -> u8 {
        let index = scb.map_or(0, |h| h.0.index);
        let tcid = match channel {
            ChannelType::Signaling => 0,
            ChannelType::Media => 1 + 2 * index,
            ChannelType::Reporting => 2 + 2 * index,
        };
        u8::try_from(tcid).unwrap_or(u8::MAX)
    }

    fn find(&self, ccb: CcbId, tcid: u8) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|slot| slot.ccb == ccb && slot.tcid == tcid)
        })
    }

    fn alloc(&mut self, slot: TcSlot) -> Result<usize, ProcedureError> {
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ProcedureError::NoResources)?;
        if let Some(entry) = self.slots.get_mut(free) {
            *entry = Some(slot);
        }
        Ok(free)
    }

    fn free(&mut self, index: usize) -> Option<TcSlot> {
        let slot = self.slots.get_mut(index)?.take()?;
        if let Some(lcid) = slot.lcid {
            self.lcids.remove(&lcid);
        }
        if let Some(route) = self
            .routes
            .get_mut(slot.ccb.0.index)
            .and_then(|r| r.get_mut(usize::from(slot.tcid)))
        {
            *route = None;
        }
        Some(slot)
    }

    fn slot_by_lcid(&mut self, lcid: Lcid) -> Option<(usize, &mut TcSlot)> {
        let index = *self.lcids.get(&lcid)?;
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .map(|slot| (index, slot))
    }

    /// Connect a channel as initiator.
    ///
    /// # Errors
    ///
    /// `NoResources` when the pool is exhausted, `Transport` when the link
    /// layer refuses the request.
    pub fn open_initiator(
        &mut self,
        link: &mut impl LinkLayer,
        ccb: CcbId,
        peer: PeerAddr,
        scb: Option<StreamHandle>,
        params: &ChannelParams,
    ) -> Result<Lcid, ProcedureError> {
        let tcid = Self::tcid(params.channel, scb);
        if self.find(ccb, tcid).is_some() {
            return Err(ProcedureError::Transport);
        }
        let index = self.alloc(TcSlot {
            state: TcState::Initiating,
            ccb,
            peer,
            channel: params.channel,
            tcid,
            scb,
            role: Role::Initiator,
            lcid: None,
            peer_mtu: 0,
            config_done: false,
        })?;

        let Some(lcid) = link.connect_req(peer, params) else {
            self.free(index);
            warn!(
                target: "avdtp.ad",
                %peer,
                channel = params.channel.as_str(),
                "Link layer refused connect request"
            );
            return Err(ProcedureError::Transport);
        };
        if let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) {
            slot.lcid = Some(lcid);
        }
        self.lcids.insert(lcid, index);
        debug!(target: "avdtp.ad", %peer, %lcid, tcid, "Connecting transport channel");
        Ok(lcid)
    }

    /// Reserve a slot for a channel the peer is expected to connect.
    ///
    /// # Errors
    ///
    /// `NoResources` when the pool is exhausted.
    pub fn open_acceptor(
        &mut self,
        ccb: CcbId,
        peer: PeerAddr,
        channel: ChannelType,
        scb: Option<StreamHandle>,
    ) -> Result<(), ProcedureError> {
        let tcid = Self::tcid(channel, scb);
        if self.find(ccb, tcid).is_some() {
            return Ok(());
        }
        self.alloc(TcSlot {
            state: TcState::Accepting,
            ccb,
            peer,
            channel,
            tcid,
            scb,
            role: Role::Acceptor,
            lcid: None,
            peer_mtu: 0,
            config_done: false,
        })?;
        Ok(())
    }

    /// Close the channel for (link, channel, stream).
    pub fn close(
        &mut self,
        link: &mut impl LinkLayer,
        ccb: CcbId,
        channel: ChannelType,
        scb: Option<StreamHandle>,
    ) -> CloseOutcome {
        let Some(index) = self.find(ccb, Self::tcid(channel, scb)) else {
            return CloseOutcome::Immediate;
        };
        let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            return CloseOutcome::Immediate;
        };
        match (slot.state, slot.lcid) {
            (TcState::Closing, _) => CloseOutcome::Pending,
            (TcState::Accepting, _) | (_, None) => {
                self.free(index);
                CloseOutcome::Immediate
            }
            (_, Some(lcid)) => {
                slot.state = TcState::Closing;
                link.disconnect_req(lcid);
                debug!(target: "avdtp.ad", %lcid, channel = channel.as_str(), "Closing transport channel");
                CloseOutcome::Pending
            }
        }
    }

    /// Free a slot without waiting for its disconnect indication. A late
    /// indication for the channel id is then ignored.
    pub fn forget(&mut self, ccb: CcbId, channel: ChannelType, scb: Option<StreamHandle>) {
        if let Some(index) = self.find(ccb, Self::tcid(channel, scb)) {
            self.free(index);
        }
    }

    /// Drop every slot owned by a link, disconnecting anything still up.
    pub fn release_link(&mut self, link: &mut impl LinkLayer, ccb: CcbId) {
        let owned: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_ref().is_some_and(|slot| slot.ccb == ccb))
            .map(|(i, _)| i)
            .collect();
        for index in owned {
            if let Some(slot) = self.free(index) {
                if let (Some(lcid), false) = (slot.lcid, slot.state == TcState::Closing) {
                    link.disconnect_req(lcid);
                }
            }
        }
    }

    /// Classify an inbound connection from a peer whose link is `ccb`.
    ///
    /// The first channel of a link is its signaling channel; later ones go to
    /// the lowest-TCID slot of that link waiting in `Accepting`.
    pub fn connect_ind(
        &mut self,
        link: &mut impl LinkLayer,
        ccb: CcbId,
        peer: PeerAddr,
        lcid: Lcid,
    ) -> Incoming {
        let index = if self.find(ccb, 0).is_none() {
            self.alloc(TcSlot {
                state: TcState::SecurityAcceptor,
                ccb,
                peer,
                channel: ChannelType::Signaling,
                tcid: 0,
                scb: None,
                role: Role::Acceptor,
                lcid: None,
                peer_mtu: 0,
                config_done: false,
            })
            .ok()
        } else {
            self.slots
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.as_ref().map(|slot| (i, slot)))
                .filter(|(_, slot)| slot.ccb == ccb && slot.state == TcState::Accepting)
                .min_by_key(|(_, slot)| slot.tcid)
                .map(|(i, _)| i)
        };

        let Some(index) = index else {
            debug!(target: "avdtp.ad", %peer, %lcid, "No slot expects this connection");
            link.connect_rsp(lcid, false);
            return Incoming::Refused;
        };
        let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            link.connect_rsp(lcid, false);
            return Incoming::Refused;
        };
        slot.state = TcState::SecurityAcceptor;
        slot.lcid = Some(lcid);
        let tc = TcRef::from(&*slot);
        self.lcids.insert(lcid, index);
        Incoming::Matched(tc)
    }

    /// Outcome of the security check on an accepted connection.
    ///
    /// Returns the slot if it was freed because access was denied.
    pub fn accept_decision(
        &mut self,
        link: &mut impl LinkLayer,
        lcid: Lcid,
        granted: bool,
    ) -> Option<TcRef> {
        let (index, slot) = self.slot_by_lcid(lcid)?;
        if slot.state != TcState::SecurityAcceptor {
            return None;
        }
        link.connect_rsp(lcid, granted);
        if granted {
            slot.state = TcState::Configuring;
            return None;
        }
        let tc = TcRef::from(&*slot);
        self.free(index);
        Some(tc)
    }

    /// Confirm of our connect request. On success the slot waits for the
    /// security decision; on failure it is freed.
    pub fn connect_cfm(&mut self, lcid: Lcid, success: bool) -> Option<TcRef> {
        let (index, slot) = self.slot_by_lcid(lcid)?;
        if slot.state != TcState::Initiating {
            return None;
        }
        let tc = TcRef::from(&*slot);
        if success {
            slot.state = TcState::SecurityInitiator;
        } else {
            self.free(index);
        }
        Some(tc)
    }

    /// Outcome of the security check on an initiated connection. Returns the
    /// slot once it is open (configuration may already have completed).
    pub fn initiator_decision(
        &mut self,
        link: &mut impl LinkLayer,
        lcid: Lcid,
        granted: bool,
    ) -> Option<TcRef> {
        let (_, slot) = self.slot_by_lcid(lcid)?;
        if slot.state != TcState::SecurityInitiator {
            return None;
        }
        if !granted {
            slot.state = TcState::Closing;
            link.disconnect_req(lcid);
            return None;
        }
        if slot.config_done {
            return self.mark_open(lcid);
        }
        slot.state = TcState::Configuring;
        None
    }

    /// Current slot state for a channel id.
    #[must_use]
    pub fn state(&self, lcid: Lcid) -> Option<TcState> {
        let index = *self.lcids.get(&lcid)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .map(|s| s.state)
    }

    /// Configuration finished. Returns the slot if it just became open.
    pub fn config_complete(&mut self, lcid: Lcid, peer_mtu: u16) -> Option<TcRef> {
        let (_, slot) = self.slot_by_lcid(lcid)?;
        slot.peer_mtu = peer_mtu;
        match slot.state {
            TcState::Configuring => self.mark_open(lcid),
            TcState::SecurityInitiator => {
                slot.config_done = true;
                None
            }
            _ => None,
        }
    }

    fn mark_open(&mut self, lcid: Lcid) -> Option<TcRef> {
        let (_, slot) = self.slot_by_lcid(lcid)?;
        slot.state = TcState::Open;
        let tc = TcRef::from(&*slot);
        let (ccb_index, tcid) = (slot.ccb.0.index, usize::from(slot.tcid));
        if let Some(route) = self.routes.get_mut(ccb_index).and_then(|r| r.get_mut(tcid)) {
            *route = Some(Route {
                lcid,
                scb: tc.scb,
            });
        }
        debug!(target: "avdtp.ad", %lcid, channel = tc.channel.as_str(), "Transport channel open");
        Some(tc)
    }

    /// Channel closed. Returns the freed slot and whether it had been open.
    pub fn disconnected(&mut self, lcid: Lcid) -> Option<(TcRef, bool)> {
        let index = *self.lcids.get(&lcid)?;
        let slot = self.free(index)?;
        let was_open = matches!(slot.state, TcState::Open | TcState::Closing);
        Some((TcRef::from(&slot), was_open))
    }

    /// Route an inbound packet or congestion change.
    #[must_use]
    pub fn route(&self, lcid: Lcid) -> Option<TcRef> {
        let index = *self.lcids.get(&lcid)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .filter(|s| s.state == TcState::Open)
            .map(TcRef::from)
    }

    /// Write one packet on (link, channel, stream).
    pub fn write(
        &self,
        link: &mut impl LinkLayer,
        ccb: CcbId,
        channel: ChannelType,
        scb: Option<StreamHandle>,
        data: Bytes,
    ) -> WriteResult {
        let route = self
            .routes
            .get(ccb.0.index)
            .and_then(|r| r.get(usize::from(Self::tcid(channel, scb))))
            .copied()
            .flatten();
        match route {
            Some(route) if route.scb == scb => link.data_write(route.lcid, data),
            _ => WriteResult::Failed,
        }
    }

    /// Whether (link, channel, stream) has any slot at all.
    #[must_use]
    pub fn has_slot(&self, ccb: CcbId, channel: ChannelType, scb: Option<StreamHandle>) -> bool {
        self.find(ccb, Self::tcid(channel, scb)).is_some()
    }

    #[must_use]
    pub fn slots_in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::SlotId;

    #[derive(Default)]
    struct FakeLink {
        next: u16,
        refuse: bool,
        disconnects: Vec<Lcid>,
        responses: Vec<(Lcid, bool)>,
        writes: Vec<(Lcid, Bytes)>,
    }

    impl LinkLayer for FakeLink {
        fn connect_req(&mut self, _peer: PeerAddr, _params: &ChannelParams) -> Option<Lcid> {
            if self.refuse {
                return None;
            }
            self.next += 1;
            Some(Lcid(0x40 + self.next))
        }
        fn connect_rsp(&mut self, lcid: Lcid, accept: bool) {
            self.responses.push((lcid, accept));
        }
        fn disconnect_req(&mut self, lcid: Lcid) {
            self.disconnects.push(lcid);
        }
        fn data_write(&mut self, lcid: Lcid, data: Bytes) -> WriteResult {
            self.writes.push((lcid, data));
            WriteResult::Accepted
        }
    }

    const PEER: PeerAddr = PeerAddr([1, 2, 3, 4, 5, 6]);

    fn ccb(index: usize) -> CcbId {
        CcbId(SlotId {
            index,
            generation: 0,
        })
    }

    fn scb(index: usize) -> StreamHandle {
        StreamHandle(SlotId {
            index,
            generation: 0,
        })
    }

    fn params(channel: ChannelType) -> ChannelParams {
        ChannelParams {
            channel,
            mtu: 672,
            flush_timeout: 0xFFFF,
        }
    }

    fn open_signaling(ad: &mut Adaptation, link: &mut FakeLink) -> Lcid {
        let lcid = ad
            .open_initiator(link, ccb(0), PEER, None, &params(ChannelType::Signaling))
            .unwrap();
        ad.connect_cfm(lcid, true).unwrap();
        assert!(ad.initiator_decision(link, lcid, true).is_none());
        ad.config_complete(lcid, 48).expect("opens");
        lcid
    }

    #[test]
    fn test_tcid_layout() {
        assert_eq!(Adaptation::tcid(ChannelType::Signaling, None), 0);
        assert_eq!(Adaptation::tcid(ChannelType::Media, Some(scb(0))), 1);
        assert_eq!(Adaptation::tcid(ChannelType::Reporting, Some(scb(0))), 2);
        assert_eq!(Adaptation::tcid(ChannelType::Media, Some(scb(3))), 7);
    }

    #[test]
    fn test_initiator_lifecycle_routes_writes() {
        let mut ad = Adaptation::new(1, 2);
        let mut link = FakeLink::default();
        let lcid = open_signaling(&mut ad, &mut link);

        assert_eq!(ad.state(lcid), Some(TcState::Open));
        assert_eq!(ad.route(lcid).unwrap().channel, ChannelType::Signaling);
        let result = ad.write(
            &mut link,
            ccb(0),
            ChannelType::Signaling,
            None,
            Bytes::from_static(b"x"),
        );
        assert_eq!(result, WriteResult::Accepted);
        assert_eq!(link.writes.len(), 1);

        assert_eq!(
            ad.close(&mut link, ccb(0), ChannelType::Signaling, None),
            CloseOutcome::Pending
        );
        assert_eq!(link.disconnects, vec![lcid]);
        let (tc, was_open) = ad.disconnected(lcid).unwrap();
        assert!(was_open);
        assert_eq!(tc.ccb, ccb(0));
        assert_eq!(ad.slots_in_use(), 0);
        assert_eq!(
            ad.write(&mut link, ccb(0), ChannelType::Signaling, None, Bytes::new()),
            WriteResult::Failed
        );
    }

    #[test]
    fn test_config_before_security_opens_on_grant() {
        let mut ad = Adaptation::new(1, 1);
        let mut link = FakeLink::default();
        let lcid = ad
            .open_initiator(&mut link, ccb(0), PEER, None, &params(ChannelType::Signaling))
            .unwrap();
        ad.connect_cfm(lcid, true).unwrap();
        assert!(ad.config_complete(lcid, 100).is_none());
        let tc = ad.initiator_decision(&mut link, lcid, true).unwrap();
        assert_eq!(tc.peer_mtu, 100);
        assert_eq!(ad.state(lcid), Some(TcState::Open));
    }

    #[test]
    fn test_refused_connect_frees_slot() {
        let mut ad = Adaptation::new(1, 1);
        let mut link = FakeLink {
            refuse: true,
            ..FakeLink::default()
        };
        let err = ad
            .open_initiator(&mut link, ccb(0), PEER, None, &params(ChannelType::Signaling))
            .unwrap_err();
        assert_eq!(err, ProcedureError::Transport);
        assert_eq!(ad.slots_in_use(), 0);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut ad = Adaptation::new(1, 0);
        let mut link = FakeLink::default();
        ad.open_initiator(&mut link, ccb(0), PEER, None, &params(ChannelType::Signaling))
            .unwrap();
        let err = ad
            .open_acceptor(ccb(0), PEER, ChannelType::Media, Some(scb(0)))
            .unwrap_err();
        assert_eq!(err, ProcedureError::NoResources);
    }

    #[test]
    fn test_inbound_classification_by_order() {
        let mut ad = Adaptation::new(1, 2);
        let mut link = FakeLink::default();

        // first connection from a peer is signaling
        let Incoming::Matched(tc) = ad.connect_ind(&mut link, ccb(0), PEER, Lcid(0x80)) else {
            panic!("signaling should match");
        };
        assert_eq!(tc.channel, ChannelType::Signaling);
        assert!(ad.accept_decision(&mut link, Lcid(0x80), true).is_none());
        ad.config_complete(Lcid(0x80), 672).unwrap();

        // nothing expected yet: refused
        assert_eq!(
            ad.connect_ind(&mut link, ccb(0), PEER, Lcid(0x81)),
            Incoming::Refused
        );
        assert_eq!(link.responses.last(), Some(&(Lcid(0x81), false)));

        // media before report, lowest TCID first
        ad.open_acceptor(ccb(0), PEER, ChannelType::Reporting, Some(scb(1)))
            .unwrap();
        ad.open_acceptor(ccb(0), PEER, ChannelType::Media, Some(scb(1)))
            .unwrap();
        let Incoming::Matched(tc) = ad.connect_ind(&mut link, ccb(0), PEER, Lcid(0x82)) else {
            panic!("media should match");
        };
        assert_eq!(tc.channel, ChannelType::Media);
        assert_eq!(tc.scb, Some(scb(1)));
    }

    #[test]
    fn test_denied_acceptor_is_freed() {
        let mut ad = Adaptation::new(1, 1);
        let mut link = FakeLink::default();
        ad.connect_ind(&mut link, ccb(0), PEER, Lcid(0x90));
        let tc = ad.accept_decision(&mut link, Lcid(0x90), false).unwrap();
        assert_eq!(tc.channel, ChannelType::Signaling);
        assert_eq!(link.responses, vec![(Lcid(0x90), false)]);
        assert_eq!(ad.slots_in_use(), 0);
    }

    #[test]
    fn test_close_of_accepting_slot_is_immediate() {
        let mut ad = Adaptation::new(1, 1);
        let mut link = FakeLink::default();
        ad.open_acceptor(ccb(0), PEER, ChannelType::Media, Some(scb(0)))
            .unwrap();
        assert_eq!(
            ad.close(&mut link, ccb(0), ChannelType::Media, Some(scb(0))),
            CloseOutcome::Immediate
        );
        assert!(link.disconnects.is_empty());
        assert_eq!(ad.slots_in_use(), 0);
    }

    #[test]
    fn test_release_link_disconnects_remaining_channels() {
        let mut ad = Adaptation::new(1, 1);
        let mut link = FakeLink::default();
        let lcid = open_signaling(&mut ad, &mut link);
        ad.open_acceptor(ccb(0), PEER, ChannelType::Media, Some(scb(0)))
            .unwrap();
        ad.release_link(&mut link, ccb(0));
        assert_eq!(link.disconnects, vec![lcid]);
        assert_eq!(ad.slots_in_use(), 0);
        assert!(ad.route(lcid).is_none());
    }
}
