//! Test stack driven by hand from the peer's side.
//!
//! [`TestStack`] wraps an engine built on [`MockLink`], [`MockTimers`] and
//! [`ScriptedSecurity`]. Helpers play the remote device: they complete
//! channel setup, encode peer messages onto the signaling channel and decode
//! what the stack wrote back.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut rig = TestStack::new();
//! rig.stack.discover(TEST_PEER_A).unwrap();
//! rig.complete_signaling_connect(TEST_PEER_A);
//! let (label, signal, _) = rig.sent_one(TEST_PEER_A);
//! ```

use crate::fixtures::{sbc_config, sbc_endpoint, test_config, TEST_PEER_MTU};
use crate::mock_link::MockLink;
use crate::mock_timers::{MockTimers, ScriptedSecurity};
use avdtp::msg::{self, Label, Message, Reassembler, SignalId};
use avdtp::{
    AvdtEvent, CcbTimer, ChannelType, Config, Lcid, LinkIndication, LinkState, PeerAddr, Seid,
    SepType, StreamHandle, TimerToken,
};
use bytes::Bytes;

pub type TestEngine = avdtp::Avdtp<MockLink, MockTimers, ScriptedSecurity>;

/// A decoded message the stack sent.
pub type Sent = (Label, SignalId, Message);

pub struct TestStack {
    pub stack: TestEngine,
    /// Signaling channel id per peer once known.
    signaling: Vec<(PeerAddr, Lcid)>,
    reassembler: Reassembler,
    peer_label: u8,
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStack {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self::with_parts(config, MockLink::new(), ScriptedSecurity::default())
    }

    #[must_use]
    pub fn with_parts(config: Config, link: MockLink, security: ScriptedSecurity) -> Self {
        let max = config.max_signaling_message;
        Self {
            stack: avdtp::Avdtp::new(config, link, MockTimers::new(), security),
            signaling: Vec::new(),
            reassembler: Reassembler::new(max),
            peer_label: 0,
        }
    }

    pub fn link(&mut self) -> &mut MockLink {
        self.stack.link_mut()
    }

    pub fn timers(&mut self) -> &mut MockTimers {
        self.stack.timers_mut()
    }

    pub fn events(&mut self) -> Vec<AvdtEvent> {
        self.stack.drain_events()
    }

    pub fn indicate(&mut self, indication: LinkIndication) {
        self.stack.handle_link(indication);
    }

    /// Signaling channel id used for `peer`.
    ///
    /// # Panics
    ///
    /// If no signaling channel to `peer` was set up through this rig.
    #[must_use]
    pub fn signaling_lcid(&self, peer: PeerAddr) -> Lcid {
        self.signaling
            .iter()
            .find(|(p, _)| *p == peer)
            .map(|(_, lcid)| *lcid)
            .unwrap_or_else(|| panic!("no signaling channel to {peer}"))
    }

    fn remember_signaling(&mut self, peer: PeerAddr, lcid: Lcid) {
        self.signaling.retain(|(p, _)| *p != peer);
        self.signaling.push((peer, lcid));
    }

    /// Finish the outbound signaling connect the stack requested.
    ///
    /// # Panics
    ///
    /// If the stack has not asked for a signaling channel.
    pub fn complete_signaling_connect(&mut self, peer: PeerAddr) -> Lcid {
        let (to, lcid) = self
            .stack
            .link()
            .last_connect(ChannelType::Signaling)
            .expect("stack requested a signaling channel");
        assert_eq!(to, peer, "signaling connect went to the wrong device");
        self.indicate(LinkIndication::ConnectCfm { lcid, success: true });
        self.indicate(LinkIndication::ConfigComplete {
            lcid,
            peer_mtu: TEST_PEER_MTU,
        });
        self.remember_signaling(peer, lcid);
        lcid
    }

    /// Have `peer` open the signaling channel towards the stack.
    pub fn accept_signaling_from(&mut self, peer: PeerAddr) -> Lcid {
        let lcid = self.link().allocate_lcid();
        self.indicate(LinkIndication::ConnectInd { peer, lcid });
        self.indicate(LinkIndication::ConfigComplete {
            lcid,
            peer_mtu: TEST_PEER_MTU,
        });
        self.remember_signaling(peer, lcid);
        lcid
    }

    /// Finish the most recent outbound media connect.
    ///
    /// # Panics
    ///
    /// If the stack has not asked for a media channel.
    pub fn complete_media_connect(&mut self) -> Lcid {
        let (_, lcid) = self
            .stack
            .link()
            .last_connect(ChannelType::Media)
            .expect("stack requested a media channel");
        self.indicate(LinkIndication::ConnectCfm { lcid, success: true });
        self.indicate(LinkIndication::ConfigComplete {
            lcid,
            peer_mtu: TEST_PEER_MTU,
        });
        lcid
    }

    /// Have `peer` open a transport channel towards the stack.
    pub fn accept_transport_from(&mut self, peer: PeerAddr) -> Lcid {
        let lcid = self.link().allocate_lcid();
        self.indicate(LinkIndication::ConnectInd { peer, lcid });
        self.indicate(LinkIndication::ConfigComplete {
            lcid,
            peer_mtu: TEST_PEER_MTU,
        });
        lcid
    }

    /// Next command label the simulated peer will use.
    pub fn next_peer_label(&mut self) -> Label {
        let label = Label::new(self.peer_label);
        self.peer_label = (self.peer_label + 1) & 0x0F;
        label
    }

    /// Encode `message` as `peer` would and deliver it on the signaling channel.
    pub fn peer_sends(&mut self, peer: PeerAddr, label: Label, signal: SignalId, message: &Message) {
        let lcid = self.signaling_lcid(peer);
        for packet in msg::encode(label, signal, message, usize::from(TEST_PEER_MTU)) {
            self.indicate(LinkIndication::Data { lcid, data: packet });
        }
    }

    /// Deliver raw bytes on the signaling channel of `peer`.
    pub fn peer_sends_raw(&mut self, peer: PeerAddr, data: Bytes) {
        let lcid = self.signaling_lcid(peer);
        self.indicate(LinkIndication::Data { lcid, data });
    }

    /// Send a peer command with a fresh label; returns the label used.
    pub fn peer_command(&mut self, peer: PeerAddr, command: msg::Command) -> Label {
        let label = self.next_peer_label();
        let signal = command.signal();
        self.peer_sends(peer, label, signal, &Message::Command(command));
        label
    }

    /// Decode and drain everything the stack wrote on `peer`'s signaling channel.
    ///
    /// # Panics
    ///
    /// If a written packet does not parse.
    pub fn sent_to(&mut self, peer: PeerAddr) -> Vec<Sent> {
        let lcid = self.signaling_lcid(peer);
        let packets = self.link().take_writes_on(lcid);
        let mut out = Vec::new();
        for packet in packets {
            if let Some(raw) = self
                .reassembler
                .push(&packet)
                .expect("stack wrote a well-formed packet")
            {
                let decoded = Message::decode(&raw);
                let (signal, message) = decoded.expect("stack wrote a decodable message");
                out.push((raw.cw.label, signal, message));
            }
        }
        out
    }

    /// Drain the single message the stack sent to `peer`.
    ///
    /// # Panics
    ///
    /// Unless exactly one message was written.
    pub fn sent_one(&mut self, peer: PeerAddr) -> Sent {
        let mut sent = self.sent_to(peer);
        assert_eq!(sent.len(), 1, "expected exactly one message, got {sent:?}");
        sent.remove(0)
    }

    /// Answer the command `sent` with an accept carrying `response`.
    pub fn peer_accepts(&mut self, peer: PeerAddr, sent: &Sent, response: msg::Response) {
        self.peer_sends(peer, sent.0, sent.1, &Message::Accept(response));
    }

    /// Answer the command `sent` with a reject.
    pub fn peer_rejects(&mut self, peer: PeerAddr, sent: &Sent, reject: msg::Reject) {
        self.peer_sends(peer, sent.0, sent.1, &Message::Reject(reject));
    }

    /// Fire the armed signaling timer of `kind`.
    ///
    /// # Panics
    ///
    /// If no such timer is armed.
    pub fn fire_signaling(&mut self, kind: CcbTimer) {
        let token = self
            .stack
            .timers()
            .signaling(kind)
            .first()
            .copied()
            .unwrap_or_else(|| panic!("no {kind:?} timer armed"));
        self.timers().take(token);
        self.stack.on_timer(token);
    }

    /// Fire the transport timer of `stream`.
    ///
    /// # Panics
    ///
    /// If it is not armed.
    pub fn fire_transport(&mut self, stream: StreamHandle) {
        let token = TimerToken::Transport { stream };
        assert!(
            self.timers().take(token).is_some(),
            "no transport timer armed for {stream}"
        );
        self.stack.on_timer(token);
    }

    /// Report every outstanding disconnect request as completed.
    ///
    /// Returns the closed channels in the order the stack asked for them.
    pub fn complete_disconnects(&mut self) -> Vec<Lcid> {
        let mut closed = Vec::new();
        loop {
            let batch = self.link().take_disconnects();
            if batch.is_empty() {
                return closed;
            }
            for lcid in batch {
                self.indicate(LinkIndication::Disconnected { lcid });
                closed.push(lcid);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Scenario shortcuts
    // ---------------------------------------------------------------------

    /// Register an SBC source and configure it against `remote` on `peer`,
    /// opening the signaling channel as initiator. Events are drained.
    ///
    /// # Panics
    ///
    /// If any step does not go as a conforming peer would make it go.
    pub fn configured_source(&mut self, peer: PeerAddr, remote: Seid) -> StreamHandle {
        let stream = self
            .stack
            .register(sbc_endpoint(SepType::Source))
            .expect("endpoint slot free");
        self.stack
            .set_configuration(stream, peer, remote, sbc_config())
            .expect("set configuration accepted");
        if self.stack.link_state(peer) == LinkState::Opening {
            self.complete_signaling_connect(peer);
        }
        let sent = self.sent_one(peer);
        assert_eq!(sent.1, SignalId::SetConfiguration);
        self.peer_accepts(peer, &sent, msg::Response::Empty);
        assert!(self
            .events()
            .contains(&AvdtEvent::SetConfigCfm { stream, result: Ok(()) }));
        stream
    }

    /// Open a configured stream; returns the media channel id.
    ///
    /// # Panics
    ///
    /// As for [`configured_source`](Self::configured_source).
    pub fn open_stream(&mut self, peer: PeerAddr, stream: StreamHandle) -> Lcid {
        self.stack.open(stream).expect("open accepted");
        let sent = self.sent_one(peer);
        assert_eq!(sent.1, SignalId::Open);
        self.peer_accepts(peer, &sent, msg::Response::Empty);
        let media = self.complete_media_connect();
        assert!(self.events().contains(&AvdtEvent::OpenCfm {
            stream,
            result: Ok(TEST_PEER_MTU),
        }));
        media
    }

    /// Start an open stream.
    ///
    /// # Panics
    ///
    /// As for [`configured_source`](Self::configured_source).
    pub fn start_stream(&mut self, peer: PeerAddr, stream: StreamHandle) {
        self.stack.start(&[stream]).expect("start accepted");
        let sent = self.sent_one(peer);
        assert_eq!(sent.1, SignalId::Start);
        self.peer_accepts(peer, &sent, msg::Response::Empty);
        assert!(self
            .events()
            .contains(&AvdtEvent::StartCfm { stream, result: Ok(()) }));
    }

    /// A source streaming to `peer`; returns the handle and media channel.
    pub fn streaming_source(&mut self, peer: PeerAddr, remote: Seid) -> (StreamHandle, Lcid) {
        let stream = self.configured_source(peer, remote);
        let media = self.open_stream(peer, stream);
        self.start_stream(peer, stream);
        (stream, media)
    }
}
