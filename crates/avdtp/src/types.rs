//! Identifiers and small value types shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bluetooth device address of a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr(pub [u8; 6]);

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Stream endpoint identifier as carried on the wire (1..=62).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Seid(u8);

impl Seid {
    /// Lowest valid SEID.
    pub const MIN: u8 = 0x01;
    /// Highest valid SEID.
    pub const MAX: u8 = 0x3E;

    /// Build a SEID, rejecting the reserved values 0 and 63.
    #[must_use]
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// SEID as it appears in the upper six bits of a wire octet.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        self.0 << 2
    }

    /// Parse the upper six bits of a wire octet.
    #[must_use]
    pub fn from_wire(octet: u8) -> Option<Self> {
        Self::new(octet >> 2)
    }
}

impl fmt::Display for Seid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Link-layer channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lcid(pub u16);

impl fmt::Display for Lcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Slot index plus generation, as handed out by [`crate::registry::Registry`].
///
/// The generation is bumped every time a slot is freed, so an id captured
/// before a deallocation never resolves to the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl SlotId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

/// Application-facing handle to a registered stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) SlotId);

impl StreamHandle {
    /// Local SEID of the endpoint behind this handle.
    #[must_use]
    pub fn seid(self) -> Option<Seid> {
        u8::try_from(self.0.index + 1).ok().and_then(Seid::new)
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scb{}.{}", self.0.index, self.0.generation)
    }
}

/// Internal id of a signaling channel controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CcbId(pub(crate) SlotId);

impl fmt::Display for CcbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ccb{}.{}", self.0.index, self.0.generation)
    }
}

/// Media type of a stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MediaType {
    Audio = 0x00,
    Video = 0x01,
    Multimedia = 0x02,
}

impl MediaType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Audio),
            0x01 => Some(Self::Video),
            0x02 => Some(Self::Multimedia),
            _ => None,
        }
    }
}

/// Whether an endpoint produces or consumes media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SepType {
    Source = 0x00,
    Sink = 0x01,
}

impl SepType {
    #[must_use]
    pub fn from_bit(bit: u8) -> Self {
        if bit & 0x01 == 0 {
            Self::Source
        } else {
            Self::Sink
        }
    }
}

/// Kind of logical channel carried over one link-layer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Signaling,
    Media,
    Reporting,
}

impl ChannelType {
    /// Bounded label value for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signaling => "signaling",
            Self::Media => "media",
            Self::Reporting => "reporting",
        }
    }
}

/// Which side started a procedure or a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Acceptor,
}

/// Externally visible lifecycle state of a stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    Configured,
    Opening,
    Open,
    Streaming,
    Closing,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Configured => "configured",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Externally visible state of the signaling channel to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    Idle,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}
