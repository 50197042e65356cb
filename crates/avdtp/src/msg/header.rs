//! Signaling packet header, fragmentation and reassembly.
//!
//! Octet 0 of every signaling packet is `label:4 | packet_type:2 | msg_type:2`.
//! A single packet follows it with the signal id; a start packet with the
//! number of packets and then the signal id; continue and end packets carry
//! nothing but octet 0 ahead of their payload.

use super::MsgError;
use bytes::{BufMut, Bytes, BytesMut};

/// Transaction label correlating a command with its response (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Label(u8);

impl Label {
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value & 0x0F)
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Label following this one, wrapping after 15.
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) & 0x0F)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Single = 0,
    Start = 1,
    Continue = 2,
    End = 3,
}

impl PacketType {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Single,
            1 => Self::Start,
            2 => Self::Continue,
            _ => Self::End,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Command = 0,
    GeneralReject = 1,
    Accept = 2,
    Reject = 3,
}

impl MessageType {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Command,
            1 => Self::GeneralReject,
            2 => Self::Accept,
            _ => Self::Reject,
        }
    }
}

/// Label and message type, kept beside an encoded message instead of being
/// recovered from a side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord {
    pub label: Label,
    pub msg_type: MessageType,
}

impl ControlWord {
    #[must_use]
    pub const fn new(label: Label, msg_type: MessageType) -> Self {
        Self { label, msg_type }
    }

    const fn octet(self, packet_type: PacketType) -> u8 {
        (self.label.0 << 4) | ((packet_type as u8) << 2) | self.msg_type as u8
    }

    const fn parse(octet: u8) -> (Self, PacketType) {
        (
            Self {
                label: Label::new(octet >> 4),
                msg_type: MessageType::from_bits(octet),
            },
            PacketType::from_bits(octet >> 2),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignalId {
    Discover = 0x01,
    GetCapabilities = 0x02,
    SetConfiguration = 0x03,
    GetConfiguration = 0x04,
    Reconfigure = 0x05,
    Open = 0x06,
    Start = 0x07,
    Close = 0x08,
    Suspend = 0x09,
    Abort = 0x0A,
    Security = 0x0B,
    GetAllCapabilities = 0x0C,
    DelayReport = 0x0D,
}

impl SignalId {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value & 0x3F {
            0x01 => Self::Discover,
            0x02 => Self::GetCapabilities,
            0x03 => Self::SetConfiguration,
            0x04 => Self::GetConfiguration,
            0x05 => Self::Reconfigure,
            0x06 => Self::Open,
            0x07 => Self::Start,
            0x08 => Self::Close,
            0x09 => Self::Suspend,
            0x0A => Self::Abort,
            0x0B => Self::Security,
            0x0C => Self::GetAllCapabilities,
            0x0D => Self::DelayReport,
            _ => return None,
        })
    }

    /// Bounded label value for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::GetCapabilities => "get_capabilities",
            Self::SetConfiguration => "set_configuration",
            Self::GetConfiguration => "get_configuration",
            Self::Reconfigure => "reconfigure",
            Self::Open => "open",
            Self::Start => "start",
            Self::Close => "close",
            Self::Suspend => "suspend",
            Self::Abort => "abort",
            Self::Security => "security",
            Self::GetAllCapabilities => "get_all_capabilities",
            Self::DelayReport => "delay_report",
        }
    }

    /// Commands answered under the response timer rather than retransmitted.
    #[must_use]
    pub const fn uses_response_timer(self) -> bool {
        matches!(
            self,
            Self::Discover | Self::GetCapabilities | Self::GetAllCapabilities | Self::Security
        )
    }
}

/// Smallest MTU able to carry a start packet with one payload octet.
pub const MIN_SIGNALING_MTU: usize = 4;

/// Split one message into packets no larger than `mtu`.
///
/// `signal` is a raw octet so that general rejects for unknown signals can be
/// echoed back verbatim.
#[must_use]
pub fn fragment(cw: ControlWord, signal: u8, body: &[u8], mtu: usize) -> Vec<Bytes> {
    let mtu = mtu.max(MIN_SIGNALING_MTU);
    if body.len() + 2 <= mtu {
        let mut buf = BytesMut::with_capacity(body.len() + 2);
        buf.put_u8(cw.octet(PacketType::Single));
        buf.put_u8(signal & 0x3F);
        buf.extend_from_slice(body);
        return vec![buf.freeze()];
    }

    let first = mtu - 3;
    let rest = mtu - 1;
    let remaining = body.len() - first;
    let count = 1 + remaining.div_ceil(rest);
    let mut packets = Vec::with_capacity(count);

    let (head, mut tail) = body.split_at(first);
    let mut buf = BytesMut::with_capacity(mtu);
    buf.put_u8(cw.octet(PacketType::Start));
    // The packet count octet saturates; peers only use it as a sanity check.
    buf.put_u8(u8::try_from(count).unwrap_or(u8::MAX));
    buf.put_u8(signal & 0x3F);
    buf.extend_from_slice(head);
    packets.push(buf.freeze());

    while !tail.is_empty() {
        let take = tail.len().min(rest);
        let (chunk, next) = tail.split_at(take);
        let packet_type = if next.is_empty() {
            PacketType::End
        } else {
            PacketType::Continue
        };
        let mut buf = BytesMut::with_capacity(take + 1);
        buf.put_u8(cw.octet(packet_type));
        buf.extend_from_slice(chunk);
        packets.push(buf.freeze());
        tail = next;
    }
    packets
}

/// A complete inbound message, possibly rebuilt from several packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub cw: ControlWord,
    /// Raw signal octet; unknown values are kept so they can be general-rejected.
    pub signal: u8,
    pub body: Bytes,
}

#[derive(Debug)]
struct Partial {
    cw: ControlWord,
    signal: u8,
    expected: u8,
    received: u8,
    body: BytesMut,
}

/// Per-channel reassembly buffer for fragmented inbound messages.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: Option<Partial>,
    max_len: usize,
}

impl Reassembler {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            partial: None,
            max_len,
        }
    }

    /// Feed one packet. Returns a message once the last fragment arrives.
    ///
    /// A single or start packet arriving mid-reassembly discards the partial
    /// message.
    ///
    /// # Errors
    ///
    /// `MsgError::BadHeader` for truncated packets, `MsgError::Fragment` for
    /// out-of-sequence or oversized fragments. The partial buffer is dropped.
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<RawMessage>, MsgError> {
        let (&octet, rest) = packet.split_first().ok_or(MsgError::BadHeader)?;
        let (cw, packet_type) = ControlWord::parse(octet);

        match packet_type {
            PacketType::Single => {
                if self.partial.take().is_some() {
                    tracing::debug!(target: "avdtp.msg", "Discarding partial message");
                }
                let (&signal, body) = rest.split_first().ok_or(MsgError::BadHeader)?;
                Ok(Some(RawMessage {
                    cw,
                    signal: signal & 0x3F,
                    body: Bytes::copy_from_slice(body),
                }))
            }
            PacketType::Start => {
                let [expected, signal, body @ ..] = rest else {
                    self.partial = None;
                    return Err(MsgError::BadHeader);
                };
                if *expected < 2 {
                    self.partial = None;
                    return Err(MsgError::Fragment);
                }
                if self.partial.is_some() {
                    tracing::debug!(target: "avdtp.msg", "Discarding partial message");
                }
                let mut buf = BytesMut::with_capacity(body.len() * usize::from(*expected));
                buf.extend_from_slice(body);
                self.partial = Some(Partial {
                    cw,
                    signal: signal & 0x3F,
                    expected: *expected,
                    received: 1,
                    body: buf,
                });
                Ok(None)
            }
            PacketType::Continue | PacketType::End => {
                let mut partial = self.partial.take().ok_or(MsgError::Fragment)?;
                if partial.cw != cw {
                    return Err(MsgError::Fragment);
                }
                partial.received = partial.received.saturating_add(1);
                if partial.body.len() + rest.len() > self.max_len {
                    return Err(MsgError::Fragment);
                }
                partial.body.extend_from_slice(rest);

                let last = packet_type == PacketType::End;
                match (last, partial.received.cmp(&partial.expected)) {
                    (true, std::cmp::Ordering::Equal) => Ok(Some(RawMessage {
                        cw: partial.cw,
                        signal: partial.signal,
                        body: partial.body.freeze(),
                    })),
                    (false, std::cmp::Ordering::Less) => {
                        self.partial = Some(partial);
                        Ok(None)
                    }
                    _ => Err(MsgError::Fragment),
                }
            }
        }
    }

}
