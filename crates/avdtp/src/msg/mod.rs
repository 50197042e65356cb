//! Signaling message layer.
//!
//! Builds and parses signaling messages, splits them to the peer's MTU and
//! reassembles inbound fragments. Label assignment and response correlation
//! live with the signaling controller, which owns the in-flight command.

pub mod caps;
pub mod codec;
pub mod error_code;
pub mod header;

pub use caps::{
    CapabilityError, Category, ContentProtectionCap, MediaCodecCap, RecoveryCap, StreamConfig,
};
pub use codec::{Command, Message, Reject, Response, SepInfo};
pub use error_code::ErrorCode;
pub use header::{fragment, ControlWord, Label, MessageType, RawMessage, Reassembler, SignalId};

use bytes::Bytes;
use thiserror::Error;

/// Error type for message decoding and correlation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsgError {
    /// Packet too short to carry its header.
    #[error("Malformed packet header")]
    BadHeader,

    /// Body shorter or longer than the signal allows.
    #[error("Bad message length")]
    BadLength,

    /// Reserved SEID value in the body.
    #[error("Invalid SEID")]
    BadSeid,

    /// Signal id outside the known table.
    #[error("Unknown signal: {0:#04x}")]
    UnknownSignal(u8),

    /// Capability element failed to parse or validate.
    #[error(transparent)]
    Capability(CapabilityError),

    /// Fragment out of sequence or reassembly overflow.
    #[error("Fragment out of sequence")]
    Fragment,

    /// Response whose label or signal does not match the outstanding command.
    #[error("Response not correlated with an outstanding command")]
    Uncorrelated,
}

impl MsgError {
    /// Reason code to reject a command that failed with this error.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::BadHeader | Self::Fragment | Self::UnknownSignal(_) | Self::Uncorrelated => {
                ErrorCode::BAD_HEADER_FORMAT
            }
            Self::BadLength => ErrorCode::BAD_LENGTH,
            Self::BadSeid => ErrorCode::BAD_ACP_SEID,
            Self::Capability(err) => err.code,
        }
    }

    /// Category octet for capability errors.
    #[must_use]
    pub const fn category(&self) -> Option<u8> {
        match self {
            Self::Capability(err) => Some(err.category),
            _ => None,
        }
    }
}

/// Encode a complete outbound message into MTU-sized packets.
#[must_use]
pub fn encode(label: Label, signal: SignalId, msg: &Message, mtu: usize) -> Vec<Bytes> {
    let (msg_type, body) = match msg {
        Message::Command(cmd) => (MessageType::Command, cmd.encode()),
        Message::Accept(rsp) => (MessageType::Accept, rsp.encode(signal)),
        Message::Reject(rej) => (MessageType::Reject, rej.encode(signal)),
        Message::GeneralReject => (MessageType::GeneralReject, Bytes::new()),
    };
    fragment(ControlWord::new(label, msg_type), signal as u8, &body, mtu)
}

/// General reject echoing a signal octet that may not be in the table.
#[must_use]
pub fn general_reject(label: Label, raw_signal: u8) -> Bytes {
    let cw = ControlWord::new(label, MessageType::GeneralReject);
    fragment(cw, raw_signal, &[], header::MIN_SIGNALING_MTU)
        .into_iter()
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::types::Seid;

    #[test]
    fn test_encode_then_parse_command() {
        let cmd = Command::Open {
            acp_seid: Seid::new(3).unwrap(),
        };
        let packets = encode(Label::new(7), SignalId::Open, &Message::Command(cmd.clone()), 48);
        assert_eq!(&packets[0][..], &[0x70, 0x06, 0x0C]);

        let raw = Reassembler::new(64).push(&packets[0]).unwrap().unwrap();
        let (signal, msg) = Message::decode(&raw).unwrap();
        assert_eq!(signal, SignalId::Open);
        assert_eq!(msg, Message::Command(cmd));
    }

    #[test]
    fn test_general_reject_echoes_unknown_signal() {
        let packet = general_reject(Label::new(2), 0x3A);
        assert_eq!(&packet[..], &[0x21, 0x3A]);
    }

    #[test]
    fn test_error_codes_for_rejects() {
        assert_eq!(MsgError::BadSeid.error_code(), ErrorCode::BAD_ACP_SEID);
        assert_eq!(MsgError::BadLength.error_code(), ErrorCode::BAD_LENGTH);
        let cap = MsgError::Capability(CapabilityError::new(0x04, ErrorCode::BAD_CP_FORMAT));
        assert_eq!(cap.error_code(), ErrorCode::BAD_CP_FORMAT);
        assert_eq!(cap.category(), Some(0x04));
    }
}
