//! Typed signaling messages and their body encoding.

use super::caps::{CapabilityError, StreamConfig};
use super::error_code::ErrorCode;
use super::header::{MessageType, RawMessage, SignalId};
use super::MsgError;
use crate::types::{MediaType, SepType, Seid};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// One entry of a discover response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SepInfo {
    pub seid: Seid,
    pub in_use: bool,
    pub media_type: MediaType,
    pub sep_type: SepType,
}

impl SepInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.seid.to_wire() | (u8::from(self.in_use) << 1));
        buf.put_u8(((self.media_type as u8) << 4) | ((self.sep_type as u8) << 3));
    }

    fn decode(first: u8, second: u8) -> Result<Self, MsgError> {
        Ok(Self {
            seid: Seid::from_wire(first).ok_or(MsgError::BadSeid)?,
            in_use: first & 0x02 != 0,
            media_type: MediaType::from_u8(second >> 4).ok_or(MsgError::BadLength)?,
            sep_type: SepType::from_bit(second >> 3),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Discover,
    GetCapabilities { acp_seid: Seid, all: bool },
    SetConfiguration { acp_seid: Seid, int_seid: Seid, config: StreamConfig },
    GetConfiguration { acp_seid: Seid },
    Reconfigure { acp_seid: Seid, config: StreamConfig },
    Open { acp_seid: Seid },
    Start { seids: Vec<Seid> },
    Close { acp_seid: Seid },
    Suspend { seids: Vec<Seid> },
    Abort { acp_seid: Seid },
    Security { acp_seid: Seid, data: Bytes },
    DelayReport { acp_seid: Seid, delay: u16 },
}

impl Command {
    #[must_use]
    pub const fn signal(&self) -> SignalId {
        match self {
            Self::Discover => SignalId::Discover,
            Self::GetCapabilities { all: false, .. } => SignalId::GetCapabilities,
            Self::GetCapabilities { all: true, .. } => SignalId::GetAllCapabilities,
            Self::SetConfiguration { .. } => SignalId::SetConfiguration,
            Self::GetConfiguration { .. } => SignalId::GetConfiguration,
            Self::Reconfigure { .. } => SignalId::Reconfigure,
            Self::Open { .. } => SignalId::Open,
            Self::Start { .. } => SignalId::Start,
            Self::Close { .. } => SignalId::Close,
            Self::Suspend { .. } => SignalId::Suspend,
            Self::Abort { .. } => SignalId::Abort,
            Self::Security { .. } => SignalId::Security,
            Self::DelayReport { .. } => SignalId::DelayReport,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        match self {
            Self::Discover => {}
            Self::GetCapabilities { acp_seid, .. }
            | Self::GetConfiguration { acp_seid }
            | Self::Open { acp_seid }
            | Self::Close { acp_seid }
            | Self::Abort { acp_seid } => buf.put_u8(acp_seid.to_wire()),
            Self::SetConfiguration {
                acp_seid,
                int_seid,
                config,
            } => {
                buf.put_u8(acp_seid.to_wire());
                buf.put_u8(int_seid.to_wire());
                config.encode(&mut buf, true);
            }
            Self::Reconfigure { acp_seid, config } => {
                buf.put_u8(acp_seid.to_wire());
                config.encode(&mut buf, true);
            }
            Self::Start { seids } | Self::Suspend { seids } => {
                for seid in seids {
                    buf.put_u8(seid.to_wire());
                }
            }
            Self::Security { acp_seid, data } => {
                buf.put_u8(acp_seid.to_wire());
                buf.extend_from_slice(data);
            }
            Self::DelayReport { acp_seid, delay } => {
                buf.put_u8(acp_seid.to_wire());
                buf.put_u16(*delay);
            }
        }
        buf.freeze()
    }

    /// Parse a command body.
    ///
    /// # Errors
    ///
    /// `BadLength` for missing octets, `BadSeid` for a reserved SEID, and
    /// `Capability` for an invalid capability element.
    pub fn decode(signal: SignalId, body: &[u8]) -> Result<Self, MsgError> {
        let acp = || -> Result<Seid, MsgError> {
            let octet = body.first().ok_or(MsgError::BadLength)?;
            Seid::from_wire(*octet).ok_or(MsgError::BadSeid)
        };
        let exact = |len: usize| -> Result<(), MsgError> {
            if body.len() == len {
                Ok(())
            } else {
                Err(MsgError::BadLength)
            }
        };

        Ok(match signal {
            SignalId::Discover => {
                exact(0)?;
                Self::Discover
            }
            SignalId::GetCapabilities | SignalId::GetAllCapabilities => {
                exact(1)?;
                Self::GetCapabilities {
                    acp_seid: acp()?,
                    all: signal == SignalId::GetAllCapabilities,
                }
            }
            SignalId::SetConfiguration => {
                let [acp_octet, int_octet, caps @ ..] = body else {
                    return Err(MsgError::BadLength);
                };
                let acp_seid = Seid::from_wire(*acp_octet).ok_or(MsgError::BadSeid)?;
                let int_seid = Seid::from_wire(*int_octet).ok_or(MsgError::BadSeid)?;
                Self::SetConfiguration {
                    acp_seid,
                    int_seid,
                    config: StreamConfig::decode(caps)?,
                }
            }
            SignalId::Reconfigure => {
                let acp_seid = acp()?;
                let config = StreamConfig::decode(body.get(1..).unwrap_or_default())?;
                Self::Reconfigure { acp_seid, config }
            }
            SignalId::GetConfiguration => {
                exact(1)?;
                Self::GetConfiguration { acp_seid: acp()? }
            }
            SignalId::Open => {
                exact(1)?;
                Self::Open { acp_seid: acp()? }
            }
            SignalId::Close => {
                exact(1)?;
                Self::Close { acp_seid: acp()? }
            }
            SignalId::Abort => {
                exact(1)?;
                Self::Abort { acp_seid: acp()? }
            }
            SignalId::Start | SignalId::Suspend => {
                if body.is_empty() {
                    return Err(MsgError::BadLength);
                }
                let seids = body
                    .iter()
                    .map(|o| Seid::from_wire(*o).ok_or(MsgError::BadSeid))
                    .collect::<Result<Vec<_>, _>>()?;
                if signal == SignalId::Start {
                    Self::Start { seids }
                } else {
                    Self::Suspend { seids }
                }
            }
            SignalId::Security => Self::Security {
                acp_seid: acp()?,
                data: Bytes::copy_from_slice(body.get(1..).unwrap_or_default()),
            },
            SignalId::DelayReport => {
                exact(3)?;
                let [_, hi, lo] = body else {
                    return Err(MsgError::BadLength);
                };
                Self::DelayReport {
                    acp_seid: acp()?,
                    delay: u16::from_be_bytes([*hi, *lo]),
                }
            }
        })
    }
}

/// Payload of an accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Discover { endpoints: Vec<SepInfo> },
    Capabilities { config: StreamConfig },
    Configuration { config: StreamConfig },
    Security { data: Bytes },
    /// Accepts that carry no parameters.
    Empty,
}

impl Response {
    #[must_use]
    pub fn encode(&self, signal: SignalId) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        match self {
            Self::Discover { endpoints } => {
                for ep in endpoints {
                    ep.encode(&mut buf);
                }
            }
            Self::Capabilities { config } => {
                config.encode(&mut buf, signal == SignalId::GetAllCapabilities);
            }
            Self::Configuration { config } => config.encode(&mut buf, true),
            Self::Security { data } => buf.extend_from_slice(data),
            Self::Empty => {}
        }
        buf.freeze()
    }

    /// Parse an accept body for the given signal.
    ///
    /// # Errors
    ///
    /// `BadLength`, `BadSeid` or `Capability` for a malformed body.
    pub fn decode(signal: SignalId, body: &[u8]) -> Result<Self, MsgError> {
        Ok(match signal {
            SignalId::Discover => {
                if body.is_empty() || body.len() % 2 != 0 {
                    return Err(MsgError::BadLength);
                }
                let endpoints = body
                    .chunks_exact(2)
                    .map(|pair| match pair {
                        [a, b] => SepInfo::decode(*a, *b),
                        _ => Err(MsgError::BadLength),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Discover { endpoints }
            }
            SignalId::GetCapabilities | SignalId::GetAllCapabilities => Self::Capabilities {
                config: StreamConfig::decode(body)?,
            },
            SignalId::GetConfiguration => Self::Configuration {
                config: StreamConfig::decode(body)?,
            },
            SignalId::Security => Self::Security {
                data: Bytes::copy_from_slice(body),
            },
            _ => Self::Empty,
        })
    }
}

/// Body of a reject. Set-configuration and reconfigure rejects name the
/// failing category; start and suspend rejects list every offending SEID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub code: ErrorCode,
    pub category: Option<u8>,
    pub seids: Vec<Seid>,
}

impl Reject {
    #[must_use]
    pub const fn new(code: ErrorCode) -> Self {
        Self {
            code,
            category: None,
            seids: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_category(code: ErrorCode, category: u8) -> Self {
        Self {
            code,
            category: Some(category),
            seids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_seids(code: ErrorCode, seids: Vec<Seid>) -> Self {
        Self {
            code,
            category: None,
            seids,
        }
    }

    /// Reject for a command whose body failed to decode.
    #[must_use]
    pub fn for_decode_error(signal: SignalId, err: &MsgError) -> Self {
        match signal {
            SignalId::SetConfiguration | SignalId::Reconfigure => {
                Self::with_category(err.error_code(), err.category().unwrap_or(0))
            }
            // A reserved SEID octet has no representation to echo back.
            _ => Self::new(err.error_code()),
        }
    }

    #[must_use]
    pub fn encode(&self, signal: SignalId) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        match signal {
            SignalId::SetConfiguration | SignalId::Reconfigure => {
                buf.put_u8(self.category.unwrap_or(0));
            }
            SignalId::Start | SignalId::Suspend => {
                for seid in &self.seids {
                    buf.put_u8(seid.to_wire());
                }
            }
            _ => {}
        }
        buf.put_u8(self.code.0);
        buf.freeze()
    }

    /// Parse a reject body.
    ///
    /// # Errors
    ///
    /// `BadLength` when the error code is missing.
    pub fn decode(signal: SignalId, body: &[u8]) -> Result<Self, MsgError> {
        let (code, head) = body.split_last().ok_or(MsgError::BadLength)?;
        let code = ErrorCode(*code);
        Ok(match signal {
            SignalId::SetConfiguration | SignalId::Reconfigure => {
                let category = head.first().copied().ok_or(MsgError::BadLength)?;
                Self::with_category(code, category)
            }
            SignalId::Start | SignalId::Suspend => {
                Self::with_seids(code, head.iter().filter_map(|o| Seid::from_wire(*o)).collect())
            }
            _ => Self::new(code),
        })
    }
}

/// Fully decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    Accept(Response),
    Reject(Reject),
    GeneralReject,
}

impl Message {
    /// Decode a reassembled message into its typed form.
    ///
    /// # Errors
    ///
    /// `UnknownSignal` for a signal id outside the table, otherwise whatever
    /// the body decoder reports.
    pub fn decode(raw: &RawMessage) -> Result<(SignalId, Self), MsgError> {
        let signal = SignalId::from_u8(raw.signal).ok_or(MsgError::UnknownSignal(raw.signal))?;
        let msg = match raw.cw.msg_type {
            MessageType::Command => Self::Command(Command::decode(signal, &raw.body)?),
            MessageType::Accept => Self::Accept(Response::decode(signal, &raw.body)?),
            MessageType::Reject => Self::Reject(Reject::decode(signal, &raw.body)?),
            MessageType::GeneralReject => Self::GeneralReject,
        };
        Ok((signal, msg))
    }
}

impl From<CapabilityError> for MsgError {
    fn from(err: CapabilityError) -> Self {
        Self::Capability(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::msg::caps::MediaCodecCap;
    use crate::msg::header::{ControlWord, Label};

    fn seid(v: u8) -> Seid {
        Seid::new(v).unwrap()
    }

    #[test]
    fn test_set_configuration_body() {
        let cmd = Command::SetConfiguration {
            acp_seid: seid(1),
            int_seid: seid(2),
            config: StreamConfig {
                media_transport: true,
                codec: Some(MediaCodecCap {
                    media_type: MediaType::Audio,
                    codec_type: 0,
                    info: Bytes::from_static(&[0x21, 0x15, 0x02, 0x35]),
                }),
                ..StreamConfig::default()
            },
        };
        let body = cmd.encode();
        assert_eq!(&body[..4], &[0x04, 0x08, 0x01, 0x00]);
        assert_eq!(Command::decode(SignalId::SetConfiguration, &body).unwrap(), cmd);
    }

    #[test]
    fn test_command_length_checks() {
        assert!(matches!(
            Command::decode(SignalId::Open, &[]),
            Err(MsgError::BadLength)
        ));
        assert!(matches!(
            Command::decode(SignalId::Open, &[0x04, 0x08]),
            Err(MsgError::BadLength)
        ));
        assert!(matches!(
            Command::decode(SignalId::Close, &[0x00]),
            Err(MsgError::BadSeid)
        ));
        assert!(matches!(
            Command::decode(SignalId::Discover, &[0x01]),
            Err(MsgError::BadLength)
        ));
    }

    #[test]
    fn test_delay_report_is_big_endian() {
        let cmd = Command::decode(SignalId::DelayReport, &[0x04, 0x05, 0xDC]).unwrap();
        assert_eq!(
            cmd,
            Command::DelayReport {
                acp_seid: seid(1),
                delay: 1500
            }
        );
    }

    #[test]
    fn test_discover_response_entries() {
        let rsp = Response::Discover {
            endpoints: vec![
                SepInfo {
                    seid: seid(1),
                    in_use: false,
                    media_type: MediaType::Audio,
                    sep_type: SepType::Sink,
                },
                SepInfo {
                    seid: seid(2),
                    in_use: true,
                    media_type: MediaType::Video,
                    sep_type: SepType::Source,
                },
            ],
        };
        let body = rsp.encode(SignalId::Discover);
        assert_eq!(&body[..], &[0x04, 0x08, 0x0A, 0x10]);
        assert_eq!(Response::decode(SignalId::Discover, &body).unwrap(), rsp);
        assert!(Response::decode(SignalId::Discover, &body[..3]).is_err());
    }

    #[test]
    fn test_start_reject_lists_offending_seids() {
        let rej = Reject::with_seids(ErrorCode::BAD_STATE, vec![seid(2), seid(5)]);
        let body = rej.encode(SignalId::Start);
        assert_eq!(&body[..], &[0x08, 0x14, 0x31]);
        assert_eq!(Reject::decode(SignalId::Start, &body).unwrap(), rej);
    }

    #[test]
    fn test_set_configuration_reject_carries_category() {
        let rej = Reject::with_category(ErrorCode::SEP_IN_USE, 0x07);
        let body = rej.encode(SignalId::SetConfiguration);
        assert_eq!(&body[..], &[0x07, 0x13]);
        assert_eq!(Reject::decode(SignalId::SetConfiguration, &body).unwrap(), rej);
        assert!(Reject::decode(SignalId::SetConfiguration, &[0x13]).is_err());
    }

    #[test]
    fn test_decode_error_reject_shapes() {
        let err = MsgError::Capability(CapabilityError::new(0x09, ErrorCode::BAD_SERV_CATEGORY));
        let rej = Reject::for_decode_error(SignalId::SetConfiguration, &err);
        assert_eq!(rej.category, Some(0x09));
        assert_eq!(rej.code, ErrorCode::BAD_SERV_CATEGORY);

        let rej = Reject::for_decode_error(SignalId::Open, &MsgError::BadLength);
        assert_eq!(rej.encode(SignalId::Open).as_ref(), &[0x11]);
    }

    #[test]
    fn test_unknown_signal_is_reported() {
        let raw = RawMessage {
            cw: ControlWord::new(Label::new(0), MessageType::Command),
            signal: 0x2A,
            body: Bytes::new(),
        };
        assert!(matches!(
            Message::decode(&raw),
            Err(MsgError::UnknownSignal(0x2A))
        ));
    }
}
