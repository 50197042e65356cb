//! Media packet framing.
//!
//! Outbound media gets a fixed 12-octet RTP header; inbound packets are parsed
//! tolerating CSRC lists, header extensions and padding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length of the fixed RTP header.
pub const RTP_HEADER_LEN: usize = 12;

const RTP_VERSION: u8 = 2;

/// Media payload handed to `write` by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub timestamp: u32,
    pub marker: bool,
    pub payload_type: u8,
    pub payload: Bytes,
}

/// Parsed header of an inbound media packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaHeader {
    pub sequence: u16,
    pub timestamp: u32,
    pub marker: bool,
    pub payload_type: u8,
    pub ssrc: u32,
}

/// Error type for media packet parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Insufficient data")]
    InsufficientData,

    #[error("Unsupported RTP version: {0}")]
    UnsupportedVersion(u8),
}

/// Build the on-air packet for `packet` with the given sequence number.
#[must_use]
pub fn encode(packet: &MediaPacket, sequence: u16, ssrc: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(RTP_HEADER_LEN + packet.payload.len());
    buf.put_u8(RTP_VERSION << 6);
    buf.put_u8((u8::from(packet.marker) << 7) | (packet.payload_type & 0x7F));
    buf.put_u16(sequence);
    buf.put_u32(packet.timestamp);
    buf.put_u32(ssrc);
    buf.extend_from_slice(&packet.payload);
    buf.freeze()
}

/// Split an inbound packet into header and payload.
///
/// # Errors
///
/// Returns an error if the packet is not RTP version 2 or is truncated.
pub fn decode(mut data: Bytes) -> Result<(MediaHeader, Bytes), MediaError> {
    if data.len() < RTP_HEADER_LEN {
        return Err(MediaError::InsufficientData);
    }
    let first = data.get_u8();
    let version = first >> 6;
    if version != RTP_VERSION {
        return Err(MediaError::UnsupportedVersion(version));
    }
    let padding = first & 0x20 != 0;
    let extension = first & 0x10 != 0;
    let csrc_count = usize::from(first & 0x0F);

    let second = data.get_u8();
    let header = MediaHeader {
        marker: second & 0x80 != 0,
        payload_type: second & 0x7F,
        sequence: data.get_u16(),
        timestamp: data.get_u32(),
        ssrc: data.get_u32(),
    };

    if data.remaining() < csrc_count * 4 {
        return Err(MediaError::InsufficientData);
    }
    data.advance(csrc_count * 4);

    if extension {
        if data.remaining() < 4 {
            return Err(MediaError::InsufficientData);
        }
        data.advance(2);
        let words = usize::from(data.get_u16());
        if data.remaining() < words * 4 {
            return Err(MediaError::InsufficientData);
        }
        data.advance(words * 4);
    }

    if padding {
        let pad = data.last().map_or(0, |p| usize::from(*p));
        if pad == 0 || pad > data.len() {
            return Err(MediaError::InsufficientData);
        }
        data.truncate(data.len() - pad);
    }

    Ok((header, data))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let packet = MediaPacket {
            timestamp: 0x0102_0304,
            marker: true,
            payload_type: 96,
            payload: Bytes::from_static(b"abc"),
        };
        let out = encode(&packet, 0xBEEF, 1);
        assert_eq!(
            &out[..RTP_HEADER_LEN],
            &[0x80, 0xE0, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!(&out[RTP_HEADER_LEN..], b"abc");
    }

    #[test]
    fn test_decode_skips_csrc_extension_and_padding() {
        let mut raw = BytesMut::new();
        raw.put_u8(0x80 | 0x20 | 0x10 | 0x01);
        raw.put_u8(0x60);
        raw.put_u16(7);
        raw.put_u32(160);
        raw.put_u32(2);
        raw.put_u32(0xAAAA_AAAA); // csrc
        raw.put_u16(0xBEDE);
        raw.put_u16(1);
        raw.put_u32(0); // one extension word
        raw.extend_from_slice(b"payload");
        raw.put_slice(&[0, 0, 3]); // padding

        let (header, payload) = decode(raw.freeze()).unwrap();
        assert_eq!(header.sequence, 7);
        assert_eq!(header.timestamp, 160);
        assert_eq!(header.payload_type, 0x60);
        assert!(!header.marker);
        assert_eq!(&payload[..], b"payload");
    }

    #[test]
    fn test_decode_rejects_bad_packets() {
        assert_eq!(
            decode(Bytes::from_static(&[0x80; 4])),
            Err(MediaError::InsufficientData)
        );
        assert_eq!(
            decode(Bytes::from_static(&[0x40; 12])),
            Err(MediaError::UnsupportedVersion(1))
        );
        // csrc count larger than the packet
        let mut raw = vec![0x8F, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        raw.extend_from_slice(&[0; 4]);
        assert_eq!(
            decode(Bytes::from(raw)),
            Err(MediaError::InsufficientData)
        );
    }
}
