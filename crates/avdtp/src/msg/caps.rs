//! Service capabilities: the category/length/value list carried by
//! get-capabilities responses and set/get/reconfigure messages.

use super::error_code::ErrorCode;
use crate::types::MediaType;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Service category octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    MediaTransport = 0x01,
    Reporting = 0x02,
    Recovery = 0x03,
    ContentProtection = 0x04,
    HeaderCompression = 0x05,
    Multiplexing = 0x06,
    MediaCodec = 0x07,
    DelayReporting = 0x08,
}

impl Category {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::MediaTransport,
            0x02 => Self::Reporting,
            0x03 => Self::Recovery,
            0x04 => Self::ContentProtection,
            0x05 => Self::HeaderCompression,
            0x06 => Self::Multiplexing,
            0x07 => Self::MediaCodec,
            0x08 => Self::DelayReporting,
            _ => return None,
        })
    }

    /// Error reported when an element of this category is malformed.
    const fn format_error(self) -> ErrorCode {
        match self {
            Self::MediaTransport => ErrorCode::BAD_MEDIA_TRANSPORT_FORMAT,
            Self::Recovery => ErrorCode::BAD_RECOVERY_FORMAT,
            Self::ContentProtection => ErrorCode::BAD_CP_FORMAT,
            Self::HeaderCompression => ErrorCode::BAD_ROHC_FORMAT,
            Self::Multiplexing => ErrorCode::BAD_MULTIPLEXING_FORMAT,
            Self::Reporting | Self::MediaCodec | Self::DelayReporting => {
                ErrorCode::BAD_PAYLOAD_FORMAT
            }
        }
    }

    /// Inclusive bounds on the element length.
    const fn length_bounds(self) -> (usize, usize) {
        match self {
            Self::MediaTransport | Self::Reporting | Self::DelayReporting => (0, 0),
            Self::Recovery => (3, 3),
            Self::ContentProtection => (2, 255),
            Self::HeaderCompression => (1, 1),
            Self::Multiplexing => (1, 7),
            Self::MediaCodec => (2, 255),
        }
    }
}

/// Recovery type defined for the recovery category (RFC 2733).
pub const RECOVERY_TYPE_RFC2733: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryCap {
    pub recovery_type: u8,
    pub max_window: u8,
    pub max_parity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentProtectionCap {
    pub cp_type: u16,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCodecCap {
    pub media_type: MediaType,
    pub codec_type: u8,
    /// Codec-specific information elements, passed through opaquely.
    pub info: Bytes,
}

/// Set of service capabilities, used both for what an endpoint supports and
/// for what a stream is configured with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamConfig {
    pub media_transport: bool,
    pub reporting: bool,
    pub recovery: Option<RecoveryCap>,
    pub content_protection: Option<ContentProtectionCap>,
    pub header_compression: Option<u8>,
    pub multiplexing: Option<Bytes>,
    pub codec: Option<MediaCodecCap>,
    pub delay_reporting: bool,
}

/// A capability element failed to parse or validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("capability category {category:#04x} rejected: {code}")]
pub struct CapabilityError {
    /// Raw category octet of the offending element.
    pub category: u8,
    pub code: ErrorCode,
}

impl CapabilityError {
    #[must_use]
    pub const fn new(category: u8, code: ErrorCode) -> Self {
        Self { category, code }
    }
}

impl StreamConfig {
    /// Categories present, in wire order.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        let mut out = Vec::with_capacity(8);
        if self.media_transport {
            out.push(Category::MediaTransport);
        }
        if self.reporting {
            out.push(Category::Reporting);
        }
        if self.recovery.is_some() {
            out.push(Category::Recovery);
        }
        if self.content_protection.is_some() {
            out.push(Category::ContentProtection);
        }
        if self.header_compression.is_some() {
            out.push(Category::HeaderCompression);
        }
        if self.multiplexing.is_some() {
            out.push(Category::Multiplexing);
        }
        if self.codec.is_some() {
            out.push(Category::MediaCodec);
        }
        if self.delay_reporting {
            out.push(Category::DelayReporting);
        }
        out
    }

    #[must_use]
    pub fn has(&self, category: Category) -> bool {
        self.categories().contains(&category)
    }

    /// Append the encoded elements. The delay-reporting category is left out
    /// when `with_delay_reporting` is false (basic get-capabilities).
    pub fn encode(&self, buf: &mut BytesMut, with_delay_reporting: bool) {
        if self.media_transport {
            put_element(buf, Category::MediaTransport, &[]);
        }
        if self.reporting {
            put_element(buf, Category::Reporting, &[]);
        }
        if let Some(rec) = &self.recovery {
            put_element(
                buf,
                Category::Recovery,
                &[rec.recovery_type, rec.max_window, rec.max_parity],
            );
        }
        if let Some(cp) = &self.content_protection {
            let mut value = BytesMut::with_capacity(2 + cp.value.len());
            value.put_u16_le(cp.cp_type);
            value.extend_from_slice(&cp.value);
            put_element(buf, Category::ContentProtection, &value);
        }
        if let Some(hc) = self.header_compression {
            put_element(buf, Category::HeaderCompression, &[hc]);
        }
        if let Some(mux) = &self.multiplexing {
            put_element(buf, Category::Multiplexing, mux);
        }
        if let Some(codec) = &self.codec {
            let mut value = BytesMut::with_capacity(2 + codec.info.len());
            value.put_u8((codec.media_type as u8) << 4);
            value.put_u8(codec.codec_type);
            value.extend_from_slice(&codec.info);
            put_element(buf, Category::MediaCodec, &value);
        }
        if self.delay_reporting && with_delay_reporting {
            put_element(buf, Category::DelayReporting, &[]);
        }
    }

    /// Parse a capability list.
    ///
    /// # Errors
    ///
    /// Returns the category and reason code of the first invalid element:
    /// `BAD_SERV_CATEGORY` for unknown categories, `BAD_LENGTH` when an
    /// element overruns the message, the category's format error for a
    /// length outside its bounds, and `BAD_RECOVERY_TYPE` for an unknown
    /// recovery scheme.
    pub fn decode(mut data: &[u8]) -> Result<Self, CapabilityError> {
        let mut cfg = Self::default();
        while let [raw_cat, len, rest @ ..] = data {
            let len = usize::from(*len);
            let category = Category::from_u8(*raw_cat)
                .ok_or(CapabilityError::new(*raw_cat, ErrorCode::BAD_SERV_CATEGORY))?;
            if rest.len() < len {
                return Err(CapabilityError::new(*raw_cat, ErrorCode::BAD_LENGTH));
            }
            let (value, next) = rest.split_at(len);
            let (min, max) = category.length_bounds();
            if len < min || len > max {
                return Err(CapabilityError::new(*raw_cat, category.format_error()));
            }
            cfg.apply(category, value)?;
            data = next;
        }
        if !data.is_empty() {
            return Err(CapabilityError::new(
                data.first().copied().unwrap_or_default(),
                ErrorCode::BAD_LENGTH,
            ));
        }
        Ok(cfg)
    }

    fn apply(&mut self, category: Category, value: &[u8]) -> Result<(), CapabilityError> {
        let bad = || CapabilityError::new(category as u8, category.format_error());
        match category {
            Category::MediaTransport => self.media_transport = true,
            Category::Reporting => self.reporting = true,
            Category::DelayReporting => self.delay_reporting = true,
            Category::Recovery => {
                let [recovery_type, max_window, max_parity] = value else {
                    return Err(bad());
                };
                if *recovery_type != RECOVERY_TYPE_RFC2733 {
                    return Err(CapabilityError::new(
                        category as u8,
                        ErrorCode::BAD_RECOVERY_TYPE,
                    ));
                }
                self.recovery = Some(RecoveryCap {
                    recovery_type: *recovery_type,
                    max_window: *max_window,
                    max_parity: *max_parity,
                });
            }
            Category::ContentProtection => {
                let [lo, hi, rest @ ..] = value else {
                    return Err(bad());
                };
                self.content_protection = Some(ContentProtectionCap {
                    cp_type: u16::from_le_bytes([*lo, *hi]),
                    value: Bytes::copy_from_slice(rest),
                });
            }
            Category::HeaderCompression => {
                self.header_compression = value.first().copied();
            }
            Category::Multiplexing => {
                self.multiplexing = Some(Bytes::copy_from_slice(value));
            }
            Category::MediaCodec => {
                let [media, codec_type, info @ ..] = value else {
                    return Err(bad());
                };
                let media_type = MediaType::from_u8(media >> 4).ok_or_else(bad)?;
                self.codec = Some(MediaCodecCap {
                    media_type,
                    codec_type: *codec_type,
                    info: Bytes::copy_from_slice(info),
                });
            }
        }
        Ok(())
    }

    /// Check a requested configuration against what an endpoint offers.
    ///
    /// # Errors
    ///
    /// `INVALID_CAPABILITIES` without a codec, `UNSUPPORTED_CONFIGURATION`
    /// naming the first category the endpoint does not offer or whose codec
    /// identity differs.
    pub fn check_against(&self, offered: &Self) -> Result<(), CapabilityError> {
        let Some(codec) = &self.codec else {
            return Err(CapabilityError::new(
                Category::MediaCodec as u8,
                ErrorCode::INVALID_CAPABILITIES,
            ));
        };
        if let Some(missing) = self.categories().into_iter().find(|c| !offered.has(*c)) {
            return Err(CapabilityError::new(
                missing as u8,
                ErrorCode::UNSUPPORTED_CONFIGURATION,
            ));
        }
        match &offered.codec {
            Some(ours)
                if ours.media_type == codec.media_type && ours.codec_type == codec.codec_type =>
            {
                Ok(())
            }
            _ => Err(CapabilityError::new(
                Category::MediaCodec as u8,
                ErrorCode::UNSUPPORTED_CONFIGURATION,
            )),
        }
    }

    /// A reconfiguration may only touch the codec and content protection.
    ///
    /// # Errors
    ///
    /// `INVALID_CAPABILITIES` naming the first other category present.
    pub fn check_reconfigurable(&self) -> Result<(), CapabilityError> {
        match self
            .categories()
            .into_iter()
            .find(|c| !matches!(c, Category::MediaCodec | Category::ContentProtection))
        {
            Some(c) => Err(CapabilityError::new(
                c as u8,
                ErrorCode::INVALID_CAPABILITIES,
            )),
            None => Ok(()),
        }
    }

    /// Overlay the reconfigurable categories of `update` onto `self`.
    pub fn merge_reconfiguration(&mut self, update: &Self) {
        if let Some(codec) = &update.codec {
            self.codec = Some(codec.clone());
        }
        if let Some(cp) = &update.content_protection {
            self.content_protection = Some(cp.clone());
        }
    }

    /// Copy without the delay-reporting category.
    #[must_use]
    pub fn without_delay_reporting(&self) -> Self {
        Self {
            delay_reporting: false,
            ..self.clone()
        }
    }
}

fn put_element(buf: &mut BytesMut, category: Category, value: &[u8]) {
    buf.put_u8(category as u8);
    // Element lengths are bounded to one octet by `length_bounds`.
    buf.put_u8(u8::try_from(value.len()).unwrap_or(u8::MAX));
    buf.extend_from_slice(value);
}
