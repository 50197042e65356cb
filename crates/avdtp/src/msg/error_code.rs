//! Protocol error codes carried in reject messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One-octet reason code of a reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    pub const BAD_HEADER_FORMAT: Self = Self(0x01);
    pub const BAD_LENGTH: Self = Self(0x11);
    pub const BAD_ACP_SEID: Self = Self(0x12);
    pub const SEP_IN_USE: Self = Self(0x13);
    pub const SEP_NOT_IN_USE: Self = Self(0x14);
    pub const BAD_SERV_CATEGORY: Self = Self(0x17);
    pub const BAD_PAYLOAD_FORMAT: Self = Self(0x18);
    pub const NOT_SUPPORTED_COMMAND: Self = Self(0x19);
    pub const INVALID_CAPABILITIES: Self = Self(0x1A);
    pub const BAD_RECOVERY_TYPE: Self = Self(0x22);
    pub const BAD_MEDIA_TRANSPORT_FORMAT: Self = Self(0x23);
    pub const BAD_RECOVERY_FORMAT: Self = Self(0x25);
    pub const BAD_ROHC_FORMAT: Self = Self(0x26);
    pub const BAD_CP_FORMAT: Self = Self(0x27);
    pub const BAD_MULTIPLEXING_FORMAT: Self = Self(0x28);
    pub const UNSUPPORTED_CONFIGURATION: Self = Self(0x29);
    pub const BAD_STATE: Self = Self(0x31);

    /// Symbolic name, `"unknown"` for codes outside the table.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0x01 => "bad_header_format",
            0x11 => "bad_length",
            0x12 => "bad_acp_seid",
            0x13 => "sep_in_use",
            0x14 => "sep_not_in_use",
            0x17 => "bad_serv_category",
            0x18 => "bad_payload_format",
            0x19 => "not_supported_command",
            0x1A => "invalid_capabilities",
            0x22 => "bad_recovery_type",
            0x23 => "bad_media_transport_format",
            0x25 => "bad_recovery_format",
            0x26 => "bad_rohc_format",
            0x27 => "bad_cp_format",
            0x28 => "bad_multiplexing_format",
            0x29 => "unsupported_configuration",
            0x31 => "bad_state",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.0)
    }
}
