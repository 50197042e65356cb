//! Error types for the AVDTP control plane.
//!
//! Two families:
//! - [`AvdtError`] is returned synchronously when an API call cannot even be
//!   attempted (bad handle, wrong state, no free control block).
//! - [`ProcedureError`] travels inside confirm events when a started
//!   procedure ends unsuccessfully (peer reject, timeout, link loss).
//!
//! Neither ever crosses the controller boundary as a panic; link-layer
//! failures surface only as events.

use crate::msg::ErrorCode;
use crate::types::{Seid, StreamHandle};
use thiserror::Error;

/// Synchronous API error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvdtError {
    /// No free control block or transport slot.
    #[error("No resources available")]
    NoResources,

    /// Handle does not name a live stream endpoint.
    #[error("Unknown stream handle")]
    BadHandle,

    /// Controller state does not allow the request.
    #[error("Operation not allowed in current state")]
    WrongState,

    /// Start/suspend named endpoints that are not ready; lists every one.
    #[error("Streams not ready: {0:?}")]
    StreamsNotReady(Vec<StreamHandle>),

    /// A discover or get-capabilities procedure is already outstanding.
    #[error("Procedure already in progress")]
    Busy,

    /// No signaling channel exists for the peer.
    #[error("Not connected")]
    NotConnected,

    /// Parameters rejected before anything was sent.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Actor mailbox or reply channel failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AvdtError {
    /// Bounded label value for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoResources => "no_resources",
            Self::BadHandle => "bad_handle",
            Self::WrongState => "wrong_state",
            Self::StreamsNotReady(_) => "streams_not_ready",
            Self::Busy => "busy",
            Self::NotConnected => "not_connected",
            Self::InvalidParam(_) => "invalid_param",
            Self::Internal(_) => "internal",
        }
    }
}

/// Why a procedure failed, reported inside confirm events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcedureError {
    /// Peer answered with a reject.
    #[error("Rejected by peer: {code}")]
    Rejected {
        code: ErrorCode,
        /// Category octet for set-configuration and reconfigure rejects.
        category: Option<u8>,
        /// Endpoints the peer named in a start or suspend reject.
        seids: Vec<Seid>,
    },

    /// Peer did not understand the signal.
    #[error("General reject from peer")]
    GeneralReject,

    /// Retransmissions exhausted or response timer expired.
    #[error("Timed out waiting for peer")]
    Timeout,

    /// Signaling channel closed while the command was outstanding.
    #[error("Signaling channel closed")]
    LinkClosed,

    /// Transport channel could not be opened.
    #[error("Transport failure")]
    Transport,

    /// No free transport slot.
    #[error("No resources available")]
    NoResources,
}

impl ProcedureError {
    /// Bounded label value for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::GeneralReject => "general_reject",
            Self::Timeout => "timeout",
            Self::LinkClosed => "link_closed",
            Self::Transport => "transport",
            Self::NoResources => "no_resources",
        }
    }

    /// Whether the peer actually answered.
    #[must_use]
    pub const fn is_peer_answer(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::GeneralReject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AvdtError::Busy.to_string(), "Procedure already in progress");
        assert_eq!(
            ProcedureError::Rejected {
                code: ErrorCode::SEP_IN_USE,
                category: None,
                seids: Vec::new(),
            }
            .to_string(),
            "Rejected by peer: sep_in_use (0x13)"
        );
    }

    #[test]
    fn test_metric_labels_are_bounded() {
        let errors = [
            AvdtError::NoResources,
            AvdtError::BadHandle,
            AvdtError::WrongState,
            AvdtError::StreamsNotReady(Vec::new()),
            AvdtError::Busy,
            AvdtError::NotConnected,
            AvdtError::InvalidParam("x".into()),
            AvdtError::Internal("y".into()),
        ];
        for err in &errors {
            assert!(!err.as_str().is_empty());
            assert!(!err.as_str().contains(' '));
        }
        assert!(ProcedureError::GeneralReject.is_peer_answer());
        assert!(!ProcedureError::Timeout.is_peer_answer());
    }
}
