//! Stack configuration.
//!
//! Configuration is loaded from environment variables. Every field has a
//! default, so an empty environment yields a working stack.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default number of simultaneously connected peers.
pub const DEFAULT_MAX_LINKS: usize = 2;

/// Default number of local stream endpoints.
pub const DEFAULT_MAX_ENDPOINTS: usize = 4;

/// Default retransmission timer for signaling commands, in milliseconds.
pub const DEFAULT_RETRANSMIT_TIMEOUT_MS: u64 = 4_000;

/// Default response timer for discover/get-capabilities/security, in milliseconds.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 4_000;

/// Default idle timer before an unused signaling channel is closed, in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;

/// Default transport channel connect timer, in milliseconds.
pub const DEFAULT_TC_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default transport channel disconnect timer, in milliseconds.
pub const DEFAULT_TC_DISCONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default number of retransmissions before a command fails.
pub const DEFAULT_MAX_RETRANSMISSIONS: u8 = 1;

/// Default local MTU of the signaling channel.
pub const DEFAULT_SIGNALING_MTU: u16 = 672;

/// Default local MTU of media and reporting channels.
pub const DEFAULT_MEDIA_MTU: u16 = 895;

/// Default flush timeout of media channels (infinite).
pub const DEFAULT_FLUSH_TIMEOUT: u16 = 0xFFFF;

/// Largest signaling message accepted through reassembly.
pub const DEFAULT_MAX_SIGNALING_MESSAGE: usize = 4_096;

/// Protocol configuration of one stack instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of signaling channel controllers (one per peer).
    pub max_links: usize,

    /// Maximum number of registered stream endpoints.
    pub max_endpoints: usize,

    /// Retransmission timer for commands that are retried.
    pub retransmit_timeout: Duration,

    /// Response timer for commands that are not retried.
    pub response_timeout: Duration,

    /// Idle timer for a signaling channel with no bound streams.
    pub idle_timeout: Duration,

    /// Transport channel connect timeout.
    pub tc_connect_timeout: Duration,

    /// Transport channel disconnect timeout.
    pub tc_disconnect_timeout: Duration,

    /// Retransmissions allowed before a command fails (shared by all signals).
    pub max_retransmissions: u8,

    /// Local MTU offered on signaling channels.
    pub signaling_mtu: u16,

    /// Local MTU offered on media and reporting channels.
    pub media_mtu: u16,

    /// Flush timeout requested for media channels.
    pub flush_timeout: u16,

    /// Reassembly limit for fragmented signaling messages.
    pub max_signaling_message: usize,

    /// Whether opens set up a reporting channel, initiated or accepted, when
    /// the stream configuration includes reporting.
    pub reporting: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_MAX_LINKS,
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            retransmit_timeout: Duration::from_millis(DEFAULT_RETRANSMIT_TIMEOUT_MS),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            tc_connect_timeout: Duration::from_millis(DEFAULT_TC_CONNECT_TIMEOUT_MS),
            tc_disconnect_timeout: Duration::from_millis(DEFAULT_TC_DISCONNECT_TIMEOUT_MS),
            max_retransmissions: DEFAULT_MAX_RETRANSMISSIONS,
            signaling_mtu: DEFAULT_SIGNALING_MTU,
            media_mtu: DEFAULT_MEDIA_MTU,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            max_signaling_message: DEFAULT_MAX_SIGNALING_MESSAGE,
            reporting: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is present but
    /// cannot be parsed or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is present but
    /// cannot be parsed or is out of range.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_links = parse_or(vars, "AVDTP_MAX_LINKS", defaults.max_links)?;
        if max_links == 0 {
            return Err(ConfigError::InvalidValue(
                "AVDTP_MAX_LINKS must be at least 1".to_string(),
            ));
        }

        let max_endpoints = parse_or(vars, "AVDTP_MAX_ENDPOINTS", defaults.max_endpoints)?;
        if max_endpoints == 0 || max_endpoints > usize::from(crate::types::Seid::MAX) {
            return Err(ConfigError::InvalidValue(format!(
                "AVDTP_MAX_ENDPOINTS must be between 1 and {}, got {max_endpoints}",
                crate::types::Seid::MAX
            )));
        }

        let signaling_mtu = parse_or(vars, "AVDTP_SIGNALING_MTU", defaults.signaling_mtu)?;
        if signaling_mtu < 48 {
            return Err(ConfigError::InvalidValue(format!(
                "AVDTP_SIGNALING_MTU must be at least 48, got {signaling_mtu}"
            )));
        }

        let media_mtu = parse_or(vars, "AVDTP_MEDIA_MTU", defaults.media_mtu)?;
        if usize::from(media_mtu) <= crate::media::RTP_HEADER_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "AVDTP_MEDIA_MTU must exceed the media header, got {media_mtu}"
            )));
        }

        Ok(Self {
            max_links,
            max_endpoints,
            retransmit_timeout: millis_or(
                vars,
                "AVDTP_RETRANSMIT_TIMEOUT_MS",
                defaults.retransmit_timeout,
            )?,
            response_timeout: millis_or(
                vars,
                "AVDTP_RESPONSE_TIMEOUT_MS",
                defaults.response_timeout,
            )?,
            idle_timeout: millis_or(vars, "AVDTP_IDLE_TIMEOUT_MS", defaults.idle_timeout)?,
            tc_connect_timeout: millis_or(
                vars,
                "AVDTP_TC_CONNECT_TIMEOUT_MS",
                defaults.tc_connect_timeout,
            )?,
            tc_disconnect_timeout: millis_or(
                vars,
                "AVDTP_TC_DISCONNECT_TIMEOUT_MS",
                defaults.tc_disconnect_timeout,
            )?,
            max_retransmissions: parse_or(
                vars,
                "AVDTP_MAX_RETRANSMISSIONS",
                defaults.max_retransmissions,
            )?,
            signaling_mtu,
            media_mtu,
            flush_timeout: parse_or(vars, "AVDTP_FLUSH_TIMEOUT", defaults.flush_timeout)?,
            max_signaling_message: parse_or(
                vars,
                "AVDTP_MAX_SIGNALING_MESSAGE",
                defaults.max_signaling_message,
            )?,
            reporting: parse_or(vars, "AVDTP_REPORTING", defaults.reporting)?,
        })
    }

    /// Transport slots needed: one signaling plus media and reporting per
    /// endpoint, for every link.
    #[must_use]
    pub fn transport_slots(&self) -> usize {
        self.max_links * (1 + 2 * self.max_endpoints)
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{key} has unparseable value '{raw}'"))
        }),
    }
}

fn millis_or(
    vars: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(_) => {
            let ms: u64 = parse_or(vars, key, 0)?;
            if ms == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be greater than 0"
                )));
            }
            Ok(Duration::from_millis(ms))
        }
    }
}

/// Logging configuration for the loopback binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

/// Default log filter.
pub const DEFAULT_LOG_FILTER: &str = "avdtp=info";

impl ObservabilityConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `AVDTP_LOG_JSON` is not a boolean.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Ok(Self {
            log_filter: vars
                .get("AVDTP_LOG_FILTER")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json_logs: parse_or(vars, "AVDTP_LOG_JSON", false)?,
        })
    }

    /// # Errors
    ///
    /// See [`ObservabilityConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }
}
