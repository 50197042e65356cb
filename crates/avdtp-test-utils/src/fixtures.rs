//! Fixed addresses, endpoints and configurations for deterministic tests.

use avdtp::{Config, EndpointConfig, MediaCodecCap, MediaPacket, MediaType, PeerAddr, SepType, StreamConfig};
use bytes::Bytes;
use std::sync::Once;
use std::time::Duration;

pub const TEST_PEER_A: PeerAddr = PeerAddr([0x00, 0x1b, 0xdc, 0x0f, 0x00, 0x01]);
pub const TEST_PEER_B: PeerAddr = PeerAddr([0x00, 0x1b, 0xdc, 0x0f, 0x00, 0x02]);
pub const TEST_PEER_C: PeerAddr = PeerAddr([0x00, 0x1b, 0xdc, 0x0f, 0x00, 0x03]);

/// SBC codec type.
pub const SBC_CODEC_TYPE: u8 = 0x00;

/// MTU the simulated peer reports on every channel.
pub const TEST_PEER_MTU: u16 = 672;

/// Full SBC capability octets.
pub const SBC_CAPABILITIES: [u8; 4] = [0x3F, 0xFF, 0x02, 0x35];

/// One concrete SBC configuration (44.1 kHz joint stereo).
pub const SBC_SELECTED: [u8; 4] = [0x21, 0x15, 0x02, 0x35];

#[must_use]
pub fn sbc_codec(info: &'static [u8]) -> MediaCodecCap {
    MediaCodecCap {
        media_type: MediaType::Audio,
        codec_type: SBC_CODEC_TYPE,
        info: Bytes::from_static(info),
    }
}

/// Audio endpoint offering SBC, media transport and delay reporting.
#[must_use]
pub fn sbc_endpoint(sep_type: SepType) -> EndpointConfig {
    EndpointConfig {
        media_type: MediaType::Audio,
        sep_type,
        capabilities: StreamConfig {
            media_transport: true,
            delay_reporting: true,
            codec: Some(sbc_codec(&SBC_CAPABILITIES)),
            ..StreamConfig::default()
        },
    }
}

/// Configuration a source would pick for an [`sbc_endpoint`] sink.
#[must_use]
pub fn sbc_config() -> StreamConfig {
    StreamConfig {
        media_transport: true,
        codec: Some(sbc_codec(&SBC_SELECTED)),
        ..StreamConfig::default()
    }
}

/// Media packet with a recognizable payload.
#[must_use]
pub fn media_packet(timestamp: u32, len: usize) -> MediaPacket {
    MediaPacket {
        timestamp,
        marker: false,
        payload_type: 96,
        payload: Bytes::from(vec![0xA5; len]),
    }
}

/// Stack configuration with short timers and room for a few links.
#[must_use]
pub fn test_config() -> Config {
    Config {
        max_links: 2,
        max_endpoints: 4,
        retransmit_timeout: Duration::from_millis(500),
        response_timeout: Duration::from_millis(800),
        idle_timeout: Duration::from_millis(1_000),
        tc_connect_timeout: Duration::from_millis(1_500),
        tc_disconnect_timeout: Duration::from_millis(1_500),
        ..Config::default()
    }
}

static TRACING: Once = Once::new();

/// Install a test subscriber once per process; honours `RUST_LOG`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("avdtp=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
