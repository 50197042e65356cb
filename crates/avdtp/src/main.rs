//! AVDTP loopback demo
//!
//! Runs two stacks on one runtime, joined by the in-process loopback link,
//! and walks a source endpoint through a full session against a sink:
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (human-readable or JSON)
//! 3. Spawn the loopback hub and one stack actor per device
//! 4. Register an audio source on device A and a sink on device B
//! 5. Discover, get capabilities, configure, open and start from A
//! 6. Stream a few media packets and close

use std::time::Duration;

use anyhow::{anyhow, Context};
use avdtp::actors::{LoopbackHub, StackActorHandle};
use avdtp::config::{Config, ObservabilityConfig};
use avdtp::{
    AllowAll, AvdtEvent, EndpointConfig, MediaCodecCap, MediaPacket, MediaType, PeerAddr,
    SepType, StreamConfig,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEVICE_A: PeerAddr = PeerAddr([0x00, 0x1b, 0xdc, 0x00, 0x00, 0x0a]);
const DEVICE_B: PeerAddr = PeerAddr([0x00, 0x1b, 0xdc, 0x00, 0x00, 0x0b]);

/// SBC codec type in the audio codec space.
const SBC_CODEC_TYPE: u8 = 0x00;

/// How long to wait for any single confirm.
const EVENT_TIMEOUT: Duration = Duration::from_secs(15);

const MEDIA_PACKETS: u32 = 5;

fn init_tracing(obs: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| obs.log_filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    if obs.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn sbc_endpoint(sep_type: SepType) -> EndpointConfig {
    EndpointConfig {
        media_type: MediaType::Audio,
        sep_type,
        capabilities: StreamConfig {
            media_transport: true,
            delay_reporting: true,
            codec: Some(MediaCodecCap {
                media_type: MediaType::Audio,
                codec_type: SBC_CODEC_TYPE,
                // 44.1/48 kHz, all channel modes, 16 blocks, 8 subbands, loudness.
                info: Bytes::from_static(&[0x3F, 0xFF, 0x02, 0x35]),
            }),
            ..StreamConfig::default()
        },
    }
}

/// Wait for the first event `pick` accepts, logging everything else.
async fn expect_event<T>(
    events: &mut mpsc::UnboundedReceiver<AvdtEvent>,
    what: &str,
    mut pick: impl FnMut(AvdtEvent) -> Option<T>,
) -> anyhow::Result<T> {
    let wait = async {
        while let Some(event) = events.recv().await {
            let shown = format!("{event:?}");
            if let Some(found) = pick(event) {
                return Ok(found);
            }
            info!(target: "avdtp.demo", event = %shown, "Event");
        }
        Err(anyhow!("event stream closed while waiting for {what}"))
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
}

/// Sink side: accept every configuration and count received media.
async fn run_sink(stack: StackActorHandle, mut events: mpsc::UnboundedReceiver<AvdtEvent>) {
    let mut received = 0_u32;
    while let Some(event) = events.recv().await {
        match event {
            AvdtEvent::ConfigInd { stream, label, .. } => {
                if let Err(e) = stack.config_response(stream, label, Ok(())).await {
                    warn!(target: "avdtp.demo", error = %e, "Sink failed to answer configuration");
                }
            }
            AvdtEvent::MediaData {
                header, payload, ..
            } => {
                received += 1;
                info!(
                    target: "avdtp.demo",
                    sequence = header.sequence,
                    timestamp = header.timestamp,
                    bytes = payload.len(),
                    "Sink received media"
                );
            }
            AvdtEvent::Disconnected { peer } => {
                info!(target: "avdtp.demo", %peer, received, "Sink disconnected");
            }
            other => info!(target: "avdtp.demo", event = ?other, "Sink event"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let obs = ObservabilityConfig::from_env().context("invalid observability configuration")?;
    init_tracing(&obs);

    let config = Config::from_env().context("invalid stack configuration")?;
    info!(
        target: "avdtp.demo",
        max_links = config.max_links,
        max_endpoints = config.max_endpoints,
        retransmit_timeout_ms = config.retransmit_timeout.as_millis(),
        "Starting AVDTP loopback demo"
    );

    let hub = LoopbackHub::spawn();
    let (link_a, ind_a) = hub.attach(DEVICE_A);
    let (link_b, ind_b) = hub.attach(DEVICE_B);
    let (source, mut events) =
        StackActorHandle::spawn("device-a", config.clone(), link_a, ind_a, AllowAll);
    let (sink, sink_events) = StackActorHandle::spawn("device-b", config, link_b, ind_b, AllowAll);

    let src = source.register(sbc_endpoint(SepType::Source)).await?;
    sink.register(sbc_endpoint(SepType::Sink)).await?;
    let sink_task = tokio::spawn(run_sink(sink.clone(), sink_events));

    source.discover(DEVICE_B).await?;
    let endpoints = expect_event(&mut events, "discover confirm", |e| match e {
        AvdtEvent::DiscoverCfm { result, .. } => Some(result),
        _ => None,
    })
    .await??;
    let remote = endpoints
        .iter()
        .find(|sep| sep.sep_type == SepType::Sink && !sep.in_use)
        .context("peer has no free sink endpoint")?;
    info!(target: "avdtp.demo", seid = %remote.seid, endpoints = endpoints.len(), "Discovered sink");

    source.get_capabilities(DEVICE_B, remote.seid, true).await?;
    let caps = expect_event(&mut events, "capabilities", |e| match e {
        AvdtEvent::GetCapabilitiesCfm { result, .. } => Some(result),
        _ => None,
    })
    .await??;

    let stream_config = StreamConfig {
        media_transport: true,
        codec: caps.codec.clone(),
        ..StreamConfig::default()
    };
    source
        .set_configuration(src, DEVICE_B, remote.seid, stream_config)
        .await?;
    expect_event(&mut events, "set configuration confirm", |e| match e {
        AvdtEvent::SetConfigCfm { result, .. } => Some(result),
        _ => None,
    })
    .await??;

    source.open(src).await?;
    let mtu = expect_event(&mut events, "open confirm", |e| match e {
        AvdtEvent::OpenCfm { result, .. } => Some(result),
        _ => None,
    })
    .await??;
    info!(target: "avdtp.demo", mtu, "Media transport open");

    source.start(vec![src]).await?;
    expect_event(&mut events, "start confirm", |e| match e {
        AvdtEvent::StartCfm { result, .. } => Some(result),
        _ => None,
    })
    .await??;

    for n in 0..MEDIA_PACKETS {
        let outcome = source
            .write(
                src,
                MediaPacket {
                    timestamp: n * 128,
                    marker: false,
                    payload_type: 96,
                    payload: Bytes::from(vec![0x9C; 64]),
                },
            )
            .await?;
        info!(target: "avdtp.demo", packet = n, ?outcome, "Media written");
    }

    source.close(src).await?;
    expect_event(&mut events, "close confirm", |e| match e {
        AvdtEvent::CloseCfm { result, .. } => Some(result),
        _ => None,
    })
    .await??;

    source.disconnect(DEVICE_B).await?;
    expect_event(&mut events, "disconnect", |e| match e {
        AvdtEvent::Disconnected { .. } => Some(()),
        _ => None,
    })
    .await?;

    let status = source.get_status().await?;
    if status.transport_channels != 0 {
        warn!(
            target: "avdtp.demo",
            channels = status.transport_channels,
            "Transport channels still allocated after disconnect"
        );
    }

    source.cancel();
    sink.cancel();
    hub.shutdown();
    drop(sink);
    if let Err(e) = sink_task.await {
        warn!(target: "avdtp.demo", error = %e, "Sink task failed");
    }

    info!(target: "avdtp.demo", "Demo complete");
    Ok(())
}
