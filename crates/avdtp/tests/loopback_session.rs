//! Two stack actors joined by the loopback link.
//!
//! Uses a paused clock: a stuck procedure shows up as a timeout instead of a
//! hung test.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use avdtp::actors::{LoopbackHub, StackActorHandle};
use avdtp::{AllowAll, AvdtError, AvdtEvent, LinkState, SepType, StreamState, WriteOutcome};
use avdtp_test_utils::*;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

type Events = mpsc::UnboundedReceiver<AvdtEvent>;

/// Wait for the first event `pick` accepts; everything before it is skipped.
async fn next_matching<T>(events: &mut Events, mut pick: impl FnMut(&AvdtEvent) -> Option<T>) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream open");
            if let Some(found) = pick(&event) {
                return found;
            }
        }
    })
    .await
    .expect("event arrived in time")
}

fn spawn_pair() -> (LoopbackHub, (StackActorHandle, Events), (StackActorHandle, Events)) {
    let hub = LoopbackHub::spawn();
    let (link_a, ind_a) = hub.attach(TEST_PEER_A);
    let (link_b, ind_b) = hub.attach(TEST_PEER_B);
    let a = StackActorHandle::spawn("device-a", test_config(), link_a, ind_a, AllowAll);
    let b = StackActorHandle::spawn("device-b", test_config(), link_b, ind_b, AllowAll);
    (hub, a, b)
}

// ============================================================================
// Full session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_source_streams_to_sink_over_loopback() {
    init_test_tracing();
    let (hub, (source, mut src_events), (sink, mut snk_events)) = spawn_pair();

    let src = source.register(sbc_endpoint(SepType::Source)).await.unwrap();
    let snk = sink.register(sbc_endpoint(SepType::Sink)).await.unwrap();

    // Discover
    source.discover(TEST_PEER_B).await.unwrap();
    let endpoints = next_matching(&mut src_events, |e| match e {
        AvdtEvent::DiscoverCfm { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await
    .unwrap();
    assert_eq!(endpoints.len(), 1);
    let remote = endpoints[0].seid;
    assert_eq!(Some(remote), snk.seid());
    assert_eq!(endpoints[0].sep_type, SepType::Sink);
    next_matching(&mut snk_events, |e| match e {
        AvdtEvent::Connected {
            peer,
            initiator: false,
        } if *peer == TEST_PEER_A => Some(()),
        _ => None,
    })
    .await;

    // Capabilities
    source.get_capabilities(TEST_PEER_B, remote, true).await.unwrap();
    let caps = next_matching(&mut src_events, |e| match e {
        AvdtEvent::GetCapabilitiesCfm { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await
    .unwrap();
    assert_eq!(caps.codec, Some(sbc_codec(&SBC_CAPABILITIES)));
    assert!(caps.delay_reporting);

    // Configure, answered by the sink application
    source
        .set_configuration(src, TEST_PEER_B, remote, sbc_config())
        .await
        .unwrap();
    let label = next_matching(&mut snk_events, |e| match e {
        AvdtEvent::ConfigInd {
            stream,
            peer,
            label,
            config,
            ..
        } => {
            assert_eq!(*stream, snk);
            assert_eq!(*peer, TEST_PEER_A);
            assert_eq!(config, &sbc_config());
            Some(*label)
        }
        _ => None,
    })
    .await;
    sink.config_response(snk, label, Ok(())).await.unwrap();
    next_matching(&mut src_events, |e| match e {
        AvdtEvent::SetConfigCfm { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await
    .unwrap();

    // Open
    source.open(src).await.unwrap();
    let mtu = next_matching(&mut src_events, |e| match e {
        AvdtEvent::OpenCfm { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await
    .unwrap();
    assert!(mtu > 0);
    next_matching(&mut snk_events, |e| match e {
        AvdtEvent::OpenInd { stream, .. } if *stream == snk => Some(()),
        _ => None,
    })
    .await;

    // Start
    source.start(vec![src]).await.unwrap();
    next_matching(&mut src_events, |e| match e {
        AvdtEvent::StartCfm { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await
    .unwrap();
    next_matching(&mut snk_events, |e| match e {
        AvdtEvent::StartInd { stream } if *stream == snk => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(
        source.stream_state(src).await.unwrap(),
        Some(StreamState::Streaming)
    );

    // Media
    for n in 0..3_u32 {
        let outcome = source.write(src, media_packet(n * 128, 32)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Sent);
    }
    for expected in 0..3_u16 {
        let (sequence, timestamp, len) = next_matching(&mut snk_events, |e| match e {
            AvdtEvent::MediaData {
                header, payload, ..
            } => Some((header.sequence, header.timestamp, payload.len())),
            _ => None,
        })
        .await;
        assert_eq!(sequence, expected);
        assert_eq!(timestamp, u32::from(expected) * 128);
        assert_eq!(len, 32);
    }

    // Close
    source.close(src).await.unwrap();
    next_matching(&mut src_events, |e| match e {
        AvdtEvent::CloseCfm { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await
    .unwrap();
    next_matching(&mut snk_events, |e| match e {
        AvdtEvent::CloseInd { stream } if *stream == snk => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(sink.stream_state(snk).await.unwrap(), Some(StreamState::Idle));

    // Disconnect
    source.disconnect(TEST_PEER_B).await.unwrap();
    next_matching(&mut src_events, |e| match e {
        AvdtEvent::Disconnected { peer } if *peer == TEST_PEER_B => Some(()),
        _ => None,
    })
    .await;
    next_matching(&mut snk_events, |e| match e {
        AvdtEvent::Disconnected { peer } if *peer == TEST_PEER_A => Some(()),
        _ => None,
    })
    .await;

    let status = source.get_status().await.unwrap();
    assert_eq!(status.links, 0);
    assert_eq!(status.endpoints, 1);
    assert_eq!(status.transport_channels, 0);
    assert_eq!(
        source.link_state(TEST_PEER_B).await.unwrap(),
        LinkState::Idle
    );

    source.cancel();
    sink.cancel();
    hub.shutdown();
}

// ============================================================================
// Handle behaviour
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_link_released_by_timer() {
    let (hub, (source, mut src_events), (sink, _snk_events)) = spawn_pair();
    sink.register(sbc_endpoint(SepType::Sink)).await.unwrap();

    source.discover(TEST_PEER_B).await.unwrap();
    next_matching(&mut src_events, |e| match e {
        AvdtEvent::DiscoverCfm { .. } => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(
        source.link_state(TEST_PEER_B).await.unwrap(),
        LinkState::Open
    );

    // Nothing keeps the link: the idle timer on the paused clock closes it.
    next_matching(&mut src_events, |e| match e {
        AvdtEvent::Disconnected { peer } if *peer == TEST_PEER_B => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(source.get_status().await.unwrap().links, 0);

    source.cancel();
    sink.cancel();
    hub.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_handle_errors_and_shutdown() {
    let hub = LoopbackHub::spawn();
    let (link, indications) = hub.attach(TEST_PEER_A);
    let (stack, _events) = StackActorHandle::spawn("solo", test_config(), link, indications, AllowAll);

    let status = stack.get_status().await.unwrap();
    assert_eq!(status.links, 0);
    assert_eq!(status.endpoints, 0);

    let stream = stack.register(sbc_endpoint(SepType::Source)).await.unwrap();
    assert_eq!(stack.open(stream).await, Err(AvdtError::WrongState));
    stack.remove(stream).await.unwrap();
    assert_eq!(stack.close(stream).await, Err(AvdtError::BadHandle));
    assert_eq!(stack.disconnect(TEST_PEER_B).await, Err(AvdtError::NotConnected));

    stack.cancel();
    assert!(stack.is_cancelled());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(matches!(
        stack.get_status().await,
        Err(AvdtError::Internal(_))
    ));
    hub.shutdown();
}
