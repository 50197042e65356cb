//! Stream controller lifecycle driven from both ends.
//!
//! Source tests run the stack as initiator against a scripted sink; sink
//! tests let the scripted peer drive configuration, open and start.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use avdtp::media;
use avdtp::msg::{Command, Message, Reject, Response, SignalId};
use avdtp::{
    AbortCause, AvdtError, AvdtEvent, ChannelType, ConfigRejection, ErrorCode, LinkIndication,
    MediaCodecCap, MediaType, ProcedureError, Role, Seid, SepType, StreamConfig, StreamState,
    TimerToken, WriteOutcome, WriteResult,
};
use avdtp_test_utils::*;
use bytes::Bytes;

fn seid(n: u8) -> Seid {
    Seid::new(n).unwrap()
}

fn reject_code(message: &Message) -> ErrorCode {
    let Message::Reject(reject) = message else {
        panic!("expected a reject, got {message:?}");
    };
    reject.code
}

// ============================================================================
// Source side
// ============================================================================

#[test]
fn test_source_session_end_to_end() {
    init_test_tracing();
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Streaming));
    assert_eq!(rig.stack.stream_peer(stream), Some((TEST_PEER_A, seid(1))));
    assert_eq!(rig.stack.stream_config(stream), Some(&sbc_config()));

    for ts in [0, 128] {
        let outcome = rig.stack.write(stream, media_packet(ts, 40)).unwrap();
        assert_eq!(outcome, WriteOutcome::Sent);
    }
    let packets = rig.link().take_writes_on(media_lcid);
    assert_eq!(packets.len(), 2);
    for (expected_seq, packet) in packets.into_iter().enumerate() {
        let (header, payload) = media::decode(packet).unwrap();
        assert_eq!(usize::from(header.sequence), expected_seq);
        assert_eq!(header.ssrc, u32::from(SBC_CODEC_TYPE) + 1);
        assert_eq!(header.payload_type, 96);
        assert_eq!(payload.len(), 40);
    }

    rig.stack.close(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(sent.2, Message::Command(Command::Close { acp_seid: seid(1) }));
    rig.peer_accepts(TEST_PEER_A, &sent, Response::Empty);
    assert!(rig.stack.timers().is_armed(TimerToken::Transport { stream }));

    assert_eq!(rig.complete_disconnects(), vec![media_lcid]);
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::CloseCfm {
            stream,
            result: Ok(())
        }]
    );
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Idle));
    assert_eq!(rig.stack.stream_peer(stream), None);
    assert_eq!(rig.stack.transport_channels(), 1);
    assert!(!rig.stack.timers().is_armed(TimerToken::Transport { stream }));
    assert_eq!(rig.stack.timers().signaling(avdtp::CcbTimer::Idle).len(), 1);
}

#[test]
fn test_writes_dropped_unless_streaming() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));
    assert_eq!(
        rig.stack.write(stream, media_packet(0, 10)).unwrap(),
        WriteOutcome::Dropped
    );

    rig.open_stream(TEST_PEER_A, stream);
    assert_eq!(
        rig.stack.write(stream, media_packet(0, 10)).unwrap(),
        WriteOutcome::Dropped
    );

    rig.start_stream(TEST_PEER_A, stream);
    assert_eq!(
        rig.stack.write(stream, media_packet(0, 10)).unwrap(),
        WriteOutcome::Sent
    );
}

#[test]
fn test_write_to_unknown_stream_is_bad_handle() {
    let mut rig = TestStack::new();
    let stream = rig.stack.register(sbc_endpoint(SepType::Source)).unwrap();
    rig.stack.remove(stream).unwrap();
    assert_eq!(
        rig.stack.write(stream, media_packet(0, 10)),
        Err(AvdtError::BadHandle)
    );
}

#[test]
fn test_congested_media_holds_one_packet() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.link().set_write_result(WriteResult::Congested);
    assert_eq!(
        rig.stack.write(stream, media_packet(0, 10)).unwrap(),
        WriteOutcome::Queued
    );
    // Congested: nothing new reaches the link and no sequence is consumed.
    assert_eq!(
        rig.stack.write(stream, media_packet(1, 10)).unwrap(),
        WriteOutcome::Dropped
    );
    assert_eq!(rig.link().take_writes_on(media_lcid).len(), 1);

    rig.link().set_write_result(WriteResult::Accepted);
    rig.indicate(LinkIndication::Congestion {
        lcid: media_lcid,
        congested: false,
    });
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::Congestion {
            stream,
            congested: false
        }]
    );
    let resent = rig.link().take_writes_on(media_lcid);
    assert_eq!(resent.len(), 1);
    let (header, _) = media::decode(resent[0].clone()).unwrap();
    assert_eq!(header.sequence, 0);
    assert_eq!(header.timestamp, 0);

    rig.stack.write(stream, media_packet(2, 10)).unwrap();
    let next = rig.link().take_writes_on(media_lcid);
    let (header, _) = media::decode(next[0].clone()).unwrap();
    assert_eq!(header.sequence, 1);
}

#[test]
fn test_failed_write_leaves_no_sequence_gap() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.stack.write(stream, media_packet(0, 10)).unwrap();
    rig.link().set_write_result(WriteResult::Failed);
    assert_eq!(
        rig.stack.write(stream, media_packet(1, 10)).unwrap(),
        WriteOutcome::Dropped
    );
    rig.link().set_write_result(WriteResult::Accepted);
    assert_eq!(
        rig.stack.write(stream, media_packet(2, 10)).unwrap(),
        WriteOutcome::Sent
    );

    let sequences: Vec<u16> = rig
        .link()
        .take_writes_on(media_lcid)
        .into_iter()
        .map(|packet| media::decode(packet).unwrap().0.sequence)
        .collect();
    // The failed packet is logged by the mock but never reached the peer.
    assert_eq!(sequences, vec![0, 1, 1]);
}

#[test]
fn test_suspend_returns_to_open() {
    let mut rig = TestStack::new();
    let (stream, _) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.stack.suspend(&[stream]).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(sent.2, Message::Command(Command::Suspend { seids: vec![seid(1)] }));
    rig.peer_accepts(TEST_PEER_A, &sent, Response::Empty);
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::SuspendCfm {
            stream,
            result: Ok(())
        }]
    );
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Open));
}

#[test]
fn test_start_rejected_stays_open() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));
    rig.open_stream(TEST_PEER_A, stream);

    rig.stack.start(&[stream]).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    rig.peer_rejects(
        TEST_PEER_A,
        &sent,
        Reject::with_seids(ErrorCode::BAD_STATE, vec![seid(1)]),
    );
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::StartCfm {
            stream,
            result: Err(ProcedureError::Rejected {
                code: ErrorCode::BAD_STATE,
                category: None,
                seids: vec![seid(1)],
            }),
        }]
    );
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Open));
}

#[test]
fn test_start_reject_names_failing_endpoint() {
    let mut rig = TestStack::new();
    let first = rig.configured_source(TEST_PEER_A, seid(1));
    let second = rig.configured_source(TEST_PEER_A, seid(2));
    rig.open_stream(TEST_PEER_A, first);
    rig.open_stream(TEST_PEER_A, second);
    rig.events();

    rig.stack.start(&[first, second]).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(
        sent.2,
        Message::Command(Command::Start {
            seids: vec![seid(1), seid(2)]
        })
    );
    rig.peer_rejects(
        TEST_PEER_A,
        &sent,
        Reject::with_seids(ErrorCode::BAD_STATE, vec![seid(2)]),
    );

    let rejected = Err(ProcedureError::Rejected {
        code: ErrorCode::BAD_STATE,
        category: None,
        seids: vec![seid(2)],
    });
    let events = rig.events();
    assert_eq!(events.len(), 2, "{events:?}");
    for stream in [first, second] {
        assert!(
            events.contains(&AvdtEvent::StartCfm {
                stream,
                result: rejected.clone()
            }),
            "{events:?}"
        );
        assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Open));
    }
}

#[test]
fn test_start_of_unopened_stream_not_ready() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));
    assert_eq!(
        rig.stack.start(&[stream]),
        Err(AvdtError::StreamsNotReady(vec![stream]))
    );
    assert!(rig.sent_to(TEST_PEER_A).is_empty());
}

#[test]
fn test_get_configuration_reads_peer_config() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));

    rig.stack.get_configuration(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(sent.2, Message::Command(Command::GetConfiguration { acp_seid: seid(1) }));
    rig.peer_accepts(
        TEST_PEER_A,
        &sent,
        Response::Configuration {
            config: sbc_config(),
        },
    );
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::GetConfigCfm {
            stream,
            result: Ok(sbc_config())
        }]
    );
}

#[test]
fn test_open_rejected_returns_to_configured() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));

    rig.stack.open(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    rig.peer_rejects(TEST_PEER_A, &sent, Reject::new(ErrorCode::BAD_STATE));
    assert!(matches!(
        rig.events().as_slice(),
        [AvdtEvent::OpenCfm { result: Err(ProcedureError::Rejected { .. }), .. }]
    ));
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Configured));
    assert!(rig.link().last_connect(ChannelType::Media).is_none());
}

#[test]
fn test_media_connect_failure_aborts_opening() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));

    rig.stack.open(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    rig.peer_accepts(TEST_PEER_A, &sent, Response::Empty);
    let (_, media_lcid) = rig.link().last_connect(ChannelType::Media).unwrap();

    rig.indicate(LinkIndication::ConnectCfm {
        lcid: media_lcid,
        success: false,
    });
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::AbortInd {
            stream,
            cause: AbortCause::TransportFailure
        }]
    );
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Idle));
}

// ============================================================================
// Abort and close
// ============================================================================

#[test]
fn test_local_abort_confirms_after_transport_gone() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.stack.abort(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(sent.2, Message::Command(Command::Abort { acp_seid: seid(1) }));
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Closing));
    rig.peer_accepts(TEST_PEER_A, &sent, Response::Empty);
    assert!(rig.events().is_empty());

    assert_eq!(rig.complete_disconnects(), vec![media_lcid]);
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::AbortCfm {
            stream,
            result: Ok(())
        }]
    );
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Idle));
}

#[test]
fn test_peer_abort_indicated() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    let label = rig.peer_command(TEST_PEER_A, Command::Abort { acp_seid: seid(1) });
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(sent.0, label);
    assert_eq!(sent.2, Message::Accept(Response::Empty));

    assert_eq!(rig.complete_disconnects(), vec![media_lcid]);
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::AbortInd {
            stream,
            cause: AbortCause::Peer
        }]
    );
}

#[test]
fn test_peer_close_waits_for_peer_disconnect() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.peer_command(TEST_PEER_A, Command::Close { acp_seid: seid(1) });
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Closing));
    assert!(rig.link().disconnects().is_empty());
    assert!(rig.stack.timers().is_armed(TimerToken::Transport { stream }));

    rig.indicate(LinkIndication::Disconnected { lcid: media_lcid });
    assert_eq!(rig.events(), vec![AvdtEvent::CloseInd { stream }]);
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Idle));
}

#[test]
fn test_peer_close_forced_after_timeout() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.peer_command(TEST_PEER_A, Command::Close { acp_seid: seid(1) });
    rig.sent_one(TEST_PEER_A);
    rig.fire_transport(stream);

    assert_eq!(rig.link().disconnects(), vec![media_lcid]);
    assert_eq!(rig.events(), vec![AvdtEvent::CloseInd { stream }]);
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Idle));

    // The late completion finds nothing left to close.
    rig.complete_disconnects();
    assert!(rig.events().is_empty());
}

#[test]
fn test_close_rejected_aborts_stream() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.stack.close(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    rig.peer_rejects(TEST_PEER_A, &sent, Reject::new(ErrorCode::BAD_STATE));

    let abort = rig.sent_one(TEST_PEER_A);
    assert_eq!(abort.2, Message::Command(Command::Abort { acp_seid: seid(1) }));
    assert_eq!(rig.complete_disconnects(), vec![media_lcid]);
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::CloseCfm {
            stream,
            result: Err(ProcedureError::Rejected {
                code: ErrorCode::BAD_STATE,
                category: None,
                seids: Vec::new(),
            }),
        }]
    );
}

#[test]
fn test_signaling_loss_while_streaming() {
    let mut rig = TestStack::new();
    let (stream, media_lcid) = rig.streaming_source(TEST_PEER_A, seid(1));
    let signaling = rig.signaling_lcid(TEST_PEER_A);

    rig.indicate(LinkIndication::Disconnected { lcid: signaling });
    assert_eq!(
        rig.events(),
        vec![
            AvdtEvent::TransportClosed {
                stream,
                old_state: StreamState::Streaming
            },
            AvdtEvent::Disconnected { peer: TEST_PEER_A },
        ]
    );
    assert_eq!(rig.link().disconnects(), vec![media_lcid]);
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Idle));
    assert_eq!(rig.stack.link_count(), 0);
}

// ============================================================================
// Reconfigure, security and delay reporting
// ============================================================================

fn sbc_48k() -> StreamConfig {
    StreamConfig {
        codec: Some(MediaCodecCap {
            media_type: MediaType::Audio,
            codec_type: SBC_CODEC_TYPE,
            info: Bytes::from_static(&[0x11, 0x15, 0x02, 0x35]),
        }),
        ..StreamConfig::default()
    }
}

#[test]
fn test_reconfigure_reject_keeps_configuration() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));
    rig.open_stream(TEST_PEER_A, stream);

    rig.stack.reconfigure(stream, sbc_48k()).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(sent.1, SignalId::Reconfigure);
    rig.peer_rejects(
        TEST_PEER_A,
        &sent,
        Reject::with_category(ErrorCode::UNSUPPORTED_CONFIGURATION, 0x07),
    );
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::ReconfigCfm {
            stream,
            result: Err(ProcedureError::Rejected {
                code: ErrorCode::UNSUPPORTED_CONFIGURATION,
                category: Some(0x07),
                seids: Vec::new(),
            }),
        }]
    );
    assert_eq!(rig.stack.stream_config(stream), Some(&sbc_config()));
}

#[test]
fn test_reconfigure_accept_merges_codec() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));
    rig.open_stream(TEST_PEER_A, stream);

    rig.stack.reconfigure(stream, sbc_48k()).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    rig.peer_accepts(TEST_PEER_A, &sent, Response::Empty);

    let config = rig.stack.stream_config(stream).unwrap();
    assert!(config.media_transport);
    assert_eq!(config.codec, sbc_48k().codec);
}

#[test]
fn test_reconfigure_preconditions() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));
    assert_eq!(rig.stack.reconfigure(stream, sbc_48k()), Err(AvdtError::WrongState));

    rig.open_stream(TEST_PEER_A, stream);
    let transport = StreamConfig {
        media_transport: true,
        ..sbc_48k()
    };
    assert!(matches!(
        rig.stack.reconfigure(stream, transport),
        Err(AvdtError::InvalidParam(_))
    ));
    assert!(rig.sent_to(TEST_PEER_A).is_empty());
}

#[test]
fn test_security_exchange_both_ways() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));

    rig.stack.security(stream, Bytes::from_static(b"cp-req")).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    assert_eq!(
        sent.2,
        Message::Command(Command::Security {
            acp_seid: seid(1),
            data: Bytes::from_static(b"cp-req"),
        })
    );
    rig.peer_accepts(
        TEST_PEER_A,
        &sent,
        Response::Security {
            data: Bytes::from_static(b"cp-rsp"),
        },
    );
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::SecurityCfm {
            stream,
            result: Ok(Bytes::from_static(b"cp-rsp"))
        }]
    );

    let label = rig.peer_command(
        TEST_PEER_A,
        Command::Security {
            acp_seid: stream.seid().unwrap(),
            data: Bytes::from_static(b"peer"),
        },
    );
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::SecurityInd {
            stream,
            label,
            data: Bytes::from_static(b"peer")
        }]
    );
    rig.stack
        .security_response(stream, label, Err(ErrorCode::BAD_CP_FORMAT))
        .unwrap();
    let answer = rig.sent_one(TEST_PEER_A);
    assert_eq!(answer.0, label);
    assert_eq!(reject_code(&answer.2), ErrorCode::BAD_CP_FORMAT);
}

#[test]
fn test_delay_report_from_peer() {
    let mut rig = TestStack::new();
    let stream = rig.configured_source(TEST_PEER_A, seid(1));

    rig.peer_command(
        TEST_PEER_A,
        Command::DelayReport {
            acp_seid: stream.seid().unwrap(),
            delay: 1_500,
        },
    );
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::DelayReportInd {
            stream,
            delay: 1_500
        }]
    );
}

// ============================================================================
// Sink side
// ============================================================================

#[test]
fn test_sink_session_driven_by_peer() {
    init_test_tracing();
    let mut rig = TestStack::new();
    let sink = rig.stack.register(sbc_endpoint(SepType::Sink)).unwrap();
    let local = sink.seid().unwrap();
    rig.accept_signaling_from(TEST_PEER_A);
    rig.events();

    let label = rig.peer_command(
        TEST_PEER_A,
        Command::SetConfiguration {
            acp_seid: local,
            int_seid: seid(3),
            config: sbc_config(),
        },
    );
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::ConfigInd {
            stream: sink,
            peer: TEST_PEER_A,
            int_seid: seid(3),
            label,
            config: sbc_config(),
        }]
    );
    rig.stack.config_response(sink, label, Ok(())).unwrap();
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert_eq!(rig.stack.stream_state(sink), Some(StreamState::Configured));

    rig.peer_command(TEST_PEER_A, Command::Open { acp_seid: local });
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert!(rig.stack.timers().is_armed(TimerToken::Transport { stream: sink }));

    let media_lcid = rig.accept_transport_from(TEST_PEER_A);
    assert_eq!(rig.link().connect_answer(media_lcid), Some(true));
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::OpenInd {
            stream: sink,
            mtu: TEST_PEER_MTU
        }]
    );
    assert!(rig
        .stack
        .security_policy()
        .queries()
        .contains(&(TEST_PEER_A, ChannelType::Media, Role::Acceptor)));

    rig.peer_command(TEST_PEER_A, Command::Start { seids: vec![local] });
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert_eq!(rig.events(), vec![AvdtEvent::StartInd { stream: sink }]);

    let packet = media::encode(&media_packet(4_096, 20), 7, 1);
    rig.indicate(LinkIndication::Data {
        lcid: media_lcid,
        data: packet,
    });
    let events = rig.events();
    let [AvdtEvent::MediaData { stream, header, payload }] = events.as_slice() else {
        panic!("expected one media packet, got {events:?}");
    };
    assert_eq!(*stream, sink);
    assert_eq!(header.sequence, 7);
    assert_eq!(header.timestamp, 4_096);
    assert_eq!(payload.len(), 20);

    rig.peer_command(TEST_PEER_A, Command::Suspend { seids: vec![local] });
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert_eq!(rig.events(), vec![AvdtEvent::SuspendInd { stream: sink }]);
    assert_eq!(rig.stack.stream_state(sink), Some(StreamState::Open));
}

#[test]
fn test_sink_without_local_reporting_reserves_media_only() {
    let config = avdtp::Config {
        reporting: false,
        ..test_config()
    };
    let mut rig = TestStack::with_config(config);
    let mut endpoint = sbc_endpoint(SepType::Sink);
    endpoint.capabilities.reporting = true;
    let sink = rig.stack.register(endpoint).unwrap();
    let local = sink.seid().unwrap();
    rig.accept_signaling_from(TEST_PEER_A);

    let label = rig.peer_command(
        TEST_PEER_A,
        Command::SetConfiguration {
            acp_seid: local,
            int_seid: seid(3),
            config: StreamConfig {
                reporting: true,
                ..sbc_config()
            },
        },
    );
    rig.stack.config_response(sink, label, Ok(())).unwrap();
    rig.sent_one(TEST_PEER_A);
    rig.events();

    rig.peer_command(TEST_PEER_A, Command::Open { acp_seid: local });
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    // Signaling plus the reserved media slot.
    assert_eq!(rig.stack.transport_channels(), 2);

    let media_lcid = rig.accept_transport_from(TEST_PEER_A);
    assert_eq!(rig.link().connect_answer(media_lcid), Some(true));
    assert_eq!(
        rig.events(),
        vec![AvdtEvent::OpenInd {
            stream: sink,
            mtu: TEST_PEER_MTU
        }]
    );

    let reporting_lcid = rig.accept_transport_from(TEST_PEER_A);
    assert_eq!(rig.link().connect_answer(reporting_lcid), Some(false));
    assert_eq!(rig.stack.transport_channels(), 2);
    assert_eq!(rig.stack.stream_state(sink), Some(StreamState::Open));
}

#[test]
fn test_sink_rejects_configuration() {
    let mut rig = TestStack::new();
    let sink = rig.stack.register(sbc_endpoint(SepType::Sink)).unwrap();
    rig.accept_signaling_from(TEST_PEER_A);

    let label = rig.peer_command(
        TEST_PEER_A,
        Command::SetConfiguration {
            acp_seid: sink.seid().unwrap(),
            int_seid: seid(3),
            config: sbc_config(),
        },
    );
    rig.events();
    rig.stack
        .config_response(
            sink,
            label,
            Err(ConfigRejection {
                code: ErrorCode::UNSUPPORTED_CONFIGURATION,
                category: 0x07,
            }),
        )
        .unwrap();

    let answer = rig.sent_one(TEST_PEER_A);
    assert_eq!(
        answer.2,
        Message::Reject(Reject::with_category(ErrorCode::UNSUPPORTED_CONFIGURATION, 0x07))
    );
    assert_eq!(rig.stack.stream_state(sink), Some(StreamState::Idle));
    assert_eq!(rig.stack.stream_peer(sink), None);

    // The endpoint is free for the next attempt.
    rig.peer_command(
        TEST_PEER_A,
        Command::SetConfiguration {
            acp_seid: sink.seid().unwrap(),
            int_seid: seid(4),
            config: sbc_config(),
        },
    );
    assert!(matches!(rig.events().as_slice(), [AvdtEvent::ConfigInd { .. }]));
}

#[test]
fn test_second_configuration_of_busy_sink_rejected() {
    let mut rig = TestStack::new();
    let sink = rig.stack.register(sbc_endpoint(SepType::Sink)).unwrap();
    rig.accept_signaling_from(TEST_PEER_A);
    let config = Command::SetConfiguration {
        acp_seid: sink.seid().unwrap(),
        int_seid: seid(3),
        config: sbc_config(),
    };

    rig.peer_command(TEST_PEER_A, config.clone());
    rig.events();
    rig.peer_command(TEST_PEER_A, config);
    let answer = rig.sent_one(TEST_PEER_A);
    assert_eq!(reject_code(&answer.2), ErrorCode::SEP_IN_USE);
    assert!(rig.events().is_empty());
}

#[test]
fn test_configuration_outside_capabilities_rejected() {
    let mut rig = TestStack::new();
    let sink = rig.stack.register(sbc_endpoint(SepType::Sink)).unwrap();
    rig.accept_signaling_from(TEST_PEER_A);

    let foreign = StreamConfig {
        media_transport: true,
        codec: Some(MediaCodecCap {
            media_type: MediaType::Audio,
            codec_type: 0x02,
            info: Bytes::from_static(&[0x80, 0x01, 0x04, 0x83, 0xE8, 0x00]),
        }),
        ..StreamConfig::default()
    };
    rig.peer_command(
        TEST_PEER_A,
        Command::SetConfiguration {
            acp_seid: sink.seid().unwrap(),
            int_seid: seid(3),
            config: foreign,
        },
    );
    let answer = rig.sent_one(TEST_PEER_A);
    let Message::Reject(reject) = &answer.2 else {
        panic!("expected a reject, got {:?}", answer.2);
    };
    assert!(reject.category.is_some());
    assert!(rig.events().is_empty());
    assert_eq!(rig.stack.stream_state(sink), Some(StreamState::Idle));
}

#[test]
fn test_commands_to_idle_endpoint_not_in_use() {
    let mut rig = TestStack::new();
    let sink = rig.stack.register(sbc_endpoint(SepType::Sink)).unwrap();
    rig.accept_signaling_from(TEST_PEER_A);
    let local = sink.seid().unwrap();

    for command in [
        Command::Open { acp_seid: local },
        Command::Close { acp_seid: local },
        Command::GetConfiguration { acp_seid: local },
    ] {
        rig.peer_command(TEST_PEER_A, command);
        assert_eq!(reject_code(&rig.sent_one(TEST_PEER_A).2), ErrorCode::SEP_NOT_IN_USE);
    }

    // Abort always succeeds.
    rig.peer_command(TEST_PEER_A, Command::Abort { acp_seid: local });
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert!(rig.events().is_empty());
}

#[test]
fn test_open_while_streaming_is_bad_state() {
    let mut rig = TestStack::new();
    let (stream, _) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.peer_command(TEST_PEER_A, Command::Open { acp_seid: stream.seid().unwrap() });
    assert_eq!(reject_code(&rig.sent_one(TEST_PEER_A).2), ErrorCode::BAD_STATE);
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Streaming));
}

#[test]
fn test_peer_start_rejects_only_unready_endpoints() {
    let mut rig = TestStack::new();
    let ready = rig.configured_source(TEST_PEER_A, seid(1));
    rig.open_stream(TEST_PEER_A, ready);
    let idle = rig.stack.register(sbc_endpoint(SepType::Source)).unwrap();

    rig.peer_command(
        TEST_PEER_A,
        Command::Start {
            seids: vec![ready.seid().unwrap(), idle.seid().unwrap()],
        },
    );
    let answer = rig.sent_one(TEST_PEER_A);
    assert_eq!(
        answer.2,
        Message::Reject(Reject::with_seids(ErrorCode::BAD_STATE, vec![idle.seid().unwrap()]))
    );
    assert!(rig.events().is_empty());
    assert_eq!(rig.stack.stream_state(ready), Some(StreamState::Open));

    rig.peer_command(
        TEST_PEER_A,
        Command::Start {
            seids: vec![ready.seid().unwrap()],
        },
    );
    assert_eq!(rig.sent_one(TEST_PEER_A).2, Message::Accept(Response::Empty));
    assert_eq!(rig.events(), vec![AvdtEvent::StartInd { stream: ready }]);
    assert_eq!(rig.stack.stream_state(ready), Some(StreamState::Streaming));
}

// ============================================================================
// Endpoint removal
// ============================================================================

#[test]
fn test_remove_deferred_until_idle() {
    let mut rig = TestStack::new();
    let (stream, _) = rig.streaming_source(TEST_PEER_A, seid(1));

    rig.stack.remove(stream).unwrap();
    assert_eq!(rig.stack.endpoint_count(), 1);
    assert_eq!(rig.stack.stream_state(stream), Some(StreamState::Streaming));

    rig.stack.abort(stream).unwrap();
    let sent = rig.sent_one(TEST_PEER_A);
    rig.peer_accepts(TEST_PEER_A, &sent, Response::Empty);
    rig.complete_disconnects();

    assert_eq!(rig.stack.endpoint_count(), 0);
    assert_eq!(rig.stack.stream_state(stream), None);
    assert_eq!(rig.stack.close(stream), Err(AvdtError::BadHandle));
}

#[test]
fn test_removed_slot_reused_with_fresh_handle() {
    let mut rig = TestStack::new();
    let first = rig.stack.register(sbc_endpoint(SepType::Source)).unwrap();
    rig.stack.remove(first).unwrap();
    let second = rig.stack.register(sbc_endpoint(SepType::Source)).unwrap();

    assert_eq!(first.seid(), second.seid());
    assert_ne!(first, second);
    assert_eq!(rig.stack.stream_state(first), None);
    assert_eq!(rig.stack.stream_state(second), Some(StreamState::Idle));
}
