//! Observability for the AVDTP stack.
//!
//! Logging uses `tracing` with one target per layer (`avdtp.ccb`,
//! `avdtp.scb`, `avdtp.ad`, `avdtp.msg`, `avdtp.actor`). Counters go through
//! the `metrics` facade; the embedding application installs the recorder.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `avdtp_commands_sent_total` | Counter | `signal` | Commands transmitted (first attempt) |
//! | `avdtp_retransmissions_total` | Counter | `signal` | Command retransmissions |
//! | `avdtp_command_failures_total` | Counter | `signal`, `reason` | Commands that ended without an accept |
//! | `avdtp_rejects_sent_total` | Counter | `signal`, `code` | Rejects sent to the peer |
//! | `avdtp_media_dropped_total` | Counter | `reason` | Outbound media packets discarded |
//! | `avdtp_transport_opened_total` | Counter | `channel` | Link-layer channels opened |
//! | `avdtp_link_events_total` | Counter | `event` | Signaling links connected / disconnected |
//! | `avdtp_stale_timers_total` | Counter | `timer` | Timer firings for released or re-armed slots |
//! | `avdtp_actor_mailbox_depth` | Gauge | none | Pending requests in the stack actor |

pub mod metrics;
