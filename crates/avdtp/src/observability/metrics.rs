//! Metric definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `avdtp_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! - `signal`: 13 signal names
//! - `code`: 17 reject codes plus `unknown`
//! - `reason`: bounded by `ProcedureError` and the media drop reasons
//! - `channel`: signaling, media, reporting

use metrics::{counter, gauge};

/// Record a command sent for the first time.
///
/// Metric: `avdtp_commands_sent_total`
/// Labels: `signal`
pub fn record_command_sent(signal: &'static str) {
    counter!("avdtp_commands_sent_total", "signal" => signal).increment(1);
}

/// Record a retransmission of the in-flight command.
///
/// Metric: `avdtp_retransmissions_total`
/// Labels: `signal`
pub fn record_retransmission(signal: &'static str) {
    counter!("avdtp_retransmissions_total", "signal" => signal).increment(1);
}

/// Record a command that completed without an accept.
///
/// Metric: `avdtp_command_failures_total`
/// Labels: `signal`, `reason` (rejected, general_reject, timeout, link_closed, ...)
pub fn record_command_failed(signal: &'static str, reason: &'static str) {
    counter!(
        "avdtp_command_failures_total",
        "signal" => signal,
        "reason" => reason
    )
    .increment(1);
}

/// Record a reject sent in answer to a peer command.
///
/// Metric: `avdtp_rejects_sent_total`
/// Labels: `signal`, `code`
pub fn record_reject_sent(signal: &'static str, code: &'static str) {
    counter!("avdtp_rejects_sent_total", "signal" => signal, "code" => code).increment(1);
}

/// Record an outbound media packet that was discarded.
///
/// Metric: `avdtp_media_dropped_total`
/// Labels: `reason` (pending, congested, state, write_failed)
pub fn record_media_dropped(reason: &'static str) {
    counter!("avdtp_media_dropped_total", "reason" => reason).increment(1);
}

/// Record a link-layer channel reaching the open state.
///
/// Metric: `avdtp_transport_opened_total`
/// Labels: `channel`
pub fn record_transport_opened(channel: &'static str) {
    counter!("avdtp_transport_opened_total", "channel" => channel).increment(1);
}

/// Record a signaling link coming up or going down.
///
/// Metric: `avdtp_link_events_total`
/// Labels: `event` (connected, disconnected)
pub fn record_link_event(event: &'static str) {
    counter!("avdtp_link_events_total", "event" => event).increment(1);
}

/// Record a timer that fired after its owner moved on.
///
/// Metric: `avdtp_stale_timers_total`
/// Labels: `timer` (signaling, transport)
pub fn record_timer_stale(timer: &'static str) {
    counter!("avdtp_stale_timers_total", "timer" => timer).increment(1);
}

/// Set the number of requests waiting in the stack actor's mailbox.
///
/// Metric: `avdtp_actor_mailbox_depth`
pub fn set_actor_mailbox_depth(depth: usize) {
    // usize to f64 conversion is safe for realistic mailbox depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("avdtp_actor_mailbox_depth").set(depth as f64);
}
