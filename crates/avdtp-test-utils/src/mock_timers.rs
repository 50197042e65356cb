//! Manual timer service and scripted security policy.
//!
//! Nothing fires on its own: a test looks up an armed token, removes it with
//! [`MockTimers::take`] and hands it to the engine's `on_timer`.

use avdtp::{Authorization, CcbTimer, ChannelType, PeerAddr, Role, SecurityPolicy, TimerService, TimerToken};
use std::time::Duration;

/// Timer service that only records what is armed.
#[derive(Debug, Default)]
pub struct MockTimers {
    armed: Vec<(TimerToken, Duration)>,
    arm_count: usize,
    cancel_count: usize,
}

impl MockTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens currently armed, oldest first.
    #[must_use]
    pub fn armed(&self) -> Vec<TimerToken> {
        self.armed.iter().map(|(token, _)| *token).collect()
    }

    #[must_use]
    pub fn is_armed(&self, token: TimerToken) -> bool {
        self.armed.iter().any(|(t, _)| *t == token)
    }

    /// Duration `token` was armed with.
    #[must_use]
    pub fn duration(&self, token: TimerToken) -> Option<Duration> {
        self.armed
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, after)| *after)
    }

    /// Armed signaling timers of the given kind.
    #[must_use]
    pub fn signaling(&self, kind: CcbTimer) -> Vec<TimerToken> {
        self.armed
            .iter()
            .filter(|(t, _)| matches!(t, TimerToken::Signaling { kind: k, .. } if *k == kind))
            .map(|(t, _)| *t)
            .collect()
    }

    /// Number of signaling timers armed, any kind.
    #[must_use]
    pub fn signaling_count(&self) -> usize {
        self.armed
            .iter()
            .filter(|(t, _)| matches!(t, TimerToken::Signaling { .. }))
            .count()
    }

    /// Armed transport timers.
    #[must_use]
    pub fn transport(&self) -> Vec<TimerToken> {
        self.armed
            .iter()
            .filter(|(t, _)| matches!(t, TimerToken::Transport { .. }))
            .map(|(t, _)| *t)
            .collect()
    }

    /// Remove an armed token so it can be delivered to the engine.
    pub fn take(&mut self, token: TimerToken) -> Option<TimerToken> {
        let pos = self.armed.iter().position(|(t, _)| *t == token)?;
        Some(self.armed.remove(pos).0)
    }

    #[must_use]
    pub fn arm_count(&self) -> usize {
        self.arm_count
    }

    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.cancel_count
    }
}

impl TimerService for MockTimers {
    fn arm(&mut self, token: TimerToken, after: Duration) {
        self.arm_count += 1;
        self.armed.retain(|(t, _)| *t != token);
        self.armed.push((token, after));
    }

    fn cancel(&mut self, token: TimerToken) {
        self.cancel_count += 1;
        self.armed.retain(|(t, _)| *t != token);
    }
}

/// Security policy returning a fixed decision and logging every query.
#[derive(Debug)]
pub struct ScriptedSecurity {
    decision: Authorization,
    queries: Vec<(PeerAddr, ChannelType, Role)>,
}

impl Default for ScriptedSecurity {
    fn default() -> Self {
        Self::new(Authorization::Allow)
    }
}

impl ScriptedSecurity {
    #[must_use]
    pub fn new(decision: Authorization) -> Self {
        Self {
            decision,
            queries: Vec::new(),
        }
    }

    pub fn set_decision(&mut self, decision: Authorization) {
        self.decision = decision;
    }

    #[must_use]
    pub fn queries(&self) -> &[(PeerAddr, ChannelType, Role)] {
        &self.queries
    }
}

impl SecurityPolicy for ScriptedSecurity {
    fn authorize(&mut self, peer: PeerAddr, channel: ChannelType, role: Role) -> Authorization {
        self.queries.push((peer, channel, role));
        self.decision
    }
}
