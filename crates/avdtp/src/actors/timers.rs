//! Timer service backed by tokio tasks.
//!
//! Every arming spawns a task that sleeps and then posts the token, tagged
//! with a sequence number, back to the owning actor. A cancelled or re-armed
//! timer may still have its firing in flight; [`TokioTimers::fired`] tells
//! the actor whether a firing is the current arming of its token.

use crate::link::{TimerService, TimerToken};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A timer expiry posted to the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub token: TimerToken,
    pub seq: u64,
}

#[derive(Debug)]
struct Armed {
    seq: u64,
    cancel_token: CancellationToken,
}

/// [`TimerService`] for a stack running inside a tokio actor.
#[derive(Debug)]
pub struct TokioTimers {
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    armed: HashMap<TimerToken, Armed>,
    next_seq: u64,
    cancel_token: CancellationToken,
}

impl TokioTimers {
    /// Timers whose firings are posted to `fired_tx`. Cancelling `parent`
    /// stops every sleeping timer task.
    #[must_use]
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>, parent: &CancellationToken) -> Self {
        Self {
            fired_tx,
            armed: HashMap::new(),
            next_seq: 0,
            cancel_token: parent.child_token(),
        }
    }

    /// Consume a firing. Returns `false` if the token was cancelled or
    /// re-armed after this firing was scheduled.
    pub fn fired(&mut self, fired: TimerFired) -> bool {
        match self.armed.get(&fired.token) {
            Some(armed) if armed.seq == fired.seq => {
                self.armed.remove(&fired.token);
                true
            }
            _ => false,
        }
    }

    /// Number of timers currently armed.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.armed.len()
    }

    /// Stop every timer task.
    pub fn shutdown(&mut self) {
        self.cancel_token.cancel();
        self.armed.clear();
    }
}

impl TimerService for TokioTimers {
    fn arm(&mut self, token: TimerToken, after: Duration) {
        self.cancel(token);
        self.next_seq += 1;
        let seq = self.next_seq;
        let cancel_token = self.cancel_token.child_token();
        self.armed.insert(
            token,
            Armed {
                seq,
                cancel_token: cancel_token.clone(),
            },
        );

        let fired_tx = self.fired_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel_token.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    let _ = fired_tx.send(TimerFired { token, seq });
                }
            }
        });
        trace!(target: "avdtp.timer", ?token, seq, ?after, "Timer armed");
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(armed) = self.armed.remove(&token) {
            armed.cancel_token.cancel();
            trace!(target: "avdtp.timer", ?token, seq = armed.seq, "Timer cancelled");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{SlotId, StreamHandle};

    fn token(index: usize) -> TimerToken {
        TimerToken::Transport {
            stream: StreamHandle(SlotId {
                index,
                generation: 0,
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let root = CancellationToken::new();
        let mut timers = TokioTimers::new(tx, &root);

        timers.arm(token(0), Duration::from_secs(4));
        assert_eq!(timers.armed(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.token, token(0));
        assert!(timers.fired(fired));
        assert_eq!(timers.armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearmed_timer_discards_earlier_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let root = CancellationToken::new();
        let mut timers = TokioTimers::new(tx, &root);

        timers.arm(token(0), Duration::from_secs(1));
        let stale = TimerFired {
            token: token(0),
            seq: 1,
        };
        timers.arm(token(0), Duration::from_secs(2));

        assert!(!timers.fired(stale));
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.seq, 2);
        assert!(timers.fired(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let root = CancellationToken::new();
        let mut timers = TokioTimers::new(tx, &root);

        timers.arm(token(0), Duration::from_secs(1));
        timers.arm(token(1), Duration::from_secs(1));
        timers.cancel(token(0));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.token, token(1));

        root.cancel();
        timers.arm(token(2), Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
