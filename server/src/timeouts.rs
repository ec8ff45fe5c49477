//! Turn, fill and retention timers.
//!
//! A timer never mutates a match itself. When it fires it emits a
//! [`TimerEvent`] that the registry turns into an ordinary request pinned to
//! the version the timer was armed at, so a timer that lost the race is
//! rejected like any stale client request.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wagerhall_types::{MatchId, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    TurnExpired {
        match_id: MatchId,
        user: UserId,
        version: u64,
    },
    FillExpired {
        match_id: MatchId,
    },
    RetentionExpired {
        match_id: MatchId,
    },
}

type Armed = Mutex<HashMap<MatchId, JoinHandle<()>>>;

pub struct Timers {
    events: mpsc::UnboundedSender<TimerEvent>,
    turn_timeout: Duration,
    fill_timeout: Duration,
    retention: Duration,
    turns: Armed,
    fills: Armed,
    evictions: Armed,
}

fn lock(armed: &Armed) -> MutexGuard<'_, HashMap<MatchId, JoinHandle<()>>> {
    armed.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("timer table lock poisoned; recovering");
        poisoned.into_inner()
    })
}

fn replace(armed: &Armed, match_id: MatchId, handle: Option<JoinHandle<()>>) {
    let mut table = lock(armed);
    let previous = match handle {
        Some(handle) => table.insert(match_id, handle),
        None => table.remove(&match_id),
    };
    if let Some(previous) = previous {
        previous.abort();
    }
}

impl Timers {
    pub fn new(
        turn_timeout: Duration,
        fill_timeout: Duration,
        retention: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                events,
                turn_timeout,
                fill_timeout,
                retention,
                turns: Mutex::new(HashMap::new()),
                fills: Mutex::new(HashMap::new()),
                evictions: Mutex::new(HashMap::new()),
            },
            receiver,
        )
    }

    fn spawn(&self, delay: Duration, event: TimerEvent) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The receiver is gone only during shutdown.
            let _ = events.send(event);
        })
    }

    /// Start `user`'s turn clock, replacing any clock running for the match.
    pub fn arm_turn(&self, match_id: MatchId, user: UserId, version: u64) {
        let handle = self.spawn(
            self.turn_timeout,
            TimerEvent::TurnExpired {
                match_id,
                user,
                version,
            },
        );
        replace(&self.turns, match_id, Some(handle));
    }

    pub fn disarm_turn(&self, match_id: MatchId) {
        replace(&self.turns, match_id, None);
    }

    pub fn arm_fill(&self, match_id: MatchId) {
        let handle = self.spawn(self.fill_timeout, TimerEvent::FillExpired { match_id });
        replace(&self.fills, match_id, Some(handle));
    }

    pub fn disarm_fill(&self, match_id: MatchId) {
        replace(&self.fills, match_id, None);
    }

    /// Schedule a finished match to be dropped from memory.
    pub fn arm_eviction(&self, match_id: MatchId) {
        let handle = self.spawn(self.retention, TimerEvent::RetentionExpired { match_id });
        replace(&self.evictions, match_id, Some(handle));
    }

    pub fn disarm_eviction(&self, match_id: MatchId) {
        replace(&self.evictions, match_id, None);
    }

    pub fn armed(&self) -> usize {
        lock(&self.turns).len() + lock(&self.fills).len() + lock(&self.evictions).len()
    }

    /// Abort every pending timer.
    pub fn shutdown(&self) {
        for armed in [&self.turns, &self.fills, &self.evictions] {
            for (_, handle) in lock(armed).drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timers() -> (Timers, mpsc::UnboundedReceiver<TimerEvent>) {
        Timers::new(
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_secs(600),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn turn_timer_fires_with_armed_version() {
        let (timers, mut events) = timers();
        timers.arm_turn(1, UserId::from("alice"), 4);
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            TimerEvent::TurnExpired {
                match_id: 1,
                user: UserId::from("alice"),
                version: 4
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_clock() {
        let (timers, mut events) = timers();
        timers.arm_turn(1, UserId::from("alice"), 4);
        tokio::time::sleep(Duration::from_secs(10)).await;
        timers.arm_turn(1, UserId::from("bob"), 5);
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TimerEvent::TurnExpired { version: 5, .. }));
        assert_eq!(timers.armed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_and_shut_down_timers_stay_quiet() {
        let (timers, mut events) = timers();
        timers.arm_fill(2);
        timers.disarm_fill(2);
        timers.arm_turn(3, UserId::from("carol"), 1);
        timers.arm_eviction(4);
        timers.shutdown();
        assert_eq!(timers.armed(), 0);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retention_fires_after_turn_and_fill_clocks() {
        let (timers, mut events) = timers();
        timers.arm_eviction(5);
        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(events.try_recv().is_err());
        let event = events.recv().await.unwrap();
        assert_eq!(event, TimerEvent::RetentionExpired { match_id: 5 });
        timers.disarm_eviction(5);
        assert_eq!(timers.armed(), 0);
    }
}
