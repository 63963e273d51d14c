//! Keyed one-shot and periodic timers
//!
//! Every logical timer has a `TimerId`. Scheduling an id cancels whatever
//! was outstanding under it, and each schedule gets a fresh generation so a
//! firing that was already queued when it got superseded is rejected by
//! `accept`.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Logical timers owned by the wake detector and session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerId {
    /// Delayed restart of passive recognition
    ReArm,
    /// One-shot check that a started recognizer actually came up
    WarmUp,
    /// Delay between the wake acknowledgement and `startListening`
    StartListening,
    /// Listening session gave up waiting for a command
    Inactivity,
    /// Periodic passive-listening safety net
    Watchdog,
}

/// Message delivered when a timer elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub generation: u64,
}

struct Pending {
    generation: u64,
    repeating: bool,
    handle: JoinHandle<()>,
}

/// Delivers `TimerFired` messages into the owner's input queue
pub struct Scheduler<M> {
    tx: mpsc::UnboundedSender<M>,
    pending: HashMap<TimerId, Pending>,
    next_generation: u64,
}

impl<M> Scheduler<M>
where
    M: From<TimerFired> + Send + 'static,
{
    pub fn new(tx: mpsc::UnboundedSender<M>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Fire `id` once after `delay`, replacing any outstanding instance
    pub fn schedule_once(&mut self, id: TimerId, delay: Duration) {
        self.cancel(id);
        let generation = self.bump();
        let tx = self.tx.clone();
        let deadline = Instant::now() + delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(M::from(TimerFired { id, generation }));
        });

        trace!(?id, ?delay, generation, "timer scheduled");
        self.pending.insert(
            id,
            Pending {
                generation,
                repeating: false,
                handle,
            },
        );
    }

    /// Fire `id` every `period`, first after one full period
    pub fn schedule_every(&mut self, id: TimerId, period: Duration) {
        self.cancel(id);
        let generation = self.bump();
        let tx = self.tx.clone();
        let start = Instant::now() + period;

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(start, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(M::from(TimerFired { id, generation })).is_err() {
                    break;
                }
            }
        });

        trace!(?id, ?period, generation, "periodic timer scheduled");
        self.pending.insert(
            id,
            Pending {
                generation,
                repeating: true,
                handle,
            },
        );
    }

    /// Cancel `id`; returns whether anything was outstanding
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.pending.remove(&id) {
            Some(pending) => {
                pending.handle.abort();
                trace!(?id, generation = pending.generation, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding timer
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Whether a delivered firing is still current. One-shot timers are
    /// consumed by a successful accept.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.pending.get(&fired.id) {
            Some(pending) if pending.generation == fired.generation => {
                if !pending.repeating {
                    self.pending.remove(&fired.id);
                }
                true
            }
            _ => {
                trace!(?fired, "stale timer firing dropped");
                false
            }
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

impl<M> Drop for Scheduler<M> {
    fn drop(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }
}
