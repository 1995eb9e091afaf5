use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Generates a random election timeout within the configured range
pub fn random_election_timeout<R: Rng>(rng: &mut R, min_ms: u64, max_ms: u64) -> Duration {
    let timeout_ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}

/// A node's election timeout.
///
/// Drawn once at startup from a seed mixing the node id and the clock, so
/// nodes started at the same instant still time out at different moments.
/// Every rearm of the election timer reuses it.
#[derive(Debug, Clone, Copy)]
pub struct ElectionTimeout {
    duration: Duration,
}

impl ElectionTimeout {
    pub fn new(node_id: u64, min_ms: u64, max_ms: u64) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(nanos.wrapping_mul(node_id.wrapping_add(1)), min_ms, max_ms)
    }

    pub fn with_seed(seed: u64, min_ms: u64, max_ms: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            duration: random_election_timeout(&mut rng, min_ms, max_ms),
        }
    }

    pub fn next(&self) -> Duration {
        self.duration
    }
}

struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// A cancellable timer that posts generation-stamped events to a channel.
///
/// At most one scheduled task exists per timer. Arming cancels the previous
/// task and bumps the generation under the same lock, and receivers check
/// `is_current` before acting, so an event already in flight from a replaced
/// timer is ignored.
pub struct Timer<E> {
    name: &'static str,
    events: mpsc::Sender<E>,
    slot: Mutex<Slot>,
}

impl<E: Send + 'static> Timer<E> {
    pub fn new(name: &'static str, events: mpsc::Sender<E>) -> Self {
        Self {
            name,
            events,
            slot: Mutex::new(Slot {
                generation: 0,
                handle: None,
            }),
        }
    }

    /// Replace any pending timer with one that fires once after `after`.
    pub fn arm_once<F>(&self, after: Duration, make_event: F) -> u64
    where
        F: FnOnce(u64) -> E + Send + 'static,
    {
        let events = self.events.clone();
        self.replace(move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let _ = events.send(make_event(generation)).await;
            })
        })
    }

    /// Replace any pending timer with one that fires now and then every `period`.
    pub fn arm_repeating<F>(&self, period: Duration, make_event: F) -> u64
    where
        F: Fn(u64) -> E + Send + 'static,
    {
        let events = self.events.clone();
        self.replace(move |generation| {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if events.send(make_event(generation)).await.is_err() {
                        break;
                    }
                }
            })
        })
    }

    /// Cancel the pending timer, if any. Events it already sent become stale.
    pub fn cancel(&self) {
        let mut slot = self.lock();
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            tracing::trace!(timer = self.name, generation = slot.generation, "Timer cancelled");
        }
        slot.generation += 1;
    }

    /// Whether an event stamped with `generation` came from the live timer.
    pub fn is_current(&self, generation: u64) -> bool {
        let slot = self.lock();
        slot.handle.is_some() && slot.generation == generation
    }

    fn replace<S>(&self, spawn: S) -> u64
    where
        S: FnOnce(u64) -> JoinHandle<()>,
    {
        let mut slot = self.lock();
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        slot.handle = Some(spawn(generation));
        tracing::trace!(timer = self.name, generation, "Timer armed");
        generation
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<E> Drop for Timer<E> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }
}
