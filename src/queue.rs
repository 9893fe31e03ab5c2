//! The reconciliation work queue: de-duplicating, rate-limited, and
//! single-flight per key — the one synchronisation point between the
//! informer's event dispatch and the worker pool (§5).

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::resource::ResourceKey;

const BASE_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Backoff {
    attempts: u32,
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let exp = self.attempts.min(8);
        self.attempts += 1;
        (BASE_BACKOFF * 2u32.saturating_pow(exp)).min(MAX_BACKOFF)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

struct State {
    pending: VecDeque<ResourceKey>,
    queued: HashSet<ResourceKey>,
    in_flight: HashSet<ResourceKey>,
    dirty: HashSet<ResourceKey>,
    ready_at: std::collections::HashMap<ResourceKey, Instant>,
    backoff: std::collections::HashMap<ResourceKey, Backoff>,
    shutting_down: bool,
}

/// A de-duplicating, rate-limited, single-flight-per-key work queue.
///
/// - **De-duplicating**: adding a key already pending is a no-op; adding a
///   key currently in flight marks it *dirty* so it is re-queued on `done`.
/// - **Rate-limited**: [`WorkQueue::add_rate_limited`] applies exponential
///   backoff before the key becomes eligible for `get` again.
/// - **Single-flight**: `get` never returns a key already in flight.
pub struct WorkQueue {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
                dirty: HashSet::new(),
                ready_at: std::collections::HashMap::new(),
                backoff: std::collections::HashMap::new(),
                shutting_down: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Enqueues `key` immediately (no backoff delay).
    pub fn add(&self, key: ResourceKey) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        self.add_locked(&mut state, key, None);
        self.condvar.notify_all();
    }

    /// Re-enqueues `key` after an exponentially increasing delay, tracked
    /// per key. Call [`WorkQueue::forget`] on success to reset the counter.
    pub fn add_rate_limited(&self, key: ResourceKey) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let delay = state.backoff.entry(key.clone()).or_default().next_delay();
        let ready_at = Instant::now() + delay;
        self.add_locked(&mut state, key, Some(ready_at));
        self.condvar.notify_all();
    }

    /// Resets the backoff counter for `key`, typically called after a
    /// successful reconciliation.
    pub fn forget(&self, key: &ResourceKey) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.backoff.remove(key);
    }

    fn add_locked(&self, state: &mut State, key: ResourceKey, ready_at: Option<Instant>) {
        if state.in_flight.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.contains(&key) {
            if let Some(at) = ready_at {
                state.ready_at.insert(key, at);
            }
            return;
        }
        state.queued.insert(key.clone());
        if let Some(at) = ready_at {
            state.ready_at.insert(key.clone(), at);
        }
        state.pending.push_back(key);
    }

    /// Blocks until an eligible key is available, or the queue is shut down
    /// (returns `None`).
    #[must_use]
    pub fn get(&self) -> Option<ResourceKey> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        loop {
            if let Some(idx) = state.pending.iter().position(|k| Self::is_ready(&state, k)) {
                let key = state.pending.remove(idx).expect("index from position is valid");
                state.queued.remove(&key);
                state.ready_at.remove(&key);
                state.in_flight.insert(key.clone());
                return Some(key);
            }
            if state.shutting_down {
                return None;
            }

            let wait_for = state
                .pending
                .iter()
                .filter_map(|k| state.ready_at.get(k))
                .min()
                .map(|at| at.saturating_duration_since(Instant::now()));

            state = match wait_for {
                Some(d) if !d.is_zero() => {
                    self.condvar
                        .wait_timeout(state, d)
                        .expect("queue mutex poisoned")
                        .0
                }
                _ => self.condvar.wait(state).expect("queue mutex poisoned"),
            };
        }
    }

    fn is_ready(state: &State, key: &ResourceKey) -> bool {
        match state.ready_at.get(key) {
            Some(at) => Instant::now() >= *at,
            None => true,
        }
    }

    /// Marks `key` as finished processing. If it was marked dirty while in
    /// flight, it is immediately re-queued.
    pub fn done(&self, key: &ResourceKey) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.in_flight.remove(key);
        if state.dirty.remove(key) {
            self.add_locked(&mut state, key.clone(), None);
        }
        self.condvar.notify_all();
    }

    /// Stops the queue: pending `get` calls return `None` once drained, and
    /// new calls to `get` return `None` immediately.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.shutting_down = true;
        self.condvar.notify_all();
    }
}
