//! Per-slot score registry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;

/// Score state of a single client slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotState {
    /// Accumulated weight since the last reset. Never negative.
    pub score: f64,
    /// Time of the last scored event or reset.
    pub last_activity: DateTime<Utc>,
}

impl SlotState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            score: 0.0,
            last_activity: now,
        }
    }

    /// Forget the score if the slot has been idle for longer than `window_secs`.
    ///
    /// Returns true if the score was reset.
    pub fn decay(&mut self, now: DateTime<Utc>, window_secs: f64) -> bool {
        if elapsed_secs(self.last_activity, now) > window_secs {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Add `weight` and mark the slot active at `now`. Returns the new score.
    ///
    /// Weights come from a validated policy and are never negative.
    pub fn add(&mut self, weight: f64, now: DateTime<Utc>) -> f64 {
        debug_assert!(weight >= 0.0, "negative or NaN weight {weight}");
        self.score += weight;
        self.last_activity = now;
        self.score
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.score = 0.0;
        self.last_activity = now;
    }
}

/// Seconds from `then` to `now`, negative if the clock went backwards.
fn elapsed_secs(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let delta = now - then;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Fixed-capacity registry of slot states.
///
/// Every slot has its own lock: operations on one slot are linearizable and
/// operations on different slots never wait on each other.
pub struct ScoreStore {
    slots: Vec<Mutex<SlotState>>,
}

impl ScoreStore {
    /// Create a store with `capacity` zeroed slots, all last active at `now`.
    pub fn new(capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| Mutex::new(SlotState::new(now)))
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, slot: usize) -> Result<&Mutex<SlotState>, StoreError> {
        self.slots.get(slot).ok_or(StoreError::OutOfRange {
            slot,
            capacity: self.slots.len(),
        })
    }

    /// Current state of a slot.
    pub fn get(&self, slot: usize) -> Result<SlotState, StoreError> {
        Ok(*self.slot(slot)?.lock())
    }

    /// Reset the slot if it has been idle longer than `window_secs`.
    pub fn decay(
        &self,
        slot: usize,
        now: DateTime<Utc>,
        window_secs: f64,
    ) -> Result<bool, StoreError> {
        Ok(self.slot(slot)?.lock().decay(now, window_secs))
    }

    /// Add weight to a slot and return the resulting score.
    pub fn add(&self, slot: usize, weight: f64, now: DateTime<Utc>) -> Result<f64, StoreError> {
        Ok(self.slot(slot)?.lock().add(weight, now))
    }

    pub fn reset(&self, slot: usize, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.slot(slot)?.lock().reset(now);
        Ok(())
    }

    /// Reset every slot, e.g. when the host starts a fresh session.
    pub fn reset_all(&self, now: DateTime<Utc>) {
        for slot in &self.slots {
            slot.lock().reset(now);
        }
    }

    /// Run `f` on a slot while holding its lock.
    ///
    /// Use this when several steps must happen as one atomic update.
    pub fn update<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut SlotState) -> R,
    ) -> Result<R, StoreError> {
        let mut state = self.slot(slot)?.lock();
        Ok(f(&mut state))
    }
}
