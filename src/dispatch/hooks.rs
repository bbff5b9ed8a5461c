//! Collaborator traits the dispatcher calls out to.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::config::MitigationAction;

/// Message shown to a client whose messages are being ignored.
pub const IGNORE_MESSAGE: &str = "You have been ignored for spamming.";

/// Disconnect reason given to a kicked client.
pub const KICK_REASON: &str = "Spamming";

/// Permission lookup that can exempt a client from mitigation.
///
/// Consulted only once a client is over the threshold, while that client's
/// slot is locked. Implementations must not call back into the service.
pub trait PermissionCheck: Send + Sync {
    /// True if the client in `slot` may never be mitigated.
    fn is_exempt(&self, slot: usize) -> bool;
}

/// Performs the actual mitigation on the host.
///
/// For [`MitigationAction::Ignore`] the host should send [`IGNORE_MESSAGE`]
/// to the client and drop the message. For [`MitigationAction::Kick`] it
/// should disconnect the client with [`KICK_REASON`].
pub trait Mitigator: Send + Sync {
    fn apply(&self, slot: usize, action: MitigationAction);
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// No client is exempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExemptions;

impl PermissionCheck for NoExemptions {
    fn is_exempt(&self, _slot: usize) -> bool {
        false
    }
}

/// A fixed set of exempt slots.
#[derive(Debug, Clone, Default)]
pub struct ExemptSlots {
    slots: HashSet<usize>,
}

impl ExemptSlots {
    pub fn new(slots: impl IntoIterator<Item = usize>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
        }
    }
}

impl PermissionCheck for ExemptSlots {
    fn is_exempt(&self, slot: usize) -> bool {
        self.slots.contains(&slot)
    }
}
