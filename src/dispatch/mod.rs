//! Event dispatcher wiring host events to the spam core.
//!
//! The host calls the `on_*` methods from whatever threads deliver its
//! events. The dispatcher owns the score store and the policy snapshot,
//! asks the [`PermissionCheck`] about exemptions, and drives the
//! [`Mitigator`] once a client crosses the threshold.
//!
//! ```text
//!  chat / whisper ──► filter ──► Evaluator ──► Verdict
//!                                                 │ mitigate?
//!                                                 ▼
//!                                      PermissionCheck::is_exempt
//!                                                 │ no
//!                                                 ▼
//!                          ScoreStore reset (same slot lock), then Mitigator::apply
//! ```

mod command;
mod hooks;

pub use command::{
    COMMAND_SPECIFIER, SILENT_SPECIFIER, WHISPER_COMMANDS, argument_text, is_command,
    is_whisper_command,
};
pub use hooks::{
    Clock, ExemptSlots, IGNORE_MESSAGE, KICK_REASON, ManualClock, Mitigator, NoExemptions,
    PermissionCheck, SystemClock,
};

use std::sync::Arc;

use crate::broadcast::{SmartText, should_suppress};
use crate::config::{MitigationAction, PolicyHandle, SpamPolicy};
use crate::error::{ConfigError, StoreError};
use crate::spam::{Evaluator, ScoreStore, SlotState, Verdict};

/// Where a scored text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Chat,
    Whisper,
}

/// Result of scoring one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventOutcome {
    pub source: EventSource,
    pub verdict: Verdict,
    /// The client was over the threshold but holds the exemption.
    pub exempt: bool,
    /// Mitigation applied for this event, if any.
    pub mitigated: Option<MitigationAction>,
}

impl EventOutcome {
    /// Whether the host should treat the event as consumed.
    pub fn handled(&self) -> bool {
        self.mitigated.is_some()
    }
}

/// The anti-spam service.
pub struct AntiSpam {
    store: ScoreStore,
    policy: PolicyHandle,
    evaluator: Evaluator,
    permissions: Arc<dyn PermissionCheck>,
    mitigator: Arc<dyn Mitigator>,
    clock: Arc<dyn Clock>,
}

impl AntiSpam {
    /// Start building a service around `policy`.
    pub fn builder(policy: SpamPolicy, mitigator: Arc<dyn Mitigator>) -> AntiSpamBuilder {
        AntiSpamBuilder::new(policy, mitigator)
    }

    /// Active policy snapshot.
    pub fn policy(&self) -> Arc<SpamPolicy> {
        self.policy.snapshot()
    }

    pub fn store(&self) -> &ScoreStore {
        &self.store
    }

    pub fn slot_state(&self, slot: usize) -> Result<SlotState, StoreError> {
        self.store.get(slot)
    }

    /// Score a chat message. Returns true if the message was consumed by a
    /// mitigation.
    pub fn on_chat(
        &self,
        slot: usize,
        text: &str,
        already_handled: bool,
    ) -> Result<bool, StoreError> {
        Ok(self
            .chat_event(slot, text, already_handled)?
            .is_some_and(|outcome| outcome.handled()))
    }

    /// Like [`AntiSpam::on_chat`] but returns the full outcome, or `None` if
    /// the message was not scored.
    pub fn chat_event(
        &self,
        slot: usize,
        text: &str,
        already_handled: bool,
    ) -> Result<Option<EventOutcome>, StoreError> {
        if already_handled || is_command(text) {
            return Ok(None);
        }
        self.score(slot, text, EventSource::Chat).map(Some)
    }

    /// Score the argument text of a whisper-style command.
    pub fn on_whisper_command(
        &self,
        slot: usize,
        command_name: &str,
        command_text: &str,
        is_real_player: bool,
    ) -> Result<bool, StoreError> {
        Ok(self
            .whisper_event(slot, command_name, command_text, is_real_player)?
            .is_some_and(|outcome| outcome.handled()))
    }

    /// Like [`AntiSpam::on_whisper_command`] but returns the full outcome, or
    /// `None` if the command was not scored.
    pub fn whisper_event(
        &self,
        slot: usize,
        command_name: &str,
        command_text: &str,
        is_real_player: bool,
    ) -> Result<Option<EventOutcome>, StoreError> {
        if !is_real_player || !is_whisper_command(command_name) {
            return Ok(None);
        }
        let text = argument_text(command_text, command_name);
        self.score(slot, text, EventSource::Whisper).map(Some)
    }

    /// Clear a slot when its client leaves so the next occupant starts clean.
    pub fn on_disconnect(&self, slot: usize) -> Result<(), StoreError> {
        self.store.reset(slot, self.clock.now())?;
        tracing::debug!(slot, "Cleared spam score on leave");
        Ok(())
    }

    /// Install a freshly loaded policy.
    ///
    /// An invalid policy is rejected and the current one stays active. The
    /// store capacity is fixed, so a changed `capacity` only takes effect on
    /// restart.
    pub fn on_config_reload(&self, policy: SpamPolicy) -> Result<(), ConfigError> {
        let capacity = policy.capacity;
        match self.policy.replace(policy) {
            Ok(_) => {
                if capacity != self.store.capacity() {
                    tracing::warn!(
                        "Slot capacity change ({} -> {}) requires a restart",
                        self.store.capacity(),
                        capacity
                    );
                }
                tracing::info!("Reloaded antispam config");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Rejected antispam config reload: {}", e);
                Err(e)
            }
        }
    }

    /// Whether an outgoing broadcast should be dropped.
    pub fn on_broadcast(&self, msg: &SmartText, already_handled: bool) -> bool {
        if already_handled {
            return false;
        }
        should_suppress(msg, &self.policy.snapshot())
    }

    fn score(
        &self,
        slot: usize,
        text: &str,
        source: EventSource,
    ) -> Result<EventOutcome, StoreError> {
        let policy = self.policy.snapshot();
        let now = self.clock.now();
        let (verdict, claimed) = self.evaluator.evaluate_and_claim(
            &self.store,
            slot,
            text,
            &policy,
            now,
            || !self.permissions.is_exempt(slot),
        )?;

        tracing::debug!(
            slot,
            source = ?source,
            class = %verdict.class,
            score = verdict.score,
            decayed = verdict.decayed,
            "Scored message"
        );

        let mut outcome = EventOutcome {
            source,
            verdict,
            exempt: false,
            mitigated: None,
        };
        if !verdict.mitigate {
            return Ok(outcome);
        }

        if !claimed {
            tracing::debug!(slot, score = verdict.score, "Over threshold but exempt");
            outcome.exempt = true;
            return Ok(outcome);
        }

        // The slot was reset under its lock; the host callback runs outside it.
        self.mitigator.apply(slot, policy.action);
        tracing::info!(
            slot,
            action = %policy.action,
            score = verdict.score,
            "Mitigated spamming client"
        );
        outcome.mitigated = Some(policy.action);
        Ok(outcome)
    }
}

/// Builder for [`AntiSpam`].
pub struct AntiSpamBuilder {
    policy: SpamPolicy,
    permissions: Arc<dyn PermissionCheck>,
    mitigator: Arc<dyn Mitigator>,
    clock: Arc<dyn Clock>,
}

impl AntiSpamBuilder {
    pub fn new(policy: SpamPolicy, mitigator: Arc<dyn Mitigator>) -> Self {
        Self {
            policy,
            permissions: Arc::new(NoExemptions),
            mitigator,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the exemption lookup.
    pub fn permissions(mut self, permissions: Arc<dyn PermissionCheck>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the policy and build the service.
    pub fn build(self) -> Result<AntiSpam, ConfigError> {
        let capacity = self.policy.capacity;
        let policy = PolicyHandle::new(self.policy)?;
        let store = ScoreStore::new(capacity, self.clock.now());
        tracing::debug!(capacity, "Antispam score store ready");

        Ok(AntiSpam {
            store,
            policy,
            evaluator: Evaluator::new(),
            permissions: self.permissions,
            mitigator: self.mitigator,
            clock: self.clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parking_lot::Mutex;

    use super::*;
    use crate::broadcast::BOSS_COLOR;
    use crate::spam::MessageClass;

    #[derive(Default)]
    struct RecordingMitigator {
        calls: Mutex<Vec<(usize, MitigationAction)>>,
    }

    impl RecordingMitigator {
        fn calls(&self) -> Vec<(usize, MitigationAction)> {
            self.calls.lock().clone()
        }
    }

    impl Mitigator for RecordingMitigator {
        fn apply(&self, slot: usize, action: MitigationAction) {
            self.calls.lock().push((slot, action));
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap()
    }

    fn policy() -> SpamPolicy {
        SpamPolicy {
            decay_window_secs: 60.0,
            short_length: 3,
            short_weight: 5.0,
            caps_ratio_threshold: 0.8,
            caps_weight: 3.0,
            normal_weight: 1.0,
            threshold: 10.0,
            action: MitigationAction::Ignore,
            capacity: 16,
            ..SpamPolicy::default()
        }
    }

    struct Harness {
        spam: AntiSpam,
        clock: Arc<ManualClock>,
        mitigator: Arc<RecordingMitigator>,
    }

    fn harness_with(policy: SpamPolicy, exempt: &[usize]) -> Harness {
        let clock = Arc::new(ManualClock::new(t0()));
        let mitigator = Arc::new(RecordingMitigator::default());
        let spam = AntiSpam::builder(policy, mitigator.clone())
            .permissions(Arc::new(ExemptSlots::new(exempt.iter().copied())))
            .clock(clock.clone())
            .build()
            .unwrap();
        Harness {
            spam,
            clock,
            mitigator,
        }
    }

    fn harness() -> Harness {
        harness_with(policy(), &[])
    }

    #[test]
    fn test_ignore_mitigation_resets_score() {
        let h = harness();

        assert!(!h.spam.on_chat(2, "hi", false).unwrap());
        h.clock.advance(Duration::seconds(1));
        assert!(!h.spam.on_chat(2, "HELLO WORLD", false).unwrap());
        assert_eq!(h.spam.slot_state(2).unwrap().score, 8.0);

        h.clock.advance(Duration::seconds(1));
        assert!(h.spam.on_chat(2, "ok", false).unwrap());
        assert_eq!(h.mitigator.calls(), vec![(2, MitigationAction::Ignore)]);

        let state = h.spam.slot_state(2).unwrap();
        assert_eq!(state.score, 0.0);
        assert_eq!(state.last_activity, t0() + Duration::seconds(2));

        // next message starts clean
        h.clock.advance(Duration::seconds(1));
        assert!(!h.spam.on_chat(2, "hi", false).unwrap());
        assert_eq!(h.spam.slot_state(2).unwrap().score, 5.0);
    }

    #[test]
    fn test_kick_mitigation() {
        let h = harness_with(
            SpamPolicy {
                action: MitigationAction::Kick,
                ..policy()
            },
            &[],
        );
        for _ in 0..2 {
            assert!(!h.spam.on_chat(0, "yo", false).unwrap());
        }
        assert!(h.spam.on_chat(0, "yo", false).unwrap());
        assert_eq!(h.mitigator.calls(), vec![(0, MitigationAction::Kick)]);
        assert_eq!(h.spam.slot_state(0).unwrap().score, 0.0);
    }

    #[test]
    fn test_exempt_client_is_never_mitigated() {
        let h = harness_with(policy(), &[5]);
        for _ in 0..5 {
            let outcome = h.spam.chat_event(5, "hi", false).unwrap().unwrap();
            assert!(!outcome.handled());
        }
        let outcome = h.spam.chat_event(5, "hi", false).unwrap().unwrap();
        assert!(outcome.exempt);
        assert!(outcome.verdict.mitigate);
        assert!(h.mitigator.calls().is_empty());
        assert_eq!(h.spam.slot_state(5).unwrap().score, 30.0);
    }

    #[test]
    fn test_handled_and_command_chat_is_not_scored() {
        let h = harness();
        assert_eq!(h.spam.chat_event(1, "hi", true).unwrap(), None);
        assert_eq!(h.spam.chat_event(1, "/help", false).unwrap(), None);
        assert_eq!(h.spam.chat_event(1, ".w bob hi", false).unwrap(), None);
        assert_eq!(h.spam.slot_state(1).unwrap().score, 0.0);
    }

    #[test]
    fn test_whisper_scored_like_chat() {
        let h = harness();
        let whisper = h
            .spam
            .whisper_event(3, "w", "w Alice hello there", true)
            .unwrap()
            .unwrap();
        let chat = h
            .spam
            .chat_event(4, " Alice hello there", false)
            .unwrap()
            .unwrap();

        assert_eq!(whisper.source, EventSource::Whisper);
        assert_eq!(whisper.verdict.class, MessageClass::Normal);
        assert_eq!(whisper.verdict.class, chat.verdict.class);
        assert_eq!(whisper.verdict.score, chat.verdict.score);
    }

    #[test]
    fn test_whisper_filters() {
        let h = harness();
        assert_eq!(h.spam.whisper_event(0, "w", "w bob hi", false).unwrap(), None);
        assert_eq!(h.spam.whisper_event(0, "help", "help", true).unwrap(), None);
        assert!(h.spam.whisper_event(0, "Reply", "reply ok", true).unwrap().is_some());
    }

    #[test]
    fn test_whisper_triggers_mitigation() {
        let h = harness();
        assert!(!h.spam.on_whisper_command(0, "r", "r a", true).unwrap());
        assert!(!h.spam.on_whisper_command(0, "r", "r b", true).unwrap());
        assert!(h.spam.on_whisper_command(0, "r", "r c", true).unwrap());
        assert_eq!(h.mitigator.calls(), vec![(0, MitigationAction::Ignore)]);
    }

    #[test]
    fn test_disconnect_clears_slot() {
        let h = harness();
        h.spam.on_chat(7, "hi", false).unwrap();
        h.clock.advance(Duration::seconds(3));
        h.spam.on_disconnect(7).unwrap();

        let state = h.spam.slot_state(7).unwrap();
        assert_eq!(state.score, 0.0);
        assert_eq!(state.last_activity, t0() + Duration::seconds(3));
    }

    #[test]
    fn test_out_of_range_slot() {
        let h = harness();
        h.spam.on_chat(0, "hi", false).unwrap();
        assert!(matches!(
            h.spam.on_chat(16, "hi", false),
            Err(StoreError::OutOfRange {
                slot: 16,
                capacity: 16
            })
        ));
        assert!(h.spam.on_disconnect(99).is_err());
        assert_eq!(h.spam.slot_state(0).unwrap().score, 5.0);
    }

    #[test]
    fn test_reload_applies_and_rejects() {
        let h = harness();
        let stricter = SpamPolicy {
            threshold: 4.0,
            ..policy()
        };
        h.spam.on_config_reload(stricter).unwrap();
        assert!(h.spam.on_chat(0, "hi", false).unwrap());

        let broken = SpamPolicy {
            threshold: -1.0,
            ..policy()
        };
        assert!(h.spam.on_config_reload(broken).is_err());
        assert_eq!(h.spam.policy().threshold, 4.0);
    }

    #[test]
    fn test_reload_keeps_store_capacity() {
        let h = harness();
        h.spam
            .on_config_reload(SpamPolicy {
                capacity: 4,
                ..policy()
            })
            .unwrap();
        assert_eq!(h.spam.store().capacity(), 16);
        assert!(h.spam.on_chat(10, "hi", false).is_ok());
    }

    #[test]
    fn test_broadcast_uses_current_policy() {
        let h = harness();
        let msg = SmartText::new("Golem has awoken!", BOSS_COLOR);
        assert!(!h.spam.on_broadcast(&msg, false));

        h.spam
            .on_config_reload(SpamPolicy {
                disable_boss_broadcast: true,
                ..policy()
            })
            .unwrap();
        assert!(h.spam.on_broadcast(&msg, false));
        assert!(!h.spam.on_broadcast(&msg, true));
    }

    #[test]
    fn test_invalid_initial_policy() {
        let result = AntiSpam::builder(
            SpamPolicy {
                capacity: 0,
                ..policy()
            },
            Arc::new(RecordingMitigator::default()),
        )
        .build();
        assert!(result.is_err());
    }

    /// Mitigator that takes a while, like a host kicking over the network.
    #[derive(Default)]
    struct SlowMitigator {
        calls: Mutex<Vec<usize>>,
    }

    impl Mitigator for SlowMitigator {
        fn apply(&self, slot: usize, _action: MitigationAction) {
            std::thread::sleep(std::time::Duration::from_millis(50));
            self.calls.lock().push(slot);
        }
    }

    #[test]
    fn test_simultaneous_events_mitigate_once() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mitigator = Arc::new(SlowMitigator::default());
        let spam = AntiSpam::builder(
            SpamPolicy {
                action: MitigationAction::Kick,
                ..policy()
            },
            mitigator.clone(),
        )
        .clock(clock.clone())
        .build()
        .unwrap();

        spam.on_chat(0, "hi", false).unwrap();
        spam.on_chat(0, "hi", false).unwrap();
        assert_eq!(spam.slot_state(0).unwrap().score, 10.0);

        let barrier = std::sync::Barrier::new(2);
        let handled: Vec<bool> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        spam.on_chat(0, "hi", false).unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(*mitigator.calls.lock(), vec![0]);
        assert_eq!(handled.iter().filter(|h| **h).count(), 1);
        // one event claimed the kick and reset; the other scored from zero
        let state = spam.slot_state(0).unwrap();
        assert_eq!(state.score, 5.0);
        assert_eq!(state.last_activity, t0());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_do_not_lose_updates() {
        let h = harness_with(
            SpamPolicy {
                threshold: 1_000_000.0,
                ..policy()
            },
            &[],
        );
        let spam = Arc::new(h.spam);

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let spam = Arc::clone(&spam);
            tasks.push(tokio::spawn(async move {
                for i in 0..200 {
                    let slot = if i % 2 == 0 { 0 } else { 1 + worker % 3 };
                    spam.on_chat(slot, "hi", false).unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // 8 workers x 100 short messages on slot 0
        assert_eq!(spam.slot_state(0).unwrap().score, 800.0 * 5.0);
        let others: f64 = (1..4).map(|s| spam.slot_state(s).unwrap().score).sum();
        assert_eq!(others, 800.0 * 5.0);
    }
}
