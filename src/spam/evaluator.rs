//! Score update and threshold decision for a single text event.

use chrono::{DateTime, Utc};

use crate::config::SpamPolicy;
use crate::error::StoreError;
use crate::spam::classifier::{MessageClass, classify};
use crate::spam::store::ScoreStore;

/// Outcome of scoring one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Score after this event.
    pub score: f64,
    /// Weight this event added.
    pub weight: f64,
    pub class: MessageClass,
    /// Whether the decay window elapsed and the score restarted from zero.
    pub decayed: bool,
    /// Score is strictly above the policy threshold.
    pub mitigate: bool,
}

/// Stateless evaluator. All state lives in the [`ScoreStore`].
///
/// Exemptions are not its concern: a `mitigate` verdict only says the
/// threshold was crossed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Decay the slot, add the weight of `text`, and compare to the threshold.
    ///
    /// Decay and add run under one slot lock so two events for the same
    /// client cannot interleave between them.
    pub fn evaluate(
        &self,
        store: &ScoreStore,
        slot: usize,
        text: &str,
        policy: &SpamPolicy,
        now: DateTime<Utc>,
    ) -> Result<Verdict, StoreError> {
        self.evaluate_and_claim(store, slot, text, policy, now, || false)
            .map(|(verdict, _)| verdict)
    }

    /// Like [`Evaluator::evaluate`], but settles the mitigation in the same
    /// critical section.
    ///
    /// When the threshold is crossed, `claim` runs under the slot lock. If it
    /// returns true the slot is reset before the lock is released and the
    /// second value is true: this event owns the mitigation and no concurrent
    /// event for the slot can observe the over-threshold score.
    pub fn evaluate_and_claim(
        &self,
        store: &ScoreStore,
        slot: usize,
        text: &str,
        policy: &SpamPolicy,
        now: DateTime<Utc>,
        claim: impl FnOnce() -> bool,
    ) -> Result<(Verdict, bool), StoreError> {
        let class = classify(text, policy);
        let weight = class.weight(policy);

        let (decayed, score, claimed) = store.update(slot, |state| {
            let decayed = state.decay(now, policy.decay_window_secs);
            let score = state.add(weight, now);
            let claimed = score > policy.threshold && claim();
            if claimed {
                state.reset(now);
            }
            (decayed, score, claimed)
        })?;

        let verdict = Verdict {
            score,
            weight,
            class,
            decayed,
            mitigate: score > policy.threshold,
        };
        Ok((verdict, claimed))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::config::MitigationAction;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
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
            ..SpamPolicy::default()
        }
    }

    #[test]
    fn test_sequence_crosses_threshold() {
        let store = ScoreStore::new(8, t0());
        let eval = Evaluator::new();
        let p = policy();

        let v1 = eval.evaluate(&store, 3, "hi", &p, t0()).unwrap();
        assert_eq!((v1.score, v1.class, v1.mitigate), (5.0, MessageClass::Short, false));

        let v2 = eval
            .evaluate(&store, 3, "HELLO WORLD", &p, t0() + Duration::seconds(1))
            .unwrap();
        assert_eq!((v2.score, v2.class, v2.mitigate), (8.0, MessageClass::Caps, false));

        let v3 = eval
            .evaluate(&store, 3, "ok", &p, t0() + Duration::seconds(2))
            .unwrap();
        assert_eq!(v3.score, 13.0);
        assert!(v3.mitigate);
    }

    #[test]
    fn test_decay_before_scoring() {
        let store = ScoreStore::new(1, t0());
        let eval = Evaluator::new();
        let p = policy();

        eval.evaluate(&store, 0, "hi", &p, t0()).unwrap();
        let v = eval
            .evaluate(&store, 0, "HELLO WORLD", &p, t0() + Duration::seconds(61))
            .unwrap();
        assert!(v.decayed);
        assert_eq!(v.score, 3.0);
        assert!(!v.mitigate);
    }

    #[test]
    fn test_threshold_is_strict() {
        let store = ScoreStore::new(1, t0());
        let eval = Evaluator::new();
        let p = SpamPolicy {
            threshold: 10.0,
            ..policy()
        };

        eval.evaluate(&store, 0, "hi", &p, t0()).unwrap();
        let at = eval.evaluate(&store, 0, "yo", &p, t0()).unwrap();
        assert_eq!(at.score, 10.0);
        assert!(!at.mitigate);

        let above = eval
            .evaluate(&store, 0, "a normal sentence", &p, t0())
            .unwrap();
        assert_eq!(above.score, 11.0);
        assert!(above.mitigate);
    }

    #[test]
    fn test_empty_text_scores_short_weight() {
        let store = ScoreStore::new(1, t0());
        let v = Evaluator::new()
            .evaluate(&store, 0, "", &policy(), t0())
            .unwrap();
        assert_eq!(v.class, MessageClass::Short);
        assert_eq!(v.weight, 5.0);
    }

    #[test]
    fn test_slots_do_not_share_scores() {
        let store = ScoreStore::new(2, t0());
        let eval = Evaluator::new();
        let p = policy();

        eval.evaluate(&store, 0, "hi", &p, t0()).unwrap();
        eval.evaluate(&store, 0, "hi", &p, t0()).unwrap();
        let other = eval.evaluate(&store, 1, "hi", &p, t0()).unwrap();
        assert_eq!(other.score, 5.0);
    }

    #[test]
    fn test_out_of_range_slot() {
        let store = ScoreStore::new(2, t0());
        let err = Evaluator::new()
            .evaluate(&store, 2, "hi", &policy(), t0())
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::OutOfRange {
                slot: 2,
                capacity: 2
            }
        );
    }

    #[test]
    fn test_claim_resets_under_the_lock() {
        let store = ScoreStore::new(1, t0());
        let eval = Evaluator::new();
        let p = policy();
        let t1 = t0() + Duration::seconds(1);

        eval.evaluate(&store, 0, "hi", &p, t0()).unwrap();
        let (below, claimed) = eval
            .evaluate_and_claim(&store, 0, "hi", &p, t0(), || panic!("not over threshold"))
            .unwrap();
        assert_eq!(below.score, 10.0);
        assert!(!claimed);

        let (over, claimed) = eval
            .evaluate_and_claim(&store, 0, "hi", &p, t1, || true)
            .unwrap();
        assert_eq!(over.score, 15.0);
        assert!(over.mitigate);
        assert!(claimed);
        assert_eq!(store.get(0).unwrap().score, 0.0);
        assert_eq!(store.get(0).unwrap().last_activity, t1);
    }

    #[test]
    fn test_declined_claim_keeps_score() {
        let store = ScoreStore::new(1, t0());
        let eval = Evaluator::new();
        let p = policy();

        for _ in 0..2 {
            eval.evaluate(&store, 0, "hi", &p, t0()).unwrap();
        }
        let (verdict, claimed) = eval
            .evaluate_and_claim(&store, 0, "hi", &p, t0(), || false)
            .unwrap();
        assert!(verdict.mitigate);
        assert!(!claimed);
        assert_eq!(store.get(0).unwrap().score, 15.0);
    }
}
