//! Decision state machine
//!
//! Transitions are rows in a table, each guarded by a predicate over the
//! facts known after detection. The terminal decision is a separate pure
//! function so every path can be tested without collaborators.

use crate::contracts::{Decision, HealingStrategy, RunStage, Severity};
use crate::error::{DriftError, Result};

/// Facts that drive the post-detection branches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFacts {
    pub breaking: bool,
    pub auto_heal_allowed: bool,
    pub notify_on_breaking: bool,
}

/// Transition guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    HealingRequired,
    HealingNotRequired,
    NotificationRequired,
    NotificationNotRequired,
}

impl Guard {
    fn holds(&self, facts: &RunFacts) -> bool {
        let heal = facts.breaking && facts.auto_heal_allowed;
        let notify = facts.breaking && facts.notify_on_breaking;
        match self {
            Guard::Always => true,
            Guard::HealingRequired => heal,
            Guard::HealingNotRequired => !heal,
            Guard::NotificationRequired => notify,
            Guard::NotificationNotRequired => !notify,
        }
    }
}

/// `(from, guard, to)`; the first matching row wins
pub const TRANSITIONS: &[(RunStage, Guard, RunStage)] = &[
    (RunStage::Start, Guard::Always, RunStage::Identified),
    (RunStage::Identified, Guard::Always, RunStage::Crawled),
    (RunStage::Crawled, Guard::Always, RunStage::Persisted),
    (RunStage::Persisted, Guard::Always, RunStage::Detected),
    (RunStage::Detected, Guard::HealingRequired, RunStage::Healed),
    (RunStage::Detected, Guard::HealingNotRequired, RunStage::SkippedHealing),
    (RunStage::Healed, Guard::NotificationRequired, RunStage::Notified),
    (RunStage::Healed, Guard::NotificationNotRequired, RunStage::SkippedNotification),
    (RunStage::SkippedHealing, Guard::NotificationRequired, RunStage::Notified),
    (RunStage::SkippedHealing, Guard::NotificationNotRequired, RunStage::SkippedNotification),
    (RunStage::Notified, Guard::Always, RunStage::Decided),
    (RunStage::SkippedNotification, Guard::Always, RunStage::Decided),
];

/// Next stage from `stage` given `facts`
pub fn next_stage(stage: RunStage, facts: &RunFacts) -> Result<RunStage> {
    TRANSITIONS
        .iter()
        .find(|(from, guard, _)| *from == stage && guard.holds(facts))
        .map(|(_, _, to)| *to)
        .ok_or_else(|| DriftError::validation(format!("no transition out of stage '{}'", stage)))
}

/// Everything the terminal decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionFacts {
    pub breaking: bool,
    pub severity: Severity,
    pub strategy: HealingStrategy,
    pub auto_heal_allowed: bool,
    /// Healer reported the fix applied or queued
    pub healed: bool,
    /// Every step of the healing plan can run without a human
    pub plan_automatic: bool,
    /// A stage aborted the run
    pub aborted: bool,
    /// At least one notification channel failed
    pub notification_failed: bool,
}

/// Terminal decision. Uncertainty only ever moves the result toward
/// `manual_review` or `pause`.
pub fn decide(facts: &DecisionFacts) -> Decision {
    if facts.aborted {
        return Decision::ManualReview;
    }
    if !facts.breaking {
        return Decision::Continue;
    }
    if facts.severity == Severity::Critical || facts.strategy == HealingStrategy::Pause {
        return Decision::Pause;
    }
    if facts.notification_failed {
        return Decision::ManualReview;
    }
    if facts.auto_heal_allowed
        && facts.strategy == HealingStrategy::Patch
        && facts.healed
        && facts.plan_automatic
    {
        return Decision::AutoHeal;
    }
    Decision::ManualReview
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(facts: RunFacts) -> Vec<RunStage> {
        let mut stage = RunStage::Start;
        let mut path = vec![stage];
        while !stage.is_terminal() {
            stage = next_stage(stage, &facts).unwrap();
            path.push(stage);
        }
        path
    }

    fn breaking(strategy: HealingStrategy) -> DecisionFacts {
        DecisionFacts {
            breaking: true,
            severity: Severity::High,
            strategy,
            auto_heal_allowed: true,
            healed: true,
            plan_automatic: true,
            aborted: false,
            notification_failed: false,
        }
    }

    #[test]
    fn test_non_breaking_skips_both() {
        let path = walk(RunFacts {
            breaking: false,
            auto_heal_allowed: true,
            notify_on_breaking: true,
        });
        assert_eq!(
            &path[4..],
            &[
                RunStage::Detected,
                RunStage::SkippedHealing,
                RunStage::SkippedNotification,
                RunStage::Decided
            ]
        );
    }

    #[test]
    fn test_breaking_heals_and_notifies() {
        let path = walk(RunFacts {
            breaking: true,
            auto_heal_allowed: true,
            notify_on_breaking: true,
        });
        assert!(path.contains(&RunStage::Healed));
        assert!(path.contains(&RunStage::Notified));
    }

    #[test]
    fn test_breaking_without_heal_permission() {
        let path = walk(RunFacts {
            breaking: true,
            auto_heal_allowed: false,
            notify_on_breaking: false,
        });
        assert!(path.contains(&RunStage::SkippedHealing));
        assert!(path.contains(&RunStage::SkippedNotification));
    }

    #[test]
    fn test_every_stage_has_an_exit() {
        let stages = [
            RunStage::Start,
            RunStage::Identified,
            RunStage::Crawled,
            RunStage::Persisted,
            RunStage::Detected,
            RunStage::Healed,
            RunStage::SkippedHealing,
            RunStage::Notified,
            RunStage::SkippedNotification,
        ];
        for breaking in [false, true] {
            for auto_heal_allowed in [false, true] {
                for notify_on_breaking in [false, true] {
                    let facts = RunFacts {
                        breaking,
                        auto_heal_allowed,
                        notify_on_breaking,
                    };
                    for stage in stages {
                        assert!(next_stage(stage, &facts).is_ok(), "{} stuck", stage);
                    }
                }
            }
        }
        assert!(next_stage(RunStage::Decided, &RunFacts::default()).is_err());
    }

    #[test]
    fn test_decisions() {
        assert_eq!(decide(&breaking(HealingStrategy::Patch)), Decision::AutoHeal);
        assert_eq!(decide(&breaking(HealingStrategy::Manual)), Decision::ManualReview);
        assert_eq!(decide(&breaking(HealingStrategy::Pause)), Decision::Pause);

        let critical = DecisionFacts {
            severity: Severity::Critical,
            ..breaking(HealingStrategy::Patch)
        };
        assert_eq!(decide(&critical), Decision::Pause);

        let not_allowed = DecisionFacts {
            auto_heal_allowed: false,
            healed: false,
            ..breaking(HealingStrategy::Patch)
        };
        assert_eq!(decide(&not_allowed), Decision::ManualReview);

        let needs_hands = DecisionFacts {
            plan_automatic: false,
            ..breaking(HealingStrategy::Patch)
        };
        assert_eq!(decide(&needs_hands), Decision::ManualReview);

        let quiet = DecisionFacts {
            notification_failed: true,
            ..breaking(HealingStrategy::Patch)
        };
        assert_eq!(decide(&quiet), Decision::ManualReview);

        let non_breaking = DecisionFacts {
            breaking: false,
            ..breaking(HealingStrategy::Pause)
        };
        assert_eq!(decide(&non_breaking), Decision::Continue);
    }

    #[test]
    fn test_abort_wins_over_everything() {
        let aborted = DecisionFacts {
            aborted: true,
            breaking: false,
            ..breaking(HealingStrategy::Patch)
        };
        assert_eq!(decide(&aborted), Decision::ManualReview);
    }
}
