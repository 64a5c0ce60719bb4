//! Typed effort escalation rules.
//!
//! Whether an application deserves a full cover letter or just a resume
//! drop is decided by small, declarative rules over known task facts. The
//! representation is deliberately closed: a fixed set of fields, a fixed
//! set of comparison operators, a fixed set of actions. There is no
//! expression language and nothing user-supplied ever gets evaluated as
//! code.
//!
//! Rules run in order. The first matching `skip` wins immediately;
//! `upgrade`/`downgrade` actions stack and saturate at the ends of the
//! effort scale.

use serde::{Deserialize, Serialize};

use crate::types::{EffortLevel, Task};

/// Task facts a rule condition may inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    /// The profile matcher's score in `[0, 1]`
    MatchScore,
    /// Number of profile keywords found in the posting
    KeywordOverlap,
}

/// Comparison operator of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    /// Field strictly below the threshold
    Lt,
    /// Field at or below the threshold
    Le,
    /// Field strictly above the threshold
    Gt,
    /// Field at or above the threshold
    Ge,
    /// Field equal to the threshold
    Eq,
}

impl RuleOp {
    fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

/// A single typed condition: `field op threshold`.
///
/// A condition over a fact the task does not carry (e.g. no match score
/// was computed) never matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCondition {
    /// Which fact to inspect
    pub field: RuleField,
    /// How to compare it
    pub op: RuleOp,
    /// The comparison threshold
    pub threshold: f64,
}

impl RuleCondition {
    /// Whether this condition holds for the given task
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let value = match self.field {
            RuleField::MatchScore => task.job.match_score,
            RuleField::KeywordOverlap => task.job.keyword_overlap.map(f64::from),
        };
        value.is_some_and(|v| self.op.compare(v, self.threshold))
    }
}

/// What a matching rule does to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Raise the effort one level
    Upgrade,
    /// Lower the effort one level
    Downgrade,
    /// Do not apply at all
    Skip,
}

/// One effort rule: when the condition holds, take the action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EffortRule {
    /// Condition to test against the task
    pub condition: RuleCondition,
    /// Action taken when the condition matches
    pub action: RuleAction,
}

/// The decision produced by evaluating a rule set against a task.
#[derive(Debug, Clone, PartialEq)]
pub enum EffortDecision {
    /// Proceed at the given effort level
    Proceed(EffortLevel),
    /// Do not dispatch the task; carries a human-readable reason
    Skip(String),
}

/// An ordered list of effort rules.
///
/// The empty rule set is the identity: every task proceeds at its hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffortRules(Vec<EffortRule>);

impl EffortRules {
    /// Create a rule set from an ordered list of rules
    #[must_use]
    pub fn new(rules: Vec<EffortRule>) -> Self {
        Self(rules)
    }

    /// Evaluate the rules against a task, starting from its effort hint
    #[must_use]
    pub fn evaluate(&self, task: &Task) -> EffortDecision {
        let mut effort = task.effort_hint;
        for rule in &self.0 {
            if !rule.condition.matches(task) {
                continue;
            }
            match rule.action {
                RuleAction::Skip => {
                    return EffortDecision::Skip(format!(
                        "skipped by rule: {:?} {:?} {}",
                        rule.condition.field, rule.condition.op, rule.condition.threshold
                    ));
                }
                RuleAction::Upgrade => effort = effort.upgraded(),
                RuleAction::Downgrade => effort = effort.downgraded(),
            }
        }
        EffortDecision::Proceed(effort)
    }

    /// Number of rules in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the rule set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
