//! Request-scoped resolution types: task context, candidates, activation
//! plans with their drop report, and dispatch events.

use serde::{Deserialize, Serialize};

use crate::descriptor::{DescriptorKind, Operation};

/// What a caller wants done, driving one resolution pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Free-text description of the user's intent.
    pub text: String,
    /// Descriptor ids requested by name; these bypass lexical matching.
    #[serde(default)]
    pub explicit_ids: Vec<String>,
    /// Resource ceiling for the plan. `None` means unbounded.
    #[serde(default)]
    pub budget: Option<f64>,
}

impl TaskContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_explicit_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn is_explicit(&self, id: &str) -> bool {
        self.explicit_ids.iter().any(|e| e == id)
    }
}

/// A scored candidate handed from the matcher to the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub score: f64,
    /// Named directly in the task context.
    #[serde(default)]
    pub explicit: bool,
}

impl Candidate {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            explicit: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Activation plan
// ---------------------------------------------------------------------------

/// One step of an activation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: String,
    pub kind: DescriptorKind,
    pub cost: f64,
    /// Total cost of this entry and every entry before it.
    pub cumulative_cost: f64,
    /// Matcher score, or for a pulled-in dependency the best score among the
    /// candidates that need it.
    pub score: f64,
    /// `true` when the entry was a matcher candidate, `false` when it was
    /// pulled in only as a dependency.
    pub requested: bool,
}

/// Why a candidate did not make it into the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DropReason {
    /// Admitting the candidate's closure would have exceeded the budget, or
    /// a higher-ranked candidate already did.
    BudgetExceeded { required: f64, remaining: f64 },
    /// Lost a mutual-exclusion check against `winner`.
    Conflict { winner: String },
    /// Needs a descriptor that was itself dropped.
    DependencyDropped { dependency: String },
    /// A descriptor in the closure uses an operation the policy denies.
    PolicyDenied { descriptor: String, operation: Operation },
    /// Explicitly requested but absent from the registry snapshot.
    NotInRegistry,
}

/// A candidate left out of the plan, with the reason and any dependencies that
/// were left out along with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub id: String,
    pub reason: DropReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cascaded: Vec<String>,
}

/// Ordered, dependency-valid, budget-constrained sequence of descriptors to
/// activate for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationPlan {
    pub entries: Vec<PlanEntry>,
    #[serde(default)]
    pub dropped: Vec<DroppedCandidate>,
    #[serde(default)]
    pub budget: Option<f64>,
}

impl ActivationPlan {
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn total_cost(&self) -> f64 {
        self.entries.last().map_or(0.0, |e| e.cumulative_cost)
    }

    /// The drop record for `id`, if it was reported.
    pub fn dropped_reason(&self, id: &str) -> Option<&DropReason> {
        self.dropped.iter().find(|d| d.id == id).map(|d| &d.reason)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Emitted to the host runtime for each plan entry, in plan order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationEvent {
    /// Zero-based position in the plan.
    pub index: usize,
    pub id: String,
    pub kind: DescriptorKind,
    pub cost: f64,
    pub cumulative_cost: f64,
}

/// Terminal accounting of a dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub cancelled: bool,
    /// The dispatcher's cost meter refused an entry.
    #[serde(default)]
    pub budget_exhausted: bool,
}

impl DispatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, cost: f64, cumulative: f64) -> PlanEntry {
        PlanEntry {
            id: id.to_owned(),
            kind: DescriptorKind::Skill,
            cost,
            cumulative_cost: cumulative,
            score: 0.5,
            requested: true,
        }
    }

    #[test]
    fn test_plan_total_cost_is_last_cumulative() {
        let plan = ActivationPlan {
            entries: vec![entry("a", 1.0, 1.0), entry("b", 2.5, 3.5)],
            dropped: Vec::new(),
            budget: Some(10.0),
        };
        assert!((plan.total_cost() - 3.5).abs() < f64::EPSILON);
        assert_eq!(plan.ids(), vec!["a", "b"]);
        assert!(plan.contains("b"));
        assert!(!plan.contains("c"));
    }

    #[test]
    fn test_empty_plan_costs_nothing() {
        let plan = ActivationPlan::default();
        assert!(plan.is_empty());
        assert_eq!(plan.total_cost(), 0.0);
    }

    #[test]
    fn test_drop_reason_serializes_with_type_tag() {
        let reason = DropReason::Conflict {
            winner: "git-commit-pro".to_owned(),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["type"], "conflict");
        assert_eq!(json["winner"], "git-commit-pro");
    }

    #[test]
    fn test_task_context_builder_marks_explicit_ids() {
        let ctx = TaskContext::new("write a commit message")
            .with_explicit_ids(["git-commit"])
            .with_budget(5.0);
        assert!(ctx.is_explicit("git-commit"));
        assert!(!ctx.is_explicit("code-review"));
        assert_eq!(ctx.budget, Some(5.0));
    }
}
