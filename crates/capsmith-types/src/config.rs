//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `capsmith.toml` that controls
//! default budgets, matcher weights, conflict policy, and the operation
//! policy. All fields have defaults.

use serde::{Deserialize, Serialize};

use crate::descriptor::Operation;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Budget applied when a request does not carry one. Absent = unbounded.
    #[serde(default)]
    pub default_budget: Option<f64>,

    /// Upper bound on a registry load/reload, in milliseconds.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub conflicts: ConflictPolicy,

    #[serde(default)]
    pub policy: OperationPolicyConfig,
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_budget: None,
            load_timeout_ms: default_load_timeout_ms(),
            matcher: MatcherConfig::default(),
            conflicts: ConflictPolicy::default(),
            policy: OperationPolicyConfig::default(),
        }
    }
}

/// Scoring knobs for the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Results scoring below this are discarded (explicit requests excepted).
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Score at or above which a result anchors a category bundle.
    #[serde(default = "default_affinity_threshold")]
    pub affinity_threshold: f64,
    /// Bonus added to results sharing a tag with an anchor.
    #[serde(default = "default_affinity_bonus")]
    pub affinity_bonus: f64,
    /// Maximum number of lexical matches returned.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

fn default_min_score() -> f64 {
    0.15
}

fn default_affinity_threshold() -> f64 {
    0.5
}

fn default_affinity_bonus() -> f64 {
    0.1
}

fn default_max_candidates() -> usize {
    16
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            affinity_threshold: default_affinity_threshold(),
            affinity_bonus: default_affinity_bonus(),
            max_candidates: default_max_candidates(),
        }
    }
}

/// Which relations make two admitted descriptors mutually exclusive.
///
/// Two descriptors of the same kind conflict when they share a conflict
/// class. Classes come from the descriptor's declared `conflict-class` (when
/// `use_declared_classes` is set) and from any tag listed in `conflict_tags`.
/// Explicit `conflicts-with` declarations always apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    #[serde(default = "default_true")]
    pub use_declared_classes: bool,
    #[serde(default)]
    pub conflict_tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            use_declared_classes: true,
            conflict_tags: Vec::new(),
        }
    }
}

/// Operations no activated descriptor may use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPolicyConfig {
    #[serde(default)]
    pub denied_operations: Vec<Operation>,
}
