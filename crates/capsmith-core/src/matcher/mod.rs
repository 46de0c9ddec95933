//! Task-to-descriptor matching.
//!
//! Scores every descriptor in a registry snapshot against a task context and
//! returns a ranked candidate list. Scoring is a fixed, explicit policy:
//!
//! 1. Lexical overlap between the task text and the descriptor's description,
//!    name, id and tags.
//! 2. Explicitly requested ids score 1.0 regardless of overlap.
//! 3. Results that share a tag with a high-scoring anchor gain a bonus, so
//!    coherent bundles outrank scattered single matches.
//!
//! The matcher is infallible and deterministic: no randomness, and ties are
//! broken by version then id.

pub mod text;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use capsmith_types::config::MatcherConfig;
use capsmith_types::descriptor::Descriptor;
use capsmith_types::plan::{Candidate, TaskContext};

use crate::registry::Registry;

/// Weight of query coverage over every descriptor term.
const COVERAGE_WEIGHT: f64 = 0.7;

/// Weight of query coverage over tag and id terms only.
const LABEL_WEIGHT: f64 = 0.3;

/// Score given to explicitly requested descriptors.
pub const EXPLICIT_SCORE: f64 = 1.0;

/// One ranked match.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub descriptor: Arc<Descriptor>,
    /// In `[0, 1]`.
    pub score: f64,
    pub explicit: bool,
}

impl MatchResult {
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            id: self.descriptor.id.clone(),
            score: self.score,
            explicit: self.explicit,
        }
    }
}

/// Ranking order shared by the matcher and the resolver: score descending,
/// then higher version, then id ascending.
pub fn compare_ranked(a_score: f64, a: &Descriptor, b_score: f64, b: &Descriptor) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| b.version.cmp(&a.version))
        .then_with(|| a.id.cmp(&b.id))
}

/// Scores descriptors against task contexts.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Rank the descriptors of `registry` for `context`.
    ///
    /// Returns an empty list for an empty or non-matching context. Explicit
    /// ids absent from the registry are ignored here; the engine reports
    /// them.
    pub fn match_context(&self, context: &TaskContext, registry: &Registry) -> Vec<MatchResult> {
        let query = text::terms(&context.text);
        let explicit: BTreeSet<&str> = context
            .explicit_ids
            .iter()
            .map(String::as_str)
            .filter(|id| registry.contains(id))
            .collect();

        if query.is_empty() && explicit.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<MatchResult> = registry
            .iter()
            .filter_map(|descriptor| {
                if explicit.contains(descriptor.id.as_str()) {
                    return Some(MatchResult {
                        descriptor: Arc::clone(descriptor),
                        score: EXPLICIT_SCORE,
                        explicit: true,
                    });
                }
                let score = lexical_score(&query, descriptor);
                (score > 0.0).then(|| MatchResult {
                    descriptor: Arc::clone(descriptor),
                    score,
                    explicit: false,
                })
            })
            .collect();

        self.apply_affinity(&mut results);

        results.retain(|r| r.explicit || r.score >= self.config.min_score);
        results.sort_by(|a, b| compare_ranked(a.score, &a.descriptor, b.score, &b.descriptor));

        let mut lexical_kept = 0usize;
        results.retain(|r| {
            if r.explicit {
                return true;
            }
            lexical_kept += 1;
            lexical_kept <= self.config.max_candidates
        });

        tracing::debug!(
            terms = query.len(),
            explicit = explicit.len(),
            matched = results.len(),
            "matched task context"
        );

        results
    }

    /// Add the category-affinity bonus to lexical matches that share a tag
    /// with a different anchor result.
    fn apply_affinity(&self, results: &mut [MatchResult]) {
        if self.config.affinity_bonus <= 0.0 {
            return;
        }

        let mut anchors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for r in results.iter() {
            if r.score >= self.config.affinity_threshold {
                for tag in &r.descriptor.tags {
                    anchors
                        .entry(tag.as_str())
                        .or_default()
                        .insert(r.descriptor.id.as_str());
                }
            }
        }
        if anchors.is_empty() {
            return;
        }

        let boosted: Vec<bool> = results
            .iter()
            .map(|r| {
                !r.explicit
                    && r.descriptor.tags.iter().any(|tag| {
                        anchors
                            .get(tag.as_str())
                            .is_some_and(|ids| ids.iter().any(|id| *id != r.descriptor.id))
                    })
            })
            .collect();

        for (r, boost) in results.iter_mut().zip(boosted) {
            if boost {
                r.score = (r.score + self.config.affinity_bonus).min(1.0);
            }
        }
    }
}

/// Query coverage over the descriptor's terms, weighted toward tag/id hits.
fn lexical_score(query: &BTreeSet<String>, descriptor: &Descriptor) -> f64 {
    if query.is_empty() {
        return 0.0;
    }

    let mut labels = text::label_terms(&descriptor.id);
    for tag in &descriptor.tags {
        labels.extend(text::label_terms(tag));
    }

    let mut all = text::terms(&descriptor.description);
    all.extend(text::terms(&descriptor.name));
    all.extend(labels.iter().cloned());

    let total = query.len() as f64;
    let covered = query.iter().filter(|t| all.contains(*t)).count() as f64;
    let label_hits = query.iter().filter(|t| labels.contains(*t)).count() as f64;

    (COVERAGE_WEIGHT * covered / total + LABEL_WEIGHT * label_hits / total).clamp(0.0, 1.0)
}
