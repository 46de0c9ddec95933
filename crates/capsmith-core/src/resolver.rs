//! Dependency resolution: candidates in, activation plan out.
//!
//! Resolution runs in four stages over one registry snapshot:
//!
//! 1. **Expansion.** Every candidate pulls in its transitive `depends_on`
//!    closure. The union is checked for cycles with petgraph's toposort even
//!    though the registry already rejects them at load time.
//! 2. **Policy.** Candidates whose closure declares a denied operation are
//!    dropped before any cost is counted.
//! 3. **Budget and conflicts.** Candidates are admitted in rank order until
//!    the first one that does not fit. Admitted descriptors that are mutually
//!    exclusive are resolved by excluding the lower-ranked one and re-running
//!    the budget pass.
//! 4. **Ordering.** Kahn's algorithm over the admitted closure, taking ready
//!    descriptors by effective score then id.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use capsmith_types::config::ConflictPolicy;
use capsmith_types::descriptor::Descriptor;
use capsmith_types::error::ResolutionError;
use capsmith_types::plan::{ActivationPlan, Candidate, DropReason, DroppedCandidate, PlanEntry};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::matcher::compare_ranked;
use crate::policy::OperationPolicy;
use crate::registry::Registry;
use crate::registry::graph::find_cycle;

/// Tolerance for floating-point cost sums against the budget.
const COST_EPSILON: f64 = 1e-9;

/// Builds activation plans from scored candidates.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    conflicts: ConflictPolicy,
    policy: OperationPolicy,
}

impl Resolver {
    pub fn new(conflicts: ConflictPolicy, policy: OperationPolicy) -> Self {
        Self { conflicts, policy }
    }

    /// Resolve `candidates` against `registry` within `budget`
    /// (`None` = unbounded).
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::UnresolvedDependency`] when a closure references an
    ///   id the snapshot does not contain
    /// - [`ResolutionError::CycleDetected`] when the expanded closures contain
    ///   a cycle
    /// - [`ResolutionError::BudgetExceeded`] when candidates were supplied but
    ///   the budget admitted none of them
    pub fn resolve(
        &self,
        candidates: &[Candidate],
        registry: &Registry,
        budget: Option<f64>,
    ) -> Result<ActivationPlan, ResolutionError> {
        let mut dropped = Vec::new();
        let mut expansion = Expansion::default();
        let mut ranked: Vec<Ranked<'_>> = Vec::new();

        for candidate in dedup(candidates) {
            let Some(descriptor) = registry.get(&candidate.id) else {
                dropped.push(DroppedCandidate {
                    id: candidate.id.clone(),
                    reason: DropReason::NotInRegistry,
                    cascaded: Vec::new(),
                });
                continue;
            };
            let closure = expansion.closure(descriptor, registry)?;
            ranked.push(Ranked {
                descriptor,
                score: candidate.score,
                closure,
            });
        }
        expansion.check_acyclic()?;

        ranked.retain(|r| match self.policy.check_all(r.closure.iter().map(|d| &***d)) {
            Ok(()) => true,
            Err(violation) => {
                tracing::debug!(
                    candidate = %r.descriptor.id,
                    %violation,
                    "candidate dropped by operation policy"
                );
                dropped.push(DroppedCandidate {
                    id: r.descriptor.id.clone(),
                    reason: DropReason::PolicyDenied {
                        descriptor: violation.descriptor,
                        operation: violation.operation,
                    },
                    cascaded: Vec::new(),
                });
                false
            }
        });

        ranked.sort_by(|a, b| compare_ranked(a.score, a.descriptor, b.score, b.descriptor));

        let mut excluded: BTreeMap<String, String> = BTreeMap::new();
        let pass = loop {
            let pass = budget_pass(&ranked, &excluded, budget);
            match self.find_conflict(&pass) {
                Some((winner, loser)) => {
                    tracing::debug!(%winner, %loser, "conflicting descriptors; re-running budget pass");
                    excluded.insert(loser, winner);
                }
                None => break pass,
            }
        };
        dropped.extend(pass.dropped.iter().cloned());

        if let Some(limit) = budget {
            let budget_dropped = dropped
                .iter()
                .any(|d| matches!(d.reason, DropReason::BudgetExceeded { .. }));
            if !ranked.is_empty() && pass.requested.is_empty() && budget_dropped {
                return Err(ResolutionError::BudgetExceeded {
                    budget: limit,
                    dropped,
                });
            }
        }

        let entries = order(&pass, &expansion)?;

        tracing::debug!(
            candidates = candidates.len(),
            admitted = entries.len(),
            dropped = dropped.len(),
            total_cost = entries.last().map_or(0.0, |e| e.cumulative_cost),
            "resolved activation plan"
        );

        Ok(ActivationPlan {
            entries,
            dropped,
            budget,
        })
    }

    /// The first admitted descriptor (in rank order) that conflicts with a
    /// higher-ranked admitted descriptor, as `(winner, loser)`.
    fn find_conflict(&self, pass: &Pass<'_>) -> Option<(String, String)> {
        let mut admitted: Vec<&Arc<Descriptor>> = pass.admitted.values().copied().collect();
        admitted.sort_by(|a, b| {
            compare_ranked(pass.effective(&a.id), a, pass.effective(&b.id), b)
        });

        for (i, later) in admitted.iter().enumerate() {
            for earlier in &admitted[..i] {
                if self.in_conflict(earlier, later) {
                    return Some((earlier.id.clone(), later.id.clone()));
                }
            }
        }
        None
    }

    fn in_conflict(&self, a: &Descriptor, b: &Descriptor) -> bool {
        if a.declares_conflict_with(&b.id) || b.declares_conflict_with(&a.id) {
            return true;
        }
        if a.kind != b.kind {
            return false;
        }
        let a_classes = self.classes(a);
        !a_classes.is_empty() && self.classes(b).iter().any(|c| a_classes.contains(c))
    }

    fn classes<'d>(&self, descriptor: &'d Descriptor) -> BTreeSet<&'d str> {
        let mut classes = BTreeSet::new();
        if self.conflicts.use_declared_classes {
            if let Some(class) = descriptor.conflict_class.as_deref() {
                classes.insert(class);
            }
        }
        for tag in &descriptor.tags {
            if self
                .conflicts
                .conflict_tags
                .iter()
                .any(|t| t.eq_ignore_ascii_case(tag))
            {
                classes.insert(tag.as_str());
            }
        }
        classes
    }
}

/// Resolve with the default conflict policy and no denied operations.
pub fn resolve(
    candidates: &[Candidate],
    registry: &Registry,
    budget: Option<f64>,
) -> Result<ActivationPlan, ResolutionError> {
    Resolver::default().resolve(candidates, registry, budget)
}

/// Collapse repeated ids, keeping the best score.
fn dedup(candidates: &[Candidate]) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match out.iter_mut().find(|c| c.id == candidate.id) {
            Some(existing) => {
                existing.score = existing.score.max(candidate.score);
                existing.explicit |= candidate.explicit;
            }
            None => out.push(candidate.clone()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// A candidate with its descriptor and full closure (itself included).
struct Ranked<'r> {
    descriptor: &'r Arc<Descriptor>,
    score: f64,
    /// In id order.
    closure: Vec<&'r Arc<Descriptor>>,
}

/// Union of every expanded closure as a graph with `dependency -> dependent`
/// edges.
#[derive(Default)]
struct Expansion<'r> {
    graph: DiGraph<&'r Arc<Descriptor>, ()>,
    index: BTreeMap<&'r str, NodeIndex>,
}

impl<'r> Expansion<'r> {
    fn node(&mut self, descriptor: &'r Arc<Descriptor>) -> NodeIndex {
        *self
            .index
            .entry(descriptor.id.as_str())
            .or_insert_with(|| self.graph.add_node(descriptor))
    }

    fn closure(
        &mut self,
        root: &'r Arc<Descriptor>,
        registry: &'r Registry,
    ) -> Result<Vec<&'r Arc<Descriptor>>, ResolutionError> {
        let mut seen: BTreeMap<&'r str, &'r Arc<Descriptor>> = BTreeMap::new();
        seen.insert(root.id.as_str(), root);
        let mut stack = vec![root];

        while let Some(current) = stack.pop() {
            let dependent = self.node(current);
            for dep_id in &current.depends_on {
                let dep = registry.get(dep_id).ok_or_else(|| {
                    ResolutionError::UnresolvedDependency {
                        dependent: current.id.clone(),
                        missing: dep_id.clone(),
                    }
                })?;
                let dependency = self.node(dep);
                self.graph.update_edge(dependency, dependent, ());
                if seen.insert(dep.id.as_str(), dep).is_none() {
                    stack.push(dep);
                }
            }
        }

        Ok(seen.into_values().collect())
    }

    fn check_acyclic(&self) -> Result<(), ResolutionError> {
        let Err(cycle) = toposort(&self.graph, None) else {
            return Ok(());
        };
        let members: BTreeMap<String, Arc<Descriptor>> = self
            .graph
            .node_weights()
            .map(|d| (d.id.clone(), Arc::clone(d)))
            .collect();
        let cycle = find_cycle(&members)
            .unwrap_or_else(|| vec![self.graph[cycle.node_id()].id.clone()]);
        tracing::warn!(cycle = %cycle.join(" -> "), "cycle found while expanding candidates");
        Err(ResolutionError::CycleDetected { cycle })
    }
}

// ---------------------------------------------------------------------------
// Budget pass
// ---------------------------------------------------------------------------

/// Outcome of one admission pass.
struct Pass<'r> {
    /// Every admitted descriptor, candidates and pulled-in dependencies.
    admitted: BTreeMap<&'r str, &'r Arc<Descriptor>>,
    /// Admitted candidate ids with their scores.
    requested: BTreeMap<&'r str, f64>,
    /// Highest score among admitted candidates whose closure holds the id.
    effective: BTreeMap<&'r str, f64>,
    dropped: Vec<DroppedCandidate>,
}

impl Pass<'_> {
    fn effective(&self, id: &str) -> f64 {
        self.effective.get(id).copied().unwrap_or(0.0)
    }
}

/// Admit candidates in rank order. The first one whose not-yet-admitted
/// closure does not fit stops admission for everything ranked below it.
fn budget_pass<'r>(
    ranked: &[Ranked<'r>],
    excluded: &BTreeMap<String, String>,
    budget: Option<f64>,
) -> Pass<'r> {
    let mut pass = Pass {
        admitted: BTreeMap::new(),
        requested: BTreeMap::new(),
        effective: BTreeMap::new(),
        dropped: Vec::new(),
    };
    let mut total = 0.0_f64;
    let mut stopped = false;

    for candidate in ranked {
        let id = candidate.descriptor.id.as_str();

        if let Some(winner) = excluded.get(id) {
            pass.dropped.push(DroppedCandidate {
                id: id.to_owned(),
                reason: DropReason::Conflict {
                    winner: winner.clone(),
                },
                cascaded: Vec::new(),
            });
            continue;
        }
        if let Some(dep) = candidate
            .closure
            .iter()
            .find(|d| d.id != id && excluded.contains_key(&d.id))
        {
            pass.dropped.push(DroppedCandidate {
                id: id.to_owned(),
                reason: DropReason::DependencyDropped {
                    dependency: dep.id.clone(),
                },
                cascaded: Vec::new(),
            });
            continue;
        }

        let fresh: Vec<&'r Arc<Descriptor>> = candidate
            .closure
            .iter()
            .copied()
            .filter(|d| !pass.admitted.contains_key(d.id.as_str()))
            .collect();
        let required: f64 = fresh.iter().map(|d| d.estimated_cost).sum();

        let fits = budget.is_none_or(|limit| total + required <= limit + COST_EPSILON);
        if stopped || !fits {
            stopped = true;
            let remaining = budget.map_or(f64::INFINITY, |limit| (limit - total).max(0.0));
            pass.dropped.push(DroppedCandidate {
                id: id.to_owned(),
                reason: DropReason::BudgetExceeded {
                    required,
                    remaining,
                },
                cascaded: fresh
                    .iter()
                    .filter(|d| d.id != id)
                    .map(|d| d.id.clone())
                    .collect(),
            });
            continue;
        }

        total += required;
        for d in fresh {
            pass.admitted.insert(d.id.as_str(), d);
        }
        for d in &candidate.closure {
            let slot = pass.effective.entry(d.id.as_str()).or_insert(candidate.score);
            *slot = slot.max(candidate.score);
        }
        pass.requested.insert(id, candidate.score);
    }

    pass
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Kahn's algorithm over the admitted set. Ready descriptors are taken by
/// effective score descending, then id ascending.
fn order(pass: &Pass<'_>, expansion: &Expansion<'_>) -> Result<Vec<PlanEntry>, ResolutionError> {
    let mut pending: BTreeMap<&str, usize> = pass
        .admitted
        .values()
        .map(|d| {
            let deps = d
                .depends_on
                .iter()
                .filter(|dep| pass.admitted.contains_key(dep.as_str()))
                .collect::<BTreeSet<_>>()
                .len();
            (d.id.as_str(), deps)
        })
        .collect();

    let mut ready: Vec<&str> = pending
        .iter()
        .filter(|(_, deps)| **deps == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut entries = Vec::with_capacity(pass.admitted.len());
    let mut cumulative = 0.0_f64;

    while let Some(pos) = best_ready(&ready, pass) {
        let id = ready.swap_remove(pos);
        pending.remove(id);
        let Some(descriptor) = pass.admitted.get(id) else {
            continue;
        };

        cumulative += descriptor.estimated_cost;
        entries.push(PlanEntry {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            cost: descriptor.estimated_cost,
            cumulative_cost: cumulative,
            score: pass.effective(id),
            requested: pass.requested.contains_key(id),
        });

        let Some(&node) = expansion.index.get(id) else {
            continue;
        };
        for dependent in expansion.graph.neighbors_directed(node, Direction::Outgoing) {
            let dependent_id = expansion.graph[dependent].id.as_str();
            if let Some(count) = pending.get_mut(dependent_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(dependent_id);
                }
            }
        }
    }

    if !pending.is_empty() {
        return Err(ResolutionError::CycleDetected {
            cycle: pending.keys().map(|id| (*id).to_owned()).collect(),
        });
    }
    Ok(entries)
}

fn best_ready(ready: &[&str], pass: &Pass<'_>) -> Option<usize> {
    ready
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            pass.effective(b)
                .total_cmp(&pass.effective(a))
                .then_with(|| a.cmp(b))
        })
        .map(|(pos, _)| pos)
}
