use std::time::Duration;

use thiserror::Error;

use crate::plan::DroppedCandidate;

/// Errors from reading a content source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content root '{0}' does not exist")]
    MissingRoot(String),

    #[error("failed to read '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// Errors that abort a registry load or reload.
///
/// A failed reload never replaces the published snapshot.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed descriptor at '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("duplicate descriptor id '{id}' (defined in '{first}' and '{second}')")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("content source error: {0}")]
    Source(#[from] SourceError),

    #[error("load timed out after {0:?}")]
    Timeout(Duration),

    #[error("load cancelled")]
    Cancelled,
}

/// A descriptor lookup missed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("descriptor '{0}' not found")]
pub struct NotFound(pub String);

/// Request-level resolution failures. Each names the offending descriptor(s).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("dependency cycle detected during resolution: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("budget {budget} admits none of the candidates; dropped: {}", dropped_summary(.dropped))]
    BudgetExceeded {
        budget: f64,
        dropped: Vec<DroppedCandidate>,
    },

    #[error("descriptor '{dependent}' depends on unknown descriptor '{missing}'")]
    UnresolvedDependency { dependent: String, missing: String },
}

impl ResolutionError {
    /// Every descriptor id the error implicates.
    pub fn offending_ids(&self) -> Vec<String> {
        match self {
            Self::CycleDetected { cycle } => cycle.clone(),
            Self::BudgetExceeded { dropped, .. } => dropped
                .iter()
                .flat_map(|d| std::iter::once(d.id.clone()).chain(d.cascaded.iter().cloned()))
                .collect(),
            Self::UnresolvedDependency { dependent, missing } => {
                vec![dependent.clone(), missing.clone()]
            }
        }
    }
}

fn dropped_summary(dropped: &[DroppedCandidate]) -> String {
    dropped
        .iter()
        .map(|d| {
            if d.cascaded.is_empty() {
                d.id.clone()
            } else {
                format!("{} (with {})", d.id, d.cascaded.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
