//! Engine facade tying the registry, matcher, resolver and policy together.
//!
//! One [`Engine`] serves a whole process. Each request takes the current
//! registry snapshot once and runs matching and resolution against it, so a
//! concurrent reload never changes a resolution halfway through.

use std::sync::Arc;
use std::time::Duration;

use capsmith_types::config::EngineConfig;
use capsmith_types::descriptor::{Descriptor, DescriptorKind};
use capsmith_types::error::{LoadError, NotFound, ResolutionError};
use capsmith_types::plan::{ActivationPlan, Candidate, TaskContext};
use tokio_util::sync::CancellationToken;

use crate::matcher::{EXPLICIT_SCORE, Matcher};
use crate::policy::OperationPolicy;
use crate::registry::shared::{ReloadSummary, load_registry};
use crate::registry::{ContentSource, Registry, SharedRegistry};
use crate::resolver::Resolver;

#[derive(Debug, Clone)]
pub struct Engine {
    registry: SharedRegistry,
    config: EngineConfig,
    matcher: Matcher,
    resolver: Resolver,
}

impl Engine {
    pub fn new(registry: Registry, config: EngineConfig) -> Self {
        let matcher = Matcher::new(config.matcher.clone());
        let resolver = Resolver::new(
            config.conflicts.clone(),
            OperationPolicy::from_config(&config.policy),
        );
        Self {
            registry: SharedRegistry::new(registry),
            config,
            matcher,
            resolver,
        }
    }

    /// Build an engine from the first load of `source`.
    pub async fn load<S: ContentSource>(
        source: &S,
        config: EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, LoadError> {
        let timeout = Duration::from_millis(config.load_timeout_ms);
        let registry = load_registry(source, timeout, cancel).await?;
        tracing::info!(
            location = %source.location(),
            descriptors = registry.len(),
            "registry loaded"
        );
        Ok(Self::new(registry, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.config.load_timeout_ms)
    }

    /// Match `context` and resolve the candidates into an activation plan.
    ///
    /// The context's budget wins over the configured default. Explicit ids
    /// missing from the snapshot are reported in the plan's drop list.
    pub fn resolve(&self, context: &TaskContext) -> Result<ActivationPlan, ResolutionError> {
        let snapshot = self.registry.snapshot();
        self.resolve_in(context, &snapshot)
    }

    /// [`Engine::resolve`] against a snapshot the caller already holds.
    pub fn resolve_in(
        &self,
        context: &TaskContext,
        registry: &Registry,
    ) -> Result<ActivationPlan, ResolutionError> {
        let matches = self.matcher.match_context(context, registry);
        let mut candidates: Vec<Candidate> = matches.iter().map(|m| m.to_candidate()).collect();

        for id in &context.explicit_ids {
            if !registry.contains(id) {
                tracing::debug!(%id, "explicitly requested descriptor not in registry");
                candidates.push(Candidate {
                    id: id.clone(),
                    score: EXPLICIT_SCORE,
                    explicit: true,
                });
            }
        }

        let budget = context.budget.or(self.config.default_budget);
        let result = self.resolver.resolve(&candidates, registry, budget);
        match &result {
            Ok(plan) => tracing::info!(
                candidates = candidates.len(),
                entries = plan.len(),
                dropped = plan.dropped.len(),
                total_cost = plan.total_cost(),
                "resolution complete"
            ),
            Err(e) => tracing::warn!(error = %e, "resolution failed"),
        }
        result
    }

    /// The descriptor with `id` in the current snapshot.
    pub fn describe(&self, id: &str) -> Result<Arc<Descriptor>, NotFound> {
        self.registry.snapshot().lookup(id).map(Arc::clone)
    }

    /// Descriptors in id order, optionally filtered by tag and kind.
    pub fn list(&self, tag: Option<&str>, kind: Option<DescriptorKind>) -> Vec<Arc<Descriptor>> {
        let snapshot = self.registry.snapshot();
        let keep = |d: &&Arc<Descriptor>| kind.is_none_or(|k| d.kind == k);
        match tag {
            Some(tag) => snapshot.by_tag(tag).filter(keep).cloned().collect(),
            None => snapshot.iter().filter(keep).cloned().collect(),
        }
    }

    /// Rebuild the registry from `source` and publish it on success.
    pub async fn reload<S: ContentSource>(
        &self,
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<ReloadSummary, LoadError> {
        self.registry
            .reload(source, self.load_timeout(), cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemorySource, RawDocument};
    use capsmith_types::plan::DropReason;
    use std::path::PathBuf;

    fn skill(id: &str, frontmatter: &str) -> RawDocument {
        RawDocument {
            kind: DescriptorKind::Skill,
            fallback_id: id.to_owned(),
            path: PathBuf::from(format!("skills/{id}/SKILL.md")),
            content: format!("---\n{frontmatter}\n---\n"),
        }
    }

    fn source() -> InMemorySource {
        InMemorySource::new(vec![
            skill(
                "git-commit",
                "description: Write conventional git commit messages\ntags: [git]\ncost: 2\ndepends-on: [git-basics]",
            ),
            skill("git-basics", "description: Inspect git status and diffs\ntags: [git]"),
            skill(
                "pdf-extract",
                "description: Extract text from PDF files\ntags: [documents]\nallowed-tools: Bash",
            ),
        ])
    }

    async fn engine(config: EngineConfig) -> Engine {
        Engine::load(&source(), config, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_expands_dependencies_in_order() {
        let engine = engine(EngineConfig::default()).await;
        let plan = engine
            .resolve(&TaskContext::new("write a git commit message"))
            .unwrap();

        assert_eq!(plan.ids()[..2], ["git-basics", "git-commit"]);
        assert!(!plan.contains("pdf-extract"));
    }

    #[tokio::test]
    async fn test_unknown_explicit_id_is_reported() {
        let engine = engine(EngineConfig::default()).await;
        let ctx = TaskContext::new("").with_explicit_ids(["pdf-extract", "ghost"]);
        let plan = engine.resolve(&ctx).unwrap();

        assert_eq!(plan.ids(), vec!["pdf-extract"]);
        assert_eq!(plan.dropped_reason("ghost"), Some(&DropReason::NotInRegistry));
    }

    #[tokio::test]
    async fn test_default_budget_applies_when_context_has_none() {
        let config = EngineConfig {
            default_budget: Some(1.0),
            ..EngineConfig::default()
        };
        let engine = engine(config).await;
        let err = engine
            .resolve(&TaskContext::new("").with_explicit_ids(["git-commit"]))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::BudgetExceeded { .. }));

        let plan = engine
            .resolve(
                &TaskContext::new("")
                    .with_explicit_ids(["git-commit"])
                    .with_budget(3.0),
            )
            .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[tokio::test]
    async fn test_denied_tool_is_enforced_through_config() {
        let mut config = EngineConfig::default();
        config.policy.denied_operations = vec![capsmith_types::descriptor::Operation::ShellExec];
        let engine = engine(config).await;

        let plan = engine
            .resolve(&TaskContext::new("").with_explicit_ids(["pdf-extract"]))
            .unwrap();
        assert!(plan.is_empty());
        assert!(matches!(
            plan.dropped_reason("pdf-extract"),
            Some(DropReason::PolicyDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_describe_and_list() {
        let engine = engine(EngineConfig::default()).await;
        assert_eq!(engine.describe("git-basics").unwrap().tags.len(), 1);
        assert!(engine.describe("nope").is_err());

        let git: Vec<String> = engine
            .list(Some("git"), None)
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(git, vec!["git-basics", "git-commit"]);
        assert_eq!(engine.list(None, Some(DescriptorKind::Droid)).len(), 0);
        assert_eq!(engine.list(None, None).len(), 3);
    }

    #[tokio::test]
    async fn test_in_flight_snapshot_survives_reload() {
        let engine = engine(EngineConfig::default()).await;
        let held = engine.registry().snapshot();

        let replacement = InMemorySource::new(vec![skill("lint", "description: Lint rust code")]);
        let summary = engine
            .reload(&replacement, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.descriptors, 1);

        let ctx = TaskContext::new("").with_explicit_ids(["git-basics"]);
        assert_eq!(engine.resolve_in(&ctx, &held).unwrap().ids(), vec!["git-basics"]);
        assert!(engine.resolve(&ctx).unwrap().is_empty());
    }
}
