//! Snapshot publication and hot reload.
//!
//! Readers take an `Arc<Registry>` snapshot and keep it for the whole
//! request. `reload` builds a complete new registry first and only then swaps
//! the single published reference, so a reader sees either the old table or
//! the new one, never a mix. A failed reload leaves the old snapshot in place.
//! Reloads are serialized, so snapshots are published in the order their
//! content was read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use capsmith_types::error::LoadError;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::Registry;
use super::source::ContentSource;

/// Result of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    /// Monotonic snapshot counter, 1 for the first published registry.
    pub generation: u64,
    pub descriptors: usize,
    pub elapsed_ms: u64,
}

/// Process-wide handle to the current registry snapshot.
///
/// Cloning produces another handle to the same published snapshot.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<Registry>>>,
    generation: Arc<AtomicU64>,
    /// Held across fetch, build and publish.
    reload_lock: Arc<Mutex<()>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
            generation: Arc::new(AtomicU64::new(1)),
            reload_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The currently published snapshot.
    ///
    /// The lock is held only long enough to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<Registry> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Publish a fully built registry, returning its generation.
    pub fn publish(&self, registry: Registry) -> u64 {
        let next = Arc::new(registry);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Rebuild from `source` and publish on success.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`] from [`load_registry`]; the previous snapshot stays
    /// authoritative.
    pub async fn reload<S: ContentSource>(
        &self,
        source: &S,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ReloadSummary, LoadError> {
        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LoadError::Cancelled),
            guard = self.reload_lock.lock() => guard,
        };
        let start = Instant::now();

        let registry = match load_registry(source, timeout, cancel).await {
            Ok(registry) => registry,
            Err(e) => {
                tracing::warn!(
                    location = %source.location(),
                    error = %e,
                    generation = self.generation(),
                    "registry reload failed; keeping current snapshot"
                );
                return Err(e);
            }
        };

        let descriptors = registry.len();
        let generation = self.publish(registry);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            location = %source.location(),
            descriptors,
            generation,
            elapsed_ms,
            "registry snapshot published"
        );

        Ok(ReloadSummary {
            generation,
            descriptors,
            elapsed_ms,
        })
    }
}

/// Fetch documents from `source` and build a registry, bounded by `timeout`
/// and abandoned early if `cancel` fires.
///
/// # Errors
///
/// [`LoadError::Timeout`], [`LoadError::Cancelled`], or whatever the source
/// and the registry build report.
pub async fn load_registry<S: ContentSource>(
    source: &S,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Registry, LoadError> {
    let build = async {
        let documents = source.fetch().await.map_err(LoadError::from)?;
        tracing::debug!(
            location = %source.location(),
            documents = documents.len(),
            "fetched descriptor documents"
        );
        Registry::from_documents(documents)
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(LoadError::Cancelled),
        result = tokio::time::timeout(timeout, build) => match result {
            Ok(built) => built,
            Err(_) => Err(LoadError::Timeout(timeout)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemorySource, RawDocument};
    use capsmith_types::descriptor::DescriptorKind;
    use capsmith_types::error::SourceError;
    use std::path::PathBuf;

    fn doc(id: &str, content: &str) -> RawDocument {
        RawDocument {
            kind: DescriptorKind::Skill,
            fallback_id: id.to_owned(),
            path: PathBuf::from(format!("skills/{id}/SKILL.md")),
            content: content.to_owned(),
        }
    }

    struct SlowSource;

    impl ContentSource for SlowSource {
        async fn fetch(&self) -> Result<Vec<RawDocument>, SourceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        fn location(&self) -> String {
            "slow".to_owned()
        }
    }

    /// Hands out `documents` immediately, then sleeps before returning them.
    struct LaggingSource {
        documents: Vec<RawDocument>,
        delay: Duration,
    }

    impl ContentSource for LaggingSource {
        async fn fetch(&self) -> Result<Vec<RawDocument>, SourceError> {
            let documents = self.documents.clone();
            tokio::time::sleep(self.delay).await;
            Ok(documents)
        }

        fn location(&self) -> String {
            "lagging".to_owned()
        }
    }

    #[tokio::test]
    async fn test_overlapping_reloads_publish_in_start_order() {
        let shared = SharedRegistry::new(Registry::empty());

        let older = LaggingSource {
            documents: vec![doc("old", "---\ndescription: Old content\n---\n")],
            delay: Duration::from_millis(200),
        };
        let first = {
            let shared = shared.clone();
            tokio::spawn(async move {
                shared
                    .reload(&older, Duration::from_secs(5), &CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let newer = InMemorySource::new(vec![doc("new", "---\ndescription: New content\n---\n")]);
        let second = shared
            .reload(&newer, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(first.generation < second.generation);
        assert_eq!(shared.generation(), second.generation);
        let current = shared.snapshot();
        assert!(current.contains("new"));
        assert!(!current.contains("old"));
    }

    #[tokio::test]
    async fn test_reload_publishes_new_snapshot() {
        let shared = SharedRegistry::new(Registry::empty());
        let before = shared.snapshot();

        let source = InMemorySource::new(vec![doc("lint", "---\ndescription: Lint code\n---\n")]);
        let summary = shared
            .reload(&source, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.generation, 2);
        assert_eq!(summary.descriptors, 1);
        // A reader holding the old snapshot is unaffected.
        assert!(before.is_empty());
        assert!(shared.snapshot().contains("lint"));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_snapshot() {
        let good = InMemorySource::new(vec![doc("lint", "---\ndescription: Lint code\n---\n")]);
        let shared = SharedRegistry::new(Registry::empty());
        shared
            .reload(&good, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();

        let cyclic = InMemorySource::new(vec![
            doc("a", "---\ndescription: A\ndepends-on: [b]\n---\n"),
            doc("b", "---\ndescription: B\ndepends-on: [a]\n---\n"),
        ]);
        let err = shared
            .reload(&cyclic, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::DependencyCycle { .. }));
        assert_eq!(shared.generation(), 2);
        assert!(shared.snapshot().contains("lint"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_times_out() {
        let err = load_registry(&SlowSource, Duration::from_millis(50), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_load_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = load_registry(&SlowSource, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled));
    }
}
