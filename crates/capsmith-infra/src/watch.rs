//! Content-root watcher driving hot reload.
//!
//! Provides:
//! - `start_content_watcher()` -- debounced recursive watch of a content root
//! - `WatcherHandle` -- RAII handle that keeps the watcher alive
//! - `spawn_reloader()` -- task that reloads an engine on each change batch

use std::path::{Path, PathBuf};
use std::time::Duration;

use capsmith_core::Engine;
use capsmith_core::registry::ContentSource;
// notify types come through notify-debouncer-mini so both agree on the
// notify version.
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEvent, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Errors that can occur while setting up a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watcher creation failed: {0}")]
    WatcherCreation(String),

    #[error("failed to watch path '{path}': {reason}")]
    WatchPath { path: String, reason: String },
}

/// RAII handle that keeps a filesystem watcher alive. Dropping it stops the
/// watch.
pub struct WatcherHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        tracing::debug!(root = %self.root.display(), "content watcher dropped");
    }
}

/// Whether a change at `path` (relative to the content root) can affect the
/// registry: markdown documents and directories, hidden entries excluded.
///
/// `capsmith.toml` is read once at startup, so edits to it are ignored.
pub fn is_relevant(path: &Path) -> bool {
    let hidden = path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
    });
    if hidden {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.eq_ignore_ascii_case("md"),
        // Directory create/remove events carry no extension.
        None => true,
    }
}

fn relevant_paths(root: &Path, events: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    events
        .into_iter()
        .map(|e| e.path)
        .filter(|p| {
            let relative = p.strip_prefix(root).unwrap_or(p);
            is_relevant(relative)
        })
        .collect()
}

/// Watch `root` recursively. Each debounced batch of relevant changes is sent
/// on the returned channel.
pub fn start_content_watcher(
    root: &Path,
    debounce_ms: Option<u64>,
) -> Result<(WatcherHandle, mpsc::Receiver<Vec<PathBuf>>), WatchError> {
    let debounce = Duration::from_millis(debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS));
    let (tx, rx) = mpsc::channel::<Vec<PathBuf>>(16);
    let watched = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let changed = relevant_paths(&watched, events);
            if changed.is_empty() {
                return;
            }
            tracing::debug!(count = changed.len(), "content change detected");
            // A full channel means a reload is already queued.
            let _ = tx.try_send(changed);
        }
        Err(err) => {
            tracing::warn!(error = %err, "content watcher error");
        }
    })
    .map_err(|e| WatchError::WatcherCreation(e.to_string()))?;

    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| WatchError::WatchPath {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(root = %root.display(), "content watcher started");

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            root: root.to_path_buf(),
        },
        rx,
    ))
}

/// Reload `engine` from `source` on every change batch until `cancel` fires
/// or the channel closes. Failed reloads keep the previous snapshot.
pub fn spawn_reloader<S>(
    engine: Engine,
    source: S,
    mut changes: mpsc::Receiver<Vec<PathBuf>>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: ContentSource + 'static,
{
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => break,
                batch = changes.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            tracing::info!(changed = batch.len(), "reloading registry after content change");
            // Errors are logged inside reload; the old snapshot stays live.
            let _ = engine.reload(&source, &cancel).await;
        }
        tracing::debug!("content reloader stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsmith_core::registry::{InMemorySource, RawDocument, Registry};
    use capsmith_types::config::EngineConfig;
    use capsmith_types::descriptor::DescriptorKind;

    #[test]
    fn test_relevance_filter() {
        assert!(is_relevant(Path::new("skills/git/SKILL.md")));
        assert!(!is_relevant(Path::new("capsmith.toml")));
        assert!(is_relevant(Path::new("commands/nested")));
        assert!(!is_relevant(Path::new("skills/git/notes.txt")));
        assert!(!is_relevant(Path::new(".git/index.md")));
        assert!(!is_relevant(Path::new("droids/.reviewer.md.swp")));
    }

    #[test]
    fn test_paths_are_judged_relative_to_the_root() {
        let root = Path::new("/home/me/.config/capsmith");
        let events = vec![
            DebouncedEvent {
                path: root.join("droids/reviewer.md"),
                kind: notify_debouncer_mini::DebouncedEventKind::Any,
            },
            DebouncedEvent {
                path: root.join(".git/HEAD"),
                kind: notify_debouncer_mini::DebouncedEventKind::Any,
            },
        ];
        assert_eq!(
            relevant_paths(root, events),
            vec![root.join("droids/reviewer.md")]
        );
    }

    #[tokio::test]
    async fn test_reloader_publishes_on_change_and_stops_on_cancel() {
        let engine = Engine::new(Registry::empty(), EngineConfig::default());
        let source = InMemorySource::new(vec![RawDocument {
            kind: DescriptorKind::Droid,
            fallback_id: "reviewer".to_owned(),
            path: PathBuf::from("droids/reviewer.md"),
            content: "---\ndescription: Review code\n---\n".to_owned(),
        }]);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = spawn_reloader(engine.clone(), source, rx, cancel.clone());

        tx.send(vec![PathBuf::from("droids/reviewer.md")])
            .await
            .unwrap();
        for _ in 0..100 {
            if engine.registry().generation() > 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(engine.describe("reviewer").is_ok());

        cancel.cancel();
        task.await.unwrap();
    }
}
