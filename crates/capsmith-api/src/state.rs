//! Application state shared by CLI commands and REST API handlers.

use std::path::PathBuf;

use anyhow::Context;
use capsmith_core::Engine;
use capsmith_infra::config::{config_path, load_engine_config};
use capsmith_infra::source::FsContentSource;
use tokio_util::sync::CancellationToken;

/// The loaded engine plus the content source it reloads from.
///
/// Cloning is cheap; every clone sees the same published registry.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub source: FsContentSource,
    /// Cancelled on shutdown; aborts in-flight reloads.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Read the config, then load the registry from `content_root`.
    pub async fn init(content_root: PathBuf, config: Option<PathBuf>) -> anyhow::Result<Self> {
        let engine_config = load_engine_config(&config_path(config.as_deref(), &content_root)).await;
        let source = FsContentSource::new(content_root);
        let shutdown = CancellationToken::new();

        let engine = Engine::load(&source, engine_config, &shutdown)
            .await
            .with_context(|| {
                format!(
                    "failed to load descriptors from {}",
                    source.root().display()
                )
            })?;

        Ok(Self {
            engine,
            source,
            shutdown,
        })
    }
}
