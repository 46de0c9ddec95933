//! Engine configuration loader.
//!
//! Reads `capsmith.toml` and deserializes it into [`EngineConfig`]. Falls back
//! to defaults when the file is missing or malformed so a bad config never
//! prevents the engine from starting.

use std::path::{Path, PathBuf};

use capsmith_types::config::EngineConfig;

/// Config file name looked up in the content root when no path is given.
pub const CONFIG_FILE_NAME: &str = "capsmith.toml";

/// Lower bound on the registry load timeout.
const MIN_LOAD_TIMEOUT_MS: u64 = 100;

/// Where to look for the config: the explicit path, or `capsmith.toml` in the
/// content root.
pub fn config_path(explicit: Option<&Path>, content_root: &Path) -> PathBuf {
    explicit.map_or_else(|| content_root.join(CONFIG_FILE_NAME), Path::to_path_buf)
}

/// Load engine configuration from `path`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
/// - Otherwise the parsed config, with out-of-range values clamped.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

/// Clamp values that would make the engine misbehave.
fn sanitize(mut config: EngineConfig) -> EngineConfig {
    if config.load_timeout_ms < MIN_LOAD_TIMEOUT_MS {
        tracing::warn!(
            configured = config.load_timeout_ms,
            minimum = MIN_LOAD_TIMEOUT_MS,
            "load_timeout_ms below minimum, raising"
        );
        config.load_timeout_ms = MIN_LOAD_TIMEOUT_MS;
    }
    if let Some(budget) = config.default_budget {
        if !budget.is_finite() || budget < 0.0 {
            tracing::warn!(budget, "ignoring invalid default_budget");
            config.default_budget = None;
        }
    }
    let m = &mut config.matcher;
    m.min_score = m.min_score.clamp(0.0, 1.0);
    m.affinity_threshold = m.affinity_threshold.clamp(0.0, 1.0);
    m.affinity_bonus = m.affinity_bonus.clamp(0.0, 1.0);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsmith_types::descriptor::Operation;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(&tmp.path().join(CONFIG_FILE_NAME)).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            r#"
default_budget = 8.0

[matcher]
max_candidates = 3

[policy]
denied_operations = ["network"]
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(&path).await;
        assert_eq!(config.default_budget, Some(8.0));
        assert_eq!(config.matcher.max_candidates, 3);
        assert_eq!(config.policy.denied_operations, vec![Operation::Network]);
    }

    #[tokio::test]
    async fn test_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();
        assert_eq!(load_engine_config(&path).await, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_out_of_range_values_are_clamped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            "default_budget = -3.0\nload_timeout_ms = 1\n[matcher]\nmin_score = 4.0\n",
        )
        .await
        .unwrap();

        let config = load_engine_config(&path).await;
        assert_eq!(config.default_budget, None);
        assert_eq!(config.load_timeout_ms, MIN_LOAD_TIMEOUT_MS);
        assert!((config.matcher.min_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_path_prefers_explicit() {
        let root = Path::new("/content");
        assert_eq!(
            config_path(None, root),
            PathBuf::from("/content/capsmith.toml")
        );
        assert_eq!(
            config_path(Some(Path::new("/etc/capsmith.toml")), root),
            PathBuf::from("/etc/capsmith.toml")
        );
    }
}
