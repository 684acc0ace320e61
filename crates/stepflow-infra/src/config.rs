//! Engine configuration loader for Stepflow.
//!
//! Reads `stepflow.toml` from the data directory and deserializes it into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use stepflow_types::config::EngineConfig;

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "stepflow.toml";

/// Load engine configuration from `{data_dir}/stepflow.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => {
            if config.max_delay_ms > config.effective_delay_cap_ms() {
                tracing::warn!(
                    requested = config.max_delay_ms,
                    effective = config.effective_delay_cap_ms(),
                    "max_delay_ms exceeds the hard cap and will be clamped"
                );
            }
            config
        }
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Resolve the definitions directory, if configured.
///
/// Relative paths are taken relative to `data_dir`.
pub fn resolve_definitions_dir(config: &EngineConfig, data_dir: &Path) -> Option<PathBuf> {
    config.definitions_dir.as_ref().map(|dir| {
        if dir.is_absolute() {
            dir.clone()
        } else {
            data_dir.join(dir)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
max_delay_ms = 1000
strict_dependency_order = true
definitions_dir = "workflows"
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.max_delay_ms, 1000);
        assert!(config.strict_dependency_order);
        assert_eq!(config.definitions_dir, Some(PathBuf::from("workflows")));
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_keeps_oversized_delay_but_caps_it() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "max_delay_ms = 90000")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.max_delay_ms, 90_000);
        assert_eq!(config.effective_delay_cap_ms(), 30_000);
    }

    #[test]
    fn resolve_definitions_dir_relative_and_absolute() {
        let data_dir = Path::new("/srv/stepflow");

        let relative = EngineConfig {
            definitions_dir: Some(PathBuf::from("workflows")),
            ..EngineConfig::default()
        };
        assert_eq!(
            resolve_definitions_dir(&relative, data_dir),
            Some(PathBuf::from("/srv/stepflow/workflows"))
        );

        let absolute = EngineConfig {
            definitions_dir: Some(PathBuf::from("/etc/stepflow/flows")),
            ..EngineConfig::default()
        };
        assert_eq!(
            resolve_definitions_dir(&absolute, data_dir),
            Some(PathBuf::from("/etc/stepflow/flows"))
        );

        assert_eq!(resolve_definitions_dir(&EngineConfig::default(), data_dir), None);
    }
}
