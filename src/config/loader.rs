//! Configuration loader with tier-based merging.

use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Locations consulted while loading configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit config file; when set, project and user files are skipped.
    pub explicit_file: Option<PathBuf>,
    /// Project-level config directory.
    pub project_dir: Option<PathBuf>,
    /// User-level config directory.
    pub user_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        let explicit_file = std::env::var("TASK_ROSTER_CONFIG_PATH")
            .ok()
            .map(PathBuf::from);

        let user_dir = std::env::var("TASK_ROSTER_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".task-roster")));

        let project_dir = std::env::var("TASK_ROSTER_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("task-roster")));

        Self {
            explicit_file,
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            explicit_file: None,
            project_dir,
            user_dir,
        }
    }
}

/// Merge `overlay` onto `base`: objects key by key, everything else replaced.
/// A null overlay keeps the base value.
fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

fn read_yaml_tier(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_yaml::from_str::<Value>(&content).map_err(Into::into));
    match parsed {
        Ok(value) => {
            debug!(path = %path.display(), "Loaded config tier");
            Some(value)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
            None
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority config file that contributed, if any.
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers, including the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(ConfigPaths::discover(), |key| std::env::var(key).ok())
    }

    /// Load configuration from explicit paths, ignoring the environment.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        Self::load_with(paths, |_| None)
    }

    /// Load configuration with explicit paths and an environment lookup.
    pub fn load_with<F>(paths: ConfigPaths, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut config, config_path) = match &paths.explicit_file {
            Some(path) => {
                let config = Config::load(path)
                    .with_context(|| format!("failed to load config file {}", path.display()))?;
                (config, Some(path.clone()))
            }
            None => Self::merge_file_tiers(&paths)?,
        };

        Self::apply_env_overrides(&mut config, env);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    fn merge_file_tiers(paths: &ConfigPaths) -> Result<(Config, Option<PathBuf>)> {
        let mut merged = serde_json::to_value(Config::default())?;
        let mut config_path = None;

        let tiers = [paths.project_dir.as_deref(), paths.user_dir.as_deref()];
        for dir in tiers.into_iter().flatten() {
            let file = dir.join("config.yaml");
            if let Some(value) = read_yaml_tier(&file) {
                merged = merge_values(merged, value);
                config_path = Some(file);
            }
        }

        let config = serde_json::from_value(merged).context("invalid configuration")?;
        Ok((config, config_path))
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides<F>(config: &mut Config, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&'static str]| keys.iter().find_map(|k| env(k).map(|v| (*k, v)));

        if let Some((_, db_path)) = first(&["TASK_ROSTER_DB_PATH"]) {
            config.server.db_path = PathBuf::from(db_path);
        }

        if let Some((key, host)) = first(&["TASK_ROSTER_HOST", "BIND_HOST"]) {
            match host.trim().parse() {
                Ok(host) => config.server.host = host,
                Err(_) => warn!(key, value = %host, "Ignoring invalid listen address"),
            }
        }

        if let Some((key, port)) = first(&["TASK_ROSTER_PORT", "PORT"]) {
            match port.trim().parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!(key, value = %port, "Ignoring invalid port"),
            }
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Get the config file path that was used.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PORT;
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("config.yaml"), content).unwrap();
    }

    #[test]
    fn merge_recurses_into_objects_and_keeps_base_on_null() {
        let base = json!({"server": {"host": "127.0.0.1", "port": 5000}, "x": 1});
        let overlay = json!({"server": {"port": 8080}, "x": null});
        assert_eq!(
            merge_values(base, overlay),
            json!({"server": {"host": "127.0.0.1", "port": 8080}, "x": 1})
        );
    }

    #[test]
    fn defaults_when_no_files_exist() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );

        let loader = ConfigLoader::load_with_paths(paths).unwrap();

        assert_eq!(loader.config(), &Config::default());
        assert_eq!(loader.config().server.port, DEFAULT_PORT);
        assert!(loader.config_path().is_none());
    }

    #[test]
    fn user_tier_overrides_project_tier_field_by_field() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let user = temp.path().join("user");
        write_config(&project, "server:\n  port: 6000\n  db_path: project.db\n");
        write_config(&user, "server:\n  port: 7000\n");

        let loader =
            ConfigLoader::load_with_paths(ConfigPaths::with_dirs(Some(project), Some(user.clone())))
                .unwrap();

        assert_eq!(loader.config().server.port, 7000);
        assert_eq!(loader.config().server.db_path, PathBuf::from("project.db"));
        assert_eq!(loader.config_path(), Some(user.join("config.yaml").as_path()));
    }

    #[test]
    fn environment_overrides_files() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        write_config(&project, "server:\n  port: 6000\n");

        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "9100"),
            ("BIND_HOST", "0.0.0.0"),
            ("TASK_ROSTER_DB_PATH", "/tmp/roster.db"),
        ]);
        let loader = ConfigLoader::load_with(ConfigPaths::with_dirs(Some(project), None), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        let server = &loader.config().server;
        assert_eq!(server.port, 9100);
        assert_eq!(server.host, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(server.db_path, PathBuf::from("/tmp/roster.db"));
    }

    #[test]
    fn prefixed_variables_win_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> =
            HashMap::from([("TASK_ROSTER_PORT", "not-a-port"), ("PORT", "9100")]);
        let loader = ConfigLoader::load_with(ConfigPaths::default(), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(loader.config().server.port, DEFAULT_PORT);
    }

    #[test]
    fn explicit_file_replaces_tiers() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        write_config(&project, "server:\n  port: 6000\n");
        let explicit = temp.path().join("explicit.yaml");
        std::fs::write(&explicit, "server:\n  db_path: explicit.db\n").unwrap();

        let paths = ConfigPaths {
            explicit_file: Some(explicit),
            project_dir: Some(project),
            user_dir: None,
        };
        let loader = ConfigLoader::load_with_paths(paths).unwrap();

        assert_eq!(loader.config().server.port, DEFAULT_PORT);
        assert_eq!(loader.config().server.db_path, PathBuf::from("explicit.db"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let paths = ConfigPaths {
            explicit_file: Some(PathBuf::from("/nonexistent/roster.yaml")),
            ..ConfigPaths::default()
        };
        assert!(ConfigLoader::load_with_paths(paths).is_err());
    }
}
