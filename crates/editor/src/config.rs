// Editor configuration.
//
// File: `~/.griddoc/config.toml`. Environment variables override the file:
//
// | Variable | Field |
// |---|---|
// | `GRIDDOC_DATABASE_URL` | `database_url` |
// | `GRIDDOC_USER_ID` | `user_id` |
// | `GRIDDOC_LOG_FILTER` | `log_filter` |
// | `GRIDDOC_AUTOSAVE_MS` | `autosave.quiet_period_ms` |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use griddoc_common::Viewer;
use griddoc_store::db::pool::PoolConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::autosave::{clamp_quiet_period, DEFAULT_QUIET_PERIOD_MS};

/// Root directory for griddoc state: `~/.griddoc/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".griddoc"))
}

/// Path to the config file: `~/.griddoc/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Acting user. Unset means anonymous.
    pub user_id: Option<Uuid>,
    /// `tracing` filter directive (e.g. `info`, `griddoc_editor=debug`).
    pub log_filter: String,
    pub autosave: AutosaveConfig,
    pub pool: PoolConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            user_id: None,
            log_filter: "info".into(),
            autosave: AutosaveConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutosaveConfig {
    pub quiet_period_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { quiet_period_ms: DEFAULT_QUIET_PERIOD_MS }
    }
}

impl AutosaveConfig {
    /// The configured quiet period, clamped to the supported range.
    pub fn quiet_period(&self) -> Duration {
        clamp_quiet_period(self.quiet_period_ms)
    }
}

impl EditorConfig {
    /// Load `~/.griddoc/config.toml` (defaults when absent) and apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match global_config_path() {
            Some(path) => Self::load_or_default(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::Parse),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(ConfigError::Io(error)),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).map_err(ConfigError::Io)?;
        restrict_to_owner(path).map_err(ConfigError::Io)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_fn(|key| std::env::var(key));
    }

    /// Testable override step that accepts an environment lookup function.
    fn apply_env_fn<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(url) = env("GRIDDOC_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(raw) = env("GRIDDOC_USER_ID") {
            match Uuid::parse_str(raw.trim()) {
                Ok(id) => self.user_id = Some(id),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid GRIDDOC_USER_ID"),
            }
        }
        if let Ok(filter) = env("GRIDDOC_LOG_FILTER") {
            self.log_filter = filter;
        }
        if let Ok(raw) = env("GRIDDOC_AUTOSAVE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.autosave.quiet_period_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid GRIDDOC_AUTOSAVE_MS"),
            }
        }
    }

    pub fn viewer(&self) -> Viewer {
        Viewer::from(self.user_id)
    }
}

/// The config may hold database credentials.
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults() {
        let cfg = EditorConfig::default();
        assert!(cfg.database_url.is_none());
        assert!(cfg.user_id.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.autosave.quiet_period(), Duration::from_millis(2500));
        assert_eq!(cfg.viewer(), Viewer::Anonymous);
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("config.toml");

        let cfg = EditorConfig {
            database_url: Some("postgres://localhost/griddoc".into()),
            user_id: Some(Uuid::new_v4()),
            log_filter: "debug".into(),
            autosave: AutosaveConfig { quiet_period_ms: 1000 },
            pool: PoolConfig { max_connections: 4, ..PoolConfig::default() },
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(EditorConfig::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
database_url = "postgres://db.example.com/griddoc?sslmode=require"

[autosave]
quiet_period_ms = 500

[pool]
max_connections = 3
"#;
        let cfg: EditorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.autosave.quiet_period(), Duration::from_millis(500));
        assert_eq!(cfg.pool.max_connections, 3);
        assert_eq!(cfg.pool.min_connections, PoolConfig::default().min_connections);
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = EditorConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg, EditorConfig::default());
        assert!(EditorConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "autosave = 3").unwrap();
        let error = EditorConfig::load_or_default(&path).unwrap_err();
        assert!(error.to_string().starts_with("config parse error"));
    }

    #[test]
    fn env_overrides_file_values() {
        let user = "7f1c1a52-3f4e-4a8b-9a34-0d2a9a1f6b10";
        let mut cfg = EditorConfig::default();
        cfg.apply_env_fn(env_from_map(HashMap::from([
            ("GRIDDOC_DATABASE_URL", "postgres://localhost/other"),
            ("GRIDDOC_USER_ID", user),
            ("GRIDDOC_LOG_FILTER", "griddoc_editor=debug"),
            ("GRIDDOC_AUTOSAVE_MS", "750"),
        ])));

        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/other"));
        assert_eq!(cfg.user_id, Some(Uuid::parse_str(user).unwrap()));
        assert_eq!(cfg.log_filter, "griddoc_editor=debug");
        assert_eq!(cfg.autosave.quiet_period_ms, 750);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = EditorConfig::default();
        cfg.apply_env_fn(env_from_map(HashMap::from([
            ("GRIDDOC_USER_ID", "not-a-uuid"),
            ("GRIDDOC_AUTOSAVE_MS", "soon"),
        ])));
        assert!(cfg.user_id.is_none());
        assert_eq!(cfg.autosave.quiet_period_ms, DEFAULT_QUIET_PERIOD_MS);
    }

    #[test]
    fn quiet_period_is_clamped() {
        assert_eq!(
            AutosaveConfig { quiet_period_ms: 10 }.quiet_period(),
            Duration::from_millis(250)
        );
        assert_eq!(
            AutosaveConfig { quiet_period_ms: 600_000 }.quiet_period(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn global_dir_is_under_home() {
        let dir = global_dir().unwrap();
        assert!(dir.ends_with(".griddoc"));
    }
}
