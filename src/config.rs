use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

use crate::error::Result;

const CONFIG_FILE_NAME: &str = ".stratus.json";
const ENV_PREFIX: &str = "STRATUS";
const DATABASE_FILE_NAME: &str = "stratus.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    pub project_root: PathBuf,
    /// Directory holding worker worktrees. Relative paths resolve against `project_root`.
    pub worktree_dir: PathBuf,
    pub log_level: String,
    /// Enables the rolling file log when set.
    pub log_dir: Option<PathBuf>,
    pub default_base_branch: String,
    pub stale_after_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let project_root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            database_path: "./.stratus/data/stratus.db".to_string(),
            project_root,
            worktree_dir: PathBuf::from(".stratus/worktrees"),
            log_level: "info".to_string(),
            log_dir: None,
            default_base_branch: "main".to_string(),
            stale_after_secs: 300,
        }
    }
}

impl Config {
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path)
    }

    pub fn worktree_root(&self) -> PathBuf {
        if self.worktree_dir.is_absolute() {
            self.worktree_dir.clone()
        } else {
            self.project_root.join(&self.worktree_dir)
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Defaults overlaid with the `STRATUS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::build(None, Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads `.stratus.json` from `dir` if present, then applies the environment on top.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::build(
            Some(&dir.join(CONFIG_FILE_NAME)),
            Environment::with_prefix(ENV_PREFIX),
        )
    }

    /// Layers the optional file and the environment over the struct defaults.
    /// `STRATUS_DATA_DIR` places the database inside that directory unless a
    /// `database_path` was given explicitly.
    fn build(file: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Json)
                    .required(false),
            );
        }
        let settings = builder.add_source(environment).build()?;

        let mut config: Config = settings.clone().try_deserialize()?;
        if settings.get_string("database_path").is_err() {
            if let Ok(dir) = settings.get_string("data_dir") {
                config.database_path = Path::new(&dir)
                    .join(DATABASE_FILE_NAME)
                    .to_string_lossy()
                    .into_owned();
            }
        }
        if config.stale_after_secs == 0 {
            warn!("Ignoring stale_after_secs = 0, using the default");
            config.stale_after_secs = Self::default().stale_after_secs;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_database_url_and_worktree_root() {
        let config = Config {
            database_path: "/tmp/x/stratus.db".to_string(),
            project_root: PathBuf::from("/repo"),
            ..Config::default()
        };
        assert_eq!(config.database_url(), "sqlite:/tmp/x/stratus.db?mode=rwc");
        assert_eq!(config.worktree_root(), PathBuf::from("/repo/.stratus/worktrees"));

        let absolute = Config {
            worktree_dir: PathBuf::from("/elsewhere"),
            ..config
        };
        assert_eq!(absolute.worktree_root(), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"default_base_branch": "develop", "stale_after_secs": 60}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.default_base_branch, "develop");
        assert_eq!(config.stale_after(), Duration::from_secs(60));
        assert_eq!(config.worktree_dir, PathBuf::from(".stratus/worktrees"));
    }

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let source: ::config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&file, r#"{"log_level": "debug", "stale_after_secs": 60}"#).unwrap();

        let config = Config::build(
            Some(&file),
            environment(&[
                ("STRATUS_LOG_LEVEL", "warn"),
                ("STRATUS_STALE_AFTER_SECS", "15"),
                ("STRATUS_LOG_DIR", "/var/log/stratus"),
            ]),
        )
        .unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.stale_after(), Duration::from_secs(15));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/stratus")));
    }

    #[test]
    fn test_data_dir_only_applies_without_explicit_path() {
        let config =
            Config::build(None, environment(&[("STRATUS_DATA_DIR", "/srv/data")])).unwrap();
        assert_eq!(
            PathBuf::from(&config.database_path),
            Path::new("/srv/data").join("stratus.db")
        );

        let config = Config::build(
            None,
            environment(&[
                ("STRATUS_DATA_DIR", "/srv/data"),
                ("STRATUS_DATABASE_PATH", "/tmp/explicit.db"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database_path, "/tmp/explicit.db");
    }

    #[test]
    fn test_zero_stale_threshold_falls_back_to_default() {
        let config =
            Config::build(None, environment(&[("STRATUS_STALE_AFTER_SECS", "0")])).unwrap();
        assert_eq!(config.stale_after_secs, Config::default().stale_after_secs);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::build(
            Some(&dir.path().join(CONFIG_FILE_NAME)),
            environment(&[]),
        )
        .unwrap();
        assert_eq!(config.default_base_branch, "main");
    }
}
