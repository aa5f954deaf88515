//! Defaults loaded from TOML files.
//!
//! Two optional layers are read, later ones overriding earlier ones:
//! 1. Global defaults (`<config_dir>/rocker/config.toml`)
//! 2. Project defaults (`.rocker.toml` in the working directory)
//!
//! Command-line values override both. A file looks like:
//!
//! ```toml
//! image = "ubuntu:22.04"
//!
//! [args]
//! user = true
//! network = "host"
//! env = [["LANG=C.UTF-8"]]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rocker_extensions::CliArgs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name of the project-level defaults file.
pub const PROJECT_CONFIG_FILE: &str = ".rocker.toml";

/// Contents of one defaults file, or of several merged together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RockerConfig {
    /// Base image used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Option values keyed like the command-line flags.
    #[serde(default)]
    pub args: CliArgs,
}

impl RockerConfig {
    /// Parse a defaults file; keys in `[args]` may use hyphens or underscores.
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.args = config
            .args
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Ok(config)
    }

    /// Load and parse one file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: &RockerConfig) {
        if other.image.is_some() {
            self.image = other.image.clone();
        }
        self.args.merge(&other.args);
    }
}

/// Finds and merges the defaults files.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    /// Directory searched for the project file.
    root: PathBuf,

    /// Override for the global config directory (used for testing).
    /// When `None`, `dirs::config_dir()` is used.
    global_config_dir_override: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            global_config_dir_override: None,
        }
    }

    /// Create a resolver with a custom global config directory.
    pub fn with_global_config_dir(root: impl Into<PathBuf>, global_config_dir: PathBuf) -> Self {
        Self {
            root: root.into(),
            global_config_dir_override: Some(global_config_dir),
        }
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join("rocker"))
    }

    /// Path of the global defaults file, whether or not it exists.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir().map(|d| d.join("config.toml"))
    }

    /// Path of the project defaults file, whether or not it exists.
    pub fn project_config_path(&self) -> PathBuf {
        self.root.join(PROJECT_CONFIG_FILE)
    }

    /// Merge every defaults file that exists. Missing files are skipped;
    /// an unreadable or invalid file is an error.
    pub fn resolve(&self) -> Result<RockerConfig> {
        let mut config = RockerConfig::default();

        let layers = self
            .global_config_path()
            .into_iter()
            .chain(std::iter::once(self.project_config_path()));
        for path in layers {
            if path.is_file() {
                tracing::debug!(?path, "Loading defaults");
                config.merge(&RockerConfig::load(&path)?);
            } else {
                tracing::debug!(?path, "No defaults file, skipping");
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn resolver(temp: &TempDir) -> ConfigResolver {
        ConfigResolver::with_global_config_dir(temp.path().join("project"), temp.path().join("global"))
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = resolver(&temp).resolve().unwrap();
        assert_eq!(config, RockerConfig::default());
    }

    #[test]
    fn test_project_overrides_global() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("global")).unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        fs::write(
            temp.path().join("global/config.toml"),
            "image = \"ubuntu:20.04\"\n[args]\nnetwork = \"bridge\"\nuser = true\n",
        )
        .unwrap();
        fs::write(
            temp.path().join("project/.rocker.toml"),
            "[args]\nnetwork = \"host\"\nshm-size = \"2g\"\nenv = [[\"A=1\", \"B=2\"], [\"C=3\"]]\n",
        )
        .unwrap();

        let config = resolver(&temp).resolve().unwrap();
        assert_eq!(config.image.as_deref(), Some("ubuntu:20.04"));
        assert_eq!(config.args.string("network"), Some("host"));
        assert!(config.args.flag("user"));
        assert_eq!(config.args.string("shm_size"), Some("2g"));
        assert_eq!(config.args.list("env"), vec!["A=1", "B=2", "C=3"]);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        fs::write(temp.path().join("project/.rocker.toml"), "args = [").unwrap();

        let err = resolver(&temp).resolve().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
