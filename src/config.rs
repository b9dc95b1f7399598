//! User settings from `config.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Settings read from the config directory.
///
/// ```toml
/// jobs = 8
/// assume_yes = false
/// manifests = ["~/infra/base.toml", "~/infra/desktop.toml"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Width of concurrent fan-out during load
    pub jobs: usize,
    /// Apply without asking for confirmation
    pub assume_yes: bool,
    /// Manifests used when none are given on the command line
    pub manifests: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: declarative::DEFAULT_JOBS,
            assume_yes: false,
            manifests: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, or defaults if there is no file.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in settings: {}", path.display()))?;

        if settings.jobs == 0 {
            anyhow::bail!("{}: jobs must be at least 1", path.display());
        }
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Manifest paths, tilde and variables expanded.
    pub fn manifest_paths(&self) -> Vec<PathBuf> {
        self.manifests.iter().map(|m| paths::expand(m)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.jobs, 4);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "assume_yes = true\nmanifests = [\"/srv/base.toml\"]\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.assume_yes);
        assert_eq!(settings.jobs, 4);
        assert_eq!(settings.manifest_paths(), vec![PathBuf::from("/srv/base.toml")]);
    }

    #[test]
    fn test_rejects_unknown_keys_and_zero_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "job = 2\n").unwrap();
        assert!(Settings::load_from(&path).is_err());

        fs::write(&path, "jobs = 0\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("jobs must be at least 1"));
    }
}
