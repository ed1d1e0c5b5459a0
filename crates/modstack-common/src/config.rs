//! Project configuration model loaded from `modstack.yml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{ModstackError, Result};
use crate::types::Profile;

/// Root configuration for a modstack deployment.
///
/// Relative paths are resolved against the project root by
/// [`crate::context::Context::from_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding one sub-directory per module.
    pub modules_dir: PathBuf,
    /// Root for host-mapped volume data.
    pub volumes_dir: PathBuf,
    /// Directory for the state index, lock file and hook logs.
    pub state_dir: PathBuf,
    /// Path of the composed deployment descriptor.
    pub compose_file: PathBuf,
    /// Compose project name (defaults to the project directory name).
    pub project_name: Option<String>,
    /// Active execution profile.
    pub profile: Profile,
    /// Whether exposed volumes stay unmapped on the host.
    pub no_exposed_volumes: bool,
    /// Readiness polling budget.
    pub readiness: ReadinessConfig,
    /// Container runtime settings.
    pub runtime: RuntimeConfig,
    /// Selected alternatives: replaced service → alternative service.
    pub alternatives: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from(constants::DEFAULT_MODULES_DIR),
            volumes_dir: PathBuf::from(constants::DEFAULT_VOLUMES_DIR),
            state_dir: PathBuf::from(constants::DEFAULT_STATE_DIR),
            compose_file: PathBuf::from(constants::DEFAULT_COMPOSE_FILE),
            project_name: None,
            profile: Profile::Dev,
            no_exposed_volumes: false,
            readiness: ReadinessConfig::default(),
            runtime: RuntimeConfig::default(),
            alternatives: BTreeMap::new(),
        }
    }
}

/// Readiness polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Delay between two probes, in milliseconds.
    pub interval_ms: u64,
    /// Maximum number of probes.
    pub max_attempts: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: constants::DEFAULT_READINESS_INTERVAL_MS,
            max_attempts: constants::DEFAULT_READINESS_ATTEMPTS,
        }
    }
}

/// Container runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Runtime binary name or path.
    pub binary: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: constants::DEFAULT_RUNTIME_BINARY.to_string(),
        }
    }
}

impl Config {
    /// Loads `modstack.yml` from `root`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(constants::CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| ModstackError::io(&path, e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ModstackError::Yaml { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.profile, Profile::Dev);
        assert_eq!(config.readiness.max_attempts, 300);
        assert_eq!(config.runtime.binary, "docker");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("modstack.yml"),
            "profile: prod\nreadiness:\n  interval_ms: 10\nalternatives:\n  web-server: web-caddy\n",
        )
        .expect("write");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.profile, Profile::Prod);
        assert_eq!(config.readiness.interval_ms, 10);
        assert_eq!(config.readiness.max_attempts, 300);
        assert_eq!(
            config.alternatives.get("web-server").map(String::as_str),
            Some("web-caddy")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("modstack.yml"), "colour: blue\n").expect("write");
        assert!(Config::load(dir.path()).is_err());
    }
}
