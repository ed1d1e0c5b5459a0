//! Resolved runtime context threaded through every component.
//!
//! Built once at process start from [`Config`] and the command line, then
//! passed by reference to the registry, resolver, compositor, dispatcher
//! and controller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::constants;
use crate::types::Profile;

/// Resolved paths, flags and budgets for one orchestration run.
#[derive(Debug, Clone)]
pub struct Context {
    /// Project root.
    pub root: PathBuf,
    /// Directory holding one sub-directory per module.
    pub modules_dir: PathBuf,
    /// Root for host-mapped volume data.
    pub volumes_dir: PathBuf,
    /// Directory for the state index, lock file and hook logs.
    pub state_dir: PathBuf,
    /// Path of the composed deployment descriptor.
    pub compose_file: PathBuf,
    /// Compose project name.
    pub project_name: String,
    /// Active execution profile.
    pub profile: Profile,
    /// Whether exposed volumes stay unmapped on the host.
    pub no_exposed_volumes: bool,
    /// Delay between two readiness probes.
    pub readiness_interval: Duration,
    /// Maximum number of readiness probes.
    pub readiness_attempts: u32,
    /// Container runtime binary name or path.
    pub runtime_binary: String,
    /// Selected alternatives: replaced service → alternative service.
    pub alternatives: BTreeMap<String, String>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Resolves `config` against the project `root`.
    #[must_use]
    pub fn from_config(root: &Path, config: Config) -> Self {
        let project_name = config.project_name.unwrap_or_else(|| {
            root.file_name().map_or_else(
                || constants::APP_NAME.to_string(),
                |n| sanitize_project(&n.to_string_lossy()),
            )
        });
        Self {
            root: root.to_path_buf(),
            modules_dir: root.join(config.modules_dir),
            volumes_dir: root.join(config.volumes_dir),
            state_dir: root.join(config.state_dir),
            compose_file: root.join(config.compose_file),
            project_name,
            profile: config.profile,
            no_exposed_volumes: config.no_exposed_volumes,
            readiness_interval: Duration::from_millis(config.readiness.interval_ms),
            readiness_attempts: config.readiness.max_attempts,
            runtime_binary: config.runtime.binary,
            alternatives: config.alternatives,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the shared cancellation flag, e.g. for a Ctrl+C handler.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Returns whether the operator interrupted the run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Path of the persisted state index.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(constants::STATE_FILE)
    }

    /// Path of the lifecycle lock file.
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join(constants::LOCK_FILE)
    }

    /// Directory of per-module hook logs.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join(constants::LOGS_DIR)
    }

    /// Root directory of a module.
    #[must_use]
    pub fn module_root(&self, module: &str) -> PathBuf {
        self.modules_dir.join(module)
    }

    /// Environment handed to every hook of `module`.
    #[must_use]
    pub fn hook_env(&self, module: &str) -> Vec<(String, String)> {
        vec![
            (
                constants::ENV_MODULE_ROOT.to_string(),
                display_path(&self.module_root(module)),
            ),
            (
                constants::ENV_VOLUMES_ROOT.to_string(),
                display_path(&self.volumes_dir),
            ),
            (
                constants::ENV_NO_EXPOSED_VOLUMES.to_string(),
                if self.no_exposed_volumes { "1" } else { "0" }.to_string(),
            ),
            (
                constants::ENV_PROFILE.to_string(),
                self.profile.as_str().to_string(),
            ),
        ]
    }
}

/// Renders a path without a trailing slash.
#[must_use]
pub fn display_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn sanitize_project(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        constants::APP_NAME.to_string()
    } else {
        cleaned
    }
}
