//! Persistent state management.
//!
//! Maintains a local JSON index of installed modules and their lifecycle
//! phase. Physical presence under the modules directory is tracked by the
//! registry; this index records what the operator did with each module.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::LifecycleState;
use serde::{Deserialize, Serialize};

/// Persisted lifecycle phase of an installed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Installed, services not deployed.
    Installed,
    /// Services part of the deployment descriptor.
    Enabled,
    /// Removal in progress; a crash leaves this phase behind.
    Uninstalling,
}

/// Persistent record of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Installed version.
    pub version: String,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

/// The state index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateIndex {
    /// Records keyed by module name.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleRecord>,
}

impl StateIndex {
    /// Lifecycle state of `module`.
    #[must_use]
    pub fn lifecycle(&self, module: &str) -> LifecycleState {
        match self.modules.get(module).map(|r| r.phase) {
            None => LifecycleState::Absent,
            Some(Phase::Installed) => LifecycleState::InstalledDisabled,
            Some(Phase::Enabled) => LifecycleState::Enabled,
            Some(Phase::Uninstalling) => LifecycleState::Uninstalling,
        }
    }

    /// Installed version of `module`.
    #[must_use]
    pub fn version(&self, module: &str) -> Option<&str> {
        self.modules.get(module).map(|r| r.version.as_str())
    }

    /// Enabled modules.
    #[must_use]
    pub fn enabled(&self) -> BTreeSet<String> {
        self.with_phase(|p| p == Phase::Enabled)
    }

    /// Installed modules, enabled or not.
    #[must_use]
    pub fn installed(&self) -> BTreeSet<String> {
        self.with_phase(|p| matches!(p, Phase::Installed | Phase::Enabled))
    }

    fn with_phase(&self, keep: impl Fn(Phase) -> bool) -> BTreeSet<String> {
        self.modules
            .iter()
            .filter(|(_, r)| keep(r.phase))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Records `module` at `version` as installed and disabled.
    pub fn mark_installed(&mut self, module: &str, version: &str) {
        self.set(module, version.to_string(), Phase::Installed);
    }

    /// Records `module` as enabled.
    pub fn mark_enabled(&mut self, module: &str) {
        self.set_phase(module, Phase::Enabled);
    }

    /// Records `module` as disabled.
    pub fn mark_disabled(&mut self, module: &str) {
        self.set_phase(module, Phase::Installed);
    }

    /// Records that `module` is being removed.
    pub fn mark_uninstalling(&mut self, module: &str) {
        self.set_phase(module, Phase::Uninstalling);
    }

    /// Records a new installed version, keeping the phase.
    pub fn set_version(&mut self, module: &str, version: &str) {
        if let Some(record) = self.modules.get_mut(module) {
            record.version = version.to_string();
            record.updated_at = Utc::now();
        }
    }

    /// Forgets `module`.
    pub fn remove(&mut self, module: &str) {
        let _ = self.modules.remove(module);
    }

    fn set_phase(&mut self, module: &str, phase: Phase) {
        let version = self
            .modules
            .get(module)
            .map(|r| r.version.clone())
            .unwrap_or_default();
        self.set(module, version, phase);
    }

    fn set(&mut self, module: &str, version: String, phase: Phase) {
        let _ = self.modules.insert(
            module.to_string(),
            ModuleRecord {
                version,
                phase,
                updated_at: Utc::now(),
            },
        );
    }
}

/// Loads the state index from disk. A missing file is an empty index.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_state(path: &Path) -> Result<StateIndex> {
    tracing::debug!(path = %path.display(), "loading state index");
    if !path.exists() {
        return Ok(StateIndex::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ModstackError::io(path, e))?;
    if content.trim().is_empty() {
        return Ok(StateIndex::default());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Persists the state index to disk atomically.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_state(path: &Path, state: &StateIndex) -> Result<()> {
    tracing::debug!(path = %path.display(), modules = state.modules.len(), "saving state index");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ModstackError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| ModstackError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| ModstackError::io(path, e))?;
    Ok(())
}
