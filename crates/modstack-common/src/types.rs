//! Domain primitive types used across the modstack workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModstackError;

/// Execution profile selecting which services and constraints apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Local development.
    Dev,
    /// Pre-production.
    Staging,
    /// Production.
    Prod,
    /// Backend-only deployment.
    Backend,
    /// Deployment without network egress.
    Offline,
}

impl Profile {
    /// Every profile, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Dev,
        Self::Staging,
        Self::Prod,
        Self::Backend,
        Self::Offline,
    ];

    /// Returns the lowercase profile name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
            Self::Backend => "backend",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ModstackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ModstackError::Config {
                message: format!("unknown profile \"{s}\""),
            })
    }
}

/// Live state of a service container, as reported by the `state` probe.
///
/// [`ContainerStatus::Unknown`] means the probe could not tell; it is never
/// treated as "not running".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container exists but was never started.
    Created,
    /// Container is running.
    Running,
    /// Container is being restarted.
    Restarting,
    /// Container is paused.
    Paused,
    /// Container could not be stopped or removed.
    Dead,
    /// Container has exited.
    Exited,
    /// The probe failed or returned nothing.
    Unknown,
}

impl ContainerStatus {
    /// Parses one line of probe output. Anything outside the fixed
    /// vocabulary, including the empty string, is [`ContainerStatus::Unknown`].
    #[must_use]
    pub fn from_probe(output: &str) -> Self {
        match output.trim() {
            "created" => Self::Created,
            "running" => Self::Running,
            "restarting" => Self::Restarting,
            "paused" => Self::Paused,
            "dead" => Self::Dead,
            "exited" => Self::Exited,
            _ => Self::Unknown,
        }
    }

    /// Returns whether the container is between two stable states.
    #[must_use]
    pub const fn is_transitioning(self) -> bool {
        matches!(self, Self::Created | Self::Restarting)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Paused => "paused",
            Self::Dead => "dead",
            Self::Exited => "exited",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// Not installed.
    Absent,
    /// Installed but not part of the deployment.
    InstalledDisabled,
    /// Installed and part of the deployment.
    Enabled,
    /// An uninstall started and has not completed.
    Uninstalling,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::InstalledDisabled => "installed-disabled",
            Self::Enabled => "enabled",
            Self::Uninstalling => "uninstalling",
        };
        f.write_str(s)
    }
}

/// Returns whether `name` matches `[a-z][a-z0-9_]*`.
#[must_use]
pub fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Returns whether `name` matches `[a-z][a-z0-9-]*`.
#[must_use]
pub fn is_valid_service_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_roundtrips_through_str() {
        for p in Profile::ALL {
            assert_eq!(p.as_str().parse::<Profile>().unwrap(), p);
        }
        assert!("qa".parse::<Profile>().is_err());
    }

    #[test]
    fn empty_probe_output_is_unknown() {
        assert_eq!(ContainerStatus::from_probe(""), ContainerStatus::Unknown);
        assert_eq!(ContainerStatus::from_probe("  \n"), ContainerStatus::Unknown);
        assert_eq!(ContainerStatus::from_probe("bogus"), ContainerStatus::Unknown);
    }

    #[test]
    fn probe_vocabulary_is_recognised() {
        assert_eq!(ContainerStatus::from_probe("running\n"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::from_probe("exited"), ContainerStatus::Exited);
        assert!(ContainerStatus::from_probe("restarting").is_transitioning());
        assert!(!ContainerStatus::Running.is_transitioning());
    }

    #[test]
    fn module_name_pattern() {
        assert!(is_valid_module_name("web"));
        assert!(is_valid_module_name("web_admin2"));
        assert!(!is_valid_module_name("Web"));
        assert!(!is_valid_module_name("2web"));
        assert!(!is_valid_module_name("web-admin"));
        assert!(!is_valid_module_name(""));
    }

    #[test]
    fn service_name_pattern() {
        assert!(is_valid_service_name("web-nginx"));
        assert!(!is_valid_service_name("web_nginx"));
        assert!(!is_valid_service_name("-web"));
    }
}
