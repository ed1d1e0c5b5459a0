//! On-disk formats: the `module.yml` descriptor and fragment files.
//!
//! Both start with a format marker line (`# v1.0`). Fragment file names
//! encode their target and kind: `<name>.yml`, `<name>.merge.yml`,
//! `<name>.override.yml`.

use std::path::{Path, PathBuf};

use modstack_common::constants;
use modstack_common::types::Profile;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

/// Raw `module.yml` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleFile {
    /// Human-readable module name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Module version (`major[.minor][stability]`).
    pub version: Value,
    /// Owned services, in declaration order.
    #[serde(default)]
    pub services: Mapping,
    /// Declared volumes, in declaration order.
    #[serde(default)]
    pub volumes: Mapping,
    /// Offered alternative services.
    #[serde(default)]
    pub alternatives: Mapping,
    /// Dependency declarations.
    #[serde(default)]
    pub dependencies: DependenciesEntry,
}

/// The `dependencies` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependenciesEntry {
    /// One constraint line per entry.
    #[serde(default)]
    pub services: Vec<String>,
}

/// One entry of the `services` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEntry {
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Version of the deployed software, informational.
    #[serde(default)]
    pub version: Option<Value>,
    /// Profiles the service runs in; empty means all.
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Sharing class of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeSharing {
    /// Shared between modules; name must end in `-volume`.
    Shared,
    /// Mapped on the host under the volumes root.
    Exposed,
    /// Used by the owning module only.
    Private,
}

/// One entry of the `volumes` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeEntry {
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Sharing class.
    #[serde(rename = "type")]
    pub sharing: VolumeSharing,
    /// Host path relative to the volumes root.
    #[serde(default)]
    pub mapping: Option<PathBuf>,
}

/// One entry of the `alternatives` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternativeEntry {
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Service this alternative stands in for.
    pub replaces: String,
}

/// Renders a scalar YAML version (`1.2` or `"1.2"`) as a string.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Deserializes the values of an ordered mapping, keeping declaration order.
///
/// # Errors
///
/// Returns a message naming the first offending key.
pub fn ordered_entries<T: DeserializeOwned>(
    section: &str,
    mapping: &Mapping,
) -> Result<Vec<(String, T)>, String> {
    mapping
        .iter()
        .map(|(key, value)| {
            let key = key
                .as_str()
                .ok_or_else(|| format!("{section}: keys must be strings, got {key:?}"))?;
            let value = if value.is_null() {
                Value::Mapping(Mapping::new())
            } else {
                value.clone()
            };
            let entry = serde_yaml::from_value(value).map_err(|e| format!("{section}.{key}: {e}"))?;
            Ok((key.to_string(), entry))
        })
        .collect()
}

/// Kind of a fragment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Defines the service or volume.
    Base,
    /// Recursively merged into the base.
    Merge,
    /// Shallowly overrides existing keys of the base.
    Override,
}

/// Whether a fragment targets a service or a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentScope {
    /// Found under `services/`.
    Service,
    /// Found under `volumes/`.
    Volume,
}

/// A parsed fragment file.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Module the file belongs to.
    pub module: String,
    /// File path.
    pub path: PathBuf,
    /// Format marker, e.g. `v1.0`.
    pub format: String,
    /// Fragment kind.
    pub kind: FragmentKind,
    /// Service or volume fragment.
    pub scope: FragmentScope,
    /// Target service or volume name.
    pub target: String,
    /// YAML payload (always a mapping).
    pub payload: Value,
}

/// Splits a fragment file name into target name and kind.
///
/// Returns `None` for files that are not YAML.
#[must_use]
pub fn classify_fragment(file_name: &str) -> Option<(String, FragmentKind)> {
    let stem = file_name
        .strip_suffix(".yml")
        .or_else(|| file_name.strip_suffix(".yaml"))?;
    if let Some(target) = stem.strip_suffix(".merge") {
        Some((target.to_string(), FragmentKind::Merge))
    } else if let Some(target) = stem.strip_suffix(".override") {
        Some((target.to_string(), FragmentKind::Override))
    } else {
        Some((stem.to_string(), FragmentKind::Base))
    }
}

/// Checks the leading `# vMAJOR.MINOR` line and returns the marker.
///
/// # Errors
///
/// Returns a message when the marker is missing or of an unsupported major.
pub fn format_marker(content: &str) -> Result<String, String> {
    let first = content.lines().next().unwrap_or_default().trim();
    let marker = first
        .strip_prefix('#')
        .map(str::trim)
        .filter(|m| m.starts_with('v'))
        .ok_or_else(|| "missing format marker line (\"# v1.0\")".to_string())?;
    let (major, minor) = marker[1..]
        .split_once('.')
        .ok_or_else(|| format!("malformed format marker \"{marker}\""))?;
    let major: u32 = major
        .parse()
        .map_err(|_| format!("malformed format marker \"{marker}\""))?;
    if minor.is_empty() || !minor.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("malformed format marker \"{marker}\""));
    }
    if major != constants::SUPPORTED_FORMAT_MAJOR {
        return Err(format!("unsupported format version \"{marker}\""));
    }
    Ok(marker.to_string())
}

/// Reads and parses one fragment file.
///
/// A null body becomes an empty mapping; any other non-mapping body is
/// rejected.
///
/// # Errors
///
/// Returns a message when the file cannot be read, lacks its marker, or is
/// not a YAML mapping.
pub fn read_fragment(
    module: &str,
    path: &Path,
    scope: FragmentScope,
) -> Result<Option<Fragment>, String> {
    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let Some((target, kind)) = classify_fragment(&file_name) else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let format = format_marker(&content).map_err(|e| format!("{file_name}: {e}"))?;
    let payload: Value =
        serde_yaml::from_str(&content).map_err(|e| format!("{file_name}: {e}"))?;
    let payload = match payload {
        Value::Null => Value::Mapping(Mapping::new()),
        Value::Mapping(_) => payload,
        _ => return Err(format!("{file_name}: fragment must be a YAML mapping")),
    };
    Ok(Some(Fragment {
        module: module.to_string(),
        path: path.to_path_buf(),
        format,
        kind,
        scope,
        target,
        payload,
    }))
}
