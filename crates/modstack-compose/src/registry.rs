//! Module catalog.
//!
//! Loading is two-pass over the module directories in lexical order. The
//! first pass reads every `module.yml` and collects the name set, the second
//! parses constraints against that set, loads fragments and classifies
//! hooks. A module failing either pass is reported as
//! [`ModstackError::InvalidModule`] and left out of the catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use modstack_common::constants;
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::{Profile, is_valid_module_name, is_valid_service_name};

use crate::constraint::{self, ast::Dependency};
use crate::descriptor::{
    self, AlternativeEntry, Fragment, FragmentKind, FragmentScope, ModuleFile, ServiceEntry,
    VolumeEntry, VolumeSharing,
};
use crate::hooks::HookRegistry;
use crate::version::Version;

/// A service declared by a module.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Service name.
    pub name: String,
    /// Human-readable name.
    pub human_name: String,
    /// Free-form description.
    pub description: String,
    /// Version of the deployed software, informational.
    pub version: Option<String>,
    /// Profiles the service runs in; empty means all.
    pub profiles: Vec<Profile>,
    /// Owning module.
    pub module: String,
}

impl ServiceDescriptor {
    /// Returns whether the service runs in `profile`.
    #[must_use]
    pub fn runs_in(&self, profile: Profile) -> bool {
        self.profiles.is_empty() || self.profiles.contains(&profile)
    }
}

/// A volume declared by a module.
#[derive(Debug, Clone)]
pub struct VolumeDescriptor {
    /// Volume name.
    pub name: String,
    /// Human-readable name.
    pub human_name: String,
    /// Free-form description.
    pub description: String,
    /// Sharing class.
    pub sharing: VolumeSharing,
    /// Host path relative to the volumes root.
    pub mapping: Option<PathBuf>,
    /// Declaring module.
    pub module: String,
}

/// A substitute service offered in place of another module's service.
#[derive(Debug, Clone)]
pub struct AlternativeDescriptor {
    /// Alternative service name (names its base fragment).
    pub name: String,
    /// Human-readable name.
    pub human_name: String,
    /// Free-form description.
    pub description: String,
    /// Service it replaces.
    pub replaces: String,
    /// Offering module.
    pub module: String,
}

/// A loaded module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Module name (directory name).
    pub name: String,
    /// Human-readable name.
    pub human_name: String,
    /// Free-form description.
    pub description: String,
    /// Module version.
    pub version: Version,
    /// Module directory.
    pub root: PathBuf,
    /// Services in declaration order.
    pub services: Vec<ServiceDescriptor>,
    /// Volumes in declaration order.
    pub volumes: Vec<VolumeDescriptor>,
    /// Offered alternatives.
    pub alternatives: Vec<AlternativeDescriptor>,
    /// Constraint lines as written.
    pub constraints: Vec<String>,
    /// Parsed constraints.
    pub dependencies: Vec<Dependency>,
    /// Service fragments then volume fragments, each in file name order.
    pub fragments: Vec<Fragment>,
    /// Classified hooks.
    pub hooks: HookRegistry,
}

impl ModuleDescriptor {
    /// Looks up an owned service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Looks up a declared volume.
    #[must_use]
    pub fn volume(&self, name: &str) -> Option<&VolumeDescriptor> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Services running in `profile`, in declaration order.
    pub fn services_in(&self, profile: Profile) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter().filter(move |s| s.runs_in(profile))
    }
}

/// Collects modules and rejects duplicate names.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    modules: BTreeMap<String, ModuleDescriptor>,
    invalid: Vec<ModstackError>,
    warnings: Vec<String>,
}

impl RegistryBuilder {
    /// Adds a module.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::DuplicateModule`] if the name is taken.
    pub fn register(&mut self, module: ModuleDescriptor) -> Result<()> {
        if self.modules.contains_key(&module.name) {
            return Err(ModstackError::DuplicateModule { name: module.name });
        }
        let _ = self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    /// Records a module that failed to load.
    pub fn reject(&mut self, module: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(module, %reason, "excluding invalid module");
        self.invalid.push(ModstackError::InvalidModule {
            module: module.to_string(),
            reason,
        });
    }

    /// Records a non-fatal load warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Finishes the catalog.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            modules: self.modules,
            invalid: self.invalid,
            warnings: self.warnings,
        }
    }
}

/// The catalog of valid modules, keyed and iterated by name.
#[derive(Debug, Default)]
pub struct Registry {
    modules: BTreeMap<String, ModuleDescriptor>,
    invalid: Vec<ModstackError>,
    warnings: Vec<String>,
}

impl Registry {
    /// Loads every module under `modules_dir`.
    ///
    /// A missing directory yields an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed, and
    /// [`ModstackError::DuplicateModule`] on a repeated name.
    pub fn load(modules_dir: &Path) -> Result<Self> {
        let mut builder = RegistryBuilder::default();
        if !modules_dir.is_dir() {
            tracing::warn!(dir = %modules_dir.display(), "modules directory not found");
            return Ok(builder.build());
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(modules_dir)
            .map_err(|e| ModstackError::io(modules_dir, e))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|n| !n.to_string_lossy().starts_with('.'))
            })
            .collect();
        dirs.sort();

        let mut staged = Vec::new();
        for dir in dirs {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !is_valid_module_name(&name) {
                builder.reject(&name, "module name must match [a-z][a-z0-9_]*");
                continue;
            }
            match load_descriptor(&name, &dir) {
                Ok(module) => staged.push(module),
                Err(reason) => builder.reject(&name, reason),
            }
        }

        let mut names = BTreeSet::new();
        for module in &staged {
            if !names.insert(module.name.clone()) {
                return Err(ModstackError::DuplicateModule {
                    name: module.name.clone(),
                });
            }
        }

        for mut module in staged {
            match complete_module(&mut module, &names) {
                Ok(warnings) => {
                    for warning in warnings {
                        builder.warn(warning);
                    }
                    tracing::debug!(module = %module.name, version = %module.version, "loaded module");
                    builder.register(module)?;
                }
                Err(reason) => builder.reject(&module.name, reason),
            }
        }

        Ok(builder.build())
    }

    /// Looks a module up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    /// Looks a module up, failing with [`ModstackError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::NotFound`] for unknown or invalid modules.
    pub fn require(&self, name: &str) -> Result<&ModuleDescriptor> {
        self.get(name).ok_or_else(|| ModstackError::NotFound {
            kind: "module",
            id: name.to_string(),
        })
    }

    /// Returns whether `name` is a valid module.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Modules in lexical order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// Module names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Modules excluded during loading.
    #[must_use]
    pub fn invalid(&self) -> &[ModstackError] {
        &self.invalid
    }

    /// Non-fatal load warnings.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Module owning `service`.
    #[must_use]
    pub fn owner_of(&self, service: &str) -> Option<&ModuleDescriptor> {
        self.modules().find(|m| m.service(service).is_some())
    }

    /// Alternatives named `name`, across all modules.
    pub fn alternative(&self, name: &str) -> impl Iterator<Item = &AlternativeDescriptor> {
        self.modules()
            .flat_map(|m| m.alternatives.iter())
            .filter(move |a| a.name == name)
    }
}

fn load_descriptor(name: &str, dir: &Path) -> std::result::Result<ModuleDescriptor, String> {
    let path = dir.join(constants::MODULE_DESCRIPTOR);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let _ = descriptor::format_marker(&content)
        .map_err(|e| format!("{}: {e}", constants::MODULE_DESCRIPTOR))?;
    let file: ModuleFile = serde_yaml::from_str(&content)
        .map_err(|e| format!("{}: {e}", constants::MODULE_DESCRIPTOR))?;

    let raw_version = descriptor::scalar_to_string(&file.version)
        .ok_or_else(|| "version must be a string or a number".to_string())?;
    let version: Version = raw_version.parse().map_err(|e: ModstackError| e.to_string())?;

    let services = descriptor::ordered_entries::<ServiceEntry>("services", &file.services)?
        .into_iter()
        .map(|(service, entry)| {
            if !is_valid_service_name(&service) {
                return Err(format!("invalid service name \"{service}\""));
            }
            Ok(ServiceDescriptor {
                name: service,
                human_name: entry.name,
                description: entry.description,
                version: entry.version.as_ref().and_then(descriptor::scalar_to_string),
                profiles: entry.profiles,
                module: name.to_string(),
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    let volumes = descriptor::ordered_entries::<VolumeEntry>("volumes", &file.volumes)?
        .into_iter()
        .map(|(volume, entry)| {
            if !is_valid_service_name(&volume) {
                return Err(format!("invalid volume name \"{volume}\""));
            }
            if entry.sharing == VolumeSharing::Shared
                && !volume.ends_with(constants::SHARED_VOLUME_SUFFIX)
            {
                return Err(format!(
                    "shared volume \"{volume}\" must end in \"{}\"",
                    constants::SHARED_VOLUME_SUFFIX
                ));
            }
            if let Some(mapping) = entry.mapping.as_deref().filter(|m| !is_contained(m)) {
                return Err(format!(
                    "volume \"{volume}\" mapping {} must be a relative path inside the volumes root",
                    mapping.display()
                ));
            }
            Ok(VolumeDescriptor {
                name: volume,
                human_name: entry.name,
                description: entry.description,
                sharing: entry.sharing,
                mapping: entry.mapping,
                module: name.to_string(),
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    let alternatives =
        descriptor::ordered_entries::<AlternativeEntry>("alternatives", &file.alternatives)?
            .into_iter()
            .map(|(alternative, entry)| {
                if !is_valid_service_name(&alternative) {
                    return Err(format!("invalid alternative name \"{alternative}\""));
                }
                if !is_valid_service_name(&entry.replaces) {
                    return Err(format!(
                        "alternative \"{alternative}\" replaces invalid service \"{}\"",
                        entry.replaces
                    ));
                }
                Ok(AlternativeDescriptor {
                    name: alternative,
                    human_name: entry.name,
                    description: entry.description,
                    replaces: entry.replaces,
                    module: name.to_string(),
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;

    let mut seen = BTreeSet::new();
    for declared in services
        .iter()
        .map(|s| &s.name)
        .chain(alternatives.iter().map(|a| &a.name))
    {
        if !seen.insert(declared.as_str()) {
            return Err(format!("service \"{declared}\" declared twice"));
        }
    }

    Ok(ModuleDescriptor {
        name: name.to_string(),
        human_name: file.name,
        description: file.description,
        version,
        root: dir.to_path_buf(),
        services,
        volumes,
        alternatives,
        constraints: file.dependencies.services,
        dependencies: Vec::new(),
        fragments: Vec::new(),
        hooks: HookRegistry::default(),
    })
}

/// Second pass: constraints, fragments and hooks. Returns load warnings.
fn complete_module(
    module: &mut ModuleDescriptor,
    names: &BTreeSet<String>,
) -> std::result::Result<Vec<String>, String> {
    let mut warnings = Vec::new();

    module.dependencies =
        constraint::parse_dependencies(&module.name, &module.constraints).map_err(|e| e.to_string())?;
    for dependency in &module.dependencies {
        for target in dependency.targets() {
            if !names.contains(target) {
                warnings.push(format!(
                    "module {} references unknown module {target} in \"{}\"",
                    module.name, dependency.line
                ));
            }
        }
    }

    let mut fragments = load_fragments(module, FragmentScope::Service)?;
    fragments.extend(load_fragments(module, FragmentScope::Volume)?);

    for fragment in fragments.iter().filter(|f| f.kind == FragmentKind::Base) {
        let declared = match fragment.scope {
            FragmentScope::Service => {
                module.service(&fragment.target).is_some()
                    || module.alternatives.iter().any(|a| a.name == fragment.target)
            }
            FragmentScope::Volume => module.volume(&fragment.target).is_some(),
        };
        if !declared {
            return Err(format!(
                "fragment {} defines undeclared {} \"{}\"",
                fragment.path.display(),
                scope_label(fragment.scope),
                fragment.target
            ));
        }
    }
    let has_base = |target: &str| {
        fragments.iter().any(|f| {
            f.scope == FragmentScope::Service && f.kind == FragmentKind::Base && f.target == target
        })
    };
    for target in module
        .services
        .iter()
        .map(|s| s.name.as_str())
        .chain(module.alternatives.iter().map(|a| a.name.as_str()))
    {
        if !has_base(target) {
            return Err(format!("service \"{target}\" has no base fragment"));
        }
    }
    module.fragments = fragments;

    module.hooks = HookRegistry::scan(&module.root.join(constants::HOOKS_DIR))
        .map_err(|e| e.to_string())?;
    Ok(warnings)
}

fn load_fragments(
    module: &ModuleDescriptor,
    scope: FragmentScope,
) -> std::result::Result<Vec<Fragment>, String> {
    let dir = module.root.join(match scope {
        FragmentScope::Service => constants::SERVICES_DIR,
        FragmentScope::Volume => constants::VOLUMES_DIR,
    });
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map_err(|e| format!("cannot list {}: {e}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut fragments = Vec::new();
    for path in paths {
        if let Some(fragment) = descriptor::read_fragment(&module.name, &path, scope)? {
            fragments.push(fragment);
        }
    }
    Ok(fragments)
}

const fn scope_label(scope: FragmentScope) -> &'static str {
    match scope {
        FragmentScope::Service => "service",
        FragmentScope::Volume => "volume",
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    fn module(root: &Path, name: &str, descriptor: &str, services: &[&str]) {
        let dir = root.join(name);
        write(&dir.join("module.yml"), descriptor);
        for service in services {
            write(
                &dir.join("services").join(format!("{service}.yml")),
                "# v1.0\nimage: busybox\n",
            );
        }
    }

    #[test]
    fn loads_modules_in_lexical_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "web",
            "# v1.0\nname: Web\nversion: 1.2\nservices:\n  web-nginx:\n    name: Nginx\n    profiles: [prod]\ndependencies:\n  services:\n    - REQUIRES db >= 1.0\n",
            &["web-nginx"],
        );
        module(
            dir.path(),
            "db",
            "# v1.0\nname: Database\nversion: \"2.0beta\"\nservices:\n  db-postgres: {}\nvolumes:\n  db-data:\n    type: exposed\n    mapping: db/data\n",
            &["db-postgres"],
        );

        let registry = Registry::load(dir.path()).expect("load");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["db", "web"]);
        assert!(registry.invalid().is_empty());
        assert!(registry.warnings().is_empty());

        let web = registry.get("web").expect("web");
        assert_eq!(web.human_name, "Web");
        assert_eq!(web.version, Version::new(1, 2));
        assert_eq!(web.dependencies.len(), 1);
        assert!(!web.services[0].runs_in(Profile::Dev));

        let db = registry.get("db").expect("db");
        assert_eq!(db.volumes[0].sharing, VolumeSharing::Exposed);
        assert_eq!(registry.owner_of("db-postgres").map(|m| m.name.as_str()), Some("db"));
    }

    #[test]
    fn invalid_module_is_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "good",
            "# v1.0\nname: Good\nversion: 1\n",
            &[],
        );
        module(
            dir.path(),
            "bad",
            "# v1.0\nname: Bad\nversion: 1\ndependencies:\n  services:\n    - \"good >=\"\n",
            &[],
        );
        module(dir.path(), "nomarker", "name: X\nversion: 1\n", &[]);

        let registry = Registry::load(dir.path()).expect("load");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(registry.invalid().len(), 2);
        assert!(registry.invalid().iter().all(|e| !e.is_fatal()));
    }

    #[test]
    fn non_ascii_constraint_only_invalidates_its_module() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(dir.path(), "good", "# v1.0\nname: Good\nversion: 1\n", &[]);
        module(
            dir.path(),
            "bad",
            "# v1.0\nname: Bad\nversion: 1\ndependencies:\n  services:\n    - \"café ~ ééééééééééééé\"\n",
            &[],
        );

        let registry = Registry::load(dir.path()).expect("load");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(registry.invalid().len(), 1);
        assert!(registry.invalid()[0].to_string().contains("bad"));
    }

    #[test]
    fn unknown_target_is_a_warning() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "web",
            "# v1.0\nname: Web\nversion: 1\ndependencies:\n  services:\n    - AFTER ghost\n",
            &[],
        );
        let registry = Registry::load(dir.path()).expect("load");
        assert!(registry.contains("web"));
        assert_eq!(registry.warnings().len(), 1);
        assert!(registry.warnings()[0].contains("ghost"));
    }

    #[test]
    fn service_without_base_fragment_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "web",
            "# v1.0\nname: Web\nversion: 1\nservices:\n  web-app: {}\n",
            &[],
        );
        let registry = Registry::load(dir.path()).expect("load");
        assert!(!registry.contains("web"));
    }

    #[test]
    fn undeclared_base_fragment_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "web",
            "# v1.0\nname: Web\nversion: 1\n",
            &["web-stray"],
        );
        let registry = Registry::load(dir.path()).expect("load");
        assert!(!registry.contains("web"));
        assert!(registry.invalid()[0].to_string().contains("web-stray"));
    }

    #[test]
    fn shared_volume_suffix_is_enforced() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "files",
            "# v1.0\nname: Files\nversion: 1\nvolumes:\n  files-data:\n    type: shared\n",
            &[],
        );
        let registry = Registry::load(dir.path()).expect("load");
        assert!(!registry.contains("files"));
    }

    #[test]
    fn escaping_mapping_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(
            dir.path(),
            "files",
            "# v1.0\nname: Files\nversion: 1\nvolumes:\n  files-data:\n    type: exposed\n    mapping: ../etc\n",
            &[],
        );
        let registry = Registry::load(dir.path()).expect("load");
        assert!(!registry.contains("files"));
    }

    #[test]
    fn uppercase_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(dir.path(), "Web", "# v1.0\nname: Web\nversion: 1\n", &[]);
        let registry = Registry::load(dir.path()).expect("load");
        assert_eq!(registry.names().count(), 0);
        assert_eq!(registry.invalid().len(), 1);
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        module(dir.path(), "web", "# v1.0\nname: Web\nversion: 1\n", &[]);
        let registry = Registry::load(dir.path()).expect("load");
        let web = registry.get("web").expect("web").clone();

        let mut builder = RegistryBuilder::default();
        builder.register(web.clone()).expect("first");
        let err = builder.register(web).unwrap_err();
        assert!(matches!(err, ModstackError::DuplicateModule { name } if name == "web"));
    }

    #[test]
    fn missing_modules_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::load(&dir.path().join("modules")).expect("load");
        assert_eq!(registry.modules().count(), 0);
    }
}
