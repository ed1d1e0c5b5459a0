//! Deployment descriptor composition.
//!
//! Every resolved service starts from its single base fragment (or the
//! configured alternative's fragment) and receives the `.merge` and
//! `.override` fragments of the active modules in discovery order: modules
//! lexically, then file names lexically.

use std::collections::BTreeMap;
use std::path::Path;

use modstack_common::context::{Context, display_path};
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::Profile;
use serde_yaml::{Mapping, Value};

use crate::descriptor::{Fragment, FragmentKind, FragmentScope, VolumeSharing};
use crate::registry::{ModuleDescriptor, Registry, VolumeDescriptor};
use crate::resolver::Resolution;

/// The composed multi-container descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentDescriptor {
    /// Services in startup order.
    pub services: Vec<(String, Value)>,
    /// Volumes in module then declaration order.
    pub volumes: Vec<(String, Value)>,
    /// Services of the active modules by the profile they run in.
    pub profiles: BTreeMap<Profile, Vec<String>>,
}

impl DeploymentDescriptor {
    /// Composed definition of `service`.
    #[must_use]
    pub fn service(&self, service: &str) -> Option<&Value> {
        self.services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, value)| value)
    }

    /// Service names in startup order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(name, _)| name.as_str())
    }

    /// Renders the descriptor as YAML. Identical descriptors render to
    /// identical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::Composition`] if serialization fails.
    pub fn render(&self) -> Result<String> {
        let section = |entries: &[(String, Value)]| {
            entries
                .iter()
                .map(|(name, value)| (Value::from(name.as_str()), value.clone()))
                .collect::<Mapping>()
        };
        let mut root = Mapping::new();
        let _ = root.insert("services".into(), Value::Mapping(section(&self.services)));
        let _ = root.insert("volumes".into(), Value::Mapping(section(&self.volumes)));
        serde_yaml::to_string(&Value::Mapping(root)).map_err(|e| ModstackError::Composition {
            message: format!("cannot render descriptor: {e}"),
        })
    }

    /// Writes the rendered descriptor to `path` through a temporary file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written or renamed.
    pub fn write(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ModstackError::io(parent, e))?;
        }
        let tmp = path.with_extension("yml.tmp");
        std::fs::write(&tmp, rendered).map_err(|e| ModstackError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| ModstackError::io(path, e))?;
        tracing::info!(path = %path.display(), services = self.services.len(), "wrote deployment descriptor");
        Ok(())
    }
}

/// Builds deployment descriptors from resolved module sets.
#[derive(Debug, Clone, Copy)]
pub struct Compositor<'a> {
    registry: &'a Registry,
    ctx: &'a Context,
}

impl<'a> Compositor<'a> {
    /// Creates a compositor.
    #[must_use]
    pub const fn new(registry: &'a Registry, ctx: &'a Context) -> Self {
        Self { registry, ctx }
    }

    /// Composes the descriptor for `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::Composition`] on a missing or duplicate base
    /// fragment, a conflicting volume declaration, or an alternative that no
    /// active module offers.
    pub fn compose(&self, resolution: &Resolution) -> Result<DeploymentDescriptor> {
        let modules: Vec<&ModuleDescriptor> = self
            .registry
            .modules()
            .filter(|m| resolution.contains(&m.name))
            .collect();
        let fragments: Vec<&Fragment> = modules.iter().flat_map(|m| m.fragments.iter()).collect();

        let mut services = Vec::with_capacity(resolution.services.len());
        for service in &resolution.services {
            let mut value = self.service_base(&modules, service)?;
            apply_patches(&mut value, &fragments, FragmentScope::Service, service);
            services.push((service.clone(), value));
        }

        let volumes = self.compose_volumes(&modules, &fragments)?;

        let mut profiles: BTreeMap<Profile, Vec<String>> = BTreeMap::new();
        for profile in Profile::ALL {
            let names = resolution
                .modules
                .iter()
                .filter_map(|name| self.registry.get(name))
                .flat_map(|m| m.services_in(profile))
                .map(|s| s.name.clone())
                .collect();
            let _ = profiles.insert(profile, names);
        }

        Ok(DeploymentDescriptor {
            services,
            volumes,
            profiles,
        })
    }

    fn service_base(&self, modules: &[&ModuleDescriptor], service: &str) -> Result<Value> {
        if let Some(alternative) = self.ctx.alternatives.get(service) {
            let offering = modules
                .iter()
                .find(|m| {
                    m.alternatives
                        .iter()
                        .any(|a| &a.name == alternative && a.replaces == service)
                })
                .ok_or_else(|| ModstackError::Composition {
                    message: format!(
                        "alternative {alternative} for service {service} is not offered by any enabled module"
                    ),
                })?;
            tracing::info!(%service, %alternative, module = %offering.name, "using alternative service definition");
            return single_base(std::slice::from_ref(offering), FragmentScope::Service, alternative)?
                .ok_or_else(|| ModstackError::Composition {
                    message: format!("alternative {alternative} has no base fragment"),
                });
        }

        let owners: Vec<&ModuleDescriptor> = modules
            .iter()
            .copied()
            .filter(|m| m.service(service).is_some())
            .collect();
        single_base(&owners, FragmentScope::Service, service)?.ok_or_else(|| {
            ModstackError::Composition {
                message: format!("service {service} has no base fragment"),
            }
        })
    }

    fn compose_volumes(
        &self,
        modules: &[&ModuleDescriptor],
        fragments: &[&Fragment],
    ) -> Result<Vec<(String, Value)>> {
        let mut declared: Vec<&VolumeDescriptor> = Vec::new();
        for volume in modules.iter().flat_map(|m| m.volumes.iter()) {
            match declared.iter().find(|v| v.name == volume.name) {
                None => declared.push(volume),
                Some(first)
                    if first.sharing == VolumeSharing::Shared
                        && volume.sharing == VolumeSharing::Shared => {}
                Some(first) => {
                    return Err(ModstackError::Composition {
                        message: format!(
                            "volume {} is declared by both {} and {}",
                            volume.name, first.module, volume.module
                        ),
                    });
                }
            }
        }

        let mut volumes = Vec::with_capacity(declared.len());
        for volume in declared {
            let mut value = self.volume_base(volume);
            if let Some(base) = single_base(modules, FragmentScope::Volume, &volume.name)? {
                merge(&mut value, &base);
            }
            apply_patches(&mut value, fragments, FragmentScope::Volume, &volume.name);
            volumes.push((volume.name.clone(), value));
        }
        Ok(volumes)
    }

    /// Bind mount under the volumes root for mapped exposed volumes, an
    /// empty definition otherwise.
    fn volume_base(&self, volume: &VolumeDescriptor) -> Value {
        let mut base = Mapping::new();
        let Some(mapping) = volume.mapping.as_ref() else {
            return Value::Mapping(base);
        };
        if volume.sharing != VolumeSharing::Exposed || self.ctx.no_exposed_volumes {
            return Value::Mapping(base);
        }
        let device = display_path(&self.ctx.volumes_dir.join(mapping));
        let mut opts = Mapping::new();
        let _ = opts.insert("type".into(), "none".into());
        let _ = opts.insert("o".into(), "bind".into());
        let _ = opts.insert("device".into(), device.into());
        let _ = base.insert("driver".into(), "local".into());
        let _ = base.insert("driver_opts".into(), Value::Mapping(opts));
        Value::Mapping(base)
    }
}

/// Finds the one base fragment for `target` among `modules`.
fn single_base(
    modules: &[&ModuleDescriptor],
    scope: FragmentScope,
    target: &str,
) -> Result<Option<Value>> {
    let mut bases = modules.iter().flat_map(|m| m.fragments.iter()).filter(|f| {
        f.scope == scope && f.kind == FragmentKind::Base && f.target == target
    });
    let first = bases.next();
    if let Some(second) = bases.next() {
        return Err(ModstackError::Composition {
            message: format!(
                "{target} has two base fragments: {} and {}",
                first.map(|f| f.path.display().to_string()).unwrap_or_default(),
                second.path.display()
            ),
        });
    }
    Ok(first.map(|f| f.payload.clone()))
}

fn apply_patches(value: &mut Value, fragments: &[&Fragment], scope: FragmentScope, target: &str) {
    for fragment in fragments
        .iter()
        .filter(|f| f.scope == scope && f.target == target)
    {
        match fragment.kind {
            FragmentKind::Base => {}
            FragmentKind::Merge => {
                tracing::debug!(%target, fragment = %fragment.path.display(), "merging fragment");
                merge(value, &fragment.payload);
            }
            FragmentKind::Override => {
                tracing::debug!(%target, fragment = %fragment.path.display(), "overriding fragment");
                override_with(value, &fragment.payload);
            }
        }
    }
}

/// Recursive merge: absent keys are added, lists concatenated, mappings
/// merged; any other combination is replaced by the patch value.
pub fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Mapping(base), Value::Mapping(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        let _ = base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Sequence(base), Value::Sequence(patch)) => base.extend(patch.iter().cloned()),
        (base, patch) => *base = patch.clone(),
    }
}

/// Shallow override: keys absent from the base are ignored, null or empty
/// string values remove the key, anything else replaces it.
pub fn override_with(base: &mut Value, patch: &Value) {
    let (Value::Mapping(base), Value::Mapping(patch)) = (base, patch) else {
        return;
    };
    for (key, value) in patch {
        if !base.contains_key(key) {
            tracing::debug!(?key, "override key absent from base, ignored");
            continue;
        }
        let removes = value.is_null() || value.as_str().is_some_and(str::is_empty);
        if removes {
            *base = std::mem::take(base)
                .into_iter()
                .filter(|(k, _)| k != key)
                .collect();
        } else if let Some(slot) = base.get_mut(key) {
            *slot = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use modstack_common::config::Config;

    use super::*;
    use crate::resolver::Resolver;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).expect("yaml")
    }

    #[test]
    fn merge_concatenates_lists_and_merges_maps() {
        let mut base = yaml("{ports: [8080], env: {A: 1}}");
        merge(&mut base, &yaml("{ports: [9090], env: {B: 2}}"));
        assert_eq!(base, yaml("{ports: [8080, 9090], env: {A: 1, B: 2}}"));
    }

    #[test]
    fn merge_replaces_on_type_mismatch() {
        let mut base = yaml("{command: [a, b], image: x}");
        merge(&mut base, &yaml("{command: run, labels: {k: v}}"));
        assert_eq!(base, yaml("{command: run, image: x, labels: {k: v}}"));
    }

    #[test]
    fn override_removes_on_empty_string() {
        let mut base = yaml("{ports: [8080], restart: always}");
        override_with(&mut base, &yaml("{restart: \"\"}"));
        assert_eq!(base, yaml("{ports: [8080]}"));
    }

    #[test]
    fn override_is_shallow_and_ignores_absent_keys() {
        let mut base = yaml("{ports: [8080], env: {A: 1, B: 2}, restart: always}");
        override_with(
            &mut base,
            &yaml("{ports: [9090], env: {C: 3}, restart: ~, user: root}"),
        );
        assert_eq!(base, yaml("{ports: [9090], env: {C: 3}}"));
    }

    struct Project {
        dir: tempfile::TempDir,
    }

    impl Project {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().expect("tempdir"),
            }
        }

        fn file(&self, rel: &str, content: &str) -> &Self {
            let path = self.dir.path().join("modules").join(rel);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(path, content).expect("write");
            self
        }

        fn ctx(&self, config: Config) -> Context {
            Context::from_config(self.dir.path(), config)
        }

        fn compose(&self, ctx: &Context, modules: &[&str]) -> Result<DeploymentDescriptor> {
            let registry = Registry::load(&ctx.modules_dir).expect("load");
            assert!(registry.invalid().is_empty(), "{:?}", registry.invalid());
            let resolution = Resolver::new(&registry, ctx.profile).resolve(modules)?;
            Compositor::new(&registry, ctx).compose(&resolution)
        }
    }

    fn web_and_db() -> Project {
        let project = Project::new();
        project
            .file(
                "db/module.yml",
                "# v1.0\nname: DB\nversion: 1\nservices:\n  db-postgres: {}\nvolumes:\n  db-data:\n    type: exposed\n    mapping: db/data\n  shared-volume:\n    type: shared\n",
            )
            .file("db/services/db-postgres.yml", "# v1.0\nimage: postgres\nrestart: always\nports: [5432]\n")
            .file(
                "web/module.yml",
                "# v1.0\nname: Web\nversion: 1\nservices:\n  web-nginx: {}\nvolumes:\n  shared-volume:\n    type: shared\ndependencies:\n  services:\n    - db\n",
            )
            .file("web/services/web-nginx.yml", "# v1.0\nimage: nginx\n")
            .file("web/services/db-postgres.merge.yml", "# v1.0\nports: [5433]\nenvironment: {A: 1}\n")
            .file("web/services/db-postgres.override.yml", "# v1.0\nrestart: \"\"\n");
        project
    }

    #[test]
    fn composes_patches_across_modules() {
        let project = web_and_db();
        let ctx = project.ctx(Config::default());
        let descriptor = project.compose(&ctx, &["web"]).expect("compose");

        assert_eq!(
            descriptor.service_names().collect::<Vec<_>>(),
            vec!["db-postgres", "web-nginx"]
        );
        assert_eq!(
            descriptor.service("db-postgres").expect("db"),
            &yaml("{image: postgres, ports: [5432, 5433], environment: {A: 1}}")
        );
        let volumes: Vec<&str> = descriptor.volumes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(volumes, vec!["db-data", "shared-volume"]);
        assert_eq!(descriptor.profiles[&Profile::Dev], vec!["db-postgres", "web-nginx"]);
    }

    #[test]
    fn exposed_volume_is_bind_mounted() {
        let project = web_and_db();
        let ctx = project.ctx(Config::default());
        let descriptor = project.compose(&ctx, &["db"]).expect("compose");
        let (_, data) = &descriptor.volumes[0];
        let device = data["driver_opts"]["device"].as_str().expect("device");
        assert!(device.ends_with("volumes/db/data"), "got {device}");
        assert_eq!(data["driver"].as_str(), Some("local"));

        let ctx = project.ctx(Config {
            no_exposed_volumes: true,
            ..Config::default()
        });
        let descriptor = project.compose(&ctx, &["db"]).expect("compose");
        assert_eq!(descriptor.volumes[0].1, Value::Mapping(Mapping::new()));
    }

    #[test]
    fn composing_twice_is_byte_identical() {
        let project = web_and_db();
        let ctx = project.ctx(Config::default());
        let first = project.compose(&ctx, &["web"]).expect("compose").render().expect("render");
        let second = project.compose(&ctx, &["web"]).expect("compose").render().expect("render");
        assert_eq!(first, second);
        assert!(first.starts_with("services:\n"));
    }

    #[test]
    fn duplicate_base_is_a_composition_error() {
        let project = web_and_db();
        project
            .file(
                "extra/module.yml",
                "# v1.0\nname: Extra\nversion: 1\nservices:\n  db-postgres: {}\n",
            )
            .file("extra/services/db-postgres.yml", "# v1.0\nimage: mysql\n");
        let ctx = project.ctx(Config::default());
        let err = project.compose(&ctx, &["db", "extra"]).unwrap_err();
        assert!(matches!(err, ModstackError::Composition { .. }), "got {err}");
    }

    #[test]
    fn configured_alternative_replaces_base() {
        let project = web_and_db();
        project
            .file(
                "pgpool/module.yml",
                "# v1.0\nname: Pool\nversion: 1\nalternatives:\n  pgpool-postgres:\n    name: Pooled\n    replaces: db-postgres\n",
            )
            .file("pgpool/services/pgpool-postgres.yml", "# v1.0\nimage: pgpool\n");
        let mut config = Config::default();
        let _ = config
            .alternatives
            .insert("db-postgres".into(), "pgpool-postgres".into());
        let ctx = project.ctx(config);

        let descriptor = project.compose(&ctx, &["db", "pgpool"]).expect("compose");
        assert_eq!(descriptor.service("db-postgres"), Some(&yaml("{image: pgpool}")));

        let err = project.compose(&ctx, &["db"]).unwrap_err();
        assert!(err.to_string().contains("pgpool-postgres"), "got {err}");
    }

    #[test]
    fn write_is_atomic_and_creates_parents() {
        let project = web_and_db();
        let ctx = project.ctx(Config::default());
        let descriptor = project.compose(&ctx, &["db"]).expect("compose");
        let path = project.dir.path().join("out").join("docker-compose.yml");
        descriptor.write(&path).expect("write");
        let written = std::fs::read_to_string(&path).expect("read");
        assert_eq!(written, descriptor.render().expect("render"));
        assert!(!path.with_extension("yml.tmp").exists());
    }
}
