//! Lifecycle controller.
//!
//! Drives modules through `absent → installed-disabled ⇄ enabled` and back
//! through `uninstalling`. Each command validates its preconditions and
//! resolves the target module set before any hook runs; a precondition
//! failure aborts with nothing changed. Hook failures only degrade the
//! returned [`Report`].

use std::collections::BTreeSet;
use std::sync::Arc;

use modstack_common::context::Context;
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::LifecycleState;
use modstack_compose::compositor::{Compositor, DeploymentDescriptor};
use modstack_compose::descriptor::VolumeSharing;
use modstack_compose::hooks::HookEvent;
use modstack_compose::registry::{ModuleDescriptor, Registry};
use modstack_compose::resolver::{Resolution, Resolver};
use modstack_compose::version::Version;

use crate::backend::{self, ContainerRuntime};
use crate::dispatcher::HookDispatcher;
use crate::lock::LifecycleLock;
use crate::process::{ProcessRunner, SystemRunner};
use crate::report::Report;
use crate::state::{self, StateIndex};

/// Owns the lifecycle lock, the catalog and the state index for one run.
pub struct LifecycleController {
    ctx: Context,
    registry: Registry,
    state: StateIndex,
    runner: Arc<dyn ProcessRunner>,
    runtime: Box<dyn ContainerRuntime>,
    _lock: LifecycleLock,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("root", &self.ctx.root)
            .field("profile", &self.ctx.profile)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Opens a controller with the system process runner and the
    /// `docker compose` runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held, the catalog or state index
    /// cannot be read, or the runtime binary is missing.
    pub fn open(ctx: Context) -> Result<Self> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        let runtime = backend::detect_runtime(&ctx, Arc::clone(&runner))?;
        Self::with_runtime(ctx, runner, runtime)
    }

    /// Opens a controller over an explicit runner and runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held or the catalog or state index
    /// cannot be read.
    pub fn with_runtime(
        ctx: Context,
        runner: Arc<dyn ProcessRunner>,
        runtime: Box<dyn ContainerRuntime>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&ctx.state_dir)
            .map_err(|e| ModstackError::io(&ctx.state_dir, e))?;
        let lock = LifecycleLock::acquire(&ctx.lock_file())?;
        let registry = Registry::load(&ctx.modules_dir)?;
        let state = state::load_state(&ctx.state_file())?;
        tracing::debug!(
            modules = registry.modules().count(),
            installed = state.installed().len(),
            "controller ready"
        );
        Ok(Self {
            ctx,
            registry,
            state,
            runner,
            runtime,
            _lock: lock,
        })
    }

    /// The loaded catalog.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The persisted module states.
    #[must_use]
    pub const fn state(&self) -> &StateIndex {
        &self.state
    }

    /// The run context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// The container runtime.
    #[must_use]
    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// The process runner used for hooks.
    #[must_use]
    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner.as_ref()
    }

    /// Installs `modules` and the modules they require, then optionally
    /// enables `modules`.
    ///
    /// # Errors
    ///
    /// Returns an error if a module is unknown or being removed, or if the
    /// requested set does not resolve.
    pub fn install(&mut self, modules: &[String], enable: bool) -> Result<Report> {
        let mut report = self.new_report();
        for module in modules {
            let _ = self.registry.require(module)?;
            if self.state.lifecycle(module) == LifecycleState::Uninstalling {
                return Err(self.invalid_transition(module, "install"));
            }
        }
        let installed = self.state.installed();
        let resolution = Resolver::new(&self.registry, self.ctx.profile)
            .preferring(&installed)
            .resolve(modules)?;
        let pending: Vec<String> = resolution
            .modules
            .iter()
            .filter(|m| self.state.lifecycle(m) == LifecycleState::Absent)
            .cloned()
            .collect();
        if pending.is_empty() {
            tracing::info!(?modules, "already installed");
        }

        let dispatcher = HookDispatcher::new(
            &self.ctx,
            &self.registry,
            self.runner.as_ref(),
            self.runtime.as_ref(),
        );
        for module in &pending {
            dispatcher.run_local(module, HookEvent::Init, &[], &mut report)?;
            let version = self.registry.require(module)?.version.to_string();
            self.state.mark_installed(module, &version);
            state::save_state(&self.ctx.state_file(), &self.state)?;
            tracing::info!(%module, %version, "module installed");
        }

        if enable {
            report.absorb(self.enable(modules)?);
        }
        Ok(report)
    }

    /// Enables `modules` together with the installed modules they require.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is not
    /// installed, a resolution or composition error, or a readiness error
    /// while starting the new services.
    pub fn enable(&mut self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        for module in modules {
            let _ = self.registry.require(module)?;
            if !matches!(
                self.state.lifecycle(module),
                LifecycleState::InstalledDisabled | LifecycleState::Enabled
            ) {
                return Err(self.invalid_transition(module, "enable"));
            }
        }

        let before = self.state.enabled();
        let installed = self.state.installed();
        let mut target: Vec<String> = before.iter().cloned().collect();
        target.extend(modules.iter().filter(|m| !before.contains(*m)).cloned());
        let resolution = Resolver::new(&self.registry, self.ctx.profile)
            .restricted_to(&installed)
            .resolve(&target)?;
        let descriptor = self.apply(&resolution)?;

        let newly: Vec<String> = resolution
            .modules
            .iter()
            .filter(|m| !before.contains(*m))
            .cloned()
            .collect();
        if newly.is_empty() {
            tracing::info!(?modules, "already enabled");
            return Ok(report);
        }
        let services = self.owned_services(&resolution, &descriptor, &newly);

        let dispatcher = HookDispatcher::new(
            &self.ctx,
            &self.registry,
            self.runner.as_ref(),
            self.runtime.as_ref(),
        );
        for service in &services {
            dispatcher.bring_up(service)?;
        }
        for module in &newly {
            let live: Vec<String> = resolution
                .modules
                .iter()
                .filter(|m| *m == module || self.state.lifecycle(m) == LifecycleState::Enabled)
                .cloned()
                .collect();
            dispatcher.run_local(module, HookEvent::Enable, &[], &mut report)?;
            dispatcher.run_container(
                module,
                HookEvent::Enable,
                &[],
                &live,
                &resolution.services,
                &mut report,
            )?;
            self.state.mark_enabled(module);
            state::save_state(&self.ctx.state_file(), &self.state)?;
            tracing::info!(%module, "module enabled");
        }
        Ok(report)
    }

    /// Disables `modules` and removes their services.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is not
    /// enabled, or a resolution error if an enabled module still requires
    /// one of `modules`.
    pub fn disable(&mut self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        for module in modules {
            let _ = self.registry.require(module)?;
            if self.state.lifecycle(module) != LifecycleState::Enabled {
                return Err(self.invalid_transition(module, "disable"));
            }
        }

        let enabled = self.state.enabled();
        let remaining: BTreeSet<String> = enabled
            .iter()
            .filter(|m| !modules.contains(*m))
            .cloned()
            .collect();
        let current = self.resolve_enabled()?;
        let remaining_list: Vec<String> = remaining.iter().cloned().collect();
        let after = Resolver::new(&self.registry, self.ctx.profile)
            .restricted_to(&remaining)
            .resolve(&remaining_list)?;

        let leaving: Vec<String> = current
            .modules
            .iter()
            .rev()
            .filter(|m| modules.contains(*m))
            .cloned()
            .collect();
        let dispatcher = self.dispatcher();
        let mut live = current.modules.clone();
        for module in &leaving {
            dispatcher.run_local(module, HookEvent::Disable, &[], &mut report)?;
            dispatcher.run_container(
                module,
                HookEvent::Disable,
                &[],
                &live,
                &current.services,
                &mut report,
            )?;
            live.retain(|m| m != module);
        }

        let _ = self.apply(&after)?;
        let mut services: Vec<String> = current
            .services
            .iter()
            .filter(|s| !after.services.contains(*s))
            .cloned()
            .collect();
        services.reverse();
        self.runtime.remove(&services)?;

        for module in &leaving {
            self.state.mark_disabled(module);
            tracing::info!(%module, "module disabled");
        }
        state::save_state(&self.ctx.state_file(), &self.state)?;
        Ok(report)
    }

    /// Uninstalls disabled `modules` and deletes the data of their volumes.
    ///
    /// Running services are stopped while the uninstall hooks run and
    /// started again afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is
    /// enabled or not installed.
    pub fn uninstall(&mut self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        for module in modules {
            let _ = self.registry.require(module)?;
            if !matches!(
                self.state.lifecycle(module),
                LifecycleState::InstalledDisabled | LifecycleState::Uninstalling
            ) {
                return Err(self.invalid_transition(module, "uninstall"));
            }
        }

        let current = self.resolve_enabled()?;
        let running = self.runtime.running_services()?;
        let mut stopped: Vec<String> = current
            .services
            .iter()
            .filter(|s| running.contains(*s))
            .cloned()
            .collect();
        stopped.reverse();
        for service in &stopped {
            self.runtime.stop(std::slice::from_ref(service))?;
        }

        for module in modules {
            self.state.mark_uninstalling(module);
        }
        state::save_state(&self.ctx.state_file(), &self.state)?;

        let dispatcher = HookDispatcher::new(
            &self.ctx,
            &self.registry,
            self.runner.as_ref(),
            self.runtime.as_ref(),
        );
        for module in modules {
            dispatcher.run_local(module, HookEvent::Uninstall, &[], &mut report)?;
            let descriptor = self.registry.require(module)?;
            self.remove_volumes(descriptor, &mut report);
        }
        for module in modules {
            self.state.remove(module);
            tracing::info!(%module, "module uninstalled");
        }
        state::save_state(&self.ctx.state_file(), &self.state)?;

        stopped.reverse();
        for service in &stopped {
            dispatcher.bring_up(service)?;
        }
        Ok(report)
    }

    /// Upgrades installed `modules` whose catalog version is newer than
    /// the installed one.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is not
    /// installed, or an error while recomposing enabled modules.
    pub fn upgrade(&mut self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        let mut pending = Vec::new();
        for module in modules {
            let descriptor = self.registry.require(module)?;
            if !matches!(
                self.state.lifecycle(module),
                LifecycleState::InstalledDisabled | LifecycleState::Enabled
            ) {
                return Err(self.invalid_transition(module, "upgrade"));
            }
            let installed = self.state.version(module).unwrap_or_default().to_string();
            let available = descriptor.version;
            match installed.parse::<Version>() {
                Ok(old) if available <= old => {
                    tracing::info!(%module, version = %old, "already up to date");
                }
                Ok(_) => pending.push((module.clone(), installed, available.to_string())),
                Err(err) => {
                    report.warn(format!(
                        "module {module}: installed version unreadable ({err}), upgrading"
                    ));
                    pending.push((module.clone(), installed, available.to_string()));
                }
            }
        }
        if pending.is_empty() {
            return Ok(report);
        }

        let current = self.resolve_enabled()?;
        let descriptor = self.apply(&current)?;
        let dispatcher = HookDispatcher::new(
            &self.ctx,
            &self.registry,
            self.runner.as_ref(),
            self.runtime.as_ref(),
        );
        for (module, old, new) in &pending {
            let args = [old.clone(), new.clone()];
            dispatcher.run_local(module, HookEvent::Upgrade, &args, &mut report)?;
            if current.contains(module) {
                let owned = std::slice::from_ref(module);
                for service in self.owned_services(&current, &descriptor, owned) {
                    dispatcher.bring_up(&service)?;
                }
                dispatcher.run_container(
                    module,
                    HookEvent::Update,
                    &[],
                    &current.modules,
                    &current.services,
                    &mut report,
                )?;
            }
            self.state.set_version(module, new);
            state::save_state(&self.ctx.state_file(), &self.state)?;
            tracing::info!(%module, from = %old, to = %new, "module upgraded");
        }
        Ok(report)
    }

    /// Recomposes, pulls and restarts the services of enabled `modules`,
    /// then runs their container `update` hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is not
    /// enabled, or a runtime or readiness error.
    pub fn update(&self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        self.require_enabled(modules, "update")?;
        let current = self.resolve_enabled()?;
        let descriptor = self.apply(&current)?;
        let services = self.owned_services(&current, &descriptor, modules);
        self.runtime.pull(&services)?;

        let dispatcher = self.dispatcher();
        for service in &services {
            dispatcher.bring_up(service)?;
        }
        for module in current.modules.iter().filter(|m| modules.contains(*m)) {
            dispatcher.run_container(
                module,
                HookEvent::Update,
                &[],
                &current.modules,
                &current.services,
                &mut report,
            )?;
        }
        Ok(report)
    }

    /// Runs the `backup` hooks of `module` with the backup `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] if the module is not
    /// installed.
    pub fn backup(&self, module: &str, name: &str) -> Result<Report> {
        self.archive(module, name, HookEvent::Backup, "backup")
    }

    /// Runs the `restore` hooks of `module` with the backup `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] if the module is not
    /// installed.
    pub fn restore(&self, module: &str, name: &str) -> Result<Report> {
        self.archive(module, name, HookEvent::Restore, "restore")
    }

    fn archive(
        &self,
        module: &str,
        name: &str,
        event: HookEvent,
        command: &'static str,
    ) -> Result<Report> {
        let mut report = self.new_report();
        let _ = self.registry.require(module)?;
        let lifecycle = self.state.lifecycle(module);
        if !matches!(
            lifecycle,
            LifecycleState::InstalledDisabled | LifecycleState::Enabled
        ) {
            return Err(self.invalid_transition(module, command));
        }
        let args = [name.to_string()];
        let dispatcher = self.dispatcher();
        dispatcher.run_local(module, event, &args, &mut report)?;
        if lifecycle == LifecycleState::Enabled {
            let current = self.resolve_enabled()?;
            dispatcher.run_container(
                module,
                event,
                &args,
                &current.modules,
                &current.services,
                &mut report,
            )?;
        }
        tracing::info!(%module, backup = %name, "{command} finished");
        Ok(report)
    }

    /// Starts the services of enabled `modules` in order, then runs their
    /// `start` hooks. An empty list means every enabled module.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is not
    /// enabled, or a runtime or readiness error.
    pub fn start(&self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        let current = self.resolve_enabled()?;
        let selected = self.select_enabled(&current, modules, "start")?;
        let descriptor = self.compose(&current)?;
        let services = self.owned_services(&current, &descriptor, &selected);

        let dispatcher = self.dispatcher();
        for service in &services {
            dispatcher.bring_up(service)?;
        }
        dispatcher.run_local_all(&selected, HookEvent::Start, &[], &mut report)?;
        Ok(report)
    }

    /// Stops the services of enabled `modules` in reverse order, then runs
    /// their `stop` hooks. An empty list means every enabled module.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::InvalidTransition`] for a module that is not
    /// enabled, or a runtime error.
    pub fn stop(&self, modules: &[String]) -> Result<Report> {
        let mut report = self.new_report();
        let current = self.resolve_enabled()?;
        let mut selected = self.select_enabled(&current, modules, "stop")?;
        let descriptor = self.compose(&current)?;
        let mut services = self.owned_services(&current, &descriptor, &selected);
        services.reverse();
        for service in &services {
            self.check_cancelled()?;
            self.runtime.stop(std::slice::from_ref(service))?;
        }

        selected.reverse();
        self.dispatcher()
            .run_local_all(&selected, HookEvent::Stop, &[], &mut report)?;
        Ok(report)
    }

    fn dispatcher(&self) -> HookDispatcher<'_> {
        HookDispatcher::new(
            &self.ctx,
            &self.registry,
            self.runner.as_ref(),
            self.runtime.as_ref(),
        )
    }

    fn new_report(&self) -> Report {
        Report {
            warnings: Vec::new(),
            invalid_modules: self
                .registry
                .invalid()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    fn invalid_transition(&self, module: &str, command: &'static str) -> ModstackError {
        ModstackError::InvalidTransition {
            module: module.to_string(),
            command,
            state: self.state.lifecycle(module).to_string(),
        }
    }

    fn require_enabled(&self, modules: &[String], command: &'static str) -> Result<()> {
        for module in modules {
            let _ = self.registry.require(module)?;
            if self.state.lifecycle(module) != LifecycleState::Enabled {
                return Err(self.invalid_transition(module, command));
            }
        }
        Ok(())
    }

    /// `modules` in resolver order, or every enabled module when empty.
    fn select_enabled(
        &self,
        current: &Resolution,
        modules: &[String],
        command: &'static str,
    ) -> Result<Vec<String>> {
        self.require_enabled(modules, command)?;
        Ok(current
            .modules
            .iter()
            .filter(|m| modules.is_empty() || modules.contains(*m))
            .cloned()
            .collect())
    }

    fn resolve_enabled(&self) -> Result<Resolution> {
        let enabled = self.state.enabled();
        let names: Vec<String> = enabled.iter().cloned().collect();
        Resolver::new(&self.registry, self.ctx.profile)
            .restricted_to(&enabled)
            .resolve(&names)
    }

    fn compose(&self, resolution: &Resolution) -> Result<DeploymentDescriptor> {
        Compositor::new(&self.registry, &self.ctx).compose(resolution)
    }

    /// Composes `resolution` and writes the deployment descriptor.
    fn apply(&self, resolution: &Resolution) -> Result<DeploymentDescriptor> {
        let descriptor = self.compose(resolution)?;
        descriptor.write(&self.ctx.compose_file)?;
        tracing::info!(
            path = %self.ctx.compose_file.display(),
            services = descriptor.services.len(),
            "deployment descriptor written"
        );
        Ok(descriptor)
    }

    /// Composed services owned by `modules`, in startup order.
    fn owned_services(
        &self,
        resolution: &Resolution,
        descriptor: &DeploymentDescriptor,
        modules: &[String],
    ) -> Vec<String> {
        resolution
            .services
            .iter()
            .filter(|s| descriptor.service(s).is_some())
            .filter(|s| {
                self.registry
                    .owner_of(s)
                    .is_some_and(|owner| modules.contains(&owner.name))
            })
            .cloned()
            .collect()
    }

    fn remove_volumes(&self, module: &ModuleDescriptor, report: &mut Report) {
        for volume in &module.volumes {
            if volume.sharing == VolumeSharing::Shared && self.shared_elsewhere(module, &volume.name) {
                tracing::info!(volume = %volume.name, "shared volume kept");
                continue;
            }
            if let Err(err) = self.runtime.remove_volume(&volume.name) {
                report.record(&err);
            }
            let Some(mapping) = volume.mapping.as_ref() else {
                continue;
            };
            let path = self.ctx.volumes_dir.join(mapping);
            if path.exists() {
                tracing::info!(path = %path.display(), "removing volume data");
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    report.record(&ModstackError::io(&path, e));
                }
            }
        }
    }

    /// Returns whether another installed module declares the shared volume.
    fn shared_elsewhere(&self, module: &ModuleDescriptor, volume: &str) -> bool {
        self.state
            .installed()
            .iter()
            .filter(|name| **name != module.name)
            .filter_map(|name| self.registry.get(name))
            .any(|m| m.volume(volume).is_some())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.ctx.is_cancelled() {
            Err(ModstackError::Cancelled)
        } else {
            Ok(())
        }
    }
}
