//! Hook dispatch.
//!
//! Local hooks run on the host from the module root. Container hooks are
//! streamed on stdin to an interpreter inside the target service. Every run
//! is appended to the owning module's hook log; a non-zero exit becomes a
//! [`ModstackError::HookFailure`] warning on the [`Report`].

use modstack_common::context::{Context, display_path};
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::ContainerStatus;
use modstack_compose::hooks::{Hook, HookEvent, HookFile};
use modstack_compose::registry::{ModuleDescriptor, Registry};

use crate::backend::ContainerRuntime;
use crate::logs;
use crate::process::{ProcessOutput, ProcessRunner, ProcessSpec};
use crate::readiness::Readiness;
use crate::report::Report;

/// A container hook selected for one event.
#[derive(Debug, Clone, Copy)]
pub struct ContainerTarget<'a> {
    /// Module owning the hook script.
    pub module: &'a ModuleDescriptor,
    /// The hook script.
    pub hook: &'a HookFile,
    /// Service the hook runs in.
    pub service: &'a str,
}

/// Runs hooks and probes service state.
pub struct HookDispatcher<'a> {
    ctx: &'a Context,
    registry: &'a Registry,
    runner: &'a dyn ProcessRunner,
    runtime: &'a dyn ContainerRuntime,
    readiness: Readiness,
}

impl<'a> HookDispatcher<'a> {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        ctx: &'a Context,
        registry: &'a Registry,
        runner: &'a dyn ProcessRunner,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            ctx,
            registry,
            runner,
            runtime,
            readiness: Readiness::from_context(ctx),
        }
    }

    /// Runs the local `event` hook of `module`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::Cancelled`] on interruption and
    /// [`ModstackError::NotFound`] for an unknown module. Hook failures are
    /// recorded on `report`.
    pub fn run_local(
        &self,
        module: &str,
        event: HookEvent,
        args: &[String],
        report: &mut Report,
    ) -> Result<()> {
        let descriptor = self.registry.require(module)?;
        let Some(hook) = descriptor.hooks.local(event) else {
            tracing::trace!(%module, %event, "no local hook");
            return Ok(());
        };
        self.check_cancelled()?;

        tracing::info!(%module, hook = %hook.file_name(), "running local hook");
        let spec = local_command(hook)
            .args(args.iter().cloned())
            .envs(self.ctx.hook_env(module))
            .current_dir(&descriptor.root);
        match self.runner.run(&spec) {
            Ok(output) => self.finish(descriptor, hook, &output, report),
            Err(err @ ModstackError::Process { .. }) => {
                report.record(&ModstackError::HookFailure {
                    module: module.to_string(),
                    hook: hook.file_name(),
                    status: "not started".to_string(),
                    output: err.to_string(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Runs the local `event` hook of each module in order.
    ///
    /// # Errors
    ///
    /// See [`HookDispatcher::run_local`].
    pub fn run_local_all(
        &self,
        modules: &[String],
        event: HookEvent,
        args: &[String],
        report: &mut Report,
    ) -> Result<()> {
        for module in modules {
            self.run_local(module, event, args, report)?;
        }
        Ok(())
    }

    /// Container hooks reacting to `changing` for `event`.
    ///
    /// Selects the hooks of `changing` itself plus the hooks of other
    /// `active` modules that target one of its services. Only services in
    /// `services` are considered. Order follows `active`.
    #[must_use]
    pub fn container_targets(
        &self,
        changing: &str,
        event: HookEvent,
        active: &[String],
        services: &[String],
    ) -> Vec<ContainerTarget<'a>> {
        let registry = self.registry;
        let mut targets = Vec::new();
        for module in active.iter().filter_map(|name| registry.get(name)) {
            for hook in module.hooks.container(event) {
                let Hook::Container { service, .. } = &hook.hook else {
                    continue;
                };
                if !services.contains(service) {
                    continue;
                }
                let targets_changing = registry
                    .owner_of(service)
                    .is_some_and(|owner| owner.name == changing);
                if module.name == changing || targets_changing {
                    targets.push(ContainerTarget {
                        module,
                        hook,
                        service: service.as_str(),
                    });
                }
            }
        }
        targets
    }

    /// Runs every container hook reacting to `changing` for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::Cancelled`] on interruption or a runtime
    /// error if the container runtime cannot be invoked.
    pub fn run_container(
        &self,
        changing: &str,
        event: HookEvent,
        args: &[String],
        active: &[String],
        services: &[String],
        report: &mut Report,
    ) -> Result<()> {
        for target in self.container_targets(changing, event, active, services) {
            self.check_cancelled()?;
            self.run_in_container(target, args, report)?;
        }
        Ok(())
    }

    fn run_in_container(
        &self,
        target: ContainerTarget<'_>,
        args: &[String],
        report: &mut Report,
    ) -> Result<()> {
        let ContainerTarget {
            module,
            hook,
            service,
        } = target;

        let mut state = self.probe(service);
        if state.is_transitioning() {
            state = match self.readiness.until_settled(service, || self.probe(service)) {
                Ok(settled) => settled,
                Err(ModstackError::Cancelled) => return Err(ModstackError::Cancelled),
                Err(err) => {
                    report.record(&err);
                    return Ok(());
                }
            };
        }
        if !matches!(state, ContainerStatus::Running | ContainerStatus::Unknown) {
            report.warn(format!(
                "skipping hook {} of module {}: service {service} is {state}",
                hook.file_name(),
                module.name
            ));
            return Ok(());
        }

        let script = match std::fs::read(&hook.path) {
            Ok(script) => script,
            Err(e) => {
                report.record(&ModstackError::io(&hook.path, e));
                return Ok(());
            }
        };
        tracing::info!(module = %module.name, hook = %hook.file_name(), %service, "running container hook");
        let argv = container_command(&hook.extension, args);
        let output = self
            .runtime
            .exec(service, &argv, &self.ctx.hook_env(&module.name), Some(&script))?;
        self.finish(module, hook, &output, report)
    }

    /// Current state of `service`.
    ///
    /// Uses the owning module's local `state` hook when it has one and the
    /// container runtime otherwise. Failures and empty output are
    /// [`ContainerStatus::Unknown`].
    #[must_use]
    pub fn probe(&self, service: &str) -> ContainerStatus {
        let owner = self.registry.owner_of(service);
        let Some((module, hook)) = owner.and_then(|m| m.hooks.local(HookEvent::State).map(|h| (m, h)))
        else {
            return self.runtime.status(service).unwrap_or_else(|err| {
                tracing::debug!(%service, error = %err, "state probe failed");
                ContainerStatus::Unknown
            });
        };

        let spec = local_command(hook)
            .args([service])
            .envs(self.ctx.hook_env(&module.name))
            .current_dir(&module.root);
        match self.runner.run(&spec) {
            Ok(output) if output.status.success() => {
                let first = output.stdout.lines().map(str::trim).find(|l| !l.is_empty());
                ContainerStatus::from_probe(first.unwrap_or_default())
            }
            Ok(output) => {
                tracing::debug!(%service, status = %output.status, "state hook failed");
                ContainerStatus::Unknown
            }
            Err(err) => {
                tracing::debug!(%service, error = %err, "state hook did not start");
                ContainerStatus::Unknown
            }
        }
    }

    /// Waits until `service` is running.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::ReadinessTimeout`] or
    /// [`ModstackError::Cancelled`].
    pub fn wait_running(&self, service: &str) -> Result<()> {
        self.readiness.until_running(service, || self.probe(service))
    }

    /// Starts `service` and waits until it is running.
    ///
    /// # Errors
    ///
    /// Returns a runtime error if the service cannot be started, or see
    /// [`HookDispatcher::wait_running`].
    pub fn bring_up(&self, service: &str) -> Result<()> {
        self.check_cancelled()?;
        self.runtime.up(&[service.to_string()])?;
        self.wait_running(service)
    }

    fn finish(
        &self,
        module: &ModuleDescriptor,
        hook: &HookFile,
        output: &ProcessOutput,
        report: &mut Report,
    ) -> Result<()> {
        let name = hook.file_name();
        if let Err(err) = logs::record_hook(&self.ctx.logs_dir(), &module.name, &name, output) {
            tracing::warn!(module = %module.name, error = %err, "cannot write hook log");
        }
        if output.status.success() {
            tracing::debug!(module = %module.name, hook = %name, "hook succeeded");
        } else {
            report.record(&ModstackError::HookFailure {
                module: module.name.clone(),
                hook: name,
                status: output.status.to_string(),
                output: output.diagnostic().trim_end().to_string(),
            });
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.ctx.is_cancelled() {
            Err(ModstackError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Host command for a local hook, chosen by extension.
fn local_command(hook: &HookFile) -> ProcessSpec {
    let script = display_path(&hook.path);
    match hook.extension.as_str() {
        "sh" => ProcessSpec::new("sh").args([script]),
        "bash" => ProcessSpec::new("bash").args([script]),
        "py" => ProcessSpec::new("python3").args([script]),
        _ => ProcessSpec::new(script),
    }
}

/// In-container interpreter reading the script from stdin.
fn container_command(extension: &str, args: &[String]) -> Vec<String> {
    let mut argv: Vec<String> = match extension {
        "bash" => vec!["bash".into(), "-s".into(), "--".into()],
        "py" => vec!["python3".into(), "-".into()],
        _ => vec!["sh".into(), "-s".into(), "--".into()],
    };
    argv.extend(args.iter().cloned());
    argv
}
