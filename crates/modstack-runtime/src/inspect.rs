//! Read-only views: resolution plans and module status.
//!
//! Neither view takes the lifecycle lock or writes any file.

use modstack_common::context::Context;
use modstack_common::error::Result;
use modstack_common::types::{ContainerStatus, LifecycleState};
use modstack_compose::compositor::{Compositor, DeploymentDescriptor};
use modstack_compose::registry::Registry;
use modstack_compose::resolver::{Resolution, Resolver};
use modstack_compose::version::Version;

use crate::backend::ContainerRuntime;
use crate::dispatcher::HookDispatcher;
use crate::process::ProcessRunner;
use crate::state::StateIndex;

/// What enabling a module set would produce.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Ordered modules and services.
    pub resolution: Resolution,
    /// Composed deployment descriptor.
    pub descriptor: DeploymentDescriptor,
}

/// Resolves the enabled modules plus `modules` against the whole catalog
/// and composes the result.
///
/// # Errors
///
/// Returns the resolution or composition error the same request would hit.
pub fn plan(
    ctx: &Context,
    registry: &Registry,
    state: &StateIndex,
    modules: &[String],
) -> Result<Plan> {
    let mut target: Vec<String> = state.enabled().into_iter().collect();
    for module in modules {
        if !target.contains(module) {
            target.push(module.clone());
        }
    }
    let installed = state.installed();
    let resolution = Resolver::new(registry, ctx.profile)
        .preferring(&installed)
        .resolve(&target)?;
    let descriptor = Compositor::new(registry, ctx).compose(&resolution)?;
    Ok(Plan {
        resolution,
        descriptor,
    })
}

/// Status line of one catalog module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStatus {
    /// Module name.
    pub name: String,
    /// Lifecycle state.
    pub lifecycle: LifecycleState,
    /// Version recorded at install time.
    pub installed: Option<String>,
    /// Version found in the catalog.
    pub available: String,
    /// Container state of each service running in the profile, for
    /// enabled modules.
    pub services: Vec<(String, ContainerStatus)>,
}

impl ModuleStatus {
    /// Returns whether the catalog holds a newer version than the
    /// installed one.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        let Some(installed) = self.installed.as_deref() else {
            return false;
        };
        match (installed.parse::<Version>(), self.available.parse::<Version>()) {
            (Ok(old), Ok(new)) => new > old,
            _ => installed != self.available,
        }
    }
}

/// Status of every catalog module, in name order.
#[must_use]
pub fn status(
    ctx: &Context,
    registry: &Registry,
    state: &StateIndex,
    runner: &dyn ProcessRunner,
    runtime: &dyn ContainerRuntime,
) -> Vec<ModuleStatus> {
    let dispatcher = HookDispatcher::new(ctx, registry, runner, runtime);
    registry
        .modules()
        .map(|module| {
            let lifecycle = state.lifecycle(&module.name);
            let services = if lifecycle == LifecycleState::Enabled {
                module
                    .services_in(ctx.profile)
                    .map(|s| (s.name.clone(), dispatcher.probe(&s.name)))
                    .collect()
            } else {
                Vec::new()
            };
            ModuleStatus {
                name: module.name.clone(),
                lifecycle,
                installed: state.version(&module.name).map(str::to_string),
                available: module.version.to_string(),
                services,
            }
        })
        .collect()
}
