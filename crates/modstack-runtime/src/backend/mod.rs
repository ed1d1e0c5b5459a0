//! Container runtime abstraction.
//!
//! The controller only talks to a [`ContainerRuntime`]; the production
//! implementation drives `docker compose`, tests substitute a fake.

pub mod compose;

use std::sync::Arc;

use modstack_common::context::Context;
use modstack_common::error::Result;
use modstack_common::types::ContainerStatus;

use crate::process::{ProcessOutput, ProcessRunner};

pub use self::compose::ComposeRuntime;

/// Operations on the services of the composed deployment descriptor.
pub trait ContainerRuntime: Send + Sync {
    /// Creates and starts `services`, detached, without their dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the command.
    fn up(&self, services: &[String]) -> Result<()>;

    /// Stops `services`, keeping their containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the command.
    fn stop(&self, services: &[String]) -> Result<()>;

    /// Stops and removes the containers of `services`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the command.
    fn remove(&self, services: &[String]) -> Result<()>;

    /// Pulls the images of `services`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the command.
    fn pull(&self, services: &[String]) -> Result<()>;

    /// Deletes a named volume of the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the command.
    fn remove_volume(&self, volume: &str) -> Result<()>;

    /// Runs `argv` inside the container of `service`.
    ///
    /// A non-zero exit of `argv` is reported through the output status.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    fn exec(
        &self,
        service: &str,
        argv: &[String],
        env: &[(String, String)],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput>;

    /// Current state of the container of `service`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    fn status(&self, service: &str) -> Result<ContainerStatus>;

    /// Services with a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be invoked.
    fn running_services(&self) -> Result<Vec<String>>;
}

/// Builds the production runtime for `ctx`.
///
/// # Errors
///
/// Returns [`modstack_common::error::ModstackError::NotFound`] if the
/// runtime binary is not installed.
pub fn detect_runtime(
    ctx: &Context,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Box<dyn ContainerRuntime>> {
    Ok(Box::new(ComposeRuntime::locate(ctx, runner)?))
}
