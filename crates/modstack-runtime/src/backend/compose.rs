//! `docker compose` backend.

use std::path::PathBuf;
use std::sync::Arc;

use modstack_common::context::{Context, display_path};
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::ContainerStatus;

use super::ContainerRuntime;
use crate::process::{ProcessOutput, ProcessRunner, ProcessSpec};

/// Drives `<binary> compose -f <file> -p <project>`.
pub struct ComposeRuntime {
    binary: PathBuf,
    compose_file: PathBuf,
    project: String,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for ComposeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeRuntime")
            .field("binary", &self.binary)
            .field("compose_file", &self.compose_file)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl ComposeRuntime {
    /// Locates the runtime binary configured in `ctx` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::NotFound`] if the binary is not installed.
    pub fn locate(ctx: &Context, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        let binary = which::which(&ctx.runtime_binary).map_err(|_| ModstackError::NotFound {
            kind: "container runtime binary",
            id: ctx.runtime_binary.clone(),
        })?;
        tracing::debug!(binary = %binary.display(), "using container runtime");
        Ok(Self::new(binary, ctx, runner))
    }

    /// Creates a runtime with an explicit binary.
    pub fn new(binary: impl Into<PathBuf>, ctx: &Context, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            binary: binary.into(),
            compose_file: ctx.compose_file.clone(),
            project: ctx.project_name.clone(),
            runner,
        }
    }

    fn compose<I, S>(&self, args: I) -> ProcessSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessSpec::new(display_path(&self.binary))
            .args([
                "compose".to_string(),
                "-f".to_string(),
                display_path(&self.compose_file),
                "-p".to_string(),
                self.project.clone(),
            ])
            .args(args)
    }

    fn checked(&self, spec: &ProcessSpec) -> Result<ProcessOutput> {
        let output = self.runner.run(spec)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(ModstackError::Runtime {
                command: spec.command_line(),
                status: output.status.to_string(),
                output: output.diagnostic().to_string(),
            })
        }
    }

    fn on_services(&self, verb: &[&str], services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        let args = verb
            .iter()
            .map(|s| (*s).to_string())
            .chain(services.iter().cloned());
        let _ = self.checked(&self.compose(args))?;
        Ok(())
    }
}

impl ContainerRuntime for ComposeRuntime {
    fn up(&self, services: &[String]) -> Result<()> {
        tracing::info!(?services, "starting services");
        self.on_services(&["up", "-d", "--no-deps"], services)
    }

    fn stop(&self, services: &[String]) -> Result<()> {
        tracing::info!(?services, "stopping services");
        self.on_services(&["stop"], services)
    }

    fn remove(&self, services: &[String]) -> Result<()> {
        tracing::info!(?services, "removing service containers");
        self.on_services(&["rm", "--stop", "--force"], services)
    }

    fn pull(&self, services: &[String]) -> Result<()> {
        tracing::info!(?services, "pulling images");
        self.on_services(&["pull"], services)
    }

    fn remove_volume(&self, volume: &str) -> Result<()> {
        let name = format!("{}_{volume}", self.project);
        tracing::info!(volume = %name, "removing volume");
        let spec = ProcessSpec::new(display_path(&self.binary))
            .args(["volume", "rm", "-f", name.as_str()]);
        let _ = self.checked(&spec)?;
        Ok(())
    }

    fn exec(
        &self,
        service: &str,
        argv: &[String],
        env: &[(String, String)],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput> {
        let mut args = vec!["exec".to_string(), "-T".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(service.to_string());
        args.extend(argv.iter().cloned());
        let mut spec = self.compose(args);
        if let Some(input) = stdin {
            spec = spec.stdin(input);
        }
        self.runner.run(&spec)
    }

    fn status(&self, service: &str) -> Result<ContainerStatus> {
        let spec = self.compose(["ps", "--all", "--format", "{{.State}}", service]);
        let output = self.runner.run(&spec)?;
        if !output.status.success() {
            tracing::debug!(%service, status = %output.status, "state probe failed");
            return Ok(ContainerStatus::Unknown);
        }
        let first = output.stdout.lines().map(str::trim).find(|l| !l.is_empty());
        Ok(ContainerStatus::from_probe(first.unwrap_or_default()))
    }

    fn running_services(&self) -> Result<Vec<String>> {
        let spec = self.compose(["ps", "--services", "--filter", "status=running"]);
        let output = self.checked(&spec)?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
