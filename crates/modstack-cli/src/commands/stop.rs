//! `modstack stop` — Stop the services of enabled modules.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Enabled modules to stop. If empty, stops all.
    pub modules: Vec<String>,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if a module is not enabled or the runtime fails.
pub fn execute(args: StopArgs, ctx: Context) -> anyhow::Result<Report> {
    tracing::info!(modules = ?args.modules, "stopping services");
    let controller = super::controller(ctx)?;
    Ok(controller.stop(&args.modules)?)
}
