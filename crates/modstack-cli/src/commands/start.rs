//! `modstack start` — Start the services of enabled modules.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Enabled modules to start. If empty, starts all.
    pub modules: Vec<String>,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if a module is not enabled or a service never becomes
/// ready.
pub fn execute(args: StartArgs, ctx: Context) -> anyhow::Result<Report> {
    let controller = super::controller(ctx)?;
    Ok(controller.start(&args.modules)?)
}
