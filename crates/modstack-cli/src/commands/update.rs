//! `modstack update` — Pull and restart the services of enabled modules.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `update` command.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Enabled modules to update.
    #[arg(required = true)]
    pub modules: Vec<String>,
}

/// Executes the `update` command.
///
/// # Errors
///
/// Returns an error if a module is not enabled or the runtime fails.
pub fn execute(args: UpdateArgs, ctx: Context) -> anyhow::Result<Report> {
    let controller = super::controller(ctx)?;
    Ok(controller.update(&args.modules)?)
}
