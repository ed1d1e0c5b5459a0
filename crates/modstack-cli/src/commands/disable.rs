//! `modstack disable` — Remove modules from the deployment.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `disable` command.
#[derive(Args, Debug)]
pub struct DisableArgs {
    /// Modules to disable.
    #[arg(required = true)]
    pub modules: Vec<String>,
}

/// Executes the `disable` command.
///
/// # Errors
///
/// Returns an error if a module is not enabled or an enabled module still
/// requires it.
pub fn execute(args: DisableArgs, ctx: Context) -> anyhow::Result<Report> {
    let mut controller = super::controller(ctx)?;
    Ok(controller.disable(&args.modules)?)
}
