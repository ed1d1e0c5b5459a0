//! `modstack uninstall` — Remove disabled modules and their volume data.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `uninstall` command.
#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Modules to uninstall. Each must be disabled first.
    #[arg(required = true)]
    pub modules: Vec<String>,
}

/// Executes the `uninstall` command.
///
/// # Errors
///
/// Returns an error if a module is still enabled or not installed.
pub fn execute(args: UninstallArgs, ctx: Context) -> anyhow::Result<Report> {
    let mut controller = super::controller(ctx)?;
    Ok(controller.uninstall(&args.modules)?)
}
