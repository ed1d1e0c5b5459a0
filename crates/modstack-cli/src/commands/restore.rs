//! `modstack restore` — Run the restore hooks of a module.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `restore` command.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Installed module to restore.
    pub module: String,

    /// Name of the backup to restore.
    pub name: String,
}

/// Executes the `restore` command.
///
/// # Errors
///
/// Returns an error if the module is not installed.
pub fn execute(args: RestoreArgs, ctx: Context) -> anyhow::Result<Report> {
    let controller = super::controller(ctx)?;
    Ok(controller.restore(&args.module, &args.name)?)
}
