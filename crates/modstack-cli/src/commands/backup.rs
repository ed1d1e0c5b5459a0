//! `modstack backup` — Run the backup hooks of a module.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `backup` command.
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Installed module to back up.
    pub module: String,

    /// Backup name handed to the hooks.
    pub name: String,
}

/// Executes the `backup` command.
///
/// # Errors
///
/// Returns an error if the module is not installed.
pub fn execute(args: BackupArgs, ctx: Context) -> anyhow::Result<Report> {
    let controller = super::controller(ctx)?;
    Ok(controller.backup(&args.module, &args.name)?)
}
