//! `modstack upgrade` — Move installed modules to the catalog version.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `upgrade` command.
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Installed modules to upgrade.
    #[arg(required = true)]
    pub modules: Vec<String>,
}

/// Executes the `upgrade` command.
///
/// Modules already at the catalog version are left untouched.
///
/// # Errors
///
/// Returns an error if a module is not installed.
pub fn execute(args: UpgradeArgs, ctx: Context) -> anyhow::Result<Report> {
    let mut controller = super::controller(ctx)?;
    Ok(controller.upgrade(&args.modules)?)
}
