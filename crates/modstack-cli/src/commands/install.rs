//! `modstack install` — Install modules and the modules they require.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `install` command.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Modules to install.
    #[arg(required = true)]
    pub modules: Vec<String>,

    /// Enable the modules once installed.
    #[arg(short, long)]
    pub enable: bool,
}

/// Executes the `install` command.
///
/// Runs the `init` hook of every module of the closure that is not yet
/// installed, in dependency order.
///
/// # Errors
///
/// Returns an error if a module is unknown or the set does not resolve.
pub fn execute(args: InstallArgs, ctx: Context) -> anyhow::Result<Report> {
    let mut controller = super::controller(ctx)?;
    Ok(controller.install(&args.modules, args.enable)?)
}
