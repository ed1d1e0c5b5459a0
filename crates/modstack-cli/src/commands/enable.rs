//! `modstack enable` — Add installed modules to the deployment.

use clap::Args;
use modstack_common::context::Context;
use modstack_runtime::report::Report;

/// Arguments for the `enable` command.
#[derive(Args, Debug)]
pub struct EnableArgs {
    /// Modules to enable.
    #[arg(required = true)]
    pub modules: Vec<String>,
}

/// Executes the `enable` command.
///
/// Recomposes the deployment descriptor, starts the new services in
/// order and runs the `enable` hooks.
///
/// # Errors
///
/// Returns an error if a module is not installed, the set does not
/// resolve, or a service never becomes ready.
pub fn execute(args: EnableArgs, ctx: Context) -> anyhow::Result<Report> {
    let mut controller = super::controller(ctx)?;
    Ok(controller.enable(&args.modules)?)
}
