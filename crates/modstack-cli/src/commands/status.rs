//! `modstack status` — Show module states, versions and service states.

use std::sync::Arc;

use clap::Args;
use modstack_common::context::Context;
use modstack_compose::registry::Registry;
use modstack_runtime::backend;
use modstack_runtime::inspect;
use modstack_runtime::process::{ProcessRunner, SystemRunner};
use modstack_runtime::report::Report;
use modstack_runtime::state;

use crate::output;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show modules that are not installed as well.
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if the catalog or state index cannot be read or the
/// container runtime is missing.
pub fn execute(args: StatusArgs, ctx: &Context) -> anyhow::Result<Report> {
    let registry = Registry::load(&ctx.modules_dir)?;
    let state = state::load_state(&ctx.state_file())?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
    let runtime = backend::detect_runtime(ctx, Arc::clone(&runner))?;

    let lines = inspect::status(ctx, &registry, &state, runner.as_ref(), runtime.as_ref());
    output::print_status(&lines, args.all);
    Ok(Report {
        warnings: Vec::new(),
        invalid_modules: registry.invalid().iter().map(ToString::to_string).collect(),
    })
}
