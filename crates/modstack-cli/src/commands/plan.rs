//! `modstack plan` — Show what enabling modules would produce.

use clap::Args;
use modstack_common::context::Context;
use modstack_compose::registry::Registry;
use modstack_runtime::inspect;
use modstack_runtime::report::Report;
use modstack_runtime::state;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Modules to add to the enabled set. If empty, plans the current set.
    pub modules: Vec<String>,

    /// Print the composed deployment descriptor as well.
    #[arg(long)]
    pub render: bool,
}

/// Executes the `plan` command.
///
/// Resolves the enabled modules plus the requested ones against the whole
/// catalog and prints the module order, the service startup order and the
/// services of each profile. Nothing is written.
///
/// # Errors
///
/// Returns the resolution or composition error the request would hit.
pub fn execute(args: PlanArgs, ctx: &Context) -> anyhow::Result<Report> {
    let registry = Registry::load(&ctx.modules_dir)?;
    let state = state::load_state(&ctx.state_file())?;
    let plan = inspect::plan(ctx, &registry, &state, &args.modules)?;

    output::print_plan(&plan, ctx.profile);
    if args.render {
        output::print_descriptor(&plan.descriptor.render()?);
    }
    Ok(Report {
        warnings: Vec::new(),
        invalid_modules: registry.invalid().iter().map(ToString::to_string).collect(),
    })
}
