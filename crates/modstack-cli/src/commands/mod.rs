//! CLI command definitions and dispatch.

pub mod backup;
pub mod disable;
pub mod enable;
pub mod install;
pub mod plan;
pub mod restore;
pub mod start;
pub mod status;
pub mod stop;
pub mod uninstall;
pub mod update;
pub mod upgrade;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use modstack_common::config::Config;
use modstack_common::context::Context;
use modstack_common::types::Profile;
use modstack_runtime::lifecycle::LifecycleController;
use modstack_runtime::report::Report;

/// modstack — Module orchestration for container services.
#[derive(Parser, Debug)]
#[command(name = "modstack", version, about, long_about = None)]
pub struct Cli {
    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Project root holding `modules/` and `modstack.yml`.
    #[arg(long, global = true, env = "MODSTACK_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Execution profile (dev, staging, prod, backend, offline).
    #[arg(long, global = true, env = "MODSTACK_PROFILE")]
    pub profile: Option<Profile>,

    /// Keep exposed volumes unmapped on the host.
    #[arg(long, global = true)]
    pub no_exposed_volumes: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install modules and the modules they require.
    Install(install::InstallArgs),
    /// Remove disabled modules and their volume data.
    Uninstall(uninstall::UninstallArgs),
    /// Add installed modules to the deployment and start their services.
    Enable(enable::EnableArgs),
    /// Remove modules from the deployment.
    Disable(disable::DisableArgs),
    /// Pull and restart the services of enabled modules.
    Update(update::UpdateArgs),
    /// Move installed modules to the version found in the catalog.
    Upgrade(upgrade::UpgradeArgs),
    /// Run the backup hooks of a module.
    Backup(backup::BackupArgs),
    /// Run the restore hooks of a module.
    Restore(restore::RestoreArgs),
    /// Start the services of enabled modules.
    Start(start::StartArgs),
    /// Stop the services of enabled modules.
    Stop(stop::StopArgs),
    /// Show the resolution and composed services without applying them.
    Plan(plan::PlanArgs),
    /// Show module states, versions and service states.
    Status(status::StatusArgs),
}

/// Resolves the project root, configuration file and flags into a context.
///
/// # Errors
///
/// Returns an error if the root does not exist or `modstack.yml` is invalid.
pub fn build_context(global: &GlobalArgs) -> anyhow::Result<Context> {
    let root = global
        .root
        .canonicalize()
        .with_context(|| format!("project root {} not found", global.root.display()))?;
    let mut config = Config::load(&root)?;
    if let Some(profile) = global.profile {
        config.profile = profile;
    }
    config.no_exposed_volumes |= global.no_exposed_volumes;
    let ctx = Context::from_config(&root, config);
    tracing::debug!(root = %ctx.root.display(), profile = %ctx.profile, "context ready");
    Ok(ctx)
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command aborts.
pub fn execute(command: Command, ctx: Context) -> anyhow::Result<Report> {
    match command {
        Command::Install(args) => install::execute(args, ctx),
        Command::Uninstall(args) => uninstall::execute(args, ctx),
        Command::Enable(args) => enable::execute(args, ctx),
        Command::Disable(args) => disable::execute(args, ctx),
        Command::Update(args) => update::execute(args, ctx),
        Command::Upgrade(args) => upgrade::execute(args, ctx),
        Command::Backup(args) => backup::execute(args, ctx),
        Command::Restore(args) => restore::execute(args, ctx),
        Command::Start(args) => start::execute(args, ctx),
        Command::Stop(args) => stop::execute(args, ctx),
        Command::Plan(args) => plan::execute(args, &ctx),
        Command::Status(args) => status::execute(args, &ctx),
    }
}

/// Opens the lifecycle controller for a mutating command.
fn controller(ctx: Context) -> anyhow::Result<LifecycleController> {
    Ok(LifecycleController::open(ctx)?)
}
