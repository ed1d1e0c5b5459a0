//! Formatted output helpers for CLI commands.
//!
//! Renderers build plain strings so they can be tested; the `print_*`
//! wrappers write them to stdout, or stderr for diagnostics.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Write as _;

use modstack_common::types::{ContainerStatus, LifecycleState, Profile};
use modstack_runtime::inspect::{ModuleStatus, Plan};
use modstack_runtime::report::Report;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prints invalid modules and warnings of a finished command.
pub fn print_report(report: &Report) {
    let text = render_report(report);
    if !text.is_empty() {
        eprint!("{text}");
    }
}

/// Prints a fatal error with its cause chain.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{RED}error:{RESET} {err:#}");
}

/// Prints a resolution plan.
pub fn print_plan(plan: &Plan, profile: Profile) {
    print!("{}", render_plan(plan, profile));
}

/// Prints a rendered deployment descriptor.
pub fn print_descriptor(yaml: &str) {
    println!();
    print!("{yaml}");
}

/// Prints the status table.
pub fn print_status(lines: &[ModuleStatus], all: bool) {
    print!("{}", render_status(lines, all));
}

/// Renders the non-fatal outcome of a command.
#[must_use]
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    for module in &report.invalid_modules {
        let _ = writeln!(out, "{YELLOW}skipped:{RESET} {module}");
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "{YELLOW}warning:{RESET} {warning}");
    }
    if report.is_degraded() {
        let _ = writeln!(
            out,
            "{YELLOW}completed with {} warning(s){RESET}",
            report.warnings.len()
        );
    }
    out
}

/// Renders module order, startup order and the profile map.
#[must_use]
pub fn render_plan(plan: &Plan, profile: Profile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BOLD}Plan for profile {profile}{RESET}");
    let _ = writeln!(out);

    let _ = writeln!(out, "  Modules:");
    if plan.resolution.modules.is_empty() {
        let _ = writeln!(out, "    {DIM}(none){RESET}");
    }
    for (i, module) in plan.resolution.modules.iter().enumerate() {
        let _ = writeln!(out, "    {}. {module}", i + 1);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  Services (startup order):");
    for service in plan.descriptor.service_names() {
        let _ = writeln!(out, "    + {service}");
    }
    let _ = writeln!(
        out,
        "  {} service(s), {} volume(s)",
        plan.descriptor.services.len(),
        plan.descriptor.volumes.len()
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "  Profiles:");
    for (p, services) in &plan.descriptor.profiles {
        let marker = if *p == profile { "*" } else { " " };
        let list = if services.is_empty() {
            "-".to_string()
        } else {
            services.join(", ")
        };
        let _ = writeln!(out, "   {marker}{:<9} {list}", p.as_str());
    }
    out
}

/// Renders one row per module, followed by its services.
#[must_use]
pub fn render_status(lines: &[ModuleStatus], all: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<20} {:<12} {:<12}",
        "MODULE", "STATE", "INSTALLED", "AVAILABLE"
    );
    for line in lines
        .iter()
        .filter(|l| all || l.lifecycle != LifecycleState::Absent)
    {
        let drift = if line.has_drift() {
            format!(" {YELLOW}(upgrade available){RESET}")
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{:<20} {:<20} {:<12} {:<12}{drift}",
            line.name,
            line.lifecycle.to_string(),
            line.installed.as_deref().unwrap_or("-"),
            line.available,
        );
        for (service, state) in &line.services {
            let _ = writeln!(out, "  {service:<18} {}", colored_state(*state));
        }
    }
    out
}

fn colored_state(state: ContainerStatus) -> String {
    let color = match state {
        ContainerStatus::Running => GREEN,
        ContainerStatus::Unknown => DIM,
        ContainerStatus::Created | ContainerStatus::Restarting | ContainerStatus::Paused => YELLOW,
        ContainerStatus::Exited | ContainerStatus::Dead => RED,
    };
    format!("{color}{state}{RESET}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, lifecycle: LifecycleState, installed: Option<&str>) -> ModuleStatus {
        ModuleStatus {
            name: name.into(),
            lifecycle,
            installed: installed.map(str::to_string),
            available: "1.1".into(),
            services: vec![("web-nginx".into(), ContainerStatus::Running)],
        }
    }

    #[test]
    fn clean_report_renders_nothing() {
        assert!(render_report(&Report::default()).is_empty());
    }

    #[test]
    fn degraded_report_lists_every_warning() {
        let mut report = Report::default();
        report.warnings.push("hook enable.sh of module db failed".into());
        report.invalid_modules.push("invalid module broken: no marker".into());
        let text = render_report(&report);
        assert!(text.contains("enable.sh"));
        assert!(text.contains("broken"));
        assert!(text.contains("1 warning(s)"));
    }

    #[test]
    fn plan_marks_the_selected_profile() {
        use modstack_compose::compositor::DeploymentDescriptor;
        use modstack_compose::resolver::Resolution;

        let plan = Plan {
            resolution: Resolution {
                modules: vec!["db".into(), "web".into()],
                services: vec!["db-postgres".into(), "web-nginx".into()],
            },
            descriptor: DeploymentDescriptor {
                services: vec![
                    ("db-postgres".into(), serde_yaml::Value::Null),
                    ("web-nginx".into(), serde_yaml::Value::Null),
                ],
                volumes: Vec::new(),
                profiles: [
                    (Profile::Dev, vec!["db-postgres".into(), "web-nginx".into()]),
                    (Profile::Prod, Vec::new()),
                ]
                .into_iter()
                .collect(),
            },
        };
        let text = render_plan(&plan, Profile::Dev);
        assert!(text.contains("1. db"));
        assert!(text.contains("2. web"));
        assert!(text.contains("2 service(s), 0 volume(s)"));
        assert!(text.contains("*dev       db-postgres, web-nginx"));
        assert!(text.contains(" prod      -"));
    }

    #[test]
    fn status_hides_absent_modules_unless_asked() {
        let lines = [
            status("web", LifecycleState::Enabled, Some("1.0")),
            status("cache", LifecycleState::Absent, None),
        ];
        let text = render_status(&lines, false);
        assert!(text.contains("web"));
        assert!(text.contains("upgrade available"));
        assert!(text.contains("web-nginx"));
        assert!(!text.contains("cache"));
        assert!(render_status(&lines, true).contains("cache"));
    }
}
