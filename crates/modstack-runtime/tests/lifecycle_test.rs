//! Lifecycle scenarios over real module trees.
//!
//! Each test lays out a project in a temporary directory with `sh` hooks
//! that append to a trace file, and drives the controller against a
//! recording in-memory container runtime.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use modstack_common::config::Config;
use modstack_common::context::Context;
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::{ContainerStatus, LifecycleState};
use modstack_runtime::backend::ContainerRuntime;
use modstack_runtime::lifecycle::LifecycleController;
use modstack_runtime::process::{ProcessOutput, ProcessRunner, SystemRunner};

// ── Fixtures ─────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeRuntime {
    calls: Arc<Mutex<Vec<String>>>,
    running: Arc<Mutex<BTreeSet<String>>>,
    stuck: Arc<Mutex<bool>>,
}

impl FakeRuntime {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ContainerRuntime for FakeRuntime {
    fn up(&self, services: &[String]) -> Result<()> {
        self.record(format!("up {}", services.join(" ")));
        if !*self.stuck.lock().unwrap() {
            self.running.lock().unwrap().extend(services.iter().cloned());
        }
        Ok(())
    }

    fn stop(&self, services: &[String]) -> Result<()> {
        self.record(format!("stop {}", services.join(" ")));
        let mut running = self.running.lock().unwrap();
        for service in services {
            let _ = running.remove(service);
        }
        Ok(())
    }

    fn remove(&self, services: &[String]) -> Result<()> {
        self.record(format!("rm {}", services.join(" ")));
        let mut running = self.running.lock().unwrap();
        for service in services {
            let _ = running.remove(service);
        }
        Ok(())
    }

    fn pull(&self, services: &[String]) -> Result<()> {
        self.record(format!("pull {}", services.join(" ")));
        Ok(())
    }

    fn remove_volume(&self, volume: &str) -> Result<()> {
        self.record(format!("volume-rm {volume}"));
        Ok(())
    }

    fn exec(
        &self,
        service: &str,
        argv: &[String],
        _env: &[(String, String)],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput> {
        let script = String::from_utf8_lossy(stdin.unwrap_or_default()).into_owned();
        self.record(format!("exec {service} {} <<{}", argv.join(" "), script.trim()));
        Ok(ProcessOutput::ok(""))
    }

    fn status(&self, service: &str) -> Result<ContainerStatus> {
        if self.running.lock().unwrap().contains(service) {
            Ok(ContainerStatus::Running)
        } else if *self.stuck.lock().unwrap() {
            Ok(ContainerStatus::Created)
        } else {
            Ok(ContainerStatus::Exited)
        }
    }

    fn running_services(&self) -> Result<Vec<String>> {
        Ok(self.running.lock().unwrap().iter().cloned().collect())
    }
}

struct Project {
    dir: tempfile::TempDir,
    runtime: FakeRuntime,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            runtime: FakeRuntime::default(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn trace_path(&self) -> PathBuf {
        self.root().join("trace.log")
    }

    fn trace(&self) -> Vec<String> {
        std::fs::read_to_string(self.trace_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Writes `modules/<name>` with one base fragment per service.
    fn module(&self, name: &str, descriptor: &str, services: &[&str]) {
        self.write(&format!("modules/{name}/module.yml"), descriptor);
        for service in services {
            self.write(
                &format!("modules/{name}/services/{service}.yml"),
                "# v1.0\nimage: busybox\n",
            );
        }
    }

    /// Writes a hook that appends `<module> <hook> <args>` to the trace.
    fn tracing_hook(&self, module: &str, file: &str) {
        let label = file.split('.').next().unwrap();
        self.write(
            &format!("modules/{module}/hooks/{file}"),
            &format!(
                "echo \"{module} {label} $*\" >> '{}'\n",
                self.trace_path().display()
            ),
        );
    }

    fn context(&self) -> Context {
        let mut config = Config::default();
        config.readiness.interval_ms = 1;
        config.readiness.max_attempts = 3;
        Context::from_config(self.root(), config)
    }

    fn controller(&self) -> LifecycleController {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        LifecycleController::with_runtime(self.context(), runner, Box::new(self.runtime.clone()))
            .expect("controller")
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// `db` provides a database; `web` requires it and reacts to it.
fn web_and_db() -> Project {
    let project = Project::new();
    project.module(
        "db",
        "# v1.0\nname: Database\nversion: \"1.0\"\nservices:\n  db-postgres: {}\nvolumes:\n  db-data:\n    type: exposed\n    mapping: db/data\n",
        &["db-postgres"],
    );
    project.module(
        "web",
        "# v1.0\nname: Web\nversion: \"1.0\"\nservices:\n  web-nginx: {}\ndependencies:\n  services:\n    - REQUIRES db >= 1.0\n",
        &["web-nginx"],
    );
    for module in ["db", "web"] {
        for hook in ["init.sh", "enable.sh", "disable.sh", "uninstall.sh"] {
            project.tracing_hook(module, hook);
        }
    }
    project.write(
        "modules/web/hooks/enable_db-postgres.sh",
        "createdb web\n",
    );
    project
}

// ── Install / enable ─────────────────────────────────────────────────

#[test]
fn install_and_enable_follow_dependency_order() {
    let project = web_and_db();
    let mut controller = project.controller();

    let report = controller.install(&names(&["web"]), true).expect("install");
    assert!(!report.is_degraded(), "{:?}", report.warnings);

    assert_eq!(
        project.trace(),
        ["db init ", "web init ", "db enable ", "web enable "]
    );
    let calls = project.runtime.calls();
    let up_db = calls.iter().position(|c| c == "up db-postgres").expect("db up");
    let up_web = calls.iter().position(|c| c == "up web-nginx").expect("web up");
    assert!(up_db < up_web);

    let exec: Vec<&String> = calls.iter().filter(|c| c.starts_with("exec")).collect();
    assert_eq!(exec.len(), 1, "{calls:?}");
    assert_eq!(exec[0], "exec db-postgres sh -s -- <<createdb web");

    assert_eq!(controller.state().lifecycle("db"), LifecycleState::Enabled);
    assert_eq!(controller.state().lifecycle("web"), LifecycleState::Enabled);
    let compose = std::fs::read_to_string(project.root().join("docker-compose.yml"))
        .expect("descriptor");
    assert!(compose.contains("db-postgres:"));
    assert!(compose.contains("web-nginx:"));
}

#[test]
fn missing_requirement_aborts_before_any_hook() {
    let project = Project::new();
    project.module(
        "web",
        "# v1.0\nname: Web\nversion: \"1.0\"\nservices:\n  web-nginx: {}\ndependencies:\n  services:\n    - REQUIRES cache >= 1.0\n",
        &["web-nginx"],
    );
    project.tracing_hook("web", "init.sh");
    let mut controller = project.controller();

    let err = controller.install(&names(&["web"]), true).unwrap_err();
    assert!(
        matches!(err, ModstackError::UnsatisfiedDependency { ref missing, .. } if missing == "cache"),
        "{err}"
    );
    assert!(err.is_fatal());
    assert!(project.trace().is_empty());
    assert!(project.runtime.calls().is_empty());
    assert_eq!(controller.state().lifecycle("web"), LifecycleState::Absent);
}

#[test]
fn enable_requires_installation() {
    let project = web_and_db();
    let mut controller = project.controller();
    let err = controller.enable(&names(&["db"])).unwrap_err();
    assert!(matches!(err, ModstackError::InvalidTransition { command: "enable", .. }));
}

#[test]
fn failing_hook_degrades_but_continues() {
    let project = web_and_db();
    project.write(
        "modules/db/hooks/enable.sh",
        "echo 'cannot reach registry' >&2\nexit 3\n",
    );
    let mut controller = project.controller();

    let report = controller.install(&names(&["web"]), true).expect("install");
    assert!(report.is_degraded());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("enable.sh"));
    assert!(report.warnings[0].contains("cannot reach registry"));
    assert!(project.trace().contains(&"web enable ".to_string()));
    assert_eq!(controller.state().lifecycle("db"), LifecycleState::Enabled);

    let log = std::fs::read_to_string(project.root().join(".modstack/logs/db.log"))
        .expect("hook log");
    assert!(log.contains("enable.sh (exit code 3)"));
}

#[test]
fn readiness_timeout_is_fatal() {
    let project = web_and_db();
    *project.runtime.stuck.lock().unwrap() = true;
    let mut controller = project.controller();

    let err = controller.install(&names(&["db"]), true).unwrap_err();
    match err {
        ModstackError::ReadinessTimeout {
            service,
            attempts,
            last_state,
        } => {
            assert_eq!(service, "db-postgres");
            assert_eq!(attempts, 3);
            assert_eq!(last_state, "created");
        }
        other => panic!("expected readiness timeout, got {other}"),
    }
    assert!(!project.trace().contains(&"db enable ".to_string()));
}

#[test]
fn or_requirement_is_met_by_installed_branch() {
    let project = Project::new();
    project.module(
        "app",
        "# v1.0\nname: App\nversion: \"1.0\"\ndependencies:\n  services:\n    - mysql OR postgres\n",
        &[],
    );
    project.module("mysql", "# v1.0\nname: MySQL\nversion: \"8.0\"\n", &[]);
    project.module("postgres", "# v1.0\nname: Postgres\nversion: \"16.0\"\n", &[]);
    for module in ["app", "mysql", "postgres"] {
        project.tracing_hook(module, "init.sh");
    }
    let mut controller = project.controller();
    let _ = controller.install(&names(&["postgres"]), true).expect("postgres");

    let report = controller.install(&names(&["app"]), false).expect("app");
    assert!(!report.is_degraded(), "{:?}", report.warnings);
    assert_eq!(project.trace(), ["postgres init ", "app init "]);
    assert_eq!(controller.state().lifecycle("mysql"), LifecycleState::Absent);
    assert_eq!(controller.state().lifecycle("app"), LifecycleState::InstalledDisabled);
}

#[test]
fn state_hook_decides_readiness() {
    let project = web_and_db();
    *project.runtime.stuck.lock().unwrap() = true;
    project.write(
        "modules/db/hooks/state.sh",
        &format!(
            "echo \"db state $*\" >> '{}'\necho running\n",
            project.trace_path().display()
        ),
    );
    let mut controller = project.controller();

    let _ = controller.install(&names(&["db"]), true).expect("install");
    assert_eq!(controller.state().lifecycle("db"), LifecycleState::Enabled);
    assert!(project.trace().contains(&"db state db-postgres".to_string()));
}

// ── Disable / uninstall ──────────────────────────────────────────────

#[test]
fn dependents_block_disable() {
    let project = web_and_db();
    let mut controller = project.controller();
    let _ = controller.install(&names(&["web"]), true).expect("install");

    let err = controller.disable(&names(&["db"])).unwrap_err();
    assert!(matches!(err, ModstackError::UnsatisfiedDependency { .. }), "{err}");
    assert_eq!(controller.state().lifecycle("db"), LifecycleState::Enabled);
}

#[test]
fn disable_then_uninstall_removes_volume_data() {
    let project = web_and_db();
    let mut controller = project.controller();
    let _ = controller.install(&names(&["web"]), true).expect("install");
    project.write("volumes/db/data/PG_VERSION", "16\n");

    let _ = controller.disable(&names(&["web", "db"])).expect("disable");
    assert_eq!(controller.state().lifecycle("web"), LifecycleState::InstalledDisabled);
    let trace = project.trace();
    let web_disable = trace.iter().position(|l| l == "web disable ").expect("web");
    let db_disable = trace.iter().position(|l| l == "db disable ").expect("db");
    assert!(web_disable < db_disable, "{trace:?}");
    assert!(project.runtime.calls().contains(&"rm web-nginx db-postgres".to_string()));

    let _ = controller.uninstall(&names(&["web"])).expect("uninstall web");
    let _ = controller.uninstall(&names(&["db"])).expect("uninstall");
    assert_eq!(controller.state().lifecycle("db"), LifecycleState::Absent);
    assert!(!project.root().join("volumes/db/data").exists());
    assert!(project.runtime.calls().contains(&"volume-rm db-data".to_string()));
    assert!(project.trace().contains(&"db uninstall ".to_string()));
}

#[test]
fn uninstall_requires_disabled_module() {
    let project = web_and_db();
    let mut controller = project.controller();
    let _ = controller.install(&names(&["db"]), true).expect("install");

    let err = controller.uninstall(&names(&["db"])).unwrap_err();
    assert!(matches!(err, ModstackError::InvalidTransition { command: "uninstall", .. }));
    assert!(!project.trace().contains(&"db uninstall ".to_string()));
}

#[test]
fn uninstall_runs_with_services_stopped() {
    let project = web_and_db();
    project.module(
        "cache",
        "# v1.0\nname: Cache\nversion: \"1.0\"\nservices:\n  cache-redis: {}\n",
        &["cache-redis"],
    );
    project.tracing_hook("cache", "uninstall.sh");
    let mut controller = project.controller();
    let _ = controller.install(&names(&["web"]), true).expect("install web");
    let _ = controller.install(&names(&["cache"]), false).expect("install cache");

    let _ = controller.uninstall(&names(&["cache"])).expect("uninstall");
    assert!(project.trace().contains(&"cache uninstall ".to_string()));
    let calls = project.runtime.calls();
    let tail: Vec<&str> = calls.iter().rev().take(4).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        ["stop web-nginx", "stop db-postgres", "up db-postgres", "up web-nginx"]
    );
    assert_eq!(controller.state().lifecycle("cache"), LifecycleState::Absent);
    assert_eq!(controller.state().lifecycle("web"), LifecycleState::Enabled);
}

// ── Upgrade / backup / start-stop ────────────────────────────────────

#[test]
fn upgrade_is_gated_by_version() {
    let project = web_and_db();
    project.tracing_hook("db", "upgrade.sh");
    {
        let mut controller = project.controller();
        let _ = controller.install(&names(&["db"]), false).expect("install");
        let _ = controller.upgrade(&names(&["db"])).expect("noop upgrade");
    }
    assert!(!project.trace().iter().any(|l| l.starts_with("db upgrade")));

    project.write(
        "modules/db/module.yml",
        "# v1.0\nname: Database\nversion: \"1.1\"\nservices:\n  db-postgres: {}\n",
    );
    let mut controller = project.controller();
    let _ = controller.upgrade(&names(&["db"])).expect("upgrade");
    assert!(project.trace().contains(&"db upgrade 1.0 1.1".to_string()));
    assert_eq!(controller.state().version("db"), Some("1.1"));
}

#[test]
fn backup_passes_the_backup_name() {
    let project = web_and_db();
    project.tracing_hook("db", "backup.sh");
    let mut controller = project.controller();
    let _ = controller.install(&names(&["db"]), false).expect("install");

    let report = controller.backup("db", "nightly").expect("backup");
    assert!(!report.is_degraded());
    assert!(project.trace().contains(&"db backup nightly".to_string()));
    assert_eq!(controller.state().lifecycle("db"), LifecycleState::InstalledDisabled);
}

#[test]
fn stop_reverses_start_order() {
    let project = web_and_db();
    let mut controller = project.controller();
    let _ = controller.install(&names(&["web"]), true).expect("install");

    let _ = controller.stop(&[]).expect("stop");
    let _ = controller.start(&[]).expect("start");
    let calls = project.runtime.calls();
    let tail: Vec<&str> = calls.iter().rev().take(4).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        ["stop web-nginx", "stop db-postgres", "up db-postgres", "up web-nginx"]
    );
}

#[test]
fn second_controller_is_locked_out() {
    let project = web_and_db();
    let _first = project.controller();
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
    let err = LifecycleController::with_runtime(
        project.context(),
        runner,
        Box::new(project.runtime.clone()),
    )
    .unwrap_err();
    assert!(matches!(err, ModstackError::LockHeld { .. }));
}

// ── Update / restore / container hooks ──────────────────────────────

#[test]
fn update_fires_hooks_of_modules_reacting_to_it() {
    let project = web_and_db();
    project.write("modules/web/hooks/update_db-postgres.sh", "vacuum web\n");
    let mut controller = project.controller();
    let _ = controller.install(&names(&["web"]), true).expect("install");

    let report = controller.update(&names(&["db"])).expect("update");
    assert!(!report.is_degraded(), "{:?}", report.warnings);
    let calls = project.runtime.calls();
    assert!(calls.contains(&"pull db-postgres".to_string()), "{calls:?}");
    let vacuum: Vec<&String> = calls.iter().filter(|c| c.contains("vacuum")).collect();
    assert_eq!(vacuum, ["exec db-postgres sh -s -- <<vacuum web"]);
}

#[test]
fn inactive_module_does_not_react() {
    let project = web_and_db();
    project.write("modules/web/hooks/update_db-postgres.sh", "vacuum web\n");
    let mut controller = project.controller();
    let _ = controller.install(&names(&["web"]), false).expect("install");
    let _ = controller.enable(&names(&["db"])).expect("enable db");

    let _ = controller.update(&names(&["db"])).expect("update");
    let calls = project.runtime.calls();
    assert!(calls.contains(&"up db-postgres".to_string()));
    assert!(!calls.iter().any(|c| c.contains("vacuum")), "{calls:?}");
}

#[test]
fn update_requires_enabled_module() {
    let project = web_and_db();
    let mut controller = project.controller();
    let _ = controller.install(&names(&["db"]), false).expect("install");
    let err = controller.update(&names(&["db"])).unwrap_err();
    assert!(matches!(err, ModstackError::InvalidTransition { command: "update", .. }));
}

#[test]
fn restore_runs_in_container_when_state_is_unknown() {
    let project = web_and_db();
    project.tracing_hook("db", "restore.sh");
    project.write("modules/db/hooks/restore_db-postgres.sh", "pg_restore\n");
    {
        let mut controller = project.controller();
        let _ = controller.install(&names(&["db"]), true).expect("install");
    }
    project.write("modules/db/hooks/state.sh", "exit 1\n");
    let controller = project.controller();

    let report = controller.restore("db", "nightly").expect("restore");
    assert!(!report.is_degraded(), "{:?}", report.warnings);
    assert!(project.trace().contains(&"db restore nightly".to_string()));
    assert!(
        project
            .runtime
            .calls()
            .contains(&"exec db-postgres sh -s -- nightly <<pg_restore".to_string())
    );
}

#[test]
fn container_hook_skips_stopped_service() {
    let project = web_and_db();
    project.write("modules/db/hooks/restore_db-postgres.sh", "pg_restore\n");
    let mut controller = project.controller();
    let _ = controller.install(&names(&["db"]), true).expect("install");
    project.runtime.running.lock().unwrap().clear();

    let report = controller.restore("db", "nightly").expect("restore");
    assert!(report.is_degraded());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("skipping hook restore_db-postgres.sh"));
    assert!(report.warnings[0].contains("exited"));
    assert!(!project.runtime.calls().iter().any(|c| c.starts_with("exec")));
}
