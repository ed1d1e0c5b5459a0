//! Per-module hook logs.
//!
//! Hook output is appended to `<state_dir>/logs/<module>.log`, one header
//! line per hook run followed by the captured streams.

use std::io::Write;
use std::path::{Path, PathBuf};

use modstack_common::error::{ModstackError, Result};

use crate::process::ProcessOutput;

/// Returns the hook log path for a module.
#[must_use]
pub fn log_path(logs_dir: &Path, module: &str) -> PathBuf {
    logs_dir.join(format!("{module}.log"))
}

/// Reads a module's hook log; a module whose hooks never ran has an empty
/// log.
///
/// # Errors
///
/// Returns an error if the log exists but is unreadable.
pub fn read_log(logs_dir: &Path, module: &str) -> Result<String> {
    let path = log_path(logs_dir, module);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ModstackError::io(path, e)),
    }
}

/// Appends raw text to a module's hook log, creating `logs_dir` on first
/// use.
///
/// # Errors
///
/// Returns an error on any filesystem failure.
pub fn append_log(logs_dir: &Path, module: &str, text: &str) -> Result<()> {
    std::fs::create_dir_all(logs_dir).map_err(|e| ModstackError::io(logs_dir, e))?;
    let path = log_path(logs_dir, module);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(text.as_bytes()))
        .map_err(|e| ModstackError::io(&path, e))
}

/// Appends one hook run: a timestamped header and both output streams.
///
/// # Errors
///
/// Returns an error if the log cannot be written.
pub fn record_hook(logs_dir: &Path, module: &str, hook: &str, output: &ProcessOutput) -> Result<()> {
    let mut entry = format!(
        "==> {} {hook} ({})\n",
        chrono::Utc::now().to_rfc3339(),
        output.status
    );
    for stream in [&output.stdout, &output.stderr] {
        if !stream.is_empty() {
            entry.push_str(stream);
            if !stream.ends_with('\n') {
                entry.push('\n');
            }
        }
    }
    append_log(logs_dir, module, &entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExitStatus;

    #[test]
    fn one_log_file_per_module() {
        let p = log_path(Path::new("/srv/app/.modstack/logs"), "web");
        assert_eq!(p, Path::new("/srv/app/.modstack/logs/web.log"));
    }

    #[test]
    fn module_without_hook_runs_has_empty_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_log(dir.path(), "cache").expect("read"), "");
    }

    #[test]
    fn first_append_creates_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("state").join("logs");
        append_log(&nested, "web", "hello\n").expect("append");
        assert_eq!(read_log(&nested, "web").expect("read"), "hello\n");
    }

    #[test]
    fn record_hook_writes_header_and_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = ProcessOutput {
            stdout: "configured".into(),
            stderr: "warning: slow disk\n".into(),
            status: ExitStatus::Exited(1),
        };
        record_hook(dir.path(), "web", "enable.sh", &output).expect("record");
        record_hook(dir.path(), "web", "start.sh", &ProcessOutput::ok("")).expect("record");

        let content = read_log(dir.path(), "web").expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("==> ") && lines[0].ends_with("enable.sh (exit code 1)"));
        assert_eq!(lines[1], "configured");
        assert_eq!(lines[2], "warning: slow disk");
        assert!(lines[3].ends_with("start.sh (exit code 0)"));
    }

    #[test]
    fn hooks_of_other_modules_stay_out_of_the_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        record_hook(dir.path(), "db", "init.sh", &ProcessOutput::ok("db ready")).expect("db");
        record_hook(dir.path(), "web", "init.sh", &ProcessOutput::ok("web ready")).expect("web");

        let db = read_log(dir.path(), "db").expect("read db");
        assert!(db.contains("db ready"));
        assert!(!db.contains("web ready"));
    }
}
