//! Single-instance lifecycle lock.
//!
//! `<state_dir>/modstack.lock` holds the pid of the running orchestration.
//! A lock whose pid is no longer alive is reclaimed.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use modstack_common::error::{ModstackError, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LifecycleLock {
    path: PathBuf,
}

impl LifecycleLock {
    /// Acquires the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::LockHeld`] if a live process holds it, or an
    /// I/O error if the file cannot be created.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModstackError::io(parent, e))?;
        }

        for _ in 0..2 {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .map_err(|e| ModstackError::io(path, e))?;
                    tracing::debug!(path = %path.display(), "acquired lifecycle lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = read_pid(path);
                    match holder {
                        Some(pid) if is_alive(pid) => {
                            return Err(ModstackError::LockHeld {
                                path: path.to_path_buf(),
                                pid,
                            });
                        }
                        _ => {
                            tracing::warn!(path = %path.display(), pid = ?holder, "reclaiming stale lifecycle lock");
                            std::fs::remove_file(path).map_err(|e| ModstackError::io(path, e))?;
                        }
                    }
                }
                Err(e) => return Err(ModstackError::io(path, e)),
            }
        }

        Err(ModstackError::LockHeld {
            path: path.to_path_buf(),
            pid: read_pid(path).unwrap_or_default(),
        })
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LifecycleLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lifecycle lock");
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // EPERM: the process exists but belongs to another user.
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}
