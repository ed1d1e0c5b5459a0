//! Hook discovery and classification.
//!
//! `<module>/hooks/<event>.<ext>` runs on the host, `<event>_<service>.<ext>`
//! runs inside the named service container.

use std::fmt;
use std::path::{Path, PathBuf};

use modstack_common::error::{ModstackError, Result};
use modstack_common::types::is_valid_service_name;

/// Lifecycle event a hook reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookEvent {
    /// First installation of the module.
    Init,
    /// Module enabled.
    Enable,
    /// Module disabled.
    Disable,
    /// Module data about to be removed.
    Uninstall,
    /// Version upgrade, receives the old and new versions.
    Upgrade,
    /// Services recreated from the current descriptor.
    Update,
    /// Backup requested.
    Backup,
    /// Restore of a named backup requested.
    Restore,
    /// Services started.
    Start,
    /// Services stopped.
    Stop,
    /// State probe, prints the container state of a service.
    State,
}

impl HookEvent {
    /// Every event.
    pub const ALL: [Self; 11] = [
        Self::Init,
        Self::Enable,
        Self::Disable,
        Self::Uninstall,
        Self::Upgrade,
        Self::Update,
        Self::Backup,
        Self::Restore,
        Self::Start,
        Self::Stop,
        Self::State,
    ];

    /// File name prefix of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Update => "update",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::State => "state",
        }
    }

    /// Looks an event up by its file name prefix.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a hook runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Runs on the host.
    Local {
        /// Triggering event.
        event: HookEvent,
    },
    /// Runs inside a service container.
    Container {
        /// Triggering event.
        event: HookEvent,
        /// Target service.
        service: String,
    },
}

impl Hook {
    /// Triggering event.
    #[must_use]
    pub const fn event(&self) -> HookEvent {
        match self {
            Self::Local { event } | Self::Container { event, .. } => *event,
        }
    }
}

/// A classified hook script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFile {
    /// Classification.
    pub hook: Hook,
    /// Script path.
    pub path: PathBuf,
    /// File extension without the dot, empty when absent.
    pub extension: String,
}

impl HookFile {
    /// File name used in logs and errors.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of classifying one file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A recognized hook.
    Hook(Hook),
    /// A name that does not follow the hook convention.
    Ignored(String),
}

/// Classifies a hook file name.
#[must_use]
pub fn classify(file_name: &str) -> Classified {
    let stem = file_name.split_once('.').map_or(file_name, |(stem, _)| stem);
    let (event_name, service) = match stem.split_once('_') {
        Some((event, service)) => (event, Some(service)),
        None => (stem, None),
    };
    let Some(event) = HookEvent::from_name(event_name) else {
        return Classified::Ignored(format!("unknown hook event \"{event_name}\""));
    };
    match service {
        None => Classified::Hook(Hook::Local { event }),
        Some(service) if is_valid_service_name(service) => Classified::Hook(Hook::Container {
            event,
            service: service.to_string(),
        }),
        Some(service) => Classified::Ignored(format!("invalid service name \"{service}\"")),
    }
}

/// Hooks of one module, in file name order.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<HookFile>,
}

impl HookRegistry {
    /// Scans `dir`. A missing directory yields an empty registry.
    ///
    /// Unrecognized files are skipped with a warning, as are repeated
    /// classifications (`enable.sh` next to `enable.py`): the first file in
    /// name order wins.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory exists but cannot be read.
    pub fn scan(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Ok(Self::default());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| ModstackError::io(dir, e))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut hooks: Vec<HookFile> = Vec::new();
        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if file_name.starts_with('.') {
                continue;
            }
            match classify(&file_name) {
                Classified::Ignored(reason) => {
                    tracing::warn!(hook = %path.display(), %reason, "ignoring hook file");
                }
                Classified::Hook(hook) => {
                    if let Some(first) = hooks.iter().find(|h| h.hook == hook) {
                        tracing::warn!(
                            hook = %path.display(),
                            kept = %first.path.display(),
                            "duplicate hook, keeping the first"
                        );
                        continue;
                    }
                    let extension = path
                        .extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    hooks.push(HookFile {
                        hook,
                        path,
                        extension,
                    });
                }
            }
        }
        Ok(Self { hooks })
    }

    /// The local hook for `event`, if any.
    #[must_use]
    pub fn local(&self, event: HookEvent) -> Option<&HookFile> {
        self.hooks
            .iter()
            .find(|h| h.hook == Hook::Local { event })
    }

    /// Container hooks for `event`, in file name order.
    pub fn container(&self, event: HookEvent) -> impl Iterator<Item = &HookFile> {
        self.hooks.iter().filter(move |h| {
            matches!(&h.hook, Hook::Container { event: e, .. } if *e == event)
        })
    }

    /// Every hook.
    #[must_use]
    pub fn all(&self) -> &[HookFile] {
        &self.hooks
    }

    /// Returns whether no hook was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
