//! Unified error types for the modstack workspace.
//!
//! Resolution-stage errors abort the whole operation. Module-scoped errors
//! ([`ModstackError::InvalidModule`], [`ModstackError::HookFailure`]) are
//! collected as warnings instead; see [`ModstackError::is_fatal`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ModstackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A YAML document could not be parsed or rendered.
    #[error("YAML error in {path}: {source}")]
    Yaml {
        /// File the document came from.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A version string does not match `major[.minor][stability]`.
    #[error("invalid version \"{input}\"")]
    InvalidVersion {
        /// The rejected input.
        input: String,
    },

    /// A dependency line does not follow the constraint grammar.
    #[error("malformed constraint \"{line}\" in module {module}: {reason}")]
    MalformedConstraint {
        /// Module declaring the constraint.
        module: String,
        /// The offending line.
        line: String,
        /// What the parser expected.
        reason: String,
    },

    /// A module could not be loaded and was excluded from the catalog.
    #[error("invalid module {module}: {reason}")]
    InvalidModule {
        /// Module directory name.
        module: String,
        /// Why the module was rejected.
        reason: String,
    },

    /// Two modules share a name.
    #[error("duplicate module name {name}")]
    DuplicateModule {
        /// The repeated name.
        name: String,
    },

    /// A module requires another module that is not available.
    #[error("module {module} requires {missing}, which is not available")]
    UnsatisfiedDependency {
        /// Module declaring the requirement.
        module: String,
        /// Missing module (or `module/service` for targeted requirements).
        missing: String,
    },

    /// An OR requirement could be satisfied by more than one module.
    #[error("module {module} requires one of {candidates:?}; enable one of them explicitly")]
    AmbiguousAlternative {
        /// Module declaring the requirement.
        module: String,
        /// Installable branches of the OR group.
        candidates: Vec<String>,
    },

    /// Two active modules conflict with each other.
    #[error("module {module} conflicts with {other}; disable one of them")]
    ConflictingModules {
        /// Module declaring the conflict.
        module: String,
        /// Conflicting module.
        other: String,
    },

    /// BEFORE/AFTER constraints form a cycle.
    #[error("dependency cycle between modules {modules:?}")]
    DependencyCycle {
        /// Modules participating in the cycle.
        modules: Vec<String>,
    },

    /// A version-bounded constraint is not met.
    #[error("module {module} requires {target} {required}, found {found}")]
    VersionMismatch {
        /// Module declaring the bound.
        module: String,
        /// Target module.
        target: String,
        /// Required bound, e.g. `>= 2.1`.
        required: String,
        /// Version actually available.
        found: String,
    },

    /// Fragments cannot be combined into one deployment descriptor.
    #[error("composition error: {message}")]
    Composition {
        /// Description of the composition failure.
        message: String,
    },

    /// A hook exited unsuccessfully.
    #[error("hook {hook} of module {module} failed ({status}): {output}")]
    HookFailure {
        /// Module owning the hook.
        module: String,
        /// Hook file name.
        hook: String,
        /// Exit status description.
        status: String,
        /// Captured standard error (or standard output when stderr is empty).
        output: String,
    },

    /// A service did not reach the running state in time.
    #[error("service {service} not ready after {attempts} attempts (last state: {last_state})")]
    ReadinessTimeout {
        /// Service that was polled.
        service: String,
        /// Number of probes performed.
        attempts: u32,
        /// Last observed state.
        last_state: String,
    },

    /// An external process could not be spawned.
    #[error("failed to run {program}: {source}")]
    Process {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The container runtime rejected a command.
    #[error("container runtime command `{command}` failed ({status}): {output}")]
    Runtime {
        /// Command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured diagnostic output.
        output: String,
    },

    /// Another orchestration run holds the lifecycle lock.
    #[error("lifecycle lock {path} is held by process {pid}")]
    LockHeld {
        /// Lock file path.
        path: PathBuf,
        /// Process holding the lock.
        pid: u32,
    },

    /// A lifecycle command is not valid from the module's current state.
    #[error("cannot {command} module {module} while it is {state}")]
    InvalidTransition {
        /// Module the command targeted.
        module: String,
        /// Requested command.
        command: &'static str,
        /// Current lifecycle state.
        state: String,
    },

    /// The operator interrupted the run.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl ModstackError {
    /// Returns whether the error aborts the whole operation.
    ///
    /// Invalid modules and failing hooks are isolated per module and only
    /// degrade the outcome.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidModule { .. } | Self::HookFailure { .. })
    }

    /// Builds an [`ModstackError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ModstackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_scoped_errors_are_not_fatal() {
        let invalid = ModstackError::InvalidModule {
            module: "web".into(),
            reason: "bad".into(),
        };
        let hook = ModstackError::HookFailure {
            module: "web".into(),
            hook: "enable.sh".into(),
            status: "exit code 1".into(),
            output: String::new(),
        };
        assert!(!invalid.is_fatal());
        assert!(!hook.is_fatal());
    }

    #[test]
    fn resolution_errors_are_fatal() {
        let cycle = ModstackError::DependencyCycle {
            modules: vec!["a".into(), "b".into()],
        };
        assert!(cycle.is_fatal());
        assert!(cycle.to_string().contains("\"a\""));
    }

    #[test]
    fn unsatisfied_dependency_names_missing_module() {
        let err = ModstackError::UnsatisfiedDependency {
            module: "m".into(),
            missing: "n".into(),
        };
        assert_eq!(err.to_string(), "module m requires n, which is not available");
    }
}
