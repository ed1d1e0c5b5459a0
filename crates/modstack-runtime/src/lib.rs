//! # modstack-runtime
//!
//! Runs the lifecycle of modules against a container runtime.
//!
//! Handles:
//! - **Lifecycle**: install, enable, disable, uninstall, upgrade, update,
//!   backup, restore, start and stop transitions.
//! - **Dispatcher**: Local and container hooks, service state probes.
//! - **Readiness**: Bounded, cancellable polling of service state.
//! - **State / Lock**: The persisted state index and the single-run lock.
//! - **Backend**: The `docker compose` adapter behind a trait.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod backend;
pub mod dispatcher;
pub mod inspect;
pub mod lifecycle;
pub mod lock;
pub mod logs;
pub mod process;
pub mod readiness;
pub mod report;
pub mod state;
