//! System-wide constants and default paths.

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "modstack";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "modstack";

/// Project configuration file looked up in the project root.
pub const CONFIG_FILE: &str = "modstack.yml";

/// Default directory holding one sub-directory per module.
pub const DEFAULT_MODULES_DIR: &str = "modules";

/// Default root for volume data mapped on the host.
pub const DEFAULT_VOLUMES_DIR: &str = "volumes";

/// Default directory for the state index, lock and hook logs.
pub const DEFAULT_STATE_DIR: &str = ".modstack";

/// Default path of the composed deployment descriptor.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Default container runtime binary.
pub const DEFAULT_RUNTIME_BINARY: &str = "docker";

/// Module descriptor file name inside a module directory.
pub const MODULE_DESCRIPTOR: &str = "module.yml";

/// Directory of service fragments inside a module.
pub const SERVICES_DIR: &str = "services";

/// Directory of volume fragments inside a module.
pub const VOLUMES_DIR: &str = "volumes";

/// Directory of hook scripts inside a module.
pub const HOOKS_DIR: &str = "hooks";

/// State index file name inside the state directory.
pub const STATE_FILE: &str = "state.json";

/// Lock file name inside the state directory.
pub const LOCK_FILE: &str = "modstack.lock";

/// Hook log directory inside the state directory.
pub const LOGS_DIR: &str = "logs";

/// Descriptor format versions understood by this release (major 1).
pub const SUPPORTED_FORMAT_MAJOR: u32 = 1;

/// Default delay between two readiness probes, in milliseconds.
pub const DEFAULT_READINESS_INTERVAL_MS: u64 = 1000;

/// Default number of readiness probes before giving up.
pub const DEFAULT_READINESS_ATTEMPTS: u32 = 300;

/// Environment variable carrying the module root to hooks.
pub const ENV_MODULE_ROOT: &str = "MODSTACK_MODULE_ROOT";

/// Environment variable carrying the shared volumes root to hooks.
pub const ENV_VOLUMES_ROOT: &str = "MODSTACK_VOLUMES_ROOT";

/// Environment variable telling hooks whether exposed volumes are disabled.
pub const ENV_NO_EXPOSED_VOLUMES: &str = "MODSTACK_NO_EXPOSED_VOLUMES";

/// Environment variable carrying the active profile to hooks.
pub const ENV_PROFILE: &str = "MODSTACK_PROFILE";

/// Suffix mandatory for shared volume names.
pub const SHARED_VOLUME_SUFFIX: &str = "-volume";
