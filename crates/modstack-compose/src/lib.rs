//! # modstack-compose
//!
//! Everything between module directories on disk and a composed deployment
//! descriptor.
//!
//! Handles:
//! - **Version**: `major[.minor][stability]` parsing and ordering.
//! - **Constraint**: Lexing and parsing of dependency lines.
//! - **Descriptor / Registry**: Loading `module.yml`, fragments and hooks
//!   into a catalog that isolates invalid modules.
//! - **Resolver / Graph**: REQUIRES expansion, validation and stable
//!   topological ordering of modules and services.
//! - **Compositor**: Merging base, merge and override fragments.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod compositor;
pub mod constraint;
pub mod descriptor;
pub mod graph;
pub mod hooks;
pub mod registry;
pub mod resolver;
pub mod version;
