//! dockersh: a login shell that lives inside a per-user container.
//!
//! Each invocation resolves the effective configuration for the calling user,
//! makes sure that user's container is running, and then replaces the current
//! process with an interactive session inside it.
//!
//! - [`config`]: layered admin/user/default configuration and interpolation
//! - [`container`]: container runtime client and lifecycle orchestration
//! - [`session`]: the final `exec` into the container
//! - [`identity`]: calling user lookup
//! - [`logging`]: logger settings

pub mod config;
pub mod container;
pub mod identity;
pub mod logging;
pub mod session;

pub use config::{ConfigError, ConfigResolver, Configuration};
pub use container::{ContainerError, ContainerRuntime, ContainerRuntimeApi, Orchestrator};
pub use identity::UserIdentity;
pub use session::{LaunchError, SessionOptions};
