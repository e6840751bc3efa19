//! Docker sandbox — long-lived containers that run an agent's tool calls
//!
//! One container per session (or one shared container) is reconciled against
//! the live runtime on demand. Secrets from the merged environment reach tools
//! through exec-time injection and never appear on the `create` command line.

pub mod config;
pub mod docker;
pub mod env;
pub mod exec;
pub mod policy;
pub mod prune;
pub mod registry;
pub mod runtime;
pub mod secrets;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    DockerRuntimeConfig, SandboxBrowserConfig, SandboxConfig, SandboxMode, SandboxPruneConfig,
    SandboxScope, WorkspaceAccess,
};
pub use docker::{EnsureRequest, SandboxManager, build_create_args, container_name, session_slug};
pub use env::{merge_env_file, parse_env_file, sanitize_env_vars, sanitize_env_vars_with};
pub use policy::SandboxToolPolicy;
pub use prune::{PruneFailure, PruneReport, spawn_prune_loop};
pub use registry::{ContainerRegistry, RegistryEntry, RegistryOp, RegistryState};
pub use runtime::{CommandOutput, CommandRunner, ContainerState, DockerCli};
pub use secrets::SecretKeyMatcher;
