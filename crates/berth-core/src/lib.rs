//! berth-core - sandbox container lifecycle for agent tool calls
//!
//! This crate provides:
//! - Per-session or shared container identities derived from config
//! - Reconciliation of the desired container against a live runtime
//! - Env-file merging and secret-aware sanitization of creation flags
//! - A persisted registry of managed containers and a pruner over it

pub mod error;
pub mod sandbox;

pub use error::{Result, SandboxError};
pub use sandbox::{EnsureRequest, SandboxConfig, SandboxManager};
