//! Exec-time environment injection
//!
//! The full environment, secrets included, travels over the child's stdin as
//! `KEY=VALUE` lines. A small loader inside the container exports them and then
//! execs the requested command, so no value ever appears in argv.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::docker::SandboxManager;
use super::runtime::CommandOutput;
use crate::error::{Result, SandboxError};

/// Reads assignments until the first empty line, exports them, then runs `$1`.
/// Whatever follows the empty line is left on stdin for the command.
const ENV_LOADER: &str = r#"while IFS= read -r berth_line; do [ -z "$berth_line" ] && break; export "$berth_line"; done; unset berth_line; exec sh -c "$1""#;

/// Exit status the runtime reserves for its own failures (daemon error,
/// container not running). The loader is always `sh`, so 126/127 come from
/// the user's command and are returned as output. A command that itself exits
/// 125 is indistinguishable and is reported as a runtime failure.
const RUNTIME_EXEC_FAILURE: i32 = 125;

static ENV_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Stdin payload: one `KEY=VALUE` per line, an empty terminator line, then `input`
pub fn encode_env_payload(env: &IndexMap<String, String>, input: Option<&str>) -> Result<String> {
    let mut payload = String::new();
    for (key, value) in env {
        if !ENV_KEY.is_match(key) {
            return Err(SandboxError::InvalidEnvEntry {
                key: key.clone(),
                reason: "not a valid variable name",
            });
        }
        if value.contains('\n') || value.contains('\r') || value.contains('\0') {
            return Err(SandboxError::InvalidEnvEntry {
                key: key.clone(),
                reason: "value contains a line break or NUL",
            });
        }
        payload.push_str(key);
        payload.push('=');
        payload.push_str(value);
        payload.push('\n');
    }
    payload.push('\n');
    if let Some(input) = input {
        payload.push_str(input);
    }
    Ok(payload)
}

/// argv for `exec`; carries the command but no environment values
pub fn build_exec_args(name: &str, command: &str, workdir: Option<&str>) -> Vec<String> {
    let mut args = vec!["exec".to_string(), "-i".to_string()];
    if let Some(dir) = workdir {
        args.push("--workdir".to_string());
        args.push(dir.to_string());
    }
    args.extend([
        name.to_string(),
        "sh".to_string(),
        "-c".to_string(),
        ENV_LOADER.to_string(),
        "sh".to_string(),
        command.to_string(),
    ]);
    args
}

impl SandboxManager {
    /// Run `command` inside the named container with `env` injected through stdin.
    ///
    /// A non-zero exit of the command is returned as output; only failures of
    /// the runtime itself become errors.
    pub async fn exec_in_sandbox(
        &self,
        name: &str,
        command: &str,
        env: &IndexMap<String, String>,
        workdir: Option<&str>,
        input: Option<&str>,
    ) -> Result<CommandOutput> {
        let payload = encode_env_payload(env, input)?;
        let args = build_exec_args(name, command, workdir);
        debug!("exec in '{}' with {} env vars", name, env.len());

        let output = self.runner().run(&args, Some(&payload)).await?;
        if output.exit_code == RUNTIME_EXEC_FAILURE {
            return Err(SandboxError::Exec {
                name: name.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
