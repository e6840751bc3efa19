//! berth — provision and manage sandbox containers for agent tool calls

mod config;
mod logging;

use anyhow::{Context, Result};
use berth_core::sandbox::{EnsureRequest, SandboxManager, runtime, session_slug};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use config::BerthConfig;

#[derive(Parser)]
#[command(name = "berth", version, about = "Sandbox containers for agent tool calls")]
struct Cli {
    /// Config file (default: ~/.berth/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// silent, fatal, error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Make sure the container for a session is running and print its name
    Ensure {
        #[arg(long)]
        session: String,
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Defaults to the session workspace
        #[arg(long)]
        agent_workspace: Option<PathBuf>,
    },
    /// Run a shell command in the session's container with the full environment
    Exec {
        #[arg(long)]
        session: String,
        #[arg(long)]
        workspace: Option<PathBuf>,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Show managed containers and whether they are running
    List,
    /// Remove containers past the configured age or count limits
    Prune,
    /// Stop and delete the container serving a session
    Remove {
        #[arg(long)]
        session: String,
    },
}

fn request(
    config: &BerthConfig,
    session: &str,
    workspace: Option<PathBuf>,
    agent_workspace: Option<PathBuf>,
) -> Result<EnsureRequest> {
    let workspace = match workspace {
        Some(dir) => dir,
        None => {
            // The key is untrusted; only its slug may name a directory
            let dir = config.sandbox.workspace_root.join(session_slug(session)?);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create workspace {}", dir.display()))?;
            dir
        }
    };
    let agent_workspace = agent_workspace.unwrap_or_else(|| workspace.clone());
    Ok(EnsureRequest::new(session, workspace, agent_workspace))
}

/// Re-quote trailing args so the in-container shell sees the same words
fn command_line(args: &[String]) -> String {
    shell_words::join(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = BerthConfig::load(cli.config.as_deref())?;

    let level = logging::normalize_log_level(cli.log_level.as_deref(), &config.log_level);
    logging::init(level);
    debug!("Registry at {}", config.registry_path().display());

    let manager = Arc::new(SandboxManager::from_config(
        &config.sandbox,
        config.registry_path(),
    ));

    match cli.command {
        Command::Ensure {
            session,
            workspace,
            agent_workspace,
        } => {
            let req = request(&config, &session, workspace, agent_workspace)?;
            let name = manager
                .ensure_sandbox_container(&req, &mut config.sandbox)
                .await?;
            println!("{}", name);
        }
        Command::Exec {
            session,
            workspace,
            command,
        } => {
            let req = request(&config, &session, workspace, None)?;
            let name = manager
                .ensure_sandbox_container(&req, &mut config.sandbox)
                .await?;
            let output = manager
                .exec_in_sandbox(
                    &name,
                    &command_line(&command),
                    &config.sandbox.docker.env,
                    Some(&config.sandbox.docker.workdir),
                    None,
                )
                .await?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if !output.success() {
                std::process::exit(output.exit_code.clamp(1, 255));
            }
        }
        Command::List => {
            if !runtime::is_available(manager.runner()).await {
                warn!(
                    "Container runtime '{}' is not answering; running state may be wrong",
                    config.sandbox.docker.binary
                );
            }
            let state = manager.registry().read().await;
            if state.entries.is_empty() {
                println!("No managed containers.");
            }
            for entry in &state.entries {
                let running = runtime::is_running(manager.runner(), &entry.name).await;
                println!(
                    "{:<40} {:<8} {:<24} {} {}",
                    entry.name,
                    entry.scope,
                    entry.session_key,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    if running { "running" } else { "stopped" }
                );
            }
        }
        Command::Prune => {
            let report = manager.prune(&config.sandbox.prune).await;
            for entry in &report.removed {
                println!("removed {}", entry.name);
            }
            for failure in &report.failures {
                warn!("{}: {}", failure.name, failure.error);
            }
            println!(
                "{} removed, {} failed",
                report.removed.len(),
                report.failures.len()
            );
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Command::Remove { session } => {
            manager
                .remove_sandbox_container(&session, &config.sandbox)
                .await?;
            println!("removed");
        }
    }

    Ok(())
}
