//! dockersh - login shell inside a per-user container.
//!
//! Set as a user's login shell (or run directly), it resolves the user's
//! configuration, makes sure their container is running and replaces itself
//! with a shell inside that container.
//!
//! Usage:
//!   dockersh [--debug] [-c <command>]

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error};

use dockersh::config::ConfigResolver;
use dockersh::container::{ContainerRuntime, Orchestrator, host_hostname};
use dockersh::logging::LogSettings;
use dockersh::session::{self, SessionOptions};

#[derive(Parser, Debug)]
#[command(
    name = "dockersh",
    version,
    about = "Login shell that runs inside a per-user container",
    after_help = "Configuration is read from /etc/dockersh and, when the administrator \
                  enables it, from ~/.dockersh."
)]
struct Args {
    /// Enable verbose logging.
    #[arg(long)]
    debug: bool,

    /// Run a single command instead of a login shell.
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    LogSettings::from_env(args.debug).init();

    let config = ConfigResolver::default()
        .resolve()
        .context("Could not load config")?;

    let runtime = ContainerRuntime::new();
    let id = Orchestrator::new(&runtime)
        .with_hostname(host_hostname())
        .ensure_running(&config)
        .inspect_err(|e| {
            if e.is_retryable() {
                error!("Another login created {} first", config.container_name);
            }
        })
        .with_context(|| format!("Could not start container {}", config.container_name))?;
    debug!("Container {} is running as {}", config.container_name, id);

    let opts = SessionOptions::detect(args.command);
    match session::attach(runtime.binary(), &id, &config, &opts) {
        Ok(never) => match never {},
        Err(e) => Err(e).context("Could not attach to container"),
    }
}
