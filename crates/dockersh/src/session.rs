//! Attaching the caller to a shell inside the session container.
//!
//! The attach replaces the dockersh process: once it succeeds nothing of
//! dockersh is left to clean up, and the container's auto-remove takes care of
//! the rest when its init exits.

use log::{debug, error};
use std::convert::Infallible;
use std::io::{self, IsTerminal};
use std::os::unix::process::CommandExt;
use std::process::Command;
use thiserror::Error;

use crate::config::Configuration;

/// Environment variable whose presence marks the caller as an interactive shell.
pub const INTERACTIVE_PROMPT_VAR: &str = "PS1";

/// Errors from starting the session.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The attach program could not be executed.
    #[error("failed to exec {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    /// No shell is configured to run in the container.
    #[error("no shell configured")]
    MissingShell,
}

/// How the caller invoked dockersh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Command passed with `-c`; `None` starts a login shell.
    pub command: Option<String>,
    /// Whether stdout is a terminal.
    pub tty: bool,
    /// Whether the caller's environment has [`INTERACTIVE_PROMPT_VAR`].
    pub interactive_prompt: bool,
}

impl SessionOptions {
    /// Options for the current process. An empty command counts as none.
    pub fn detect(command: Option<String>) -> Self {
        Self {
            command: command.filter(|c| !c.is_empty()),
            tty: io::stdout().is_terminal(),
            interactive_prompt: std::env::var_os(INTERACTIVE_PROMPT_VAR).is_some(),
        }
    }
}

/// A fully built attach command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecInvocation {
    pub program: String,
    pub args: Vec<String>,
}

/// Build `<runtime> exec ...` for container `id`.
pub fn build_exec(
    runtime_binary: &str,
    id: &str,
    config: &Configuration,
    opts: &SessionOptions,
) -> Result<ExecInvocation, LaunchError> {
    if config.shell.is_empty() {
        return Err(LaunchError::MissingShell);
    }

    let mut args = vec![
        "exec".to_string(),
        "--user".to_string(),
        config.identity(),
        "--workdir".to_string(),
        config.user_cwd.clone(),
    ];

    for entry in &config.env {
        args.push("--env".to_string());
        args.push(entry.clone());
    }

    if opts.tty {
        args.push("--interactive".to_string());
        args.push("--tty".to_string());
    }

    args.push(id.to_string());
    args.push(config.shell.clone());

    match opts.command {
        Some(ref command) => {
            args.push("-c".to_string());
            args.push(command.clone());
        }
        None => {
            args.push("--login".to_string());
            if opts.interactive_prompt {
                args.push("-i".to_string());
            }
        }
    }

    Ok(ExecInvocation {
        program: runtime_binary.to_string(),
        args,
    })
}

/// Replace the current process with a shell in container `id`.
///
/// Only returns on failure.
pub fn attach(
    runtime_binary: &str,
    id: &str,
    config: &Configuration,
    opts: &SessionOptions,
) -> Result<Infallible, LaunchError> {
    let invocation = build_exec(runtime_binary, id, config, opts)?;
    debug!("Exec: {} {:?}", invocation.program, invocation.args);

    let err = Command::new(&invocation.program)
        .args(&invocation.args)
        .exec();

    error!("Failed to exec {}: {:?}", invocation.program, err);
    Err(LaunchError::Exec {
        program: invocation.program,
        source: err,
    })
}
