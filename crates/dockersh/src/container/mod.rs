//! Container runtime management.
//!
//! The runtime is driven through its CLI (`docker` by default). Everything the
//! session orchestrator needs goes through [`ContainerRuntimeApi`] so the
//! lifecycle logic can be exercised without a daemon.

mod error;
mod lifecycle;
mod spec;

pub use error::{ContainerError, ContainerResult};
pub use lifecycle::{LifecycleState, Orchestrator};
pub use spec::{
    Bind, BindMode, ContainerSpec, ContainerState, ContainerSummary, DOCKER_SOCKET_TARGET,
    DROPPED_CAPABILITIES, IDLE_INIT, OWNER_LABEL, host_hostname, parse_container_list,
    validate_container_name, validate_hostname, validate_image_name,
};

use log::debug;
use spec::validate_container_id_or_name;
use std::io;
use std::process::{Command, Stdio};

/// Default runtime binary, resolved through `PATH`.
pub const DEFAULT_RUNTIME_BINARY: &str = "docker";

/// Which containers a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    Running,
    All,
}

/// Operations the session orchestrator needs from a container runtime.
pub trait ContainerRuntimeApi {
    /// Containers whose name is exactly `name`.
    fn list_containers(
        &self,
        name: &str,
        scope: ListScope,
    ) -> ContainerResult<Vec<ContainerSummary>>;

    /// Force-remove a container.
    fn remove_container(&self, id: &str) -> ContainerResult<()>;

    /// Create a container and return its ID.
    fn create_container(&self, spec: &ContainerSpec) -> ContainerResult<String>;

    fn start_container(&self, id: &str) -> ContainerResult<()>;
}

/// Container runtime backed by the runtime's command-line client.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    binary: String,
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime {
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_RUNTIME_BINARY.to_string(),
        }
    }

    /// Get the binary path/name.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run a runtime subcommand and return its stdout.
    fn run<S: AsRef<str>>(&self, command: &str, args: &[S]) -> ContainerResult<String> {
        debug!(
            "Running: {} {}",
            self.binary,
            args.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
        );

        let output = Command::new(&self.binary)
            .args(args.iter().map(|a| a.as_ref()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ContainerError::RuntimeNotFound(self.binary.clone()),
                _ => ContainerError::CommandFailed {
                    command: command.to_string(),
                    message: e.to_string(),
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed {
                command: command.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ContainerRuntimeApi for ContainerRuntime {
    fn list_containers(
        &self,
        name: &str,
        scope: ListScope,
    ) -> ContainerResult<Vec<ContainerSummary>> {
        validate_container_name(name)?;

        let filter = format!("name={}", name);
        let mut args = vec![
            "ps",
            "--no-trunc",
            "--filter",
            filter.as_str(),
            "--format",
            "{{json .}}",
        ];
        if scope == ListScope::All {
            args.push("--all");
        }

        let stdout = self.run("ps", &args)?;
        // The name filter is a substring match; keep exact matches only.
        let containers = parse_container_list(&stdout)?
            .into_iter()
            .filter(|c| c.has_name(name))
            .collect();
        Ok(containers)
    }

    fn remove_container(&self, id: &str) -> ContainerResult<()> {
        validate_container_id_or_name(id)?;
        self.run("rm", &["rm", "--force", id])?;
        Ok(())
    }

    fn create_container(&self, spec: &ContainerSpec) -> ContainerResult<String> {
        spec.validate()?;

        let stdout = self.run("create", &spec.create_args()).map_err(|e| match e {
            ContainerError::CommandFailed { ref message, .. }
                if message.contains("is already in use") =>
            {
                ContainerError::NameConflict(spec.name.clone())
            }
            other => other,
        })?;

        // The container ID is the last line of stdout (pull progress may precede it).
        let id = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            return Err(ContainerError::ParseError(
                "create returned no container ID".to_string(),
            ));
        }
        Ok(id)
    }

    fn start_container(&self, id: &str) -> ContainerResult<()> {
        validate_container_id_or_name(id)?;
        self.run("start", &["start", id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binary() {
        assert_eq!(ContainerRuntime::new().binary(), "docker");
        assert_eq!(ContainerRuntime::default().binary(), DEFAULT_RUNTIME_BINARY);
    }

    #[test]
    fn test_list_rejects_invalid_name() {
        let runtime = ContainerRuntime::new();
        let result = runtime.list_containers("bad;name", ListScope::All);
        assert!(matches!(result, Err(ContainerError::InvalidInput(_))));
    }

    #[test]
    fn test_remove_and_start_reject_invalid_ids() {
        let runtime = ContainerRuntime::new();
        assert!(matches!(
            runtime.remove_container("$(id)"),
            Err(ContainerError::InvalidInput(_))
        ));
        assert!(matches!(
            runtime.start_container(""),
            Err(ContainerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_binary_is_runtime_not_found() {
        let runtime = ContainerRuntime {
            binary: "/nonexistent/dockersh-test-runtime".to_string(),
        };
        let result = runtime.start_container("abc123");
        assert!(matches!(result, Err(ContainerError::RuntimeNotFound(_))));
    }

    #[test]
    fn test_name_conflict_is_retryable() {
        assert!(ContainerError::NameConflict("x".to_string()).is_retryable());
        assert!(!ContainerError::ParseError("x".to_string()).is_retryable());
    }
}
