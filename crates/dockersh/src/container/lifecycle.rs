//! Bringing a user's session container to the running state.

use log::{debug, info};
use std::fmt;

use super::error::ContainerResult;
use super::spec::ContainerSpec;
use super::{ContainerRuntimeApi, ListScope};
use crate::config::Configuration;

/// Where the orchestrator is with one named container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing known yet.
    Unknown,
    /// A running container holds the name.
    Running(String),
    /// A container holds the name but is not running.
    Stale(String),
    /// No container holds the name.
    Absent,
    /// The stale container was removed.
    Removed,
    Created(String),
    Started(String),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unknown => write!(f, "unknown"),
            LifecycleState::Running(id) => write!(f, "running ({})", id),
            LifecycleState::Stale(id) => write!(f, "stale ({})", id),
            LifecycleState::Absent => write!(f, "absent"),
            LifecycleState::Removed => write!(f, "removed"),
            LifecycleState::Created(id) => write!(f, "created ({})", id),
            LifecycleState::Started(id) => write!(f, "started ({})", id),
        }
    }
}

/// Drives one container name to a running container.
///
/// No state is kept between invocations: the runtime is probed every time and
/// a container that is not running is always replaced, never restarted.
pub struct Orchestrator<'a, R: ContainerRuntimeApi + ?Sized> {
    runtime: &'a R,
    hostname: Option<String>,
}

impl<'a, R: ContainerRuntimeApi + ?Sized> Orchestrator<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            hostname: None,
        }
    }

    /// Hostname given to newly created containers.
    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    /// Return the ID of a running container for `config`, creating one if
    /// needed.
    ///
    /// The probe and the create are not atomic. If a concurrent invocation
    /// creates the container first, creation fails with
    /// [`ContainerError::NameConflict`](super::ContainerError::NameConflict).
    pub fn ensure_running(&self, config: &Configuration) -> ContainerResult<String> {
        let spec = ContainerSpec::for_session(config, self.hostname.clone());
        spec.validate()?;

        let mut state = LifecycleState::Unknown;
        loop {
            debug!("Container {} is {}", spec.name, state);
            state = match state {
                LifecycleState::Unknown => self.probe(&spec.name)?,
                LifecycleState::Running(id) | LifecycleState::Started(id) => return Ok(id),
                LifecycleState::Stale(id) => {
                    info!("Removing stale container {} ({})", spec.name, id);
                    self.runtime.remove_container(&id)?;
                    LifecycleState::Removed
                }
                LifecycleState::Absent | LifecycleState::Removed => {
                    info!("Creating container {} from {}", spec.name, spec.image);
                    LifecycleState::Created(self.runtime.create_container(&spec)?)
                }
                LifecycleState::Created(id) => {
                    self.runtime.start_container(&id)?;
                    LifecycleState::Started(id)
                }
            };
        }
    }

    /// Classify the container currently holding `name`.
    ///
    /// Whatever the runtime lists as running is live, even when it reports a
    /// state such as `paused` or none at all. Only a container that shows up
    /// in the full listing alone is stale.
    fn probe(&self, name: &str) -> ContainerResult<LifecycleState> {
        let running = self.runtime.list_containers(name, ListScope::Running)?;
        if let Some(container) = running.into_iter().next() {
            return Ok(LifecycleState::Running(container.id));
        }

        let all = self.runtime.list_containers(name, ListScope::All)?;
        match all.into_iter().next() {
            // Started between the two listings.
            Some(container) if container.is_running() => {
                Ok(LifecycleState::Running(container.id))
            }
            Some(container) => Ok(LifecycleState::Stale(container.id)),
            None => Ok(LifecycleState::Absent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLayer;
    use crate::container::{
        ContainerError, ContainerState, ContainerSummary, parse_container_list,
    };
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        List(ListScope),
        Remove(String),
        Create(String),
        Start(String),
    }

    #[derive(Default)]
    struct FakeRuntime {
        containers: Vec<ContainerSummary>,
        fail_list: bool,
        fail_remove: bool,
        conflict_on_create: bool,
        fail_start: bool,
        calls: RefCell<Vec<Call>>,
    }

    impl FakeRuntime {
        fn with(state: ContainerState) -> Self {
            Self {
                containers: vec![ContainerSummary {
                    id: "old123".to_string(),
                    names: vec!["alice_dockersh_busybox".to_string()],
                    state,
                }],
                ..Default::default()
            }
        }

        fn from_ps(output: &str) -> Self {
            Self {
                containers: parse_container_list(output).unwrap(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }
    }

    impl ContainerRuntimeApi for FakeRuntime {
        fn list_containers(
            &self,
            name: &str,
            scope: ListScope,
        ) -> ContainerResult<Vec<ContainerSummary>> {
            self.calls.borrow_mut().push(Call::List(scope));
            if self.fail_list {
                return Err(ContainerError::CommandFailed {
                    command: "ps".to_string(),
                    message: "Cannot connect to the Docker daemon".to_string(),
                });
            }
            Ok(self
                .containers
                .iter()
                .filter(|c| c.has_name(name))
                .filter(|c| scope == ListScope::All || is_up(c.state))
                .cloned()
                .collect())
        }

        fn remove_container(&self, id: &str) -> ContainerResult<()> {
            self.calls.borrow_mut().push(Call::Remove(id.to_string()));
            if self.fail_remove {
                return Err(ContainerError::CommandFailed {
                    command: "rm".to_string(),
                    message: "device busy".to_string(),
                });
            }
            Ok(())
        }

        fn create_container(&self, spec: &ContainerSpec) -> ContainerResult<String> {
            self.calls.borrow_mut().push(Call::Create(spec.name.clone()));
            if self.conflict_on_create {
                return Err(ContainerError::NameConflict(spec.name.clone()));
            }
            Ok("new456".to_string())
        }

        fn start_container(&self, id: &str) -> ContainerResult<()> {
            self.calls.borrow_mut().push(Call::Start(id.to_string()));
            if self.fail_start {
                return Err(ContainerError::CommandFailed {
                    command: "start".to_string(),
                    message: "OCI runtime create failed".to_string(),
                });
            }
            Ok(())
        }
    }

    /// `ps` without `--all` lists every container that is up, paused included.
    fn is_up(state: ContainerState) -> bool {
        !matches!(
            state,
            ContainerState::Created | ContainerState::Exited | ContainerState::Dead
        )
    }

    fn config() -> Configuration {
        let mut config = Configuration::from_layer(ConfigLayer::builtin_defaults(), "alice");
        config.container_name = "alice_dockersh_busybox".to_string();
        config.user_id = 1000;
        config.group_id = 1000;
        config
    }

    #[test]
    fn test_running_container_is_reused() {
        let runtime = FakeRuntime::with(ContainerState::Running);
        let id = Orchestrator::new(&runtime).ensure_running(&config()).unwrap();

        assert_eq!(id, "old123");
        assert_eq!(runtime.calls(), vec![Call::List(ListScope::Running)]);
    }

    #[test]
    fn test_paused_container_is_reused() {
        let runtime = FakeRuntime::with(ContainerState::Paused);
        let id = Orchestrator::new(&runtime).ensure_running(&config()).unwrap();

        assert_eq!(id, "old123");
        assert_eq!(runtime.calls(), vec![Call::List(ListScope::Running)]);
    }

    #[test]
    fn test_running_listing_without_state_is_reused() {
        let runtime = FakeRuntime::from_ps(
            r#"{"ID":"live1","Names":"alice_dockersh_busybox","Status":"Up 3 minutes"}"#,
        );
        let id = Orchestrator::new(&runtime).ensure_running(&config()).unwrap();

        assert_eq!(id, "live1");
        assert_eq!(runtime.calls(), vec![Call::List(ListScope::Running)]);
    }

    #[test]
    fn test_stale_container_is_replaced() {
        let runtime = FakeRuntime::with(ContainerState::Exited);
        let id = Orchestrator::new(&runtime).ensure_running(&config()).unwrap();

        assert_eq!(id, "new456");
        assert_eq!(
            runtime.calls(),
            vec![
                Call::List(ListScope::Running),
                Call::List(ListScope::All),
                Call::Remove("old123".to_string()),
                Call::Create("alice_dockersh_busybox".to_string()),
                Call::Start("new456".to_string()),
            ]
        );
    }

    #[test]
    fn test_absent_container_is_created() {
        let runtime = FakeRuntime::default();
        let id = Orchestrator::new(&runtime).ensure_running(&config()).unwrap();

        assert_eq!(id, "new456");
        assert_eq!(
            runtime.calls(),
            vec![
                Call::List(ListScope::Running),
                Call::List(ListScope::All),
                Call::Create("alice_dockersh_busybox".to_string()),
                Call::Start("new456".to_string()),
            ]
        );
    }

    #[test]
    fn test_remove_failure_stops_the_sequence() {
        let runtime = FakeRuntime {
            fail_remove: true,
            ..FakeRuntime::with(ContainerState::Dead)
        };
        let err = Orchestrator::new(&runtime)
            .ensure_running(&config())
            .unwrap_err();

        assert!(matches!(err, ContainerError::CommandFailed { .. }));
        assert!(!runtime
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Create(_) | Call::Start(_))));
    }

    #[test]
    fn test_name_conflict_is_not_retried() {
        let runtime = FakeRuntime {
            conflict_on_create: true,
            ..Default::default()
        };
        let err = Orchestrator::new(&runtime)
            .ensure_running(&config())
            .unwrap_err();

        assert!(err.is_retryable());
        let creates = runtime
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[test]
    fn test_start_failure_is_not_retried() {
        let runtime = FakeRuntime {
            fail_start: true,
            ..Default::default()
        };
        let err = Orchestrator::new(&runtime)
            .ensure_running(&config())
            .unwrap_err();

        assert!(matches!(
            err,
            ContainerError::CommandFailed { ref command, .. } if command == "start"
        ));
        assert!(!err.is_retryable());
        assert_eq!(
            runtime.calls(),
            vec![
                Call::List(ListScope::Running),
                Call::List(ListScope::All),
                Call::Create("alice_dockersh_busybox".to_string()),
                Call::Start("new456".to_string()),
            ]
        );
    }

    #[test]
    fn test_list_failure_stops_before_any_change() {
        let runtime = FakeRuntime {
            fail_list: true,
            ..FakeRuntime::with(ContainerState::Exited)
        };
        let err = Orchestrator::new(&runtime)
            .ensure_running(&config())
            .unwrap_err();

        assert!(matches!(
            err,
            ContainerError::CommandFailed { ref command, .. } if command == "ps"
        ));
        assert_eq!(runtime.calls(), vec![Call::List(ListScope::Running)]);
    }

    #[test]
    fn test_invalid_name_never_reaches_runtime() {
        let runtime = FakeRuntime::default();
        let mut config = config();
        config.container_name = "alice_dockersh_myorg/img_latest".to_string();

        let err = Orchestrator::new(&runtime).ensure_running(&config).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidInput(_)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Absent.to_string(), "absent");
        assert_eq!(
            LifecycleState::Stale("abc".to_string()).to_string(),
            "stale (abc)"
        );
    }
}
