//! Container creation request, runtime listing types and input validation.

use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;

use super::error::{ContainerError, ContainerResult};
use crate::config::{Configuration, Entrypoint};

/// PID 1 used for the `internal` entrypoint: idle forever, exit on TERM/INT.
pub const IDLE_INIT: [&str; 3] = [
    "/bin/sh",
    "-c",
    "trap : TERM INT; (while true; do sleep 1000; done) & wait",
];

/// Capabilities removed from every session container.
pub const DROPPED_CAPABILITIES: [&str; 4] = ["SETUID", "SETGID", "NET_RAW", "MKNOD"];

/// Label recording which OS user owns the container.
pub const OWNER_LABEL: &str = "dockersh.user";

/// Where the docker socket appears inside the container.
pub const DOCKER_SOCKET_TARGET: &str = "/var/run/docker.sock";

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    ReadOnly,
    ReadWrite,
}

/// A host path bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub host: String,
    pub container: String,
    pub mode: BindMode,
}

impl Bind {
    pub fn read_only(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: BindMode::ReadOnly,
        }
    }

    pub fn read_write(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: BindMode::ReadWrite,
        }
    }
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            BindMode::ReadOnly => "ro",
            BindMode::ReadWrite => "rw",
        };
        write!(f, "{}:{}:{}", self.host, self.container, mode)
    }
}

/// Everything needed to create a session container.
///
/// Every security-relevant setting is an explicit value; nothing is left to
/// runtime defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    /// `uid:gid` the container's processes run as.
    pub user: String,
    pub entrypoint: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub workdir: String,
    pub labels: BTreeMap<String, String>,
    pub binds: Vec<Bind>,
    pub cap_drop: Vec<String>,
    pub read_only_rootfs: bool,
    pub auto_remove: bool,
}

impl ContainerSpec {
    /// Build the creation request for a user's session container.
    pub fn for_session(config: &Configuration, hostname: Option<String>) -> Self {
        let mut binds = vec![
            Bind::read_only("/etc/passwd", "/etc/passwd"),
            Bind::read_only("/etc/group", "/etc/group"),
        ];
        if config.mount_tmp {
            debug!("Bind mounting /tmp");
            binds.push(Bind::read_write("/tmp", "/tmp"));
        }
        if config.mount_home {
            let home = Bind::read_write(&config.mount_home_from, &config.mount_home_to);
            debug!("Bind mounting home: {}", home);
            binds.push(home);
        }
        if config.mount_docker_socket {
            debug!("Bind mounting {}", config.docker_socket);
            binds.push(Bind::read_write(&config.docker_socket, DOCKER_SOCKET_TARGET));
        }

        let (entrypoint, command) = match &config.entrypoint {
            Entrypoint::Internal => (
                IDLE_INIT[0].to_string(),
                IDLE_INIT[1..].iter().map(|s| s.to_string()).collect(),
            ),
            Entrypoint::Command(program) => (program.clone(), config.cmd.clone()),
        };
        debug!("Entry point is: {} {:?}", entrypoint, command);

        let mut labels = BTreeMap::new();
        labels.insert(OWNER_LABEL.to_string(), config.owner.clone());

        Self {
            name: config.container_name.clone(),
            image: config.image_name.clone(),
            hostname,
            user: config.identity(),
            entrypoint,
            command,
            env: config.env.clone(),
            workdir: "/".to_string(),
            labels,
            binds,
            cap_drop: DROPPED_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            read_only_rootfs: true,
            auto_remove: true,
        }
    }

    /// Validate every field before anything is sent to the runtime.
    pub fn validate(&self) -> ContainerResult<()> {
        validate_image_name(&self.image)?;
        validate_container_name(&self.name)?;

        if let Some(ref hostname) = self.hostname {
            validate_hostname(hostname)?;
        }

        for entry in &self.env {
            let key = entry.split_once('=').map_or(entry.as_str(), |(key, _)| key);
            validate_env_var_key(key)?;
        }

        for bind in &self.binds {
            validate_volume_path(&bind.host, "host")?;
            validate_volume_path(&bind.container, "container")?;
            validate_container_path(&bind.container)?;
        }

        validate_container_path(&self.workdir)?;

        if self.entrypoint.is_empty() {
            return Err(ContainerError::InvalidInput(
                "entrypoint cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Arguments for `<runtime> create`.
    pub fn create_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["create".to_string()];

        args.push("--name".to_string());
        args.push(self.name.clone());

        if let Some(ref hostname) = self.hostname {
            args.push("--hostname".to_string());
            args.push(hostname.clone());
        }

        args.push("--user".to_string());
        args.push(self.user.clone());

        args.push("--workdir".to_string());
        args.push(self.workdir.clone());

        for (key, value) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        for entry in &self.env {
            args.push("--env".to_string());
            args.push(entry.clone());
        }

        for bind in &self.binds {
            args.push("--volume".to_string());
            args.push(bind.to_string());
        }

        for cap in &self.cap_drop {
            args.push("--cap-drop".to_string());
            args.push(cap.clone());
        }

        if self.read_only_rootfs {
            args.push("--read-only".to_string());
        }

        if self.auto_remove {
            args.push("--rm".to_string());
        }

        args.push("--entrypoint".to_string());
        args.push(self.entrypoint.clone());

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());

        args
    }
}

/// The host's hostname, if it is usable as a container hostname.
pub fn host_hostname() -> Option<String> {
    let uname = rustix::system::uname();
    let nodename = uname.nodename().to_str().ok()?.to_string();

    match validate_hostname(&nodename) {
        Ok(()) => Some(nodename),
        Err(e) => {
            warn!("Not using host name '{}' for the container: {}", nodename, e);
            None
        }
    }
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Created => write!(f, "created"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Paused => write!(f, "paused"),
            ContainerState::Restarting => write!(f, "restarting"),
            ContainerState::Removing => write!(f, "removing"),
            ContainerState::Exited => write!(f, "exited"),
            ContainerState::Dead => write!(f, "dead"),
            ContainerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One entry of `<runtime> ps --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Container ID.
    #[serde(rename = "ID", alias = "Id")]
    pub id: String,

    /// Container names. Docker reports a comma-separated string, podman a list.
    #[serde(default, deserialize_with = "deserialize_names")]
    pub names: Vec<String>,

    #[serde(default)]
    pub state: ContainerState,
}

impl ContainerSummary {
    /// Whether `name` is one of this container's names, ignoring a leading `/`.
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n) == name)
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

fn deserialize_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};

    struct Names;

    impl<'de> Visitor<'de> for Names {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a comma-separated string or a list of names")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value
                .split(',')
                .filter(|n| !n.is_empty())
                .map(|n| n.to_string())
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut names = Vec::new();
            while let Some(name) = seq.next_element::<String>()? {
                names.push(name);
            }
            Ok(names)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(Names)
}

/// Parse `ps` output: either a JSON array (podman) or one object per line (docker).
pub fn parse_container_list(output: &str) -> ContainerResult<Vec<ContainerSummary>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ContainerError::ParseError(e.to_string()));
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| ContainerError::ParseError(e.to_string()))
        })
        .collect()
}

// ============================================================================
// Input Validation Functions
// ============================================================================

/// Validate an image reference: `[host[:port]/]path[:tag][@algorithm:hex]`.
///
/// The image name comes from config and is interpolated with the caller's
/// username, so it is checked against the reference grammar rather than a
/// character allowlist.
pub fn validate_image_name(image: &str) -> ContainerResult<()> {
    let invalid = |reason: &str| {
        ContainerError::InvalidInput(format!("image name '{}' {}", image, reason))
    };

    if image.is_empty() {
        return Err(invalid("is empty"));
    }
    if image.len() > 255 {
        return Err(invalid("exceeds 255 characters"));
    }

    let (reference, digest) = match image.split_once('@') {
        Some((reference, digest)) => (reference, Some(digest)),
        None => (image, None),
    };

    if let Some(digest) = digest {
        let valid = digest.split_once(':').is_some_and(|(algorithm, hex)| {
            !algorithm.is_empty()
                && algorithm.chars().all(|c| c.is_ascii_alphanumeric())
                && !hex.is_empty()
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        });
        if !valid {
            return Err(invalid("has a malformed digest"));
        }
    }

    // A `:` after the last `/` starts the tag; one before it is a registry port.
    let (repository, tag) = match reference.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => (repository, Some(tag)),
        _ => (reference, None),
    };

    if let Some(tag) = tag {
        let valid = tag.len() <= 128
            && tag
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid {
            return Err(invalid("has an invalid tag"));
        }
    }

    let components: Vec<&str> = repository.split('/').collect();
    let path = match components.as_slice() {
        [host, rest @ ..] if !rest.is_empty() && is_registry_host(host) => rest,
        all => all,
    };

    for component in path {
        let bounded = component.starts_with(|c: char| c.is_ascii_alphanumeric())
            && component.ends_with(|c: char| c.is_ascii_alphanumeric());
        let allowed = component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        if !bounded || !allowed || component.contains("..") {
            return Err(invalid(
                "has an invalid path component; use lowercase letters, digits, '.', '_' and '-'",
            ));
        }
    }

    Ok(())
}

/// Whether the first component of a reference names a registry.
fn is_registry_host(component: &str) -> bool {
    let looks_like_host =
        component.contains('.') || component.contains(':') || component == "localhost";
    looks_like_host
        && !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
}

/// Validate a container name against the runtime's naming rule
/// `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
pub fn validate_container_name(name: &str) -> ContainerResult<()> {
    let Some(first_char) = name.chars().next() else {
        return Err(ContainerError::InvalidInput(
            "container name cannot be empty".to_string(),
        ));
    };

    if name.len() > 128 {
        return Err(ContainerError::InvalidInput(
            "container name exceeds maximum length of 128 characters".to_string(),
        ));
    }

    if !first_char.is_ascii_alphanumeric() {
        return Err(ContainerError::InvalidInput(format!(
            "container name '{}' must start with an alphanumeric character",
            name
        )));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.';
    if !name.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "container name '{}' contains invalid characters; only alphanumeric, '-', '_', '.' are allowed",
            name
        )));
    }

    Ok(())
}

/// Validate a container ID or name passed to `rm`/`start`.
pub(crate) fn validate_container_id_or_name(id: &str) -> ContainerResult<()> {
    if id.is_empty() {
        return Err(ContainerError::InvalidInput(
            "container ID or name cannot be empty".to_string(),
        ));
    }

    if id.len() > 128 {
        return Err(ContainerError::InvalidInput(
            "container ID or name exceeds maximum length".to_string(),
        ));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.';
    if !id.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "container ID or name '{}' contains invalid characters",
            id
        )));
    }

    Ok(())
}

/// Validate a hostname (RFC 1123).
pub fn validate_hostname(hostname: &str) -> ContainerResult<()> {
    if hostname.is_empty() {
        return Err(ContainerError::InvalidInput(
            "hostname cannot be empty".to_string(),
        ));
    }

    if hostname.len() > 253 {
        return Err(ContainerError::InvalidInput(
            "hostname exceeds maximum length of 253 characters".to_string(),
        ));
    }

    for label in hostname.split('.') {
        let (Some(first), Some(last)) = (label.chars().next(), label.chars().last()) else {
            return Err(ContainerError::InvalidInput(
                "hostname cannot have empty labels".to_string(),
            ));
        };

        if label.len() > 63 {
            return Err(ContainerError::InvalidInput(
                "hostname label exceeds maximum length of 63 characters".to_string(),
            ));
        }

        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(ContainerError::InvalidInput(
                "hostname labels must start and end with alphanumeric characters".to_string(),
            ));
        }

        let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-';
        if !label.chars().all(valid_chars) {
            return Err(ContainerError::InvalidInput(format!(
                "hostname '{}' contains invalid characters",
                hostname
            )));
        }
    }

    Ok(())
}

/// Validate an environment variable key (POSIX: letters, digits, `_`).
fn validate_env_var_key(key: &str) -> ContainerResult<()> {
    let Some(first_char) = key.chars().next() else {
        return Err(ContainerError::InvalidInput(
            "environment variable key cannot be empty".to_string(),
        ));
    };

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ContainerError::InvalidInput(format!(
            "environment variable key '{}' must start with a letter or underscore",
            key
        )));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if !key.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "environment variable key '{}' contains invalid characters; only alphanumeric and '_' are allowed",
            key
        )));
    }

    Ok(())
}

/// Validate one side of a bind mount.
fn validate_volume_path(path: &str, side: &str) -> ContainerResult<()> {
    if path.is_empty() {
        return Err(ContainerError::InvalidInput(format!(
            "{} volume path cannot be empty",
            side
        )));
    }

    if path.len() > 4096 {
        return Err(ContainerError::InvalidInput(format!(
            "{} volume path exceeds maximum length of 4096 characters",
            side
        )));
    }

    if path.contains('\0') {
        return Err(ContainerError::InvalidInput(format!(
            "{} volume path cannot contain null bytes",
            side
        )));
    }

    // `:` separates the fields of a `--volume` argument.
    if path.contains(':') {
        return Err(ContainerError::InvalidInput(format!(
            "{} volume path '{}' cannot contain ':'",
            side, path
        )));
    }

    Ok(())
}

/// Validate a container-internal path.
fn validate_container_path(path: &str) -> ContainerResult<()> {
    if !path.starts_with('/') {
        return Err(ContainerError::InvalidInput(format!(
            "container path '{}' must be absolute (start with '/')",
            path
        )));
    }

    if path.contains('\0') {
        return Err(ContainerError::InvalidInput(
            "container path cannot contain null bytes".to_string(),
        ));
    }

    Ok(())
}
