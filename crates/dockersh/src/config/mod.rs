//! Effective configuration for one dockersh invocation.
//!
//! ## Sources
//!
//! 1. **Built-in defaults** ([`ConfigLayer::builtin_defaults`])
//! 2. **Admin file** (`/etc/dockersh`): always read when present
//! 3. **User file** (`~/.dockersh`): read only when the admin sets
//!    `enableuserconfig = true`, and then only the fields the admin opened with
//!    `enableuser<field> = true` are honoured
//!
//! Both files are INI style (see [`file`] for the details):
//!
//! ```ini
//! [dockersh]
//! imagename = ubuntu:22.04
//! mounthome = true
//! enableuserconfig = true
//! enableusershell = true
//! env = LANG=C.UTF-8
//! env = TERM=$TERM
//!
//! [user "alice"]
//! mounttmp = yes
//! ```
//!
//! After merging, templated fields are interpolated (see [`interpolate`]) and
//! the container name gets an image-derived suffix.

mod error;
pub mod file;
pub mod interpolate;
pub mod layer;
mod resolve;

pub use error::{ConfigError, ConfigFormatError, ConfigOrigin, ConfigResult};
pub use file::ConfigFile;
pub use interpolate::{InterpolationContext, SHELL_TOKEN_VALUE};
pub use layer::{ConfigLayer, ENABLE_USER_CONFIG_KEY, ENTRYPOINT_INTERNAL, Field, merge};
pub use resolve::{
    ADMIN_CONFIG_PATH, ConfigResolver, USER_CONFIG_FILE, container_name_for_image,
};

use std::collections::BTreeSet;

/// How the container's PID 1 is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entrypoint {
    /// Built-in signal-trapping idle loop.
    Internal,
    /// A literal executable, started with the configured `cmd` as arguments.
    Command(String),
}

impl Entrypoint {
    pub fn parse(value: &str) -> Self {
        if value == ENTRYPOINT_INTERNAL {
            Entrypoint::Internal
        } else {
            Entrypoint::Command(value.to_string())
        }
    }
}

/// The resolved configuration consumed by the orchestrator and launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub image_name: String,
    pub container_name: String,
    pub mount_home_from: String,
    pub mount_home_to: String,
    pub user_cwd: String,
    pub container_username: String,
    pub shell: String,
    pub entrypoint: Entrypoint,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    /// Parsed and merged but never acted on.
    pub reverse_forward: Vec<String>,
    pub docker_socket: String,
    pub mount_home: bool,
    pub mount_tmp: bool,
    pub mount_docker_socket: bool,
    /// Fields the admin opened to user overrides.
    pub user_overrides: BTreeSet<Field>,
    pub user_config_enabled: bool,
    /// OS username that owns the container.
    pub owner: String,
    pub user_id: u32,
    pub group_id: u32,
}

impl Configuration {
    /// Flatten a merged layer. Absent values become empty/false; uid and gid
    /// are stamped later by the resolver.
    pub fn from_layer(layer: ConfigLayer, owner: impl Into<String>) -> Self {
        let user_overrides = Field::ALL
            .into_iter()
            .filter(|field| layer.allows(*field))
            .collect();
        let user_config_enabled = layer.user_config_enabled();

        Self {
            image_name: layer.image_name.unwrap_or_default(),
            container_name: layer.container_name.unwrap_or_default(),
            mount_home_from: layer.mount_home_from.unwrap_or_default(),
            mount_home_to: layer.mount_home_to.unwrap_or_default(),
            user_cwd: layer.user_cwd.unwrap_or_default(),
            container_username: layer.container_username.unwrap_or_default(),
            shell: layer.shell.unwrap_or_default(),
            entrypoint: Entrypoint::parse(
                layer.entrypoint.as_deref().unwrap_or(ENTRYPOINT_INTERNAL),
            ),
            cmd: layer.cmd.unwrap_or_default(),
            env: layer.env.unwrap_or_default(),
            reverse_forward: layer.reverse_forward.unwrap_or_default(),
            docker_socket: layer.docker_socket.unwrap_or_default(),
            mount_home: layer.mount_home.unwrap_or(false),
            mount_tmp: layer.mount_tmp.unwrap_or(false),
            mount_docker_socket: layer.mount_docker_socket.unwrap_or(false),
            user_overrides,
            user_config_enabled,
            owner: owner.into(),
            user_id: 0,
            group_id: 0,
        }
    }

    /// Whether the admin allowed users to override `field`.
    pub fn user_may_override(&self, field: Field) -> bool {
        self.user_overrides.contains(&field)
    }

    /// Process identity inside the container, as `uid:gid`.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.user_id, self.group_id)
    }

    /// Short summary for debug logging.
    pub fn dump(&self) -> String {
        format!(
            "ImageName {} ContainerName {} MountHomeTo {} ContainerUsername {} Shell {} DockerSocket {}",
            self.image_name,
            self.container_name,
            self.mount_home_to,
            self.container_username,
            self.shell,
            self.docker_socket
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entrypoint_parse() {
        assert_eq!(Entrypoint::parse("internal"), Entrypoint::Internal);
        assert_eq!(
            Entrypoint::parse("/sbin/init"),
            Entrypoint::Command("/sbin/init".to_string())
        );
    }

    #[test]
    fn test_from_layer_defaults() {
        let config = Configuration::from_layer(ConfigLayer::builtin_defaults(), "alice");
        assert_eq!(config.image_name, "busybox");
        assert_eq!(config.entrypoint, Entrypoint::Internal);
        assert!(config.cmd.is_empty());
        assert!(!config.mount_home);
        assert!(config.user_overrides.is_empty());
        assert!(!config.user_config_enabled);
        assert_eq!(config.owner, "alice");
    }

    #[test]
    fn test_from_layer_absent_values() {
        let config = Configuration::from_layer(ConfigLayer::default(), "bob");
        assert_eq!(config.image_name, "");
        assert_eq!(config.entrypoint, Entrypoint::Internal);
        assert!(!config.mount_docker_socket);
    }

    #[test]
    fn test_user_may_override() {
        let layer = ConfigLayer {
            enable_user_shell: Some(true),
            enable_user_env: Some(false),
            ..ConfigLayer::builtin_defaults()
        };
        let config = Configuration::from_layer(layer, "alice");
        assert!(config.user_may_override(Field::Shell));
        assert!(!config.user_may_override(Field::Env));
    }

    #[test]
    fn test_identity() {
        let mut config = Configuration::from_layer(ConfigLayer::builtin_defaults(), "alice");
        config.user_id = 1000;
        config.group_id = 100;
        assert_eq!(config.identity(), "1000:100");
    }
}
