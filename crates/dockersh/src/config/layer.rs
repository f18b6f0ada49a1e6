//! Configuration layers and the authorization-gated merge.
//!
//! A [`ConfigLayer`] is one partially specified source of configuration: the
//! built-in defaults, the admin file, or the user's own file. Every field is
//! optional so that "not specified" and "deliberately empty or false" stay
//! distinct while merging.
//!
//! Layers are combined with [`merge`]:
//!
//! - **Ungated** (defaults <- admin): every field the overlay specifies wins,
//!   including the `enableuser*` authorization flags.
//! - **Gated** (admin <- user): a value only applies if the base layer has the
//!   matching `enableuser<field>` flag set to `true`. Authorization flags are
//!   never taken from the overlay, so a user file cannot grant itself access.

use log::debug;
use std::fmt;

/// Sentinel entrypoint value selecting the built-in idle init.
pub const ENTRYPOINT_INTERNAL: &str = "internal";

/// Key of the master switch for reading the user's own file.
pub const ENABLE_USER_CONFIG_KEY: &str = "enableuserconfig";

const ENABLE_USER_PREFIX: &str = "enableuser";

/// A value field that the admin may open up to user overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    ImageName,
    ContainerName,
    MountHomeFrom,
    MountHomeTo,
    UserCwd,
    ContainerUsername,
    Shell,
    MountHome,
    MountTmp,
    MountDockerSocket,
    DockerSocket,
    Entrypoint,
    Cmd,
    Env,
    ReverseForward,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::ImageName,
        Field::ContainerName,
        Field::MountHomeFrom,
        Field::MountHomeTo,
        Field::UserCwd,
        Field::ContainerUsername,
        Field::Shell,
        Field::MountHome,
        Field::MountTmp,
        Field::MountDockerSocket,
        Field::DockerSocket,
        Field::Entrypoint,
        Field::Cmd,
        Field::Env,
        Field::ReverseForward,
    ];

    /// Key used for this field in config files.
    pub fn key(&self) -> &'static str {
        match self {
            Field::ImageName => "imagename",
            Field::ContainerName => "containername",
            Field::MountHomeFrom => "mounthomefrom",
            Field::MountHomeTo => "mounthometo",
            Field::UserCwd => "usercwd",
            Field::ContainerUsername => "containerusername",
            Field::Shell => "shell",
            Field::MountHome => "mounthome",
            Field::MountTmp => "mounttmp",
            Field::MountDockerSocket => "mountdockersocket",
            Field::DockerSocket => "dockersocket",
            Field::Entrypoint => "entrypoint",
            Field::Cmd => "cmd",
            Field::Env => "env",
            Field::ReverseForward => "reverseforward",
        }
    }

    /// The field a config-file key names, ignoring case.
    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One partially specified configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub image_name: Option<String>,
    pub enable_user_image_name: Option<bool>,

    pub container_name: Option<String>,
    pub enable_user_container_name: Option<bool>,

    pub mount_home_from: Option<String>,
    pub enable_user_mount_home_from: Option<bool>,

    pub mount_home_to: Option<String>,
    pub enable_user_mount_home_to: Option<bool>,

    pub user_cwd: Option<String>,
    pub enable_user_user_cwd: Option<bool>,

    pub container_username: Option<String>,
    pub enable_user_container_username: Option<bool>,

    pub shell: Option<String>,
    pub enable_user_shell: Option<bool>,

    pub mount_home: Option<bool>,
    pub enable_user_mount_home: Option<bool>,

    pub mount_tmp: Option<bool>,
    pub enable_user_mount_tmp: Option<bool>,

    pub mount_docker_socket: Option<bool>,
    pub enable_user_mount_docker_socket: Option<bool>,

    pub docker_socket: Option<String>,
    pub enable_user_docker_socket: Option<bool>,

    pub entrypoint: Option<String>,
    pub enable_user_entrypoint: Option<bool>,

    pub cmd: Option<Vec<String>>,
    pub enable_user_cmd: Option<bool>,

    pub env: Option<Vec<String>>,
    pub enable_user_env: Option<bool>,

    pub reverse_forward: Option<Vec<String>>,
    pub enable_user_reverse_forward: Option<bool>,

    /// Master switch: whether the user's own config file is read at all.
    pub enable_user_config: Option<bool>,
}

impl ConfigLayer {
    /// The layer every resolution starts from.
    pub fn builtin_defaults() -> Self {
        let mut layer = Self {
            image_name: Some("busybox".to_string()),
            container_name: Some("%u_dockersh".to_string()),
            mount_home_from: Some("%h".to_string()),
            mount_home_to: Some("%h".to_string()),
            user_cwd: Some("%h".to_string()),
            container_username: Some("%u".to_string()),
            shell: Some("/bin/ash".to_string()),
            mount_home: Some(false),
            mount_tmp: Some(false),
            mount_docker_socket: Some(false),
            docker_socket: Some("/var/run/docker.sock".to_string()),
            entrypoint: Some(ENTRYPOINT_INTERNAL.to_string()),
            cmd: Some(Vec::new()),
            env: Some(Vec::new()),
            reverse_forward: Some(Vec::new()),
            enable_user_config: Some(false),
            ..Default::default()
        };
        for field in Field::ALL {
            *layer.authorization_mut(field) = Some(false);
        }
        layer
    }

    /// Whether this layer lets a user layer override `field`.
    pub fn allows(&self, field: Field) -> bool {
        self.authorization(field) == Some(true)
    }

    /// Whether the user's own config file should be consulted.
    pub fn user_config_enabled(&self) -> bool {
        self.enable_user_config == Some(true)
    }

    pub fn authorization(&self, field: Field) -> Option<bool> {
        match field {
            Field::ImageName => self.enable_user_image_name,
            Field::ContainerName => self.enable_user_container_name,
            Field::MountHomeFrom => self.enable_user_mount_home_from,
            Field::MountHomeTo => self.enable_user_mount_home_to,
            Field::UserCwd => self.enable_user_user_cwd,
            Field::ContainerUsername => self.enable_user_container_username,
            Field::Shell => self.enable_user_shell,
            Field::MountHome => self.enable_user_mount_home,
            Field::MountTmp => self.enable_user_mount_tmp,
            Field::MountDockerSocket => self.enable_user_mount_docker_socket,
            Field::DockerSocket => self.enable_user_docker_socket,
            Field::Entrypoint => self.enable_user_entrypoint,
            Field::Cmd => self.enable_user_cmd,
            Field::Env => self.enable_user_env,
            Field::ReverseForward => self.enable_user_reverse_forward,
        }
    }

    /// Apply one `key = value` line of a config file.
    ///
    /// Keys are case-insensitive. List keys accumulate over repeated lines and
    /// a blank value clears the list; other keys keep their last value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let key = key.trim().to_ascii_lowercase();

        if key == ENABLE_USER_CONFIG_KEY {
            self.enable_user_config = Some(parse_bool(value)?);
            return Ok(());
        }
        if let Some(field) = key
            .strip_prefix(ENABLE_USER_PREFIX)
            .and_then(Field::from_key)
        {
            *self.authorization_mut(field) = Some(parse_bool(value)?);
            return Ok(());
        }

        let Some(field) = Field::from_key(&key) else {
            return Err(format!("unknown key '{}'", key));
        };
        let text = Some(value.to_string());
        match field {
            Field::ImageName => self.image_name = text,
            Field::ContainerName => self.container_name = text,
            Field::MountHomeFrom => self.mount_home_from = text,
            Field::MountHomeTo => self.mount_home_to = text,
            Field::UserCwd => self.user_cwd = text,
            Field::ContainerUsername => self.container_username = text,
            Field::Shell => self.shell = text,
            Field::DockerSocket => self.docker_socket = text,
            Field::Entrypoint => self.entrypoint = text,
            Field::MountHome => self.mount_home = Some(parse_bool(value)?),
            Field::MountTmp => self.mount_tmp = Some(parse_bool(value)?),
            Field::MountDockerSocket => self.mount_docker_socket = Some(parse_bool(value)?),
            Field::Cmd => push_list(&mut self.cmd, value),
            Field::Env => push_list(&mut self.env, value),
            Field::ReverseForward => push_list(&mut self.reverse_forward, value),
        }
        Ok(())
    }

    fn authorization_mut(&mut self, field: Field) -> &mut Option<bool> {
        match field {
            Field::ImageName => &mut self.enable_user_image_name,
            Field::ContainerName => &mut self.enable_user_container_name,
            Field::MountHomeFrom => &mut self.enable_user_mount_home_from,
            Field::MountHomeTo => &mut self.enable_user_mount_home_to,
            Field::UserCwd => &mut self.enable_user_user_cwd,
            Field::ContainerUsername => &mut self.enable_user_container_username,
            Field::Shell => &mut self.enable_user_shell,
            Field::MountHome => &mut self.enable_user_mount_home,
            Field::MountTmp => &mut self.enable_user_mount_tmp,
            Field::MountDockerSocket => &mut self.enable_user_mount_docker_socket,
            Field::DockerSocket => &mut self.enable_user_docker_socket,
            Field::Entrypoint => &mut self.enable_user_entrypoint,
            Field::Cmd => &mut self.enable_user_cmd,
            Field::Env => &mut self.enable_user_env,
            Field::ReverseForward => &mut self.enable_user_reverse_forward,
        }
    }
}

/// Boolean spellings accepted in config files.
fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("'{}' is not a boolean", value.trim())),
    }
}

fn push_list(list: &mut Option<Vec<String>>, value: &str) {
    if value.trim().is_empty() {
        *list = Some(Vec::new());
    } else {
        list.get_or_insert_with(Vec::new).push(value.to_string());
    }
}

/// Merge `overlay` onto `base`.
///
/// With `gated == false` every field present in the overlay replaces the base
/// value, authorization flags included. With `gated == true` a value field is
/// only replaced when `base` authorizes it, and authorization flags (including
/// `enableuserconfig`) are left exactly as in `base`.
///
/// Lists replace wholesale; they are never concatenated.
pub fn merge(base: &ConfigLayer, overlay: &ConfigLayer, gated: bool) -> ConfigLayer {
    let mut merged = base.clone();
    let allowed = |field: Field| !gated || base.allows(field);

    apply(Field::ImageName, &mut merged.image_name, &overlay.image_name, allowed(Field::ImageName));
    apply(
        Field::ContainerName,
        &mut merged.container_name,
        &overlay.container_name,
        allowed(Field::ContainerName),
    );
    apply(
        Field::MountHomeFrom,
        &mut merged.mount_home_from,
        &overlay.mount_home_from,
        allowed(Field::MountHomeFrom),
    );
    apply(
        Field::MountHomeTo,
        &mut merged.mount_home_to,
        &overlay.mount_home_to,
        allowed(Field::MountHomeTo),
    );
    apply(Field::UserCwd, &mut merged.user_cwd, &overlay.user_cwd, allowed(Field::UserCwd));
    apply(
        Field::ContainerUsername,
        &mut merged.container_username,
        &overlay.container_username,
        allowed(Field::ContainerUsername),
    );
    apply(Field::Shell, &mut merged.shell, &overlay.shell, allowed(Field::Shell));
    apply(Field::MountHome, &mut merged.mount_home, &overlay.mount_home, allowed(Field::MountHome));
    apply(Field::MountTmp, &mut merged.mount_tmp, &overlay.mount_tmp, allowed(Field::MountTmp));
    apply(
        Field::MountDockerSocket,
        &mut merged.mount_docker_socket,
        &overlay.mount_docker_socket,
        allowed(Field::MountDockerSocket),
    );
    apply(
        Field::DockerSocket,
        &mut merged.docker_socket,
        &overlay.docker_socket,
        allowed(Field::DockerSocket),
    );
    apply(
        Field::Entrypoint,
        &mut merged.entrypoint,
        &overlay.entrypoint,
        allowed(Field::Entrypoint),
    );
    apply(Field::Cmd, &mut merged.cmd, &overlay.cmd, allowed(Field::Cmd));
    apply(Field::Env, &mut merged.env, &overlay.env, allowed(Field::Env));
    apply(
        Field::ReverseForward,
        &mut merged.reverse_forward,
        &overlay.reverse_forward,
        allowed(Field::ReverseForward),
    );

    if !gated {
        for field in Field::ALL {
            if let Some(flag) = overlay.authorization(field) {
                *merged.authorization_mut(field) = Some(flag);
            }
        }
        if let Some(flag) = overlay.enable_user_config {
            merged.enable_user_config = Some(flag);
        }
    }

    merged
}

fn apply<T: Clone>(field: Field, target: &mut Option<T>, overlay: &Option<T>, allowed: bool) {
    match overlay {
        Some(value) if allowed => *target = Some(value.clone()),
        Some(_) => debug!(
            "Ignoring user setting '{}': enableuser{} is not set by the admin config",
            field, field
        ),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(entries: &[(&str, &str)]) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        for (key, value) in entries {
            layer.set(key, value).unwrap();
        }
        layer
    }

    #[test]
    fn test_builtin_defaults() {
        let defaults = ConfigLayer::builtin_defaults();
        assert_eq!(defaults.image_name.as_deref(), Some("busybox"));
        assert_eq!(defaults.container_name.as_deref(), Some("%u_dockersh"));
        assert_eq!(defaults.shell.as_deref(), Some("/bin/ash"));
        assert_eq!(defaults.entrypoint.as_deref(), Some(ENTRYPOINT_INTERNAL));
        assert!(!defaults.user_config_enabled());
        for field in Field::ALL {
            assert!(!defaults.allows(field), "{} should not be allowed", field);
        }
    }

    #[test]
    fn test_set_keys_and_lists() {
        let parsed = layer(&[
            ("imagename", "ubuntu:22.04"),
            ("mounthome", "yes"),
            ("enableusershell", "true"),
            ("env", "A=1"),
            ("env", "B=2"),
            ("cmd", "/bin/true"),
        ]);
        assert_eq!(parsed.image_name.as_deref(), Some("ubuntu:22.04"));
        assert_eq!(parsed.mount_home, Some(true));
        assert_eq!(parsed.enable_user_shell, Some(true));
        assert_eq!(
            parsed.env,
            Some(vec!["A=1".to_string(), "B=2".to_string()])
        );
        assert_eq!(parsed.cmd, Some(vec!["/bin/true".to_string()]));
        assert_eq!(parsed.shell, None);
        assert_eq!(parsed.mount_tmp, None);
    }

    #[test]
    fn test_set_last_scalar_wins() {
        let parsed = layer(&[("shell", "/bin/sh"), ("SHELL", "/bin/zsh"), ("mounttmp", "on")]);
        assert_eq!(parsed.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(parsed.mount_tmp, Some(true));
    }

    #[test]
    fn test_set_blank_list_value_resets() {
        let parsed = layer(&[("env", "A=1"), ("env", ""), ("cmd", "  ")]);
        assert_eq!(parsed.env, Some(vec![]));
        assert_eq!(parsed.cmd, Some(vec![]));
    }

    #[test]
    fn test_set_rejects_unknown_keys() {
        let mut layer = ConfigLayer::default();
        assert!(layer.set("image", "busybox").is_err());
        assert!(layer.set("enableuserimage", "true").is_err());
        assert_eq!(layer, ConfigLayer::default());
    }

    #[test]
    fn test_set_rejects_bad_booleans() {
        let mut layer = ConfigLayer::default();
        assert_eq!(
            layer.set("mounthome", "maybe"),
            Err("'maybe' is not a boolean".to_string())
        );
        assert!(layer.set("enableuserconfig", "").is_err());
    }

    #[test]
    fn test_ungated_merge_overrides_present_fields() {
        let base = ConfigLayer::builtin_defaults();
        let overlay = layer(&[("shell", "/bin/bash"), ("mounttmp", "true")]);

        let merged = merge(&base, &overlay, false);
        assert_eq!(merged.shell.as_deref(), Some("/bin/bash"));
        assert_eq!(merged.mount_tmp, Some(true));
        assert_eq!(merged.image_name.as_deref(), Some("busybox"));
    }

    #[test]
    fn test_ungated_merge_keeps_explicit_false_and_empty() {
        let base = layer(&[("mounthome", "true"), ("env", "A=1")]);
        let overlay = layer(&[("mounthome", "false"), ("env", "")]);

        let merged = merge(&base, &overlay, false);
        assert_eq!(merged.mount_home, Some(false));
        assert_eq!(merged.env, Some(vec![]));
    }

    #[test]
    fn test_ungated_merge_copies_authorization() {
        let base = ConfigLayer::builtin_defaults();
        let overlay = layer(&[("enableuserconfig", "true"), ("enableusershell", "true")]);

        let merged = merge(&base, &overlay, false);
        assert!(merged.user_config_enabled());
        assert!(merged.allows(Field::Shell));
        assert!(!merged.allows(Field::ImageName));
    }

    #[test]
    fn test_gated_merge_respects_authorization() {
        let base = merge(
            &ConfigLayer::builtin_defaults(),
            &layer(&[("enableusershell", "true")]),
            false,
        );
        let overlay = layer(&[
            ("shell", "/bin/zsh"),
            ("imagename", "evil"),
            ("mountdockersocket", "true"),
        ]);

        let merged = merge(&base, &overlay, true);
        assert_eq!(merged.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(merged.image_name.as_deref(), Some("busybox"));
        assert_eq!(merged.mount_docker_socket, Some(false));
    }

    #[test]
    fn test_gated_merge_never_grants_authorization() {
        let base = ConfigLayer::builtin_defaults();
        let overlay = layer(&[
            ("enableuserconfig", "true"),
            ("enableusermountdockersocket", "true"),
            ("mountdockersocket", "true"),
        ]);

        let merged = merge(&base, &overlay, true);
        assert_eq!(merged, base);
    }

    #[test]
    fn test_gated_merge_ignores_everything_without_flags() {
        let base = ConfigLayer::builtin_defaults();
        let overlay = layer(&[
            ("imagename", "alpine"),
            ("containername", "x"),
            ("mounthomefrom", "/"),
            ("mounthometo", "/root"),
            ("usercwd", "/"),
            ("containerusername", "root"),
            ("shell", "/bin/sh"),
            ("mounthome", "true"),
            ("mounttmp", "true"),
            ("mountdockersocket", "true"),
            ("dockersocket", "/run/other.sock"),
            ("entrypoint", "/sbin/init"),
            ("cmd", "a"),
            ("env", "B=2"),
            ("reverseforward", "80:80"),
        ]);

        assert_eq!(merge(&base, &overlay, true), base);
    }

    #[test]
    fn test_lists_replace_wholesale() {
        let base = layer(&[("env", "A=1"), ("env", "B=2")]);
        let overlay = layer(&[("env", "C=3")]);

        let merged = merge(&base, &overlay, false);
        assert_eq!(merged.env, Some(vec!["C=3".to_string()]));
    }

    #[test]
    fn test_merge_idempotent() {
        let a = ConfigLayer::builtin_defaults();
        let b = layer(&[
            ("imagename", "ubuntu"),
            ("mounthome", "true"),
            ("enableusershell", "true"),
            ("enableuserconfig", "true"),
            ("env", "A=1"),
        ]);

        let once = merge(&a, &b, false);
        let twice = merge(&once, &b, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_field_keys() {
        assert_eq!(Field::MountDockerSocket.key(), "mountdockersocket");
        assert_eq!(Field::UserCwd.to_string(), "usercwd");
        assert_eq!(Field::from_key("UserCwd"), Some(Field::UserCwd));
        assert_eq!(Field::from_key("nope"), None);
    }
}
