//! Loading config files and producing the effective [`Configuration`].

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};

use super::error::{ConfigOrigin, ConfigResult};
use super::interpolate::InterpolationContext;
use super::file::ConfigFile;
use super::layer::{ConfigLayer, merge};
use super::Configuration;
use crate::identity::UserIdentity;

/// System-wide config file.
pub const ADMIN_CONFIG_PATH: &str = "/etc/dockersh";

/// Per-user config file, relative to the user's home directory.
pub const USER_CONFIG_FILE: &str = ".dockersh";

/// Append the image-derived suffix to a container name.
///
/// Every `:` in the image becomes `_`; everything else is kept, so distinct
/// images never share a container.
pub fn container_name_for_image(name: &str, image: &str) -> String {
    format!("{}_{}", name, image.replace(':', "_"))
}

/// Resolves the effective configuration from defaults, admin and user files.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    admin_path: PathBuf,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(ADMIN_CONFIG_PATH)
    }
}

impl ConfigResolver {
    pub fn new(admin_path: impl Into<PathBuf>) -> Self {
        Self {
            admin_path: admin_path.into(),
        }
    }

    pub fn admin_path(&self) -> &Path {
        &self.admin_path
    }

    /// Location of `identity`'s own config file.
    pub fn user_config_path(&self, identity: &UserIdentity) -> PathBuf {
        identity.home.join(USER_CONFIG_FILE)
    }

    /// Resolve for the calling user against the process environment.
    pub fn resolve(&self) -> ConfigResult<Configuration> {
        let identity = UserIdentity::current()?;
        self.resolve_for(&identity, |name| std::env::var(name).ok())
    }

    /// Resolve for `identity`, expanding `env` entries through `lookup`.
    pub fn resolve_for<F>(
        &self,
        identity: &UserIdentity,
        lookup: F,
    ) -> ConfigResult<Configuration>
    where
        F: Fn(&str) -> Option<String>,
    {
        let layer = self.effective_layer(identity)?;
        let mut config = Configuration::from_layer(layer, identity.username.clone());

        let ctx = InterpolationContext::new(identity.home_str(), identity.username.clone());
        interpolate_config(&mut config, &ctx, &lookup);

        config.container_name =
            container_name_for_image(&config.container_name, &config.image_name);
        config.user_id = identity.uid;
        config.group_id = identity.gid;

        if !config.reverse_forward.is_empty() {
            warn!(
                "reverseforward is set ({}) but port forwarding is not supported; ignoring",
                config.reverse_forward.join(",")
            );
        }

        debug!("Config dump: {}", config.dump());
        Ok(config)
    }

    /// Merge defaults, the admin layer and (when enabled) the user layer.
    pub fn effective_layer(&self, identity: &UserIdentity) -> ConfigResult<ConfigLayer> {
        let admin = match load_file(&self.admin_path, ConfigOrigin::Admin)? {
            Some(file) => file.admin_layer(&identity.username),
            None => ConfigLayer::default(),
        };
        let effective = merge(&ConfigLayer::builtin_defaults(), &admin, false);

        if !effective.user_config_enabled() {
            debug!("User config disabled by admin config");
            return Ok(effective);
        }

        let user_path = self.user_config_path(identity);
        match load_file(&user_path, ConfigOrigin::User)? {
            Some(file) => {
                let user = file.user_section(&identity.username);
                Ok(merge(&effective, &user, true))
            }
            None => Ok(effective),
        }
    }
}

/// Read and parse a config file. A missing file is `Ok(None)`; any other
/// read failure, such as a permission error, is reported.
fn load_file(path: &Path, origin: ConfigOrigin) -> ConfigResult<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No {} config at {:?}, using defaults", origin, path);
            return Ok(None);
        }
        Err(e) => return Err(origin.error(path, e)),
    };
    let file = ConfigFile::parse(&contents).map_err(|e| origin.error(path, e))?;

    debug!("Loaded {} config from {:?}", origin, path);
    Ok(Some(file))
}

/// Expand placeholders in every templated field, in a fixed order.
fn interpolate_config<F>(config: &mut Configuration, ctx: &InterpolationContext, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    config.container_username = ctx.interpolate(&config.container_username);
    config.mount_home_to = ctx.interpolate(&config.mount_home_to);
    config.mount_home_from = ctx.interpolate(&config.mount_home_from);
    config.image_name = ctx.interpolate(&config.image_name);
    config.shell = ctx.interpolate(&config.shell);
    config.user_cwd = ctx.interpolate(&config.user_cwd);
    config.container_name = ctx.interpolate(&config.container_name);

    for entry in config.env.iter_mut() {
        *entry = ctx.interpolate_env(entry, lookup);
    }
}
