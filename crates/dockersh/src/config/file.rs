//! Config file format.
//!
//! Files are INI style, with a default section and named per-user sections:
//!
//! ```ini
//! [dockersh]
//! imagename = ubuntu:22.04
//! mounthome = yes
//! env = LANG=C.UTF-8
//! env = TERM=$TERM
//!
//! [user "alice"]
//! shell = /bin/zsh
//! ```
//!
//! Section and key names are case-insensitive; user names are not. Values may
//! be quoted. Booleans accept `true`/`false`, `yes`/`no`, `on`/`off` and
//! `1`/`0`. List keys (`cmd`, `env`, `reverseforward`) collect every
//! occurrence in order. Unknown sections and keys are errors.

use ini::Ini;
use log::debug;
use std::collections::HashMap;

use super::error::ConfigFormatError;
use super::layer::{ConfigLayer, merge};

/// Name of the default section.
pub const DEFAULT_SECTION: &str = "dockersh";

/// Name of the per-user sections, written `[user "<name>"]`.
pub const USER_SECTION: &str = "user";

/// A parsed config file: the `[dockersh]` section plus `[user "<name>"]` sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub dockersh: ConfigLayer,
    pub user: HashMap<String, ConfigLayer>,
}

impl ConfigFile {
    pub fn parse(contents: &str) -> Result<Self, ConfigFormatError> {
        let ini = Ini::load_from_str(contents)?;
        let mut file = ConfigFile::default();

        for (section, properties) in ini.iter() {
            let Some(section) = section else {
                if let Some((key, _)) = properties.iter().next() {
                    return Err(ConfigFormatError::OutsideSection(key.trim().to_string()));
                }
                continue;
            };

            let layer = match SectionName::parse(section)? {
                SectionName::Default => &mut file.dockersh,
                SectionName::User(name) => file.user.entry(name).or_default(),
            };

            for (key, value) in properties.iter() {
                layer
                    .set(key, value)
                    .map_err(|message| ConfigFormatError::InvalidValue {
                        section: section.trim().to_string(),
                        key: key.trim().to_string(),
                        message,
                    })?;
            }
        }

        Ok(file)
    }

    /// Layer contributed by the admin file for `username`.
    ///
    /// The file's own `[user "<name>"]` section is applied ungated on top of
    /// its `[dockersh]` section, so the admin can tailor a single user.
    pub fn admin_layer(&self, username: &str) -> ConfigLayer {
        match self.user.get(username) {
            Some(section) => {
                debug!("Admin config has a section for user '{}'", username);
                merge(&self.dockersh, section, false)
            }
            None => self.dockersh.clone(),
        }
    }

    /// Layer contributed by a user's own file: only their `[user "<name>"]` section.
    ///
    /// A file without a matching section is an all-absent layer.
    pub fn user_section(&self, username: &str) -> ConfigLayer {
        match self.user.get(username) {
            Some(section) => section.clone(),
            None => {
                debug!("User config has no section for '{}'", username);
                ConfigLayer::default()
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SectionName {
    Default,
    User(String),
}

impl SectionName {
    fn parse(header: &str) -> Result<Self, ConfigFormatError> {
        let header = header.trim();
        let unknown = || ConfigFormatError::UnknownSection(header.to_string());

        let (name, subsection) = match header.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, Some(rest.trim())),
            None => (header, None),
        };

        match subsection {
            None if name.eq_ignore_ascii_case(DEFAULT_SECTION) => Ok(SectionName::Default),
            Some(quoted) if name.eq_ignore_ascii_case(USER_SECTION) => quoted
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .filter(|user| !user.is_empty())
                .map(|user| SectionName::User(user.to_string()))
                .ok_or_else(unknown),
            _ => Err(unknown()),
        }
    }
}
