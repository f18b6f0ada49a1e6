//! Calling user lookup.

use log::debug;
use rustix::process::{getgid, getuid};
use std::ffi::CStr;
use std::path::PathBuf;

use crate::config::{ConfigError, ConfigResult};

/// The OS user running dockersh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub home: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

impl UserIdentity {
    pub fn new(
        username: impl Into<String>,
        home: impl Into<PathBuf>,
        uid: u32,
        gid: u32,
    ) -> Self {
        Self {
            username: username.into(),
            home: home.into(),
            uid,
            gid,
        }
    }

    /// Look up the real uid/gid of this process and its passwd entry.
    pub fn current() -> ConfigResult<Self> {
        let uid = getuid().as_raw();
        let gid = getgid().as_raw();

        let (username, home) = passwd_entry(uid)?;
        if username.is_empty() {
            return Err(ConfigError::Identity(format!(
                "passwd entry for uid {} has an empty username",
                uid
            )));
        }
        if home.as_os_str().is_empty() {
            return Err(ConfigError::Identity(format!(
                "passwd entry for '{}' has no home directory",
                username
            )));
        }

        debug!(
            "Resolved calling user: {} uid={} gid={} home={}",
            username,
            uid,
            gid,
            home.display()
        );
        Ok(Self::new(username, home, uid, gid))
    }

    /// Home directory as a string for placeholder interpolation.
    pub fn home_str(&self) -> String {
        self.home.to_string_lossy().into_owned()
    }
}

fn passwd_entry(uid: u32) -> ConfigResult<(String, PathBuf)> {
    // SAFETY: getpwuid returns a pointer into static storage or null. dockersh is
    // single-threaded and both fields are copied out before any other passwd call.
    let passwd = unsafe { libc::getpwuid(uid) };

    if passwd.is_null() {
        return Err(ConfigError::Identity(format!(
            "no passwd entry for uid {}",
            uid
        )));
    }

    // SAFETY: passwd is non-null and pw_name/pw_dir are valid C strings.
    let (name, dir) = unsafe {
        (
            CStr::from_ptr((*passwd).pw_name),
            CStr::from_ptr((*passwd).pw_dir),
        )
    };

    let username = name
        .to_str()
        .map_err(|_| ConfigError::Identity(format!("username for uid {} is not UTF-8", uid)))?
        .to_string();
    let home = dir
        .to_str()
        .map_err(|_| ConfigError::Identity(format!("home for uid {} is not UTF-8", uid)))?;

    Ok((username, PathBuf::from(home)))
}
