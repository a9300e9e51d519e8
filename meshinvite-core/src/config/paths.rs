//! Filesystem layout of one mesh network's configuration root.

use std::path::{Path, PathBuf};

/// Primary configuration file inside the root.
pub const CONF_FILE: &str = "mesh.conf";
/// Directory holding one host file per node.
pub const HOSTS_DIR: &str = "hosts";
/// Directory holding outstanding invitation records.
pub const INVITATIONS_DIR: &str = "invitations";
/// Long-term signing key (also the ephemeral key name inside `invitations/`).
pub const SIGNING_KEY_FILE: &str = "ed25519_key.priv";
/// Legacy encryption key.
pub const ENCRYPTION_KEY_FILE: &str = "x25519_key.priv";

/// Resolved configuration root ("confbase") and the files below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    confbase: PathBuf,
}

impl ConfigPaths {
    /// Use `confbase` verbatim.
    pub fn new(confbase: impl Into<PathBuf>) -> Self {
        Self { confbase: confbase.into() }
    }

    /// `confdir/<netname>` when a namespace is given, `confdir` otherwise.
    ///
    /// Callers must have validated `netname` with
    /// [`check_netname`](crate::core_identity::check_netname).
    pub fn resolve(confdir: &Path, netname: Option<&str>) -> Self {
        match netname {
            Some(net) => Self::new(confdir.join(net)),
            None => Self::new(confdir),
        }
    }

    pub fn confbase(&self) -> &Path {
        &self.confbase
    }

    pub fn conf_file(&self) -> PathBuf {
        self.confbase.join(CONF_FILE)
    }

    pub fn hosts_dir(&self) -> PathBuf {
        self.confbase.join(HOSTS_DIR)
    }

    /// Host file of `name`. `name` must already have passed `check_id`.
    pub fn host_file(&self, name: &str) -> PathBuf {
        self.hosts_dir().join(name)
    }

    pub fn invitations_dir(&self) -> PathBuf {
        self.confbase.join(INVITATIONS_DIR)
    }

    pub fn invitation_key(&self) -> PathBuf {
        self.invitations_dir().join(SIGNING_KEY_FILE)
    }

    pub fn signing_key(&self) -> PathBuf {
        self.confbase.join(SIGNING_KEY_FILE)
    }

    pub fn encryption_key(&self) -> PathBuf {
        self.confbase.join(ENCRYPTION_KEY_FILE)
    }
}
