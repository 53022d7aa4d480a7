//! Path management for a single profile's directory tree

use std::path::{Path, PathBuf};

/// Master configuration, relative to the platform base directory
pub const MASTER_CONFIG: &str = "kube-apiserver/master-config.yaml";

/// Exported htpasswd file consumed by the identity provider, next to the master config
pub const HTPASSWD_NAME: &str = "users.htpasswd";

/// A resolved profile: its name and the directory holding its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileHandle {
    name: String,
    root: PathBuf,
}

impl ProfileHandle {
    pub(crate) fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Profile root, also handed to the platform as its base directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Profile metadata (options, version, first-run progress)
    pub fn metadata_file(&self) -> PathBuf {
        self.root.join("profile.json")
    }

    /// Credential database
    pub fn accounts_file(&self) -> PathBuf {
        self.root.join("accounts")
    }

    /// Volume manifest
    pub fn volume_manifest(&self) -> PathBuf {
        self.root.join("volumes.json")
    }

    /// Directory holding storage for sized volumes
    pub fn volumes_dir(&self) -> PathBuf {
        self.root.join("volumes")
    }

    /// Storage for one sized volume
    pub fn volume_dir(&self, volume: &str) -> PathBuf {
        self.volumes_dir().join(volume)
    }

    pub fn master_config(&self) -> PathBuf {
        self.root.join(MASTER_CONFIG)
    }

    pub fn htpasswd_file(&self) -> PathBuf {
        self.master_config().with_file_name(HTPASSWD_NAME)
    }

    /// Generated default password, kept until an `up` has handed it out
    pub fn initial_password_file(&self) -> PathBuf {
        self.root.join("initial_password")
    }
}
