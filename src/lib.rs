//! Localshift - persistent profiles for a local all-in-one OpenShift cluster
//!
//! Each profile owns the on-disk state of one cluster instance (platform
//! config tree, credential database, persistent volumes) so that instances
//! can be stopped, restarted and switched between without losing data.

pub mod accounts;
pub mod cli;
pub mod cluster;
pub mod filesystem;
pub mod lifecycle;
pub mod runtime;
pub mod settings;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use thiserror::Error;

/// Captured result of a subprocess that exited unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: String,
    pub status: Option<i32>,
    pub output_tail: Vec<String>,
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "`{}` exited with status {}", self.command, code)?,
            None => write!(f, "`{}` was terminated by a signal", self.command)?,
        }
        for line in &self.output_tail {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// Main error type for Localshift operations
#[derive(Error, Debug)]
pub enum LocalshiftError {
    #[error("Invalid profile name: {0:?}")]
    InvalidProfileName(String),

    #[error("No such profile: {0}")]
    UnknownProfile(String),

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state in {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Cannot start profile \"{requested}\": already running \"{}\"", active.as_deref().unwrap_or("<unknown>"))]
    ConflictingInstance {
        requested: String,
        active: Option<String>,
    },

    #[error("Cluster start failed: {0}")]
    RuntimeStart(CommandFailure),

    #[error("Cluster command failed: {0}")]
    RuntimeCommand(CommandFailure),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Profile is not running: {0}")]
    NotRunning(String),

    #[error("Failed to apply {patch} patch: {reason}")]
    PatchApplication { patch: String, reason: String },

    #[error("Invalid user name: {0:?}")]
    InvalidUserName(String),

    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("No such user: {0}")]
    UnknownUser(String),

    #[error("Cannot remove {0}: it is the last administrator")]
    LastAdmin(String),

    #[error("Volume already declared: {0}")]
    DuplicateVolume(String),

    #[error("Invalid host path {}: {reason}", path.display())]
    InvalidHostPath { path: PathBuf, reason: String },

    #[error("Invalid volume name: {0:?}")]
    InvalidVolumeName(String),

    #[error("Invalid volume size: {0} (expected e.g. 500Mi or 10Gi)")]
    InvalidVolumeSize(String),

    #[error("Profile must be stopped first: {0}")]
    MustStopFirst(String),
}

impl LocalshiftError {
    /// Build a closure mapping an I/O error on `path` into a storage error
    pub fn storage(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Storage { path, source }
    }
}

pub type Result<T> = std::result::Result<T, LocalshiftError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "localshift";

/// Profile used when none is named on the command line
pub const DEFAULT_PROFILE: &str = "default";

/// Image label attached to everything built inside a profile's cluster
pub const PROFILE_LABEL: &str = "localshift-profile";
