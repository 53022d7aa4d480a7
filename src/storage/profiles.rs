//! Profile storage: name resolution, directory lifecycle and metadata

use crate::settings::Settings;
use crate::storage::paths::ProfileHandle;
use crate::storage::write_atomic;
use crate::{LocalshiftError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

/// Startup options remembered from a profile's first `up`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    pub image: Option<String>,
    pub version: Option<String>,
    pub public_hostname: Option<String>,
    pub routing_suffix: Option<String>,
    pub loglevel: u32,
    pub server_loglevel: u32,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Vec<String>,
    pub enable: Vec<String>,
    /// Forward cluster ports from the host; only needed when the engine is reachable on loopback alone
    pub forward_ports: bool,
}

/// First-run steps completed so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupProgress {
    pub client_context: bool,
    pub identity_provider: bool,
    pub image_labels: bool,
    pub accounts: bool,
    pub complete: bool,
}

/// Contents of `profile.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub options: ProfileOptions,
    #[serde(default)]
    pub setup: SetupProgress,
}

impl ProfileMetadata {
    pub fn new(name: &str, options: ProfileOptions) -> Self {
        Self {
            name: name.to_string(),
            created: Utc::now(),
            version: None,
            options,
            setup: SetupProgress::default(),
        }
    }
}

/// Resolves profile names to directories under the profiles directory
#[derive(Debug, Clone)]
pub struct ProfileStore {
    profiles_dir: PathBuf,
    active_file: PathBuf,
}

impl ProfileStore {
    /// Create a new profile store
    pub fn new(settings: &Settings) -> Self {
        Self {
            profiles_dir: settings.profiles_dir().to_path_buf(),
            active_file: settings.active_profile_file(),
        }
    }

    /// Map a profile name to its handle; purely a function of the name
    pub fn resolve(&self, name: &str) -> Result<ProfileHandle> {
        validate_name(name)?;
        Ok(ProfileHandle::new(name, self.profiles_dir.join(name)))
    }

    /// True if the profile directory is present and non-empty
    pub fn exists(&self, handle: &ProfileHandle) -> bool {
        fs::read_dir(handle.root())
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Create the profile directory tree if absent
    pub fn ensure(&self, handle: &ProfileHandle) -> Result<()> {
        for dir in [handle.root().to_path_buf(), handle.volumes_dir()] {
            fs::create_dir_all(&dir).map_err(LocalshiftError::storage(&dir))?;
        }
        Ok(())
    }

    /// Recursively delete the profile directory; the cluster must already be stopped
    pub fn remove(&self, handle: &ProfileHandle) -> Result<()> {
        if !handle.root().exists() {
            return Ok(());
        }
        fs::remove_dir_all(handle.root()).map_err(LocalshiftError::storage(handle.root()))?;

        if self.active_profile().as_deref() == Some(handle.name()) {
            self.clear_active()?;
        }
        Ok(())
    }

    /// Names of all profiles on disk, sorted
    pub fn names(&self) -> Result<Vec<String>> {
        if !self.profiles_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let entries =
            fs::read_dir(&self.profiles_dir).map_err(LocalshiftError::storage(&self.profiles_dir))?;
        for entry in entries {
            let entry = entry.map_err(LocalshiftError::storage(&self.profiles_dir))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load profile metadata, `None` if the profile has none yet
    pub fn load_metadata(&self, handle: &ProfileHandle) -> Result<Option<ProfileMetadata>> {
        let path = handle.metadata_file();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(LocalshiftError::storage(&path))?;
        let metadata = serde_json::from_str(&json).map_err(|e| LocalshiftError::CorruptState {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(metadata))
    }

    pub fn save_metadata(&self, handle: &ProfileHandle, metadata: &ProfileMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        write_atomic(&handle.metadata_file(), json.as_bytes())
    }

    /// Name of the profile recorded as started most recently
    pub fn active_profile(&self) -> Option<String> {
        fs::read_to_string(&self.active_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn set_active(&self, handle: &ProfileHandle) -> Result<()> {
        if let Some(parent) = self.active_file.parent() {
            fs::create_dir_all(parent).map_err(LocalshiftError::storage(parent))?;
        }
        write_atomic(&self.active_file, handle.name().as_bytes())
    }

    pub fn clear_active(&self) -> Result<()> {
        match fs::remove_file(&self.active_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LocalshiftError::storage(&self.active_file)(e)),
        }
    }

    /// Keep a generated password, readable by the owner only, until it is handed out
    pub fn save_initial_password(&self, handle: &ProfileHandle, password: &str) -> Result<()> {
        let path = handle.initial_password_file();
        write_atomic(&path, password.as_bytes())?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(LocalshiftError::storage(&path))
    }

    /// Remove and return the pending generated password, if any
    pub fn take_initial_password(&self, handle: &ProfileHandle) -> Result<Option<String>> {
        let path = handle.initial_password_file();
        let password = match fs::read_to_string(&path) {
            Ok(password) => password,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LocalshiftError::storage(&path)(e)),
        };
        fs::remove_file(&path).map_err(LocalshiftError::storage(&path))?;
        Ok(Some(password))
    }
}

/// Profile names become directory names and image label values
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => chars
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
        _ => false,
    };

    if !valid || name.len() > 63 {
        return Err(LocalshiftError::InvalidProfileName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> ProfileStore {
        ProfileStore::new(&Settings::with_root(tmp.path()))
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let first = store(&tmp).resolve("dev").unwrap();
        let second = store(&tmp).resolve("dev").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.root(), tmp.path().join("profiles/dev"));
    }

    #[test]
    fn test_resolve_rejects_unsafe_names() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let long = "x".repeat(64);

        for name in ["", ".", "..", "../etc", "a/b", "-dash", "has space", long.as_str()] {
            assert!(
                matches!(store.resolve(name), Err(LocalshiftError::InvalidProfileName(_))),
                "accepted {:?}",
                name
            );
        }
        assert!(store.resolve("research-2.v3_x").is_ok());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let handle = store.resolve("dev").unwrap();

        assert!(!store.exists(&handle));
        store.ensure(&handle).unwrap();
        assert!(store.exists(&handle));

        fs::write(handle.accounts_file(), "keep").unwrap();
        store.ensure(&handle).unwrap();
        assert_eq!(fs::read_to_string(handle.accounts_file()).unwrap(), "keep");
    }

    #[test]
    fn test_empty_directory_does_not_exist() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let handle = store.resolve("dev").unwrap();

        fs::create_dir_all(handle.root()).unwrap();
        assert!(!store.exists(&handle));
    }

    #[test]
    fn test_remove_and_names() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for name in ["b", "a"] {
            store.ensure(&store.resolve(name).unwrap()).unwrap();
        }
        assert_eq!(store.names().unwrap(), vec!["a", "b"]);

        let handle = store.resolve("a").unwrap();
        store.set_active(&handle).unwrap();
        store.remove(&handle).unwrap();

        assert_eq!(store.names().unwrap(), vec!["b"]);
        assert_eq!(store.active_profile(), None);
    }

    #[test]
    fn test_metadata_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let handle = store.resolve("dev").unwrap();
        store.ensure(&handle).unwrap();

        assert!(store.load_metadata(&handle).unwrap().is_none());

        let mut metadata = ProfileMetadata::new("dev", ProfileOptions::default());
        metadata.setup.identity_provider = true;
        store.save_metadata(&handle, &metadata).unwrap();

        let loaded = store.load_metadata(&handle).unwrap().unwrap();
        assert_eq!(loaded.name, "dev");
        assert!(loaded.setup.identity_provider);
        assert!(!loaded.setup.complete);
    }

    #[test]
    fn test_corrupt_metadata() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let handle = store.resolve("dev").unwrap();
        store.ensure(&handle).unwrap();
        fs::write(handle.metadata_file(), "{not json").unwrap();

        assert!(matches!(
            store.load_metadata(&handle),
            Err(LocalshiftError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_initial_password_is_private_and_taken_once() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let handle = store.resolve("dev").unwrap();
        store.ensure(&handle).unwrap();

        assert_eq!(store.take_initial_password(&handle).unwrap(), None);
        store.save_initial_password(&handle, "s3cret").unwrap();
        let mode = fs::metadata(handle.initial_password_file()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        assert_eq!(store.take_initial_password(&handle).unwrap().as_deref(), Some("s3cret"));
        assert!(!handle.initial_password_file().exists());
        assert_eq!(store.take_initial_password(&handle).unwrap(), None);
    }
}
