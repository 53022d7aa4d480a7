//! Process-wide settings: where profiles live and which binaries to drive

use crate::{LocalshiftError, Result};
use std::path::{Path, PathBuf};

/// Resolved settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    root_dir: PathBuf,
    profiles_dir: PathBuf,
    pub oc: String,
    pub docker: String,
    pub container: String,
}

impl Settings {
    /// Resolve settings, filling unset directories from the user's home (~/.localshift/)
    pub fn resolve(
        root_dir: Option<PathBuf>,
        profiles_dir: Option<PathBuf>,
        oc: impl Into<String>,
        docker: impl Into<String>,
        container: impl Into<String>,
    ) -> Result<Self> {
        let root_dir = match root_dir {
            Some(dir) => dir,
            None => {
                let home = dirs::home_dir().ok_or_else(|| LocalshiftError::Storage {
                    path: PathBuf::from("~"),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "Could not determine user home directory. Please ensure HOME environment variable is set.",
                    ),
                })?;
                home.join(".localshift")
            }
        };
        let profiles_dir = profiles_dir.unwrap_or_else(|| root_dir.join("profiles"));

        Ok(Self {
            root_dir,
            profiles_dir,
            oc: oc.into(),
            docker: docker.into(),
            container: container.into(),
        })
    }

    /// Settings rooted at a custom directory with default binaries
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root_dir = root.as_ref().to_path_buf();
        Self {
            profiles_dir: root_dir.join("profiles"),
            root_dir,
            oc: "oc".to_string(),
            docker: "docker".to_string(),
            container: "origin".to_string(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn profiles_dir(&self) -> &Path {
        &self.profiles_dir
    }

    /// Marker naming the profile most recently started
    pub fn active_profile_file(&self) -> PathBuf {
        self.root_dir.join("active_profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_profiles_dir_defaults_under_root() {
        let tmp = TempDir::new().unwrap();
        let settings =
            Settings::resolve(Some(tmp.path().to_path_buf()), None, "oc", "docker", "origin")
                .unwrap();

        assert_eq!(settings.root_dir(), tmp.path());
        assert_eq!(settings.profiles_dir(), tmp.path().join("profiles"));
        assert_eq!(settings.active_profile_file(), tmp.path().join("active_profile"));
    }

    #[test]
    fn test_profiles_dir_override() {
        let tmp = TempDir::new().unwrap();
        let other = tmp.path().join("elsewhere");
        let settings = Settings::resolve(
            Some(tmp.path().to_path_buf()),
            Some(other.clone()),
            "oc",
            "podman",
            "master",
        )
        .unwrap();

        assert_eq!(settings.profiles_dir(), other);
        assert_eq!(settings.docker, "podman");
        assert_eq!(settings.container, "master");
    }
}
