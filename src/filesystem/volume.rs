//! Persistent volume declarations for a profile

use crate::storage::paths::ProfileHandle;
use crate::storage::write_atomic;
use crate::{LocalshiftError, Result};
use chrono::{DateTime, Utc};
use nix::unistd::{access, AccessFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Capacity advertised for pre-claimed volumes
pub const DEFAULT_VOLUME_SIZE: &str = "10Gi";

/// Reclaim policy used when none is requested
pub const DEFAULT_RECLAIM_POLICY: &str = "Retain";

const DEFAULT_ACCESS_MODES: [&str; 3] = ["ReadWriteOnce", "ReadWriteMany", "ReadOnlyMany"];

/// Where a volume's storage comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumeSource {
    /// Storage allocated under the profile's volumes directory
    Sized { size: String },
    /// An existing host directory, never initialised by us
    PreClaimed { host_path: PathBuf },
}

/// Reference binding a volume to one claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub namespace: String,
    pub name: String,
}

impl FromStr for ClaimRef {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(format!("{} is not a valid claim reference (project/name)", s)),
        }
    }
}

/// What the caller asks for when declaring a volume
#[derive(Debug, Clone)]
pub struct VolumeRequest {
    pub name: String,
    pub source: VolumeSource,
    pub access_modes: Vec<String>,
    pub reclaim_policy: Option<String>,
    pub claim: Option<ClaimRef>,
}

impl VolumeRequest {
    pub fn sized(name: &str, size: &str) -> Self {
        Self::new(name, VolumeSource::Sized { size: size.to_string() })
    }

    pub fn pre_claimed(name: &str, host_path: impl Into<PathBuf>) -> Self {
        Self::new(name, VolumeSource::PreClaimed { host_path: host_path.into() })
    }

    fn new(name: &str, source: VolumeSource) -> Self {
        Self {
            name: name.to_string(),
            source,
            access_modes: Vec::new(),
            reclaim_policy: None,
            claim: None,
        }
    }
}

/// A declared volume as recorded in the profile's manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub source: VolumeSource,
    /// Host path mounted into the cluster
    pub target: PathBuf,
    pub access_modes: Vec<String>,
    pub reclaim_policy: String,
    #[serde(default)]
    pub claim: Option<ClaimRef>,
    pub created: DateTime<Utc>,
}

impl VolumeSpec {
    pub fn capacity(&self) -> &str {
        match &self.source {
            VolumeSource::Sized { size } => size,
            VolumeSource::PreClaimed { .. } => DEFAULT_VOLUME_SIZE,
        }
    }

    /// Size column for listings
    pub fn size_label(&self) -> &str {
        match &self.source {
            VolumeSource::Sized { size } => size,
            VolumeSource::PreClaimed { .. } => "pre-claimed",
        }
    }

    /// Host-path persistent volume object registered with the cluster
    pub fn mount_spec(&self) -> serde_json::Value {
        let mut pv = serde_json::json!({
            "kind": "PersistentVolume",
            "apiVersion": "v1",
            "metadata": { "name": self.name },
            "spec": {
                "accessModes": self.access_modes,
                "capacity": { "storage": self.capacity() },
                "hostPath": { "path": self.target.to_string_lossy() },
                "persistentVolumeReclaimPolicy": self.reclaim_policy,
            }
        });

        if let Some(claim) = &self.claim {
            pv["spec"]["claimRef"] = serde_json::json!({
                "kind": "PersistentVolumeClaim",
                "apiVersion": "v1",
                "namespace": claim.namespace,
                "name": claim.name,
            });
        }

        pv
    }
}

/// Manages the volume manifest of one profile
pub struct VolumeManager {
    handle: ProfileHandle,
}

impl VolumeManager {
    /// Create a new volume manager
    pub fn new(handle: &ProfileHandle) -> Self {
        Self {
            handle: handle.clone(),
        }
    }

    /// Declare a new volume; rejected requests leave the manifest untouched
    pub fn declare(&self, request: VolumeRequest) -> Result<VolumeSpec> {
        validate_volume_name(&request.name)?;

        let mut manifest = self.load()?;
        if manifest.contains_key(&request.name) {
            return Err(LocalshiftError::DuplicateVolume(request.name));
        }

        let target = match &request.source {
            VolumeSource::Sized { size } => {
                validate_size(size)?;
                let dir = self.handle.volume_dir(&request.name);
                fs::create_dir_all(&dir).map_err(LocalshiftError::storage(&dir))?;
                // Arbitrary uids inside the cluster must be able to write here
                fs::set_permissions(&dir, fs::Permissions::from_mode(0o777))
                    .map_err(LocalshiftError::storage(&dir))?;
                dir
            }
            VolumeSource::PreClaimed { host_path } => validate_host_path(host_path)?,
        };

        let access_modes = if request.access_modes.is_empty() {
            DEFAULT_ACCESS_MODES.iter().map(|m| m.to_string()).collect()
        } else {
            request.access_modes
        };

        let spec = VolumeSpec {
            name: request.name.clone(),
            source: request.source,
            target,
            access_modes,
            reclaim_policy: request
                .reclaim_policy
                .unwrap_or_else(|| DEFAULT_RECLAIM_POLICY.to_string()),
            claim: request.claim,
            created: Utc::now(),
        };

        manifest.insert(request.name, spec.clone());
        self.save(&manifest)?;

        tracing::info!("Declared volume {} at {}", spec.name, spec.target.display());
        Ok(spec)
    }

    /// List declared volumes, ordered by name
    pub fn list(&self) -> Result<Vec<VolumeSpec>> {
        Ok(self.load()?.into_values().collect())
    }

    fn load(&self) -> Result<BTreeMap<String, VolumeSpec>> {
        let path = self.handle.volume_manifest();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(&path).map_err(LocalshiftError::storage(&path))?;
        serde_json::from_str(&json).map_err(|e| LocalshiftError::CorruptState {
            path,
            reason: e.to_string(),
        })
    }

    fn save(&self, manifest: &BTreeMap<String, VolumeSpec>) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        write_atomic(&self.handle.volume_manifest(), json.as_bytes())
    }
}

/// Volume names become cluster object names
fn validate_volume_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 253
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.'))
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());

    if !valid {
        return Err(LocalshiftError::InvalidVolumeName(name.to_string()));
    }
    Ok(())
}

/// Sizes are whole mebibytes or gibibytes, e.g. `500Mi`, `10Gi`
pub fn validate_size(size: &str) -> Result<()> {
    let digits = size
        .strip_suffix("Gi")
        .or_else(|| size.strip_suffix("Mi"))
        .unwrap_or("");

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(LocalshiftError::InvalidVolumeSize(size.to_string()));
    }
    Ok(())
}

/// A pre-claimed directory must exist and be readable and writable by us
fn validate_host_path(path: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| LocalshiftError::InvalidHostPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let canonical = path
        .canonicalize()
        .map_err(|e| invalid(&e.to_string()))?;
    if !canonical.is_dir() {
        return Err(invalid("not a directory"));
    }
    access(canonical.as_path(), AccessFlags::R_OK | AccessFlags::W_OK)
        .map_err(|e| invalid(&format!("not readable and writable ({})", e)))?;

    Ok(canonical)
}
