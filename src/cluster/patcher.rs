//! Patches applied to the master configuration of a running cluster

use crate::runtime::adapter::ClusterRuntimeAdapter;
use crate::runtime::command::describe;
use crate::runtime::platform::Platform;
use crate::storage::paths::{ProfileHandle, HTPASSWD_NAME};
use crate::storage::write_atomic;
use crate::{LocalshiftError, Result, PROFILE_LABEL};
use serde_json::json;
use std::fs;

/// Name given to the password identity provider
pub const IDENTITY_PROVIDER_NAME: &str = "htpasswd";

/// The `ex config patch` sub-command, which moved between binaries across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTool {
    Oc,
    Openshift,
}

impl PatchTool {
    fn program(&self) -> &'static str {
        match self {
            Self::Oc => "oc",
            Self::Openshift => "openshift",
        }
    }

    fn alternate(&self) -> Self {
        match self {
            Self::Oc => Self::Openshift,
            Self::Openshift => Self::Oc,
        }
    }

    pub fn command(&self) -> Vec<String> {
        [self.program(), "ex", "config", "patch"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Check the preferred tool responds inside the master node, falling back to the alternate
    pub async fn resolve<P: Platform>(runtime: &ClusterRuntimeAdapter<P>) -> Self {
        let preferred = Self::Oc;
        let mut help = preferred.command();
        help.push("--help".to_string());

        match runtime.exec(&help, None).await {
            Ok(output) if output.success() => preferred,
            Ok(_) | Err(_) => {
                tracing::debug!(
                    "{} not available, using {}",
                    describe(preferred.program(), &help[1..]),
                    preferred.alternate().program()
                );
                preferred.alternate()
            }
        }
    }
}

/// Merge patch enabling username/password challenge against the profile's htpasswd file
///
/// The file is named relative to the master config, which the master resolves
/// inside its own container.
pub fn identity_provider_patch() -> serde_json::Value {
    json!({
        "oauthConfig": {
            "identityProviders": [{
                "name": IDENTITY_PROVIDER_NAME,
                "challenge": true,
                "login": true,
                "mappingMethod": "claim",
                "provider": {
                    "apiVersion": "v1",
                    "kind": "HTPasswdPasswordIdentityProvider",
                    "file": HTPASSWD_NAME,
                }
            }]
        }
    })
}

/// Merge patch labelling every built image with the owning profile
pub fn image_labels_patch(profile: &str) -> serde_json::Value {
    json!({
        "admissionConfig": {
            "pluginConfig": {
                "BuildDefaults": {
                    "configuration": {
                        "apiVersion": "v1",
                        "kind": "BuildDefaultsConfig",
                        "imageLabels": [{
                            "name": PROFILE_LABEL,
                            "value": profile,
                        }]
                    }
                }
            }
        }
    })
}

/// Applies named patches through the cluster's patch helper
pub struct ConfigPatcher<'a, P: Platform> {
    runtime: &'a ClusterRuntimeAdapter<P>,
    tool: PatchTool,
}

impl<'a, P: Platform> ConfigPatcher<'a, P> {
    /// Resolve the patch tool once for this patcher
    pub async fn new(runtime: &'a ClusterRuntimeAdapter<P>) -> Self {
        let tool = PatchTool::resolve(runtime).await;
        Self { runtime, tool }
    }

    pub fn tool(&self) -> PatchTool {
        self.tool
    }

    pub async fn enable_identity_provider(&self, handle: &ProfileHandle) -> Result<()> {
        self.apply(handle, "identity provider", identity_provider_patch())
            .await
    }

    pub async fn tag_build_images(&self, handle: &ProfileHandle, profile: &str) -> Result<()> {
        self.apply(handle, "image labels", image_labels_patch(profile))
            .await
    }

    async fn apply(&self, handle: &ProfileHandle, name: &str, patch: serde_json::Value) -> Result<()> {
        let failed = |reason: String| LocalshiftError::PatchApplication {
            patch: name.to_string(),
            reason,
        };

        let path = handle.master_config();
        let current = fs::read_to_string(&path)
            .map_err(|e| failed(format!("cannot read {}: {}", path.display(), e)))?;
        parse_document(&current).map_err(|e| failed(format!("{} is malformed: {}", path.display(), e)))?;

        let mut command = self.tool.command();
        command.push(path.to_string_lossy().to_string());
        command.push("--patch".to_string());
        command.push(patch.to_string());

        let output = self.runtime.exec(&command, None).await?;
        // Never commit the helper's output unless it succeeded
        if !output.success() {
            let failure = output.failure(describe(&command[0], &command[1..]));
            return Err(failed(failure.to_string()));
        }

        let patched = parse_document(&output.stdout)
            .map_err(|e| failed(format!("helper returned an invalid document: {}", e)))?;
        let rendered = serde_yaml::to_string(&patched)
            .map_err(|e| failed(format!("cannot render document: {}", e)))?;

        if rendered == current {
            tracing::debug!("{} patch already applied to {}", name, path.display());
            return Ok(());
        }
        write_atomic(&path, rendered.as_bytes())?;
        tracing::info!("Applied {} patch to {}", name, path.display());
        Ok(())
    }
}

/// The master config must be a YAML mapping
fn parse_document(text: &str) -> std::result::Result<serde_yaml::Value, String> {
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    if !value.is_mapping() {
        return Err("not a mapping".to_string());
    }
    Ok(value)
}
