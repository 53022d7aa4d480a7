//! Profile-aware wrapper around the platform primitives

use crate::accounts::manager::DEFAULT_USER;
use crate::filesystem::volume::VolumeSpec;
use crate::runtime::command::{describe, CommandOutput};
use crate::runtime::platform::Platform;
use crate::runtime::state::RuntimeStatus;
use crate::storage::paths::ProfileHandle;
use crate::storage::profiles::{ProfileOptions, ProfileStore};
use crate::{LocalshiftError, Result};

/// Output fragments from `cluster up` meaning another instance holds the engine
const CONFLICT_MARKERS: [&str; 3] = [
    "is already running",
    "already in use by container",
    "port is already allocated",
];

/// Project the default user's context starts in
pub const DEFAULT_PROJECT: &str = "myproject";

/// What, if anything, the engine is running right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instance {
    Idle,
    /// Running, attributed to a profile when the marker names one
    Running(Option<String>),
}

/// Everything `start` needs beyond the profile itself
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub options: ProfileOptions,
    pub volumes: Vec<VolumeSpec>,
}

/// Arguments for the platform's `cluster up` primitive
pub fn start_args(handle: &ProfileHandle, options: &ProfileOptions) -> Vec<String> {
    let mut args = vec![
        "cluster".to_string(),
        "up".to_string(),
        "--base-dir".to_string(),
        handle.root().to_string_lossy().to_string(),
    ];

    let mut flag = |name: &str, value: &str| {
        args.push(format!("--{}", name));
        args.push(value.to_string());
    };

    if let Some(host) = &options.public_hostname {
        flag("public-hostname", host);
    }
    if let Some(suffix) = &options.routing_suffix {
        flag("routing-suffix", suffix);
    }
    if let Some(image) = &options.image {
        flag("image", image);
    }
    if let Some(version) = &options.version {
        flag("tag", version);
    }
    if options.loglevel > 0 {
        flag("loglevel", &options.loglevel.to_string());
    }
    if options.server_loglevel > 0 {
        flag("server-loglevel", &options.server_loglevel.to_string());
    }
    if let Some(proxy) = &options.http_proxy {
        flag("http-proxy", proxy);
    }
    if let Some(proxy) = &options.https_proxy {
        flag("https-proxy", proxy);
    }
    for host in &options.no_proxy {
        flag("no-proxy", host);
    }
    if !options.enable.is_empty() {
        flag("enable", &options.enable.join(","));
    }
    if !options.forward_ports {
        args.push("--forward-ports=false".to_string());
    }

    args
}

/// Client config context, cluster and user entries owned by a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub name: String,
    pub user: String,
    pub namespace: String,
}

impl ClientContext {
    pub fn for_profile(handle: &ProfileHandle) -> Self {
        let name = format!("{}-{}", crate::APP_NAME, handle.name());
        Self {
            user: format!("{}@{}", DEFAULT_USER, name),
            name,
            namespace: DEFAULT_PROJECT.to_string(),
        }
    }
}

/// Wraps the platform primitives with profile semantics
pub struct ClusterRuntimeAdapter<P: Platform> {
    platform: P,
    store: ProfileStore,
}

impl<P: Platform> ClusterRuntimeAdapter<P> {
    pub fn new(platform: P, store: ProfileStore) -> Self {
        Self { platform, store }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Ask the engine what is running; never answered from cached state alone
    pub async fn instance(&self) -> Result<Instance> {
        if self.platform.instance_running().await? {
            Ok(Instance::Running(self.store.active_profile()))
        } else {
            Ok(Instance::Idle)
        }
    }

    /// Status of one profile; query failures degrade to `Unknown`
    pub async fn status(&self, handle: &ProfileHandle) -> RuntimeStatus {
        match self.instance().await {
            Ok(Instance::Running(Some(active))) if active == handle.name() => {
                RuntimeStatus::Running
            }
            Ok(_) => RuntimeStatus::Stopped,
            Err(e) => {
                tracing::warn!("Unable to query status of {}: {}", handle.name(), e);
                RuntimeStatus::Unknown
            }
        }
    }

    /// Start the profile's instance and mount its volumes
    pub async fn start(&self, handle: &ProfileHandle, request: &StartRequest) -> Result<()> {
        match self.instance().await? {
            Instance::Running(Some(active)) if active == handle.name() => {
                tracing::debug!("Profile {} is already running", handle.name());
            }
            Instance::Running(active) => {
                return Err(LocalshiftError::ConflictingInstance {
                    requested: handle.name().to_string(),
                    active,
                });
            }
            Instance::Idle => {
                let args = start_args(handle, &request.options);
                println!("{}", describe("oc", &args));

                // Marked first so an interrupted start stays attributed to this profile
                self.store.set_active(handle)?;
                if let Err(e) = self.platform.cluster_up(&args).await {
                    if !interrupted(&e) {
                        self.store.clear_active()?;
                    }
                    return Err(classify_start_failure(handle, e));
                }
            }
        }

        for volume in &request.volumes {
            self.mount_volume(volume).await?;
        }
        Ok(())
    }

    /// Stop the profile's instance; stopping a stopped profile succeeds
    pub async fn stop(&self, handle: &ProfileHandle) -> Result<()> {
        match self.instance().await? {
            Instance::Running(Some(active)) if active != handle.name() => {
                tracing::debug!("Profile {} is not the running instance ({})", handle.name(), active);
                Ok(())
            }
            Instance::Running(_) => {
                self.platform.cluster_down().await?;
                self.store.clear_active()
            }
            Instance::Idle => {
                if self.store.active_profile().as_deref() == Some(handle.name()) {
                    self.store.clear_active()?;
                }
                Ok(())
            }
        }
    }

    /// Attach a shell to the master node, returning the shell's exit code
    pub async fn open_shell(&self, handle: &ProfileHandle) -> Result<i32> {
        self.require_running(handle).await?;
        self.platform.open_shell().await
    }

    /// Fail with `NotRunning` unless the profile's instance is up
    pub async fn require_running(&self, handle: &ProfileHandle) -> Result<()> {
        if self.status(handle).await != RuntimeStatus::Running {
            return Err(LocalshiftError::NotRunning(handle.name().to_string()));
        }
        Ok(())
    }

    /// Run a command inside the master node
    pub async fn exec(&self, command: &[String], input: Option<&[u8]>) -> Result<CommandOutput> {
        self.platform.exec(command, input).await
    }

    /// Register a declared volume with the cluster unless already present
    pub async fn mount_volume(&self, volume: &VolumeSpec) -> Result<()> {
        let existing = self
            .admin_client(&["get", "pv", volume.name.as_str()], None)
            .await?;
        if existing.success() {
            tracing::debug!("Volume {} already registered", volume.name);
            return Ok(());
        }

        let definition = serde_json::to_vec(&volume.mount_spec())?;
        self.admin_checked(&["create", "-f", "-"], Some(&definition))
            .await?;
        tracing::info!("Mounted volume {} from {}", volume.name, volume.target.display());
        Ok(())
    }

    pub async fn grant_cluster_role_to_user(&self, role: &str, user: &str) -> Result<()> {
        self.admin_checked(&["adm", "policy", "add-cluster-role-to-user", role, user], None)
            .await
    }

    pub async fn grant_cluster_role_to_group(&self, role: &str, group: &str) -> Result<()> {
        self.admin_checked(&["adm", "policy", "add-cluster-role-to-group", role, group], None)
            .await
    }

    pub async fn revoke_cluster_role_from_user(&self, role: &str, user: &str) -> Result<()> {
        self.admin_checked(
            &["adm", "policy", "remove-cluster-role-from-user", role, user],
            None,
        )
        .await
    }

    /// Point a client context at the running cluster, logged in as the current session
    pub async fn create_client_context(
        &self,
        context: &ClientContext,
        public_hostname: Option<&str>,
    ) -> Result<()> {
        let server = match public_hostname {
            Some(host) => format!("https://{}:8443", host),
            None => self.client_value(&["whoami", "--show-server"]).await?,
        };
        let token = self.client_value(&["whoami", "-t"]).await?;

        let server_flag = format!("--server={}", server);
        let token_flag = format!("--token={}", token);
        let cluster_flag = format!("--cluster={}", context.name);
        let user_flag = format!("--user={}", context.user);
        let namespace_flag = format!("--namespace={}", context.namespace);

        self.client_checked(&[
            "adm",
            "config",
            "set-cluster",
            context.name.as_str(),
            server_flag.as_str(),
            "--insecure-skip-tls-verify=true",
        ])
        .await?;
        self.client_checked(&["adm", "config", "set-credentials", context.user.as_str(), token_flag.as_str()])
            .await?;
        self.client_checked(&[
            "adm",
            "config",
            "set-context",
            context.name.as_str(),
            cluster_flag.as_str(),
            user_flag.as_str(),
            namespace_flag.as_str(),
        ])
        .await?;
        tracing::info!("Created client context {}", context.name);
        Ok(())
    }

    /// Make the profile's context the client's current one
    pub async fn use_client_context(&self, context: &ClientContext) -> Result<()> {
        self.client_checked(&["adm", "config", "use-context", context.name.as_str()])
            .await?;
        Ok(())
    }

    /// Delete images built for the profile, returning how many went
    pub async fn remove_profile_images(&self, handle: &ProfileHandle) -> Result<usize> {
        let label = format!("{}={}", crate::PROFILE_LABEL, handle.name());
        Ok(self.platform.remove_labelled_images(&label).await?.len())
    }

    async fn admin_client(&self, args: &[&str], input: Option<&[u8]>) -> Result<CommandOutput> {
        self.platform.client(&as_admin(args), input).await
    }

    async fn admin_checked(&self, args: &[&str], input: Option<&[u8]>) -> Result<()> {
        self.checked(as_admin(args), input).await?;
        Ok(())
    }

    async fn client_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        self.checked(args.iter().map(|a| a.to_string()).collect(), None)
            .await
    }

    /// First line of a client command's output
    async fn client_value(&self, args: &[&str]) -> Result<String> {
        let output = self.client_checked(args).await?;
        Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn checked(&self, args: Vec<String>, input: Option<&[u8]>) -> Result<CommandOutput> {
        let output = self.platform.client(&args, input).await?;
        if !output.success() {
            return Err(LocalshiftError::RuntimeCommand(
                output.failure(describe("oc", &args)),
            ));
        }
        Ok(output)
    }
}

fn as_admin(args: &[&str]) -> Vec<String> {
    args.iter()
        .map(|a| a.to_string())
        .chain(["--as".to_string(), "system:admin".to_string()])
        .collect()
}

/// A start killed by a signal may have left the instance running
fn interrupted(error: &LocalshiftError) -> bool {
    matches!(error, LocalshiftError::RuntimeStart(failure) if failure.status.is_none())
}

/// Map recognised failure markers in the start output onto specific errors
fn classify_start_failure(handle: &ProfileHandle, error: LocalshiftError) -> LocalshiftError {
    match error {
        LocalshiftError::RuntimeStart(failure)
            if failure
                .output_tail
                .iter()
                .any(|line| CONFLICT_MARKERS.iter().any(|m| line.contains(m))) =>
        {
            LocalshiftError::ConflictingInstance {
                requested: handle.name().to_string(),
                active: None,
            }
        }
        other => other,
    }
}
