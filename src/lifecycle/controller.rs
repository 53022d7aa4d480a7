//! Orchestration of profile lifecycle commands

use crate::accounts::manager::{UserAccount, UserAccountManager};
use crate::cluster::patcher::ConfigPatcher;
use crate::filesystem::volume::{VolumeManager, VolumeRequest, VolumeSpec};
use crate::runtime::adapter::{ClientContext, ClusterRuntimeAdapter, Instance, StartRequest};
use crate::runtime::platform::{OcPlatform, Platform};
use crate::runtime::state::{ProfileEvent, ProfileState, RuntimeStatus};
use crate::settings::Settings;
use crate::storage::paths::ProfileHandle;
use crate::storage::profiles::{ProfileMetadata, ProfileOptions, ProfileStore};
use crate::{LocalshiftError, Result};
use std::net::Ipv4Addr;

/// Cluster role granted to every authenticated user on first run
pub const SUDOER_ROLE: &str = "sudoer";

/// Group the sudoer role is granted to
pub const AUTHENTICATED_GROUP: &str = "system:authenticated";

/// Cluster role held by administrator accounts
pub const ADMIN_ROLE: &str = "cluster-admin";

/// What an `up` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpOutcome {
    /// The profile directory was created by this call
    pub created: bool,
    /// The profile was already the running instance
    pub already_running: bool,
    /// Generated password of the default account, when it was just created
    pub developer_password: Option<String>,
}

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub name: String,
    pub version: Option<String>,
    pub status: RuntimeStatus,
}

impl ProfileSummary {
    /// `name/version`, or just the name when the version is unknown
    pub fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{}/{}", self.name, version),
            None => self.name.clone(),
        }
    }
}

/// Fill in the public hostname, routing suffix and port forwarding from the engine's host address
///
/// The routing suffix is derived from the host address even when a public
/// hostname was given, since wildcard DNS needs an address routes resolve to.
pub fn apply_network_defaults(profile: &str, options: &mut ProfileOptions, host: Option<String>) {
    let ip = host.as_deref().and_then(|h| h.parse::<Ipv4Addr>().ok());
    let routable = ip.filter(|ip| !ip.is_loopback());

    if options.routing_suffix.is_none() {
        if let Some(ip) = routable {
            options.routing_suffix = Some(format!("apps.{}.{}.nip.io", profile, ip));
        }
    }
    if options.public_hostname.is_none() {
        options.public_hostname = host;
    }
    options.forward_ports = routable.is_none();
}

/// Names of requested options that differ from the remembered ones
fn differing_options(requested: &ProfileOptions, remembered: &ProfileOptions) -> Vec<&'static str> {
    let mut differing = Vec::new();
    let mut check = |name: &'static str, set: bool, same: bool| {
        if set && !same {
            differing.push(name);
        }
    };

    check("image", requested.image.is_some(), requested.image == remembered.image);
    check("version", requested.version.is_some(), requested.version == remembered.version);
    check(
        "public-hostname",
        requested.public_hostname.is_some(),
        requested.public_hostname == remembered.public_hostname,
    );
    check(
        "routing-suffix",
        requested.routing_suffix.is_some(),
        requested.routing_suffix == remembered.routing_suffix,
    );
    check("loglevel", requested.loglevel > 0, requested.loglevel == remembered.loglevel);
    check(
        "server-loglevel",
        requested.server_loglevel > 0,
        requested.server_loglevel == remembered.server_loglevel,
    );
    check(
        "http-proxy",
        requested.http_proxy.is_some(),
        requested.http_proxy == remembered.http_proxy,
    );
    check(
        "https-proxy",
        requested.https_proxy.is_some(),
        requested.https_proxy == remembered.https_proxy,
    );
    check(
        "no-proxy",
        !requested.no_proxy.is_empty(),
        requested.no_proxy == remembered.no_proxy,
    );
    check("enable", !requested.enable.is_empty(), requested.enable == remembered.enable);

    differing
}

/// Drives profiles through `Absent -> Initializing -> Stopped <-> Running`
pub struct ProfileLifecycleController<P: Platform> {
    store: ProfileStore,
    runtime: ClusterRuntimeAdapter<P>,
}

impl ProfileLifecycleController<OcPlatform> {
    /// Controller driving the real platform binary and container engine
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(OcPlatform::new(settings), settings)
    }
}

impl<P: Platform> ProfileLifecycleController<P> {
    pub fn new(platform: P, settings: &Settings) -> Self {
        let store = ProfileStore::new(settings);
        Self {
            runtime: ClusterRuntimeAdapter::new(platform, store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn runtime(&self) -> &ClusterRuntimeAdapter<P> {
        &self.runtime
    }

    /// Create the profile if needed, start it and finish any pending first-run setup
    ///
    /// Every step is recorded in the profile metadata as it completes, so an
    /// interrupted `up` picks up where it stopped when run again.
    pub async fn up(&self, name: &str, options: ProfileOptions) -> Result<UpOutcome> {
        let handle = self.store.resolve(name)?;

        // Check before touching the disk so a refused start leaves nothing behind
        let already_running = match self.runtime.instance().await? {
            Instance::Running(Some(active)) if active == name => true,
            Instance::Running(active) => {
                return Err(LocalshiftError::ConflictingInstance {
                    requested: name.to_string(),
                    active,
                });
            }
            Instance::Idle => false,
        };

        let created = !self.store.exists(&handle);
        if created {
            println!("Creating profile {}", name);
        }
        self.store.ensure(&handle)?;
        let mut metadata = self.load_or_create_metadata(&handle, options).await?;

        let request = StartRequest {
            options: metadata.options.clone(),
            volumes: VolumeManager::new(&handle).list()?,
        };
        if already_running {
            println!("Profile {} is already running", name);
        } else {
            println!("Starting profile {}", name);
        }
        self.runtime.start(&handle, &request).await?;

        let context = ClientContext::for_profile(&handle);
        if !metadata.setup.client_context {
            self.runtime
                .create_client_context(&context, metadata.options.public_hostname.as_deref())
                .await?;
            metadata.setup.client_context = true;
            self.store.save_metadata(&handle, &metadata)?;
        }

        let developer_password = if metadata.setup.complete {
            None
        } else {
            self.first_run(&handle, &mut metadata, &request).await?
        };

        self.runtime.use_client_context(&context).await?;

        self.reconcile_admin_grants(&handle).await?;
        println!("Started profile {}", name);

        Ok(UpOutcome {
            created,
            already_running,
            developer_password,
        })
    }

    async fn load_or_create_metadata(
        &self,
        handle: &ProfileHandle,
        options: ProfileOptions,
    ) -> Result<ProfileMetadata> {
        if let Some(metadata) = self.store.load_metadata(handle)? {
            let differing = differing_options(&options, &metadata.options);
            if !differing.is_empty() {
                tracing::warn!(
                    "Profile {} keeps the options it was created with; ignoring --{}",
                    handle.name(),
                    differing.join(", --")
                );
            }
            return Ok(metadata);
        }

        let mut options = options;
        let platform = self.runtime.platform();
        apply_network_defaults(handle.name(), &mut options, platform.host_address().await);

        let mut metadata = ProfileMetadata::new(handle.name(), options);
        metadata.version = match &metadata.options.version {
            Some(version) => Some(version.clone()),
            None => platform.version().await,
        };
        self.store.save_metadata(handle, &metadata)?;
        Ok(metadata)
    }

    async fn first_run(
        &self,
        handle: &ProfileHandle,
        metadata: &mut ProfileMetadata,
        request: &StartRequest,
    ) -> Result<Option<String>> {
        let patcher = ConfigPatcher::new(&self.runtime).await;

        if metadata.setup.identity_provider {
            tracing::debug!("Identity provider already configured for {}", handle.name());
        } else {
            patcher.enable_identity_provider(handle).await?;
            metadata.setup.identity_provider = true;
            self.store.save_metadata(handle, metadata)?;
        }

        if metadata.setup.image_labels {
            tracing::debug!("Image labels already configured for {}", handle.name());
        } else {
            patcher.tag_build_images(handle, handle.name()).await?;
            metadata.setup.image_labels = true;
            self.store.save_metadata(handle, metadata)?;
        }

        if !metadata.setup.accounts {
            // Saved before anything else can fail, handed out once setup completes
            if let Some(password) = UserAccountManager::for_profile(handle).bootstrap_default_account()? {
                self.store.save_initial_password(handle, &password)?;
            }
            self.runtime
                .grant_cluster_role_to_group(SUDOER_ROLE, AUTHENTICATED_GROUP)
                .await?;
            metadata.setup.accounts = true;
            self.store.save_metadata(handle, metadata)?;
        }

        // Patched master config is only read at startup
        println!("Restarting profile {} to apply configuration", handle.name());
        self.runtime.stop(handle).await?;
        self.runtime.start(handle, request).await?;

        metadata.setup.complete = true;
        self.store.save_metadata(handle, metadata)?;
        self.store.take_initial_password(handle)
    }

    async fn reconcile_admin_grants(&self, handle: &ProfileHandle) -> Result<()> {
        let users = UserAccountManager::for_profile(handle);
        for account in users.list()?.into_iter().filter(|a| a.admin) {
            self.runtime
                .grant_cluster_role_to_user(ADMIN_ROLE, &account.username)
                .await?;
        }
        Ok(())
    }

    /// Stop the profile's instance; a stopped profile stays stopped
    pub async fn down(&self, name: &str) -> Result<()> {
        let handle = self.existing(name)?;
        self.runtime.stop(&handle).await?;
        println!("Stopped profile {}", name);
        Ok(())
    }

    /// Delete a stopped profile and everything it owns; false if there was nothing to delete
    pub async fn destroy(&self, name: &str) -> Result<bool> {
        let handle = self.store.resolve(name)?;
        if !self.store.exists(&handle) {
            return Ok(false);
        }

        let (state, status) = self.status(name).await?;
        if status == RuntimeStatus::Unknown
            || !ProfileEvent::is_valid_transition(state, ProfileEvent::Destroy)
        {
            return Err(LocalshiftError::MustStopFirst(name.to_string()));
        }
        // Clears a stale active marker, nothing else
        self.runtime.stop(&handle).await?;

        match self.runtime.remove_profile_images(&handle).await {
            Ok(0) => {}
            Ok(count) => println!("Removed {} images of profile {}", count, name),
            Err(e) => tracing::warn!("Unable to remove images of {}: {}", name, e),
        }

        self.store.remove(&handle)?;
        println!("Destroyed profile {}", name);
        Ok(true)
    }

    /// Current state of one profile; never changes anything
    pub async fn status(&self, name: &str) -> Result<(ProfileState, RuntimeStatus)> {
        let handle = self.store.resolve(name)?;
        if !self.store.exists(&handle) {
            return Ok((ProfileState::Absent, RuntimeStatus::Stopped));
        }

        let setup_complete = self
            .store
            .load_metadata(&handle)?
            .map(|m| m.setup.complete)
            .unwrap_or(false);
        let status = self.runtime.status(&handle).await;
        Ok((ProfileState::derive(true, setup_complete, status), status))
    }

    /// Every profile on disk with its version and status
    pub async fn list(&self) -> Result<Vec<ProfileSummary>> {
        let mut summaries = Vec::new();
        for name in self.store.names()? {
            let handle = self.store.resolve(&name)?;
            let version = match self.store.load_metadata(&handle) {
                Ok(metadata) => metadata.and_then(|m| m.version),
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            };
            let status = self.runtime.status(&handle).await;
            summaries.push(ProfileSummary {
                name,
                version,
                status,
            });
        }
        Ok(summaries)
    }

    /// Interactive shell on the profile's master node
    pub async fn ssh(&self, name: &str) -> Result<i32> {
        let handle = self.existing(name)?;
        self.runtime.open_shell(&handle).await
    }

    pub async fn add_user(
        &self,
        name: &str,
        username: &str,
        password: &str,
        admin: bool,
    ) -> Result<UserAccount> {
        let handle = self.existing(name)?;
        let account = UserAccountManager::for_profile(&handle).add(username, password, admin)?;

        if admin && self.is_running(&handle).await {
            self.runtime
                .grant_cluster_role_to_user(ADMIN_ROLE, username)
                .await?;
        }
        Ok(account)
    }

    pub async fn list_users(&self, name: &str) -> Result<Vec<UserAccount>> {
        let handle = self.existing(name)?;
        UserAccountManager::for_profile(&handle).list()
    }

    pub async fn set_password(&self, name: &str, username: &str, password: &str) -> Result<()> {
        let handle = self.existing(name)?;
        UserAccountManager::for_profile(&handle).set_password(username, password)
    }

    pub async fn remove_user(&self, name: &str, username: &str) -> Result<UserAccount> {
        let handle = self.existing(name)?;
        let account = UserAccountManager::for_profile(&handle).remove(username)?;

        if account.admin && self.is_running(&handle).await {
            self.runtime
                .revoke_cluster_role_from_user(ADMIN_ROLE, username)
                .await?;
        }
        Ok(account)
    }

    /// Declare a volume, registering it straight away when the profile is running
    pub async fn create_volume(&self, name: &str, request: VolumeRequest) -> Result<VolumeSpec> {
        let handle = self.existing(name)?;
        let volume = VolumeManager::new(&handle).declare(request)?;

        if self.is_running(&handle).await {
            self.runtime.mount_volume(&volume).await?;
        } else {
            tracing::info!("Volume {} will be mounted on the next up", volume.name);
        }
        Ok(volume)
    }

    pub async fn list_volumes(&self, name: &str) -> Result<Vec<VolumeSpec>> {
        let handle = self.existing(name)?;
        VolumeManager::new(&handle).list()
    }

    fn existing(&self, name: &str) -> Result<ProfileHandle> {
        let handle = self.store.resolve(name)?;
        if !self.store.exists(&handle) {
            return Err(LocalshiftError::UnknownProfile(name.to_string()));
        }
        Ok(handle)
    }

    async fn is_running(&self, handle: &ProfileHandle) -> bool {
        self.runtime.status(handle).await == RuntimeStatus::Running
    }
}
