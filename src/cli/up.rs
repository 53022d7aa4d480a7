//! `localshift up` command implementation

use crate::accounts::manager::DEFAULT_USER;
use crate::cli::ProfileArg;
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use crate::storage::profiles::ProfileOptions;
use clap::Args;

/// Arguments for the `up` command
#[derive(Args)]
pub struct UpArgs {
    #[command(flatten)]
    pub profile: ProfileArg,

    /// Platform image tag to run
    #[arg(long)]
    pub version: Option<String>,

    /// Platform image to run
    #[arg(long)]
    pub image: Option<String>,

    /// Default suffix for application routes
    #[arg(long)]
    pub routing_suffix: Option<String>,

    /// Hostname or IP the cluster is reachable on
    #[arg(long)]
    pub public_hostname: Option<String>,

    /// Log level of the platform client
    #[arg(long, default_value_t = 0)]
    pub loglevel: u32,

    /// Log level of the cluster components
    #[arg(long, default_value_t = 0)]
    pub server_loglevel: u32,

    /// HTTP proxy used inside the cluster
    #[arg(long)]
    pub http_proxy: Option<String>,

    /// HTTPS proxy used inside the cluster
    #[arg(long)]
    pub https_proxy: Option<String>,

    /// Host that bypasses the proxy
    #[arg(long)]
    pub no_proxy: Vec<String>,

    /// Component to enable
    #[arg(long)]
    pub enable: Vec<String>,
}

impl UpArgs {
    fn options(&self) -> ProfileOptions {
        ProfileOptions {
            image: self.image.clone(),
            version: self.version.clone(),
            public_hostname: self.public_hostname.clone(),
            routing_suffix: self.routing_suffix.clone(),
            loglevel: self.loglevel,
            server_loglevel: self.server_loglevel,
            http_proxy: self.http_proxy.clone(),
            https_proxy: self.https_proxy.clone(),
            no_proxy: self.no_proxy.clone(),
            enable: self.enable.clone(),
            ..Default::default()
        }
    }
}

/// Execute the `up` command
pub async fn execute(args: UpArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);
    let name = &args.profile.profile;

    let outcome = controller.up(name, args.options()).await?;

    if let Some(password) = outcome.developer_password {
        println!();
        println!("Login with:");
        println!("    User:     {}", DEFAULT_USER);
        println!("    Password: {}", password);
        println!("This password is not shown again; change it with `localshift users passwd`.");
    }

    Ok(())
}
