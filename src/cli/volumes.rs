//! `localshift volumes` command implementation

use crate::cli::ProfileArg;
use crate::filesystem::volume::{ClaimRef, VolumeRequest};
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments for the `volumes` command
#[derive(Args)]
pub struct VolumesArgs {
    #[command(subcommand)]
    pub command: VolumesCommands,
}

/// Volume subcommands
#[derive(Subcommand)]
pub enum VolumesCommands {
    /// Declare a persistent volume
    Create(VolumeCreateArgs),
    /// List declared volumes
    List(VolumeListArgs),
}

/// Arguments for volumes create
#[derive(Args)]
pub struct VolumeCreateArgs {
    #[command(flatten)]
    pub profile: ProfileArg,

    /// Volume name
    #[arg(long)]
    pub name: String,

    /// Size of a new volume, e.g. 500Mi or 10Gi
    #[arg(long, conflicts_with = "path", required_unless_present = "path")]
    pub size: Option<String>,

    /// Existing host directory to expose as the volume
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Access mode (ReadWriteOnce, ReadWriteMany, ReadOnlyMany); default all three
    #[arg(long)]
    pub access_mode: Vec<String>,

    /// Reclaim policy [default: Retain]
    #[arg(long)]
    pub reclaim_policy: Option<String>,

    /// Bind the volume to a claim, as PROJECT/NAME
    #[arg(long)]
    pub claim: Option<ClaimRef>,
}

impl VolumeCreateArgs {
    fn request(&self) -> VolumeRequest {
        let mut request = match &self.path {
            Some(path) => VolumeRequest::pre_claimed(&self.name, path),
            None => VolumeRequest::sized(&self.name, self.size.as_deref().unwrap_or_default()),
        };
        request.access_modes = self.access_mode.clone();
        request.reclaim_policy = self.reclaim_policy.clone();
        request.claim = self.claim.clone();
        request
    }
}

/// Arguments for volumes list
#[derive(Args)]
pub struct VolumeListArgs {
    #[command(flatten)]
    pub profile: ProfileArg,

    /// Only display volume names
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `volumes` command
pub async fn execute(args: VolumesArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);

    match args.command {
        VolumesCommands::Create(create_args) => {
            let volume = controller
                .create_volume(&create_args.profile.profile, create_args.request())
                .await?;
            println!("{}", volume.target.display());
        }
        VolumesCommands::List(list_args) => {
            let volumes = controller.list_volumes(&list_args.profile.profile).await?;

            if list_args.quiet {
                for volume in volumes {
                    println!("{}", volume.name);
                }
                return Ok(());
            }

            println!("{:<20} {:<12} {:<25} {}", "NAME", "SIZE", "CLAIM", "PATH");
            for volume in volumes {
                let claim = volume
                    .claim
                    .as_ref()
                    .map(|c| format!("{}/{}", c.namespace, c.name))
                    .unwrap_or_default();
                println!(
                    "{:<20} {:<12} {:<25} {}",
                    volume.name,
                    volume.size_label(),
                    claim,
                    volume.target.display()
                );
            }
        }
    }

    Ok(())
}
