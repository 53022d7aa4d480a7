//! `localshift down` command implementation

use crate::cli::ProfileArg;
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use clap::Args;

/// Arguments for the `down` command
#[derive(Args)]
pub struct DownArgs {
    #[command(flatten)]
    pub profile: ProfileArg,
}

/// Execute the `down` command
pub async fn execute(args: DownArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);
    controller.down(&args.profile.profile).await?;
    Ok(())
}
