//! `localshift ssh` command implementation

use crate::cli::ProfileArg;
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use clap::Args;

/// Arguments for the `ssh` command
#[derive(Args)]
pub struct SshArgs {
    #[command(flatten)]
    pub profile: ProfileArg,
}

/// Execute the `ssh` command, returning the shell's exit code
pub async fn execute(args: SshArgs, settings: &Settings) -> anyhow::Result<i32> {
    let controller = ProfileLifecycleController::from_settings(settings);
    Ok(controller.ssh(&args.profile.profile).await?)
}
