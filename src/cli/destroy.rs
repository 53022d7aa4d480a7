//! `localshift destroy` command implementation

use crate::cli::ProfileArg;
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use clap::Args;

/// Arguments for the `destroy` command
#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub profile: ProfileArg,
}

/// Execute the `destroy` command
pub async fn execute(args: DestroyArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);
    if !controller.destroy(&args.profile.profile).await? {
        println!("Absent");
    }
    Ok(())
}
