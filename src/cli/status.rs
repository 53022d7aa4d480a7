//! `localshift status` command implementation

use crate::cli::ProfileArg;
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::runtime::state::ProfileState;
use crate::settings::Settings;
use clap::Args;

/// Arguments for the `status` command
#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub profile: ProfileArg,
}

/// Execute the `status` command
pub async fn execute(args: StatusArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);
    let (state, status) = controller.status(&args.profile.profile).await?;

    match state {
        ProfileState::Absent => println!("Absent"),
        ProfileState::Initializing => println!("{} (setup incomplete, run `up`)", status),
        ProfileState::Stopped | ProfileState::Running => println!("{}", status),
    }
    Ok(())
}
