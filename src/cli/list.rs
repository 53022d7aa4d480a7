//! `localshift list` command implementation

use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use clap::Args;

/// Arguments for the `list` command
#[derive(Args)]
pub struct ListArgs {
    /// Only display profile names
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `list` command
pub async fn execute(args: ListArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);
    let profiles = controller.list().await?;

    if args.quiet {
        for profile in profiles {
            println!("{}", profile.name);
        }
        return Ok(());
    }

    println!("{:<40} {:<10}", "PROFILE", "STATUS");
    for profile in profiles {
        println!("{:<40} {:<10}", profile.label(), profile.status);
    }
    Ok(())
}
