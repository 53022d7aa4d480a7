//! Localshift CLI entry point
//!
//! Persistent, named profiles for a local all-in-one OpenShift cluster.

use clap::Parser;
use localshift::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr, command output to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.global.settings()?;

    match cli.command {
        Commands::Up(args) => localshift::cli::up::execute(args, &settings).await,
        Commands::Down(args) => localshift::cli::down::execute(args, &settings).await,
        Commands::Status(args) => localshift::cli::status::execute(args, &settings).await,
        Commands::List(args) => localshift::cli::list::execute(args, &settings).await,
        Commands::Destroy(args) => localshift::cli::destroy::execute(args, &settings).await,
        Commands::Ssh(args) => {
            let code = localshift::cli::ssh::execute(args, &settings).await?;
            std::process::exit(code)
        }
        Commands::Users(args) => localshift::cli::users::execute(args, &settings).await,
        Commands::Volumes(args) => localshift::cli::volumes::execute(args, &settings).await,
    }
}
