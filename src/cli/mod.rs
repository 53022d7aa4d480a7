//! CLI command definitions and handlers

pub mod destroy;
pub mod down;
pub mod list;
pub mod ssh;
pub mod status;
pub mod up;
pub mod users;
pub mod volumes;

use crate::settings::Settings;
use crate::DEFAULT_PROFILE;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Localshift - persistent profiles for a local OpenShift cluster
#[derive(Parser)]
#[command(name = "localshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding all localshift state [default: ~/.localshift]
    #[arg(long, global = true, env = "LOCALSHIFT_HOME")]
    pub root_dir: Option<PathBuf>,

    /// Directory holding profiles [default: <root-dir>/profiles]
    #[arg(long, global = true, env = "LOCALSHIFT_PROFILES_DIR")]
    pub profiles_dir: Option<PathBuf>,

    /// Platform client binary
    #[arg(long, global = true, env = "LOCALSHIFT_OC", default_value = "oc")]
    pub oc: String,

    /// Container engine binary
    #[arg(long, global = true, env = "LOCALSHIFT_DOCKER", default_value = "docker")]
    pub docker: String,

    /// Name of the master container
    #[arg(long, global = true, env = "LOCALSHIFT_CONTAINER", default_value = "origin")]
    pub container: String,
}

impl GlobalArgs {
    pub fn settings(&self) -> crate::Result<Settings> {
        Settings::resolve(
            self.root_dir.clone(),
            self.profiles_dir.clone(),
            self.oc.as_str(),
            self.docker.as_str(),
            self.container.as_str(),
        )
    }
}

/// Profile selection shared by per-profile commands
#[derive(Args, Debug, Clone)]
pub struct ProfileArg {
    /// Profile name
    #[arg(short, long, default_value = DEFAULT_PROFILE)]
    pub profile: String,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create (if needed) and start a profile
    Up(up::UpArgs),

    /// Stop a profile
    Down(down::DownArgs),

    /// Show the status of a profile
    Status(status::StatusArgs),

    /// List profiles
    List(list::ListArgs),

    /// Delete a stopped profile and all of its state
    Destroy(destroy::DestroyArgs),

    /// Open a shell on the master node of a running profile
    Ssh(ssh::SshArgs),

    /// Manage user accounts
    Users(users::UsersArgs),

    /// Manage persistent volumes
    Volumes(volumes::VolumesArgs),
}
