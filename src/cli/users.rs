//! `localshift users` command implementation

use crate::cli::ProfileArg;
use crate::lifecycle::controller::ProfileLifecycleController;
use crate::settings::Settings;
use clap::{Args, Subcommand};
use std::io::BufRead;

/// Arguments for the `users` command
#[derive(Args)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub command: UsersCommands,
}

/// User subcommands
#[derive(Subcommand)]
pub enum UsersCommands {
    /// Add a user account
    Add(UserAddArgs),
    /// List user accounts
    List(UserListArgs),
    /// Change a user's password
    Passwd(UserPasswdArgs),
    /// Remove a user account
    Remove(UserRemoveArgs),
}

/// Arguments for users add
#[derive(Args)]
pub struct UserAddArgs {
    #[command(flatten)]
    pub profile: ProfileArg,

    /// User name
    pub user: String,

    /// Password (read from standard input if omitted)
    #[arg(long)]
    pub password: Option<String>,

    /// Grant cluster administration rights
    #[arg(long)]
    pub admin: bool,
}

/// Arguments for users list
#[derive(Args)]
pub struct UserListArgs {
    #[command(flatten)]
    pub profile: ProfileArg,
}

/// Arguments for users passwd
#[derive(Args)]
pub struct UserPasswdArgs {
    #[command(flatten)]
    pub profile: ProfileArg,

    /// User name
    pub user: String,

    /// New password (read from standard input if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

/// Arguments for users remove
#[derive(Args)]
pub struct UserRemoveArgs {
    #[command(flatten)]
    pub profile: ProfileArg,

    /// User name
    pub user: String,
}

/// Execute the `users` command
pub async fn execute(args: UsersArgs, settings: &Settings) -> anyhow::Result<()> {
    let controller = ProfileLifecycleController::from_settings(settings);

    match args.command {
        UsersCommands::Add(add_args) => {
            let password = password_or_stdin(add_args.password)?;
            let account = controller
                .add_user(&add_args.profile.profile, &add_args.user, &password, add_args.admin)
                .await?;
            println!("{}", account.username);
        }
        UsersCommands::List(list_args) => {
            let accounts = controller.list_users(&list_args.profile.profile).await?;
            println!("{:<30} {:<10}", "USER", "ROLE");
            for account in accounts {
                let role = if account.admin { "admin" } else { "user" };
                println!("{:<30} {:<10}", account.username, role);
            }
        }
        UsersCommands::Passwd(passwd_args) => {
            let password = password_or_stdin(passwd_args.password)?;
            controller
                .set_password(&passwd_args.profile.profile, &passwd_args.user, &password)
                .await?;
            println!("{}", passwd_args.user);
        }
        UsersCommands::Remove(remove_args) => {
            let account = controller
                .remove_user(&remove_args.profile.profile, &remove_args.user)
                .await?;
            println!("{}", account.username);
        }
    }

    Ok(())
}

fn password_or_stdin(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprintln!("Password:");
    read_password(std::io::stdin().lock())
}

/// First line of `input`, without its line ending
fn read_password(mut input: impl BufRead) -> anyhow::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(|c| c == '\r' || c == '\n').to_string();
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(password)
}
