//! The external platform primitives: `oc cluster up/down`, the engine's view of
//! the master container, and the platform client.

use crate::runtime::command::{self, describe, CommandOutput};
use crate::settings::Settings;
use crate::{LocalshiftError, Result};

/// Primitives provided by the platform binary and container engine
#[allow(async_fn_in_trait)]
pub trait Platform {
    /// Bring the cluster up, streaming progress until the primitive returns
    async fn cluster_up(&self, args: &[String]) -> Result<()>;

    /// Bring the cluster down
    async fn cluster_down(&self) -> Result<()>;

    /// Whether the engine is currently running a cluster instance
    async fn instance_running(&self) -> Result<bool>;

    /// Attach an interactive shell to the master node, returning its exit code
    async fn open_shell(&self) -> Result<i32>;

    /// Run a command inside the master node
    async fn exec(&self, command: &[String], input: Option<&[u8]>) -> Result<CommandOutput>;

    /// Run a platform client command against the running cluster
    async fn client(&self, args: &[String], input: Option<&[u8]>) -> Result<CommandOutput>;

    /// Version reported by the platform binary, if it can be determined
    async fn version(&self) -> Option<String>;

    /// Address the cluster will be reachable on from this host
    async fn host_address(&self) -> Option<String>;

    /// Delete engine images carrying `label`, returning the removed IDs
    async fn remove_labelled_images(&self, label: &str) -> Result<Vec<String>>;
}

/// `oc` + container engine implementation
#[derive(Debug, Clone)]
pub struct OcPlatform {
    oc: String,
    docker: String,
    container: String,
}

impl OcPlatform {
    pub fn new(settings: &Settings) -> Self {
        Self {
            oc: settings.oc.clone(),
            docker: settings.docker.clone(),
            container: settings.container.clone(),
        }
    }

    async fn engine(&self, args: Vec<String>) -> Result<CommandOutput> {
        let output = command::capture(&self.docker, &args, None).await?;
        if !output.success() {
            return Err(LocalshiftError::RuntimeCommand(
                output.failure(describe(&self.docker, &args)),
            ));
        }
        Ok(output)
    }
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl Platform for OcPlatform {
    async fn cluster_up(&self, args: &[String]) -> Result<()> {
        let (status, output_tail) = command::stream(&self.oc, args).await?;
        if status != Some(0) {
            return Err(LocalshiftError::RuntimeStart(crate::CommandFailure {
                command: describe(&self.oc, args),
                status,
                output_tail,
            }));
        }
        Ok(())
    }

    async fn cluster_down(&self) -> Result<()> {
        let args = strings(["cluster", "down"]);
        let (status, output_tail) = command::stream(&self.oc, &args).await?;
        if status != Some(0) {
            return Err(LocalshiftError::RuntimeCommand(crate::CommandFailure {
                command: describe(&self.oc, &args),
                status,
                output_tail,
            }));
        }
        Ok(())
    }

    async fn instance_running(&self) -> Result<bool> {
        let filter = format!("name={}", self.container);
        let output = self.engine(strings(["ps", "-q", "-f", filter.as_str()])).await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn open_shell(&self) -> Result<i32> {
        let args = strings(["exec", "-it", self.container.as_str(), "/bin/bash"]);
        Ok(command::interactive(&self.docker, &args).await?.unwrap_or(1))
    }

    async fn exec(&self, cmd: &[String], input: Option<&[u8]>) -> Result<CommandOutput> {
        let mut args = vec!["exec".to_string()];
        if input.is_some() {
            args.push("-i".to_string());
        }
        args.push(self.container.clone());
        args.extend(cmd.iter().cloned());
        command::capture(&self.docker, &args, input).await
    }

    async fn client(&self, args: &[String], input: Option<&[u8]>) -> Result<CommandOutput> {
        command::capture(&self.oc, args, input).await
    }

    async fn version(&self) -> Option<String> {
        // `oc version` exits non-zero without a server but still prints the client version
        let output = command::capture(&self.oc, &strings(["version"]), None)
            .await
            .ok()?;
        parse_version(&output.stdout).or_else(|| parse_version(&output.stderr))
    }

    async fn host_address(&self) -> Option<String> {
        if cfg!(target_os = "macos") {
            return Some("127.0.0.1".to_string());
        }
        if !cfg!(target_os = "linux") {
            return None;
        }
        let output = command::capture("ip", &strings(["-4", "addr", "show", "docker0"]), None)
            .await
            .ok()?;
        parse_inet(&output.stdout)
    }

    async fn remove_labelled_images(&self, label: &str) -> Result<Vec<String>> {
        let filter = format!("label={}", label);
        let output = self.engine(strings(["images", "-q", "--filter", filter.as_str()])).await?;

        let mut removed = Vec::new();
        for image in output.stdout.split_whitespace() {
            match self.engine(strings(["rmi", image])).await {
                Ok(_) => removed.push(image.to_string()),
                Err(e) => tracing::warn!("Unable to delete image {}: {}", image, e),
            }
        }
        Ok(removed)
    }
}

/// Pull `v3.10.0` out of a first line like `oc v3.10.0+dd10d17`
pub fn parse_version(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    let word = first.split_whitespace().nth(1)?;
    let version = word.split('+').next()?;
    if version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

/// First IPv4 address in `ip addr` or `ifconfig` output
pub fn parse_inet(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("inet "))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|addr| addr.split('/').next())
        .map(|addr| addr.to_string())
}
