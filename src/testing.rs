//! In-memory stand-in for the platform binary and container engine

use crate::cluster::patcher::PatchTool;
use crate::runtime::command::CommandOutput;
use crate::runtime::platform::Platform;
use crate::storage::paths::MASTER_CONFIG;
use crate::{CommandFailure, LocalshiftError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Master configuration as freshly written by `cluster up`
pub const SAMPLE_MASTER_CONFIG: &str = "\
apiVersion: v1
kind: MasterConfig
admissionConfig:
  pluginConfig:
    openshift.io/ImagePolicy:
      configuration:
        apiVersion: v1
        kind: ImagePolicyConfig
oauthConfig:
  masterPublicURL: https://127.0.0.1:8443
  identityProviders:
  - name: anypassword
    challenge: true
    login: true
    provider:
      apiVersion: v1
      kind: AllowAllPasswordIdentityProvider
";

#[derive(Debug)]
struct FakeState {
    running: bool,
    up_count: usize,
    down_count: usize,
    up_attempts: usize,
    fail_up_attempt: Option<usize>,
    fail_next_up: bool,
    interrupt_next_up: bool,
    fail_status: bool,
    fail_patches: bool,
    patch_tool: PatchTool,
    patch_calls: usize,
    pvs: BTreeMap<String, String>,
    pv_checks: Vec<String>,
    grants: Vec<String>,
    removed_labels: Vec<String>,
    client_config: Vec<String>,
}

/// Fake platform enforcing a single running instance, like the real engine
#[derive(Debug)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn failed(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status: Some(status),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// RFC 7386 merge patch over a YAML document
pub fn merge_patch(target: &mut serde_yaml::Value, patch: &serde_yaml::Value) {
    let serde_yaml::Value::Mapping(entries) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_mapping() {
        *target = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    let Some(map) = target.as_mapping_mut() else {
        return;
    };

    for (key, value) in entries {
        if value.is_null() {
            map.remove(key);
        } else if let Some(existing) = map.get_mut(key) {
            merge_patch(existing, value);
        } else {
            let mut fresh = serde_yaml::Value::Null;
            merge_patch(&mut fresh, value);
            map.insert(key.clone(), fresh);
        }
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                running: false,
                up_count: 0,
                down_count: 0,
                up_attempts: 0,
                fail_up_attempt: None,
                fail_next_up: false,
                interrupt_next_up: false,
                fail_status: false,
                fail_patches: false,
                patch_tool: PatchTool::Oc,
                patch_calls: 0,
                pvs: BTreeMap::new(),
                pv_checks: Vec::new(),
                grants: Vec::new(),
                removed_labels: Vec::new(),
                client_config: Vec::new(),
            }),
        }
    }

    pub fn up_count(&self) -> usize {
        self.state.lock().unwrap().up_count
    }

    pub fn down_count(&self) -> usize {
        self.state.lock().unwrap().down_count
    }

    pub fn patch_calls(&self) -> usize {
        self.state.lock().unwrap().patch_calls
    }

    pub fn pv_path(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().pvs.get(name).cloned()
    }

    pub fn pv_checks(&self) -> Vec<String> {
        self.state.lock().unwrap().pv_checks.clone()
    }

    pub fn grants(&self) -> Vec<String> {
        self.state.lock().unwrap().grants.clone()
    }

    pub fn removed_labels(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_labels.clone()
    }

    /// `adm config` invocations, without the leading `adm config`
    pub fn client_config_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().client_config.clone()
    }

    pub fn set_patch_tool(&self, tool: PatchTool) {
        self.state.lock().unwrap().patch_tool = tool;
    }

    pub fn fail_next_up(&self) {
        self.state.lock().unwrap().fail_next_up = true;
    }

    /// Fail the `attempt`th start (1-based), counting every start from now on
    pub fn fail_up_attempt(&self, attempt: usize) {
        let mut state = self.state.lock().unwrap();
        state.fail_up_attempt = Some(state.up_attempts + attempt);
    }

    /// Next start is killed by a signal after the instance came up
    pub fn interrupt_next_up(&self) {
        self.state.lock().unwrap().interrupt_next_up = true;
    }

    pub fn fail_status_queries(&self) {
        self.state.lock().unwrap().fail_status = true;
    }

    pub fn fail_patches(&self) {
        self.state.lock().unwrap().fail_patches = true;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_next_up = false;
        state.fail_up_attempt = None;
        state.interrupt_next_up = false;
        state.fail_status = false;
        state.fail_patches = false;
    }

    /// Stop the instance behind the tool's back, as a crash or reboot would
    pub fn kill_instance(&self) {
        self.state.lock().unwrap().running = false;
    }

    fn patch(&self, command: &[String]) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        let supported = state.patch_tool.command();
        if command[0] != supported[0] {
            return failed(127, "executable file not found in $PATH");
        }
        if command.last().map(String::as_str) == Some("--help") {
            return ok("Update field(s) of a config file");
        }
        if state.fail_patches {
            return failed(1, "error: unable to patch config");
        }
        state.patch_calls += 1;

        let (Some(file), Some(patch)) = (command.get(4), command.get(6)) else {
            return failed(2, "usage: ex config patch FILE --patch PATCH");
        };
        let Ok(text) = fs::read_to_string(file) else {
            return failed(1, "error: config file not found");
        };
        let mut document: serde_yaml::Value = match serde_yaml::from_str(&text) {
            Ok(document) => document,
            Err(e) => return failed(1, &e.to_string()),
        };
        let patch: serde_yaml::Value = match serde_yaml::from_str(patch) {
            Ok(patch) => patch,
            Err(e) => return failed(1, &e.to_string()),
        };
        merge_patch(&mut document, &patch);
        ok(serde_yaml::to_string(&document).unwrap())
    }
}

impl Platform for FakePlatform {
    async fn cluster_up(&self, args: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.up_attempts += 1;
        if state.fail_next_up || state.fail_up_attempt == Some(state.up_attempts) {
            state.fail_next_up = false;
            state.fail_up_attempt = None;
            return Err(LocalshiftError::RuntimeStart(CommandFailure {
                command: "oc cluster up".to_string(),
                status: Some(1),
                output_tail: vec!["error: Docker daemon not reachable".to_string()],
            }));
        }
        if state.running {
            return Err(LocalshiftError::RuntimeStart(CommandFailure {
                command: "oc cluster up".to_string(),
                status: Some(1),
                output_tail: vec!["error: OpenShift is already running".to_string()],
            }));
        }

        let base_dir = args
            .iter()
            .position(|a| a == "--base-dir")
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from)
            .expect("cluster up without --base-dir");
        let config = base_dir.join(MASTER_CONFIG);
        if !config.exists() {
            fs::create_dir_all(config.parent().unwrap()).unwrap();
            fs::write(&config, SAMPLE_MASTER_CONFIG).unwrap();
        }

        state.running = true;
        state.up_count += 1;
        if state.interrupt_next_up {
            state.interrupt_next_up = false;
            return Err(LocalshiftError::RuntimeStart(CommandFailure {
                command: "oc cluster up".to_string(),
                status: None,
                output_tail: vec!["Starting OpenShift using openshift/origin-control-plane".to_string()],
            }));
        }
        Ok(())
    }

    async fn cluster_down(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.down_count += 1;
        Ok(())
    }

    async fn instance_running(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.fail_status {
            return Err(LocalshiftError::RuntimeCommand(CommandFailure {
                command: "docker ps".to_string(),
                status: Some(1),
                output_tail: vec!["Cannot connect to the Docker daemon".to_string()],
            }));
        }
        Ok(state.running)
    }

    async fn open_shell(&self) -> Result<i32> {
        Ok(0)
    }

    async fn exec(&self, command: &[String], _input: Option<&[u8]>) -> Result<CommandOutput> {
        if command.len() >= 4 && command[1..4] == ["ex", "config", "patch"] {
            return Ok(self.patch(command));
        }
        Ok(ok(""))
    }

    async fn client(&self, args: &[String], input: Option<&[u8]>) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match args.as_slice() {
            ["get", "pv", name, ..] => {
                state.pv_checks.push(name.to_string());
                if state.pvs.contains_key(*name) {
                    Ok(ok(*name))
                } else {
                    Ok(failed(1, "Error from server (NotFound)"))
                }
            }
            ["create", "-f", "-", ..] => {
                let pv: serde_json::Value = serde_json::from_slice(input.unwrap_or_default())?;
                let name = pv["metadata"]["name"].as_str().unwrap_or_default().to_string();
                let path = pv["spec"]["hostPath"]["path"].as_str().unwrap_or_default().to_string();
                state.pvs.insert(name, path);
                Ok(ok("persistentvolume created"))
            }
            ["adm", "policy", action, role, subject, ..] => {
                state.grants.push(format!("{} {} {}", action, role, subject));
                Ok(ok(""))
            }
            ["whoami", "--show-server"] => Ok(ok("https://127.0.0.1:8443\n")),
            ["whoami", "-t"] => Ok(ok("fake-session-token\n")),
            ["adm", "config", rest @ ..] => {
                state.client_config.push(rest.join(" "));
                Ok(ok(""))
            }
            _ => Ok(ok("")),
        }
    }

    async fn version(&self) -> Option<String> {
        Some("v3.10.0".to_string())
    }

    async fn host_address(&self) -> Option<String> {
        Some("172.17.0.1".to_string())
    }

    async fn remove_labelled_images(&self, label: &str) -> Result<Vec<String>> {
        self.state.lock().unwrap().removed_labels.push(label.to_string());
        Ok(vec!["sha256:0123456789ab".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_patch_replaces_lists_and_removes_nulls() {
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str("a: {b: [1, 2], c: keep, d: drop}").unwrap();
        let patch: serde_yaml::Value = serde_yaml::from_str("a: {b: [3], d: null, e: new}").unwrap();

        merge_patch(&mut doc, &patch);

        let expected: serde_yaml::Value =
            serde_yaml::from_str("a: {b: [3], c: keep, e: new}").unwrap();
        assert_eq!(doc, expected);
    }
}
