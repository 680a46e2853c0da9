//! Harness configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all)
//! describes a five-node network on ports 9650..9659 with no workload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use localnet_core::{PortPlan, SetupError};
use localnet_rpc::UserPass;
use serde::{Deserialize, Serialize};

/// Workload kind id the node runtime discovers the plugin binary under.
pub const DEFAULT_WORKLOAD_ID: &str = "tGas3T58KzdjLHhBDMnH2TvrddhqTji5iZAMZ3RXs2NLpSnhH";
/// Domain ids every node allow-lists.
pub const DEFAULT_WHITELISTED_SUBNET: &str = "p4jUwqZsA2LuSftroCd3zb4ytH8W99oXKuKVZdsty7eQ3rXD6";
/// Pre-funded key of the local network genesis.
pub const DEFAULT_FUNDED_KEY: &str =
    "PrivateKey-ewoqjP7PxY4yr3iLTpLisriqt94hdyDFNgchSxGGztUrTXtNN";

/// Top-level configuration of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// How node processes are launched
    pub node: NodeProcessConfig,
    /// Topology and shared node settings
    pub network: NetworkConfig,
    /// Custom workload to deploy, if any
    pub workload: WorkloadConfig,
    /// Account and validator parameters
    pub provisioning: ProvisioningConfig,
    /// Poll intervals and request timeout
    pub polling: PollingConfig,
}

/// Node process launch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeProcessConfig {
    /// Node executable, looked up on `PATH` when it has no directory part
    pub binary: PathBuf,
    /// Arguments placed before the generated flags
    pub args: Vec<String>,
    /// `--log-level` for every node
    pub log_level: String,
    /// Raw flag overrides applied last, by flag name
    pub extra_flags: BTreeMap<String, String>,
}

impl Default for NodeProcessConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("avalanchego"),
            args: Vec::new(),
            log_level: "info".to_string(),
            extra_flags: BTreeMap::new(),
        }
    }
}

/// Network topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Number of nodes
    pub nodes: usize,
    /// Interface nodes bind and advertise
    pub host: String,
    /// HTTP port of node 1
    pub base_port: u16,
    /// Identity pool laid out as `keys{1..N}/staker.{crt,key}`
    pub certs_dir: PathBuf,
    /// Per-chain config directory handed to every node
    pub chain_config_dir: Option<PathBuf>,
    /// Directory whose executables are copied into the plugin directory
    pub system_plugin_dir: Option<PathBuf>,
    /// Partitions a node must report bootstrapped
    pub required_partitions: Vec<String>,
    /// Domain ids nodes allow-list when a workload is deployed
    pub whitelisted_subnets: Vec<String>,
    /// Parent of the run directory, system temp dir when unset
    pub work_root: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let ports = PortPlan::default();
        Self {
            nodes: 5,
            host: ports.host,
            base_port: ports.base_http_port,
            certs_dir: PathBuf::from("certs"),
            chain_config_dir: None,
            system_plugin_dir: None,
            required_partitions: vec!["P".to_string(), "C".to_string(), "X".to_string()],
            whitelisted_subnets: vec![DEFAULT_WHITELISTED_SUBNET.to_string()],
            work_root: None,
        }
    }
}

impl NetworkConfig {
    /// Port plan for this topology
    pub fn port_plan(&self) -> PortPlan {
        PortPlan {
            host: self.host.clone(),
            base_http_port: self.base_port,
        }
    }
}

/// Custom workload to install and deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Workload plugin binary
    pub vm_path: Option<PathBuf>,
    /// Genesis payload file
    pub genesis_path: Option<PathBuf>,
    /// Declared workload kind id
    pub vm_id: String,
    /// Human-readable name
    pub name: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            vm_path: None,
            genesis_path: None,
            vm_id: DEFAULT_WORKLOAD_ID.to_string(),
            name: "kewl vm".to_string(),
        }
    }
}

impl WorkloadConfig {
    /// True when a workload binary is configured
    pub fn is_enabled(&self) -> bool {
        self.vm_path.is_some()
    }
}

/// Provisioning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisioningConfig {
    /// Keystore user
    pub username: String,
    /// Keystore password
    pub password: String,
    /// Pre-funded key to import
    pub funded_key: String,
    /// Validator weight on the new domain
    pub validator_weight: u64,
    /// Validation starts this many seconds after enrollment
    pub start_offset_secs: u64,
    /// Validation ends this many seconds after enrollment
    pub end_offset_secs: u64,
    /// Stop the network once provisioning succeeds
    pub exit_after_provisioning: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            username: "test".to_string(),
            password: "vmsrkewl".to_string(),
            funded_key: DEFAULT_FUNDED_KEY.to_string(),
            validator_weight: 30,
            start_offset_secs: 60,
            end_offset_secs: 30 * 24 * 60 * 60,
            exit_after_provisioning: false,
        }
    }
}

impl ProvisioningConfig {
    /// Keystore credentials
    pub fn credentials(&self) -> UserPass {
        UserPass {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Poll intervals, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Between bootstrap status rounds
    pub bootstrap_interval_ms: u64,
    /// Between transaction status polls
    pub commit_interval_ms: u64,
    /// Between workload activation polls
    pub activation_interval_ms: u64,
    /// Per-request HTTP timeout
    pub rpc_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            bootstrap_interval_ms: 1_000,
            commit_interval_ms: 1_000,
            activation_interval_ms: 15_000,
            rpc_timeout_ms: 10_000,
        }
    }
}

impl PollingConfig {
    /// Bootstrap poll interval
    pub fn bootstrap_interval(&self) -> Duration {
        Duration::from_millis(self.bootstrap_interval_ms)
    }

    /// Commit poll interval
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    /// Activation poll interval
    pub fn activation_interval(&self) -> Duration {
        Duration::from_millis(self.activation_interval_ms)
    }

    /// HTTP request timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl HarnessConfig {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        if !path.is_file() {
            return Err(SetupError::MissingInput {
                what: "config file",
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SetupError::io("read config file", path, e))?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, SetupError> {
        toml::from_str(raw).map_err(|e| SetupError::InvalidConfig(e.to_string()))
    }

    /// Make every relative path absolute against the current directory.
    ///
    /// Node processes run inside their slot directory, so nothing handed to
    /// them may depend on the orchestrator's working directory.
    pub fn resolve_paths(&mut self) -> Result<(), SetupError> {
        let cwd = std::env::current_dir()
            .map_err(|e| SetupError::io("read working directory", ".", e))?;
        self.resolve_paths_against(&cwd);
        Ok(())
    }

    /// Make every relative path absolute against `base`. A bare node binary
    /// name is left alone so it is still looked up on `PATH`.
    pub fn resolve_paths_against(&mut self, base: &Path) {
        if self.node.binary.components().count() > 1 {
            absolutize(base, &mut self.node.binary);
        }
        absolutize(base, &mut self.network.certs_dir);
        let optional = [
            &mut self.network.chain_config_dir,
            &mut self.network.system_plugin_dir,
            &mut self.network.work_root,
            &mut self.workload.vm_path,
            &mut self.workload.genesis_path,
        ];
        for path in optional.into_iter().flatten() {
            absolutize(base, path);
        }
    }

    /// Check consistency and that every named input exists.
    pub fn validate(&self) -> Result<(), SetupError> {
        let network = &self.network;
        if network.nodes == 0 {
            return Err(SetupError::InvalidConfig("at least one node is required".to_string()));
        }
        if network.port_plan().last_port(network.nodes).is_none() {
            return Err(SetupError::InvalidConfig(format!(
                "{} nodes from base port {} exceed the port range",
                network.nodes, network.base_port
            )));
        }
        if network.required_partitions.is_empty() {
            return Err(SetupError::InvalidConfig(
                "required_partitions must not be empty".to_string(),
            ));
        }

        let polling = &self.polling;
        if polling.bootstrap_interval_ms == 0
            || polling.commit_interval_ms == 0
            || polling.activation_interval_ms == 0
        {
            return Err(SetupError::InvalidConfig("poll intervals must be positive".to_string()));
        }

        match (&self.workload.vm_path, &self.workload.genesis_path) {
            (Some(_), None) => {
                return Err(SetupError::InvalidConfig(
                    "a workload binary needs a genesis file".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(SetupError::InvalidConfig(
                    "a genesis file needs a workload binary".to_string(),
                ))
            }
            _ => {}
        }
        if self.workload.is_enabled() && self.workload.vm_id.is_empty() {
            return Err(SetupError::InvalidConfig("workload vm_id is empty".to_string()));
        }

        require_file("workload binary", self.workload.vm_path.as_deref())?;
        require_file("workload genesis", self.workload.genesis_path.as_deref())?;
        require_dir("chain config directory", network.chain_config_dir.as_deref())?;
        require_dir("system plugin directory", network.system_plugin_dir.as_deref())?;

        let binary = &self.node.binary;
        if binary.components().count() > 1 {
            require_file("node binary", Some(binary))?;
        }
        Ok(())
    }
}

fn absolutize(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn require_file(what: &'static str, path: Option<&Path>) -> Result<(), SetupError> {
    match path {
        Some(path) if !path.is_file() => Err(SetupError::MissingInput {
            what,
            path: path.to_path_buf(),
        }),
        _ => Ok(()),
    }
}

fn require_dir(what: &'static str, path: Option<&Path>) -> Result<(), SetupError> {
    match path {
        Some(path) if !path.is_dir() => Err(SetupError::MissingInput {
            what,
            path: path.to_path_buf(),
        }),
        _ => Ok(()),
    }
}
