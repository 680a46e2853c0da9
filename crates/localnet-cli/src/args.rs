//! Command-line arguments and how they override the config file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use localnet_harness::HarnessConfig;

/// Run a local multi-node network, optionally provisioning a custom workload on it.
#[derive(Debug, Parser)]
#[command(name = "localnet", version)]
#[command(about = "Local multi-node network runner", long_about = None)]
pub struct Cli {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workload plugin binary to install and deploy
    #[arg(long)]
    pub vm_path: Option<PathBuf>,

    /// Genesis payload for the workload
    #[arg(long)]
    pub vm_genesis: Option<PathBuf>,

    /// Per-chain config directory handed to every node
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Node executable
    #[arg(long)]
    pub node_binary: Option<PathBuf>,

    /// Identity pool directory (`keys{1..N}/staker.{crt,key}`)
    #[arg(long)]
    pub certs_dir: Option<PathBuf>,

    /// Number of nodes
    #[arg(short, long)]
    pub nodes: Option<usize>,

    /// HTTP port of the first node
    #[arg(long)]
    pub base_port: Option<u16>,

    /// Stop the network once the workload is active
    #[arg(long)]
    pub exit_after_provisioning: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Config file (or defaults) with flag overrides applied, not yet validated.
    pub fn harness_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => HarnessConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(path) = &self.vm_path {
            config.workload.vm_path = Some(path.clone());
        }
        if let Some(path) = &self.vm_genesis {
            config.workload.genesis_path = Some(path.clone());
        }
        if let Some(dir) = &self.config_dir {
            config.network.chain_config_dir = Some(dir.clone());
        }
        if let Some(binary) = &self.node_binary {
            config.node.binary = binary.clone();
        }
        if let Some(dir) = &self.certs_dir {
            config.network.certs_dir = dir.clone();
        }
        if let Some(nodes) = self.nodes {
            config.network.nodes = nodes;
        }
        if let Some(port) = self.base_port {
            config.network.base_port = port;
        }
        if self.exit_after_provisioning {
            config.provisioning.exit_after_provisioning = true;
        }
    }
}
