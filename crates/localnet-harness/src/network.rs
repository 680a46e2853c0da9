//! Run orchestration.
//!
//! `LocalNetwork::run` validates inputs, materializes the run directory,
//! starts one supervised process per slot, and runs the bootstrap monitor
//! and (when a workload is configured) the provisioning workflow in one
//! task group sharing the run's cancellation source.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use localnet_core::{
    plan_slots, readiness_signal, CancellationSource, IdentityPool, NetworkReady, NodeFlags,
    NodeId, NodeSlot, SetupError, SharedNodeSettings, TaskGroup,
};
use localnet_rpc::{ControlPlane, InfoApi, NodeClient};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, Result, WorkflowError};
use crate::monitor::BootstrapMonitor;
use crate::supervisor::{supervise, NodeCommand, NodeHandle};
use crate::workflow::{ProvisioningReport, ProvisioningWorkflow, WorkflowSettings};
use crate::workspace::RunDirectory;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Builds the API clients the monitor and workflow talk to.
pub trait ApiFactory: Send + Sync {
    /// Status API of one node
    fn info(&self, slot: &NodeSlot) -> Result<Arc<dyn InfoApi>>;
    /// Control plane of the reference node
    fn control(&self, slot: &NodeSlot) -> Result<Arc<dyn ControlPlane>>;
}

/// JSON-RPC clients against each slot's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpApiFactory {
    timeout: Duration,
}

impl HttpApiFactory {
    /// Clients with the given request timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ApiFactory for HttpApiFactory {
    fn info(&self, slot: &NodeSlot) -> Result<Arc<dyn InfoApi>> {
        Ok(Arc::new(NodeClient::new(&slot.http_endpoint(), self.timeout)?))
    }

    fn control(&self, slot: &NodeSlot) -> Result<Arc<dyn ControlPlane>> {
        Ok(Arc::new(NodeClient::new(&slot.http_endpoint(), self.timeout)?))
    }
}

/// Where one node can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Slot index
    pub index: usize,
    /// Derived node id
    pub node_id: NodeId,
    /// Base URL of the HTTP API
    pub http: String,
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run directory left on disk
    pub run_dir: PathBuf,
    /// Every node, in slot order
    pub nodes: Vec<NodeEndpoint>,
    /// Readiness, if the network got that far
    pub ready: Option<NetworkReady>,
    /// Provisioning outcome, if a workload was deployed
    pub provisioning: Option<ProvisioningReport>,
}

impl RunReport {
    /// RPC endpoint of the deployed workload on every node
    pub fn workload_endpoints(&self) -> Vec<String> {
        match &self.provisioning {
            Some(report) => workload_endpoints(&self.nodes, &report.workload_id),
            None => Vec::new(),
        }
    }
}

fn workload_endpoints(nodes: &[NodeEndpoint], workload_id: &str) -> Vec<String> {
    nodes
        .iter()
        .map(|node| format!("{}/ext/bc/{workload_id}", node.http))
        .collect()
}

/// A local network run.
pub struct LocalNetwork {
    config: HarnessConfig,
    apis: Arc<dyn ApiFactory>,
}

impl LocalNetwork {
    /// Run talking JSON-RPC to the spawned nodes.
    pub fn new(config: HarnessConfig) -> Self {
        let apis = Arc::new(HttpApiFactory::new(config.polling.rpc_timeout()));
        Self { config, apis }
    }

    /// Run with custom API clients.
    pub fn with_apis(config: HarnessConfig, apis: Arc<dyn ApiFactory>) -> Self {
        Self { config, apis }
    }

    /// Configuration in effect
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run until provisioning completes (with `exit_after_provisioning`), a
    /// fatal error occurs, or `source` is cancelled.
    pub async fn run(mut self, source: CancellationSource) -> Result<RunReport> {
        self.config.resolve_paths()?;
        let config = &self.config;
        config.validate()?;

        let pool = IdentityPool::load_dir(&config.network.certs_dir)?;
        let identities = pool
            .assign(config.network.nodes)
            .map_err(SetupError::from)?;
        let genesis = match &config.workload.genesis_path {
            Some(path) => Some(
                std::fs::read(path).map_err(|e| SetupError::io("read workload genesis", path, e))?,
            ),
            None => None,
        };

        let run_dir = RunDirectory::create(config.network.work_root.as_deref())?;
        if let Some(system_plugins) = &config.network.system_plugin_dir {
            run_dir.install_system_plugins(system_plugins)?;
        }
        if let Some(vm_path) = &config.workload.vm_path {
            run_dir.install_workload(vm_path, &config.workload.vm_id)?;
        }

        let slots = plan_slots(&identities, &config.network.port_plan(), run_dir.path());
        for slot in &slots {
            run_dir.materialize_slot(slot)?;
        }

        let shared = SharedNodeSettings {
            plugin_dir: run_dir.plugin_dir().to_path_buf(),
            chain_config_dir: config.network.chain_config_dir.clone(),
            whitelisted_subnets: if config.workload.is_enabled() {
                config.network.whitelisted_subnets.clone()
            } else {
                Vec::new()
            },
            log_level: config.node.log_level.clone(),
            extra: config.node.extra_flags.clone(),
        };
        let command = NodeCommand {
            program: config.node.binary.clone(),
            prefix_args: config.node.args.clone(),
        };

        let info = slots
            .iter()
            .map(|slot| self.apis.info(slot))
            .collect::<Result<Vec<_>>>()?;
        let control = match slots.first() {
            Some(seed) if config.workload.is_enabled() => Some(self.apis.control(seed)?),
            _ => None,
        };

        // Handles kill their process on drop, so an early return tears down what started.
        let mut handles = Vec::with_capacity(slots.len());
        for slot in &slots {
            let flags = NodeFlags::for_slot(slot, &shared);
            handles.push(NodeHandle::start(slot, &command, &flags)?);
        }

        let nodes: Vec<NodeEndpoint> = slots
            .iter()
            .map(|slot| NodeEndpoint {
                index: slot.index,
                node_id: slot.identity.node_id().clone(),
                http: slot.http_endpoint(),
            })
            .collect();

        let mut group = TaskGroup::<HarnessError>::with_source(source.clone())
            .shutdown_grace(SHUTDOWN_GRACE);

        for handle in handles {
            let token = group.token();
            group.spawn(format!("node-{}", handle.index()), supervise(handle, token));
        }

        let (ready_tx, ready_watch) = readiness_signal();
        let monitor = BootstrapMonitor::new(
            info,
            config.network.required_partitions.clone(),
            config.polling.bootstrap_interval(),
        );
        let token = group.token();
        group.spawn("bootstrap-monitor", async move {
            monitor.run(&token, ready_tx).await.map_err(|cancelled| {
                tracing::info!("bootstrap monitor shutting down");
                HarnessError::from(cancelled)
            })?;
            Ok::<_, HarnessError>(())
        });

        let (report_tx, mut report_rx) = oneshot::channel();
        if let (Some(control), Some(genesis)) = (control, genesis) {
            let validators = slots
                .iter()
                .map(|slot| slot.identity.node_id().clone())
                .collect();
            let mut workflow = ProvisioningWorkflow::new(
                control,
                validators,
                WorkflowSettings::from_config(config, genesis),
            );
            let token = group.token();
            let exit_after = config.provisioning.exit_after_provisioning;
            let source = source.clone();
            let ready_watch = ready_watch.clone();
            let nodes = nodes.clone();

            group.spawn("provisioning", async move {
                ready_watch
                    .wait(&token)
                    .await
                    .map_err(WorkflowError::from)?;
                let report = workflow.run(&token).await?;

                for endpoint in workload_endpoints(&nodes, &report.workload_id) {
                    tracing::info!(%endpoint, "workload endpoint");
                }
                let _ = report_tx.send(report);

                if exit_after {
                    tracing::info!("provisioning complete; shutting down network");
                    source.cancel();
                } else {
                    tracing::info!("provisioning complete; network running until interrupted");
                }
                Ok::<_, HarnessError>(())
            });
        }

        let outcome = group.join().await;
        let provisioning = report_rx.try_recv().ok();
        let report = RunReport {
            run_dir: run_dir.path().to_path_buf(),
            nodes,
            ready: ready_watch.current(),
            provisioning,
        };

        match outcome {
            Ok(()) => Ok(report),
            Err(err)
                if err.is_cancelled()
                    && report.provisioning.is_some()
                    && config.provisioning.exit_after_provisioning =>
            {
                Ok(report)
            }
            Err(err) => {
                if err.is_cancelled() {
                    tracing::info!(run_dir = %report.run_dir.display(), "run interrupted");
                }
                Err(err)
            }
        }
    }
}
