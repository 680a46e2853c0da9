//! End-to-end runs with `sh` standing in for the node binary.
#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use localnet_core::{CancellationSource, NodeSlot};
use localnet_harness::{
    ApiFactory, HarnessConfig, HarnessError, LocalNetwork, RunReport, StepKind, StepStatus,
    WorkflowError,
};
use localnet_rpc::{ControlPlane, InfoApi};
use localnet_testkit::{IdentityFixture, RecordingControlPlane, ScriptedNodeStatus, WORKLOAD_TX};

const RUN_LIMIT: Duration = Duration::from_secs(30);

struct ScriptedApis {
    ready_after: u32,
    peers: usize,
    control: Arc<RecordingControlPlane>,
}

impl ApiFactory for ScriptedApis {
    fn info(&self, _slot: &NodeSlot) -> localnet_harness::Result<Arc<dyn InfoApi>> {
        Ok(Arc::new(ScriptedNodeStatus::ready_after(
            self.ready_after,
            self.peers,
        )))
    }

    fn control(&self, _slot: &NodeSlot) -> localnet_harness::Result<Arc<dyn ControlPlane>> {
        Ok(Arc::clone(&self.control) as Arc<dyn ControlPlane>)
    }
}

struct Scenario {
    _identities: IdentityFixture,
    scratch: tempfile::TempDir,
    config: HarnessConfig,
}

impl Scenario {
    fn new(nodes: usize, script: &str) -> Self {
        let identities = IdentityFixture::generate(nodes);
        let scratch = tempfile::tempdir().unwrap();

        let mut config = HarnessConfig::default();
        config.node.binary = PathBuf::from("sh");
        config.node.args = vec!["-c".into(), script.into(), "node".into()];
        config.network.nodes = nodes;
        config.network.base_port = 29650;
        config.network.certs_dir = identities.dir().to_path_buf();
        config.network.work_root = Some(scratch.path().to_path_buf());
        config.polling.bootstrap_interval_ms = 10;
        config.polling.commit_interval_ms = 10;
        config.polling.activation_interval_ms = 10;

        Self {
            _identities: identities,
            scratch,
            config,
        }
    }

    fn with_workload(mut self) -> Self {
        let vm = self.scratch.path().join("kewlvm");
        let genesis = self.scratch.path().join("genesis.json");
        std::fs::write(&vm, "#!/bin/sh\n").unwrap();
        std::fs::write(&genesis, "{\"alloc\":{}}").unwrap();
        self.config.workload.vm_path = Some(vm);
        self.config.workload.genesis_path = Some(genesis);
        self.config.provisioning.exit_after_provisioning = true;
        self
    }

    fn work_root(&self) -> &Path {
        self.scratch.path()
    }

    async fn run(
        &self,
        control: Arc<RecordingControlPlane>,
        source: CancellationSource,
    ) -> localnet_harness::Result<RunReport> {
        let apis = Arc::new(ScriptedApis {
            ready_after: 2,
            peers: self.config.network.nodes - 1,
            control,
        });
        let network = LocalNetwork::with_apis(self.config.clone(), apis);
        tokio::time::timeout(RUN_LIMIT, network.run(source))
            .await
            .expect("run finished in time")
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_provisions_workload_and_exits() {
    let scenario = Scenario::new(3, "exec sleep 600").with_workload();
    let control = Arc::new(RecordingControlPlane::new());

    let report = scenario
        .run(Arc::clone(&control), CancellationSource::new())
        .await
        .unwrap();

    let ready = report.ready.as_ref().expect("network became ready");
    assert_eq!(ready.node_count, 3);

    let provisioning = report.provisioning.as_ref().expect("provisioning ran");
    assert_eq!(provisioning.workload_id, WORKLOAD_TX);
    assert_eq!(provisioning.steps.len(), StepKind::ALL.len());
    assert!(provisioning
        .steps
        .iter()
        .all(|step| step.status == StepStatus::Committed));

    let enrolled: Vec<_> = provisioning
        .enrollments
        .iter()
        .map(|e| e.node_id.clone())
        .collect();
    let nodes: Vec<_> = report.nodes.iter().map(|n| n.node_id.clone()).collect();
    assert_eq!(enrolled, nodes);

    assert_eq!(
        report.workload_endpoints(),
        [
            format!("http://127.0.0.1:29650/ext/bc/{WORKLOAD_TX}"),
            format!("http://127.0.0.1:29652/ext/bc/{WORKLOAD_TX}"),
            format!("http://127.0.0.1:29654/ext/bc/{WORKLOAD_TX}"),
        ]
    );

    assert!(report.run_dir.starts_with(scenario.work_root()));
    assert!(report.run_dir.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_deployment_fails_run() {
    let scenario = Scenario::new(2, "exec sleep 600").with_workload();
    let control = Arc::new(RecordingControlPlane::new().rejecting("deploy_workload"));

    let err = scenario
        .run(Arc::clone(&control), CancellationSource::new())
        .await
        .unwrap_err();

    match err {
        HarnessError::Workflow(WorkflowError::Rejected { step, .. }) => {
            assert_eq!(step, StepKind::DeployWorkload);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!control.submissions().contains(&"list_deployments"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unexpected_node_exit_is_fatal() {
    let scenario = Scenario::new(2, "exit 3");
    let control = Arc::new(RecordingControlPlane::new());

    let err = scenario
        .run(control, CancellationSource::new())
        .await
        .unwrap_err();

    match err {
        HarnessError::Supervision { status, .. } => assert_eq!(status.code(), Some(3)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_external_cancellation_stops_every_node() {
    let scenario = Scenario::new(2, "exec sleep 600");
    let control = Arc::new(RecordingControlPlane::new());
    let source = CancellationSource::new();

    let canceller = {
        let source = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            source.cancel();
        })
    };

    let err = scenario.run(control, source).await.unwrap_err();
    assert!(err.is_cancelled());
    canceller.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relative_paths_reach_nodes_resolved() {
    use std::os::unix::fs::PermissionsExt;

    // Lives in the test's working directory so every path below can be relative.
    let local = tempfile::Builder::new()
        .prefix("relative-run-")
        .tempdir_in(".")
        .unwrap();
    let name = local.path().file_name().unwrap().to_owned();
    let relative = PathBuf::from(".").join(&name);

    let script = local.path().join("node.sh");
    let body = "#!/bin/sh\nprintf '%s\\n' \"$@\" > args.txt\nexec sleep 600\n";
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::create_dir(local.path().join("runs")).unwrap();
    std::fs::create_dir(local.path().join("chains")).unwrap();

    let mut scenario = Scenario::new(2, "unused");
    scenario.config.node.binary = relative.join("node.sh");
    scenario.config.node.args = Vec::new();
    scenario.config.network.work_root = Some(relative.join("runs"));
    scenario.config.network.chain_config_dir = Some(relative.join("chains"));

    let source = CancellationSource::new();
    let canceller = {
        let source = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            source.cancel();
        })
    };
    let err = scenario
        .run(Arc::new(RecordingControlPlane::new()), source)
        .await
        .unwrap_err();
    canceller.await.unwrap();
    assert!(err.is_cancelled(), "unexpected {err:?}");

    let runs: Vec<_> = std::fs::read_dir(local.path().join("runs"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);

    let args = std::fs::read_to_string(runs[0].join("node1").join("args.txt")).unwrap();
    for flag in ["--db-dir=", "--log-dir=", "--plugin-dir=", "--chain-config-dir="] {
        let value = args
            .lines()
            .find_map(|line| line.strip_prefix(flag))
            .unwrap_or_else(|| panic!("{flag} missing from {args}"));
        assert!(Path::new(value).is_absolute(), "{flag}{value} is relative");
        assert!(Path::new(value).exists(), "{flag}{value} does not exist");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_identities_fail_before_spawning() {
    let mut scenario = Scenario::new(2, "exec sleep 600");
    scenario.config.network.nodes = 4;
    let control = Arc::new(RecordingControlPlane::new());

    let err = scenario
        .run(control, CancellationSource::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Setup(_)));
    let leftovers = std::fs::read_dir(scenario.work_root()).unwrap().count();
    assert_eq!(leftovers, 0);
}
