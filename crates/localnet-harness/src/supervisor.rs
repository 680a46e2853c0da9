//! Node process supervision.
//!
//! One `NodeHandle` per slot owns the child process. `supervise` races the
//! process exit against run cancellation: an exit first is a supervision
//! failure, cancellation first stops the process and ends quietly.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use localnet_core::{CancelToken, NodeFlags, NodeSlot};
use tokio::process::{Child, Command};

use crate::errors::{HarnessError, Result};
use crate::workspace::{STDERR_LOG, STDOUT_LOG};

/// Program and leading arguments used to launch a node.
#[derive(Debug, Clone)]
pub struct NodeCommand {
    /// Executable
    pub program: PathBuf,
    /// Arguments placed before the generated flags
    pub prefix_args: Vec<String>,
}

impl NodeCommand {
    /// Command for `program` with no prefix arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Full argument list for a slot
    pub fn args_for(&self, flags: &NodeFlags, cwd: &Path) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend(flags.to_args(cwd));
        args
    }
}

/// A started node process.
#[derive(Debug)]
pub struct NodeHandle {
    index: usize,
    child: Child,
    pid: Option<u32>,
    exit: Option<ExitStatus>,
}

impl NodeHandle {
    /// Spawn the node for `slot`, logging to its `logs/` directory.
    pub fn start(slot: &NodeSlot, command: &NodeCommand, flags: &NodeFlags) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|source| HarnessError::Spawn {
            node: slot.index,
            program: command.program.display().to_string(),
            source,
        })?;
        let spawn_error = |source| HarnessError::Spawn {
            node: slot.index,
            program: command.program.display().to_string(),
            source,
        };

        let stdout = File::create(slot.paths.log_dir.join(STDOUT_LOG)).map_err(spawn_error)?;
        let stderr = File::create(slot.paths.log_dir.join(STDERR_LOG)).map_err(spawn_error)?;

        let child = Command::new(&command.program)
            .args(command.args_for(flags, &cwd))
            .current_dir(&slot.paths.node_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let pid = child.id();
        tracing::info!(
            node = slot.index,
            pid,
            http = %slot.http_endpoint(),
            seed = slot.is_seed(),
            "started node"
        );
        Ok(Self {
            index: slot.index,
            child,
            pid,
            exit: None,
        })
    }

    /// Slot index
    pub fn index(&self) -> usize {
        self.index
    }

    /// OS process id, if the process was still running when spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status once observed
    pub fn last_exit(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Wait for the process to exit. Returns the cached status after the first exit.
    pub async fn await_exit(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| HarnessError::ProcessWait {
                node: self.index,
                source,
            })?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Kill the process and reap it. Safe to call repeatedly and after a natural exit.
    pub async fn stop(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit = Some(status);
            return Ok(status);
        }
        if let Err(err) = self.child.start_kill() {
            tracing::debug!(node = self.index, error = %err, "kill failed; process already gone");
        }
        self.await_exit().await
    }
}

/// Watch one node until it exits or the run is cancelled.
pub async fn supervise(mut handle: NodeHandle, token: CancelToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            let status = handle.stop().await?;
            tracing::info!(node = handle.index(), %status, "node stopped");
            Ok(())
        }
        exited = handle.await_exit() => {
            let status = exited?;
            if token.is_cancelled() {
                tracing::info!(node = handle.index(), %status, "node exited during shutdown");
                Ok(())
            } else {
                Err(HarnessError::Supervision {
                    node: handle.index(),
                    status,
                })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use super::*;
    use localnet_core::{plan_slots, CancellationSource, PortPlan, SharedNodeSettings};
    use localnet_testkit::IdentityFixture;

    use crate::workspace::RunDirectory;

    fn shell(script: &str) -> NodeCommand {
        NodeCommand {
            program: PathBuf::from("sh"),
            prefix_args: vec!["-c".to_string(), script.to_string(), "node".to_string()],
        }
    }

    fn seed_slot(run: &RunDirectory) -> (NodeSlot, NodeFlags) {
        let fixture = IdentityFixture::generate(1);
        let identities = fixture.pool().assign(1).unwrap();
        let slot = plan_slots(&identities, &PortPlan::default(), run.path()).remove(0);
        run.materialize_slot(&slot).unwrap();
        let flags = NodeFlags::for_slot(&slot, &SharedNodeSettings::default());
        (slot, flags)
    }

    #[tokio::test]
    async fn unexpected_exit_is_supervision_error() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();
        let (slot, flags) = seed_slot(&run);

        let handle = NodeHandle::start(&slot, &shell("exit 3"), &flags).unwrap();
        let source = CancellationSource::new();
        match supervise(handle, source.token()).await {
            Err(HarnessError::Supervision { node, status }) => {
                assert_eq!(node, 0);
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_process_quietly() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();
        let (slot, flags) = seed_slot(&run);

        let handle = NodeHandle::start(&slot, &shell("exec sleep 600"), &flags).unwrap();
        let source = CancellationSource::new();
        let task = tokio::spawn(supervise(handle, source.token()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        source.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(joined.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stop_is_idempotent_after_exit() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();
        let (slot, flags) = seed_slot(&run);

        let mut handle = NodeHandle::start(&slot, &shell("exit 0"), &flags).unwrap();
        let first = handle.await_exit().await.unwrap();
        assert_eq!(handle.stop().await.unwrap(), first);
        assert_eq!(handle.stop().await.unwrap(), first);
        assert_eq!(handle.last_exit(), Some(first));
    }

    #[tokio::test]
    async fn output_goes_to_log_files_and_flags_follow_prefix() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();
        let (slot, flags) = seed_slot(&run);

        let mut handle =
            NodeHandle::start(&slot, &shell("echo \"$@\"; echo oops >&2"), &flags).unwrap();
        assert!(handle.await_exit().await.unwrap().success());

        let stdout = std::fs::read_to_string(slot.paths.log_dir.join(STDOUT_LOG)).unwrap();
        assert!(stdout.contains("--http-port=9650"));
        assert!(stdout.contains("--staking-port=9651"));
        let stderr = std::fs::read_to_string(slot.paths.log_dir.join(STDERR_LOG)).unwrap();
        assert_eq!(stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();
        let (slot, flags) = seed_slot(&run);

        let command = NodeCommand::new("/nonexistent/node-binary");
        assert!(matches!(
            NodeHandle::start(&slot, &command, &flags),
            Err(HarnessError::Spawn { node: 0, .. })
        ));
    }
}
