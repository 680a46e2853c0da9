//! Per-run working directory.
//!
//! ```text
//! localnet-XXXX/
//!   plugins/            shared workload binaries
//!   node1/ .. nodeN/    staker.crt, staker.key, db/, logs/
//! ```
//!
//! The directory is left on disk after the run so node logs can be inspected.

use std::fs;
use std::path::{Path, PathBuf};

use localnet_core::{NodeSlot, SetupError};
use tempfile::TempDir;

/// Prefix of every run directory name.
pub const RUN_DIR_PREFIX: &str = "localnet-";

/// Files written by a node process are redirected here.
pub const STDOUT_LOG: &str = "stdout.log";
/// See [`STDOUT_LOG`].
pub const STDERR_LOG: &str = "stderr.log";

/// Materialized run directory.
#[derive(Debug)]
pub struct RunDirectory {
    dir: TempDir,
    plugin_dir: PathBuf,
}

impl RunDirectory {
    /// Create a fresh run directory under `parent` (system temp dir when `None`).
    pub fn create(parent: Option<&Path>) -> Result<Self, SetupError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(RUN_DIR_PREFIX).keep(true);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| SetupError::io("create run directory", parent.unwrap_or(Path::new("")), e))?;

        let plugin_dir = dir.path().join("plugins");
        fs::create_dir_all(&plugin_dir)
            .map_err(|e| SetupError::io("create plugin directory", &plugin_dir, e))?;

        tracing::info!(dir = %dir.path().display(), "created run directory");
        Ok(Self { dir, plugin_dir })
    }

    /// Root of the run directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Shared plugin directory
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Copy every regular file in `system_plugins` into the plugin directory.
    pub fn install_system_plugins(&self, system_plugins: &Path) -> Result<usize, SetupError> {
        let entries = fs::read_dir(system_plugins)
            .map_err(|e| SetupError::io("list system plugins", system_plugins, e))?;

        let mut copied = 0;
        for entry in entries {
            let entry =
                entry.map_err(|e| SetupError::io("list system plugins", system_plugins, e))?;
            let source = entry.path();
            if !source.is_file() {
                continue;
            }
            let target = self.plugin_dir.join(entry.file_name());
            copy_executable(&source, &target)?;
            tracing::debug!(plugin = %target.display(), "installed system plugin");
            copied += 1;
        }
        Ok(copied)
    }

    /// Install the workload binary under its declared id so the node runtime can find it.
    pub fn install_workload(
        &self,
        binary: &Path,
        workload_id: &str,
    ) -> Result<PathBuf, SetupError> {
        let target = self.plugin_dir.join(workload_id);
        copy_executable(binary, &target)?;
        tracing::info!(
            workload = workload_id,
            plugin = %target.display(),
            "installed workload plugin"
        );
        Ok(target)
    }

    /// Write the slot's staking files and create its data and log directories.
    pub fn materialize_slot(&self, slot: &NodeSlot) -> Result<(), SetupError> {
        let paths = &slot.paths;
        for dir in [&paths.node_dir, &paths.db_dir, &paths.log_dir] {
            fs::create_dir_all(dir).map_err(|e| SetupError::io("create node directory", dir, e))?;
        }
        fs::write(&paths.cert_file, slot.identity.certificate())
            .map_err(|e| SetupError::io("write staking certificate", &paths.cert_file, e))?;
        fs::write(&paths.key_file, slot.identity.private_key())
            .map_err(|e| SetupError::io("write staking key", &paths.key_file, e))?;
        restrict_permissions(&paths.key_file)?;
        Ok(())
    }
}

fn copy_executable(source: &Path, target: &Path) -> Result<(), SetupError> {
    fs::copy(source, target).map_err(|e| SetupError::io("copy plugin", source, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(0o755))
            .map_err(|e| SetupError::io("mark plugin executable", target, e))?;
    }
    Ok(())
}

fn restrict_permissions(path: &Path) -> Result<(), SetupError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| SetupError::io("restrict staking key", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use localnet_core::{plan_slots, PortPlan};
    use localnet_testkit::IdentityFixture;

    #[test]
    fn run_directory_layout() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();
        assert!(run
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(RUN_DIR_PREFIX));
        assert!(run.plugin_dir().is_dir());

        let fixture = IdentityFixture::generate(2);
        let identities = fixture.pool().assign(2).unwrap();
        let slots = plan_slots(&identities, &PortPlan::default(), run.path());
        for slot in &slots {
            run.materialize_slot(slot).unwrap();
        }

        let node2 = run.path().join("node2");
        assert!(node2.join("db").is_dir());
        assert!(node2.join("logs").is_dir());
        assert_eq!(
            fs::read(node2.join("staker.crt")).unwrap(),
            slots[1].identity.certificate()
        );
    }

    #[test]
    fn plugins_are_copied_by_name() {
        let parent = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(Some(parent.path())).unwrap();

        let system = tempfile::tempdir().unwrap();
        fs::write(system.path().join("evm"), b"evm").unwrap();
        fs::create_dir(system.path().join("nested")).unwrap();
        assert_eq!(run.install_system_plugins(system.path()).unwrap(), 1);
        assert!(run.plugin_dir().join("evm").is_file());

        let vm = system.path().join("my-vm");
        fs::write(&vm, b"vm").unwrap();
        let target = run.install_workload(&vm, "vmid123").unwrap();
        assert_eq!(target, run.plugin_dir().join("vmid123"));
        assert_eq!(fs::read(target).unwrap(), b"vm");
    }

    #[test]
    fn run_directory_survives_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = RunDirectory::create(Some(parent.path())).unwrap().path().to_path_buf();
        assert!(path.is_dir());
    }
}
