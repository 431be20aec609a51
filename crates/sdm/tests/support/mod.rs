//! Shared helpers for sdm integration tests
#![allow(dead_code)]

pub mod service;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use common::prelude::*;
use sdm::backends::fuse::{
    CommandError, CommandLine, CommandRunner, FuseBackend, MountEntry, ProcessInspector,
};
use sdm::backends::{Backends, RestBackend};
use sdm::mount_manager::{MountManager, MountManagerConfig};
use sdm::state::{FuseConfig, RestConfig};

pub const MS_HOST: &str = "https://ms.example.org:8080";

#[derive(Debug, Default)]
struct FakeState {
    processes: usize,
    mounts: Vec<MountEntry>,
    commands: Vec<CommandLine>,
    /// The filesystem process exits right after launch
    launch_dies: bool,
    /// The filesystem process runs but its mount never shows up
    mount_hangs: bool,
    /// `fusermount -u` fails and leaves the mount in place
    unmount_fails: bool,
}

/// Stands in for both the process table and the programs the FUSE
/// backend runs. Launching `syndicatefs` makes its mount appear at once.
#[derive(Debug, Default)]
pub struct FakeSystem {
    state: Mutex<FakeState>,
}

impl FakeSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_launch_dies(&self, value: bool) {
        self.state.lock().unwrap().launch_dies = value;
    }

    pub fn set_mount_hangs(&self, value: bool) {
        self.state.lock().unwrap().mount_hangs = value;
    }

    pub fn set_unmount_fails(&self, value: bool) {
        self.state.lock().unwrap().unmount_fails = value;
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .mounts
            .iter()
            .any(|m| m.target == path)
    }

    /// Simulate the filesystem going away behind our back.
    pub fn kill_mount(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let before = state.mounts.len();
        state.mounts.retain(|m| m.target != path);
        let removed = before - state.mounts.len();
        state.processes = state.processes.saturating_sub(removed);
    }

    pub fn commands(&self) -> Vec<CommandLine> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Runs of `program` that passed `arg` anywhere on the command line.
    pub fn count_runs(&self, program: &str, arg: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.program == program && c.args.iter().any(|a| a == arg))
            .count()
    }
}

fn conf_path(command: &CommandLine) -> Option<&str> {
    let at = command.args.iter().position(|a| a == "-c")?;
    command.args.get(at + 1).map(String::as_str)
}

impl ProcessInspector for FakeSystem {
    fn count_processes(&self, _name: &str) -> usize {
        self.state.lock().unwrap().processes
    }

    fn mounts(&self) -> std::io::Result<Vec<MountEntry>> {
        Ok(self.state.lock().unwrap().mounts.clone())
    }
}

#[async_trait::async_trait]
impl CommandRunner for FakeSystem {
    async fn run(&self, command: &CommandLine) -> Result<String, CommandError> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.clone());

        if command.program == "fusermount" {
            if state.unmount_fails {
                return Err(CommandError::Exit {
                    program: command.program.clone(),
                    code: Some(1),
                    output: "device busy".to_string(),
                });
            }
            let target = command.args.last().cloned().unwrap_or_default();
            let before = state.mounts.len();
            state.mounts.retain(|m| m.target != target);
            let removed = before - state.mounts.len();
            state.processes = state.processes.saturating_sub(removed);
            return Ok(String::new());
        }

        if command.program == "syndicate" && command.args.iter().any(|a| a == "setup") {
            if let Some(conf) = conf_path(command) {
                std::fs::write(conf, "[syndicate]\n").unwrap();
            }
        }
        Ok(String::new())
    }

    async fn spawn_background(
        &self,
        command: &CommandLine,
        log_path: &Path,
    ) -> Result<(), CommandError> {
        std::fs::write(log_path, format!("{}\n", command)).unwrap();

        let mut state = self.state.lock().unwrap();
        state.commands.push(command.clone());
        if state.launch_dies {
            return Ok(());
        }
        state.processes += 1;
        if state.mount_hangs {
            return Ok(());
        }
        let target = command.args.last().cloned().unwrap_or_default();
        state.mounts.push(MountEntry {
            source: "syndicatefs".to_string(),
            target,
            fs_type: "fuse.syndicatefs".to_string(),
        });
        Ok(())
    }
}

pub fn entry(dataset: &str, username: &str, user_pkey: &str) -> CatalogueEntry {
    CatalogueEntry {
        dataset: dataset.to_string(),
        ms_host: MS_HOST.to_string(),
        volume: dataset.to_string(),
        username: username.to_string(),
        user_pkey: user_pkey.to_string(),
        gateway: format!("{dataset}-ag"),
        description: format!("{dataset} sample data"),
    }
}

/// Every dataset but `private-2021` ships its own credentials.
pub fn catalogue() -> Catalogue {
    Catalogue::from_entries(vec![
        entry("geo-2020", "anon@example.org", "ANON-KEY"),
        entry("ocean-2019", "anon@example.org", "ANON-KEY"),
        entry("ice-2018", "anon@example.org", "ANON-KEY"),
        entry("private-2021", "", ""),
    ])
}

pub fn fast_fuse_config() -> FuseConfig {
    FuseConfig {
        mount_timeout_secs: 2,
        mount_retry: 0,
        check_timeout_secs: 1,
        ..FuseConfig::default()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub system: Arc<FakeSystem>,
    pub manager: MountManager,
    pub mount_root: PathBuf,
    pub state_root: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Vec::new(), RestConfig::default())
    }

    pub fn with(users: Vec<LocalUser>, rest: RestConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let mount_root = dir.path().join("mnt");
        let state_root = dir.path().join("state").join("mounts");
        let system = FakeSystem::new();

        let fuse = FuseBackend::new(
            fast_fuse_config(),
            &state_root,
            system.clone(),
            system.clone(),
        );
        let rest_backend = RestBackend::new(&rest).unwrap();
        let config = MountManagerConfig {
            default_backend: BackendKind::Fuse,
            fuse_root: mount_root.to_string_lossy().into_owned(),
            rest_root: rest.default_mount_path.clone(),
            users,
        };
        let manager = MountManager::new(
            dir.path().join("state").join("mounts.tab"),
            Backends::new(fuse, rest_backend),
            config,
        );

        Self {
            dir,
            system,
            manager,
            mount_root,
            state_root,
        }
    }

    pub fn mount_path(&self, dataset: &str) -> String {
        self.mount_root.join(dataset).to_string_lossy().into_owned()
    }

    pub fn table(&self) -> MountTable {
        MountTable::load(self.manager.table_path()).unwrap()
    }
}
