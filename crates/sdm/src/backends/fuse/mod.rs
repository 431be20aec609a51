//! Local FUSE backend
//!
//! Binds a dataset by registering the user with the metadata service and
//! launching a `syndicatefs` process on the mount path. Everything the
//! backend keeps for a record lives under `<state dir>/mounts/<record id>/`:
//!
//! - `syndicate.conf`: registration written by `syndicate setup`
//! - `mount.log`: output of the filesystem process
//!
//! Processes are launched through a [`CommandRunner`] and observed through a
//! [`ProcessInspector`], so tests can substitute both.

mod inspect;
mod runner;

pub use inspect::{MountEntry, ProcInspector, ProcessInspector};
pub use runner::{CommandError, CommandLine, CommandRunner, SystemRunner};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::mount_table::normalize_dataset;
use common::prelude::*;

use crate::state::{resolve_path, FuseConfig};

const KIND: BackendKind = BackendKind::Fuse;

pub const CONFIG_FILE_NAME: &str = "syndicate.conf";
pub const LOG_FILE_NAME: &str = "mount.log";

#[derive(Debug, Clone)]
pub struct FuseBackend {
    config: FuseConfig,
    /// Parent of the per-record state directories
    state_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    inspector: Arc<dyn ProcessInspector>,
}

impl FuseBackend {
    pub fn new(
        config: FuseConfig,
        state_root: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            config,
            state_root: state_root.into(),
            runner,
            inspector,
        }
    }

    /// Backend talking to the real system.
    pub fn system(config: FuseConfig, state_root: impl Into<PathBuf>) -> Self {
        Self::new(
            config,
            state_root,
            Arc::new(SystemRunner),
            Arc::new(ProcInspector),
        )
    }

    pub fn record_dir(&self, record_id: &str) -> PathBuf {
        self.state_root.join(record_id.trim().to_lowercase())
    }

    fn process_name(&self) -> &str {
        let bin = self.config.syndicatefs_bin.as_str();
        Path::new(bin)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(bin)
    }

    fn probe(&self, mount_path: &str) -> Probe {
        let name = self.process_name();
        if self.inspector.count_processes(name) == 0 {
            return Probe::Absent;
        }
        match self.inspector.mounts() {
            Ok(mounts) if mounts.iter().any(|m| self.is_our_mount(m, mount_path)) => Probe::Ready,
            Ok(_) => Probe::Pending,
            Err(e) => {
                tracing::warn!("failed to read mount table: {}", e);
                Probe::Pending
            }
        }
    }

    fn is_our_mount(&self, entry: &MountEntry, mount_path: &str) -> bool {
        let name = self.process_name();
        let source_matches = entry.source == name
            || Path::new(&entry.source)
                .file_name()
                .is_some_and(|f| f == name);
        entry.fs_type.starts_with("fuse.") && source_matches && entry.target == mount_path
    }

    fn is_bound(&self, mount_path: &str) -> Result<bool, BackendError> {
        let mounts = self
            .inspector
            .mounts()
            .map_err(|e| BackendError::execution(KIND, format!("failed to read mount table: {e}")))?;
        Ok(mounts
            .iter()
            .any(|m| m.fs_type.starts_with("fuse") && m.target == mount_path))
    }

    async fn wait_mount(&self, mount_path: &str, poll: PollConfig) -> Result<(), PollError> {
        wait_until(poll, || self.probe(mount_path)).await
    }

    async fn run(&self, command: CommandLine) -> Result<String, BackendError> {
        self.runner
            .run(&command)
            .await
            .map_err(|e| BackendError::execution(KIND, e.to_string()))
    }

    fn syndicate(&self, conf: &Path) -> CommandLine {
        let mut command = CommandLine::new(&self.config.syndicate_bin);
        if self.config.debug_mode {
            command = command.arg("-d");
        }
        command.arg("-c").arg(conf.to_string_lossy())
    }

    /// Register the identity unless a private config already exists.
    async fn setup(&self, params: &MountParams<'_>, conf: &Path) -> Result<(), BackendError> {
        if conf.exists() && !self.config.force_setup {
            tracing::debug!("reusing registration at {}", conf.display());
        } else {
            self.register(params, conf).await?;
        }

        self.run(
            self.syndicate(conf)
                .args(["reload_user_cert", params.username]),
        )
        .await?;
        self.run(
            self.syndicate(conf)
                .args(["reload_volume_cert", params.dataset]),
        )
        .await?;
        self.run(
            self.syndicate(conf)
                .args(["reload_gateway_cert", gateway_name(params).as_str()]),
        )
        .await?;
        Ok(())
    }

    async fn register(&self, params: &MountParams<'_>, conf: &Path) -> Result<(), BackendError> {
        tracing::info!(
            "registering {} with {} for {}",
            params.username,
            params.ms_host,
            params.dataset
        );
        let io_err = |e: std::io::Error| {
            BackendError::execution(KIND, format!("failed to stage private key: {e}"))
        };

        // Removed when dropped, once registration is done
        let mut key_file = tempfile::NamedTempFile::new().map_err(io_err)?;
        key_file
            .write_all(params.user_pkey.as_bytes())
            .and_then(|_| key_file.flush())
            .map_err(io_err)?;

        let key_path = key_file.path().to_string_lossy().into_owned();
        self.run(self.syndicate(conf).args([
            "--trust_public_key",
            "setup",
            params.username,
            key_path.as_str(),
            params.ms_host,
        ]))
        .await?;
        drop(key_file);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(conf)
            .map_err(|e| BackendError::execution(KIND, format!("failed to update {}: {e}", conf.display())))?;
        writeln!(file, "\n[gateway]\ncache_size_limit={}", self.config.cache_max)
            .map_err(|e| BackendError::execution(KIND, format!("failed to update {}: {e}", conf.display())))?;
        Ok(())
    }

    fn launch_command(&self, params: &MountParams<'_>, conf: &Path) -> CommandLine {
        let mut command = CommandLine::new(&self.config.syndicatefs_bin);
        if self.config.debug_mode {
            command = command.arg(format!("-d{}", self.config.debug_level));
        }
        command
            .arg("-c")
            .arg(conf.to_string_lossy())
            .args(["-f", "-u", "ANONYMOUS", "-v", params.dataset, "-g"])
            .arg(gateway_name(params))
            .arg(params.mount_path)
    }
}

/// Gateway names are matched case-insensitively by syndicate.
fn gateway_name(params: &MountParams<'_>) -> String {
    params.gateway.trim().to_lowercase()
}

#[async_trait::async_trait]
impl MountBackend for FuseBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn normalize_mount_path(&self, mount_path: &str) -> Result<String, BackendError> {
        resolve_path(mount_path)
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or_else(|| BackendError::path_construction(KIND, format!("cannot resolve {mount_path:?}")))
    }

    fn is_legal_mount_path(&self, mount_path: &str) -> bool {
        let path = Path::new(mount_path);
        if !path.is_absolute() {
            return false;
        }
        match std::fs::metadata(path) {
            Err(e) => e.kind() == std::io::ErrorKind::NotFound,
            Ok(meta) if meta.is_dir() => std::fs::read_dir(path)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false),
            Ok(_) => false,
        }
    }

    fn make_default_mount_path(
        &self,
        dataset: &str,
        default_root: &str,
    ) -> Result<String, BackendError> {
        let dataset = normalize_dataset(dataset);
        if matches!(dataset.as_str(), "" | "." | "..") || dataset.contains('/') {
            return Err(BackendError::path_construction(
                KIND,
                format!("dataset {dataset:?} is not a valid directory name"),
            ));
        }
        let root = resolve_path(default_root).ok_or_else(|| {
            BackendError::path_construction(KIND, format!("cannot resolve root {default_root:?}"))
        })?;
        let path = root.join(&dataset);
        if !path.is_absolute() {
            return Err(BackendError::path_construction(
                KIND,
                format!("{} is not absolute", path.display()),
            ));
        }
        Ok(path.to_string_lossy().into_owned())
    }

    async fn mount(&self, params: &MountParams<'_>) -> Result<(), BackendError> {
        let record_dir = self.record_dir(params.record_id);
        tokio::fs::create_dir_all(&record_dir).await.map_err(|e| {
            BackendError::execution(KIND, format!("failed to create {}: {e}", record_dir.display()))
        })?;
        let conf = record_dir.join(CONFIG_FILE_NAME);

        self.setup(params, &conf).await?;

        tokio::fs::create_dir_all(params.mount_path).await.map_err(|e| {
            BackendError::execution(KIND, format!("failed to create {}: {e}", params.mount_path))
        })?;

        if self.probe(params.mount_path) == Probe::Ready {
            tracing::info!("{} already served at {}", params.dataset, params.mount_path);
            return Ok(());
        }

        let command = self.launch_command(params, &conf);
        self.runner
            .spawn_background(&command, &record_dir.join(LOG_FILE_NAME))
            .await
            .map_err(|e| BackendError::execution(KIND, e.to_string()))?;

        let poll = PollConfig::new(
            Duration::from_secs(self.config.mount_timeout_secs),
            self.config.mount_retry,
        );
        match self.wait_mount(params.mount_path, poll).await {
            Ok(()) => {
                tracing::info!("mounted {} at {}", params.dataset, params.mount_path);
                Ok(())
            }
            Err(PollError::TimedOut(after)) => Err(BackendError::timeout(
                KIND,
                format!("{} did not appear within {after:?}", params.mount_path),
            )),
            Err(e @ PollError::NotFound { .. }) => Err(BackendError::execution(
                KIND,
                format!(
                    "{} is not running ({e}); see {}",
                    self.process_name(),
                    record_dir.join(LOG_FILE_NAME).display()
                ),
            )),
        }
    }

    async fn check_mount(
        &self,
        _record_id: &str,
        _dataset: &str,
        mount_path: &str,
    ) -> Result<bool, BackendError> {
        let poll = PollConfig::new(Duration::from_secs(self.config.check_timeout_secs), 0);
        Ok(self.wait_mount(mount_path, poll).await.is_ok())
    }

    async fn unmount(
        &self,
        record_id: &str,
        dataset: &str,
        mount_path: &str,
        cleanup: bool,
    ) -> Result<(), BackendError> {
        if self.is_bound(mount_path)? {
            let command = CommandLine::new(&self.config.fusermount_bin).args(["-u", mount_path]);
            if let Err(e) = self.runner.run(&command).await {
                if self.is_bound(mount_path)? {
                    return Err(BackendError::execution(KIND, e.to_string()));
                }
                tracing::debug!("{} went away while unmounting: {}", mount_path, e);
            }
            tracing::info!("unmounted {} from {}", dataset, mount_path);
        } else {
            tracing::debug!("{} is not mounted", mount_path);
        }

        if cleanup {
            let record_dir = self.record_dir(record_id);
            match tokio::fs::remove_dir_all(&record_dir).await {
                Ok(()) => tracing::debug!("removed {}", record_dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(BackendError::execution(
                        KIND,
                        format!("failed to remove {}: {e}", record_dir.display()),
                    ))
                }
            }
        }
        Ok(())
    }
}
