//! Mount manager
//!
//! Composes the record table and the backends into the mount lifecycle:
//! mount, unmount, status sync and clean. Every operation holds the table
//! lock from its first load to its last save, so concurrent invocations
//! serialize instead of losing updates.

use std::path::{Path, PathBuf};

use common::mount_table::make_record_id;
use common::prelude::*;

use crate::backends::Backends;
use crate::state::{AppConfig, AppState};

/// Per-process settings the manager needs beyond the backends.
#[derive(Debug, Clone)]
pub struct MountManagerConfig {
    pub default_backend: BackendKind,
    pub fuse_root: String,
    pub rest_root: String,
    pub users: Vec<LocalUser>,
}

impl MountManagerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            default_backend: config.default_backend,
            fuse_root: config.default_root(BackendKind::Fuse).to_string(),
            rest_root: config.default_root(BackendKind::Rest).to_string(),
            users: config.users.clone(),
        }
    }

    fn default_root(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::Fuse => &self.fuse_root,
            BackendKind::Rest => &self.rest_root,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MountRequest {
    pub dataset: String,
    /// Backend default under the configured root when absent
    pub mount_path: Option<String>,
    /// Configured default when absent
    pub backend: Option<BackendKind>,
}

impl MountRequest {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            mount_path: None,
            backend: None,
        }
    }

    pub fn at(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = Some(mount_path.into());
        self
    }

    pub fn via(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// The binding is gone and the record was kept as `UNMOUNTED`
    Unmounted(MountRecord),
    /// The binding is gone and the record was deleted
    Removed(MountRecord),
}

impl UnmountOutcome {
    pub fn record(&self) -> &MountRecord {
        match self {
            UnmountOutcome::Unmounted(record) | UnmountOutcome::Removed(record) => record,
        }
    }
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub removed: Vec<MountRecord>,
    pub failed: Vec<(MountRecord, MountError)>,
}

/// The reconciliation engine.
#[derive(Debug, Clone)]
pub struct MountManager {
    table_path: PathBuf,
    backends: Backends,
    config: MountManagerConfig,
}

impl MountManager {
    pub fn new(
        table_path: impl Into<PathBuf>,
        backends: Backends,
        config: MountManagerConfig,
    ) -> Self {
        Self {
            table_path: table_path.into(),
            backends,
            config,
        }
    }

    pub fn from_state(state: &AppState, backends: Backends) -> Self {
        Self::new(
            &state.table_path,
            backends,
            MountManagerConfig::from_app_config(&state.config),
        )
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    async fn lock(&self) -> Result<TableLock, MountError> {
        let table_path = self.table_path.clone();
        let lock = tokio::task::spawn_blocking(move || TableLock::acquire(&table_path)).await??;
        Ok(lock)
    }

    fn load(&self) -> Result<MountTable, MountError> {
        Ok(MountTable::load(&self.table_path)?)
    }

    fn save(&self, table: &MountTable) -> Result<(), MountError> {
        Ok(table.save(&self.table_path)?)
    }

    /// Records as persisted, without consulting any backend.
    pub async fn list(&self) -> Result<Vec<MountRecord>, MountError> {
        let _lock = self.lock().await?;
        Ok(self.load()?.list_all().to_vec())
    }

    /// Bind `request.dataset` through a backend and record it.
    ///
    /// The record is persisted as `UNMOUNTED` before the backend is invoked,
    /// and flipped to `MOUNTED` only once the backend reports success.
    pub async fn mount(
        &self,
        catalogue: &Catalogue,
        request: &MountRequest,
    ) -> Result<MountRecord, MountError> {
        let entry = catalogue
            .get(&request.dataset)
            .ok_or_else(|| MountError::DatasetNotFound(request.dataset.trim().to_string()))?;

        let identity =
            resolve_identity(entry, &self.config.users).ok_or_else(|| MountError::NoCredentials {
                dataset: entry.dataset.clone(),
                ms_host: entry.ms_host.clone(),
            })?;

        let kind = request.backend.unwrap_or(self.config.default_backend);
        let backend = self.backends.get(kind);
        let mount_path = match &request.mount_path {
            Some(path) => backend.normalize_mount_path(path)?,
            None => backend.make_default_mount_path(&entry.dataset, self.config.default_root(kind))?,
        };

        let _lock = self.lock().await?;
        let mut table = self.load()?;

        // Stale slot: a leftover record for this dataset at this path
        let stale: Vec<String> = table
            .find_by_mount_path(&mount_path)
            .into_iter()
            .filter(|r| !r.is_mounted() && r.dataset == entry.dataset)
            .map(|r| r.id.clone())
            .collect();

        let occupied = table
            .find_by_mount_path(&mount_path)
            .into_iter()
            .any(|r| !stale.contains(&r.id));
        if occupied {
            return Err(MountTableError::DuplicateRecord(mount_path).into());
        }
        if let Some(existing) = table
            .get(&make_record_id(&entry.dataset, kind))
            .filter(|r| !stale.contains(&r.id))
        {
            return Err(MountTableError::DuplicateRecord(existing.short_id().to_string()).into());
        }

        if !backend.is_legal_mount_path(&mount_path) {
            return Err(BackendError::illegal_path(kind, &mount_path).into());
        }

        for id in stale {
            tracing::info!("reusing stale slot {} at {}", id, mount_path);
            table.delete(&id)?;
        }

        let record = table.add(&entry.dataset, &mount_path, kind, MountStatus::Unmounted)?;
        self.save(&table)?;
        tracing::info!(
            "mounting {} at {} via {} ({})",
            record.dataset,
            record.mount_path,
            kind,
            record.short_id()
        );

        let params = MountParams {
            record_id: &record.id,
            ms_host: &entry.ms_host,
            dataset: &entry.dataset,
            username: &identity.username,
            user_pkey: &identity.user_pkey,
            gateway: &entry.gateway,
            mount_path: &record.mount_path,
        };
        if let Err(e) = backend.mount(&params).await {
            tracing::warn!("mount of {} failed: {}", record.dataset, e);
            return Err(e.into());
        }

        let record = table.set_status(&record.id, MountStatus::Mounted)?;
        self.save(&table)?;
        Ok(record)
    }

    /// Unmount the single record matching `selector`.
    ///
    /// The selector is tried as a dataset name, then as an id prefix, then
    /// as a mount path; the first interpretation with any match wins.
    pub async fn unmount(&self, selector: &str, cleanup: bool) -> Result<UnmountOutcome, MountError> {
        let _lock = self.lock().await?;
        let mut table = self.load()?;

        let record = self.resolve(&table, selector)?;
        if !cleanup && !record.is_mounted() {
            return Err(MountError::AlreadyUnmounted(record.short_id().to_string()));
        }

        self.unmount_record(&mut table, record, cleanup).await
    }

    /// Unmount through the backend, then persist the new record state.
    async fn unmount_record(
        &self,
        table: &mut MountTable,
        record: MountRecord,
        cleanup: bool,
    ) -> Result<UnmountOutcome, MountError> {
        let backend = self.backends.get(record.backend);
        backend
            .unmount(&record.id, &record.dataset, &record.mount_path, cleanup)
            .await?;

        let record = table.set_status(&record.id, MountStatus::Unmounted)?;
        self.save(table)?;

        if cleanup {
            table.delete(&record.id)?;
            self.save(table)?;
            tracing::info!("removed mount record {}", record.short_id());
            Ok(UnmountOutcome::Removed(record))
        } else {
            Ok(UnmountOutcome::Unmounted(record))
        }
    }

    fn resolve(&self, table: &MountTable, selector: &str) -> Result<MountRecord, MountError> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(MountError::SelectorNotFound(selector.to_string()));
        }

        let by_path = || {
            let mut matches = table.find_by_mount_path(selector);
            if matches.is_empty() {
                let canonical = self
                    .backends
                    .get(BackendKind::Fuse)
                    .normalize_mount_path(selector)
                    .ok()?;
                matches = table.find_by_mount_path(&canonical);
            }
            Some(matches)
        };

        let candidates = [
            table.find_by_dataset(selector),
            table.find_by_id_prefix(selector),
            by_path().unwrap_or_default(),
        ];
        let matches = candidates
            .into_iter()
            .find(|matches| !matches.is_empty())
            .unwrap_or_default();

        match matches.as_slice() {
            [] => Err(MountError::SelectorNotFound(selector.to_string())),
            [record] => Ok((*record).clone()),
            many => Err(MountError::SelectorAmbiguous {
                selector: selector.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Ask each backend whether its records are live and correct any drift.
    ///
    /// Records whose backend cannot be reached keep their status.
    pub async fn sync_status(&self) -> Result<Vec<MountRecord>, MountError> {
        let _lock = self.lock().await?;
        let mut table = self.load()?;

        let mut drifted = false;
        for record in table.list_all().to_vec() {
            let backend = self.backends.get(record.backend);
            let live = match backend
                .check_mount(&record.id, &record.dataset, &record.mount_path)
                .await
            {
                Ok(live) => live,
                Err(e) => {
                    tracing::warn!("could not check {}: {}", record.short_id(), e);
                    continue;
                }
            };

            let actual = if live {
                MountStatus::Mounted
            } else {
                MountStatus::Unmounted
            };
            if actual != record.status {
                tracing::warn!(
                    "{} at {} is {} but recorded as {}",
                    record.dataset,
                    record.mount_path,
                    actual,
                    record.status
                );
                table.set_status(&record.id, actual)?;
                drifted = true;
            }
        }

        if drifted {
            self.save(&table)?;
        }
        Ok(table.list_all().to_vec())
    }

    /// Unmount with cleanup every `UNMOUNTED` record.
    ///
    /// Failures are collected and the pass continues.
    pub async fn clean(&self) -> Result<CleanReport, MountError> {
        let _lock = self.lock().await?;
        let mut table = self.load()?;

        let mut report = CleanReport::default();
        let targets: Vec<MountRecord> = table
            .find_by_status(MountStatus::Unmounted)
            .into_iter()
            .cloned()
            .collect();

        for record in targets {
            match self.unmount_record(&mut table, record.clone(), true).await {
                Ok(outcome) => report.removed.push(outcome.record().clone()),
                Err(e) => {
                    tracing::warn!("failed to clean {}: {}", record.short_id(), e);
                    report.failed.push((record, e));
                }
            }
        }
        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("no credentials for dataset {dataset} on {ms_host}")]
    NoCredentials { dataset: String, ms_host: String },

    #[error("no mount matches {0:?}")]
    SelectorNotFound(String),

    #[error("{count} mounts match {selector:?}")]
    SelectorAmbiguous { selector: String, count: usize },

    #[error("mount {0} is already unmounted")]
    AlreadyUnmounted(String),

    #[error("mount table error: {0}")]
    Table(#[from] MountTableError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("table lock task failed: {0}")]
    LockTask(#[from] tokio::task::JoinError),
}
