use std::io::Write;
use std::path::Path;

use super::record::{normalize_dataset, MountRecord, MountStatus};
use super::MountTableError;
use crate::backend::BackendKind;

/// Ordered set of mount records.
///
/// Mutations only touch memory; callers persist with [`MountTable::save`]
/// after every change they want to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    records: Vec<MountRecord>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from disk, creating an empty one if the file is missing.
    ///
    /// A single malformed line fails the whole load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MountTableError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("mount table {} missing, creating", path.display());
                let table = Self::new();
                table.save(path)?;
                return Ok(table);
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(MountRecord::from_line(line)?);
        }
        Ok(Self { records })
    }

    /// Write the table atomically, replacing whatever was at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MountTableError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        for record in &self.records {
            writeln!(file, "{}", record.to_line())?;
        }
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn list_all(&self) -> &[MountRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MountRecord> {
        let id = id.trim().to_lowercase();
        self.records.iter().find(|r| r.id == id)
    }

    pub fn find_by_id_prefix(&self, prefix: &str) -> Vec<&MountRecord> {
        let prefix = prefix.trim().to_lowercase();
        self.records
            .iter()
            .filter(|r| r.id.starts_with(&prefix))
            .collect()
    }

    pub fn find_by_dataset(&self, dataset: &str) -> Vec<&MountRecord> {
        let dataset = normalize_dataset(dataset);
        self.records
            .iter()
            .filter(|r| r.dataset == dataset)
            .collect()
    }

    pub fn find_by_mount_path(&self, mount_path: &str) -> Vec<&MountRecord> {
        let mount_path = mount_path.trim();
        self.records
            .iter()
            .filter(|r| r.mount_path == mount_path)
            .collect()
    }

    pub fn find_by_backend(&self, backend: BackendKind) -> Vec<&MountRecord> {
        self.records
            .iter()
            .filter(|r| r.backend == backend)
            .collect()
    }

    pub fn find_by_status(&self, status: MountStatus) -> Vec<&MountRecord> {
        self.records.iter().filter(|r| r.status == status).collect()
    }

    /// Add a record whose id derives from the dataset and backend.
    pub fn add(
        &mut self,
        dataset: &str,
        mount_path: &str,
        backend: BackendKind,
        status: MountStatus,
    ) -> Result<MountRecord, MountTableError> {
        self.insert(MountRecord::new(dataset, mount_path, backend, status))
    }

    pub fn add_with_id(
        &mut self,
        id: &str,
        dataset: &str,
        mount_path: &str,
        backend: BackendKind,
        status: MountStatus,
    ) -> Result<MountRecord, MountTableError> {
        self.insert(MountRecord::with_id(id, dataset, mount_path, backend, status))
    }

    fn insert(&mut self, record: MountRecord) -> Result<MountRecord, MountTableError> {
        record.validate()?;
        if self.get(&record.id).is_some() {
            return Err(MountTableError::DuplicateRecord(record.id));
        }
        if !self.find_by_mount_path(&record.mount_path).is_empty() {
            return Err(MountTableError::DuplicateRecord(record.mount_path));
        }
        self.records.push(record.clone());
        Ok(record)
    }

    pub fn set_status(
        &mut self,
        id: &str,
        status: MountStatus,
    ) -> Result<MountRecord, MountTableError> {
        let wanted = id.trim().to_lowercase();
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == wanted)
            .ok_or_else(|| MountTableError::RecordNotFound(id.to_string()))?;
        record.status = status;
        Ok(record.clone())
    }

    pub fn delete(&mut self, id: &str) -> Result<MountRecord, MountTableError> {
        let wanted = id.trim().to_lowercase();
        let index = self
            .records
            .iter()
            .position(|r| r.id == wanted)
            .ok_or_else(|| MountTableError::RecordNotFound(id.to_string()))?;
        Ok(self.records.remove(index))
    }
}
