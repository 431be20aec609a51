use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::MountTableError;
use crate::backend::BackendKind;

/// Number of id characters shown to users.
pub const SHORT_ID_LEN: usize = 12;

const FIELD_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MountStatus {
    Unmounted,
    Mounted,
}

impl MountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountStatus::Unmounted => "UNMOUNTED",
            MountStatus::Mounted => "MOUNTED",
        }
    }
}

impl FromStr for MountStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("mounted") {
            Ok(MountStatus::Mounted)
        } else {
            Ok(MountStatus::Unmounted)
        }
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn normalize_dataset(dataset: &str) -> String {
    dataset.trim().to_lowercase()
}

/// Deterministic record id for a dataset bound through a backend.
pub fn make_record_id(dataset: &str, backend: BackendKind) -> String {
    let seed = format!(
        "seed123{}MountRecord{}",
        normalize_dataset(dataset),
        backend.name()
    );
    hex::encode(Sha256::digest(seed.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountRecord {
    pub id: String,
    pub dataset: String,
    pub mount_path: String,
    pub backend: BackendKind,
    pub status: MountStatus,
}

impl MountRecord {
    pub fn new(dataset: &str, mount_path: &str, backend: BackendKind, status: MountStatus) -> Self {
        Self::with_id(
            &make_record_id(dataset, backend),
            dataset,
            mount_path,
            backend,
            status,
        )
    }

    pub fn with_id(
        id: &str,
        dataset: &str,
        mount_path: &str,
        backend: BackendKind,
        status: MountStatus,
    ) -> Self {
        Self {
            id: id.trim().to_lowercase(),
            dataset: normalize_dataset(dataset),
            mount_path: mount_path.trim().to_string(),
            backend,
            status,
        }
    }

    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(SHORT_ID_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    pub fn is_mounted(&self) -> bool {
        self.status == MountStatus::Mounted
    }

    /// Fields written to disk may not carry the separators of the format.
    pub(crate) fn validate(&self) -> Result<(), MountTableError> {
        let fields = [
            ("id", &self.id),
            ("dataset", &self.dataset),
            ("mount path", &self.mount_path),
        ];
        for (field, value) in fields {
            if value.is_empty() || value.contains(&['\t', '\n', '\r'][..]) {
                return Err(MountTableError::InvalidField {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn from_line(line: &str) -> Result<Self, MountTableError> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return Err(MountTableError::MalformedRecord(line.to_string()));
        }
        let backend = fields[3]
            .parse::<BackendKind>()
            .map_err(|_| MountTableError::MalformedRecord(line.to_string()))?;
        let status = fields[4]
            .parse::<MountStatus>()
            .unwrap_or(MountStatus::Unmounted);
        Ok(Self::with_id(fields[0], fields[1], fields[2], backend, status))
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            self.dataset,
            self.mount_path,
            self.backend.name(),
            self.status
        )
    }
}
