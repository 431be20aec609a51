//! Mount record table
//!
//! The table is the durable source of truth for which datasets have been
//! bound where, and through which backend:
//!
//! - **[`MountRecord`]**: one binding of a dataset to a mount path
//! - **[`MountStatus`]**: `UNMOUNTED` or `MOUNTED`
//! - **[`MountTable`]**: ordered collection with CRUD invariants
//! - **[`TableLock`]**: advisory lock serializing load-mutate-save cycles
//!
//! # On-disk format
//!
//! One record per line, five tab separated fields, no header:
//!
//! ```text
//! <id>\t<dataset>\t<mount_path>\t<BACKEND>\t<STATUS>
//! ```
//!
//! # Invariants
//!
//! - Record ids are unique
//! - No two records share a mount path
//! - Ids derive from the normalized dataset and backend name, so the same
//!   dataset mounted twice through the same backend collides

mod lock;
mod record;
mod table;

pub use lock::TableLock;
pub use record::{make_record_id, normalize_dataset, MountRecord, MountStatus, SHORT_ID_LEN};
pub use table::MountTable;

#[derive(Debug, thiserror::Error)]
pub enum MountTableError {
    #[error("record already exists: {0}")]
    DuplicateRecord(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("malformed record: {0:?}")]
    MalformedRecord(String),
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
