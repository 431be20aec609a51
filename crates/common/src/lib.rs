/**
 * The contract every mount backend fulfils.
 *  - Stable backend names used in the mount table
 *  - A single error type with a kind for callers
 *    that need to branch on the failure
 */
pub mod backend;
/**
 * Read-only view of the dataset catalogue,
 *  keyed by normalized dataset name.
 */
pub mod catalogue;
/**
 * Local identities used when the catalogue does
 *  not ship credentials for a dataset.
 */
pub mod identity;
/**
 * The persisted table of mount records.
 * Line-oriented, tab separated, guarded by an
 *  advisory lock for load-mutate-save cycles.
 */
pub mod mount_table;
/**
 * Bounded polling used while waiting on external
 *  processes to bring a mount up.
 */
pub mod poll;

pub mod prelude {
    pub use crate::backend::{
        BackendError, BackendErrorKind, BackendKind, MountBackend, MountParams,
    };
    pub use crate::catalogue::{Catalogue, CatalogueEntry};
    pub use crate::identity::{resolve_identity, Identity, LocalUser};
    pub use crate::mount_table::{MountRecord, MountStatus, MountTable, MountTableError, TableLock};
    pub use crate::poll::{wait_until, PollConfig, PollError, Probe};
}
