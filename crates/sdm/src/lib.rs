// Backends and the lookup table over them
pub mod backends;
// HTTP client shared by the catalogue and the REST backend
pub mod client;
pub mod logging;
pub mod mount_manager;

// App state (configuration, paths)
pub mod state;

pub use backends::{Backend, Backends};
pub use mount_manager::{MountError, MountManager, MountRequest, UnmountOutcome};
pub use state::{AppConfig, AppState, StateError};
