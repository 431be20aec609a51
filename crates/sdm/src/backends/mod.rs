pub mod fuse;
pub mod rest;

pub use fuse::FuseBackend;
pub use rest::RestBackend;

use common::prelude::*;

use crate::client::ApiError;
use crate::state::AppState;

/// The closed set of backend implementations.
#[derive(Debug, Clone)]
pub enum Backend {
    Fuse(FuseBackend),
    Rest(RestBackend),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $body:expr) => {
        match $self {
            Backend::Fuse($backend) => $body,
            Backend::Rest($backend) => $body,
        }
    };
}

#[async_trait::async_trait]
impl MountBackend for Backend {
    fn kind(&self) -> BackendKind {
        dispatch!(self, b => b.kind())
    }

    fn normalize_mount_path(&self, mount_path: &str) -> Result<String, BackendError> {
        dispatch!(self, b => b.normalize_mount_path(mount_path))
    }

    fn is_legal_mount_path(&self, mount_path: &str) -> bool {
        dispatch!(self, b => b.is_legal_mount_path(mount_path))
    }

    fn make_default_mount_path(
        &self,
        dataset: &str,
        default_root: &str,
    ) -> Result<String, BackendError> {
        dispatch!(self, b => b.make_default_mount_path(dataset, default_root))
    }

    async fn mount(&self, params: &MountParams<'_>) -> Result<(), BackendError> {
        dispatch!(self, b => b.mount(params).await)
    }

    async fn check_mount(
        &self,
        record_id: &str,
        dataset: &str,
        mount_path: &str,
    ) -> Result<bool, BackendError> {
        dispatch!(self, b => b.check_mount(record_id, dataset, mount_path).await)
    }

    async fn unmount(
        &self,
        record_id: &str,
        dataset: &str,
        mount_path: &str,
        cleanup: bool,
    ) -> Result<(), BackendError> {
        dispatch!(self, b => b.unmount(record_id, dataset, mount_path, cleanup).await)
    }
}

/// Lookup table from [`BackendKind`] to the configured backend.
#[derive(Debug, Clone)]
pub struct Backends {
    fuse: Backend,
    rest: Backend,
}

impl Backends {
    pub fn new(fuse: FuseBackend, rest: RestBackend) -> Self {
        Self {
            fuse: Backend::Fuse(fuse),
            rest: Backend::Rest(rest),
        }
    }

    /// Backends wired to the real system, configured from app state.
    pub fn from_state(state: &AppState) -> Result<Self, ApiError> {
        let fuse = FuseBackend::system(state.config.fuse.clone(), &state.mounts_path);
        let rest = RestBackend::new(&state.config.rest)?;
        Ok(Self::new(fuse, rest))
    }

    pub fn get(&self, kind: BackendKind) -> &Backend {
        match kind {
            BackendKind::Fuse => &self.fuse,
            BackendKind::Rest => &self.rest,
        }
    }
}
