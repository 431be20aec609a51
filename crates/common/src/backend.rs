use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of mount strategies.
///
/// The name returned by [`BackendKind::name`] is what lands in the
/// mount table, so it must never change for an existing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local FUSE client process
    Fuse,
    /// Remote mount service reached over HTTP
    Rest,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Fuse, BackendKind::Rest];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Fuse => "FUSE",
            BackendKind::Rest => "REST",
        }
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fuse" => Ok(BackendKind::Fuse),
            "rest" => Ok(BackendKind::Rest),
            _ => Err(UnknownBackend(s.trim().to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend: {0}")]
pub struct UnknownBackend(pub String);

/// Everything a backend needs to bind a dataset at a path.
#[derive(Debug, Clone, Copy)]
pub struct MountParams<'a> {
    pub record_id: &'a str,
    pub ms_host: &'a str,
    pub dataset: &'a str,
    pub username: &'a str,
    pub user_pkey: &'a str,
    pub gateway: &'a str,
    pub mount_path: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The binding never showed up within the poll budget
    MountTimeout,
    /// A default mount path could not be built
    PathConstruction,
    /// The requested mount path is not usable by the backend
    IllegalMountPath,
    /// An external command or remote call failed
    Execution,
}

/// The one error type backends report.
///
/// Callers branch on [`BackendError::kind`]; the message is for humans.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{backend} backend: {message}")]
pub struct BackendError {
    backend: BackendKind,
    kind: BackendErrorKind,
    message: String,
}

impl BackendError {
    pub fn new(backend: BackendKind, kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::MountTimeout, message)
    }

    pub fn path_construction(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::PathConstruction, message)
    }

    pub fn illegal_path(backend: BackendKind, path: &str) -> Self {
        Self::new(
            backend,
            BackendErrorKind::IllegalMountPath,
            format!("illegal mount path - {}", path),
        )
    }

    pub fn execution(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::Execution, message)
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Capabilities every mount strategy provides.
///
/// `mount` must tolerate partial state left behind by an earlier,
/// interrupted attempt. `unmount` must succeed when the binding is
/// already gone; with `cleanup` it also drops any state the backend
/// keeps for the record.
#[async_trait::async_trait]
pub trait MountBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Canonical form of a caller supplied mount path.
    fn normalize_mount_path(&self, mount_path: &str) -> Result<String, BackendError> {
        Ok(mount_path.trim().to_string())
    }

    fn is_legal_mount_path(&self, mount_path: &str) -> bool;

    fn make_default_mount_path(
        &self,
        dataset: &str,
        default_root: &str,
    ) -> Result<String, BackendError>;

    async fn mount(&self, params: &MountParams<'_>) -> Result<(), BackendError>;

    /// Whether the binding is live right now, regardless of what the
    /// mount table says.
    async fn check_mount(
        &self,
        record_id: &str,
        dataset: &str,
        mount_path: &str,
    ) -> Result<bool, BackendError>;

    async fn unmount(
        &self,
        record_id: &str,
        dataset: &str,
        mount_path: &str,
        cleanup: bool,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse_is_case_insensitive() {
        assert_eq!(" fuse ".parse::<BackendKind>().unwrap(), BackendKind::Fuse);
        assert_eq!("FUSE".parse::<BackendKind>().unwrap(), BackendKind::Fuse);
        assert_eq!("Rest".parse::<BackendKind>().unwrap(), BackendKind::Rest);
        assert_eq!(
            "nfs".parse::<BackendKind>().unwrap_err(),
            UnknownBackend("nfs".to_string())
        );
    }

    #[test]
    fn test_backend_kind_name_round_trips() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_backend_error_carries_kind() {
        let err = BackendError::illegal_path(BackendKind::Fuse, "/tmp/x");
        assert_eq!(err.kind(), BackendErrorKind::IllegalMountPath);
        assert_eq!(err.backend(), BackendKind::Fuse);
        assert_eq!(err.to_string(), "FUSE backend: illegal mount path - /tmp/x");
    }
}
