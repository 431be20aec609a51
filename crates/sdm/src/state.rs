use std::path::{Component, Path, PathBuf};
use std::{fs, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use common::prelude::{BackendKind, LocalUser};

pub const APP_NAME: &str = "sdm";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const TABLE_FILE_NAME: &str = "mounts.tab";
pub const MOUNTS_DIR_NAME: &str = "mounts";

const DEFAULT_REPO_URL: &str = "https://butler.opencloud.cs.arizona.edu/sdm/catalogue";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the dataset catalogue is fetched from
    #[serde(default = "default_repo_url")]
    pub repo_url: Url,
    /// Root under which FUSE mounts land when no path is given
    #[serde(default = "default_mount_path")]
    pub default_mount_path: String,
    #[serde(default = "default_backend")]
    pub default_backend: BackendKind,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Daily rolling log files go here when set
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Overrides `<state dir>/mounts.tab`
    #[serde(default)]
    pub table_path: Option<PathBuf>,
    #[serde(default)]
    pub fuse: FuseConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub users: Vec<LocalUser>,
}

fn default_repo_url() -> Url {
    Url::parse(DEFAULT_REPO_URL).expect("hardcoded URL must parse")
}

fn default_mount_path() -> String {
    "~/sdm_mounts".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Fuse
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            default_mount_path: default_mount_path(),
            default_backend: default_backend(),
            log_level: default_log_level(),
            log_dir: None,
            table_path: None,
            fuse: FuseConfig::default(),
            rest: RestConfig::default(),
            users: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(self.log_level.trim())
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }

    /// Root used for default mount paths of a backend.
    pub fn default_root(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::Fuse => &self.default_mount_path,
            BackendKind::Rest => &self.rest.default_mount_path,
        }
    }
}

/// Settings for the local FUSE client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseConfig {
    pub debug_mode: bool,
    pub debug_level: u8,
    /// Gateway cache size limit in bytes
    pub cache_max: u64,
    pub mount_timeout_secs: u64,
    /// Consecutive polls without a filesystem process before giving up
    pub mount_retry: u32,
    pub check_timeout_secs: u64,
    /// Re-register credentials even when a private config exists
    pub force_setup: bool,
    pub syndicate_bin: String,
    pub syndicatefs_bin: String,
    pub fusermount_bin: String,
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            debug_level: 1,
            cache_max: 2 * 1024 * 1024 * 1024,
            mount_timeout_secs: 30,
            mount_retry: 3,
            check_timeout_secs: 1,
            force_setup: false,
            syndicate_bin: "syndicate".to_string(),
            syndicatefs_bin: "syndicatefs".to_string(),
            fusermount_bin: "fusermount".to_string(),
        }
    }
}

/// Settings for the remote mount service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Base URL sessions are created under
    pub default_mount_path: String,
    pub endpoints: Vec<Url>,
    pub timeout_secs: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            default_mount_path: "http://localhost:8080/sessions/".to_string(),
            endpoints: Vec::new(),
            timeout_secs: 30,
        }
    }
}

/// Expand a leading `~`, make the path absolute and drop `.`/`..`
/// components lexically.
pub fn resolve_path(path: &str) -> Option<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let expanded = if path == "~" {
        dirs::home_dir()?
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()?.join(rest)
    } else {
        PathBuf::from(path)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().ok()?.join(expanded)
    };

    Some(clean_path(&absolute))
}

fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the sdm directory (~/.sdm)
    pub sdm_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the mount record table
    pub table_path: PathBuf,
    /// Per-record private state of the FUSE backend
    pub mounts_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the sdm directory path (custom or default ~/.sdm)
    pub fn sdm_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Load the state directory, writing a default config on first use.
    pub fn load_or_init(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let sdm_dir = Self::sdm_dir(custom_path)?;
        let config_path = sdm_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Self::init(sdm_dir, AppConfig::default());
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;
        Self::from_parts(sdm_dir, config)
    }

    /// Initialize a state directory with the given config.
    pub fn init(sdm_dir: PathBuf, config: AppConfig) -> Result<Self, StateError> {
        fs::create_dir_all(&sdm_dir)?;
        let config_path = sdm_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;
        tracing::debug!("wrote default config to {}", config_path.display());
        Self::from_parts(sdm_dir, config)
    }

    fn from_parts(sdm_dir: PathBuf, config: AppConfig) -> Result<Self, StateError> {
        config.log_level()?;

        let table_path = match &config.table_path {
            Some(path) => resolve_path(&path.to_string_lossy())
                .ok_or_else(|| StateError::InvalidPath(path.display().to_string()))?,
            None => sdm_dir.join(TABLE_FILE_NAME),
        };
        let mounts_path = sdm_dir.join(MOUNTS_DIR_NAME);
        fs::create_dir_all(&mounts_path)?;

        Ok(Self {
            config_path: sdm_dir.join(CONFIG_FILE_NAME),
            sdm_dir,
            table_path,
            mounts_path,
            config,
        })
    }

    /// Log directory with `~` expanded.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.config
            .log_dir
            .as_ref()
            .and_then(|dir| resolve_path(&dir.to_string_lossy()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_or_init_writes_default_config() {
        let dir = TempDir::new().unwrap();
        let sdm_dir = dir.path().join("state");

        let state = AppState::load_or_init(Some(sdm_dir.clone())).unwrap();
        assert!(state.config_path.exists());
        assert!(state.mounts_path.is_dir());
        assert_eq!(state.table_path, sdm_dir.join(TABLE_FILE_NAME));
        assert_eq!(state.config.default_backend, BackendKind::Fuse);
        assert_eq!(state.config.fuse.mount_timeout_secs, 30);
        assert_eq!(state.config.fuse.mount_retry, 3);

        // Second load reads what the first one wrote
        let again = AppState::load_or_init(Some(sdm_dir)).unwrap();
        assert_eq!(again.config.repo_url, state.config.repo_url);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
default_backend = "rest"
log_level = "debug"

[rest]
endpoints = ["http://127.0.0.1:9000/"]

[[users]]
username = "alice@example.org"
user_pkey = "KEY"
ms_host = "https://ms.example.org"
"#,
        )
        .unwrap();

        let state = AppState::load_or_init(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(state.config.default_backend, BackendKind::Rest);
        assert_eq!(state.config.log_level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(state.config.rest.endpoints.len(), 1);
        assert_eq!(state.config.rest.timeout_secs, 30);
        assert_eq!(state.config.users[0].username, "alice@example.org");
        assert_eq!(state.config.fuse, FuseConfig::default());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "default_backend = \"nfs\"").unwrap();
        assert!(matches!(
            AppState::load_or_init(Some(dir.path().to_path_buf())),
            Err(StateError::TomlDe(_))
        ));

        fs::write(dir.path().join(CONFIG_FILE_NAME), "log_level = \"loud\"").unwrap();
        assert!(matches!(
            AppState::load_or_init(Some(dir.path().to_path_buf())),
            Err(StateError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            resolve_path("/mnt/sdm/./geo/../geo-2020/").unwrap(),
            PathBuf::from("/mnt/sdm/geo-2020")
        );
        assert!(resolve_path("relative").unwrap().is_absolute());
        assert!(resolve_path("   ").is_none());
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_path("~/sdm_mounts").unwrap(), home.join("sdm_mounts"));
        }
    }
}
