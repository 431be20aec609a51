//! Remote mount service backend
//!
//! Mount paths are URLs whose last path segment names the session. Every
//! call fans out to all configured endpoints at once and only succeeds when
//! each of them does.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::mount_table::normalize_dataset;
use common::prelude::*;

use crate::client::{ApiClient, ApiError, ApiRequest};
use crate::state::RestConfig;

const KIND: BackendKind = BackendKind::Rest;

/// A 2xx reply without a `mounted` field counts as mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountState {
    #[serde(default = "mounted_by_default")]
    pub mounted: bool,
}

fn mounted_by_default() -> bool {
    true
}

impl MountState {
    /// An empty 2xx reply is an acknowledgement.
    fn from_reply(reply: Option<&MountState>) -> bool {
        reply.map_or(true, |state| state.mounted)
    }
}

fn mount_url(base_url: &Url, record_id: &str) -> Result<Url, ApiError> {
    Ok(base_url.join(&format!("mounts/{}", record_id))?)
}

/// `GET {endpoint}/mounts/{id}`
#[derive(Debug, Clone)]
pub struct CheckMountRequest {
    pub record_id: String,
}

impl ApiRequest for CheckMountRequest {
    type Response = MountState;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.get(mount_url(base_url, &self.record_id)?))
    }
}

/// `POST {endpoint}/mounts/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct SetupMountRequest {
    #[serde(skip)]
    pub record_id: String,
    pub dataset: String,
    pub ms_host: String,
    pub username: String,
    pub user_pkey: String,
    pub gateway: String,
    pub session: String,
}

impl ApiRequest for SetupMountRequest {
    type Response = MountState;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = mount_url(base_url, &self.record_id)?;
        Ok(client.post(url).json(&self))
    }
}

/// `DELETE {endpoint}/mounts/{id}?cleanup=<bool>`, judged on status alone
#[derive(Debug, Clone)]
pub struct DeleteMountRequest {
    pub record_id: String,
    pub cleanup: bool,
}

impl ApiRequest for DeleteMountRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let url = mount_url(base_url, &self.record_id)?;
        Ok(client
            .delete(url)
            .query(&[("cleanup", if self.cleanup { "true" } else { "false" })]))
    }
}

#[derive(Debug, Clone)]
pub struct RestBackend {
    endpoints: Vec<ApiClient>,
}

impl RestBackend {
    pub fn new(config: &RestConfig) -> Result<Self, ApiError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let endpoints = config
            .endpoints
            .iter()
            .map(|endpoint| ApiClient::new(&as_base(endpoint), timeout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { endpoints })
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Url> {
        self.endpoints.iter().map(ApiClient::base_url)
    }

    /// Run `call` against every endpoint concurrently and pair each answer
    /// with the endpoint it came from.
    async fn fan_out<'a, R, F, Fut>(
        &'a self,
        call: F,
    ) -> Result<Vec<(&'a Url, Result<R, ApiError>)>, BackendError>
    where
        F: Fn(&'a ApiClient) -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        if self.endpoints.is_empty() {
            return Err(BackendError::execution(KIND, "no endpoints configured"));
        }

        Ok(join_all(self.endpoints.iter().map(|client| {
            let response = call(client);
            async move { (client.base_url(), response.await) }
        }))
        .await)
    }

    fn session(mount_path: &str) -> Option<String> {
        let url = Url::parse(mount_path.trim()).ok()?;
        let session = url.path_segments()?.last()?.trim();
        if session.is_empty() {
            None
        } else {
            Some(session.to_string())
        }
    }
}

/// Relative joins resolve against the last segment unless the base ends in '/'.
fn as_base(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait::async_trait]
impl MountBackend for RestBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn normalize_mount_path(&self, mount_path: &str) -> Result<String, BackendError> {
        Url::parse(mount_path.trim())
            .map(String::from)
            .map_err(|e| BackendError::path_construction(KIND, format!("{mount_path:?}: {e}")))
    }

    fn is_legal_mount_path(&self, mount_path: &str) -> bool {
        Self::session(mount_path).is_some()
    }

    fn make_default_mount_path(
        &self,
        dataset: &str,
        default_root: &str,
    ) -> Result<String, BackendError> {
        let dataset = normalize_dataset(dataset);
        if dataset.is_empty() {
            return Err(BackendError::path_construction(KIND, "empty dataset name"));
        }
        let root = Url::parse(default_root.trim()).map_err(|e| {
            BackendError::path_construction(KIND, format!("invalid root {default_root:?}: {e}"))
        })?;
        let url = as_base(&root)
            .join(&dataset)
            .map_err(|e| BackendError::path_construction(KIND, e.to_string()))?;
        Ok(url.into())
    }

    async fn mount(&self, params: &MountParams<'_>) -> Result<(), BackendError> {
        let session = Self::session(params.mount_path)
            .ok_or_else(|| BackendError::illegal_path(KIND, params.mount_path))?;

        let results = self
            .fan_out(|client| {
                client.call_optional(SetupMountRequest {
                    record_id: params.record_id.to_string(),
                    dataset: params.dataset.to_string(),
                    ms_host: params.ms_host.to_string(),
                    username: params.username.to_string(),
                    user_pkey: params.user_pkey.to_string(),
                    gateway: params.gateway.to_string(),
                    session: session.clone(),
                })
            })
            .await?;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(endpoint, result)| match result {
                Ok(reply) if MountState::from_reply(reply.as_ref()) => None,
                Ok(_) => Some(format!("{endpoint}: session {session} not mounted")),
                Err(e) => Some(format!("{endpoint}: {e}")),
            })
            .collect();

        if failures.is_empty() {
            tracing::info!("mounted {} as session {}", params.dataset, session);
            Ok(())
        } else {
            Err(BackendError::execution(KIND, failures.join("; ")))
        }
    }

    async fn check_mount(
        &self,
        record_id: &str,
        _dataset: &str,
        _mount_path: &str,
    ) -> Result<bool, BackendError> {
        let results = self
            .fan_out(|client| {
                client.call_optional(CheckMountRequest {
                    record_id: record_id.to_string(),
                })
            })
            .await?;

        let mut mounted = true;
        for (endpoint, result) in results {
            match result {
                Ok(reply) => mounted &= MountState::from_reply(reply.as_ref()),
                Err(e) if e.is_not_found() => mounted = false,
                Err(e) => return Err(BackendError::execution(KIND, format!("{endpoint}: {e}"))),
            }
        }
        Ok(mounted)
    }

    async fn unmount(
        &self,
        record_id: &str,
        dataset: &str,
        mount_path: &str,
        cleanup: bool,
    ) -> Result<(), BackendError> {
        let results = self
            .fan_out(|client| {
                client.send(DeleteMountRequest {
                    record_id: record_id.to_string(),
                    cleanup,
                })
            })
            .await?;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(endpoint, result)| match result {
                Ok(_) => None,
                Err(e) if e.is_not_found() => None,
                Err(e) => Some(format!("{endpoint}: {e}")),
            })
            .collect();

        if failures.is_empty() {
            tracing::info!("unmounted {} from {}", dataset, mount_path);
            Ok(())
        } else {
            Err(BackendError::execution(KIND, failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new(&RestConfig::default()).unwrap()
    }

    #[test]
    fn test_default_mount_path_joins_dataset() {
        let rest = backend();
        assert_eq!(
            rest.make_default_mount_path("Geo-2020", "https://svc.example.org/sessions")
                .unwrap(),
            "https://svc.example.org/sessions/geo-2020"
        );
        assert_eq!(
            rest.make_default_mount_path("geo-2020", "https://svc.example.org/sessions/")
                .unwrap(),
            "https://svc.example.org/sessions/geo-2020"
        );
        let err = rest.make_default_mount_path("geo", "not a url").unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::PathConstruction);
    }

    #[test]
    fn test_legal_mount_path_needs_session() {
        let rest = backend();
        assert!(rest.is_legal_mount_path("https://svc.example.org/sessions/geo"));
        assert!(!rest.is_legal_mount_path("https://svc.example.org/sessions/"));
        assert!(!rest.is_legal_mount_path("/mnt/sdm/geo"));
    }

    #[test]
    fn test_endpoints_become_directories() {
        let config = RestConfig {
            endpoints: vec![Url::parse("http://127.0.0.1:9000/api").unwrap()],
            ..RestConfig::default()
        };
        let rest = RestBackend::new(&config).unwrap();
        let base = rest.endpoints().next().unwrap().clone();
        assert_eq!(base.as_str(), "http://127.0.0.1:9000/api/");
        assert_eq!(
            mount_url(&base, "abc").unwrap().as_str(),
            "http://127.0.0.1:9000/api/mounts/abc"
        );
    }

    #[tokio::test]
    async fn test_no_endpoints_is_an_error() {
        let rest = backend();
        let err = rest.unmount("abc", "geo", "https://svc/s/geo", true).await.unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::Execution);
        assert!(rest.check_mount("abc", "geo", "https://svc/s/geo").await.is_err());
    }

    #[test]
    fn test_replies_without_state_count_as_mounted() {
        let bare: MountState = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(bare.mounted);
        let down: MountState = serde_json::from_str(r#"{"mounted":false}"#).unwrap();
        assert!(!MountState::from_reply(Some(&down)));
        assert!(MountState::from_reply(None));
    }
}
