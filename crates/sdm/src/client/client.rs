use std::time::Duration;

use reqwest::{header::HeaderMap, header::HeaderValue, Client, Response};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url, timeout: Duration) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    async fn dispatch<T: ApiRequest>(&self, request: T) -> Result<Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        Ok(self.dispatch(request).await?.json::<T::Response>().await?)
    }

    /// Like [`ApiClient::call`], but a success with an empty body yields `None`.
    pub async fn call_optional<T: ApiRequest>(
        &self,
        request: T,
    ) -> Result<Option<T::Response>, ApiError> {
        let body = self.dispatch(request).await?.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Send the request and judge it by status alone; the body is discarded.
    pub async fn send<T: ApiRequest>(&self, request: T) -> Result<(), ApiError> {
        self.dispatch(request).await?;
        Ok(())
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }
}
