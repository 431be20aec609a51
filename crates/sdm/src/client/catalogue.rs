use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};

use common::prelude::{Catalogue, CatalogueEntry};

use super::{ApiClient, ApiError, ApiRequest};

const CATALOGUE_TIMEOUT: Duration = Duration::from_secs(30);

/// `GET <repo_url>`, answered with a JSON array of entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListDatasetsRequest;

impl ApiRequest for ListDatasetsRequest {
    type Response = Vec<CatalogueEntry>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        Ok(client.get(base_url.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to fetch dataset catalogue from {url}: {source}")]
pub struct CatalogueError {
    url: Url,
    #[source]
    source: ApiError,
}

/// Fetch the full catalogue from `repo_url`.
pub async fn fetch_catalogue(repo_url: &Url) -> Result<Catalogue, CatalogueError> {
    let wrap = |source| CatalogueError {
        url: repo_url.clone(),
        source,
    };

    let client = ApiClient::new(repo_url, CATALOGUE_TIMEOUT).map_err(wrap)?;
    let entries = client.call(ListDatasetsRequest).await.map_err(wrap)?;
    tracing::debug!("fetched {} catalogue entries from {}", entries.len(), repo_url);
    Ok(Catalogue::from_entries(entries))
}
