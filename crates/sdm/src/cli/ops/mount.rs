use clap::Args;

use common::prelude::BackendKind;
use sdm::client::catalogue::CatalogueError;
use sdm::{MountError, MountRequest};

#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Dataset name as listed in the catalogue
    pub dataset: String,

    /// Where to mount (defaults to a directory named after the dataset)
    pub path: Option<String>,

    /// Backend to mount through (fuse or rest)
    #[arg(long)]
    pub backend: Option<BackendKind>,
}

#[derive(Debug, thiserror::Error)]
pub enum MountOpError {
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
    #[error(transparent)]
    Mount(#[from] MountError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = MountOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let catalogue = ctx.catalogue().await?;

        let mut request = MountRequest::new(&self.dataset);
        if let Some(path) = &self.path {
            request = request.at(path);
        }
        if let Some(backend) = self.backend {
            request = request.via(backend);
        }

        let record = ctx.manager.mount(catalogue, &request).await?;
        Ok(format!(
            "Mounted {} at {} ({}, id {})",
            record.dataset,
            record.mount_path,
            record.backend,
            record.short_id()
        ))
    }
}
