use std::fmt;

use clap::Args;
use comfy_table::Table;

use common::prelude::CatalogueEntry;
use sdm::client::catalogue::CatalogueError;

#[derive(Args, Debug, Clone)]
pub struct List {
    /// Only show datasets whose name or description contains this
    pub query: Option<String>,
}

#[derive(Debug)]
pub struct ListOutput {
    pub datasets: Vec<CatalogueEntry>,
}

impl fmt::Display for ListOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.datasets.is_empty() {
            return write!(f, "No datasets found");
        }

        let mut table = Table::new();
        table.set_header(vec!["DATASET", "DESCRIPTION"]);
        for d in &self.datasets {
            table.add_row(vec![d.dataset.clone(), d.description.clone()]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for List {
    type Error = ListError;
    type Output = ListOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let catalogue = ctx.catalogue().await?;
        Ok(ListOutput {
            datasets: catalogue
                .list(self.query.as_deref())
                .into_iter()
                .cloned()
                .collect(),
        })
    }
}
