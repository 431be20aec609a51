use std::fmt;

use clap::Args;
use comfy_table::Table;

use common::prelude::MountRecord;
use sdm::MountError;

#[derive(Args, Debug, Clone)]
pub struct Status {
    /// Show the recorded state without checking the backends
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Debug)]
pub struct StatusOutput {
    pub records: Vec<MountRecord>,
}

impl fmt::Display for StatusOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return write!(f, "No mounts");
        }

        let mut table = Table::new();
        table.set_header(vec!["MOUNT_ID", "DATASET", "MOUNT_PATH", "BACKEND", "STATUS"]);
        for r in &self.records {
            table.add_row(vec![
                r.short_id().to_string(),
                r.dataset.clone(),
                r.mount_path.clone(),
                r.backend.to_string(),
                r.status.to_string(),
            ]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Mount(#[from] MountError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Status {
    type Error = StatusError;
    type Output = StatusOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let records = if self.no_sync {
            ctx.manager.list().await?
        } else {
            ctx.manager.sync_status().await?
        };
        Ok(StatusOutput { records })
    }
}
