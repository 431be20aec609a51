use clap::Args;

use sdm::{MountError, UnmountOutcome};

/// Accepts the usual spellings of yes and no.
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" | "t" | "1" => Ok(true),
        "no" | "n" | "false" | "f" | "0" => Ok(false),
        other => Err(format!("expected yes or no, got {other:?}")),
    }
}

#[derive(Args, Debug, Clone)]
pub struct Unmount {
    /// Dataset name, mount id (or a prefix of it), or mount path
    pub selector: String,

    /// Also remove the mount record and backend state (yes/no)
    #[arg(value_parser = parse_flag)]
    pub cleanup: Option<bool>,

    /// Same as passing `yes` as the cleanup argument
    #[arg(long = "cleanup", id = "cleanup_flag")]
    pub cleanup_flag: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UnmountError {
    #[error(transparent)]
    Mount(#[from] MountError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Unmount {
    type Error = UnmountError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let cleanup = self.cleanup_flag || self.cleanup.unwrap_or(false);
        let outcome = ctx.manager.unmount(&self.selector, cleanup).await?;
        let record = outcome.record();
        Ok(match &outcome {
            UnmountOutcome::Removed(_) => format!(
                "Unmounted {} from {} and removed mount {}",
                record.dataset,
                record.mount_path,
                record.short_id()
            ),
            UnmountOutcome::Unmounted(_) => format!(
                "Unmounted {} from {}",
                record.dataset, record.mount_path
            ),
        })
    }
}
