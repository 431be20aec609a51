use clap::Args;

use sdm::MountError;

#[derive(Args, Debug, Clone)]
pub struct Clean;

#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error("removed {removed} mount(s), {} failed: {}", .failures.len(), .failures.join("; "))]
    Partial {
        removed: usize,
        failures: Vec<String>,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Clean {
    type Error = CleanError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let report = ctx.manager.clean().await?;

        if !report.failed.is_empty() {
            return Err(CleanError::Partial {
                removed: report.removed.len(),
                failures: report
                    .failed
                    .iter()
                    .map(|(record, e)| format!("{}: {}", record.short_id(), e))
                    .collect(),
            });
        }

        Ok(match report.removed.len() {
            0 => "Nothing to clean".to_string(),
            n => format!("Removed {} unmounted mount(s)", n),
        })
    }
}
