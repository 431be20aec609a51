use std::error::Error;

use tokio::sync::OnceCell;

use common::prelude::Catalogue;
use sdm::client::catalogue::{fetch_catalogue, CatalogueError};
use sdm::client::ApiError;
use sdm::{AppState, Backends, MountManager};

/// Everything an op may need, built once at startup.
pub struct OpContext {
    pub state: AppState,
    pub manager: MountManager,
    /// Fetched on first use; most ops never need it
    catalogue: OnceCell<Catalogue>,
}

impl OpContext {
    pub fn new(state: AppState) -> Result<Self, ApiError> {
        let backends = Backends::from_state(&state)?;
        let manager = MountManager::from_state(&state, backends);
        Ok(Self {
            state,
            manager,
            catalogue: OnceCell::new(),
        })
    }

    pub async fn catalogue(&self) -> Result<&Catalogue, CatalogueError> {
        self.catalogue
            .get_or_try_init(|| fetch_catalogue(&self.state.config.repo_url))
            .await
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
