use std::path::PathBuf;

use racing_mpc::MpcError;
use thiserror::Error;
use vehicle::{ConfigError, ModelError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mpc(#[from] MpcError),

    #[error("plant simulation: {0}")]
    Plant(#[from] ModelError),
}
