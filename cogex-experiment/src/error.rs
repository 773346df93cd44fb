use std::path::PathBuf;

use cogex_core::TrialError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExperimentError>;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("trial {index} ({plugin}) failed: {source}")]
    Trial {
        index: usize,
        plugin: &'static str,
        #[source]
        source: TrialError,
    },

    #[error("trial {0} is waiting for input and nothing is scheduled")]
    Stalled(usize),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
