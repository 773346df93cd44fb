pub mod config;
pub mod error;
pub mod random;
pub mod runtime;

pub use config::ExperimentConfig;
pub use error::{ExperimentError, Result};
pub use random::Randomizer;
pub use runtime::ExperimentRuntime;
