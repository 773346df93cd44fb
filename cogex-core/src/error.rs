use cogex_audio::AudioError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrialError>;

/// Errors raised by trial controllers and surfaced to the host.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown plugin type `{0}`")]
    UnknownPlugin(String),

    #[error("{plugin}: unknown parameter `{name}`")]
    UnknownParameter { plugin: &'static str, name: String },

    #[error("{plugin}: missing required parameter `{name}`")]
    MissingParameter { plugin: &'static str, name: &'static str },

    #[error("{plugin}: parameter `{name}` expects {expected}")]
    InvalidParameter {
        plugin: &'static str,
        name: String,
        expected: String,
    },

    #[error("display element not found: {0}")]
    MissingElement(String),

    #[error("no microphone selected")]
    NoDeviceSelected,

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("invalid trial data: {0}")]
    Data(#[from] serde_json::Error),
}
