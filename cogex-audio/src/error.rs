use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed to enumerate devices: {0}")]
    Enumeration(String),

    #[error("input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to open stream on '{device_id}': {message}")]
    Stream { device_id: String, message: String },
}
