use crate::device::{MediaDeviceInfo, MediaStream};
use crate::error::Result;
use crate::watch::DeviceWatch;

/// Platform capture API as seen by a trial.
pub trait AudioBackend: Send + Sync {
    /// Asks the platform for permission to capture audio.
    fn request_permission(&self) -> Result<()>;

    /// Lists every media device currently known to the platform, aliases included.
    fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>>;

    /// Subscribes to device-set changes for as long as the returned watch lives.
    fn watch_devices(&self) -> DeviceWatch;

    /// Opens a capture stream constrained to `device_id`.
    fn open_stream(&self, device_id: &str) -> Result<MediaStream>;
}
