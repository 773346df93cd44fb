//! In-memory backend for tests and headless runs.

use parking_lot::Mutex;

use crate::backend::AudioBackend;
use crate::device::{DeviceKind, MediaDeviceInfo, MediaStream};
use crate::error::{AudioError, Result};
use crate::watch::{DeviceNotifier, DeviceWatch};

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MediaDeviceInfo>,
    deny_permission: bool,
    stream_failure: Option<String>,
    watchers: Vec<DeviceNotifier>,
    permission_requests: usize,
    opened: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockAudioBackend {
    state: Mutex<MockState>,
}

impl MockAudioBackend {
    pub fn new(devices: Vec<MediaDeviceInfo>) -> Self {
        Self {
            state: Mutex::new(MockState {
                devices,
                ..MockState::default()
            }),
        }
    }

    pub fn deny_permission(self) -> Self {
        self.state.lock().deny_permission = true;
        self
    }

    pub fn fail_streams(self, message: impl Into<String>) -> Self {
        self.state.lock().stream_failure = Some(message.into());
        self
    }

    /// Replaces the device set and notifies every attached watch.
    pub fn set_devices(&self, devices: Vec<MediaDeviceInfo>) {
        let mut state = self.state.lock();
        state.devices = devices;
        state.watchers.retain(|w| w.notify());
    }

    pub fn active_watches(&self) -> usize {
        let mut state = self.state.lock();
        state.watchers.retain(DeviceNotifier::is_attached);
        state.watchers.len()
    }

    pub fn permission_requests(&self) -> usize {
        self.state.lock().permission_requests
    }

    pub fn opened_streams(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }
}

impl AudioBackend for MockAudioBackend {
    fn request_permission(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.permission_requests += 1;
        if state.deny_permission {
            return Err(AudioError::PermissionDenied("denied by participant".into()));
        }
        Ok(())
    }

    fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        Ok(self.state.lock().devices.clone())
    }

    fn watch_devices(&self) -> DeviceWatch {
        let (watch, notifier) = DeviceWatch::new();
        self.state.lock().watchers.push(notifier);
        watch
    }

    fn open_stream(&self, device_id: &str) -> Result<MediaStream> {
        let mut state = self.state.lock();
        if let Some(message) = &state.stream_failure {
            return Err(AudioError::Stream {
                device_id: device_id.to_string(),
                message: message.clone(),
            });
        }
        let device = state
            .devices
            .iter()
            .find(|d| d.kind == DeviceKind::AudioInput && d.device_id == device_id)
            .cloned()
            .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))?;
        state.opened.push(device.device_id.clone());
        Ok(MediaStream::new(device.device_id, device.label, 48_000, 1))
    }
}
