//! Microphone access for cogex trials.

pub mod backend;
#[cfg(feature = "cpal")]
pub mod cpal_backend;
pub mod device;
pub mod error;
pub mod mock;
pub mod watch;

pub use backend::AudioBackend;
#[cfg(feature = "cpal")]
pub use cpal_backend::CpalAudioBackend;
pub use device::{CaptureState, DeviceKind, MediaDeviceInfo, MediaStream};
pub use error::{AudioError, Result};
pub use mock::MockAudioBackend;
pub use watch::{DeviceNotifier, DeviceWatch};
