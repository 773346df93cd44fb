//! Media device descriptors shared by every audio backend.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

/// One entry of a device enumeration.
///
/// `group_id` identifies the physical device: several entries (for example
/// a platform "default" alias and the real endpoint) may share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub group_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

impl MediaDeviceInfo {
    pub fn audio_input(
        device_id: impl Into<String>,
        group_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            group_id: group_id.into(),
            kind: DeviceKind::AudioInput,
            label: label.into(),
        }
    }
}

/// Running totals of a live capture, written by the audio callback.
#[derive(Debug, Default)]
pub struct CaptureState {
    frames: AtomicU64,
    peak: AtomicU32,
    error: Mutex<Option<String>>,
}

impl CaptureState {
    /// Accounts one callback buffer of interleaved samples.
    pub fn record(&self, samples: impl IntoIterator<Item = f32>, channels: u16) {
        let mut count = 0u64;
        let mut peak = 0.0f32;
        for sample in samples {
            count += 1;
            peak = peak.max(sample.abs());
        }
        self.frames
            .fetch_add(count / u64::from(channels.max(1)), Ordering::Relaxed);
        let current = f32::from_bits(self.peak.load(Ordering::Relaxed));
        if peak > current {
            self.peak.store(peak.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn fail(&self, message: impl Into<String>) {
        *self.error.lock() = Some(message.into());
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Largest absolute sample seen so far.
    pub fn peak_level(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }
}

/// A capture stream acquired for a single input device.
///
/// Owns the backend's live stream, so capture stops when this is dropped.
pub struct MediaStream {
    pub device_id: String,
    pub label: String,
    pub sample_rate: u32,
    pub channels: u16,
    capture: Arc<CaptureState>,
    source: Option<Box<dyn Any>>,
}

impl MediaStream {
    pub fn new(
        device_id: impl Into<String>,
        label: impl Into<String>,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            sample_rate,
            channels,
            capture: Arc::new(CaptureState::default()),
            source: None,
        }
    }

    /// Attaches the backend stream feeding `capture`.
    pub fn with_source(mut self, capture: Arc<CaptureState>, source: Box<dyn Any>) -> Self {
        self.capture = capture;
        self.source = Some(source);
        self
    }

    pub fn capture(&self) -> &Arc<CaptureState> {
        &self.capture
    }

    pub fn is_live(&self) -> bool {
        self.source.is_some() && self.capture.error().is_none()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("device_id", &self.device_id)
            .field("label", &self.label)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("frames", &self.capture.frames())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_uses_browser_spelling() {
        let json = serde_json::to_string(&DeviceKind::AudioInput).unwrap();
        assert_eq!(json, "\"audioinput\"");
    }

    #[test]
    fn capture_counts_frames_and_peak() {
        let state = CaptureState::default();
        state.record([0.1, -0.2, 0.5, 0.0], 2);
        state.record([-0.7, 0.3], 2);
        assert_eq!(state.frames(), 3);
        assert!((state.peak_level() - 0.7).abs() < f32::EPSILON);
        assert!(state.error().is_none());
    }

    #[test]
    fn dropping_the_stream_releases_its_source() {
        let source = Arc::new(());
        let capture = Arc::new(CaptureState::default());
        let stream = MediaStream::new("usb", "USB Mic", 48_000, 1)
            .with_source(Arc::clone(&capture), Box::new(Arc::clone(&source)));
        assert!(stream.is_live());
        assert_eq!(Arc::strong_count(&source), 2);

        capture.fail("device unplugged");
        assert!(!stream.is_live());
        drop(stream);
        assert_eq!(Arc::strong_count(&source), 1);
    }

    #[test]
    fn stream_without_source_is_not_live() {
        let stream = MediaStream::new("usb", "USB Mic", 48_000, 1);
        assert!(!stream.is_live());
        assert_eq!(stream.capture().frames(), 0);
    }
}
