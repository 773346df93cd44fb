//! Native capture backend built on cpal.
//!
//! cpal exposes devices by name only, so the name doubles as the device id.
//! ALSA-style names (`hw:CARD=USB,DEV=0`, `sysdefault:CARD=USB`) are grouped
//! by their `CARD=` value; everything else is its own group.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::backend::AudioBackend;
use crate::device::{CaptureState, MediaDeviceInfo, MediaStream};
use crate::error::{AudioError, Result};
use crate::watch::DeviceWatch;

pub struct CpalAudioBackend {
    poll_interval: Duration,
}

impl CpalAudioBackend {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn input_names() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Enumeration(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_input(device_id: &str) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Enumeration(e.to_string()))?;
        for device in devices {
            if device.name().map(|n| n == device_id).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(AudioError::DeviceNotFound(device_id.to_string()))
    }
}

impl Default for CpalAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn group_key(name: &str) -> &str {
    match name.split_once("CARD=") {
        Some((_, rest)) => rest.split(',').next().unwrap_or(rest),
        None => name,
    }
}

impl AudioBackend for CpalAudioBackend {
    // Native hosts have no capture prompt; being able to list inputs is the grant.
    fn request_permission(&self) -> Result<()> {
        let names = Self::input_names().map_err(|e| AudioError::PermissionDenied(e.to_string()))?;
        log::debug!("cpal reports {} input devices", names.len());
        Ok(())
    }

    fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        Ok(Self::input_names()?
            .into_iter()
            .map(|name| MediaDeviceInfo::audio_input(name.clone(), group_key(&name), name))
            .collect())
    }

    fn watch_devices(&self) -> DeviceWatch {
        let (watch, notifier) = DeviceWatch::new();
        let interval = self.poll_interval;
        thread::spawn(move || {
            let mut last = Self::input_names().unwrap_or_default();
            while notifier.is_attached() {
                thread::sleep(interval);
                let current = Self::input_names().unwrap_or_default();
                if current != last {
                    log::debug!("input device set changed: {:?}", current);
                    last = current;
                    if !notifier.notify() {
                        break;
                    }
                }
            }
        });
        watch
    }

    fn open_stream(&self, device_id: &str) -> Result<MediaStream> {
        let stream_error = |message: String| AudioError::Stream {
            device_id: device_id.to_string(),
            message,
        };
        let device = Self::find_input(device_id)?;
        let supported = device
            .default_input_config()
            .map_err(|e| stream_error(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels;

        let capture = Arc::new(CaptureState::default());
        let on_error = {
            let capture = Arc::clone(&capture);
            move |err: cpal::StreamError| {
                log::error!("input stream error: {err}");
                capture.fail(err.to_string());
            }
        };
        let sink = Arc::clone(&capture);
        let built = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.record(data.iter().copied(), channels)
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    sink.record(data.iter().map(|s| f32::from(*s) / 32768.0), channels)
                },
                on_error,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    sink.record(
                        data.iter().map(|s| (f32::from(*s) - 32768.0) / 32768.0),
                        channels,
                    )
                },
                on_error,
                None,
            ),
            other => return Err(stream_error(format!("unsupported sample format {other:?}"))),
        };
        let stream = built.map_err(|e| stream_error(e.to_string()))?;
        stream.play().map_err(|e| stream_error(e.to_string()))?;

        log::info!(
            "capturing from {device_id}: {} Hz, {channels} ch, {sample_format:?}",
            config.sample_rate.0
        );
        Ok(
            MediaStream::new(device_id, device_id, config.sample_rate.0, channels)
                .with_source(capture, Box::new(stream)),
        )
    }
}
