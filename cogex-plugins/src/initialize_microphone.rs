//! Microphone selection.
//!
//! Asks for capture permission, lists the usable input devices in a
//! selection list that follows device changes, and once the participant
//! confirms, opens a stream on the chosen device and hands it to the host
//! recorder.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cogex_audio::{AudioBackend, DeviceKind, DeviceWatch, MediaDeviceInfo};
use cogex_core::{
    Completion, DataInfo, Display, Element, ElementId, ParameterDefault, ParameterInfo,
    ParameterType, PluginInfo, Result, SelectOption, SimulationMode, SimulationOptions, TrialData,
    TrialError, TrialEvent, TrialHost, TrialPlugin,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_MESSAGE: &str = "<p>Please select the microphone you would like to use.</p>";
const DEFAULT_BUTTON_LABEL: &str = "Use this microphone";

pub static INFO: PluginInfo = PluginInfo {
    name: "initialize-microphone",
    version: "2.0.0",
    parameters: &[
        ParameterInfo {
            name: "device_select_message",
            ty: ParameterType::HtmlString,
            array: false,
            default: ParameterDefault::Str(DEFAULT_MESSAGE),
        },
        ParameterInfo {
            name: "button_label",
            ty: ParameterType::String,
            array: false,
            default: ParameterDefault::Str(DEFAULT_BUTTON_LABEL),
        },
    ],
    data: &[DataInfo {
        name: "device_id",
        ty: ParameterType::String,
    }],
};

pub const SELECT_ID: &str = "which-mic";
pub const CONFIRM_ID: &str = "btn-select-mic";

/// Device reported by `data-only` simulation.
pub const SIMULATED_DEVICE_ID: &str = "sim-mic";

const SIMULATED_CONFIRM_DELAY: Duration = Duration::from_millis(500);

/// Platform aliases that never name a physical device.
const ALIAS_IDS: [&str; 2] = ["default", "communications"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InitializeMicrophoneParams {
    pub device_select_message: String,
    pub button_label: String,
}

impl Default for InitializeMicrophoneParams {
    fn default() -> Self {
        Self {
            device_select_message: DEFAULT_MESSAGE.to_string(),
            button_label: DEFAULT_BUTTON_LABEL.to_string(),
        }
    }
}

impl InitializeMicrophoneParams {
    pub fn from_json(params: &Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(params.clone()))?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophoneStage {
    RequestingPermission,
    ShowingSelector,
    WaitingForSelection,
    AcquiringStream,
    Done,
}

/// Audio inputs worth offering: aliases and entries without an id are
/// dropped, and only the first entry of each physical device is kept.
pub fn filter_microphones(devices: &[MediaDeviceInfo]) -> Vec<MediaDeviceInfo> {
    let mut groups = HashSet::new();
    devices
        .iter()
        .filter(|d| d.kind == DeviceKind::AudioInput)
        .filter(|d| !d.device_id.is_empty() && !ALIAS_IDS.contains(&d.device_id.as_str()))
        .filter(|d| groups.insert(d.group_id.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Serialize)]
struct MicrophoneData<'a> {
    device_id: &'a str,
}

struct Selector {
    select: ElementId,
    confirm: ElementId,
}

pub struct InitializeMicrophone {
    params: InitializeMicrophoneParams,
    backend: Arc<dyn AudioBackend>,
    stage: MicrophoneStage,
    selector: Option<Selector>,
    watch: Option<DeviceWatch>,
    device_id: Option<String>,
    completion: Completion,
}

impl InitializeMicrophone {
    pub fn new(params: InitializeMicrophoneParams, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            params,
            backend,
            stage: MicrophoneStage::RequestingPermission,
            selector: None,
            watch: None,
            device_id: None,
            completion: Completion::default(),
        }
    }

    pub fn stage(&self) -> MicrophoneStage {
        self.stage
    }

    /// The device captured when the participant confirmed.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    fn show_selector(&mut self, display: &mut Display) -> Result<()> {
        self.stage = MicrophoneStage::ShowingSelector;
        display.clear();
        let root = display.root();
        display.append(root, Element::html(self.params.device_select_message.clone()))?;
        let select = display.append(root, Element::select().with_id(SELECT_ID))?;
        let confirm = display.append(
            root,
            Element::button(self.params.button_label.clone())
                .with_class("cogex-btn")
                .with_id(CONFIRM_ID),
        )?;
        self.selector = Some(Selector { select, confirm });
        Ok(())
    }

    fn refresh_devices(&mut self, display: &mut Display) -> Result<()> {
        let Some(selector) = &self.selector else {
            return Ok(());
        };
        let devices = self.backend.enumerate_devices()?;
        let options: Vec<SelectOption> = filter_microphones(&devices)
            .into_iter()
            .enumerate()
            .map(|(i, d)| SelectOption {
                label: if d.label.is_empty() {
                    format!("Microphone {}", i + 1)
                } else {
                    d.label
                },
                value: d.device_id,
            })
            .collect();
        log::debug!("{} microphones available", options.len());
        display.set_options(selector.select, options)
    }

    fn confirm(&mut self, display: &mut Display, host: &mut dyn TrialHost) -> Result<()> {
        let Some(selector) = &self.selector else {
            return Ok(());
        };
        let device_id = display
            .select_value(selector.select)
            .ok_or(TrialError::NoDeviceSelected)?
            .to_string();
        self.device_id = Some(device_id.clone());

        self.stage = MicrophoneStage::AcquiringStream;
        let stream = self.backend.open_stream(&device_id)?;
        host.initialize_microphone_recorder(stream);

        self.stage = MicrophoneStage::Done;
        self.finish(&device_id, host)
    }

    fn finish(&mut self, device_id: &str, host: &mut dyn TrialHost) -> Result<()> {
        if !self.completion.try_complete() {
            return Ok(());
        }
        if let Some(watch) = self.watch.take() {
            watch.detach();
        }
        log::info!("{} selected {}", INFO.name, device_id);
        host.finish_trial(TrialData::from_serialize(&MicrophoneData { device_id })?);
        Ok(())
    }
}

impl TrialPlugin for InitializeMicrophone {
    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn start(&mut self, display: &mut Display, _host: &mut dyn TrialHost) -> Result<()> {
        self.stage = MicrophoneStage::RequestingPermission;
        self.backend.request_permission()?;

        self.show_selector(display)?;
        self.watch = Some(self.backend.watch_devices());
        self.refresh_devices(display)?;
        self.stage = MicrophoneStage::WaitingForSelection;
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: TrialEvent,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()> {
        if self.stage != MicrophoneStage::WaitingForSelection {
            return Ok(());
        }
        match event {
            TrialEvent::Click(target)
                if self.selector.as_ref().is_some_and(|s| s.confirm == target) =>
            {
                self.confirm(display, host)
            }
            _ => Ok(()),
        }
    }

    fn poll(&mut self, display: &mut Display, _host: &mut dyn TrialHost) -> Result<()> {
        if self.stage != MicrophoneStage::WaitingForSelection {
            return Ok(());
        }
        if self.watch.as_ref().is_some_and(DeviceWatch::take_change) {
            self.refresh_devices(display)?;
        }
        Ok(())
    }

    fn simulate(
        &mut self,
        mode: SimulationMode,
        options: &SimulationOptions,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()> {
        match mode {
            SimulationMode::DataOnly => {
                let mut data = TrialData::from_serialize(&MicrophoneData {
                    device_id: SIMULATED_DEVICE_ID,
                })?;
                data.merge(&options.data);
                if self.completion.try_complete() {
                    self.stage = MicrophoneStage::Done;
                    host.finish_trial(data);
                }
                Ok(())
            }
            SimulationMode::Visual => {
                self.start(display, host)?;
                if let Some(selector) = &self.selector {
                    host.click_target(selector.confirm, SIMULATED_CONFIRM_DELAY);
                }
                Ok(())
            }
        }
    }
}
