use std::collections::HashSet;
use std::sync::Arc;

use cogex_audio::{AudioError, DeviceKind, MediaDeviceInfo, MockAudioBackend};
use cogex_core::{ElementId, SimulationMode, SimulationOptions, TrialError};
use cogex_experiment::{ExperimentError, ExperimentRuntime};
use cogex_plugins::initialize_microphone::{CONFIRM_ID, SELECT_ID, SIMULATED_DEVICE_ID};
use cogex_plugins::{
    InitializeMicrophone, InitializeMicrophoneParams, PluginRegistry, filter_microphones,
};
use cogex_timing::{ManualTimer, Timer};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

type Runtime = ExperimentRuntime<ManualTimer, StdRng>;

fn laptop_devices() -> Vec<MediaDeviceInfo> {
    vec![
        MediaDeviceInfo::audio_input("default", "builtin", "Default - Built-in"),
        MediaDeviceInfo::audio_input("communications", "builtin", "Communications"),
        MediaDeviceInfo::audio_input("builtin-mic", "builtin", "Built-in Microphone"),
        MediaDeviceInfo::audio_input("usb-mic", "usb", "USB Microphone"),
    ]
}

fn runtime(backend: &Arc<MockAudioBackend>) -> (Runtime, ManualTimer) {
    let timer = ManualTimer::new();
    let mut rt = ExperimentRuntime::new(timer.clone(), StdRng::seed_from_u64(5));
    rt.push(Box::new(InitializeMicrophone::new(
        InitializeMicrophoneParams::default(),
        backend.clone(),
    )));
    (rt, timer)
}

fn select(rt: &Runtime) -> ElementId {
    rt.display().query_id(SELECT_ID).unwrap()
}

fn confirm(rt: &Runtime) -> ElementId {
    rt.display().query_id(CONFIRM_ID).unwrap()
}

fn offered(rt: &Runtime) -> Vec<String> {
    rt.display()
        .select_options(select(rt))
        .iter()
        .map(|o| o.value.clone())
        .collect()
}

#[test]
fn lists_physical_microphones_and_reports_the_confirmed_one() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, _timer) = runtime(&backend);
    rt.start().unwrap();

    assert_eq!(backend.permission_requests(), 1);
    assert_eq!(offered(&rt), vec!["builtin-mic", "usb-mic"]);
    let confirm_el = rt.display().get(confirm(&rt)).unwrap();
    assert!(matches!(
        &confirm_el.kind,
        cogex_core::ElementKind::Button { label } if label == "Use this microphone"
    ));

    let list = select(&rt);
    assert!(rt.select(list, 1).unwrap());
    assert!(rt.click(confirm(&rt)).unwrap());

    assert_eq!(backend.opened_streams(), vec!["usb-mic".to_string()]);
    assert_eq!(rt.recorder().unwrap().device_id, "usb-mic");
    let result = &rt.results()[0];
    assert_eq!(result.trial_type, "initialize-microphone");
    assert_eq!(result.data.get("device_id"), Some(&json!("usb-mic")));
}

#[test]
fn device_changes_refresh_the_list_and_keep_the_selection() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, _timer) = runtime(&backend);
    rt.start().unwrap();
    let list = select(&rt);
    rt.select(list, 1).unwrap();

    let mut devices = laptop_devices();
    devices.insert(
        3,
        MediaDeviceInfo::audio_input("headset-mic", "headset", "Headset"),
    );
    backend.set_devices(devices);
    assert_eq!(offered(&rt), vec!["builtin-mic", "usb-mic"]);

    rt.update().unwrap();
    assert_eq!(offered(&rt), vec!["builtin-mic", "headset-mic", "usb-mic"]);
    assert_eq!(rt.display().select_value(list), Some("usb-mic"));

    rt.click(confirm(&rt)).unwrap();
    backend.set_devices(vec![MediaDeviceInfo::audio_input("other", "x", "Other")]);
    rt.update().unwrap();
    assert_eq!(rt.results()[0].data.get("device_id"), Some(&json!("usb-mic")));
}

#[test]
fn unplugged_selection_falls_back_to_first_device() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, _timer) = runtime(&backend);
    rt.start().unwrap();
    let list = select(&rt);
    rt.select(list, 1).unwrap();

    backend.set_devices(laptop_devices().into_iter().take(3).collect());
    rt.update().unwrap();
    assert_eq!(rt.display().select_value(list), Some("builtin-mic"));
}

#[test]
fn device_watch_is_detached_after_finish() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, _timer) = runtime(&backend);
    rt.start().unwrap();
    assert_eq!(backend.active_watches(), 1);

    rt.click(confirm(&rt)).unwrap();
    assert_eq!(backend.active_watches(), 0);
}

#[test]
fn permission_denial_propagates() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()).deny_permission());
    let (mut rt, _timer) = runtime(&backend);
    let err = rt.start().unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::Trial {
            source: TrialError::Audio(AudioError::PermissionDenied(_)),
            ..
        }
    ));
    assert_eq!(backend.active_watches(), 0);
    assert!(rt.results().is_empty());
}

#[test]
fn stream_failure_propagates() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()).fail_streams("busy"));
    let (mut rt, _timer) = runtime(&backend);
    rt.start().unwrap();
    let err = rt.click(confirm(&rt)).unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::Trial {
            source: TrialError::Audio(AudioError::Stream { .. }),
            ..
        }
    ));
    assert!(rt.recorder().is_none());
    assert_eq!(backend.active_watches(), 0);
}

#[test]
fn confirming_without_devices_is_an_error() {
    let backend = Arc::new(MockAudioBackend::new(vec![MediaDeviceInfo::audio_input(
        "default", "g", "Default",
    )]));
    let (mut rt, _timer) = runtime(&backend);
    rt.start().unwrap();
    assert!(offered(&rt).is_empty());
    let err = rt.click(confirm(&rt)).unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::Trial {
            source: TrialError::NoDeviceSelected,
            ..
        }
    ));
}

#[test]
fn data_only_simulation_skips_the_backend() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, _timer) = runtime(&backend);
    rt.simulate(SimulationMode::DataOnly, SimulationOptions::default());
    rt.run_to_completion().unwrap();

    assert_eq!(backend.permission_requests(), 0);
    assert_eq!(
        rt.results()[0].data.get("device_id"),
        Some(&json!(SIMULATED_DEVICE_ID))
    );
}

#[test]
fn data_only_simulation_takes_overrides() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, _timer) = runtime(&backend);
    let mut options = SimulationOptions::default();
    options.data.insert("device_id".into(), json!("usb-mic"));
    rt.simulate(SimulationMode::DataOnly, options);
    rt.run_to_completion().unwrap();
    assert_eq!(rt.results()[0].data.get("device_id"), Some(&json!("usb-mic")));
}

#[test]
fn visual_simulation_confirms_the_first_device() {
    let backend = Arc::new(MockAudioBackend::new(laptop_devices()));
    let (mut rt, timer) = runtime(&backend);
    rt.simulate(SimulationMode::Visual, SimulationOptions::default());
    rt.run_to_completion().unwrap();

    assert_eq!(timer.now_ns(), 500_000_000);
    assert_eq!(backend.opened_streams(), vec!["builtin-mic".to_string()]);
    assert_eq!(
        rt.results()[0].data.get("device_id"),
        Some(&json!("builtin-mic"))
    );
}

#[test]
fn registry_builds_with_custom_wording() {
    let backend: Arc<MockAudioBackend> = Arc::new(MockAudioBackend::new(laptop_devices()));
    let registry = PluginRegistry::new(backend.clone());
    let trial = registry
        .build(&json!({
            "type": "initialize-microphone",
            "device_select_message": "<p>Pick one</p>",
            "button_label": "Go"
        }))
        .unwrap();

    let mut rt: Runtime = ExperimentRuntime::new(ManualTimer::new(), StdRng::seed_from_u64(1));
    rt.push(trial);
    rt.start().unwrap();
    let confirm_el = rt.display().get(confirm(&rt)).unwrap();
    assert!(matches!(
        &confirm_el.kind,
        cogex_core::ElementKind::Button { label } if label == "Go"
    ));
}

fn device_strategy() -> impl Strategy<Value = MediaDeviceInfo> {
    (
        prop_oneof![
            Just("default".to_string()),
            Just("communications".to_string()),
            Just(String::new()),
            "[a-d]{1,3}",
        ],
        "[a-c]",
        prop_oneof![
            Just(DeviceKind::AudioInput),
            Just(DeviceKind::AudioOutput),
            Just(DeviceKind::VideoInput),
        ],
    )
        .prop_map(|(device_id, group_id, kind)| MediaDeviceInfo {
            label: format!("{device_id}@{group_id}"),
            device_id,
            group_id,
            kind,
        })
}

proptest! {
    #[test]
    fn filtered_list_has_no_aliases_and_unique_groups(
        devices in proptest::collection::vec(device_strategy(), 0..16),
    ) {
        let mics = filter_microphones(&devices);
        let mut groups = HashSet::new();
        for mic in &mics {
            prop_assert_eq!(mic.kind, DeviceKind::AudioInput);
            prop_assert!(mic.device_id != "default" && mic.device_id != "communications");
            prop_assert!(!mic.device_id.is_empty());
            prop_assert!(groups.insert(mic.group_id.clone()));
        }

        // Every group with a usable input is represented by its first entry.
        let mut first_per_group = Vec::new();
        let mut seen = HashSet::new();
        for d in &devices {
            let usable = d.kind == DeviceKind::AudioInput
                && !d.device_id.is_empty()
                && d.device_id != "default"
                && d.device_id != "communications";
            if usable && seen.insert(d.group_id.clone()) {
                first_per_group.push(d.clone());
            }
        }
        prop_assert_eq!(mics, first_per_group);
    }
}
