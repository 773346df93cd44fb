use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cogex_timing::TimeoutId;

use crate::display::{Display, ElementId};
use crate::error::Result;
use crate::host::TrialHost;
use crate::info::PluginInfo;

/// Input delivered to the running trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEvent {
    Click(ElementId),
    Timeout(TimeoutId),
    SelectionChanged(ElementId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    /// Produce result data without touching the display.
    DataOnly,
    /// Run the real trial and drive it with synthetic input.
    Visual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    /// Fields forced into the synthesised result.
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// One-shot completion flag: the first caller wins.
#[derive(Debug, Default)]
pub struct Completion {
    done: bool,
}

impl Completion {
    pub fn try_complete(&mut self) -> bool {
        !std::mem::replace(&mut self.done, true)
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }
}

/// A trial controller.
///
/// The host calls [`start`](TrialPlugin::start) once, then feeds events and
/// polls until the controller calls [`TrialHost::finish_trial`].
pub trait TrialPlugin {
    fn info(&self) -> &'static PluginInfo;

    fn start(&mut self, display: &mut Display, host: &mut dyn TrialHost) -> Result<()>;

    fn handle_event(
        &mut self,
        event: TrialEvent,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()>;

    /// Called once per host update while the trial runs.
    fn poll(&mut self, _display: &mut Display, _host: &mut dyn TrialHost) -> Result<()> {
        Ok(())
    }

    fn simulate(
        &mut self,
        mode: SimulationMode,
        options: &SimulationOptions,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()>;
}
