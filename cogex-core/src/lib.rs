pub mod display;
pub mod error;
pub mod host;
pub mod info;
pub mod plugin;
pub mod stimulus;
pub mod trial;

pub use display::{Display, Element, ElementId, ElementKind, Layout, SelectOption};
pub use error::{Result, TrialError};
pub use host::{Randomization, TrialHost};
pub use info::{DataInfo, ParameterDefault, ParameterInfo, ParameterType, PluginInfo};
pub use plugin::{Completion, SimulationMode, SimulationOptions, TrialEvent, TrialPlugin};
pub use stimulus::{ArrowDirection, DrawStimulus, StimulusType};
pub use trial::{TrialData, TrialResult};
