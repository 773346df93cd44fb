//! Trial plugins and the registry that builds them from trial descriptions.

pub mod canvas_button_response;
pub mod initialize_microphone;
pub mod registry;

pub use canvas_button_response::{
    ButtonLayout, ButtonResponse, ButtonSpec, ButtonTemplate, CanvasButtonResponse,
    CanvasButtonResponseParams, DefaultButton, LabelTemplate, grid_dimensions,
};
pub use initialize_microphone::{
    InitializeMicrophone, InitializeMicrophoneParams, MicrophoneStage, filter_microphones,
};
pub use registry::PluginRegistry;
