//! Maps plugin names to constructors for trial descriptions.

use std::collections::BTreeMap;
use std::sync::Arc;

use cogex_audio::AudioBackend;
use cogex_core::{PluginInfo, Result, TrialError, TrialPlugin};
use serde_json::{Map, Value};

use crate::canvas_button_response::{self, CanvasButtonResponse, CanvasButtonResponseParams};
use crate::initialize_microphone::{self, InitializeMicrophone, InitializeMicrophoneParams};

type Factory = Box<dyn Fn(&Map<String, Value>) -> Result<Box<dyn TrialPlugin>> + Send + Sync>;

struct Entry {
    info: &'static PluginInfo,
    factory: Factory,
}

/// Builds trial controllers from JSON trial descriptions.
///
/// A description is an object whose `"type"` names a registered plugin; the
/// other fields are its parameters, checked against the plugin's
/// [`PluginInfo`] before the constructor sees them.
pub struct PluginRegistry {
    plugins: BTreeMap<&'static str, Entry>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Registry with every built-in plugin, using `audio` for microphone access.
    pub fn new(audio: Arc<dyn AudioBackend>) -> Self {
        let mut registry = Self::empty();
        registry.register(&canvas_button_response::INFO, |params| {
            let params = CanvasButtonResponseParams::from_json(params)?;
            let trial: Box<dyn TrialPlugin> = Box::new(CanvasButtonResponse::new(params));
            Ok(trial)
        });
        registry.register(&initialize_microphone::INFO, move |params| {
            let params = InitializeMicrophoneParams::from_json(params)?;
            let trial: Box<dyn TrialPlugin> =
                Box::new(InitializeMicrophone::new(params, Arc::clone(&audio)));
            Ok(trial)
        });
        registry
    }

    /// Register a constructor under `info.name`, replacing any earlier one.
    pub fn register<F>(&mut self, info: &'static PluginInfo, factory: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Box<dyn TrialPlugin>> + Send + Sync + 'static,
    {
        self.plugins.insert(
            info.name,
            Entry {
                info,
                factory: Box::new(factory),
            },
        );
    }

    pub fn info(&self, name: &str) -> Option<&'static PluginInfo> {
        self.plugins.get(name).map(|e| e.info)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.plugins.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn build(&self, description: &Value) -> Result<Box<dyn TrialPlugin>> {
        let fields = description
            .as_object()
            .ok_or_else(|| TrialError::Config("trial description must be an object".into()))?;
        let name = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TrialError::Config("trial description has no \"type\"".into()))?;
        let entry = self
            .plugins
            .get(name)
            .ok_or_else(|| TrialError::UnknownPlugin(name.to_string()))?;

        let mut params = fields.clone();
        params.remove("type");
        let resolved = entry.info.resolve(&params)?;
        (entry.factory)(&resolved)
    }
}
