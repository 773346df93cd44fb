use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExperimentError, Result};

/// Runner settings plus the trial timeline, loaded from JSON.
///
/// Every field is optional in the file; omitted fields take the defaults
/// below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub window_title: String,
    pub fullscreen: bool,
    pub font_path: Option<PathBuf>,
    /// PNG used as the window icon.
    pub icon_path: Option<PathBuf>,
    pub results_path: PathBuf,
    /// Blank interval between trials.
    pub post_trial_gap_ms: u64,
    /// Trial descriptions, each tagged with its plugin under `"type"`.
    pub timeline: Vec<Value>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            window_title: "Cogex".to_string(),
            fullscreen: true,
            font_path: None,
            icon_path: None,
            results_path: PathBuf::from("experiment_results.json"),
            post_trial_gap_ms: 0,
            timeline: Vec::new(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = ExperimentConfig::from_json_str("{}").unwrap();
        assert_eq!(config.window_title, "Cogex");
        assert!(config.fullscreen);
        assert_eq!(config.results_path, PathBuf::from("experiment_results.json"));
        assert!(config.font_path.is_none());
        assert!(config.icon_path.is_none());
        assert!(config.timeline.is_empty());
    }

    #[test]
    fn timeline_entries_are_kept_verbatim() {
        let config = ExperimentConfig::from_json_str(
            r#"{
                "fullscreen": false,
                "post_trial_gap_ms": 250,
                "timeline": [{"type": "initialize-microphone"}]
            }"#,
        )
        .unwrap();
        assert!(!config.fullscreen);
        assert_eq!(config.post_trial_gap_ms, 250);
        assert_eq!(config.timeline[0]["type"], "initialize-microphone");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ExperimentConfig::from_file("/nonexistent/cogex.json").unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent/cogex.json"));
    }
}
