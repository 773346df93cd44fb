use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Result payload a trial hands to the host when it finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialData(Map<String, Value>);

impl TrialData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a payload from any struct that serializes to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                Ok(Self(map))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Overwrites fields with `overrides`, adding any that are missing.
    pub fn merge(&mut self, overrides: &Map<String, Value>) {
        for (k, v) in overrides {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TrialData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// What the host records for every finished trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_index: usize,
    pub trial_type: String,
    pub time_elapsed_ms: u64,
    #[serde(flatten)]
    pub data: TrialData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Sample {
        rt: Option<u64>,
        response: Option<usize>,
    }

    #[test]
    fn nulls_are_kept_in_payload() {
        let data = TrialData::from_serialize(&Sample {
            rt: None,
            response: None,
        })
        .unwrap();
        assert_eq!(data.get("rt"), Some(&Value::Null));
        assert_eq!(data.get("response"), Some(&Value::Null));
    }

    #[test]
    fn merge_overrides_existing_fields() {
        let mut data = TrialData::from_serialize(&Sample {
            rt: Some(500),
            response: Some(1),
        })
        .unwrap();
        let overrides = json!({"rt": 120, "extra": true});
        data.merge(overrides.as_object().unwrap());
        assert_eq!(data.get("rt"), Some(&json!(120)));
        assert_eq!(data.get("response"), Some(&json!(1)));
        assert_eq!(data.get("extra"), Some(&json!(true)));
    }

    #[test]
    fn result_flattens_payload() {
        let result = TrialResult {
            trial_index: 2,
            trial_type: "initialize-microphone".into(),
            time_elapsed_ms: 1500,
            data: TrialData::from_serialize(&json!({"device_id": "usb"})).unwrap(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "trial_index": 2,
                "trial_type": "initialize-microphone",
                "time_elapsed_ms": 1500,
                "device_id": "usb"
            })
        );
    }
}
