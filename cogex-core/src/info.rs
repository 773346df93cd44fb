//! Parameter schema a plugin publishes to the host.
//!
//! The host uses it to validate trial descriptions and to fill in defaults;
//! trial controllers never read it.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, TrialError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    /// A strategy object. From JSON it is given as a preset (object or string).
    Function,
    String,
    HtmlString,
    /// A non-negative integer: durations, counts and sizes.
    Int,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDefault {
    Required,
    Null,
    /// Supplied by the plugin itself (function parameters).
    Builtin,
    Bool(bool),
    Int(i64),
    Str(&'static str),
    IntArray(&'static [i64]),
}

impl ParameterDefault {
    pub fn to_value(&self) -> Option<Value> {
        match self {
            ParameterDefault::Required | ParameterDefault::Builtin => None,
            ParameterDefault::Null => Some(Value::Null),
            ParameterDefault::Bool(b) => Some(Value::Bool(*b)),
            ParameterDefault::Int(i) => Some(Value::from(*i)),
            ParameterDefault::Str(s) => Some(Value::from(*s)),
            ParameterDefault::IntArray(xs) => Some(Value::from(xs.to_vec())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParameterInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParameterType,
    pub array: bool,
    pub default: ParameterDefault,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DataInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParameterType,
}

#[derive(Debug, Serialize)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub parameters: &'static [ParameterInfo],
    pub data: &'static [DataInfo],
}

impl PluginInfo {
    pub fn parameter(&self, name: &str) -> Option<&ParameterInfo> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Checks names, types and array-ness, then returns the parameters with
    /// every omitted non-function default filled in.
    pub fn resolve(&self, params: &Map<String, Value>) -> Result<Map<String, Value>> {
        for name in params.keys() {
            if self.parameter(name).is_none() {
                return Err(TrialError::UnknownParameter {
                    plugin: self.name,
                    name: name.clone(),
                });
            }
        }

        let mut resolved = Map::new();
        for param in self.parameters {
            match params.get(param.name) {
                Some(value) => {
                    self.check_value(param, value)?;
                    resolved.insert(param.name.to_string(), value.clone());
                }
                None => match param.default {
                    ParameterDefault::Required => {
                        return Err(TrialError::MissingParameter {
                            plugin: self.name,
                            name: param.name,
                        });
                    }
                    default => {
                        if let Some(value) = default.to_value() {
                            resolved.insert(param.name.to_string(), value);
                        }
                    }
                },
            }
        }
        Ok(resolved)
    }

    fn check_value(&self, param: &ParameterInfo, value: &Value) -> Result<()> {
        if value.is_null() && param.default != ParameterDefault::Required {
            return Ok(());
        }
        let ok = if param.array {
            value
                .as_array()
                .map(|items| items.iter().all(|v| scalar_matches(param.ty, v)))
                .unwrap_or(false)
        } else {
            scalar_matches(param.ty, value)
        };
        if ok {
            Ok(())
        } else {
            let expected = match (param.array, param.ty) {
                (true, ty) => format!("an array of {}", type_name(ty)),
                (false, ty) => type_name(ty).to_string(),
            };
            Err(TrialError::InvalidParameter {
                plugin: self.name,
                name: param.name.to_string(),
                expected,
            })
        }
    }
}

fn scalar_matches(ty: ParameterType, value: &Value) -> bool {
    match ty {
        ParameterType::Function => value.is_object() || value.is_string(),
        ParameterType::String | ParameterType::HtmlString => value.is_string(),
        ParameterType::Int => value.is_u64(),
        ParameterType::Bool => value.is_boolean(),
    }
}

fn type_name(ty: ParameterType) -> &'static str {
    match ty {
        ParameterType::Function => "a preset object or template string",
        ParameterType::String => "a string",
        ParameterType::HtmlString => "an HTML string",
        ParameterType::Int => "a non-negative integer",
        ParameterType::Bool => "a boolean",
    }
}
