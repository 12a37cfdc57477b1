//! Persisted node configuration
//!
//! [`NodeSettings`] is a flat, string-keyed map of JSON values. The engine
//! treats it as opaque; each model validates and converts it at its own
//! boundary in `load_settings`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Flat key/value configuration of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSettings {
    values: BTreeMap<String, serde_json::Value>,
}

impl NodeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Copy every entry of `other` over this map
    pub fn merge(&mut self, other: NodeSettings) {
        self.values.extend(other.values);
    }

    fn require(&self, key: &str) -> Result<&serde_json::Value> {
        self.values
            .get(key)
            .ok_or_else(|| NodeError::validation(format!("Missing setting '{}'", key)))
    }

    fn type_error(key: &str, expected: &str) -> NodeError {
        NodeError::validation(format!("Setting '{}' must be a {}", key, expected))
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| Self::type_error(key, "string"))
    }

    pub fn get_number(&self, key: &str) -> Result<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| Self::type_error(key, "number"))
    }

    pub fn get_boolean(&self, key: &str) -> Result<bool> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| Self::type_error(key, "boolean"))
    }

    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        let items = self
            .require(key)?
            .as_array()
            .ok_or_else(|| Self::type_error(key, "list of strings"))?;
        items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Self::type_error(key, "list of strings"))
            })
            .collect()
    }

    pub fn get_number_list(&self, key: &str) -> Result<Vec<f64>> {
        let items = self
            .require(key)?
            .as_array()
            .ok_or_else(|| Self::type_error(key, "list of numbers"))?;
        items
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| Self::type_error(key, "list of numbers")))
            .collect()
    }

    /// Raw JSON value
    pub fn get_json(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// String value, or `default` when the key is absent
    pub fn get_string_or(&self, key: &str, default: &str) -> Result<String> {
        match self.values.get(key) {
            None => Ok(default.to_string()),
            Some(_) => self.get_string(key).map(str::to_string),
        }
    }

    /// Number value, or `default` when the key is absent
    pub fn get_number_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(_) => self.get_number(key),
        }
    }

    /// Boolean value, or `default` when the key is absent
    pub fn get_boolean_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            None => Ok(default),
            Some(_) => self.get_boolean(key),
        }
    }

    /// Flatten a serde config struct into settings.
    ///
    /// The struct must serialize to a JSON object.
    pub fn from_config<T: Serialize>(config: &T) -> Result<Self> {
        match serde_json::to_value(config) {
            Ok(serde_json::Value::Object(map)) => Ok(Self {
                values: map.into_iter().collect(),
            }),
            Ok(_) => Err(NodeError::validation("Configuration must serialize to an object")),
            Err(e) => Err(NodeError::validation(e.to_string())),
        }
    }

    /// Decode settings into a serde config struct
    pub fn to_config<T: DeserializeOwned>(&self) -> Result<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| NodeError::validation(e.to_string()))
    }

    /// Serialize to the flat JSON form used for storage
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Parse the flat JSON form; anything but an object is rejected
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                values: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
            serde_json::Value::Null => Ok(Self::new()),
            _ => Err(NodeError::validation("Settings must be a JSON object")),
        }
    }
}
