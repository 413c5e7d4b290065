use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Tree-structured job configuration addressed by dotted paths.
///
/// Path segments select object keys; a numeric segment indexes into an
/// array (`job.content.0.reader.name`). The empty path is the root.
/// A JSON `null` reads the same as an absent key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    root: Value,
}

impl Configuration {
    /// Empty object.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// `true` for `null`, `{}` and `[]`.
    pub fn is_empty(&self) -> bool {
        match &self.root {
            Value::Null => true,
            Value::Object(m) => m.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut cur = &self.root;
        for segment in segments(path) {
            cur = match cur {
                Value::Object(m) => m.get(segment)?,
                Value::Array(a) => a.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!cur.is_null()).then_some(cur)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    fn require(&self, path: &str) -> Result<&Value, ConfigError> {
        self.get(path)
            .ok_or_else(|| ConfigError::Missing(path.to_string()))
    }

    pub fn get_string(&self, path: &str) -> Result<String, ConfigError> {
        match self.require(path)? {
            Value::String(s) => Ok(s.clone()),
            _ => Err(wrong_type(path, "a string")),
        }
    }

    pub fn get_i64(&self, path: &str) -> Result<i64, ConfigError> {
        self.require(path)?
            .as_i64()
            .ok_or_else(|| wrong_type(path, "an integer"))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, ConfigError> {
        self.require(path)?
            .as_bool()
            .ok_or_else(|| wrong_type(path, "a boolean"))
    }

    /// Sub-tree at `path`. Must be an object.
    pub fn get_config(&self, path: &str) -> Result<Configuration, ConfigError> {
        match self.require(path)? {
            v @ Value::Object(_) => Ok(Configuration::from_value(v.clone())),
            _ => Err(wrong_type(path, "an object")),
        }
    }

    /// Elements of the array at `path`, each wrapped as a configuration.
    pub fn get_array(&self, path: &str) -> Result<Vec<Configuration>, ConfigError> {
        match self.require(path)? {
            Value::Array(a) => Ok(a.iter().cloned().map(Configuration::from_value).collect()),
            _ => Err(wrong_type(path, "an array")),
        }
    }

    /// Like [`get_string`](Self::get_string) but absent keys yield `default`.
    /// A present value of the wrong type is still an error.
    pub fn get_string_or(&self, path: &str, default: &str) -> Result<String, ConfigError> {
        match self.get_string(path) {
            Err(ConfigError::Missing(_)) => Ok(default.to_string()),
            other => other,
        }
    }

    pub fn get_i64_or(&self, path: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get_i64(path) {
            Err(ConfigError::Missing(_)) => Ok(default),
            other => other,
        }
    }

    /// Decode the sub-tree at `path` into `T`.
    pub fn decode<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let value = self.require(path)?.clone();
        serde_json::from_value(value).map_err(|e| ConfigError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Set `value` at `path`, creating intermediate objects. Array
    /// elements must already exist.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let mut cur = &mut self.root;
        for segment in segments(path) {
            if cur.is_null() {
                *cur = Value::Object(Map::new());
            }
            cur = match cur {
                Value::Object(m) => m.entry(segment.to_string()).or_insert(Value::Null),
                Value::Array(a) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| a.get_mut(i))
                    .ok_or_else(|| ConfigError::Missing(path.to_string()))?,
                _ => return Err(wrong_type(path, "an object or array")),
            };
        }
        *cur = value.into();
        Ok(())
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn wrong_type(path: &str, expected: &'static str) -> ConfigError {
    ConfigError::WrongType {
        path: path.to_string(),
        expected,
    }
}

impl FromStr for Configuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map(Configuration::from_value)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl From<Value> for Configuration {
    fn from(root: Value) -> Self {
        Self::from_value(root)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
