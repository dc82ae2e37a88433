//! Path-addressed configuration access.
//!
//! Paths are dot-separated keys into a JSON-shaped tree, e.g.
//! `"facilities.httpServer.listenPort"`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

pub const PATH_SEPARATOR: char = '.';

/// The narrow contract the container needs from configuration.
pub trait ConfigProvider: Send + Sync {
    /// Value at `path`, or `None` if any segment is missing.
    fn value(&self, path: &str) -> Option<&Value>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config value at '{path}'")]
    Missing { path: String },
    #[error("config value at '{path}' is a {found}, expected {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("config at '{path}' does not match the expected structure")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed helpers over any `ConfigProvider`.
pub trait ConfigProviderExt: ConfigProvider {
    fn path_exists(&self, path: &str) -> bool {
        self.value(path).is_some_and(|v| !v.is_null())
    }

    fn required(&self, path: &str) -> Result<&Value, ConfigError> {
        self.value(path)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ConfigError::Missing {
                path: path.to_owned(),
            })
    }

    fn string_val(&self, path: &str) -> Result<&str, ConfigError> {
        let v = self.required(path)?;
        v.as_str().ok_or_else(|| wrong_type(path, "string", v))
    }

    fn bool_val(&self, path: &str) -> Result<bool, ConfigError> {
        let v = self.required(path)?;
        v.as_bool().ok_or_else(|| wrong_type(path, "bool", v))
    }

    fn int_val(&self, path: &str) -> Result<i64, ConfigError> {
        let v = self.required(path)?;
        v.as_i64().ok_or_else(|| wrong_type(path, "integer", v))
    }

    fn float_val(&self, path: &str) -> Result<f64, ConfigError> {
        let v = self.required(path)?;
        v.as_f64().ok_or_else(|| wrong_type(path, "number", v))
    }

    /// The object at `path`; `Ok(None)` when absent.
    fn object_val(&self, path: &str) -> Result<Option<&Map<String, Value>>, ConfigError> {
        match self.value(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(wrong_type(path, "object", other)),
        }
    }

    /// The array at `path`; `Ok(None)` when absent.
    fn array_val(&self, path: &str) -> Result<Option<&Vec<Value>>, ConfigError> {
        match self.value(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(other) => Err(wrong_type(path, "array", other)),
        }
    }

    /// Deserialize the subtree at `path` into `T`.
    fn populate<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let v = self.required(path)?;
        serde_json::from_value(v.clone()).map_err(|source| ConfigError::Invalid {
            path: path.to_owned(),
            source,
        })
    }

    /// Like `populate`, but an absent subtree yields `T::default()`.
    fn populate_or_default<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, ConfigError> {
        if self.path_exists(path) {
            self.populate(path)
        } else {
            Ok(T::default())
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

fn wrong_type(path: &str, expected: &'static str, found: &Value) -> ConfigError {
    ConfigError::WrongType {
        path: path.to_owned(),
        expected,
        found: json_kind(found),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Configuration tree merged from every source the process was given.
#[derive(Debug, Clone, Default)]
pub struct ConfigAccessor {
    root: Value,
}

impl ConfigAccessor {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_inner(self) -> Value {
        self.root
    }

    /// Deep-merge `additional` over the current tree.
    pub fn merge(&mut self, additional: Value) {
        merge_json(&mut self.root, additional);
    }
}

impl ConfigProvider for ConfigAccessor {
    fn value(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        path.split(PATH_SEPARATOR)
            .try_fold(&self.root, |node, key| node.as_object()?.get(key))
    }
}

impl From<Value> for ConfigAccessor {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

/// Recursive merge: objects are merged key by key, anything else in
/// `additional` replaces what `base` had.
pub fn merge_json(base: &mut Value, additional: Value) {
    match (base, additional) {
        (Value::Object(base_map), Value::Object(additional_map)) => {
            for (key, value) in additional_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, additional) => *base = additional,
    }
}
