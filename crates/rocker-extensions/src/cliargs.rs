//! The configuration map shared by every extension during a composition pass.
//!
//! Keys are normalized to their underscore spelling so `shm-size` and
//! `shm_size` address the same entry. Accessors never fail on a missing key;
//! they return the documented default instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Str(String),
    List(Vec<String>),
    /// Repeated multi-value options, one inner list per occurrence.
    Nested(Vec<Vec<String>>),
}

impl ConfigValue {
    /// Truthiness: `false`, empty strings and empty lists are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Nested(l) => l.iter().any(|inner| !inner.is_empty()),
        }
    }

    /// Flatten the value into a list of strings.
    ///
    /// Booleans carry no items and yield an empty list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::Bool(_) => Vec::new(),
            Self::Str(s) => vec![s.clone()],
            Self::List(l) => l.clone(),
            Self::Nested(l) => l.iter().flatten().cloned().collect(),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for ConfigValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Vec<&str>>> for ConfigValue {
    fn from(value: Vec<Vec<&str>>) -> Self {
        Self::Nested(
            value
                .into_iter()
                .map(|inner| inner.into_iter().map(String::from).collect())
                .collect(),
        )
    }
}

impl From<Vec<Vec<String>>> for ConfigValue {
    fn from(value: Vec<Vec<String>>) -> Self {
        Self::Nested(value)
    }
}

/// Normalize an option key to its canonical underscore form.
pub fn normalize_key(key: &str) -> String {
    key.trim_start_matches('-').replace('-', "_")
}

/// Option key to value mapping (the "cliargs" of a composition pass).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CliArgs {
    values: BTreeMap<String, ConfigValue>,
}

impl CliArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, replacing any previous one.
    pub fn insert(&mut self, key: &str, value: impl Into<ConfigValue>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.values.remove(&normalize_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(&normalize_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Boolean view of a key; missing keys are `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(ConfigValue::is_truthy)
    }

    /// String view of a key; only string values are returned.
    pub fn string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ConfigValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Non-empty string view of a key.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.string(key).filter(|s| !s.is_empty())
    }

    /// Flattened list view of a key; missing keys are an empty list.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(ConfigValue::to_list).unwrap_or_default()
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: &CliArgs) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Insert `value` only if the key is absent.
    pub fn set_default(&mut self, key: &str, value: impl Into<ConfigValue>) {
        self.values
            .entry(normalize_key(key))
            .or_insert_with(|| value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<ConfigValue>> FromIterator<(K, V)> for CliArgs {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Self::new();
        for (key, value) in iter {
            args.insert(key.as_ref(), value);
        }
        args
    }
}
