use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};

/// Read-only agent settings not consumed by higher-level argument parsing.
///
/// A `Configuration` is handed to a profiler once, at construction, and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the conventional agent argument string `key=value,key=value`.
    ///
    /// Empty entries are skipped. Keys and values are trimmed; a value may itself
    /// contain `=`. Later duplicates win.
    pub fn parse_agent_args(raw: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                ProfilerError::configuration(entry, "expected `key=value` agent argument")
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ProfilerError::configuration(
                    entry,
                    "agent argument has an empty key",
                ));
            }
            values.insert(key.to_owned(), value.trim().to_owned());
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Looks up `key` and parses it, reporting parse failures as configuration errors.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|err| ProfilerError::configuration(key, format!("`{raw}`: {err}"))),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Configuration
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for Configuration {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}
