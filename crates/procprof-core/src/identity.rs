//! Process identity tags.
//!
//! The tag set is derived once, when a profiler is constructed, from the
//! hosting container id and a fixed list of job/run metadata keys. It is
//! attached verbatim to every batched measurement for the profiler's lifetime.

use std::env::{self, VarError};
use std::fmt;
use std::sync::Arc;

use crate::config::Configuration;
use crate::error::{ProfilerError, Result};
use crate::telemetry::tags;

/// Supplies the hosting container id.
///
/// Closures returning `Option<String>` implement this trait, so tests can inject
/// a fixed value instead of touching the process environment.
pub trait IdentitySource: Send + Sync {
    /// `Ok(None)` when no container id is set. A value that is set but cannot
    /// be read is an error, not an absence.
    fn container_id(&self) -> Result<Option<String>>;
}

impl<F> IdentitySource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn container_id(&self) -> Result<Option<String>> {
        Ok(self())
    }
}

/// Reads the container id from an environment variable.
#[derive(Debug, Clone, Copy)]
pub struct EnvIdentitySource {
    variable: &'static str,
}

impl EnvIdentitySource {
    pub const fn new(variable: &'static str) -> Self {
        Self { variable }
    }
}

impl Default for EnvIdentitySource {
    fn default() -> Self {
        Self::new(tags::ENV_CONTAINER_ID)
    }
}

impl IdentitySource for EnvIdentitySource {
    fn container_id(&self) -> Result<Option<String>> {
        match env::var(self.variable) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(raw)) => Err(ProfilerError::UnreadableIdentity {
                variable: self.variable.to_owned(),
                lossy: raw.to_string_lossy().into_owned(),
            }),
        }
    }
}

/// Derives the application id from a container id.
///
/// `container_e273_1510780065801_7737_01_000042` yields
/// `application_1510780065801_7737`. Fewer than four `_`-separated segments is
/// a [`ProfilerError::MalformedIdentity`].
pub fn application_id(container_id: &str) -> Result<String> {
    let parts: Vec<&str> = container_id.split('_').collect();
    match parts.as_slice() {
        [_, _, cluster, sequence, ..] => Ok(format!("application_{cluster}_{sequence}")),
        _ => Err(ProfilerError::MalformedIdentity {
            value: container_id.to_owned(),
            segments: parts.len(),
        }),
    }
}

/// Immutable, ordered `key:value` identity tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Arc<[String]>,
}

impl TagSet {
    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.iter().any(|candidate| candidate == tag)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.tags.to_vec()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tags.join(","))
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        Self { tags: tags.into() }
    }
}

/// Builds a [`TagSet`] from an identity source and configuration.
pub struct TagSetBuilder<'a> {
    source: &'a dyn IdentitySource,
}

impl<'a> TagSetBuilder<'a> {
    pub fn new(source: &'a dyn IdentitySource) -> Self {
        Self { source }
    }

    pub fn build(&self, config: &Configuration) -> Result<TagSet> {
        let mut tag_list = Vec::new();

        // A set variable must be well formed, even when empty.
        if let Some(container_id) = self.source.container_id()? {
            let application_id = application_id(&container_id)?;
            tag_list.push(format!("{}:{container_id}", tags::TAG_CONTAINER_ID));
            tag_list.push(format!("{}:{application_id}", tags::TAG_APPLICATION_ID));
        }

        for key in tags::METADATA_TAG_KEYS {
            if let Some(value) = config.get(key) {
                tag_list.push(format!("{key}:{value}"));
            }
        }

        Ok(TagSet::from(tag_list))
    }
}
