use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid configuration for `{key}`: {reason}")]
    Configuration { key: String, reason: String },
    #[error(
        "malformed container id `{value}`: expected at least 4 `_`-separated segments \
         (container_e<epoch>_<clusterTimestamp>_<appSeq>_<attempt>_<id>), found {segments}; \
         check the CONTAINER_ID environment variable"
    )]
    MalformedIdentity { value: String, segments: usize },
    #[error("environment variable {variable} is not valid UTF-8: `{lossy}`")]
    UnreadableIdentity { variable: String, lossy: String },
    #[error("sampling error: {0}")]
    Sampling(String),
    #[error("flush error: {0}")]
    Flush(String),
    #[error("scheduler error: {0}")]
    Scheduler(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProfilerError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ProfilerError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Builds a [`ProfilerError::Configuration`] for `key`.
    pub fn configuration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that abort profiler construction.
    pub fn is_construction_error(&self) -> bool {
        match self {
            Self::InvalidArgument(_)
            | Self::Configuration { .. }
            | Self::MalformedIdentity { .. }
            | Self::UnreadableIdentity { .. } => true,
            Self::Context { source, .. } => source.is_construction_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
