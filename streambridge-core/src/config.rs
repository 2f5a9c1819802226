//! Pipeline settings, loaded from a JSON document in the environment and
//! validated before any component is built.

use std::env;

use serde::Deserialize;

use crate::error::{Error, Result};

const ENV_PIPELINE_SPEC: &str = "STREAMBRIDGE_SPEC";

const DEFAULT_SOURCE: &str = "in_memory";
const DEFAULT_SINK: &str = "stdout";
const DEFAULT_FAILURE_SINK: &str = "stdout";
const DEFAULT_CONCURRENT_WRITES: usize = 50;
const DEFAULT_CHUNK_MAX_COUNT: usize = 500;
const DEFAULT_MAX_CHUNK_BYTES: usize = 5 * 1024 * 1024;

/// Top-level pipeline settings. Component-specific configuration lives with
/// the component factories; this selects components by name and sets the
/// knobs the shared delivery path needs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// registered name of the source to build
    pub source: String,
    /// registered name of the primary sink to build
    pub sink: String,
    /// registered name of the sink bad rows are written to
    pub failure_sink: String,
    /// maximum simultaneous in-flight deliveries per source
    pub concurrent_writes: usize,
    /// maximum messages per chunk
    pub chunk_max_count: usize,
    /// maximum combined payload bytes per chunk
    pub max_chunk_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source: DEFAULT_SOURCE.to_string(),
            sink: DEFAULT_SINK.to_string(),
            failure_sink: DEFAULT_FAILURE_SINK.to_string(),
            concurrent_writes: DEFAULT_CONCURRENT_WRITES,
            chunk_max_count: DEFAULT_CHUNK_MAX_COUNT,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

impl Settings {
    /// Load from the `STREAMBRIDGE_SPEC` environment variable. An unset
    /// variable yields the defaults; a set-but-invalid one is an error.
    pub fn load() -> Result<Self> {
        match env::var(ENV_PIPELINE_SPEC) {
            Ok(spec) => Self::from_json(&spec),
            Err(env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!(
                "could not read {ENV_PIPELINE_SPEC}: {e}"
            ))),
        }
    }

    pub fn from_json(spec: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(spec)
            .map_err(|e| Error::Config(format!("could not parse pipeline spec: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.concurrent_writes == 0 {
            return Err(Error::Config(
                "concurrent_writes must be at least 1".to_string(),
            ));
        }
        if self.chunk_max_count == 0 {
            return Err(Error::Config(
                "chunk_max_count must be at least 1".to_string(),
            ));
        }
        if self.max_chunk_bytes == 0 {
            return Err(Error::Config(
                "max_chunk_bytes must be at least 1".to_string(),
            ));
        }
        if self.source.is_empty() || self.sink.is_empty() || self.failure_sink.is_empty() {
            return Err(Error::Config(
                "source, sink and failure_sink must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}
