//! Profiler configuration snapshot
//!
//! The host aggregator owns configuration loading; sessions only ever see a
//! frozen clone wrapped in an `Arc`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default device activity buffer limit (128 MiB)
pub const DEFAULT_MAX_GPU_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Trace span name used when the config does not override it
pub const DEFAULT_TRACE_NAME: &str = "__xpu_profiler__";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Upper bound for the backend's device activity buffers, in bytes
    pub activities_max_gpu_buffer_size: usize,

    /// Name given to the trace span of every processed session
    pub trace_name: String,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            activities_max_gpu_buffer_size: DEFAULT_MAX_GPU_BUFFER_SIZE,
            trace_name: DEFAULT_TRACE_NAME.to_string(),
        }
    }
}

impl ProfilerConfig {
    /// Load a config snapshot from a JSON file; missing keys take defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_keys_take_defaults() {
        let config: ProfilerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ProfilerConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"activities_max_gpu_buffer_size": 4096}}"#).unwrap();

        let config = ProfilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.activities_max_gpu_buffer_size, 4096);
        assert_eq!(config.trace_name, DEFAULT_TRACE_NAME);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(ProfilerConfig::from_file("/nonexistent/gpuscope.json").is_err());
    }
}
