//! Engine configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{QueryContext, DEFAULT_CHECK_STEP};

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for rolling JSON logs; stderr when unset.
    pub dir: Option<String>,
    /// Initial level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { dir: None, level: "info".into() }
    }
}

/// Engine configuration, usually loaded from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-query timeout in milliseconds; none when unset.
    pub query_timeout_ms: Option<u64>,
    /// Rows between cooperative timeout checks.
    pub timeout_check_step: usize,
    /// Logging.
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { query_timeout_ms: None, timeout_check_step: DEFAULT_CHECK_STEP, log: LogConfig::default() }
    }
}

impl EngineConfig {
    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Fresh query context honouring the configured timeout.
    pub fn query_context(&self) -> QueryContext {
        let ctx = match self.query_timeout_ms {
            Some(ms) => QueryContext::with_timeout(Duration::from_millis(ms)),
            None => QueryContext::unbounded(),
        };
        ctx.check_step(self.timeout_check_step)
    }
}
