use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::LogLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub dry_run: bool,
    pub log_level: LogLevel,
    /// Longest value shown in `${x} = value` messages.
    pub max_assign_length: usize,
    /// Failure messages longer than this are cut in the middle.
    pub max_error_lines: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_level: LogLevel::Info,
            max_assign_length: 200,
            max_error_lines: 40,
        }
    }
}

impl RunSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| anyhow!("invalid run settings: {err}"))
    }

    pub fn from_json(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|err| anyhow!("invalid run settings: {err}"))
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}
