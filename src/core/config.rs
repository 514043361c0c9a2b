//! Session-wide settings, loaded from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::core::outcome::DEFAULT_ACKNOWLEDGMENT_TEXT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogVerbosity {
    /// Warnings and errors only.
    None,
    #[default]
    Normal,
    Verbose,
}

impl LogVerbosity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogVerbosity::None => LevelFilter::WARN,
            LogVerbosity::Normal => LevelFilter::INFO,
            LogVerbosity::Verbose => LevelFilter::DEBUG,
        }
    }
}

fn default_acknowledgment_text() -> String {
    DEFAULT_ACKNOWLEDGMENT_TEXT.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolkitConfig {
    #[serde(default = "default_acknowledgment_text")]
    pub default_acknowledgment_text: String,
    /// New authored events start as ban-after-use.
    #[serde(default)]
    pub ban_by_default: bool,
    /// New authored events are tagged with the first vocabulary label.
    #[serde(default = "default_true")]
    pub default_first_label: bool,
    /// Label vocabulary, in display order.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub logging: LogVerbosity,
    /// Only take actions from this module when scanning.
    #[serde(default)]
    pub action_module: Option<String>,
    /// Only take predicates from this module when scanning.
    #[serde(default)]
    pub predicate_module: Option<String>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            default_acknowledgment_text: default_acknowledgment_text(),
            ban_by_default: false,
            default_first_label: true,
            labels: Vec::new(),
            logging: LogVerbosity::default(),
            action_module: None,
            predicate_module: None,
        }
    }
}

impl ToolkitConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<ToolkitConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a configuration from a RON string. Missing fields take their
    /// defaults.
    pub fn parse_ron(input: &str) -> Result<ToolkitConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Adds a label to the vocabulary unless already present.
    pub fn add_label(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.labels.contains(&label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label);
        self.labels.len() != before
    }
}
