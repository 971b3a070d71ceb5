//! Detector configuration
//!
//! Which endpoint and media type mark a response as a conversation stream.
//! The core never reads files on its own; hosts call [`DetectorConfig::load`]
//! when they want a config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fetch::interceptor::QualifyingPredicate;

/// URL segment of the conversation endpoint
pub const DEFAULT_ENDPOINT: &str = "/backend-api/conversation";
/// Media type of the streaming wire protocol
pub const DEFAULT_MEDIA_TYPE: &str = "text/event-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Substring the request URL must contain
    pub endpoint: String,
    /// Media type required in `accept` and at the start of `content-type`
    pub media_type: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
        }
    }
}

impl DetectorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse detector config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn predicate(&self) -> QualifyingPredicate {
        QualifyingPredicate::new(self.endpoint.clone(), self.media_type.clone())
    }
}
