//! Generation status

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the backend is currently doing, as inferred from its response streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// No qualifying stream in progress
    #[default]
    Idle,
    /// A qualifying request started but no visible output yet
    Thinking,
    /// Visible tokens are being emitted
    Streaming,
}

impl Status {
    /// Upper-case label used in logs and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "IDLE",
            Status::Thinking => "THINKING",
            Status::Streaming => "STREAMING",
        }
    }

    /// True while a response is being generated
    pub fn is_busy(&self) -> bool {
        !matches!(self, Status::Idle)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(Status::default(), Status::Idle);
        assert!(!Status::Idle.is_busy());
        assert!(Status::Thinking.is_busy());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Status::Streaming).unwrap();
        assert_eq!(json, "\"STREAMING\"");
        let parsed: Status = serde_json::from_str("\"THINKING\"").unwrap();
        assert_eq!(parsed, Status::Thinking);
        assert_eq!(Status::Idle.to_string(), "IDLE");
    }
}
