//! User-facing messages grouped by severity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Severity bucket a message is filed under.
///
/// The set is closed: frontends render exactly these four buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Displayed in red.
    Error,
    /// Displayed in blue.
    Info,
    /// Displayed in green.
    Success,
    /// Displayed in yellow.
    Warning,
}

impl Severity {
    /// All severities in wire order.
    pub const ALL: [Severity; 4] = [
        Severity::Error,
        Severity::Info,
        Severity::Success,
        Severity::Warning,
    ];

    /// Get the string representation of this severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Severity::Error),
            "info" => Ok(Severity::Info),
            "success" => Ok(Severity::Success),
            "warning" => Ok(Severity::Warning),
            other => Err(EnvelopeError::InvalidSeverity(other.to_string())),
        }
    }
}

/// A single `{title, message, type}` record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

impl Message {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

/// The four ordered message buckets.
///
/// Serializes as `{"error": [...], "info": [...], "success": [...], "warning": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default)]
    error: Vec<Message>,
    #[serde(default)]
    info: Vec<Message>,
    #[serde(default)]
    success: Vec<Message>,
    #[serde(default)]
    warning: Vec<Message>,
}

impl Messages {
    /// Four empty buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the bucket of its severity.
    pub fn push(&mut self, message: Message) {
        self.bucket_mut(message.severity).push(message);
    }

    /// Messages of one severity, in insertion order.
    pub fn get(&self, severity: Severity) -> &[Message] {
        match severity {
            Severity::Error => &self.error,
            Severity::Info => &self.info,
            Severity::Success => &self.success,
            Severity::Warning => &self.warning,
        }
    }

    /// Total number of messages across all buckets.
    pub fn len(&self) -> usize {
        Severity::ALL.iter().map(|s| self.get(*s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_mut(&mut self, severity: Severity) -> &mut Vec<Message> {
        match severity {
            Severity::Error => &mut self.error,
            Severity::Info => &mut self.info,
            Severity::Success => &mut self.success,
            Severity::Warning => &mut self.warning,
        }
    }
}
