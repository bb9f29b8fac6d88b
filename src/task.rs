//! Units of document work submitted to the pipeline.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Scheduling tier. High-priority work is always admitted before normal
/// and low when multiple tiers are waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Sort key: lower rank schedules first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One document to process. Immutable once created; owned by the pipeline
/// until its outcome is reported.
#[derive(Debug, Clone)]
pub struct DocumentTask {
    /// Caller-assigned identity, echoed back in the task's outcome.
    pub id: String,
    /// Original filename, used when storing the processed result.
    pub name: String,
    /// Raw document bytes.
    pub payload: Vec<u8>,
    pub priority: Priority,
    pub submitted_at: Instant,
}

impl DocumentTask {
    pub fn new(id: impl Into<String>, name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload,
            priority: Priority::Normal,
            submitted_at: Instant::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
