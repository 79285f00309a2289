//! Equipment data models shared by the matcher, detection sources and session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    Critical,
    High,
    Normal,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Normal => "Normal",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A piece of equipment a procedure requires. Immutable for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequiredItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Alternative names the detector may report for this item, in match order.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub confidence_threshold: f32,
}

impl RequiredItem {
    /// Builds an item with no keywords, `Normal` priority and a 0.5 threshold.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            keywords: Vec::new(),
            priority: Priority::Normal,
            confidence_threshold: 0.5,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// One piece of equipment reported by a detection round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedItem {
    pub name: String,
    pub confidence: f32,
    pub count: u32,
    pub last_seen_at: DateTime<Utc>,
}

impl DetectedItem {
    pub fn new(name: impl Into<String>, confidence: f32, count: u32, seen_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            count,
            last_seen_at: seen_at,
        }
    }
}
