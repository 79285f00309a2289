//! Event log models.
//!
//! One `EmergencyEvent` row per session, plus the equipment that was in view when
//! the session ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    Running,
    Completed,
    /// Cleared by the user, or replaced by a new session, before it was ended.
    Reset,
    /// Still running when the process exited.
    Interrupted,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Running => "Running",
            EventStatus::Completed => "Completed",
            EventStatus::Reset => "Reset",
            EventStatus::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyEvent {
    pub id: Option<i64>,
    pub session_id: String,
    pub event_type: String,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end.
    pub duration_secs: Option<u64>,
    pub success: Option<bool>,
    pub missing_equipment: Vec<String>,
    pub detected_equipment: Vec<String>,
    pub notes: Option<String>,
    pub status: EventStatus,
    pub completion_percent: u8,
}

impl EmergencyEvent {
    pub fn started(
        session_id: impl Into<String>,
        event_type: impl Into<String>,
        location: Option<String>,
        start_time: DateTime<Utc>,
        missing_equipment: Vec<String>,
    ) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            event_type: event_type.into(),
            location,
            start_time,
            end_time: None,
            duration_secs: None,
            success: None,
            missing_equipment,
            detected_equipment: Vec::new(),
            notes: None,
            status: EventStatus::Running,
            completion_percent: 0,
        }
    }
}

/// Final state written when a session leaves the polling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub status: EventStatus,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub missing_equipment: Vec<String>,
    pub detected_equipment: Vec<String>,
    pub completion_percent: u8,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentDetection {
    pub id: Option<i64>,
    pub event_id: i64,
    pub equipment_name: String,
    pub confidence: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub detection_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventAnalytics {
    pub total_events: u64,
    pub successful_events: u64,
    /// Percentage with one decimal place.
    pub success_rate: f64,
    pub avg_duration_secs: u64,
    pub events_by_type: Vec<EventTypeCount>,
}
