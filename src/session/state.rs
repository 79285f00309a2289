use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RoundError;
use crate::matching::{self, ChecklistReport};
use crate::models::{DetectedItem, RequiredItem};
use crate::protocols::OpenedSession;
use crate::settings::MergePolicy;

const DEFAULT_STALENESS_SECS: i64 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Polling,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

/// What observers see after every state change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub procedure: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub detected_items: Vec<DetectedItem>,
    pub report: ChecklistReport,
    /// The protocol's verification window has passed with equipment still missing.
    pub overdue: bool,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub procedure: Option<String>,
    pub required_items: Arc<[RequiredItem]>,
    pub detected_items: BTreeMap<String, DetectedItem>,
    pub started_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    /// Row id of this session's event log entry.
    pub event_id: Option<i64>,
    /// Detections at least this old are never reported, purged or not.
    pub staleness_window: Duration,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            session_id: None,
            procedure: None,
            required_items: Arc::from(Vec::new()),
            detected_items: BTreeMap::new(),
            started_at: None,
            location: None,
            deadline: None,
            event_id: None,
            staleness_window: Duration::seconds(DEFAULT_STALENESS_SECS),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Polling
    }

    pub fn is_current(&self, session_id: &str) -> bool {
        self.is_active() && self.session_id.as_deref() == Some(session_id)
    }

    pub fn begin(
        &mut self,
        opened: &OpenedSession,
        location: Option<String>,
        started_at: DateTime<Utc>,
        staleness_window: Duration,
    ) {
        let timeout = Duration::seconds(opened.timeout_secs.min(i64::MAX as u64) as i64);
        *self = Self {
            status: SessionStatus::Polling,
            session_id: Some(opened.session_id.clone()),
            procedure: Some(opened.procedure.clone()),
            required_items: opened.required_items.clone(),
            detected_items: BTreeMap::new(),
            started_at: Some(started_at),
            location: location.or_else(|| opened.location.clone()),
            deadline: started_at.checked_add_signed(timeout),
            event_id: None,
            staleness_window,
        };
    }

    /// Applies one round's detections if the round still belongs to this session.
    pub fn apply_round(
        &mut self,
        session_id: &str,
        items: Vec<DetectedItem>,
        policy: MergePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), RoundError> {
        if !self.is_current(session_id) {
            return Err(RoundError::SessionMismatch {
                round_session: session_id.to_string(),
                current: self.session_id.clone(),
            });
        }

        if policy == MergePolicy::Replace {
            self.detected_items.clear();
        }
        for item in items {
            self.detected_items.insert(item.name.clone(), item);
        }
        self.purge_stale(now);
        Ok(())
    }

    fn is_fresh(&self, item: &DetectedItem, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(item.last_seen_at) < self.staleness_window
    }

    /// Drops detections last seen a full staleness window ago or earlier. Returns how
    /// many were removed.
    pub fn purge_stale(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.detected_items.len();
        let window = self.staleness_window;
        self.detected_items
            .retain(|_, item| now.signed_duration_since(item.last_seen_at) < window);
        before - self.detected_items.len()
    }

    /// Detections still inside the staleness window at `now`, whether or not a purge
    /// has run since they expired.
    pub fn fresh_items(&self, now: DateTime<Utc>) -> BTreeMap<String, DetectedItem> {
        self.detected_items
            .iter()
            .filter(|(_, item)| self.is_fresh(item, now))
            .map(|(name, item)| (name.clone(), item.clone()))
            .collect()
    }

    pub fn report(&self, now: DateTime<Utc>) -> ChecklistReport {
        matching::evaluate(&self.required_items, &self.fresh_items(now))
    }

    pub fn is_overdue(&self, report: &ChecklistReport, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => self.is_active() && now > deadline && !report.is_complete(),
            None => false,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let fresh = self.fresh_items(now);
        let report = matching::evaluate(&self.required_items, &fresh);
        SessionSnapshot {
            status: self.status,
            session_id: self.session_id.clone(),
            procedure: self.procedure.clone(),
            started_at: self.started_at,
            detected_items: fresh.into_values().collect(),
            overdue: self.is_overdue(&report, now),
            report,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequiredItem;

    fn opened(id: &str) -> OpenedSession {
        OpenedSession {
            session_id: id.to_string(),
            procedure: "Code Blue".into(),
            required_items: vec![RequiredItem::named("AED"), RequiredItem::named("Epinephrine")]
                .into(),
            location: Some("ER".into()),
            timeout_secs: 30,
        }
    }

    fn item(name: &str, seen_at: DateTime<Utc>) -> DetectedItem {
        DetectedItem::new(name, 0.9, 1, seen_at)
    }

    fn window() -> Duration {
        Duration::seconds(10)
    }

    #[test]
    fn replace_policy_drops_previous_round() {
        let now = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("s1"), None, now, window());

        state
            .apply_round("s1", vec![item("aed", now)], MergePolicy::Replace, now)
            .unwrap();
        assert_eq!(state.report(now).completion_percentage, 50);

        state
            .apply_round("s1", vec![item("epinephrine", now)], MergePolicy::Replace, now)
            .unwrap();
        assert_eq!(state.detected_items.len(), 1);
        assert_eq!(state.report(now).satisfied(), vec!["Epinephrine"]);
    }

    #[test]
    fn sticky_policy_keeps_recent_items() {
        let start = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("s1"), None, start, window());

        state
            .apply_round("s1", vec![item("aed", start)], MergePolicy::Sticky, start)
            .unwrap();
        let later = start + Duration::seconds(4);
        state
            .apply_round("s1", vec![item("epinephrine", later)], MergePolicy::Sticky, later)
            .unwrap();
        assert_eq!(state.report(later).completion_percentage, 100);

        let much_later = start + Duration::seconds(12);
        state
            .apply_round("s1", Vec::new(), MergePolicy::Sticky, much_later)
            .unwrap();
        assert_eq!(state.report(much_later).missing(), vec!["AED"]);
    }

    #[test]
    fn stale_entries_are_removed_at_the_window_edge() {
        let start = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("s1"), None, start, window());
        state
            .apply_round("s1", vec![item("aed", start)], MergePolicy::Replace, start)
            .unwrap();

        assert_eq!(state.purge_stale(start + Duration::milliseconds(9_999)), 0);
        assert_eq!(state.purge_stale(start + Duration::seconds(10)), 1);
        assert!(state.detected_items.is_empty());
    }

    #[test]
    fn rounds_for_other_sessions_are_rejected() {
        let now = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("current"), None, now, window());

        let err = state
            .apply_round("previous", vec![item("aed", now)], MergePolicy::Replace, now)
            .unwrap_err();
        assert!(matches!(err, RoundError::SessionMismatch { .. }));
        assert!(state.detected_items.is_empty());

        state.clear();
        assert!(state
            .apply_round("current", vec![item("aed", now)], MergePolicy::Replace, now)
            .is_err());
    }

    #[test]
    fn overdue_only_after_deadline_with_missing_items() {
        let start = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("s1"), None, start, window());

        let report = state.report(start);
        assert!(!state.is_overdue(&report, start + Duration::seconds(29)));
        assert!(state.is_overdue(&report, start + Duration::seconds(31)));

        let late = start + Duration::seconds(31);
        state
            .apply_round(
                "s1",
                vec![item("aed", late), item("epinephrine", late)],
                MergePolicy::Replace,
                late,
            )
            .unwrap();
        assert!(!state.snapshot(late).overdue);
    }

    #[test]
    fn snapshot_after_clear_is_idle_and_empty() {
        let now = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("s1"), Some("Bay 2".into()), now, window());
        assert_eq!(state.location.as_deref(), Some("Bay 2"));

        state.clear();
        let snapshot = state.snapshot(now);
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.detected_items.is_empty());
        assert_eq!(snapshot.report.completion_percentage, 0);
    }

    #[test]
    fn expired_entries_are_hidden_before_any_purge() {
        let start = Utc::now();
        let mut state = SessionState::new();
        state.begin(&opened("s1"), None, start, Duration::seconds(1));
        state
            .apply_round("s1", vec![item("aed", start)], MergePolicy::Sticky, start)
            .unwrap();

        let fresh = state.snapshot(start + Duration::milliseconds(500));
        assert_eq!(fresh.report.completion_percentage, 50);
        assert_eq!(fresh.detected_items.len(), 1);

        let expired = start + Duration::milliseconds(1_800);
        let snapshot = state.snapshot(expired);
        assert!(snapshot.detected_items.is_empty());
        assert_eq!(snapshot.report.completion_percentage, 0);
        assert_eq!(state.report(expired).missing(), vec!["AED", "Epinephrine"]);
        assert_eq!(state.detected_items.len(), 1);
    }
}
