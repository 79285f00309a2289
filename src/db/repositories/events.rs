use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row, Statement, ToSql};

use crate::db::{
    connection::Database,
    helpers::{
        format_datetime, parse_datetime, parse_name_list, parse_optional_datetime, parse_status,
        to_i64, to_u64,
    },
    models::{EmergencyEvent, EventAnalytics, EventOutcome, EventStatus, EventTypeCount},
};

const EVENT_COLUMNS: &str = "id, session_id, event_type, location, start_time, end_time, duration, success,
     missing_equipment, detected_equipment, notes, status, completion_percent";

fn row_to_event(row: &Row) -> Result<EmergencyEvent> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let duration: Option<i64> = row.get("duration")?;
    let status: String = row.get("status")?;
    let completion_percent: i64 = row.get("completion_percent")?;

    Ok(EmergencyEvent {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        event_type: row.get("event_type")?,
        location: row.get("location")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_secs: duration.map(|secs| to_u64(secs, "duration")).transpose()?,
        success: row.get("success")?,
        missing_equipment: parse_name_list(row.get("missing_equipment")?),
        detected_equipment: parse_name_list(row.get("detected_equipment")?),
        notes: row.get("notes")?,
        status: parse_status(&status)?,
        completion_percent: completion_percent.clamp(0, 100) as u8,
    })
}

fn collect_events(
    stmt: &mut Statement<'_>,
    values: &[&dyn ToSql],
) -> Result<Vec<EmergencyEvent>> {
    let mut rows = stmt.query(values)?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(row_to_event(row)?);
    }
    Ok(events)
}

impl Database {
    /// Records a freshly started session. Returns the new row id.
    pub async fn insert_event(&self, event: &EmergencyEvent) -> Result<i64> {
        let record = event.clone();
        self.execute(move |conn| {
            let now = format_datetime(&Utc::now());
            conn.execute(
                "INSERT INTO emergency_events (session_id, event_type, location, start_time, end_time, duration, success,
                     missing_equipment, detected_equipment, notes, status, completion_percent, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.session_id,
                    record.event_type,
                    record.location,
                    format_datetime(&record.start_time),
                    record.end_time.as_ref().map(format_datetime),
                    record.duration_secs.map(to_i64).transpose()?,
                    record.success,
                    serde_json::to_string(&record.missing_equipment)?,
                    serde_json::to_string(&record.detected_equipment)?,
                    record.notes,
                    record.status.as_str(),
                    i64::from(record.completion_percent.min(100)),
                    now,
                ],
            )
            .with_context(|| format!("failed to insert event for session {}", record.session_id))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Heartbeat from the polling loop while the session is still running.
    pub async fn update_event_progress(
        &self,
        event_id: i64,
        completion_percent: u8,
        missing_equipment: Vec<String>,
        detected_equipment: Vec<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE emergency_events
                 SET completion_percent = ?1,
                     missing_equipment = ?2,
                     detected_equipment = ?3,
                     updated_at = ?4
                 WHERE id = ?5 AND status = 'Running'",
                params![
                    i64::from(completion_percent.min(100)),
                    serde_json::to_string(&missing_equipment)?,
                    serde_json::to_string(&detected_equipment)?,
                    format_datetime(&updated_at),
                    event_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn finalize_event(&self, event_id: i64, outcome: &EventOutcome) -> Result<()> {
        let outcome = outcome.clone();
        self.execute(move |conn| {
            let start_time: Option<String> = conn
                .query_row(
                    "SELECT start_time FROM emergency_events WHERE id = ?1",
                    params![event_id],
                    |row| row.get(0),
                )
                .optional()?;
            let start_time = start_time.ok_or_else(|| anyhow!("Event {event_id} not found"))?;
            let start_time = parse_datetime(&start_time, "start_time")?;
            let duration = outcome
                .end_time
                .signed_duration_since(start_time)
                .num_seconds()
                .max(0);

            conn.execute(
                "UPDATE emergency_events
                 SET end_time = ?1,
                     duration = ?2,
                     success = ?3,
                     missing_equipment = ?4,
                     detected_equipment = ?5,
                     notes = COALESCE(?6, notes),
                     status = ?7,
                     completion_percent = ?8,
                     updated_at = ?9
                 WHERE id = ?10",
                params![
                    format_datetime(&outcome.end_time),
                    duration,
                    outcome.success,
                    serde_json::to_string(&outcome.missing_equipment)?,
                    serde_json::to_string(&outcome.detected_equipment)?,
                    outcome.notes,
                    outcome.status.as_str(),
                    i64::from(outcome.completion_percent.min(100)),
                    format_datetime(&outcome.end_time),
                    event_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_event(&self, event_id: i64) -> Result<Option<EmergencyEvent>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM emergency_events WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![event_id])?;
            let event = match rows.next()? {
                Some(row) => Some(row_to_event(row)?),
                None => None,
            };
            Ok(event)
        })
        .await
    }

    /// Most recent events first.
    pub async fn list_events(&self, limit: usize) -> Result<Vec<EmergencyEvent>> {
        let limit = limit.min(i64::MAX as usize) as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM emergency_events
                 ORDER BY start_time DESC, id DESC
                 LIMIT ?1"
            ))?;
            collect_events(&mut stmt, params![limit])
        })
        .await
    }

    pub async fn get_incomplete_events(&self) -> Result<Vec<EmergencyEvent>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM emergency_events
                 WHERE status = 'Running'
                 ORDER BY start_time ASC"
            ))?;
            collect_events(&mut stmt, params![])
        })
        .await
    }

    pub async fn mark_event_interrupted(
        &self,
        event_id: i64,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE emergency_events
                 SET status = ?1,
                     end_time = ?2,
                     success = 0,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    EventStatus::Interrupted.as_str(),
                    format_datetime(&stopped_at),
                    format_datetime(&stopped_at),
                    event_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Events whose start time falls in `[start, end]`, oldest first.
    pub async fn export_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EmergencyEvent>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM emergency_events
                 WHERE start_time >= ?1 AND start_time <= ?2
                 ORDER BY start_time ASC, id ASC"
            ))?;
            collect_events(
                &mut stmt,
                params![format_datetime(&start), format_datetime(&end)],
            )
        })
        .await
    }

    /// Deletes finished events that started more than `days` ago. Their detections
    /// go with them. Returns the number of events removed.
    pub async fn clear_old_events(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        self.execute(move |conn| {
            let removed = conn.execute(
                "DELETE FROM emergency_events
                 WHERE start_time < ?1 AND status != 'Running'",
                params![format_datetime(&cutoff)],
            )?;
            Ok(removed)
        })
        .await
    }

    pub async fn get_analytics(&self) -> Result<EventAnalytics> {
        self.execute(|conn| {
            let (total, successful, avg_duration): (i64, i64, Option<f64>) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                        AVG(duration)
                 FROM emergency_events",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let mut stmt = conn.prepare(
                "SELECT event_type, COUNT(*) AS count
                 FROM emergency_events
                 GROUP BY event_type
                 ORDER BY count DESC, event_type ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut events_by_type = Vec::new();
            while let Some(row) = rows.next()? {
                let count: i64 = row.get(1)?;
                events_by_type.push(EventTypeCount {
                    event_type: row.get(0)?,
                    count: to_u64(count, "count")?,
                });
            }

            let total_events = to_u64(total, "total_events")?;
            let successful_events = to_u64(successful, "successful_events")?;
            let success_rate = if total_events == 0 {
                0.0
            } else {
                (successful_events as f64 / total_events as f64 * 1000.0).round() / 10.0
            };

            Ok(EventAnalytics {
                total_events,
                successful_events,
                success_rate,
                avg_duration_secs: avg_duration.map(|secs| secs.round().max(0.0) as u64).unwrap_or(0),
                events_by_type,
            })
        })
        .await
    }
}
