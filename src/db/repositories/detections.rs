use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, to_u64},
    models::EquipmentDetection,
};

fn row_to_detection(row: &Row) -> Result<EquipmentDetection> {
    let detected_at: String = row.get("detected_at")?;
    let detection_count: i64 = row.get("detection_count")?;

    Ok(EquipmentDetection {
        id: row.get("id")?,
        event_id: row.get("event_id")?,
        equipment_name: row.get("equipment_name")?,
        confidence: row.get("confidence")?,
        detected_at: parse_datetime(&detected_at, "detected_at")?,
        detection_count: to_u64(detection_count, "detection_count")?
            .min(u64::from(u32::MAX)) as u32,
    })
}

impl Database {
    /// Writes all detections in one transaction. The `event_id` of each entry is ignored
    /// in favour of `event_id`.
    pub async fn insert_detections(
        &self,
        event_id: i64,
        detections: Vec<EquipmentDetection>,
    ) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open detection transaction")?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO equipment_detections (event_id, equipment_name, confidence, detected_at, detection_count)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for detection in &detections {
                    stmt.execute(params![
                        event_id,
                        detection.equipment_name,
                        detection.confidence,
                        format_datetime(&detection.detected_at),
                        i64::from(detection.detection_count),
                    ])?;
                }
            }
            tx.commit().context("failed to commit detections")?;
            Ok(detections.len())
        })
        .await
    }

    pub async fn list_detections_for_event(&self, event_id: i64) -> Result<Vec<EquipmentDetection>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, equipment_name, confidence, detected_at, detection_count
                 FROM equipment_detections
                 WHERE event_id = ?1
                 ORDER BY detected_at ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![event_id])?;
            let mut detections = Vec::new();
            while let Some(row) = rows.next()? {
                detections.push(row_to_detection(row)?);
            }

            Ok(detections)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::db::models::EmergencyEvent;

    fn detection(name: &str, confidence: f64, offset_secs: i64) -> EquipmentDetection {
        EquipmentDetection {
            id: None,
            event_id: 0,
            equipment_name: name.into(),
            confidence: Some(confidence),
            detected_at: Utc::now() + Duration::seconds(offset_secs),
            detection_count: 2,
        }
    }

    #[tokio::test]
    async fn detections_are_stored_per_event_and_cascade() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("events.db")).unwrap();
        let old = Utc::now() - Duration::days(60);
        let event = EmergencyEvent::started("s1", "Code Blue", None, old, Vec::new());
        let event_id = db.insert_event(&event).await.unwrap();

        let written = db
            .insert_detections(
                event_id,
                vec![detection("AED", 0.9, 1), detection("Epinephrine", 1.0, 0)],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        let stored = db.list_detections_for_event(event_id).await.unwrap();
        let names: Vec<_> = stored.iter().map(|d| d.equipment_name.as_str()).collect();
        assert_eq!(names, vec!["Epinephrine", "AED"]);
        assert!(stored.iter().all(|d| d.event_id == event_id && d.detection_count == 2));

        db.mark_event_interrupted(event_id, old).await.unwrap();
        assert_eq!(db.clear_old_events(30).await.unwrap(), 1);
        assert!(db.list_detections_for_event(event_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn detections_for_missing_event_are_rejected() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("events.db")).unwrap();
        assert!(db
            .insert_detections(7, vec![detection("AED", 0.9, 0)])
            .await
            .is_err());
    }
}
