use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::{watch, Mutex};

use crate::{
    backend::BackendClient,
    capture::{FrameSource, StillImageSource, SyntheticFrameSource},
    db::{Database, EmergencyEvent, EquipmentDetection, EventOutcome, EventStatus},
    detection::{DetectionSource, LiveDetectionSource, SimulatedDetectionSource},
    polling::{PollingConfig, PollingContext, PollingController},
    protocols::{ProcedureCatalog, ProtocolTable},
    settings::{DetectionMode, Settings},
};

use super::{SessionSnapshot, SessionState};

const SYNTHETIC_FRAME_WIDTH: u32 = 640;
const SYNTHETIC_FRAME_HEIGHT: u32 = 480;

/// The injected capabilities a session runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ProcedureCatalog>,
    pub frames: Arc<dyn FrameSource>,
    pub detector: Arc<dyn DetectionSource>,
}

impl Collaborators {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let frames: Arc<dyn FrameSource> = match &settings.frame_path {
            Some(path) => Arc::new(StillImageSource::new(path.clone())),
            None => Arc::new(SyntheticFrameSource::new(
                SYNTHETIC_FRAME_WIDTH,
                SYNTHETIC_FRAME_HEIGHT,
            )?),
        };

        match settings.mode {
            DetectionMode::Live => {
                let client = BackendClient::new(&settings.backend_url, settings.request_timeout())?;
                Ok(Self {
                    catalog: Arc::new(client.clone()),
                    frames,
                    detector: Arc::new(LiveDetectionSource::new(client)),
                })
            }
            DetectionMode::Simulated => Ok(Self {
                catalog: Arc::new(ProtocolTable),
                frames,
                detector: Arc::new(SimulatedDetectionSource::new(settings.simulation_seed)),
            }),
        }
    }
}

/// What a session left behind when it stopped polling.
struct FinishedSession {
    event_id: Option<i64>,
    outcome: EventOutcome,
    detections: Vec<EquipmentDetection>,
}

/// Drives one equipment-verification session at a time.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    db: Database,
    collaborators: Collaborators,
    polling: Arc<Mutex<PollingController>>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
    config: PollingConfig,
    location: Option<String>,
}

impl SessionController {
    pub fn new(db: Database, settings: &Settings, collaborators: Collaborators) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            db,
            collaborators,
            polling: Arc::new(Mutex::new(PollingController::new())),
            snapshots: Arc::new(snapshots),
            config: PollingConfig::from_settings(settings),
            location: settings.location.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot(Utc::now())
    }

    pub async fn running_loops(&self) -> usize {
        self.polling.lock().await.running_loops()
    }

    /// Opens a session for `procedure` and starts polling. A session that is already
    /// running is stopped first and logged as reset.
    pub async fn start_session(&self, procedure: &str) -> Result<SessionSnapshot> {
        let mut polling = self.polling.lock().await;

        if let Some(finished) = self.stop_current(&mut polling, EventStatus::Reset).await? {
            info!("Replacing active session before starting {procedure}");
            self.record_finished(finished).await?;
        }

        let opened = self
            .collaborators
            .catalog
            .open_session(procedure)
            .await
            .with_context(|| format!("failed to open session for {procedure}"))?;

        let started_at = Utc::now();
        let location = self.location.clone().or_else(|| opened.location.clone());
        let event = EmergencyEvent::started(
            opened.session_id.clone(),
            opened.procedure.clone(),
            location.clone(),
            started_at,
            opened.required_items.iter().map(|item| item.name.clone()).collect(),
        );
        let event_id = match self.db.insert_event(&event).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!("Session {} will not be logged: {err:?}", opened.session_id);
                None
            }
        };

        let snapshot = {
            let mut state = self.state.lock().await;
            state.begin(&opened, location, started_at, self.config.staleness_window);
            state.event_id = event_id;
            state.snapshot(started_at)
        };
        self.snapshots.send_replace(snapshot.clone());

        polling.start_polling(PollingContext {
            session_id: opened.session_id.clone(),
            state: self.state.clone(),
            frames: self.collaborators.frames.clone(),
            detector: self.collaborators.detector.clone(),
            db: self.db.clone(),
            snapshots: self.snapshots.clone(),
            config: self.config,
        })?;

        info!(
            "Session {} started for {} ({} required items)",
            opened.session_id,
            opened.procedure,
            opened.required_items.len()
        );

        Ok(snapshot)
    }

    /// Stops polling and clears all detections. Idle controllers are left untouched.
    pub async fn reset_session(&self) -> Result<()> {
        let mut polling = self.polling.lock().await;
        if let Some(finished) = self.stop_current(&mut polling, EventStatus::Reset).await? {
            self.record_finished(finished).await?;
        }
        Ok(())
    }

    /// Stops polling and records the final checklist. Returns the logged event.
    pub async fn end_session(&self) -> Result<EmergencyEvent> {
        let mut polling = self.polling.lock().await;
        let finished = self
            .stop_current(&mut polling, EventStatus::Completed)
            .await?
            .ok_or_else(|| anyhow!("no active session to end"))?;

        let event_id = finished
            .event_id
            .ok_or_else(|| anyhow!("session ended without an event log entry"))?;
        self.record_finished(finished).await?;

        self.db
            .get_event(event_id)
            .await?
            .ok_or_else(|| anyhow!("event {event_id} missing after finalize"))
    }

    /// Stops the loop, captures the final checklist and returns the state to idle.
    async fn stop_current(
        &self,
        polling: &mut PollingController,
        status: EventStatus,
    ) -> Result<Option<FinishedSession>> {
        polling.stop_polling().await?;

        let now = Utc::now();
        let (finished, snapshot) = {
            let mut state = self.state.lock().await;
            if !state.is_active() {
                return Ok(None);
            }

            let report = state.report(now);
            let detections = state
                .fresh_items(now)
                .into_values()
                .map(|item| EquipmentDetection {
                    id: None,
                    event_id: state.event_id.unwrap_or_default(),
                    equipment_name: item.name,
                    confidence: Some(f64::from(item.confidence)),
                    detected_at: item.last_seen_at,
                    detection_count: item.count,
                })
                .collect();
            let finished = FinishedSession {
                event_id: state.event_id,
                outcome: EventOutcome {
                    status,
                    end_time: now,
                    success: status == EventStatus::Completed && report.is_complete(),
                    missing_equipment: report.missing().into_iter().map(String::from).collect(),
                    detected_equipment: report.satisfied().into_iter().map(String::from).collect(),
                    completion_percent: report.completion_percentage,
                    notes: None,
                },
                detections,
            };

            if let Some(session_id) = &state.session_id {
                info!("Session {session_id} stopped as {}", status.as_str());
            }
            state.clear();
            (finished, state.snapshot(now))
        };
        self.snapshots.send_replace(snapshot);

        Ok(Some(finished))
    }

    async fn record_finished(&self, finished: FinishedSession) -> Result<()> {
        let Some(event_id) = finished.event_id else {
            return Ok(());
        };

        self.db
            .finalize_event(event_id, &finished.outcome)
            .await
            .with_context(|| format!("failed to finalize event {event_id}"))?;

        if finished.outcome.status == EventStatus::Completed && !finished.detections.is_empty() {
            self.db
                .insert_detections(event_id, finished.detections)
                .await
                .with_context(|| format!("failed to record detections for event {event_id}"))?;
        }
        Ok(())
    }
}
