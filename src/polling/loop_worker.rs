use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::FrameSource,
    db::Database,
    detection::{DetectionRequest, DetectionSource},
    error::RoundError,
    session::{SessionSnapshot, SessionState},
    settings::{MergePolicy, Settings},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Loop tuning taken from settings when the session starts.
#[derive(Debug, Clone, Copy)]
pub struct PollingConfig {
    pub interval: Duration,
    pub round_timeout: Duration,
    pub merge_policy: MergePolicy,
    pub staleness_window: chrono::Duration,
    pub min_confidence: f32,
    pub heartbeat_every: u32,
}

impl PollingConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval(),
            round_timeout: settings.round_timeout(),
            merge_policy: settings.merge_policy,
            staleness_window: settings.staleness_window(),
            min_confidence: settings.min_confidence,
            heartbeat_every: settings.heartbeat_every(),
        }
    }
}

/// Everything one polling loop (and the rounds it spawns) shares.
#[derive(Clone)]
pub struct PollingContext {
    pub session_id: String,
    pub state: Arc<Mutex<SessionState>>,
    pub frames: Arc<dyn FrameSource>,
    pub detector: Arc<dyn DetectionSource>,
    pub db: Database,
    pub snapshots: Arc<watch::Sender<SessionSnapshot>>,
    pub config: PollingConfig,
}

impl PollingContext {
    fn publish(&self, snapshot: SessionSnapshot) {
        self.snapshots.send_replace(snapshot);
    }
}

/// Counts a loop as live from spawn until its future is dropped.
pub struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    pub fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub async fn polling_loop(
    ctx: PollingContext,
    cancel_token: CancellationToken,
    _guard: LoopGuard,
) {
    let mut ticker = time::interval(ctx.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut ticks: u32 = 0;
    let mut overdue_logged = false;

    log_info!(
        "polling started for session {} every {}ms",
        ctx.session_id,
        ctx.config.interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks = ticks.wrapping_add(1);

                if !housekeeping(&ctx, &mut overdue_logged).await {
                    log_debug!("session {} no longer active; polling loop exiting", ctx.session_id);
                    break;
                }

                let busy = in_flight.as_ref().map_or(false, |handle| !handle.is_finished());
                if busy {
                    log_debug!("previous round still in flight for session {}; skipping tick", ctx.session_id);
                } else {
                    in_flight = Some(tokio::spawn(run_round(ctx.clone())));
                }

                if ticks % ctx.config.heartbeat_every.max(1) == 0 {
                    spawn_heartbeat(&ctx).await;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("polling loop for session {} shutting down", ctx.session_id);
                break;
            }
        }
    }

    if let Some(handle) = in_flight.take() {
        handle.abort();
        let _ = handle.await;
    }
}

/// Purges stale detections and flags the deadline. Returns false once the loop's
/// session is gone.
async fn housekeeping(ctx: &PollingContext, overdue_logged: &mut bool) -> bool {
    let now = Utc::now();
    let mut state = ctx.state.lock().await;
    if !state.is_current(&ctx.session_id) {
        return false;
    }

    let removed = state.purge_stale(now);
    let mut changed = removed > 0;
    if removed > 0 {
        log_debug!("purged {} stale detections for session {}", removed, ctx.session_id);
    }

    if !*overdue_logged {
        let report = state.report(now);
        if state.is_overdue(&report, now) {
            log_warn!(
                "session {} passed its verification window; still missing: {}",
                ctx.session_id,
                report.missing().join(", ")
            );
            *overdue_logged = true;
            changed = true;
        }
    }

    if changed {
        ctx.publish(state.snapshot(now));
    }
    true
}

async fn spawn_heartbeat(ctx: &PollingContext) {
    let (event_id, report) = {
        let state = ctx.state.lock().await;
        (state.event_id, state.report(Utc::now()))
    };
    let Some(event_id) = event_id else {
        return;
    };

    let db = ctx.db.clone();
    let missing: Vec<String> = report.missing().into_iter().map(String::from).collect();
    let detected: Vec<String> = report.satisfied().into_iter().map(String::from).collect();
    tokio::spawn(async move {
        if let Err(err) = db
            .update_event_progress(event_id, report.completion_percentage, missing, detected, Utc::now())
            .await
        {
            log_error!("failed to record progress for event {}: {err:?}", event_id);
        }
    });
}

async fn run_round(ctx: PollingContext) {
    let timeout = ctx.config.round_timeout;
    let result = match time::timeout(timeout, perform_round(&ctx)).await {
        Ok(result) => result,
        Err(_) => Err(RoundError::TimedOut {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        }),
    };

    match result {
        Ok(applied) => {
            log_debug!("round applied {} detections for session {}", applied, ctx.session_id)
        }
        Err(err @ RoundError::SessionMismatch { .. }) => log_debug!("{err}"),
        Err(err) => log_warn!("detection round dropped for session {}: {err}", ctx.session_id),
    }
}

async fn perform_round(ctx: &PollingContext) -> Result<usize, RoundError> {
    let required_items = {
        let state = ctx.state.lock().await;
        if !state.is_current(&ctx.session_id) {
            return Err(RoundError::SessionMismatch {
                round_session: ctx.session_id.clone(),
                current: state.session_id.clone(),
            });
        }
        state.required_items.clone()
    };

    let frame = ctx
        .frames
        .capture()
        .await
        .ok_or(RoundError::CaptureUnavailable)?;

    let round = ctx
        .detector
        .detect(DetectionRequest {
            session_id: ctx.session_id.clone(),
            frame,
            required_items,
        })
        .await?;

    let min_confidence = ctx.config.min_confidence;
    let items: Vec<_> = round
        .items
        .into_iter()
        .filter(|item| item.confidence >= min_confidence)
        .collect();
    let applied = items.len();

    let now = Utc::now();
    let snapshot = {
        let mut state = ctx.state.lock().await;
        state.apply_round(&ctx.session_id, items, ctx.config.merge_policy, now)?;
        state.snapshot(now)
    };
    ctx.publish(snapshot);

    Ok(applied)
}
