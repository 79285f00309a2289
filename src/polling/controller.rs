use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{polling_loop, LoopGuard, PollingContext};

/// Owns the one polling loop a session may have.
pub struct PollingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    running: Arc<AtomicUsize>,
}

impl PollingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loop tasks currently alive, including any still winding down.
    pub fn running_loops(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start_polling(&mut self, ctx: PollingContext) -> Result<()> {
        if self.handle.is_some() {
            bail!("polling already active");
        }

        info!("Starting polling loop for session {}", ctx.session_id);

        let cancel_token = CancellationToken::new();
        let guard = LoopGuard::enter(self.running.clone());
        let handle = tokio::spawn(polling_loop(ctx, cancel_token.clone(), guard));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for it, and any round it had in flight, to finish.
    pub async fn stop_polling(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("polling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for PollingController {
    fn default() -> Self {
        Self::new()
    }
}
