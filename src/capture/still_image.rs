use std::path::PathBuf;

use async_trait::async_trait;

use super::{encode_jpeg, Frame, FrameSource};
use crate::log_warn;

const ENABLE_LOGS: bool = true;

/// Re-reads an image file on every capture, so an external process (webcam snapshot
/// tool, OpenMV bridge) can keep overwriting it.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for StillImageSource {
    async fn capture(&self) -> Option<Frame> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                log_warn!("frame file {} is empty", self.path.display());
                return None;
            }
            Err(err) => {
                log_warn!("failed to read frame {}: {err}", self.path.display());
                return None;
            }
        };

        match tokio::task::spawn_blocking(move || encode_jpeg(&raw)).await {
            Ok(Ok(bytes)) => Some(Frame::jpeg(bytes)),
            Ok(Err(err)) => {
                log_warn!("frame {} unusable: {err:#}", self.path.display());
                None
            }
            Err(err) => {
                log_warn!("frame encoder worker join failed: {err}");
                None
            }
        }
    }
}
