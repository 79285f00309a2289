//! Detection capability used by the polling loop.
//!
//! The loop never knows whether detections come from the HTTP backend or from the
//! seeded simulator; it only sees [`DetectionSource`].

mod live;
mod simulated;

pub use live::LiveDetectionSource;
pub use simulated::SimulatedDetectionSource;

use std::sync::Arc;

use async_trait::async_trait;

use crate::capture::Frame;
use crate::error::RoundError;
use crate::models::{DetectedItem, RequiredItem};

/// Everything a source may need for one round.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub session_id: String,
    pub frame: Frame,
    pub required_items: Arc<[RequiredItem]>,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionRound {
    pub items: Vec<DetectedItem>,
    pub objects_found: u32,
    pub bounding_boxes: Vec<serde_json::Value>,
}

#[async_trait]
pub trait DetectionSource: Send + Sync {
    async fn detect(&self, request: DetectionRequest) -> Result<DetectionRound, RoundError>;
}
