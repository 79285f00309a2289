use async_trait::async_trait;
use chrono::Utc;

use super::{DetectionRequest, DetectionRound, DetectionSource};
use crate::backend::BackendClient;
use crate::error::RoundError;
use crate::models::DetectedItem;

/// Sends frames to the backend's `/detect` endpoint.
///
/// The backend reports counts only, so every reported tool gets confidence 1.0.
#[derive(Debug, Clone)]
pub struct LiveDetectionSource {
    client: BackendClient,
}

impl LiveDetectionSource {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DetectionSource for LiveDetectionSource {
    async fn detect(&self, request: DetectionRequest) -> Result<DetectionRound, RoundError> {
        let response = self
            .client
            .detect(&request.session_id, &request.frame)
            .await?;
        let seen_at = Utc::now();

        Ok(DetectionRound {
            items: response
                .detected_tools
                .into_iter()
                .map(|(name, count)| DetectedItem::new(name, 1.0, count, seen_at))
                .collect(),
            objects_found: response.objects_found,
            bounding_boxes: response.bounding_boxes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use httpmock::prelude::*;
    use std::time::Duration;

    #[tokio::test]
    async fn backend_counts_become_detected_items() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/detect");
                then.status(200)
                    .body(r#"{"detected_tools":{"aed":1,"oxygen":2},"objects_found":3}"#);
            })
            .await;

        let client = BackendClient::new(server.base_url(), Duration::from_secs(5)).unwrap();
        let round = LiveDetectionSource::new(client)
            .detect(DetectionRequest {
                session_id: "s-1".into(),
                frame: Frame::jpeg(vec![1, 2, 3]),
                required_items: Vec::<crate::models::RequiredItem>::new().into(),
            })
            .await
            .unwrap();

        assert_eq!(round.objects_found, 3);
        assert_eq!(round.items.len(), 2);
        assert_eq!(round.items[0].name, "aed");
        assert_eq!(round.items[1].count, 2);
        assert!(round.items.iter().all(|item| item.confidence == 1.0));
    }
}
