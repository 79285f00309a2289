use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{DetectionRequest, DetectionRound, DetectionSource};
use crate::error::RoundError;
use crate::log_debug;
use crate::models::DetectedItem;

const ENABLE_LOGS: bool = true;

const MAX_DETECTIONS_PER_ROUND: usize = 3;
const CONFIDENCE_JITTER: f32 = 0.1;
/// Sampled confidence sits this far above each item's threshold before jitter.
const CONFIDENCE_MARGIN: f32 = 0.1;

/// Pretends to see one to three of the session's required items each round.
///
/// With a fixed seed the sequence of rounds is reproducible, which is what the
/// driver tests rely on.
#[derive(Debug)]
pub struct SimulatedDetectionSource {
    rng: Mutex<StdRng>,
}

impl SimulatedDetectionSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl DetectionSource for SimulatedDetectionSource {
    async fn detect(&self, request: DetectionRequest) -> Result<DetectionRound, RoundError> {
        let required = &request.required_items;
        if required.is_empty() {
            return Ok(DetectionRound::default());
        }

        let seen_at = Utc::now();
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let wanted = rng.gen_range(1..=MAX_DETECTIONS_PER_ROUND).min(required.len());
        let picked: Vec<_> = required.choose_multiple(&mut *rng, wanted).collect();

        let items: Vec<DetectedItem> = picked
            .into_iter()
            .map(|item| {
                let base = (item.confidence_threshold + CONFIDENCE_MARGIN).min(1.0);
                let jitter = rng.gen_range(-CONFIDENCE_JITTER..=CONFIDENCE_JITTER);
                DetectedItem::new(item.name.clone(), base + jitter, 1, seen_at)
            })
            .collect();

        log_debug!(
            "simulated round for session {}: {:?}",
            request.session_id,
            items.iter().map(|item| item.name.as_str()).collect::<Vec<_>>()
        );

        Ok(DetectionRound {
            objects_found: items.len() as u32,
            items,
            bounding_boxes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use crate::protocols;

    fn request() -> DetectionRequest {
        DetectionRequest {
            session_id: "sim".into(),
            frame: Frame::png(Vec::new()),
            required_items: protocols::required_equipment("Code Blue").into(),
        }
    }

    fn names(round: &DetectionRound) -> Vec<String> {
        round.items.iter().map(|item| item.name.clone()).collect()
    }

    #[tokio::test]
    async fn same_seed_same_rounds() {
        let first = SimulatedDetectionSource::new(Some(7));
        let second = SimulatedDetectionSource::new(Some(7));

        for _ in 0..5 {
            let a = first.detect(request()).await.unwrap();
            let b = second.detect(request()).await.unwrap();
            assert_eq!(names(&a), names(&b));
        }
    }

    #[tokio::test]
    async fn rounds_pick_one_to_three_required_items() {
        let source = SimulatedDetectionSource::new(Some(42));
        let required: Vec<String> = protocols::equipment_names("Code Blue")
            .into_iter()
            .map(String::from)
            .collect();

        for _ in 0..50 {
            let round = source.detect(request()).await.unwrap();
            assert!((1..=3).contains(&round.items.len()));
            assert_eq!(round.objects_found as usize, round.items.len());
            for item in &round.items {
                assert!(required.contains(&item.name));
                assert!((0.0..=1.0).contains(&item.confidence));
            }
        }
    }

    #[tokio::test]
    async fn nothing_required_nothing_seen() {
        let source = SimulatedDetectionSource::new(Some(1));
        let mut req = request();
        req.required_items = Vec::<crate::models::RequiredItem>::new().into();
        assert!(source.detect(req).await.unwrap().items.is_empty());
    }
}
