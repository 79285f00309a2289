pub mod equipment;

pub use equipment::{DetectedItem, Priority, RequiredItem};
