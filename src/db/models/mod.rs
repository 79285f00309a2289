pub mod event;

pub use event::{
    EmergencyEvent, EquipmentDetection, EventAnalytics, EventOutcome, EventStatus, EventTypeCount,
};
