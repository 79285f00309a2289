mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{
    EmergencyEvent, EquipmentDetection, EventAnalytics, EventOutcome, EventStatus, EventTypeCount,
};
