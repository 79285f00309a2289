//! Emergency protocol table and lookups.
//!
//! Each protocol names the equipment staff must assemble, the keywords a detector
//! may use for each item, and how long the team has before the check is overdue.

pub mod table;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::RequiredItem;

pub use table::{EquipmentSpec, ProtocolSpec, DEFAULT_CONFIDENCE, DEFAULT_TIMEOUT_SECS, PROTOCOLS};

impl From<&EquipmentSpec> for RequiredItem {
    fn from(spec: &EquipmentSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            description: Some(spec.description.to_string()),
            keywords: spec.keywords.iter().map(|k| k.to_string()).collect(),
            priority: spec.priority,
            confidence_threshold: spec.confidence,
        }
    }
}

/// Case-sensitive lookup by protocol code, e.g. `"Code Blue"`.
pub fn protocol_by_type(code: &str) -> Option<&'static ProtocolSpec> {
    PROTOCOLS.iter().find(|protocol| protocol.code == code)
}

/// Required equipment for a protocol; empty for unknown codes.
pub fn required_equipment(code: &str) -> Vec<RequiredItem> {
    protocol_by_type(code)
        .map(|protocol| protocol.equipment.iter().map(RequiredItem::from).collect())
        .unwrap_or_default()
}

pub fn equipment_names(code: &str) -> Vec<&'static str> {
    protocol_by_type(code)
        .map(|protocol| protocol.equipment.iter().map(|item| item.name).collect())
        .unwrap_or_default()
}

pub fn timeout_secs(code: &str) -> u64 {
    protocol_by_type(code)
        .map(|protocol| protocol.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn find_equipment(name: &str) -> Option<&'static EquipmentSpec> {
    PROTOCOLS
        .iter()
        .flat_map(|protocol| protocol.equipment.iter())
        .find(|item| item.name.eq_ignore_ascii_case(name))
}

/// Keywords for an equipment name in any protocol (case-insensitive), first protocol wins.
pub fn detection_keywords(name: &str) -> Vec<String> {
    find_equipment(name)
        .map(|item| item.keywords.iter().map(|k| k.to_string()).collect())
        .unwrap_or_default()
}

pub fn equipment_confidence(name: &str) -> f32 {
    find_equipment(name)
        .map(|item| item.confidence)
        .unwrap_or(DEFAULT_CONFIDENCE)
}

/// Builds a required item for a bare tool name, borrowing keywords, priority and
/// threshold from the table when the name is known.
pub fn required_item_for_tool(name: &str) -> RequiredItem {
    match find_equipment(name) {
        Some(spec) => {
            let mut item = RequiredItem::from(spec);
            item.name = name.to_string();
            item
        }
        None => RequiredItem::named(name),
    }
}

/// A session as handed out by a [`ProcedureCatalog`].
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub session_id: String,
    pub procedure: String,
    pub required_items: Arc<[RequiredItem]>,
    pub location: Option<String>,
    pub timeout_secs: u64,
}

/// Source of session ids and required-equipment checklists.
#[async_trait]
pub trait ProcedureCatalog: Send + Sync {
    async fn open_session(&self, procedure: &str) -> Result<OpenedSession>;
}

/// Opens sessions from the built-in protocol table.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolTable;

#[async_trait]
impl ProcedureCatalog for ProtocolTable {
    async fn open_session(&self, procedure: &str) -> Result<OpenedSession> {
        let protocol =
            protocol_by_type(procedure).ok_or_else(|| anyhow!("unknown procedure '{procedure}'"))?;

        Ok(OpenedSession {
            session_id: Uuid::new_v4().to_string(),
            procedure: protocol.code.to_string(),
            required_items: protocol.equipment.iter().map(RequiredItem::from).collect(),
            location: Some(protocol.location.to_string()),
            timeout_secs: protocol.timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[test]
    fn code_blue_lists_five_critical_items() {
        let items = required_equipment("Code Blue");
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|item| item.priority == Priority::Critical));
        assert_eq!(items[0].name, "AED");
        assert_eq!(items[0].keywords, vec!["aed", "defibrillator", "defib"]);
    }

    #[test]
    fn unknown_protocol_has_no_equipment_and_default_timeout() {
        assert!(required_equipment("Code Green").is_empty());
        assert!(equipment_names("Code Green").is_empty());
        assert_eq!(timeout_secs("Code Green"), DEFAULT_TIMEOUT_SECS);
        assert_eq!(timeout_secs("Code Red"), 60);
    }

    #[test]
    fn keyword_and_confidence_lookup_ignores_case() {
        assert_eq!(detection_keywords("oxygen tank").len(), 3);
        assert_eq!(equipment_confidence("EPINEPHRINE"), 0.6);
        assert_eq!(equipment_confidence("stethoscope"), DEFAULT_CONFIDENCE);
        assert!(detection_keywords("stethoscope").is_empty());
    }

    #[test]
    fn tool_names_borrow_table_metadata() {
        let known = required_item_for_tool("aed");
        assert_eq!(known.name, "aed");
        assert_eq!(known.confidence_threshold, 0.8);
        assert!(!known.keywords.is_empty());

        let unknown = required_item_for_tool("ambu_bag");
        assert_eq!(unknown.priority, Priority::Normal);
        assert!(unknown.keywords.is_empty());
    }

    #[tokio::test]
    async fn protocol_table_opens_sessions_with_fresh_ids() {
        let first = ProtocolTable.open_session("Code Pink").await.unwrap();
        let second = ProtocolTable.open_session("Code Pink").await.unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(first.required_items.len(), 3);
        assert_eq!(first.timeout_secs, 45);
        assert_eq!(first.location.as_deref(), Some("Hospital"));

        assert!(ProtocolTable.open_session("Code Green").await.is_err());
    }
}
