use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{DetectedItem, Priority, RequiredItem};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    Satisfied,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistEntry {
    pub name: String,
    pub priority: Priority,
    pub status: ItemStatus,
    /// Detected name that satisfied this entry.
    pub matched_by: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistReport {
    pub entries: Vec<ChecklistEntry>,
    pub satisfied_count: usize,
    pub total_required: usize,
    pub completion_percentage: u8,
    /// Detected names that satisfied no required item.
    pub extras: Vec<String>,
}

impl ChecklistReport {
    pub fn missing(&self) -> Vec<&str> {
        self.names_with(ItemStatus::Missing)
    }

    pub fn satisfied(&self) -> Vec<&str> {
        self.names_with(ItemStatus::Satisfied)
    }

    pub fn is_complete(&self) -> bool {
        self.total_required > 0 && self.satisfied_count == self.total_required
    }

    fn names_with(&self, status: ItemStatus) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.name.as_str())
            .collect()
    }
}

/// Either-direction, case-insensitive substring containment. Blank names never match.
///
/// Deliberately naive: no edit distance or token overlap, so "epi" matches "epinephrine"
/// and also anything else containing those three letters.
pub fn names_overlap(lhs: &str, rhs: &str) -> bool {
    let lhs = lhs.trim().to_lowercase();
    let rhs = rhs.trim().to_lowercase();
    if lhs.is_empty() || rhs.is_empty() {
        return false;
    }
    lhs.contains(&rhs) || rhs.contains(&lhs)
}

fn satisfies(required: &RequiredItem, detected_name: &str) -> bool {
    names_overlap(&required.name, detected_name)
        || required
            .keywords
            .iter()
            .any(|keyword| names_overlap(keyword, detected_name))
}

pub fn completion_percentage(satisfied: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (100.0 * satisfied as f64 / total as f64).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Checks every required item against the detected set.
///
/// Detected items are scanned in key order and the first one that matches wins.
/// Duplicate required names are evaluated independently by position.
pub fn evaluate(
    required: &[RequiredItem],
    detected: &BTreeMap<String, DetectedItem>,
) -> ChecklistReport {
    let entries: Vec<ChecklistEntry> = required
        .iter()
        .map(|item| {
            let found = detected
                .values()
                .find(|candidate| satisfies(item, &candidate.name));

            match found {
                Some(candidate) => ChecklistEntry {
                    name: item.name.clone(),
                    priority: item.priority,
                    status: ItemStatus::Satisfied,
                    matched_by: Some(candidate.name.clone()),
                    confidence: Some(candidate.confidence),
                },
                None => ChecklistEntry {
                    name: item.name.clone(),
                    priority: item.priority,
                    status: ItemStatus::Missing,
                    matched_by: None,
                    confidence: None,
                },
            }
        })
        .collect();

    let extras = detected
        .values()
        .filter(|candidate| !required.iter().any(|item| satisfies(item, &candidate.name)))
        .map(|candidate| candidate.name.clone())
        .collect();

    let satisfied_count = entries
        .iter()
        .filter(|entry| entry.status == ItemStatus::Satisfied)
        .count();
    let total_required = entries.len();

    ChecklistReport {
        completion_percentage: completion_percentage(satisfied_count, total_required),
        entries,
        satisfied_count,
        total_required,
        extras,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn detected(names: &[(&str, u32)]) -> BTreeMap<String, DetectedItem> {
        let now = Utc::now();
        names
            .iter()
            .map(|(name, count)| (name.to_string(), DetectedItem::new(*name, 0.9, *count, now)))
            .collect()
    }

    #[test]
    fn aed_and_epinephrine_scenario_is_half_complete() {
        let required = vec![RequiredItem::named("AED"), RequiredItem::named("Epinephrine")];
        let report = evaluate(&required, &detected(&[("aed", 1)]));

        assert_eq!(report.entries[0].status, ItemStatus::Satisfied);
        assert_eq!(report.entries[0].matched_by.as_deref(), Some("aed"));
        assert_eq!(report.entries[1].status, ItemStatus::Missing);
        assert_eq!(report.completion_percentage, 50);
        assert_eq!(report.missing(), vec!["Epinephrine"]);
        assert!(!report.is_complete());
    }

    #[test]
    fn no_required_items_means_zero_percent() {
        let report = evaluate(&[], &detected(&[("x", 5)]));
        assert_eq!(report.completion_percentage, 0);
        assert_eq!(report.total_required, 0);
        assert!(!report.is_complete());
        assert_eq!(report.extras, vec!["x"]);
    }

    #[test]
    fn empty_detection_leaves_everything_missing() {
        let required = crate::protocols::required_equipment("Code Blue");
        let report = evaluate(&required, &BTreeMap::new());
        assert_eq!(report.completion_percentage, 0);
        assert!(report
            .entries
            .iter()
            .all(|entry| entry.status == ItemStatus::Missing));
    }

    #[test]
    fn verbatim_names_in_any_case_complete_the_checklist() {
        let required = vec![
            RequiredItem::named("Crash Cart"),
            RequiredItem::named("Oxygen Tank"),
            RequiredItem::named("AED"),
        ];
        let report = evaluate(
            &required,
            &detected(&[("CRASH CART", 1), ("oxygen tank", 2), ("Aed", 1)]),
        );
        assert_eq!(report.completion_percentage, 100);
        assert!(report.is_complete());
        assert!(report.extras.is_empty());
    }

    #[test]
    fn substring_matches_in_both_directions() {
        let required = vec![RequiredItem::named("Oxygen Tank")];
        assert!(evaluate(&required, &detected(&[("oxygen", 1)])).is_complete());

        let required = vec![RequiredItem::named("oxygen")];
        assert!(evaluate(&required, &detected(&[("Oxygen Tank", 1)])).is_complete());
    }

    #[test]
    fn keywords_satisfy_items() {
        let required = vec![RequiredItem::named("AED").with_keywords(["defibrillator"])];
        let report = evaluate(&required, &detected(&[("Defibrillator pads", 1)]));
        assert_eq!(report.entries[0].matched_by.as_deref(), Some("Defibrillator pads"));
    }

    #[test]
    fn duplicate_required_names_count_separately() {
        let required = vec![
            RequiredItem::named("Gauze"),
            RequiredItem::named("Gauze"),
            RequiredItem::named("Scalpel"),
        ];
        let report = evaluate(&required, &detected(&[("gauze", 3)]));
        assert_eq!(report.total_required, 3);
        assert_eq!(report.satisfied_count, 2);
        assert_eq!(report.completion_percentage, 67);
    }

    #[test]
    fn first_match_in_key_order_wins() {
        let required = vec![RequiredItem::named("Tank")];
        let report = evaluate(&required, &detected(&[("oxygen tank", 1), ("air tank", 1)]));
        assert_eq!(report.entries[0].matched_by.as_deref(), Some("air tank"));
    }

    #[test]
    fn blank_names_never_match() {
        assert!(!names_overlap("", "AED"));
        assert!(!names_overlap("AED", "   "));
        let required = vec![RequiredItem::named("AED").with_keywords([""])];
        assert_eq!(
            evaluate(&required, &detected(&[("syringe", 1)])).completion_percentage,
            0
        );
    }

    #[test]
    fn completion_stays_in_range() {
        for total in 0..12 {
            for satisfied in 0..=total {
                let percent = completion_percentage(satisfied, total);
                assert!(percent <= 100);
            }
        }
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(3, 3), 100);
    }
}
