// ==============================================================================
// aggregates.rs - Aggregate & Conflict Analyzer
// ==============================================================================
// Description: Per-variant cardinalities, pathogenic-condition coverage and the
//              condition conflict / duplication detectors
// Author: Matt Barham
// Created: 2026-01-24
// Modified: 2026-10-16
// Version: 1.1.1
// ==============================================================================

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::models::{
    ConflictPayload, DuplicationPayload, SubmissionRecord, VariantAggregates, VariantKey,
};

/// Submission term counted towards pathogenic-condition coverage
const TERM_PATHOGENIC: &str = "Pathogenic";

impl VariantAggregates {
    /// Fold in the consensus label: a variant called "Pathogenic" counts as
    /// pathogenic for all of its conditions
    pub fn with_consensus(mut self, label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case(TERM_PATHOGENIC) {
            self.pathogenic_all_conditions = true;
        }
        self
    }
}

/// Compute aggregates for every variant in the relation
///
/// All rows take part, including "no assertion provided" submissions that the
/// classifier ignores.
///
/// # Arguments
/// * `records` - The flat submission relation
///
/// # Returns
/// Aggregates keyed by variant; variants without conflicts or duplications
/// carry `false` flags and no payload
pub fn compute_aggregates(records: &[SubmissionRecord]) -> BTreeMap<VariantKey, VariantAggregates> {
    // (term, accession, condition) per variant, de-duplicated
    let mut rows: BTreeMap<&VariantKey, BTreeSet<(&str, &str, Option<&str>)>> = BTreeMap::new();
    for record in records {
        rows.entry(&record.variant).or_default().insert((
            record.significance.as_str(),
            record.accession.as_str(),
            record.condition.as_deref(),
        ));
    }

    let mut conflicts = detect_condition_conflicts(records);
    let mut duplicates = detect_condition_duplicates(records);

    let mut aggregates = BTreeMap::new();
    for (variant, rows) in rows {
        let conditions: BTreeSet<&str> = rows.iter().filter_map(|&(_, _, condition)| condition).collect();
        let accessions: BTreeSet<&str> = rows.iter().map(|&(_, accession, _)| accession).collect();
        let terms: BTreeSet<&str> = rows.iter().map(|&(term, _, _)| term).collect();
        let pathogenic: BTreeSet<&str> = rows
            .iter()
            .filter(|&&(term, _, _)| term == TERM_PATHOGENIC)
            .filter_map(|&(_, _, condition)| condition)
            .collect();

        let condition_count = conditions.len();
        let pathogenic_condition_count = pathogenic.len();
        let pathogenic_condition_fraction = if condition_count > 0 {
            Some(pathogenic_condition_count as f64 / condition_count as f64)
        } else {
            None
        };

        let conflict = conflicts.remove(variant);
        let duplicated = duplicates.remove(variant);

        aggregates.insert(
            variant.clone(),
            VariantAggregates {
                condition_count,
                accession_count: accessions.len(),
                significance_count: terms.len(),
                pathogenic_condition_count,
                pathogenic_condition_fraction,
                pathogenic_conditions: pathogenic.iter().map(|c| c.to_string()).collect(),
                multi_accession: accessions.len() > 1,
                multi_condition: condition_count > 1,
                multi_significance: terms.len() > 1,
                pathogenic_all_conditions: condition_count > 0
                    && pathogenic_condition_count == condition_count,
                pathogenic_any_condition: pathogenic_condition_count > 0,
                condition_conflict: conflict.is_some(),
                condition_conflict_detail: conflict,
                condition_duplicated: duplicated.is_some(),
                condition_duplicated_detail: duplicated,
            },
        );
    }

    info!(
        "Computed aggregates for {} variants ({} with condition conflicts, {} with duplicated conditions)",
        aggregates.len(),
        aggregates.values().filter(|a| a.condition_conflict).count(),
        aggregates.values().filter(|a| a.condition_duplicated).count()
    );
    aggregates
}

/// Conditions classified differently across submissions.
///
/// For every (variant, condition) with more than one distinct term, records
/// `{condition -> {term -> ", "-joined sorted accessions}}`. Rows without a
/// condition never conflict.
pub fn detect_condition_conflicts(records: &[SubmissionRecord]) -> BTreeMap<VariantKey, ConflictPayload> {
    let mut grouped: BTreeMap<&VariantKey, BTreeMap<&str, BTreeMap<&str, BTreeSet<&str>>>> = BTreeMap::new();
    for record in records {
        let Some(condition) = record.condition.as_deref() else {
            continue;
        };
        grouped
            .entry(&record.variant)
            .or_default()
            .entry(condition)
            .or_default()
            .entry(record.significance.as_str())
            .or_default()
            .insert(record.accession.as_str());
    }

    let mut flagged = BTreeMap::new();
    for (variant, conditions) in grouped {
        let payload: ConflictPayload = conditions
            .into_iter()
            .filter(|(_, terms)| terms.len() > 1)
            .map(|(condition, terms)| {
                let terms = terms
                    .into_iter()
                    .map(|(term, accessions)| {
                        (term.to_string(), accessions.into_iter().collect::<Vec<_>>().join(", "))
                    })
                    .collect();
                (condition.to_string(), terms)
            })
            .collect();

        if !payload.is_empty() {
            debug!("{}: conflicting terms for {} conditions", variant, payload.len());
            flagged.insert(variant.clone(), payload);
        }
    }
    flagged
}

/// Conditions reported redundantly under several accessions.
///
/// For every (variant, condition) merges `{accession -> RCV-level condition
/// label}` across accessions; more than one accession flags the condition.
/// Rows missing a condition or an RCV-level label are skipped.
pub fn detect_condition_duplicates(records: &[SubmissionRecord]) -> BTreeMap<VariantKey, DuplicationPayload> {
    let mut grouped: BTreeMap<&VariantKey, BTreeMap<&str, BTreeMap<&str, &str>>> = BTreeMap::new();
    for record in records {
        let (Some(condition), Some(label)) = (record.condition.as_deref(), record.rcv_condition.as_deref()) else {
            continue;
        };
        grouped
            .entry(&record.variant)
            .or_default()
            .entry(condition)
            .or_default()
            .insert(record.accession.as_str(), label);
    }

    let mut flagged = BTreeMap::new();
    for (variant, conditions) in grouped {
        let payload: DuplicationPayload = conditions
            .into_iter()
            .filter(|(_, accessions)| accessions.len() > 1)
            .map(|(condition, accessions)| {
                let accessions = accessions
                    .into_iter()
                    .map(|(accession, label)| (accession.to_string(), label.to_string()))
                    .collect();
                (condition.to_string(), accessions)
            })
            .collect();

        if !payload.is_empty() {
            debug!("{}: {} conditions reported under several accessions", variant, payload.len());
            flagged.insert(variant.clone(), payload);
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::record;
    use crate::models::ReviewStatus;

    fn key(s: &str) -> VariantKey {
        VariantKey::new(s)
    }

    #[test]
    fn test_condition_conflict_payload() {
        let records = vec![
            record("X", "RCV1", "Pathogenic").condition(Some("disease A")).build(),
            record("X", "RCV2", "Benign").condition(Some("disease A")).build(),
        ];
        let aggregates = compute_aggregates(&records);
        let x = &aggregates[&key("X")];

        assert!(x.condition_conflict);
        let expected: ConflictPayload = BTreeMap::from([(
            "disease A".to_string(),
            BTreeMap::from([
                ("Pathogenic".to_string(), "RCV1".to_string()),
                ("Benign".to_string(), "RCV2".to_string()),
            ]),
        )]);
        assert_eq!(x.condition_conflict_detail, Some(expected));
    }

    #[test]
    fn test_conflict_accessions_sorted_and_joined() {
        let records = vec![
            record("X", "RCV3", "Pathogenic").build(),
            record("X", "RCV1", "Pathogenic").build(),
            record("X", "RCV2", "Likely pathogenic").build(),
            record("X", "RCV4", "Benign").condition(Some("disease B")).build(),
        ];
        let conflicts = detect_condition_conflicts(&records);
        let payload = &conflicts[&key("X")];
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["disease A"]["Pathogenic"], "RCV1, RCV3");
        assert_eq!(payload["disease A"]["Likely pathogenic"], "RCV2");
    }

    #[test]
    fn test_condition_duplicated_payload() {
        let records = vec![
            record("X", "RCV1", "Pathogenic")
                .condition(Some("disease A"))
                .rcv_condition("disease A; disease B")
                .build(),
            record("X", "RCV1", "Pathogenic")
                .condition(Some("disease B"))
                .rcv_condition("disease A; disease B")
                .build(),
            record("X", "RCV2", "Pathogenic").condition(Some("disease A")).build(),
        ];
        let aggregates = compute_aggregates(&records);
        let x = &aggregates[&key("X")];

        assert!(x.condition_duplicated);
        let detail = x.condition_duplicated_detail.as_ref().unwrap();
        assert_eq!(detail.len(), 1);
        assert_eq!(detail["disease A"]["RCV1"], "disease A; disease B");
        assert_eq!(detail["disease A"]["RCV2"], "disease A");
        assert!(!x.condition_conflict);
    }

    #[test]
    fn test_cardinalities_and_coverage() {
        let records = vec![
            record("v1", "RCV1", "Pathogenic").condition(Some("disease A")).build(),
            record("v1", "RCV1", "Pathogenic").condition(Some("disease B")).build(),
            record("v1", "RCV2", "Benign").condition(Some("disease C")).build(),
            record("v1", "RCV3", "risk factor").condition(None).build(),
            record("v1", "RCV3", "risk factor").condition(None).build(),
        ];
        let aggregates = compute_aggregates(&records);
        let v1 = &aggregates[&key("v1")];

        assert_eq!(v1.condition_count, 3);
        assert_eq!(v1.accession_count, 3);
        assert_eq!(v1.significance_count, 3);
        assert_eq!(v1.pathogenic_condition_count, 2);
        assert_eq!(v1.pathogenic_conditions, vec!["disease A", "disease B"]);
        let fraction = v1.pathogenic_condition_fraction.unwrap();
        assert!((fraction - 2.0 / 3.0).abs() < 1e-9);
        assert!(v1.multi_accession && v1.multi_condition && v1.multi_significance);
        assert!(v1.pathogenic_any_condition);
        assert!(!v1.pathogenic_all_conditions);
        assert!(!v1.condition_conflict);
        assert_eq!(v1.condition_conflict_detail, None);
    }

    #[test]
    fn test_all_conditions_pathogenic() {
        let records = vec![
            record("v1", "RCV1", "Pathogenic").condition(Some("disease A")).build(),
            record("v1", "RCV2", "Pathogenic").condition(Some("disease B")).build(),
        ];
        let v1 = compute_aggregates(&records).remove(&key("v1")).unwrap();
        assert!(v1.pathogenic_all_conditions);
        assert_eq!(v1.pathogenic_condition_fraction, Some(1.0));
    }

    #[test]
    fn test_no_conditions() {
        let records = vec![record("v1", "RCV1", "Pathogenic").condition(None).build()];
        let v1 = compute_aggregates(&records).remove(&key("v1")).unwrap();
        assert_eq!(v1.condition_count, 0);
        assert_eq!(v1.pathogenic_condition_fraction, None);
        assert!(!v1.pathogenic_all_conditions);
        assert!(!v1.pathogenic_any_condition);
        assert!(!v1.condition_duplicated);
    }

    #[test]
    fn test_no_conditions_all_flag_needs_pathogenic_consensus() {
        let records = vec![record("v1", "RCV1", "Benign").condition(None).build()];
        let v1 = compute_aggregates(&records).remove(&key("v1")).unwrap();
        assert!(!v1.clone().with_consensus("Benign").pathogenic_all_conditions);
        assert!(v1.with_consensus("Pathogenic").pathogenic_all_conditions);
    }

    #[test]
    fn test_consensus_pathogenic_sets_all_conditions_flag() {
        let records = vec![
            record("v1", "RCV1", "Pathogenic").condition(Some("disease A")).build(),
            record("v1", "RCV2", "Likely pathogenic").condition(Some("disease B")).build(),
        ];
        let v1 = compute_aggregates(&records).remove(&key("v1")).unwrap();
        assert!(!v1.pathogenic_all_conditions);
        assert!(v1.clone().with_consensus("pathogenic ").pathogenic_all_conditions);
        assert!(!v1.with_consensus("Likely pathogenic").pathogenic_all_conditions);
    }

    #[test]
    fn test_no_assertion_rows_still_counted() {
        let records = vec![
            record("v1", "RCV1", "Benign").build(),
            record("v1", "RCV2", "Uncertain significance")
                .review(ReviewStatus::NoAssertionProvided)
                .build(),
        ];
        let v1 = compute_aggregates(&records).remove(&key("v1")).unwrap();
        assert_eq!(v1.accession_count, 2);
        assert_eq!(v1.significance_count, 2);
    }
}
