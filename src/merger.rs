// ==============================================================================
// merger.rs - Variant Summary Merger
// ==============================================================================
// Description: Joins consensus labels, aggregates and collapsed submission
//              fields into the per-variant summary and per-submission detail
//              tables, including input variants missing from ClinVar
// Author: Matt Barham
// Created: 2026-01-26
// Modified: 2026-02-03
// Version: 1.1.0
// ==============================================================================

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::{ClassificationTable, ClassifyError};
use crate::config::ClinsigConfig;
use crate::models::{
    CollapsedSubmission, ConditionSummary, InputVariant, SubmissionDetail, SubmissionRecord,
    VariantAggregates, VariantKey, VariantSummary, LABEL_UNREPORTED, STATUS_NOT_IN_CLINVAR,
    STATUS_REPORTED,
};
use crate::parsers::InputTable;

/// Chromosome sort ranks after the autosomes
const RANK_X: u32 = 24;
const RANK_Y: u32 = 25;
const RANK_MT: u32 = 26;
const RANK_UNKNOWN: u32 = 30;

/// The two result tables of one annotation run
#[derive(Debug, Clone, Default)]
pub struct AnnotationTables {
    /// One row per input variant, in genomic order
    pub summaries: Vec<Arc<VariantSummary>>,
    /// One row per submission record, in genomic order
    pub details: Vec<SubmissionDetail>,
}

/// Sort rank of a chromosome name: 1-22 numerically, then X, Y, MT, then the rest
pub fn chromosome_rank(chrom: &str) -> u32 {
    let chrom = chrom.trim().to_lowercase();
    let chrom = chrom.strip_prefix("chr").unwrap_or(&chrom);
    match chrom {
        "x" => RANK_X,
        "y" => RANK_Y,
        "mt" => RANK_MT,
        other => other.parse::<u32>().unwrap_or(RANK_UNKNOWN),
    }
}

/// Genomic order of two input variants: chromosome rank, position, then key
pub fn genomic_order(a: &InputVariant, b: &InputVariant) -> Ordering {
    chromosome_rank(&a.chrom)
        .cmp(&chromosome_rank(&b.chrom))
        .then_with(|| a.position.cmp(&b.position))
        .then_with(|| a.key.cmp(&b.key))
}

/// Number of variants per consensus label, in configured label order
pub fn summary_counts<S: AsRef<VariantSummary>>(summaries: &[S], config: &ClinsigConfig) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for summary in summaries {
        *counts
            .entry(summary.as_ref().clinical_significance.as_str())
            .or_insert(0) += 1;
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();
    counts.sort_by(|a, b| config.compare(&a.0, &b.0));
    counts
}

/// Builds the final tables; the only producer of `VariantSummary` rows
#[derive(Debug, Clone)]
pub struct SummaryMerger<'c> {
    config: &'c ClinsigConfig,
}

impl<'c> SummaryMerger<'c> {
    pub fn new(config: &'c ClinsigConfig) -> Self {
        Self { config }
    }

    /// Merge classifier and analyzer output with the input variant list
    ///
    /// # Arguments
    /// * `input` - The user's variants (one summary row each)
    /// * `records` - The flat submission relation
    /// * `classifications` - Consensus label per relation variant
    /// * `aggregates` - Aggregates per relation variant
    ///
    /// # Returns
    /// * `Ok(AnnotationTables)` - Summary and detail tables in genomic order
    /// * `Err(ClassifyError)` - A relation variant has no consensus label
    pub fn merge(
        &self,
        input: &InputTable,
        records: &[SubmissionRecord],
        classifications: &ClassificationTable,
        aggregates: &BTreeMap<VariantKey, VariantAggregates>,
    ) -> Result<AnnotationTables, ClassifyError> {
        let mut rows_by_variant: BTreeMap<&VariantKey, Vec<&SubmissionRecord>> = BTreeMap::new();
        for record in records {
            rows_by_variant.entry(&record.variant).or_default().push(record);
        }

        let mut variants: Vec<&InputVariant> = input.variants.iter().collect();
        variants.sort_by(|a, b| genomic_order(a, b));

        let mut summaries = Vec::with_capacity(variants.len());
        let mut by_key: BTreeMap<&VariantKey, Arc<VariantSummary>> = BTreeMap::new();
        for variant in variants {
            let summary = match rows_by_variant.get(&variant.key) {
                Some(rows) => {
                    let classification = classifications.get(&variant.key).ok_or_else(|| {
                        ClassifyError::Unclassified {
                            variant: variant.key.clone(),
                        }
                    })?;
                    let aggregates = aggregates
                        .get(&variant.key)
                        .cloned()
                        .unwrap_or_default()
                        .with_consensus(&classification.label);

                    VariantSummary {
                        input: variant.clone(),
                        clinvar_status: STATUS_REPORTED.to_string(),
                        clinical_significance: classification.label.clone(),
                        rule: Some(classification.rule),
                        significance_set: self.significance_set(rows),
                        descriptor: rows.first().map(|r| (*r.descriptor).clone()),
                        collapsed: collapse_submissions(rows),
                        conditions: collapse_conditions(rows),
                        aggregates,
                    }
                }
                None => unreported(variant),
            };

            let summary = Arc::new(summary);
            by_key.entry(&variant.key).or_insert_with(|| Arc::clone(&summary));
            summaries.push(summary);
        }

        let orphaned: BTreeSet<&VariantKey> = rows_by_variant
            .keys()
            .copied()
            .filter(|key| !by_key.contains_key(*key))
            .collect();
        if !orphaned.is_empty() {
            warn!(
                "{} annotated variants are not in the input list and were dropped",
                orphaned.len()
            );
        }

        let mut details: Vec<SubmissionDetail> = records
            .iter()
            .filter_map(|record| {
                by_key.get(&record.variant).map(|summary| SubmissionDetail {
                    record: record.clone(),
                    summary: Arc::clone(summary),
                })
            })
            .collect();
        details.sort_by(|a, b| {
            genomic_order(&a.summary.input, &b.summary.input)
                .then_with(|| a.record.accession.cmp(&b.record.accession))
                .then_with(|| a.record.condition.cmp(&b.record.condition))
                .then_with(|| a.record.significance.cmp(&b.record.significance))
        });

        let unreported_count = summaries
            .iter()
            .filter(|s| s.clinvar_status == STATUS_NOT_IN_CLINVAR)
            .count();
        info!(
            "Merged {} variant summaries ({} not in ClinVar) and {} submission rows",
            summaries.len(),
            unreported_count,
            details.len()
        );

        Ok(AnnotationTables { summaries, details })
    }

    /// Distinct submission terms in configured label order
    fn significance_set(&self, rows: &[&SubmissionRecord]) -> Vec<String> {
        let terms: BTreeSet<&str> = rows.iter().map(|r| r.significance.as_str()).collect();
        let mut terms: Vec<String> = terms.into_iter().map(String::from).collect();
        self.config.sort_labels(&mut terms);
        terms
    }
}

fn unreported(variant: &InputVariant) -> VariantSummary {
    VariantSummary {
        input: variant.clone(),
        clinvar_status: STATUS_NOT_IN_CLINVAR.to_string(),
        clinical_significance: LABEL_UNREPORTED.to_string(),
        rule: None,
        significance_set: vec![LABEL_UNREPORTED.to_string()],
        descriptor: None,
        collapsed: None,
        conditions: ConditionSummary::default(),
        aggregates: VariantAggregates::default(),
    }
}

/// Fields of the most recently evaluated submission (ties: highest accession)
fn collapse_submissions(rows: &[&SubmissionRecord]) -> Option<CollapsedSubmission> {
    rows.iter()
        .max_by(|a, b| {
            a.last_evaluated
                .cmp(&b.last_evaluated)
                .then_with(|| a.accession.cmp(&b.accession))
        })
        .map(|latest| CollapsedSubmission {
            accession: latest.accession.clone(),
            last_evaluated: latest.last_evaluated,
            review_status: latest.review_status.clone(),
            number_submitters: latest.number_submitters,
            preferred_name: latest.preferred_name.clone(),
        })
}

fn collapse_conditions(rows: &[&SubmissionRecord]) -> ConditionSummary {
    let mut names = BTreeSet::new();
    let mut synonyms = BTreeSet::new();
    let mut identifiers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for row in rows {
        if let Some(name) = &row.condition {
            names.insert(name.clone());
        }
        if let Some(synonym) = &row.condition_synonyms {
            synonyms.insert(synonym.clone());
        }
        for (db, id) in &row.condition_identifiers {
            identifiers.entry(db.clone()).or_default().insert(id.clone());
        }
    }

    ConditionSummary {
        names: names.into_iter().collect(),
        synonyms: synonyms.into_iter().collect(),
        identifiers: identifiers
            .into_iter()
            .map(|(db, ids)| (db, ids.into_iter().collect()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::compute_aggregates;
    use crate::classifier::ConsensusClassifier;
    use crate::fixtures::{input_variant, record};
    use crate::models::{ReviewStatus, Rule, LABEL_CONFLICTING};

    fn merge(input: Vec<InputVariant>, records: &[SubmissionRecord]) -> AnnotationTables {
        let config = ClinsigConfig::default();
        let table = InputTable {
            extra_columns: Vec::new(),
            variants: input,
        };
        let classifications = ConsensusClassifier::default().classify(records).unwrap();
        SummaryMerger::new(&config)
            .merge(&table, records, &classifications, &compute_aggregates(records))
            .unwrap()
    }

    #[test]
    fn test_chromosome_rank() {
        assert_eq!(chromosome_rank("1"), 1);
        assert_eq!(chromosome_rank("chr22"), 22);
        assert_eq!(chromosome_rank("X"), RANK_X);
        assert_eq!(chromosome_rank("chrY"), RANK_Y);
        assert_eq!(chromosome_rank("MT"), RANK_MT);
        assert_eq!(chromosome_rank("GL000192.1"), RANK_UNKNOWN);
    }

    #[test]
    fn test_genomic_sort_is_numeric_aware() {
        let input = vec![
            input_variant("X", 100, "A", "G"),
            input_variant("10", 5, "C", "T"),
            input_variant("2", 300, "G", "A"),
            input_variant("2", 20, "G", "A"),
        ];
        let tables = merge(input, &[]);
        let order: Vec<(String, u64)> = tables
            .summaries
            .iter()
            .map(|s| (s.input.chrom.clone(), s.input.position))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2".to_string(), 20),
                ("2".to_string(), 300),
                ("10".to_string(), 5),
                ("X".to_string(), 100),
            ]
        );
    }

    #[test]
    fn test_unreported_variant() {
        let reported = input_variant("1", 100, "A", "G");
        let missing = input_variant("2", 200, "C", "T");
        let records = vec![record(reported.key.as_str(), "RCV1", "Benign").build()];

        let tables = merge(vec![reported, missing.clone()], &records);
        assert_eq!(tables.summaries.len(), 2);

        let summary = tables
            .summaries
            .iter()
            .find(|s| s.input.key == missing.key)
            .unwrap();
        assert_eq!(summary.clinical_significance, LABEL_UNREPORTED);
        assert_eq!(summary.clinvar_status, STATUS_NOT_IN_CLINVAR);
        assert_eq!(summary.significance_set, vec![LABEL_UNREPORTED]);
        assert_eq!(summary.rule, None);
        assert_eq!(summary.aggregates, VariantAggregates::default());
        assert_eq!(summary.aggregates.condition_count, 0);
        assert!(!summary.aggregates.condition_conflict && !summary.aggregates.multi_accession);
        assert!(tables.details.iter().all(|d| d.record.variant != missing.key));
    }

    #[test]
    fn test_reported_summary_fields() {
        let variant = input_variant("7", 140453136, "A", "T");
        let k = variant.key.as_str().to_string();
        let records = vec![
            record(&k, "RCV2", "Pathogenic")
                .evaluated(2019, 1, 1)
                .identifier("medgen", "C2")
                .synonyms("syn b")
                .gene("BRAF")
                .build(),
            record(&k, "RCV1", "Benign")
                .condition(Some("disease B"))
                .evaluated(2021, 6, 30)
                .identifier("medgen", "C1")
                .review(ReviewStatus::CriteriaProvidedMultipleSubmitters)
                .gene("BRAF")
                .build(),
            record(&k, "RCV3", "Uncertain significance")
                .review(ReviewStatus::NoAssertionProvided)
                .gene("BRAF")
                .build(),
        ];
        let tables = merge(vec![variant], &records);
        let summary = &tables.summaries[0];

        assert_eq!(summary.clinvar_status, STATUS_REPORTED);
        assert_eq!(summary.clinical_significance, LABEL_CONFLICTING);
        assert_eq!(summary.rule, Some(Rule::PathogenicSet));
        assert_eq!(
            summary.significance_set,
            vec!["Pathogenic", "Uncertain significance", "Benign"]
        );

        let collapsed = summary.collapsed.as_ref().unwrap();
        assert_eq!(collapsed.accession, "RCV1");
        assert_eq!(collapsed.review_status, ReviewStatus::CriteriaProvidedMultipleSubmitters);

        assert_eq!(summary.conditions.names, vec!["disease A", "disease B"]);
        assert_eq!(summary.conditions.synonyms, vec!["syn b"]);
        assert_eq!(summary.conditions.identifiers["medgen"], vec!["C1", "C2"]);
        assert_eq!(
            summary.descriptor.as_ref().and_then(|d| d.gene_symbol.as_deref()),
            Some("BRAF")
        );
        assert_eq!(summary.aggregates.accession_count, 3);
        assert_eq!(tables.details.len(), 3);
    }

    #[test]
    fn test_collapse_tie_broken_by_accession() {
        let a = record("v1", "RCV1", "Benign").evaluated(2020, 1, 1).build();
        let b = record("v1", "RCV2", "Benign").evaluated(2020, 1, 1).build();
        let c = record("v1", "RCV3", "Benign").build();
        let collapsed = collapse_submissions(&[&a, &b, &c]).unwrap();
        assert_eq!(collapsed.accession, "RCV2");
    }

    #[test]
    fn test_consensus_pathogenic_flag_merged() {
        let variant = input_variant("1", 10, "A", "G");
        let k = variant.key.as_str().to_string();
        let records = vec![
            record(&k, "RCV1", "Pathogenic").condition(Some("disease A")).build(),
            record(&k, "RCV2", "risk factor").condition(Some("disease B")).build(),
        ];
        let tables = merge(vec![variant], &records);
        let summary = &tables.summaries[0];
        assert_eq!(summary.clinical_significance, "Pathogenic");
        assert_eq!(summary.aggregates.pathogenic_condition_count, 1);
        assert_eq!(summary.aggregates.condition_count, 2);
        assert!(summary.aggregates.pathogenic_all_conditions);
    }

    #[test]
    fn test_details_broadcast_and_sorted() {
        let first = input_variant("2", 50, "A", "G");
        let second = input_variant("X", 10, "C", "T");
        let records = vec![
            record(second.key.as_str(), "RCV9", "Benign").build(),
            record(first.key.as_str(), "RCV5", "Benign").build(),
            record(first.key.as_str(), "RCV4", "Likely benign").condition(Some("disease B")).build(),
        ];
        let tables = merge(vec![second.clone(), first.clone()], &records);

        let order: Vec<&str> = tables.details.iter().map(|d| d.record.accession.as_str()).collect();
        assert_eq!(order, vec!["RCV4", "RCV5", "RCV9"]);
        for detail in &tables.details {
            assert_eq!(detail.summary.input.key, detail.record.variant);
        }
        assert_eq!(tables.details[0].summary.clinical_significance, "Benign/Likely benign");
    }

    #[test]
    fn test_summary_counts_in_configured_order() {
        let input = vec![
            input_variant("1", 1, "A", "G"),
            input_variant("1", 2, "A", "G"),
            input_variant("1", 3, "A", "G"),
        ];
        let records = vec![record(input[0].key.as_str(), "RCV1", "Benign").build()];
        let tables = merge(input, &records);

        let counts = summary_counts(&tables.summaries, &ClinsigConfig::default());
        assert_eq!(
            counts,
            vec![("Benign".to_string(), 1), (LABEL_UNREPORTED.to_string(), 2)]
        );
    }
}
