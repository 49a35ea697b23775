// ==============================================================================
// exploratory.rs - Exploratory Analysis Tables
// ==============================================================================
// Description: Dataset summary, pathogenic variant subsets and grouped
//              clinical significance counts derived from the merged tables
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Counts are distinct variants. Variant-level labels split the conflicting
// consensus in two:
//   "Conflicting - some pathogenic"  at least one submission term contains "Pathogenic"
//   "Conflicting - none pathogenic"  otherwise
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ClinsigConfig;
use crate::merger::AnnotationTables;
use crate::models::{
    SubmissionDetail, VariantAggregates, VariantKey, VariantSummary, LABEL_CONFLICTING, STATUS_REPORTED,
};
use crate::table::{Cell, Column, ColumnKind, Table};

pub const LABEL_CONFLICTING_SOME_PATHOGENIC: &str = "Conflicting - some pathogenic";
pub const LABEL_CONFLICTING_NONE_PATHOGENIC: &str = "Conflicting - none pathogenic";

/// Which pathogenic flag selects the pathogenic variant subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PathogenicScope {
    /// At least one condition is classified "Pathogenic"
    #[default]
    AnyCondition,
    /// Every condition is classified "Pathogenic"
    AllConditions,
}

impl PathogenicScope {
    pub fn selects(&self, aggregates: &VariantAggregates) -> bool {
        match self {
            PathogenicScope::AnyCondition => aggregates.pathogenic_any_condition,
            PathogenicScope::AllConditions => aggregates.pathogenic_all_conditions,
        }
    }
}

/// Headline numbers of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Distinct input variant keys
    pub input_variants: usize,
    pub reported_variants: usize,
    pub unreported_variants: usize,
    /// Distinct gene symbols of reported variants
    pub distinct_genes: usize,
    /// Distinct condition names over all submissions
    pub distinct_conditions: usize,
}

impl DatasetSummary {
    /// Category / label / count rows, input variants first
    pub fn to_table(&self) -> Table {
        let rows = [
            ("Input variants", "Total #", self.input_variants),
            ("Input variants", "# in ClinVar database", self.reported_variants),
            ("Input variants", "# NOT currently in ClinVar", self.unreported_variants),
            ("Conditions", "# of distinct ClinVar conditions", self.distinct_conditions),
            ("Genes", "# of distinct symbols", self.distinct_genes),
        ];
        Table {
            columns: vec![
                column("category", ColumnKind::Text),
                column("label", ColumnKind::Text),
                column("count", ColumnKind::Integer),
            ],
            rows: rows
                .iter()
                .map(|(category, label, count)| {
                    vec![
                        Cell::Text(category.to_string()),
                        Cell::Text(label.to_string()),
                        Cell::Integer(*count as u64),
                    ]
                })
                .collect(),
        }
    }
}

/// Distinct variants per label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTally {
    pub label: String,
    pub variants: usize,
    /// Distinct (variant, RCV accession) pairs; only set for RCV-level labels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_rcv_pairs: Option<usize>,
}

/// One group (gene or condition) of a grouped count table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedCountRow {
    pub key: String,
    pub total: usize,
    /// Aligned with `GroupedCounts::labels`
    pub counts: Vec<usize>,
}

/// Distinct variants per (group, variant label)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedCounts {
    /// Name of the grouping column ("gene_symbol", "condition")
    pub group: String,
    /// Label columns in configured order
    pub labels: Vec<String>,
    /// Rows by descending total, then by key
    pub rows: Vec<GroupedCountRow>,
}

impl GroupedCounts {
    pub fn count(&self, key: &str, label: &str) -> Option<usize> {
        let idx = self.labels.iter().position(|l| l == label)?;
        self.rows.iter().find(|r| r.key == key).map(|r| r.counts[idx])
    }

    pub fn to_table(&self) -> Table {
        let mut columns = vec![column(&self.group, ColumnKind::Text), column("Total", ColumnKind::Integer)];
        columns.extend(self.labels.iter().map(|l| column(l, ColumnKind::Integer)));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = vec![Cell::Text(row.key.clone()), Cell::Integer(row.total as u64)];
                cells.extend(row.counts.iter().map(|c| Cell::Integer(*c as u64)));
                cells
            })
            .collect();

        Table { columns, rows }
    }
}

/// Every exploratory artifact of one run
#[derive(Debug, Clone)]
pub struct ExploratoryTables {
    pub dataset: DatasetSummary,
    /// Summary and detail rows of the variants selected by the pathogenic scope
    pub pathogenic: AnnotationTables,
    /// Distinct variants per variant-level label (conflicting split in two)
    pub variant_labels: Vec<LabelTally>,
    /// Distinct variants and variant-RCV pairs per submission term
    pub rcv_labels: Vec<LabelTally>,
    pub by_gene: GroupedCounts,
    pub by_condition: GroupedCounts,
}

impl ExploratoryTables {
    /// Derive the exploratory tables from merged annotation tables
    ///
    /// # Arguments
    /// * `tables` - Merged summary and detail tables
    /// * `scope` - Pathogenic flag selecting the pathogenic subset
    /// * `config` - Label ordering for count columns
    pub fn build(tables: &AnnotationTables, scope: PathogenicScope, config: &ClinsigConfig) -> Self {
        let labels = variant_labels(&tables.summaries, &tables.details);

        let result = Self {
            dataset: dataset_summary(tables),
            pathogenic: pathogenic_subset(tables, scope),
            variant_labels: variant_label_tally(&labels, config),
            rcv_labels: rcv_label_tally(&tables.details, config),
            by_gene: grouped_counts(
                "gene_symbol",
                tables.summaries.iter().filter_map(|s| {
                    let gene = s.descriptor.as_ref()?.gene_symbol.as_deref()?;
                    Some((gene, &s.input.key))
                }),
                &labels,
                config,
            ),
            by_condition: grouped_counts(
                "condition",
                tables
                    .details
                    .iter()
                    .filter_map(|d| Some((d.record.condition.as_deref()?, &d.record.variant))),
                &labels,
                config,
            ),
        };

        info!(
            "Exploratory analysis: {} pathogenic variants ({:?}), {} genes, {} conditions",
            result.pathogenic.summaries.len(),
            scope,
            result.dataset.distinct_genes,
            result.dataset.distinct_conditions
        );
        result
    }
}

/// Variant-level label of every summary: the consensus label, with the
/// conflicting consensus split by whether any submission term contains "Pathogenic"
pub fn variant_labels<'a>(
    summaries: &'a [Arc<VariantSummary>],
    details: &'a [SubmissionDetail],
) -> BTreeMap<&'a VariantKey, &'a str> {
    let some_pathogenic: BTreeSet<&VariantKey> = details
        .iter()
        .filter(|d| d.record.significance.contains("Pathogenic"))
        .map(|d| &d.record.variant)
        .collect();

    summaries
        .iter()
        .map(|summary| {
            let key = &summary.input.key;
            let label = if summary.clinical_significance != LABEL_CONFLICTING {
                summary.clinical_significance.as_str()
            } else if some_pathogenic.contains(key) {
                LABEL_CONFLICTING_SOME_PATHOGENIC
            } else {
                LABEL_CONFLICTING_NONE_PATHOGENIC
            };
            (key, label)
        })
        .collect()
}

fn dataset_summary(tables: &AnnotationTables) -> DatasetSummary {
    let input: BTreeSet<&VariantKey> = tables.summaries.iter().map(|s| &s.input.key).collect();
    let reported: BTreeSet<&VariantKey> = tables
        .summaries
        .iter()
        .filter(|s| s.clinvar_status == STATUS_REPORTED)
        .map(|s| &s.input.key)
        .collect();
    let genes: BTreeSet<&str> = tables
        .summaries
        .iter()
        .filter_map(|s| s.descriptor.as_ref()?.gene_symbol.as_deref())
        .collect();
    let conditions: BTreeSet<&str> = tables
        .details
        .iter()
        .filter_map(|d| d.record.condition.as_deref())
        .collect();

    DatasetSummary {
        input_variants: input.len(),
        reported_variants: reported.len(),
        unreported_variants: input.len() - reported.len(),
        distinct_genes: genes.len(),
        distinct_conditions: conditions.len(),
    }
}

fn pathogenic_subset(tables: &AnnotationTables, scope: PathogenicScope) -> AnnotationTables {
    AnnotationTables {
        summaries: tables
            .summaries
            .iter()
            .filter(|s| scope.selects(&s.aggregates))
            .cloned()
            .collect(),
        details: tables
            .details
            .iter()
            .filter(|d| scope.selects(&d.summary.aggregates))
            .cloned()
            .collect(),
    }
}

/// Configured rank; both halves of the conflicting split rank as the conflicting label
fn compare_labels(config: &ClinsigConfig, a: &str, b: &str) -> Ordering {
    let rank = |label: &str| match label {
        LABEL_CONFLICTING_SOME_PATHOGENIC | LABEL_CONFLICTING_NONE_PATHOGENIC => {
            config.sort_rank(LABEL_CONFLICTING)
        }
        other => config.sort_rank(other),
    };
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

fn variant_label_tally(labels: &BTreeMap<&VariantKey, &str>, config: &ClinsigConfig) -> Vec<LabelTally> {
    let mut variants: BTreeMap<&str, usize> = BTreeMap::new();
    for label in labels.values() {
        *variants.entry(label).or_insert(0) += 1;
    }

    let mut tally: Vec<LabelTally> = variants
        .into_iter()
        .map(|(label, count)| LabelTally {
            label: label.to_string(),
            variants: count,
            variant_rcv_pairs: None,
        })
        .collect();
    tally.sort_by(|a, b| compare_labels(config, &a.label, &b.label));
    tally
}

fn rcv_label_tally(details: &[SubmissionDetail], config: &ClinsigConfig) -> Vec<LabelTally> {
    let mut pairs: BTreeMap<&str, BTreeSet<(&VariantKey, &str)>> = BTreeMap::new();
    for detail in details {
        pairs
            .entry(detail.record.significance.as_str())
            .or_default()
            .insert((&detail.record.variant, detail.record.accession.as_str()));
    }

    let mut tally: Vec<LabelTally> = pairs
        .into_iter()
        .map(|(label, pairs)| {
            let variants: BTreeSet<&VariantKey> = pairs.iter().map(|(variant, _)| *variant).collect();
            LabelTally {
                label: label.to_string(),
                variants: variants.len(),
                variant_rcv_pairs: Some(pairs.len()),
            }
        })
        .collect();
    tally.sort_by(|a, b| compare_labels(config, &a.label, &b.label));
    tally
}

/// Distinct variants per (group, variant label) over `(group key, variant)` pairs
fn grouped_counts<'a>(
    group: &str,
    members: impl Iterator<Item = (&'a str, &'a VariantKey)>,
    labels: &BTreeMap<&VariantKey, &str>,
    config: &ClinsigConfig,
) -> GroupedCounts {
    let mut groups: BTreeMap<&str, BTreeMap<&str, BTreeSet<&VariantKey>>> = BTreeMap::new();
    for (key, variant) in members {
        let Some(label) = labels.get(variant) else {
            continue;
        };
        groups
            .entry(key)
            .or_default()
            .entry(*label)
            .or_default()
            .insert(variant);
    }

    let mut columns: Vec<&str> = groups
        .values()
        .flat_map(|by_label| by_label.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    columns.sort_by(|a, b| compare_labels(config, a, b));

    let mut rows: Vec<GroupedCountRow> = groups
        .iter()
        .map(|(key, by_label)| {
            let counts: Vec<usize> = columns
                .iter()
                .map(|label| by_label.get(label).map_or(0, BTreeSet::len))
                .collect();
            GroupedCountRow {
                key: key.to_string(),
                total: counts.iter().sum(),
                counts,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
    debug!("{} counts: {} groups x {} labels", group, rows.len(), columns.len());

    GroupedCounts {
        group: group.to_string(),
        labels: columns.into_iter().map(String::from).collect(),
        rows,
    }
}

fn column(name: &str, kind: ColumnKind) -> Column {
    Column {
        name: name.to_string(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::compute_aggregates;
    use crate::classifier::ConsensusClassifier;
    use crate::fixtures::{input_variant, record};
    use crate::merger::SummaryMerger;
    use crate::models::{InputVariant, SubmissionRecord, LABEL_UNREPORTED};
    use crate::parsers::InputTable;

    struct Sample {
        conflicting_pathogenic: InputVariant,
        conflicting_benign: InputVariant,
        pathogenic: InputVariant,
        tables: AnnotationTables,
    }

    fn sample() -> Sample {
        let conflicting_pathogenic = input_variant("1", 100, "A", "G");
        let conflicting_benign = input_variant("2", 200, "C", "T");
        let pathogenic = input_variant("3", 300, "G", "A");
        let missing = input_variant("X", 10, "T", "C");

        let v1 = conflicting_pathogenic.key.as_str();
        let v2 = conflicting_benign.key.as_str();
        let v3 = pathogenic.key.as_str();
        let records: Vec<SubmissionRecord> = vec![
            record(v1, "RCV1", "Pathogenic").condition(Some("disease A")).gene("BRCA1").build(),
            record(v1, "RCV2", "Benign").condition(Some("disease B")).gene("BRCA1").build(),
            record(v2, "RCV3", "Benign").condition(Some("disease A")).gene("BRCA1").build(),
            record(v2, "RCV4", "Uncertain significance").condition(Some("disease A")).gene("BRCA1").build(),
            record(v3, "RCV5", "Pathogenic").condition(Some("disease C")).gene("TP53").build(),
        ];

        let input = InputTable {
            extra_columns: Vec::new(),
            variants: vec![
                conflicting_pathogenic.clone(),
                conflicting_benign.clone(),
                pathogenic.clone(),
                missing,
            ],
        };
        let config = ClinsigConfig::default();
        let classifications = ConsensusClassifier::default().classify(&records).unwrap();
        let tables = SummaryMerger::new(&config)
            .merge(&input, &records, &classifications, &compute_aggregates(&records))
            .unwrap();

        Sample {
            conflicting_pathogenic,
            conflicting_benign,
            pathogenic,
            tables,
        }
    }

    fn build(sample: &Sample, scope: PathogenicScope) -> ExploratoryTables {
        ExploratoryTables::build(&sample.tables, scope, &ClinsigConfig::default())
    }

    #[test]
    fn test_dataset_summary() {
        let sample = sample();
        let dataset = build(&sample, PathogenicScope::AnyCondition).dataset;
        assert_eq!(
            dataset,
            DatasetSummary {
                input_variants: 4,
                reported_variants: 3,
                unreported_variants: 1,
                distinct_genes: 2,
                distinct_conditions: 3,
            }
        );

        let table = dataset.to_table();
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.rows[0][2], Cell::Integer(4));
        assert_eq!(table.rows[2][1], Cell::Text("# NOT currently in ClinVar".to_string()));
    }

    #[test]
    fn test_conflicting_split_by_pathogenic_term() {
        let sample = sample();
        let labels = variant_labels(&sample.tables.summaries, &sample.tables.details);
        assert_eq!(labels[&sample.conflicting_pathogenic.key], LABEL_CONFLICTING_SOME_PATHOGENIC);
        assert_eq!(labels[&sample.conflicting_benign.key], LABEL_CONFLICTING_NONE_PATHOGENIC);
        assert_eq!(labels[&sample.pathogenic.key], "Pathogenic");
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn test_pathogenic_subset_any_condition() {
        let sample = sample();
        let subset = build(&sample, PathogenicScope::AnyCondition).pathogenic;
        let keys: Vec<&VariantKey> = subset.summaries.iter().map(|s| &s.input.key).collect();
        assert_eq!(keys, vec![&sample.conflicting_pathogenic.key, &sample.pathogenic.key]);
        assert_eq!(subset.details.len(), 3);
    }

    #[test]
    fn test_pathogenic_subset_all_conditions() {
        let sample = sample();
        let subset = build(&sample, PathogenicScope::AllConditions).pathogenic;
        assert_eq!(subset.summaries.len(), 1);
        assert_eq!(subset.summaries[0].input.key, sample.pathogenic.key);
        assert_eq!(subset.details.len(), 1);
        assert_eq!(subset.details[0].record.accession, "RCV5");
    }

    #[test]
    fn test_variant_label_tally_in_configured_order() {
        let sample = sample();
        let tally = build(&sample, PathogenicScope::AnyCondition).variant_labels;
        let labels: Vec<(&str, usize)> = tally.iter().map(|t| (t.label.as_str(), t.variants)).collect();
        assert_eq!(
            labels,
            vec![
                ("Pathogenic", 1),
                (LABEL_CONFLICTING_NONE_PATHOGENIC, 1),
                (LABEL_CONFLICTING_SOME_PATHOGENIC, 1),
                (LABEL_UNREPORTED, 1),
            ]
        );
        assert!(tally.iter().all(|t| t.variant_rcv_pairs.is_none()));
    }

    #[test]
    fn test_rcv_label_tally() {
        let sample = sample();
        let tally = build(&sample, PathogenicScope::AnyCondition).rcv_labels;
        let find = |label: &str| tally.iter().find(|t| t.label == label).cloned();

        assert_eq!(tally[0].label, "Pathogenic");
        let benign = find("Benign").unwrap();
        assert_eq!((benign.variants, benign.variant_rcv_pairs), (2, Some(2)));
        let uncertain = find("Uncertain significance").unwrap();
        assert_eq!((uncertain.variants, uncertain.variant_rcv_pairs), (1, Some(1)));
        assert!(find(LABEL_UNREPORTED).is_none());
    }

    #[test]
    fn test_counts_by_gene() {
        let sample = sample();
        let by_gene = build(&sample, PathogenicScope::AnyCondition).by_gene;
        assert_eq!(by_gene.group, "gene_symbol");
        assert_eq!(
            by_gene.labels,
            vec![
                "Pathogenic".to_string(),
                LABEL_CONFLICTING_NONE_PATHOGENIC.to_string(),
                LABEL_CONFLICTING_SOME_PATHOGENIC.to_string(),
            ]
        );
        let keys: Vec<(&str, usize)> = by_gene.rows.iter().map(|r| (r.key.as_str(), r.total)).collect();
        assert_eq!(keys, vec![("BRCA1", 2), ("TP53", 1)]);
        assert_eq!(by_gene.count("BRCA1", LABEL_CONFLICTING_SOME_PATHOGENIC), Some(1));
        assert_eq!(by_gene.count("BRCA1", "Pathogenic"), Some(0));
        assert_eq!(by_gene.count("TP53", "Pathogenic"), Some(1));
    }

    #[test]
    fn test_counts_by_condition_are_distinct_variants() {
        let sample = sample();
        let by_condition = build(&sample, PathogenicScope::AnyCondition).by_condition;
        let keys: Vec<(&str, usize)> = by_condition.rows.iter().map(|r| (r.key.as_str(), r.total)).collect();
        // disease A has two submissions from the same variant
        assert_eq!(keys, vec![("disease A", 2), ("disease B", 1), ("disease C", 1)]);
        assert_eq!(by_condition.count("disease A", LABEL_CONFLICTING_NONE_PATHOGENIC), Some(1));
        assert_eq!(by_condition.count("disease C", "Pathogenic"), Some(1));
        assert_eq!(by_condition.count("disease Z", "Pathogenic"), None);
    }

    #[test]
    fn test_grouped_counts_table_layout() {
        let sample = sample();
        let table = build(&sample, PathogenicScope::AnyCondition).by_gene.to_table();
        let header: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            header,
            vec![
                "gene_symbol",
                "Total",
                "Pathogenic",
                LABEL_CONFLICTING_NONE_PATHOGENIC,
                LABEL_CONFLICTING_SOME_PATHOGENIC,
            ]
        );
        assert_eq!(
            table.rows[0],
            vec![
                Cell::Text("BRCA1".to_string()),
                Cell::Integer(2),
                Cell::Integer(0),
                Cell::Integer(1),
                Cell::Integer(1),
            ]
        );
    }

    #[test]
    fn test_pathogenic_scope_serde() {
        let json = serde_json::to_string(&PathogenicScope::AllConditions).unwrap();
        assert_eq!(json, "\"all_conditions\"");
        assert_eq!(PathogenicScope::default(), PathogenicScope::AnyCondition);
    }
}
