// ==============================================================================
// table.rs - Flat Result Table Projection
// ==============================================================================
// Description: Projects variant summaries and submission details onto ordered,
//              typed columns for the TSV and Parquet writers
// Author: Matt Barham
// Created: 2026-01-27
// Modified: 2026-02-03
// Version: 1.1.0
// ==============================================================================
// Column order (both tables):
//   descriptive -> classification -> raw submission (detail only)
//   -> aggregates / flags -> pass-through input columns
// ==============================================================================

use serde::Serialize;
use std::sync::Arc;

use crate::models::{SubmissionDetail, VariantDescriptor, VariantSummary};

/// Separator for list-valued cells
pub const LIST_SEPARATOR: &str = "; ";

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
}

/// One cell of a projected table
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(u64),
    Float(f64),
    Boolean(bool),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Cell::Null, Cell::text)
    }

    fn opt_int(value: Option<u64>) -> Self {
        value.map_or(Cell::Null, Cell::Integer)
    }

    fn count(value: usize) -> Self {
        Cell::Integer(value as u64)
    }

    fn list(values: &[String]) -> Self {
        if values.is_empty() {
            Cell::Null
        } else {
            Cell::Text(values.join(LIST_SEPARATOR))
        }
    }

    /// Structured payloads are written as compact JSON
    fn json<T: Serialize>(value: Option<&T>) -> Self {
        value
            .and_then(|v| serde_json::to_string(v).ok())
            .map_or(Cell::Null, Cell::Text)
    }

    /// Text rendering used by delimited writers (`Null` is empty)
    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Integer(n) => n.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Boolean(b) => b.to_string(),
        }
    }
}

/// Column header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered columns plus rows of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// User-facing column names carried from the input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    /// Chromosome, position, reference and alternate column names
    pub variant_columns: [String; 4],
    /// Pass-through input columns, appended last
    pub extra_columns: Vec<String>,
}

type Getter<R> = Box<dyn Fn(&R) -> Cell + Send + Sync>;

struct ColumnSpec<R> {
    name: String,
    kind: ColumnKind,
    value: Getter<R>,
}

impl<R> ColumnSpec<R> {
    fn new(name: impl Into<String>, kind: ColumnKind, value: impl Fn(&R) -> Cell + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            kind,
            value: Box::new(value),
        }
    }
}

fn project<'r, R: 'r>(specs: &[ColumnSpec<R>], rows: impl IntoIterator<Item = &'r R>) -> Table {
    Table {
        columns: specs
            .iter()
            .map(|s| Column {
                name: s.name.clone(),
                kind: s.kind,
            })
            .collect(),
        rows: rows
            .into_iter()
            .map(|row| specs.iter().map(|s| (s.value)(row)).collect())
            .collect(),
    }
}

/// Re-target summary columns at detail rows
fn broadcast(specs: Vec<ColumnSpec<VariantSummary>>) -> Vec<ColumnSpec<SubmissionDetail>> {
    specs
        .into_iter()
        .map(|spec| {
            let value = spec.value;
            ColumnSpec::new(spec.name, spec.kind, move |d: &SubmissionDetail| value(d.summary.as_ref()))
        })
        .collect()
}

fn descriptor(summary: &VariantSummary) -> Option<&VariantDescriptor> {
    summary.descriptor.as_ref()
}

fn descriptive_columns(layout: &TableLayout) -> Vec<ColumnSpec<VariantSummary>> {
    use ColumnKind::*;
    let [chrom, pos, ref_col, alt] = layout.variant_columns.clone();
    vec![
        ColumnSpec::new("variant_key", Text, |s: &VariantSummary| Cell::text(s.input.key.as_str())),
        ColumnSpec::new(chrom, Text, |s: &VariantSummary| Cell::text(s.input.chrom.as_str())),
        ColumnSpec::new(pos, Integer, |s: &VariantSummary| Cell::Integer(s.input.position)),
        ColumnSpec::new(ref_col, Text, |s: &VariantSummary| Cell::text(s.input.ref_allele.as_str())),
        ColumnSpec::new(alt, Text, |s: &VariantSummary| Cell::text(s.input.alt_allele.as_str())),
        ColumnSpec::new("gene_symbol", Text, |s: &VariantSummary| {
            Cell::opt_text(descriptor(s).and_then(|d| d.gene_symbol.as_deref()))
        }),
        ColumnSpec::new("rsid", Text, |s: &VariantSummary| {
            Cell::opt_text(descriptor(s).and_then(|d| d.rsid.as_deref()))
        }),
        ColumnSpec::new("variant_id", Integer, |s: &VariantSummary| {
            Cell::opt_int(descriptor(s).and_then(|d| d.variant_id))
        }),
        ColumnSpec::new("variant_type", Text, |s: &VariantSummary| {
            Cell::opt_text(descriptor(s).and_then(|d| d.variant_type.as_deref()))
        }),
        ColumnSpec::new("hg19_start", Integer, |s: &VariantSummary| {
            Cell::opt_int(descriptor(s).and_then(|d| d.hg19.as_ref()).and_then(|span| span.start))
        }),
        ColumnSpec::new("hg19_end", Integer, |s: &VariantSummary| {
            Cell::opt_int(descriptor(s).and_then(|d| d.hg19.as_ref()).and_then(|span| span.end))
        }),
        ColumnSpec::new("hg38_start", Integer, |s: &VariantSummary| {
            Cell::opt_int(descriptor(s).and_then(|d| d.hg38.as_ref()).and_then(|span| span.start))
        }),
        ColumnSpec::new("hg38_end", Integer, |s: &VariantSummary| {
            Cell::opt_int(descriptor(s).and_then(|d| d.hg38.as_ref()).and_then(|span| span.end))
        }),
        ColumnSpec::new("hgvs_coding", Text, |s: &VariantSummary| {
            descriptor(s).map_or(Cell::Null, |d| Cell::list(&d.hgvs_coding))
        }),
        ColumnSpec::new("hgvs_genomic", Text, |s: &VariantSummary| {
            descriptor(s).map_or(Cell::Null, |d| Cell::list(&d.hgvs_genomic))
        }),
    ]
}

fn classification_columns() -> Vec<ColumnSpec<VariantSummary>> {
    use ColumnKind::*;
    vec![
        ColumnSpec::new("clinvar_status", Text, |s: &VariantSummary| Cell::text(s.clinvar_status.as_str())),
        ColumnSpec::new("clinical_significance", Text, |s: &VariantSummary| {
            Cell::text(s.clinical_significance.as_str())
        }),
    ]
}

fn collapsed_columns() -> Vec<ColumnSpec<VariantSummary>> {
    use ColumnKind::*;
    vec![
        ColumnSpec::new("accession", Text, |s: &VariantSummary| {
            Cell::opt_text(s.collapsed.as_ref().map(|c| c.accession.as_str()))
        }),
        ColumnSpec::new("last_evaluated", Text, |s: &VariantSummary| {
            s.collapsed
                .as_ref()
                .and_then(|c| c.last_evaluated)
                .map_or(Cell::Null, |d| Cell::Text(d.to_string()))
        }),
        ColumnSpec::new("review_status", Text, |s: &VariantSummary| {
            Cell::opt_text(s.collapsed.as_ref().map(|c| c.review_status.as_str()))
        }),
        ColumnSpec::new("number_submitters", Integer, |s: &VariantSummary| {
            Cell::opt_int(s.collapsed.as_ref().and_then(|c| c.number_submitters).map(u64::from))
        }),
        ColumnSpec::new("preferred_name", Text, |s: &VariantSummary| {
            Cell::opt_text(s.collapsed.as_ref().and_then(|c| c.preferred_name.as_deref()))
        }),
        ColumnSpec::new("condition_names", Text, |s: &VariantSummary| Cell::list(&s.conditions.names)),
        ColumnSpec::new("condition_synonyms", Text, |s: &VariantSummary| Cell::list(&s.conditions.synonyms)),
        ColumnSpec::new("condition_identifiers", Text, |s: &VariantSummary| {
            let ids = &s.conditions.identifiers;
            Cell::json((!ids.is_empty()).then_some(ids))
        }),
    ]
}

fn aggregate_columns() -> Vec<ColumnSpec<VariantSummary>> {
    use ColumnKind::*;
    vec![
        ColumnSpec::new("clinical_significance_set", Text, |s: &VariantSummary| {
            Cell::list(&s.significance_set)
        }),
        ColumnSpec::new("significance_count", Integer, |s: &VariantSummary| {
            Cell::count(s.aggregates.significance_count)
        }),
        ColumnSpec::new("accession_count", Integer, |s: &VariantSummary| {
            Cell::count(s.aggregates.accession_count)
        }),
        ColumnSpec::new("condition_count", Integer, |s: &VariantSummary| {
            Cell::count(s.aggregates.condition_count)
        }),
        ColumnSpec::new("pathogenic_condition_count", Integer, |s: &VariantSummary| {
            Cell::count(s.aggregates.pathogenic_condition_count)
        }),
        ColumnSpec::new("pathogenic_condition_fraction", Float, |s: &VariantSummary| {
            s.aggregates
                .pathogenic_condition_fraction
                .map_or(Cell::Null, Cell::Float)
        }),
        ColumnSpec::new("pathogenic_conditions", Text, |s: &VariantSummary| {
            Cell::list(&s.aggregates.pathogenic_conditions)
        }),
        ColumnSpec::new("multi_accession", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.multi_accession)
        }),
        ColumnSpec::new("multi_condition", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.multi_condition)
        }),
        ColumnSpec::new("multi_significance", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.multi_significance)
        }),
        ColumnSpec::new("pathogenic_all_conditions", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.pathogenic_all_conditions)
        }),
        ColumnSpec::new("pathogenic_any_condition", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.pathogenic_any_condition)
        }),
        ColumnSpec::new("condition_conflict", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.condition_conflict)
        }),
        ColumnSpec::new("condition_conflict_detail", Text, |s: &VariantSummary| {
            Cell::json(s.aggregates.condition_conflict_detail.as_ref())
        }),
        ColumnSpec::new("condition_duplicated", Boolean, |s: &VariantSummary| {
            Cell::Boolean(s.aggregates.condition_duplicated)
        }),
        ColumnSpec::new("condition_duplicated_detail", Text, |s: &VariantSummary| {
            Cell::json(s.aggregates.condition_duplicated_detail.as_ref())
        }),
    ]
}

fn input_columns(layout: &TableLayout) -> Vec<ColumnSpec<VariantSummary>> {
    layout
        .extra_columns
        .iter()
        .map(|name| {
            let key = name.clone();
            ColumnSpec::new(name.clone(), ColumnKind::Text, move |s: &VariantSummary| {
                Cell::opt_text(s.input.extra.get(&key).map(String::as_str))
            })
        })
        .collect()
}

fn submission_columns() -> Vec<ColumnSpec<SubmissionDetail>> {
    use ColumnKind::*;
    vec![
        ColumnSpec::new("submission_significance", Text, |d: &SubmissionDetail| {
            Cell::text(d.record.significance.as_str())
        }),
        ColumnSpec::new("accession", Text, |d: &SubmissionDetail| Cell::text(d.record.accession.as_str())),
        ColumnSpec::new("condition", Text, |d: &SubmissionDetail| Cell::opt_text(d.record.condition.as_deref())),
        ColumnSpec::new("condition_synonyms", Text, |d: &SubmissionDetail| {
            Cell::opt_text(d.record.condition_synonyms.as_deref())
        }),
        ColumnSpec::new("condition_identifiers", Text, |d: &SubmissionDetail| {
            let ids = &d.record.condition_identifiers;
            Cell::json((!ids.is_empty()).then_some(ids))
        }),
        ColumnSpec::new("rcv_condition", Text, |d: &SubmissionDetail| {
            Cell::opt_text(d.record.rcv_condition.as_deref())
        }),
        ColumnSpec::new("review_status", Text, |d: &SubmissionDetail| {
            Cell::text(d.record.review_status.as_str())
        }),
        ColumnSpec::new("number_submitters", Integer, |d: &SubmissionDetail| {
            Cell::opt_int(d.record.number_submitters.map(u64::from))
        }),
        ColumnSpec::new("last_evaluated", Text, |d: &SubmissionDetail| {
            d.record
                .last_evaluated
                .map_or(Cell::Null, |date| Cell::Text(date.to_string()))
        }),
        ColumnSpec::new("origin", Text, |d: &SubmissionDetail| Cell::opt_text(d.record.origin.as_deref())),
        ColumnSpec::new("preferred_name", Text, |d: &SubmissionDetail| {
            Cell::opt_text(d.record.preferred_name.as_deref())
        }),
    ]
}

/// Project variant summaries (one row each)
pub fn summary_table(summaries: &[Arc<VariantSummary>], layout: &TableLayout) -> Table {
    let mut specs = descriptive_columns(layout);
    specs.extend(classification_columns());
    specs.extend(collapsed_columns());
    specs.extend(aggregate_columns());
    specs.extend(input_columns(layout));
    project(&specs, summaries.iter().map(|s| s.as_ref()))
}

/// Project submission details (one row per submission record)
pub fn detail_table(details: &[SubmissionDetail], layout: &TableLayout) -> Table {
    let mut specs = broadcast(descriptive_columns(layout));
    specs.extend(broadcast(classification_columns()));
    specs.extend(submission_columns());
    specs.extend(broadcast(aggregate_columns()));
    specs.extend(broadcast(input_columns(layout)));
    project(&specs, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{input_variant, record};
    use crate::models::{VariantAggregates, LABEL_UNREPORTED, STATUS_NOT_IN_CLINVAR};
    use crate::parsers::DEFAULT_VARIANT_COLUMNS;
    use std::collections::BTreeMap;

    fn layout(extra: &[&str]) -> TableLayout {
        TableLayout {
            variant_columns: DEFAULT_VARIANT_COLUMNS.map(String::from),
            extra_columns: extra.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn unreported_summary() -> VariantSummary {
        let mut input = input_variant("X", 500, "G", "A");
        input.extra.insert("SAMPLE".to_string(), "s1".to_string());
        VariantSummary {
            input,
            clinvar_status: STATUS_NOT_IN_CLINVAR.to_string(),
            clinical_significance: LABEL_UNREPORTED.to_string(),
            rule: None,
            significance_set: vec![LABEL_UNREPORTED.to_string()],
            descriptor: None,
            collapsed: None,
            conditions: Default::default(),
            aggregates: VariantAggregates::default(),
        }
    }

    #[test]
    fn test_summary_column_groups_in_order() {
        let table = summary_table(&[Arc::new(unreported_summary())], &layout(&["SAMPLE"]));
        let position = |name: &str| table.column_index(name).unwrap();

        assert_eq!(position("variant_key"), 0);
        assert_eq!(position("CHR"), 1);
        assert!(position("hgvs_genomic") < position("clinical_significance"));
        assert!(position("clinical_significance") < position("accession"));
        assert!(position("accession") < position("clinical_significance_set"));
        assert!(position("condition_duplicated_detail") < position("SAMPLE"));
        assert_eq!(position("SAMPLE"), table.columns.len() - 1);
    }

    #[test]
    fn test_unreported_row_cells() {
        let table = summary_table(&[Arc::new(unreported_summary())], &layout(&["SAMPLE"]));
        let row = &table.rows[0];
        let cell = |name: &str| &row[table.column_index(name).unwrap()];

        assert_eq!(cell("clinical_significance"), &Cell::Text(LABEL_UNREPORTED.to_string()));
        assert_eq!(cell("POS"), &Cell::Integer(500));
        assert_eq!(cell("gene_symbol"), &Cell::Null);
        assert_eq!(cell("condition_count"), &Cell::Integer(0));
        assert_eq!(cell("pathogenic_condition_fraction"), &Cell::Null);
        assert_eq!(cell("condition_conflict"), &Cell::Boolean(false));
        assert_eq!(cell("condition_conflict_detail"), &Cell::Null);
        assert_eq!(cell("SAMPLE"), &Cell::Text("s1".to_string()));
    }

    #[test]
    fn test_detail_rows_broadcast_summary() {
        let summary = Arc::new(unreported_summary());
        let details = vec![
            SubmissionDetail {
                record: record("v1", "RCV1", "Benign").build(),
                summary: Arc::clone(&summary),
            },
            SubmissionDetail {
                record: record("v1", "RCV2", "Likely benign").condition(None).build(),
                summary,
            },
        ];
        let table = detail_table(&details, &layout(&[]));
        let col = |name: &str| table.column_index(name).unwrap();

        assert!(col("clinical_significance") < col("submission_significance"));
        assert!(col("preferred_name") < col("clinical_significance_set"));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][col("accession")], Cell::Text("RCV1".to_string()));
        assert_eq!(table.rows[1][col("condition")], Cell::Null);
        assert_eq!(table.rows[0][col("clinvar_status")], table.rows[1][col("clinvar_status")]);
    }

    #[test]
    fn test_json_payload_cell() {
        let mut summary = unreported_summary();
        summary.aggregates.condition_conflict = true;
        summary.aggregates.condition_conflict_detail = Some(BTreeMap::from([(
            "disease A".to_string(),
            BTreeMap::from([("Benign".to_string(), "RCV2".to_string())]),
        )]));
        let table = summary_table(&[Arc::new(summary)], &layout(&[]));
        let idx = table.column_index("condition_conflict_detail").unwrap();
        assert_eq!(
            table.rows[0][idx],
            Cell::Text(r#"{"disease A":{"Benign":"RCV2"}}"#.to_string())
        );
    }

    #[test]
    fn test_render() {
        assert_eq!(Cell::Null.render(), "");
        assert_eq!(Cell::Integer(3).render(), "3");
        assert_eq!(Cell::Float(0.5).render(), "0.5");
        assert_eq!(Cell::Boolean(true).render(), "true");
    }
}
