// ==============================================================================
// output.rs - Multi-Format Output Generation
// ==============================================================================
// Description: Writes the variant summary and submission detail tables as
//              TSV, JSON and Parquet, plus exploratory tables and run metadata
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-16
// Version: 2.1.0
// ==============================================================================
// Layout:
//   {out_dir}/{prefix}_ClinVar_annotation_{YYYY-MM-DD_HHMMSS}/annotation/
//     {prefix}_ClinVar_variant_summary_{YYYY-MM-DD}.{tsv,json,parquet}
//     {prefix}_ClinVar_variant_full_{YYYY-MM-DD}.{tsv,json,parquet}
//     run_metadata.json
//   {out_dir}/{prefix}_ClinVar_annotation_{YYYY-MM-DD_HHMMSS}/exploratory_analysis/
//     {prefix}_ClinVar_data_summary_{YYYY-MM-DD}.{ext}
//     {prefix}_ClinVar_pathogenic_variants_{YYYY-MM-DD}.{ext}
//     {prefix}_ClinVar_pathogenic_variants_detailed_{YYYY-MM-DD}.{ext}
//     {prefix}_ClinVar_variant_label_counts_{YYYY-MM-DD}.{ext}
//     {prefix}_ClinVar_rcv_label_counts_{YYYY-MM-DD}.{ext}
//     {prefix}_ClinVar_gene_label_counts_{YYYY-MM-DD}.{ext}
//     {prefix}_ClinVar_condition_label_counts_{YYYY-MM-DD}.{ext}
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// Apache Arrow/Parquet for columnar data
use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::config::GenomeBuild;
use crate::exploratory::{ExploratoryTables, LabelTally};
use crate::merger::AnnotationTables;
use crate::parsers::RejectedRecord;
use crate::table::{detail_table, summary_table, Cell, Column, ColumnKind, Table, TableLayout};

/// Supported result table formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated text (spreadsheets, R, pandas)
    Tsv,
    /// JSON (web APIs and JavaScript); keeps nested fields structured
    Json,
    /// Apache Parquet (Python, R, Spark)
    Parquet,
}

impl OutputFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Consensus label with its variant count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Run metadata written next to the result tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub created_at: DateTime<Local>,
    pub build: GenomeBuild,
    pub input_file: String,
    pub source: String,
    pub input_variants: usize,
    pub reported_variants: usize,
    pub unreported_variants: usize,
    pub submission_rows: usize,
    /// Variants per consensus label, in configured label order
    pub label_counts: Vec<LabelCount>,
    /// Variants classified by each cascade rule
    pub rule_counts: BTreeMap<String, usize>,
    pub rejected: Vec<RejectedRecord>,
}

/// Writes one run's result tables
#[derive(Debug, Clone)]
pub struct OutputWriter {
    annotation_dir: PathBuf,
    exploratory_dir: PathBuf,
    prefix: String,
    date: String,
}

impl OutputWriter {
    /// # Arguments
    /// * `out_dir` - Parent directory for the run directory
    /// * `prefix` - File name prefix
    /// * `timestamp` - Run start time (names the run directory and files)
    pub fn new(out_dir: impl AsRef<Path>, prefix: &str, timestamp: DateTime<Local>) -> Self {
        let run_dir = out_dir.as_ref().join(format!(
            "{}_ClinVar_annotation_{}",
            prefix,
            timestamp.format("%Y-%m-%d_%H%M%S")
        ));
        Self {
            annotation_dir: run_dir.join("annotation"),
            exploratory_dir: run_dir.join("exploratory_analysis"),
            prefix: prefix.to_string(),
            date: timestamp.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn annotation_dir(&self) -> &Path {
        &self.annotation_dir
    }

    pub fn exploratory_dir(&self) -> &Path {
        &self.exploratory_dir
    }

    fn table_path(&self, table: &str, format: OutputFormat) -> PathBuf {
        self.file_path(&self.annotation_dir, table, format)
    }

    fn file_path(&self, dir: &Path, table: &str, format: OutputFormat) -> PathBuf {
        dir.join(format!(
            "{}_ClinVar_{}_{}.{}",
            self.prefix,
            table,
            self.date,
            format.extension()
        ))
    }

    /// Write both result tables in every requested format
    ///
    /// # Arguments
    /// * `formats` - Formats to generate
    /// * `tables` - Merged summary and detail tables
    /// * `layout` - Input column names for the flat formats
    ///
    /// # Returns
    /// * Map of format -> (summary path, detail path)
    pub fn write_tables(
        &self,
        formats: &[OutputFormat],
        tables: &AnnotationTables,
        layout: &TableLayout,
    ) -> Result<BTreeMap<OutputFormat, (PathBuf, PathBuf)>> {
        std::fs::create_dir_all(&self.annotation_dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.annotation_dir))?;

        let needs_flat = formats.iter().any(|f| *f != OutputFormat::Json);
        let flat = needs_flat.then(|| {
            (
                summary_table(&tables.summaries, layout),
                detail_table(&tables.details, layout),
            )
        });

        let mut result = BTreeMap::new();
        for &format in formats {
            let summary_path = self.table_path("variant_summary", format);
            let detail_path = self.table_path("variant_full", format);

            match (format, &flat) {
                (OutputFormat::Json, _) => {
                    write_json(&summary_path, &tables.summaries)?;
                    write_json(&detail_path, &tables.details)?;
                }
                (OutputFormat::Tsv, Some((summary, detail))) => {
                    write_tsv(&summary_path, summary)?;
                    write_tsv(&detail_path, detail)?;
                }
                (OutputFormat::Parquet, Some((summary, detail))) => {
                    write_parquet(&summary_path, summary)?;
                    write_parquet(&detail_path, detail)?;
                }
                (_, None) => anyhow::bail!("Flat tables were not built for {:?}", format),
            }
            result.insert(format, (summary_path, detail_path));
        }

        Ok(result)
    }

    /// Write the exploratory tables in every requested format
    ///
    /// # Arguments
    /// * `formats` - Formats to generate
    /// * `tables` - Exploratory tables derived from the merged tables
    /// * `layout` - Input column names for the pathogenic variant tables
    ///
    /// # Returns
    /// * Every written path, in write order
    pub fn write_exploratory(
        &self,
        formats: &[OutputFormat],
        tables: &ExploratoryTables,
        layout: &TableLayout,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.exploratory_dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.exploratory_dir))?;

        let needs_flat = formats.iter().any(|f| *f != OutputFormat::Json);
        let flat = needs_flat.then(|| {
            vec![
                ("data_summary", tables.dataset.to_table()),
                ("pathogenic_variants", summary_table(&tables.pathogenic.summaries, layout)),
                ("pathogenic_variants_detailed", detail_table(&tables.pathogenic.details, layout)),
                ("variant_label_counts", tally_table(&tables.variant_labels)),
                ("rcv_label_counts", tally_table(&tables.rcv_labels)),
                ("gene_label_counts", tables.by_gene.to_table()),
                ("condition_label_counts", tables.by_condition.to_table()),
            ]
        });

        let mut written = Vec::new();
        for &format in formats {
            let dir = &self.exploratory_dir;
            match (format, &flat) {
                (OutputFormat::Json, _) => {
                    let outputs = [
                        ("data_summary", serde_json::to_value(&tables.dataset)),
                        ("pathogenic_variants", serde_json::to_value(&tables.pathogenic.summaries)),
                        ("pathogenic_variants_detailed", serde_json::to_value(&tables.pathogenic.details)),
                        ("variant_label_counts", serde_json::to_value(&tables.variant_labels)),
                        ("rcv_label_counts", serde_json::to_value(&tables.rcv_labels)),
                        ("gene_label_counts", serde_json::to_value(&tables.by_gene)),
                        ("condition_label_counts", serde_json::to_value(&tables.by_condition)),
                    ];
                    for (name, value) in outputs {
                        let value = value.with_context(|| format!("Failed to serialize {}", name))?;
                        let path = self.file_path(dir, name, format);
                        write_json(&path, &value)?;
                        written.push(path);
                    }
                }
                (OutputFormat::Tsv | OutputFormat::Parquet, Some(flat)) => {
                    for (name, table) in flat {
                        let path = self.file_path(dir, name, format);
                        if format == OutputFormat::Tsv {
                            write_tsv(&path, table)?;
                        } else {
                            write_parquet(&path, table)?;
                        }
                        written.push(path);
                    }
                }
                (_, None) => anyhow::bail!("Flat tables were not built for {:?}", format),
            }
        }

        info!("Wrote {} exploratory files to {:?}", written.len(), self.exploratory_dir);
        Ok(written)
    }

    /// Write `run_metadata.json`
    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.annotation_dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.annotation_dir))?;
        let path = self.annotation_dir.join("run_metadata.json");
        write_json(&path, metadata)?;
        Ok(path)
    }
}

/// Generate JSON output
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    info!("Generating JSON output: {:?}", path);

    let file = std::fs::File::create(path).context("Failed to create JSON output file")?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)
        .context("Failed to write JSON output")?;

    Ok(())
}

/// Generate tab-separated output
fn write_tsv(path: &Path, table: &Table) -> Result<()> {
    info!("Generating TSV output: {:?}", path);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .context("Failed to create TSV output file")?;

    writer
        .write_record(table.columns.iter().map(|c| c.name.as_str()))
        .context("Failed to write TSV header")?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(Cell::render))
            .context("Failed to write TSV row")?;
    }
    writer.flush().context("Failed to flush TSV output")?;

    info!("TSV output complete: {} rows", table.rows.len());
    Ok(())
}

/// Label / variants (/ variant-RCV pairs) table of a label tally
fn tally_table(tally: &[LabelTally]) -> Table {
    let with_pairs = tally.iter().any(|t| t.variant_rcv_pairs.is_some());
    let mut columns = vec![
        Column {
            name: "clinical_significance".to_string(),
            kind: ColumnKind::Text,
        },
        Column {
            name: "variants".to_string(),
            kind: ColumnKind::Integer,
        },
    ];
    if with_pairs {
        columns.push(Column {
            name: "variant_rcv_pairs".to_string(),
            kind: ColumnKind::Integer,
        });
    }

    let rows = tally
        .iter()
        .map(|t| {
            let mut row = vec![Cell::Text(t.label.clone()), Cell::Integer(t.variants as u64)];
            if with_pairs {
                row.push(t.variant_rcv_pairs.map_or(Cell::Null, |n| Cell::Integer(n as u64)));
            }
            row
        })
        .collect();

    Table { columns, rows }
}

/// Build one Arrow array for column `idx`
fn column_array(table: &Table, idx: usize, kind: ColumnKind) -> ArrayRef {
    let cells = table.rows.iter().map(|row| row.get(idx));
    match kind {
        ColumnKind::Text => Arc::new(StringArray::from(
            cells
                .map(|c| match c {
                    None | Some(Cell::Null) => None,
                    Some(Cell::Text(s)) => Some(s.clone()),
                    Some(other) => Some(other.render()),
                })
                .collect::<Vec<Option<String>>>(),
        )),
        ColumnKind::Integer => Arc::new(UInt64Array::from(
            cells
                .map(|c| match c {
                    Some(Cell::Integer(n)) => Some(*n),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            cells
                .map(|c| match c {
                    Some(Cell::Float(f)) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Boolean => Arc::new(BooleanArray::from(
            cells
                .map(|c| match c {
                    Some(Cell::Boolean(b)) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Generate Parquet output (columnar format for data science)
fn write_parquet(path: &Path, table: &Table) -> Result<()> {
    info!("Generating Parquet output: {:?}", path);

    // Create Arrow schema
    let schema = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .map(|c| {
                let data_type = match c.kind {
                    ColumnKind::Text => DataType::Utf8,
                    ColumnKind::Integer => DataType::UInt64,
                    ColumnKind::Float => DataType::Float64,
                    ColumnKind::Boolean => DataType::Boolean,
                };
                Field::new(c.name.as_str(), data_type, true)
            })
            .collect::<Vec<_>>(),
    ));

    let arrays: Vec<ArrayRef> = table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, c)| column_array(table, idx, c.kind))
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .context("Failed to create Arrow RecordBatch")?;

    // Write to Parquet file with compression
    let file = std::fs::File::create(path).context("Failed to create Parquet file")?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .context("Failed to create Parquet writer")?;
    writer.write(&batch).context("Failed to write Parquet data")?;
    writer.close().context("Failed to close Parquet writer")?;

    info!("Parquet output complete: {} rows", table.rows.len());
    Ok(())
}
