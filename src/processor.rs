// ==============================================================================
// processor.rs - ClinVar Annotation Pipeline
// ==============================================================================
// Description: Loads the variant list, fetches ClinVar records, derives the
//              consensus classification and writes the result tables
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-16
// Version: 3.1.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregates::compute_aggregates;
use crate::classifier::ConsensusClassifier;
use crate::config::{ClinsigConfig, RunSettings};
use crate::exploratory::ExploratoryTables;
use crate::merger::{summary_counts, AnnotationTables, SummaryMerger};
use crate::models::{Rule, LABEL_UNREPORTED};
use crate::output::{LabelCount, OutputWriter, RunMetadata};
use crate::parsers::{
    BatchOutcome, InputParser, InputTable, MalformedPolicy, RawQueryResult, RecordNormalizer, RejectedRecord,
};
use crate::source::AnnotationSource;
use crate::table::TableLayout;

/// Tables and bookkeeping of a run where at least one variant was reported
#[derive(Debug, Clone)]
pub struct AnnotationResult {
    pub tables: AnnotationTables,
    pub rule_counts: BTreeMap<Rule, usize>,
    pub submission_rows: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Result of the in-memory pipeline
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// No input variant is in ClinVar; nothing was classified
    NoneReported { rejected: Vec<RejectedRecord> },
    Annotated(AnnotationResult),
}

/// Run normalization, classification, aggregation and merging over fetched results
///
/// # Arguments
/// * `input` - The user's variant list
/// * `results` - Raw annotation source results for the input keys
/// * `policy` - Handling of malformed records
/// * `config` - Label ordering for the summary
///
/// # Returns
/// * `PipelineOutcome::NoneReported` when no variant produced a submission row
pub fn annotate(
    input: &InputTable,
    results: &[RawQueryResult],
    policy: MalformedPolicy,
    config: &ClinsigConfig,
) -> Result<PipelineOutcome> {
    let batch = match RecordNormalizer::new(policy)
        .normalize(results)
        .context("Failed to normalize ClinVar records")?
    {
        BatchOutcome::Empty { rejected } => return Ok(PipelineOutcome::NoneReported { rejected }),
        BatchOutcome::Reported(batch) => batch,
    };

    let classifications = ConsensusClassifier::default()
        .classify(&batch.records)
        .context("Consensus classification failed")?;
    let aggregates = compute_aggregates(&batch.records);

    let tables = SummaryMerger::new(config)
        .merge(input, &batch.records, &classifications, &aggregates)
        .context("Failed to merge variant summaries")?;

    Ok(PipelineOutcome::Annotated(AnnotationResult {
        tables,
        rule_counts: classifications.rule_counts(),
        submission_rows: batch.records.len(),
        rejected: batch.rejected,
    }))
}

/// End-to-end annotation run
pub struct AnnotationProcessor {
    settings: RunSettings,
    config: ClinsigConfig,
    parser: InputParser,
    source: Box<dyn AnnotationSource>,
}

impl AnnotationProcessor {
    pub fn new(
        settings: RunSettings,
        config: ClinsigConfig,
        parser: InputParser,
        source: Box<dyn AnnotationSource>,
    ) -> Self {
        Self {
            settings,
            config,
            parser,
            source,
        }
    }

    /// Main processing pipeline
    ///
    /// # Arguments
    /// * `var_file` - Variant list (CSV or tab-delimited)
    /// * `out_dir` - Parent directory for the timestamped run directory
    /// * `prefix` - Output file name prefix
    ///
    /// # Returns
    /// * Path of the `annotation/` directory holding the results
    pub async fn process(&self, var_file: &Path, out_dir: &Path, prefix: &str) -> Result<PathBuf> {
        let started = Local::now();
        let run_id = Uuid::new_v4();
        info!("Starting ClinVar annotation run {} ({})", run_id, self.settings.build.as_str());

        // 1. Load input variants
        info!("Loading variant list: {:?}", var_file);
        let input = self
            .parser
            .parse(var_file)
            .with_context(|| format!("Failed to read variant list {:?}", var_file))?;
        info!("Loaded {} input variants", input.variants.len());

        // 2. Fetch raw ClinVar records
        let results = self
            .source
            .fetch(&input.keys(), self.settings.build)
            .await
            .with_context(|| format!("Failed to fetch annotations from {}", self.source.describe()))?;
        debug!("Annotation source returned {} results", results.len());

        // 3. Normalize, classify, aggregate and merge
        let outcome = annotate(&input, &results, self.settings.malformed_policy, &self.config)?;

        let mut metadata = RunMetadata {
            run_id,
            created_at: started,
            build: self.settings.build,
            input_file: var_file.display().to_string(),
            source: self.source.describe(),
            input_variants: input.variants.len(),
            reported_variants: 0,
            unreported_variants: input.variants.len(),
            submission_rows: 0,
            label_counts: Vec::new(),
            rule_counts: BTreeMap::new(),
            rejected: Vec::new(),
        };

        // 4. Write result and exploratory tables
        let writer = OutputWriter::new(out_dir, prefix, started);
        match outcome {
            PipelineOutcome::NoneReported { rejected } => {
                warn!("None of the {} input variants is reported in ClinVar", input.variants.len());
                metadata.label_counts = vec![LabelCount {
                    label: LABEL_UNREPORTED.to_string(),
                    count: input.variants.len(),
                }];
                metadata.rejected = rejected;
            }
            PipelineOutcome::Annotated(result) => {
                let layout = TableLayout {
                    variant_columns: self.parser.variant_columns.clone(),
                    extra_columns: input.extra_columns.clone(),
                };
                let paths = writer
                    .write_tables(&self.settings.formats, &result.tables, &layout)
                    .context("Failed to write result tables")?;
                for (format, (summary, detail)) in &paths {
                    debug!("{:?} outputs: {:?}, {:?}", format, summary, detail);
                }

                let exploratory =
                    ExploratoryTables::build(&result.tables, self.settings.pathogenic_scope, &self.config);
                writer
                    .write_exploratory(&self.settings.formats, &exploratory, &layout)
                    .context("Failed to write exploratory tables")?;

                let counts = summary_counts(&result.tables.summaries, &self.config);
                for (label, count) in &counts {
                    info!("  {}: {}", label, count);
                }

                metadata.unreported_variants = result
                    .tables
                    .summaries
                    .iter()
                    .filter(|s| s.rule.is_none())
                    .count();
                metadata.reported_variants = input.variants.len() - metadata.unreported_variants;
                metadata.submission_rows = result.submission_rows;
                metadata.label_counts = counts
                    .into_iter()
                    .map(|(label, count)| LabelCount { label, count })
                    .collect();
                metadata.rule_counts = result
                    .rule_counts
                    .iter()
                    .map(|(rule, count)| (rule.as_str().to_string(), *count))
                    .collect();
                metadata.rejected = result.rejected;
            }
        }

        // 5. Record run metadata
        writer
            .write_metadata(&metadata)
            .context("Failed to write run metadata")?;

        if !metadata.rejected.is_empty() {
            warn!("{} malformed records were isolated", metadata.rejected.len());
        }
        info!(
            "Annotation complete: {} reported, {} not in ClinVar, results in {:?}",
            metadata.reported_variants,
            metadata.unreported_variants,
            writer.annotation_dir()
        );
        Ok(writer.annotation_dir().to_path_buf())
    }
}
