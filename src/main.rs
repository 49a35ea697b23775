// ==============================================================================
// main.rs - ClinVar Annotation Entry Point
// ==============================================================================
// Description: Command-line driver for ClinVar consensus annotation of a
//              variant list
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-16
// Version: 2.0.1
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinvar_consensus::config::{ClinsigConfig, GenomeBuild, RunSettings};
use clinvar_consensus::exploratory::PathogenicScope;
use clinvar_consensus::output::OutputFormat;
use clinvar_consensus::parsers::{InputParser, MalformedPolicy};
use clinvar_consensus::processor::AnnotationProcessor;
use clinvar_consensus::source::{AnnotationSource, JsonFileSource, MyVariantClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Variant list (CSV, or tab-delimited for any other extension)
    #[arg(short, long, env = "CLINVAR_VAR_FILE")]
    var_file: PathBuf,

    /// Output directory
    #[arg(short, long, env = "CLINVAR_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Prefix for output file names
    #[arg(short = 'p', long, env = "CLINVAR_OUT_PREFIX", default_value = "variants")]
    out_prefix: String,

    /// Genome build of the input coordinates
    #[arg(short, long, env = "CLINVAR_BUILD", value_enum, default_value = "hg19")]
    build: GenomeBuild,

    /// Chromosome, position, reference and alternate column names
    #[arg(long, env = "CLINVAR_COLS_VAR", value_delimiter = ',', default_value = "CHR,POS,REF,ALT")]
    cols_var: Vec<String>,

    /// Input columns to carry into the result tables
    #[arg(long, env = "CLINVAR_COLS_INPUT", value_delimiter = ',')]
    cols_input: Vec<String>,

    /// Tab-delimited clinical significance settings (label, sort_order, color_rgb, alias)
    #[arg(long, env = "CLINVAR_CLINSIG_SETTINGS")]
    clinsig_settings: Option<PathBuf>,

    /// Saved MyVariant.info responses (JSON array, optionally .gz) instead of live queries
    #[arg(long, env = "CLINVAR_SOURCE_FILE")]
    source_file: Option<PathBuf>,

    /// MyVariant.info batch endpoint
    #[arg(long, env = "CLINVAR_ENDPOINT")]
    endpoint: Option<String>,

    /// Variants per request
    #[arg(long, env = "CLINVAR_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Retries per request after the first attempt
    #[arg(long, env = "CLINVAR_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Request timeout in seconds
    #[arg(long, env = "CLINVAR_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Drop malformed records instead of failing the run
    #[arg(long, env = "CLINVAR_ISOLATE_MALFORMED")]
    isolate_malformed: bool,

    /// Output formats
    #[arg(long, env = "CLINVAR_FORMATS", value_enum, value_delimiter = ',', default_value = "tsv")]
    formats: Vec<OutputFormat>,

    /// Pathogenic flag selecting the exploratory pathogenic variant tables
    #[arg(long, env = "CLINVAR_PATHOGENIC_SCOPE", value_enum, default_value = "any-condition")]
    pathogenic_scope: PathogenicScope,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinvar_consensus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("ClinVar annotation starting...");

    // Parse command line arguments
    let args = Args::parse();

    let variant_columns: [String; 4] = args
        .cols_var
        .clone()
        .try_into()
        .map_err(|cols: Vec<String>| anyhow::anyhow!("--cols-var needs 4 column names, got {}", cols.len()))?;

    let config = ClinsigConfig::load_or_default(args.clinsig_settings.as_deref())
        .context("Failed to load clinical significance settings")?;

    let mut formats = args.formats.clone();
    formats.sort();
    formats.dedup();

    let settings = RunSettings {
        build: args.build,
        chunk_size: args.chunk_size,
        request_timeout: Duration::from_secs(args.timeout),
        malformed_policy: if args.isolate_malformed {
            MalformedPolicy::Isolate
        } else {
            MalformedPolicy::RejectBatch
        },
        formats,
        pathogenic_scope: args.pathogenic_scope,
        ..RunSettings::default()
    }
    .with_retries(args.max_retries);

    let source: Box<dyn AnnotationSource> = match &args.source_file {
        Some(path) => {
            if args.endpoint.is_some() {
                warn!("--endpoint is ignored when --source-file is given");
            }
            Box::new(JsonFileSource::new(path))
        }
        None => Box::new(
            MyVariantClient::new(&settings, args.endpoint.clone())
                .context("Failed to create MyVariant.info client")?,
        ),
    };

    let processor = AnnotationProcessor::new(
        settings,
        config,
        InputParser::new(variant_columns, args.cols_input.clone()),
        source,
    );

    match processor.process(&args.var_file, &args.out_dir, &args.out_prefix).await {
        Ok(result_path) => {
            info!("Processing completed successfully: {:?}", result_path);
            Ok(())
        }
        Err(e) => {
            warn!("Processing failed: {:#}", e);
            Err(e)
        }
    }
}
