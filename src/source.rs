// ==============================================================================
// source.rs - ClinVar Annotation Sources
// ==============================================================================
// Description: Fetches raw per-variant ClinVar documents from MyVariant.info
//              (chunked, retried) or from an offline JSON response file
// Author: Matt Barham
// Created: 2026-01-28
// Modified: 2026-02-03
// Version: 1.1.0
// ==============================================================================
// Response shape (MyVariant.info POST /v1/variant):
//   [ {"query": "chr1:g.100A>G", "_id": "...", "clinvar": {...}},
//     {"query": "chr2:g.200C>T", "notfound": true}, ... ]
// ==============================================================================

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{GenomeBuild, RunSettings};
use crate::models::VariantKey;
use crate::parsers::RawQueryResult;

/// Public MyVariant.info batch endpoint
pub const DEFAULT_ENDPOINT: &str = "https://myvariant.info/v1/variant";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Annotation source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SourceError {
    /// Transport failures, rate limiting and server errors are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SourceError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Provider of raw ClinVar documents for variant keys
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    /// Fetch one result per hit; requested keys without a hit come back as
    /// "not found" results.
    async fn fetch(&self, keys: &[VariantKey], build: GenomeBuild) -> Result<Vec<RawQueryResult>, SourceError>;

    /// Human-readable source description for run metadata
    fn describe(&self) -> String;
}

/// Convert a batch response body into query results
///
/// # Arguments
/// * `body` - JSON array of hit objects (a lone object is accepted too)
///
/// # Returns
/// * One `RawQueryResult` per hit; hits without a `clinvar` document are "not found"
pub fn parse_response(body: Value) -> Result<Vec<RawQueryResult>, SourceError> {
    let hits = match body {
        Value::Array(items) => items,
        Value::Object(_) => vec![body],
        other => {
            return Err(SourceError::Decode(format!(
                "expected an array of hits, found {}",
                type_name(&other)
            )))
        }
    };

    hits.into_iter()
        .map(|mut hit| {
            let query = hit
                .get("query")
                .and_then(Value::as_str)
                .map(VariantKey::new)
                .ok_or_else(|| SourceError::Decode(format!("hit without a query string: {}", hit)))?;

            let not_found = hit.get("notfound").and_then(Value::as_bool).unwrap_or(false);
            let document = hit.get_mut("clinvar").map(Value::take);

            Ok(match document {
                Some(doc) if !not_found && !doc.is_null() => RawQueryResult::found(query, doc),
                _ => RawQueryResult::not_found(query),
            })
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Add "not found" results for requested keys the response never mentioned
fn fill_missing(keys: &[VariantKey], results: &mut Vec<RawQueryResult>) {
    let answered: BTreeSet<VariantKey> = results.iter().map(|r| r.query.clone()).collect();
    let missing: BTreeSet<&VariantKey> = keys.iter().filter(|k| !answered.contains(*k)).collect();
    results.extend(missing.into_iter().cloned().map(RawQueryResult::not_found));
}

// ------------------------------------------------------------------------------
// MyVariant.info HTTP client
// ------------------------------------------------------------------------------

/// MyVariant.info batch client
pub struct MyVariantClient {
    client: reqwest::Client,
    endpoint: String,
    chunk_size: usize,
    max_attempts: u32,
    settings: RunSettings,
}

impl MyVariantClient {
    /// # Arguments
    /// * `settings` - Chunk size, retry and timeout settings
    /// * `endpoint` - Override for the batch endpoint (defaults to MyVariant.info)
    pub fn new(settings: &RunSettings, endpoint: Option<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("clinvar-consensus/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            chunk_size: settings.chunk_size.max(1),
            max_attempts: settings.max_attempts.max(1),
            settings: settings.clone(),
        })
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<Value, SourceError> {
        let response = self.client.post(&self.endpoint).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_chunk(&self, chunk: &[VariantKey], build: GenomeBuild) -> Result<Vec<RawQueryResult>, SourceError> {
        let ids = chunk.iter().map(VariantKey::as_str).collect::<Vec<_>>().join(",");
        let form = [("ids", ids.as_str()), ("fields", "clinvar"), ("assembly", build.as_str())];

        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.post(&form).await {
                Ok(body) => return parse_response(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(SourceError::RetriesExhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    })
                }
                Err(e) => e,
            };

            let delay = self.settings.backoff_for(attempt);
            warn!(
                "Request attempt {}/{} failed ({}), retrying in {:?}",
                attempt, self.max_attempts, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AnnotationSource for MyVariantClient {
    async fn fetch(&self, keys: &[VariantKey], build: GenomeBuild) -> Result<Vec<RawQueryResult>, SourceError> {
        let chunks = keys.len().div_ceil(self.chunk_size);
        info!(
            "Querying {} for {} variants ({} requests, assembly {})",
            self.endpoint,
            keys.len(),
            chunks,
            build.as_str()
        );

        let mut results = Vec::with_capacity(keys.len());
        for (i, chunk) in keys.chunks(self.chunk_size).enumerate() {
            debug!("Request {}/{}: {} variants", i + 1, chunks, chunk.len());
            results.extend(self.fetch_chunk(chunk, build).await?);
        }

        fill_missing(keys, &mut results);
        Ok(results)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

// ------------------------------------------------------------------------------
// Offline response file
// ------------------------------------------------------------------------------

/// Saved batch responses on disk (plain or `.gz` JSON array)
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_body(path: &Path) -> Result<Value, SourceError> {
        let file = std::fs::File::open(path)?;
        let mut text = String::new();

        if path.extension().is_some_and(|ext| ext == "gz") {
            GzDecoder::new(file).read_to_string(&mut text)?;
        } else {
            std::io::BufReader::new(file).read_to_string(&mut text)?;
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AnnotationSource for JsonFileSource {
    async fn fetch(&self, keys: &[VariantKey], _build: GenomeBuild) -> Result<Vec<RawQueryResult>, SourceError> {
        info!("Reading annotation responses from {:?}", self.path);

        let path = self.path.clone();
        let body = tokio::task::spawn_blocking(move || Self::read_body(&path))
            .await
            .map_err(|e| SourceError::Decode(format!("reader task failed: {}", e)))??;

        let wanted: BTreeSet<&VariantKey> = keys.iter().collect();
        let mut results: Vec<RawQueryResult> = parse_response(body)?
            .into_iter()
            .filter(|r| wanted.contains(&r.query))
            .collect();

        debug!("{} of {} stored hits match the input", results.len(), keys.len());
        fill_missing(keys, &mut results);
        Ok(results)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
