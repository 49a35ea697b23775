// ==============================================================================
// parsers/normalizer.rs - ClinVar Record Normalizer
// ==============================================================================
// Description: Flattens nested per-variant ClinVar documents into the flat
//              submission relation (one row per variant/RCV/condition/term)
// Author: Matt Barham
// Created: 2026-01-20
// Modified: 2026-10-16
// Version: 1.2.0
// ==============================================================================
// Input document shape (MyVariant.info `clinvar` field):
//   { "variant_id": 12375, "rsid": "rs121913529", "gene": {"symbol": "KRAS"},
//     "hg19": {"start": 25398284, "end": 25398284},
//     "rcv": [ { "accession": "RCV000013406",
//                "clinical_significance": "Pathogenic, risk factor",
//                "conditions": {"name": "...", "identifiers": {...}},
//                "review_status": "...", "last_evaluated": "2017-10-19" }, ... ] }
// `gene`, `rcv`, `conditions`, condition `name`, `synonyms`, `identifiers`
// (and each identifier value), `origin` and `hgvs.*` may each be absent, a
// single item, or a list. Scalar descriptor fields must have their documented
// type when present.
// ==============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    GenomicSpan, ReviewStatus, SubmissionRecord, VariantDescriptor, VariantKey, TERM_NOT_PROVIDED,
};
use crate::parsers::nested::{Nested, ShapeError};

/// One query result from the annotation source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQueryResult {
    /// Query identifier (the input variant key)
    pub query: VariantKey,
    /// The `clinvar` document; `None` marks a "not found" result
    pub document: Option<Value>,
}

impl RawQueryResult {
    pub fn not_found(query: VariantKey) -> Self {
        Self { query, document: None }
    }

    pub fn found(query: VariantKey, document: Value) -> Self {
        Self { query, document: Some(document) }
    }
}

/// What to do when one query result is malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Fail the whole batch
    #[default]
    RejectBatch,
    /// Drop the offending result and report it alongside the relation
    Isolate,
}

/// Errors raised while normalizing raw records
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Malformed record for {query}: field '{field}': {details}")]
    MalformedRecord {
        query: VariantKey,
        field: String,
        details: String,
    },
}

/// A query result dropped under `MalformedPolicy::Isolate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub query: VariantKey,
    pub reason: String,
}

/// The flat submission relation plus bookkeeping for the merger
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<SubmissionRecord>,
    /// Queried variants that produced no rows
    pub not_found: BTreeSet<VariantKey>,
    pub rejected: Vec<RejectedRecord>,
}

impl NormalizedBatch {
    /// Distinct variant keys present in the relation
    pub fn variant_keys(&self) -> BTreeSet<&VariantKey> {
        self.records.iter().map(|r| &r.variant).collect()
    }
}

/// Result of normalizing one query batch
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// No queried variant produced a submission row; downstream stages must be skipped
    Empty { rejected: Vec<RejectedRecord> },
    Reported(NormalizedBatch),
}

// ------------------------------------------------------------------------------
// Raw document items (nesting points stay as `Value` until resolved)
// ------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGene {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSpan {
    start: Option<u64>,
    end: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRcv {
    accession: Option<String>,
    clinical_significance: Option<String>,
    conditions: Option<Value>,
    review_status: Option<String>,
    number_submitters: Option<u32>,
    last_evaluated: Option<String>,
    origin: Option<Value>,
    preferred_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    name: Option<Value>,
    synonyms: Option<Value>,
    identifiers: Option<Value>,
}

/// Normalizer for raw annotation query results
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    policy: MalformedPolicy,
}

impl RecordNormalizer {
    pub fn new(policy: MalformedPolicy) -> Self {
        Self { policy }
    }

    /// Flatten a batch of query results into the submission relation
    ///
    /// # Arguments
    /// * `results` - Raw query results, possibly several per query key
    ///
    /// # Returns
    /// * `Ok(BatchOutcome::Reported)` - At least one submission row was produced
    /// * `Ok(BatchOutcome::Empty)` - Nothing matched; callers skip downstream stages
    /// * `Err(NormalizeError)` - A malformed record under `MalformedPolicy::RejectBatch`
    pub fn normalize(&self, results: &[RawQueryResult]) -> Result<BatchOutcome, NormalizeError> {
        let mut batch = NormalizedBatch::default();
        let mut reported: BTreeSet<VariantKey> = BTreeSet::new();

        for result in results {
            let Some(document) = &result.document else {
                batch.not_found.insert(result.query.clone());
                continue;
            };

            match normalize_document(&result.query, document) {
                Ok(rows) if rows.is_empty() => {
                    warn!("{} is in ClinVar but carries no RCV submissions", result.query);
                    batch.not_found.insert(result.query.clone());
                }
                Ok(rows) => {
                    debug!("{}: {} submission rows", result.query, rows.len());
                    reported.insert(result.query.clone());
                    batch.records.extend(rows);
                }
                Err(e) => match self.policy {
                    MalformedPolicy::RejectBatch => return Err(e),
                    MalformedPolicy::Isolate => {
                        warn!("Isolating malformed record: {}", e);
                        batch.rejected.push(RejectedRecord {
                            query: result.query.clone(),
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        // A duplicated query may have been marked missing by one hit and found by another
        batch.not_found.retain(|key| !reported.contains(key));
        for rejected in &batch.rejected {
            batch.not_found.remove(&rejected.query);
        }

        info!(
            "Normalized {} submission rows for {} variants ({} not found, {} rejected)",
            batch.records.len(),
            reported.len(),
            batch.not_found.len(),
            batch.rejected.len()
        );

        if batch.records.is_empty() {
            return Ok(BatchOutcome::Empty { rejected: batch.rejected });
        }
        Ok(BatchOutcome::Reported(batch))
    }
}

/// Split a possibly comma-joined significance string into single terms
///
/// Empty input yields the ClinVar term "not provided" so every row carries a term.
pub fn explode_significance(raw: Option<&str>) -> Vec<String> {
    let terms: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    if terms.is_empty() {
        vec![TERM_NOT_PROVIDED.to_string()]
    } else {
        terms
    }
}

fn malformed(query: &VariantKey, field: &str, details: String) -> NormalizeError {
    NormalizeError::MalformedRecord {
        query: query.clone(),
        field: field.to_string(),
        details,
    }
}

fn shape_of<'q>(query: &'q VariantKey, field: &str) -> impl FnOnce(ShapeError) -> NormalizeError + 'q {
    let field = field.to_string();
    move |e: ShapeError| malformed(query, &field, e.to_string())
}

fn normalize_document(query: &VariantKey, document: &Value) -> Result<Vec<SubmissionRecord>, NormalizeError> {
    let doc = document
        .as_object()
        .ok_or_else(|| malformed(query, "clinvar", "expected an object".to_string()))?;

    let descriptor = Arc::new(parse_descriptor(query, doc)?);

    let rcvs: Nested<RawRcv> = Nested::resolve(doc.get("rcv")).map_err(shape_of(query, "rcv"))?;

    let mut rows = Vec::new();
    for rcv in rcvs.into_vec() {
        let accession = rcv
            .accession
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| malformed(query, "rcv.accession", "missing accession".to_string()))?;

        let conditions: Nested<RawCondition> =
            Nested::resolve(rcv.conditions.as_ref()).map_err(shape_of(query, "rcv.conditions"))?;

        let last_evaluated = rcv
            .last_evaluated
            .as_deref()
            .map(|date| {
                parse_date(date).ok_or_else(|| {
                    malformed(query, "rcv.last_evaluated", format!("invalid date '{}'", date))
                })
            })
            .transpose()?;

        let origin: Nested<String> =
            Nested::resolve(rcv.origin.as_ref()).map_err(shape_of(query, "rcv.origin"))?;
        let origin = join_non_empty(origin.into_vec(), ", ");

        let review_status = ReviewStatus::from_text(rcv.review_status.as_deref().unwrap_or_default());
        let terms = explode_significance(rcv.clinical_significance.as_deref());

        // (name, synonyms, identifiers) per condition; a submission without conditions keeps one null row
        let mut flattened = Vec::new();
        for condition in conditions.into_vec() {
            let names: Nested<String> =
                Nested::resolve(condition.name.as_ref()).map_err(shape_of(query, "rcv.conditions.name"))?;
            let synonyms: Nested<String> = Nested::resolve(condition.synonyms.as_ref())
                .map_err(shape_of(query, "rcv.conditions.synonyms"))?;
            let identifiers = parse_identifiers(query, condition.identifiers.as_ref())?;
            flattened.push((
                join_non_empty(names.into_vec(), ", "),
                join_non_empty(synonyms.into_vec(), ", "),
                identifiers,
            ));
        }
        if flattened.is_empty() {
            flattened.push((None, None, BTreeMap::new()));
        }

        let names: BTreeSet<&str> = flattened.iter().filter_map(|(name, _, _)| name.as_deref()).collect();
        let rcv_condition = if names.is_empty() {
            None
        } else {
            Some(names.into_iter().collect::<Vec<_>>().join("; "))
        };

        for (name, synonyms, identifiers) in &flattened {
            for term in &terms {
                rows.push(SubmissionRecord {
                    variant: query.clone(),
                    accession: accession.trim().to_string(),
                    condition: name.clone(),
                    condition_synonyms: synonyms.clone(),
                    condition_identifiers: identifiers.clone(),
                    rcv_condition: rcv_condition.clone(),
                    significance: term.clone(),
                    review_status: review_status.clone(),
                    number_submitters: rcv.number_submitters,
                    last_evaluated,
                    origin: origin.clone(),
                    preferred_name: rcv.preferred_name.clone(),
                    descriptor: Arc::clone(&descriptor),
                });
            }
        }
    }

    Ok(rows)
}

/// Resolve a condition's `identifiers` (one object or a list of objects)
/// into `database -> ", "-joined ids`
///
/// Each identifier value may be a string, a number, or a homogeneous list of either.
fn parse_identifiers(query: &VariantKey, raw: Option<&Value>) -> Result<BTreeMap<String, String>, NormalizeError> {
    const FIELD: &str = "rcv.conditions.identifiers";

    let maps: Nested<Map<String, Value>> = Nested::resolve(raw).map_err(shape_of(query, FIELD))?;

    let mut collected: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for map in maps.into_vec() {
        for (database, value) in map {
            let items: Nested<Value> = Nested::resolve(Some(&value))
                .map_err(shape_of(query, &format!("{}.{}", FIELD, database)))?;
            let ids = collected.entry(database.clone()).or_default();
            for item in items.into_vec() {
                let id = match item {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    other => {
                        return Err(malformed(
                            query,
                            &format!("{}.{}", FIELD, database),
                            format!("expected a string or number, found {}", other),
                        ))
                    }
                };
                if !id.is_empty() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }

    Ok(collected
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(database, ids)| (database, ids.join(", ")))
        .collect())
}

/// Optional string field; present with any other type is malformed
fn text_field(query: &VariantKey, doc: &Map<String, Value>, field: &str) -> Result<Option<String>, NormalizeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(malformed(query, field, format!("expected a string, found {}", other))),
    }
}

fn parse_descriptor(query: &VariantKey, doc: &Map<String, Value>) -> Result<VariantDescriptor, NormalizeError> {
    let genes: Nested<RawGene> = Nested::resolve(doc.get("gene")).map_err(shape_of(query, "gene"))?;
    let gene_symbol = join_non_empty(genes.into_vec().into_iter().filter_map(|g| g.symbol).collect(), ", ");

    let span = |field: &str| -> Result<Option<GenomicSpan>, NormalizeError> {
        let spans: Nested<RawSpan> = Nested::resolve(doc.get(field)).map_err(shape_of(query, field))?;
        Ok(spans.into_vec().into_iter().next().map(|s| GenomicSpan { start: s.start, end: s.end }))
    };

    let hgvs = match doc.get("hgvs") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            return Err(malformed(query, "hgvs", format!("expected an object, found {}", other)));
        }
    };
    let hgvs_list = |field: &str| -> Result<Vec<String>, NormalizeError> {
        let path = format!("hgvs.{}", field);
        let items: Nested<String> =
            Nested::resolve(hgvs.and_then(|h| h.get(field))).map_err(shape_of(query, &path))?;
        Ok(items.into_vec())
    };

    let variant_id = match doc.get("variant_id") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_u64().ok_or_else(|| {
            malformed(query, "variant_id", format!("expected an unsigned integer, found {}", value))
        })?),
    };

    Ok(VariantDescriptor {
        variant_id,
        rsid: text_field(query, doc, "rsid")?,
        variant_type: text_field(query, doc, "type")?,
        gene_symbol,
        chrom: text_field(query, doc, "chrom")?,
        ref_allele: text_field(query, doc, "ref")?,
        alt_allele: text_field(query, doc, "alt")?,
        hg19: span("hg19")?,
        hg38: span("hg38")?,
        hgvs_coding: hgvs_list("coding")?,
        hgvs_genomic: hgvs_list("genomic")?,
    })
}

/// ClinVar dates are "YYYY-MM-DD", occasionally with a time suffix
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn join_non_empty(items: Vec<String>, sep: &str) -> Option<String> {
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items.join(sep))
    }
}
