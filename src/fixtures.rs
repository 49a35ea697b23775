// ==============================================================================
// fixtures.rs - Test Fixtures
// ==============================================================================
// Description: Builders for submission relations used by unit tests
// Author: Matt Barham
// Created: 2026-01-23
// Modified: 2026-01-23
// Version: 1.0.0
// ==============================================================================

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{InputVariant, ReviewStatus, SubmissionRecord, VariantDescriptor, VariantKey};

/// Builder for one `SubmissionRecord`
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: SubmissionRecord,
}

/// Start a submission row for `variant`/`accession` with term `significance`.
///
/// Defaults: single-submitter review status, condition "disease A".
pub fn record(variant: &str, accession: &str, significance: &str) -> RecordBuilder {
    RecordBuilder {
        record: SubmissionRecord {
            variant: VariantKey::new(variant),
            accession: accession.to_string(),
            condition: Some("disease A".to_string()),
            condition_synonyms: None,
            condition_identifiers: BTreeMap::new(),
            rcv_condition: Some("disease A".to_string()),
            significance: significance.to_string(),
            review_status: ReviewStatus::CriteriaProvidedSingleSubmitter,
            number_submitters: Some(1),
            last_evaluated: None,
            origin: None,
            preferred_name: None,
            descriptor: Arc::new(VariantDescriptor::default()),
        },
    }
}

impl RecordBuilder {
    /// Set the condition (and the matching RCV-level label)
    pub fn condition(mut self, condition: Option<&str>) -> Self {
        self.record.condition = condition.map(String::from);
        self.record.rcv_condition = condition.map(String::from);
        self
    }

    pub fn rcv_condition(mut self, label: &str) -> Self {
        self.record.rcv_condition = Some(label.to_string());
        self
    }

    pub fn review(mut self, status: ReviewStatus) -> Self {
        self.record.review_status = status;
        self
    }

    pub fn evaluated(mut self, y: i32, m: u32, d: u32) -> Self {
        self.record.last_evaluated = NaiveDate::from_ymd_opt(y, m, d);
        self
    }

    pub fn identifier(mut self, db: &str, id: &str) -> Self {
        self.record.condition_identifiers.insert(db.to_string(), id.to_string());
        self
    }

    pub fn synonyms(mut self, synonyms: &str) -> Self {
        self.record.condition_synonyms = Some(synonyms.to_string());
        self
    }

    pub fn gene(mut self, symbol: &str) -> Self {
        self.record.descriptor = Arc::new(VariantDescriptor {
            gene_symbol: Some(symbol.to_string()),
            ..VariantDescriptor::default()
        });
        self
    }

    pub fn build(self) -> SubmissionRecord {
        self.record
    }
}

/// Input variant whose key matches `VariantKey::from_parts`
pub fn input_variant(chrom: &str, position: u64, ref_allele: &str, alt_allele: &str) -> InputVariant {
    InputVariant {
        key: VariantKey::from_parts(chrom, position, ref_allele, alt_allele),
        chrom: chrom.to_string(),
        position,
        ref_allele: ref_allele.to_string(),
        alt_allele: alt_allele.to_string(),
        extra: BTreeMap::new(),
    }
}
