// ==============================================================================
// models.rs - ClinVar Annotation Data Models
// ==============================================================================
// Description: Data structures shared by the normalizer, classifier, analyzer
//              and merger stages of the consensus annotation pipeline
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-16
// Version: 3.1.0
// ==============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Synthesized label for variants whose submissions cannot be reconciled
pub const LABEL_CONFLICTING: &str = "Conflicting interpretations of pathogenicity";

/// Synthesized label for input variants absent from the annotation source
pub const LABEL_UNREPORTED: &str = "UNREPORTED";

/// ClinVar significance term (and condition name) meaning "nothing asserted"
pub const TERM_NOT_PROVIDED: &str = "not provided";

/// `clinvar_status` for variants found in the annotation source
pub const STATUS_REPORTED: &str = "reported";

/// `clinvar_status` for variants missing from the annotation source
pub const STATUS_NOT_IN_CLINVAR: &str = "NOT in ClinVar";

/// Position-derived variant key in HGVS genomic notation
/// (e.g. "chr7:g.140453136A>T")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantKey(String);

impl VariantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build the HGVS substitution key from the four variant columns.
    ///
    /// Any `chr` prefix (in any case) is stripped, the rest upper-cased and
    /// the lower-case `chr` prefix put back, so "x", "chrx" and "CHRX" all
    /// give "chrX".
    pub fn from_parts(chrom: &str, position: u64, ref_allele: &str, alt_allele: &str) -> Self {
        let chrom = chrom.trim();
        let bare = match chrom.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &chrom[3..],
            _ => chrom,
        };
        let chrom = format!("chr{}", bare.to_uppercase());
        Self(format!("{}:g.{}{}>{}", chrom, position, ref_allele.trim(), alt_allele.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for VariantKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VariantKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// ClinVar review-status tier, ordered from least to most evidentiary weight
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReviewStatus {
    /// Any status text this crate does not recognise (kept verbatim, lower-cased)
    Unrecognized(String),
    NoAssertionProvided,
    NoAssertionCriteriaProvided,
    /// Pre-2024 ClinVar wording of the conflicting tier
    CriteriaProvidedConflictingInterpretations,
    /// Current ClinVar wording of the conflicting tier
    CriteriaProvidedConflictingClassifications,
    CriteriaProvidedSingleSubmitter,
    CriteriaProvidedMultipleSubmitters,
    ReviewedByExpertPanel,
    PracticeGuideline,
}

impl ReviewStatus {
    /// Parse ClinVar review-status text (trimmed, case-insensitive)
    pub fn from_text(text: &str) -> Self {
        let normalized = text.trim().to_lowercase();
        match normalized.as_str() {
            "no assertion provided" => ReviewStatus::NoAssertionProvided,
            "no assertion criteria provided" => ReviewStatus::NoAssertionCriteriaProvided,
            "criteria provided, conflicting interpretations" => {
                ReviewStatus::CriteriaProvidedConflictingInterpretations
            }
            "criteria provided, conflicting classifications" => {
                ReviewStatus::CriteriaProvidedConflictingClassifications
            }
            "criteria provided, single submitter" => ReviewStatus::CriteriaProvidedSingleSubmitter,
            "criteria provided, multiple submitters, no conflicts" => {
                ReviewStatus::CriteriaProvidedMultipleSubmitters
            }
            "reviewed by expert panel" => ReviewStatus::ReviewedByExpertPanel,
            "practice guideline" => ReviewStatus::PracticeGuideline,
            _ => ReviewStatus::Unrecognized(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReviewStatus::Unrecognized(text) => text,
            ReviewStatus::NoAssertionProvided => "no assertion provided",
            ReviewStatus::NoAssertionCriteriaProvided => "no assertion criteria provided",
            ReviewStatus::CriteriaProvidedConflictingInterpretations => {
                "criteria provided, conflicting interpretations"
            }
            ReviewStatus::CriteriaProvidedConflictingClassifications => {
                "criteria provided, conflicting classifications"
            }
            ReviewStatus::CriteriaProvidedSingleSubmitter => "criteria provided, single submitter",
            ReviewStatus::CriteriaProvidedMultipleSubmitters => {
                "criteria provided, multiple submitters, no conflicts"
            }
            ReviewStatus::ReviewedByExpertPanel => "reviewed by expert panel",
            ReviewStatus::PracticeGuideline => "practice guideline",
        }
    }

    /// True for every tier whose text starts with "no assertion"
    pub fn is_no_assertion(&self) -> bool {
        self.as_str().starts_with("no assertion")
    }
}

impl From<String> for ReviewStatus {
    fn from(value: String) -> Self {
        ReviewStatus::from_text(&value)
    }
}

impl From<ReviewStatus> for String {
    fn from(value: ReviewStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start/end coordinates of a variant on one genome build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomicSpan {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Variant-level descriptive fields carried through from the annotation source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// ClinVar variation ID
    pub variant_id: Option<u64>,
    /// dbSNP identifier (e.g., "rs121913529")
    pub rsid: Option<String>,
    /// Variant type (e.g., "single nucleotide variant")
    pub variant_type: Option<String>,
    /// HGNC gene symbol
    pub gene_symbol: Option<String>,
    pub chrom: Option<String>,
    pub ref_allele: Option<String>,
    pub alt_allele: Option<String>,
    pub hg19: Option<GenomicSpan>,
    pub hg38: Option<GenomicSpan>,
    /// Transcript-level HGVS expressions
    pub hgvs_coding: Vec<String>,
    pub hgvs_genomic: Vec<String>,
}

/// One row of the flat submission relation.
///
/// Exactly one (variant, accession, condition, significance term) combination;
/// comma-joined significance strings are exploded before a row is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub variant: VariantKey,
    /// RCV accession of the submission
    pub accession: String,
    /// Condition name; `None` means no condition was reported
    pub condition: Option<String>,
    /// Condition synonyms joined with ", "
    pub condition_synonyms: Option<String>,
    /// Condition identifiers (e.g., "medgen" -> "C0027672")
    pub condition_identifiers: BTreeMap<String, String>,
    /// All condition names of this accession, sorted and joined with "; "
    pub rcv_condition: Option<String>,
    /// Single significance term
    pub significance: String,
    pub review_status: ReviewStatus,
    pub number_submitters: Option<u32>,
    pub last_evaluated: Option<NaiveDate>,
    pub origin: Option<String>,
    pub preferred_name: Option<String>,
    /// Variant-level pass-through fields shared by every row of the variant
    pub descriptor: Arc<VariantDescriptor>,
}

/// Provenance of a consensus label: which cascade rule assigned it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rule {
    SingleSubmission = 1,
    SingleDistinctTerm = 2,
    SingleDistinctTermExcludingNotProvided = 3,
    ExpertPanel = 4,
    PathogenicSet = 5,
    BenignSet = 6,
    CatchAll = 7,
}

impl Rule {
    /// Rules in cascade order
    pub const CASCADE: [Rule; 7] = [
        Rule::SingleSubmission,
        Rule::SingleDistinctTerm,
        Rule::SingleDistinctTermExcludingNotProvided,
        Rule::ExpertPanel,
        Rule::PathogenicSet,
        Rule::BenignSet,
        Rule::CatchAll,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::SingleSubmission => "single_submission",
            Rule::SingleDistinctTerm => "single_distinct_term",
            Rule::SingleDistinctTermExcludingNotProvided => "single_distinct_term_excluding_not_provided",
            Rule::ExpertPanel => "expert_panel",
            Rule::PathogenicSet => "pathogenic_set",
            Rule::BenignSet => "benign_set",
            Rule::CatchAll => "catch_all",
        }
    }
}

/// Consensus label for one variant plus the rule that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub rule: Rule,
}

/// condition -> significance term -> comma-joined sorted accessions
pub type ConflictPayload = BTreeMap<String, BTreeMap<String, String>>;

/// condition -> accession -> RCV-level condition label
pub type DuplicationPayload = BTreeMap<String, BTreeMap<String, String>>;

/// One variant from the user's input list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVariant {
    pub key: VariantKey,
    pub chrom: String,
    pub position: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    /// Optional pass-through columns requested by the user
    pub extra: BTreeMap<String, String>,
}

/// Per-variant cardinalities, coverage and conflict diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantAggregates {
    pub condition_count: usize,
    pub accession_count: usize,
    pub significance_count: usize,
    /// Distinct conditions classified exactly "Pathogenic"
    pub pathogenic_condition_count: usize,
    /// `pathogenic_condition_count / condition_count`; `None` without conditions
    pub pathogenic_condition_fraction: Option<f64>,
    pub pathogenic_conditions: Vec<String>,
    pub multi_accession: bool,
    pub multi_condition: bool,
    pub multi_significance: bool,
    /// Every condition is "Pathogenic" (or the consensus label is, once merged)
    pub pathogenic_all_conditions: bool,
    pub pathogenic_any_condition: bool,
    pub condition_conflict: bool,
    pub condition_conflict_detail: Option<ConflictPayload>,
    pub condition_duplicated: bool,
    pub condition_duplicated_detail: Option<DuplicationPayload>,
}

/// Single-valued submission fields collapsed from the most recent submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapsedSubmission {
    pub accession: String,
    pub last_evaluated: Option<NaiveDate>,
    pub review_status: ReviewStatus,
    pub number_submitters: Option<u32>,
    pub preferred_name: Option<String>,
}

/// Condition-level fields collapsed over every submission of a variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSummary {
    pub names: Vec<String>,
    pub synonyms: Vec<String>,
    pub identifiers: BTreeMap<String, Vec<String>>,
}

/// One row per input variant: the final annotation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub input: InputVariant,
    pub clinvar_status: String,
    /// Consensus label
    pub clinical_significance: String,
    /// Cascade provenance; kept for auditing, never written to result tables
    #[serde(skip)]
    pub rule: Option<Rule>,
    /// Every distinct submission-level term seen, in configured label order
    pub significance_set: Vec<String>,
    pub descriptor: Option<VariantDescriptor>,
    pub collapsed: Option<CollapsedSubmission>,
    pub conditions: ConditionSummary,
    pub aggregates: VariantAggregates,
}

/// One row per submission record, broadcast with its variant's summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDetail {
    pub record: SubmissionRecord,
    pub summary: Arc<VariantSummary>,
}
