// ==============================================================================
// classifier.rs - Clinical Significance Consensus Classifier
// ==============================================================================
// Description: Ordered 7-rule cascade assigning one consensus label per variant
//              from a shrinking pool of unclassified variant keys
// Author: Matt Barham
// Created: 2026-01-23
// Modified: 2026-02-03
// Version: 1.2.0
// ==============================================================================
// Cascade (earlier rules win; each rule only sees variants still in the pool):
//   1. single accession                 -> its term
//   2. single distinct term             -> that term
//   3. single term besides "not provided" -> that term
//   4. expert panel rows                -> their term, or Conflicting
//   5. pathogenic family present        -> P / LP / P-LP / Conflicting
//   6. benign family present            -> Benign/Likely benign / Conflicting
//   7. everything left                  -> Conflicting
// ==============================================================================

use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    Classification, ReviewStatus, Rule, SubmissionRecord, VariantKey, LABEL_CONFLICTING,
    TERM_NOT_PROVIDED,
};

const LABEL_PATHOGENIC: &str = "Pathogenic";
const LABEL_LIKELY_PATHOGENIC: &str = "Likely pathogenic";
const LABEL_PATHOGENIC_LIKELY: &str = "Pathogenic/Likely pathogenic";
const LABEL_BENIGN_LIKELY: &str = "Benign/Likely benign";

/// Terms that make a variant a pathogenic-set candidate (exact match)
const PATHOGENIC_TERMS: [&str; 3] = [LABEL_PATHOGENIC, LABEL_PATHOGENIC_LIKELY, LABEL_LIKELY_PATHOGENIC];

/// Lower-cased terms that may accompany "pathogenic" for a Pathogenic call
const PATHOGENIC_COMPATIBLE: [&str; 6] = [
    "pathogenic",
    "drug response",
    "risk factor",
    "affects",
    "association",
    "other",
];

const PATHOGENIC_AND_LIKELY: [&str; 2] = ["pathogenic", "likely pathogenic"];

/// Lower-cased terms compatible with a Pathogenic/Likely pathogenic call
const PATHOGENIC_OR_LIKELY: [&str; 4] = [
    "pathogenic",
    "likely pathogenic",
    "pathogenic/likely pathogenic",
    "drug response",
];

/// Terms that make a variant a benign-set candidate (exact match)
const BENIGN_TERMS: [&str; 3] = ["Benign", "Likely benign", LABEL_BENIGN_LIKELY];

/// Errors raised by the classification cascade
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("Variant {variant} left the classification cascade without a label")]
    Unclassified { variant: VariantKey },
}

/// Unclassified variant keys
pub type Pool<'a> = BTreeSet<&'a VariantKey>;

/// De-duplicated classification rows per variant
pub type Groups<'a> = BTreeMap<&'a VariantKey, Vec<&'a SubmissionRecord>>;

/// Consensus label and provenance for every variant of a relation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationTable {
    entries: BTreeMap<VariantKey, Classification>,
}

impl ClassificationTable {
    pub fn get(&self, variant: &VariantKey) -> Option<&Classification> {
        self.entries.get(variant)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariantKey, &Classification)> {
        self.entries.iter()
    }

    /// Number of variants each rule classified
    pub fn rule_counts(&self) -> BTreeMap<Rule, usize> {
        let mut counts = BTreeMap::new();
        for classification in self.entries.values() {
            *counts.entry(classification.rule).or_insert(0) += 1;
        }
        counts
    }
}

/// Rule cascade over the submission relation
#[derive(Debug, Clone)]
pub struct ConsensusClassifier {
    rules: Vec<Rule>,
}

impl Default for ConsensusClassifier {
    fn default() -> Self {
        Self {
            rules: Rule::CASCADE.to_vec(),
        }
    }
}

impl ConsensusClassifier {
    /// Classifier running a custom rule sequence (used to test single rules)
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Assign one consensus label to every variant in the relation
    ///
    /// # Arguments
    /// * `records` - The flat submission relation
    ///
    /// # Returns
    /// * `Ok(ClassificationTable)` - One classification per distinct variant key
    /// * `Err(ClassifyError)` - A variant left the cascade unlabeled
    pub fn classify(&self, records: &[SubmissionRecord]) -> Result<ClassificationTable, ClassifyError> {
        let (mut pool, groups) = classification_groups(records);
        info!(
            "Classifying {} variants ({} classification rows)",
            pool.len(),
            groups.values().map(Vec::len).sum::<usize>()
        );

        let mut table = ClassificationTable::default();
        for &rule in &self.rules {
            let (classified, remaining) = apply_rule(rule, &pool, &groups);
            info!(
                "Rule {} ({}): classified {} variants, {} remain",
                rule.number(),
                rule.as_str(),
                classified.len(),
                remaining.len()
            );

            for (variant, label) in classified {
                debug!("{} -> {} (rule {})", variant, label, rule.number());
                table
                    .entries
                    .insert(variant.clone(), Classification { label, rule });
            }
            pool = remaining;
        }

        if let Some(variant) = pool.into_iter().next() {
            return Err(ClassifyError::Unclassified {
                variant: variant.clone(),
            });
        }

        Ok(table)
    }
}

/// Build the initial pool and the per-variant classification rows.
///
/// Every variant of the relation enters the pool. Rows whose review status is
/// exactly "no assertion provided" are left out of the rows, and duplicate
/// (accession, condition, term, review status) rows collapse to one.
pub fn classification_groups(records: &[SubmissionRecord]) -> (Pool<'_>, Groups<'_>) {
    let mut pool = Pool::new();
    let mut groups = Groups::new();
    let mut seen = HashSet::new();

    for record in records {
        pool.insert(&record.variant);
        if record.review_status == ReviewStatus::NoAssertionProvided {
            continue;
        }
        let identity = (
            &record.variant,
            &record.accession,
            &record.condition,
            &record.significance,
            &record.review_status,
        );
        if seen.insert(identity) {
            groups.entry(&record.variant).or_default().push(record);
        }
    }

    (pool, groups)
}

/// Run one rule over the pool.
///
/// # Returns
/// * `(classified, remaining)` - Labels for the variants the rule matched and
///   the pool without them; the input pool is left untouched
pub fn apply_rule<'a>(
    rule: Rule,
    pool: &Pool<'a>,
    groups: &Groups<'a>,
) -> (BTreeMap<&'a VariantKey, String>, Pool<'a>) {
    let mut classified = BTreeMap::new();
    for &variant in pool {
        let rows = groups.get(variant).map(Vec::as_slice).unwrap_or_default();
        if let Some(label) = assess(rule, rows) {
            classified.insert(variant, label);
        }
    }

    let remaining = pool
        .iter()
        .filter(|variant| !classified.contains_key(*variant))
        .copied()
        .collect();

    (classified, remaining)
}

/// Label one variant's rows under `rule`, or `None` when the rule does not apply
pub fn assess(rule: Rule, rows: &[&SubmissionRecord]) -> Option<String> {
    match rule {
        Rule::SingleSubmission => single_submission(rows),
        Rule::SingleDistinctTerm => sole_term(rows),
        Rule::SingleDistinctTermExcludingNotProvided => sole_term(&provided(rows)),
        Rule::ExpertPanel => expert_panel(rows),
        Rule::PathogenicSet => pathogenic_set(rows),
        Rule::BenignSet => benign_set(rows),
        Rule::CatchAll => Some(LABEL_CONFLICTING.to_string()),
    }
}

fn distinct_terms<'r>(rows: &[&'r SubmissionRecord]) -> BTreeSet<&'r str> {
    rows.iter().map(|r| r.significance.as_str()).collect()
}

fn distinct_accessions<'r>(rows: &[&'r SubmissionRecord]) -> BTreeSet<&'r str> {
    rows.iter().map(|r| r.accession.as_str()).collect()
}

fn lowered_terms(rows: &[&SubmissionRecord]) -> BTreeSet<String> {
    rows.iter()
        .map(|r| r.significance.trim().to_lowercase())
        .collect()
}

fn within(terms: &BTreeSet<String>, allowed: &[&str]) -> bool {
    terms.iter().all(|t| allowed.contains(&t.as_str()))
}

/// Rows whose term is anything but "not provided"
fn provided<'r>(rows: &[&'r SubmissionRecord]) -> Vec<&'r SubmissionRecord> {
    rows.iter()
        .copied()
        .filter(|r| r.significance != TERM_NOT_PROVIDED)
        .collect()
}

fn sole_term(rows: &[&SubmissionRecord]) -> Option<String> {
    let terms = distinct_terms(rows);
    match terms.len() {
        1 => terms.into_iter().next().map(String::from),
        _ => None,
    }
}

fn single_submission(rows: &[&SubmissionRecord]) -> Option<String> {
    if distinct_accessions(rows).len() != 1 {
        return None;
    }
    // An accession whose significance exploded into several terms falls through
    sole_term(rows)
}

fn expert_panel(rows: &[&SubmissionRecord]) -> Option<String> {
    let expert: Vec<&SubmissionRecord> = rows
        .iter()
        .copied()
        .filter(|r| r.review_status == ReviewStatus::ReviewedByExpertPanel)
        .collect();

    match distinct_terms(&expert).len() {
        0 => None,
        1 => sole_term(&expert),
        _ => Some(LABEL_CONFLICTING.to_string()),
    }
}

fn pathogenic_set(rows: &[&SubmissionRecord]) -> Option<String> {
    let candidates = provided(rows);
    if !candidates
        .iter()
        .any(|r| PATHOGENIC_TERMS.contains(&r.significance.as_str()))
    {
        return None;
    }

    // Pass A: submissions carrying review criteria only
    let assessed: Vec<&SubmissionRecord> = candidates
        .iter()
        .copied()
        .filter(|r| !r.review_status.is_no_assertion())
        .collect();
    let terms = lowered_terms(&assessed);
    if terms.len() == 1 && terms.contains("likely pathogenic") {
        return Some(LABEL_LIKELY_PATHOGENIC.to_string());
    }
    if terms.contains("pathogenic") && within(&terms, &PATHOGENIC_COMPATIBLE) {
        return Some(LABEL_PATHOGENIC.to_string());
    }

    // Pass B: every candidate row
    let terms = lowered_terms(&candidates);
    let pathogenic_and_likely: BTreeSet<String> =
        PATHOGENIC_AND_LIKELY.iter().map(|t| t.to_string()).collect();
    if terms == pathogenic_and_likely {
        return Some(LABEL_LIKELY_PATHOGENIC.to_string());
    }
    if !terms.is_empty() && within(&terms, &PATHOGENIC_OR_LIKELY) {
        return Some(LABEL_PATHOGENIC_LIKELY.to_string());
    }
    Some(LABEL_CONFLICTING.to_string())
}

fn benign_set(rows: &[&SubmissionRecord]) -> Option<String> {
    let candidates = provided(rows);
    if !candidates
        .iter()
        .any(|r| BENIGN_TERMS.contains(&r.significance.as_str()))
    {
        return None;
    }

    let all_benign = candidates
        .iter()
        .all(|r| BENIGN_TERMS.contains(&r.significance.as_str()));
    if all_benign && !has_lone_unspecified_submission(rows) {
        Some(LABEL_BENIGN_LIKELY.to_string())
    } else {
        Some(LABEL_CONFLICTING.to_string())
    }
}

/// Some term group holds a single accession and a "not provided" condition
fn has_lone_unspecified_submission(rows: &[&SubmissionRecord]) -> bool {
    let mut by_term: BTreeMap<&str, Vec<&SubmissionRecord>> = BTreeMap::new();
    for &row in rows {
        by_term.entry(row.significance.as_str()).or_default().push(row);
    }

    by_term.values().any(|group| {
        group
            .iter()
            .any(|r| r.condition.as_deref() == Some(TERM_NOT_PROVIDED))
            && distinct_accessions(group).len() == 1
    })
}
