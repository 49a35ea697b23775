// ==============================================================================
// config.rs - Clinical Significance & Run Configuration
// ==============================================================================
// Description: Clinical-significance label ordering/colour table and run
//              settings, loaded once at start-up and passed by reference
// Author: Matt Barham
// Created: 2026-01-22
// Modified: 2026-10-16
// Version: 1.1.1
// ==============================================================================
// Settings file format (tab-delimited, header required):
//   label                  sort_order   color_rgb            alias
//   Pathogenic             1            rgb(192, 0, 0)
//   Conflicting ...        4            rgb(255, 192, 0)     Conflicting, Conflicting classifications of pathogenicity
// ==============================================================================

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::exploratory::PathogenicScope;
use crate::models::{LABEL_CONFLICTING, LABEL_UNREPORTED};
use crate::output::OutputFormat;
use crate::parsers::MalformedPolicy;

/// Sort rank for labels missing from the table
pub const UNKNOWN_LABEL_RANK: u32 = 24;

/// Colour for labels missing from the table
pub const UNKNOWN_LABEL_COLOR: &str = "rgb(128, 128, 128)";

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Clinical significance settings contain no labels")]
    EmptySettings,

    #[error("Duplicate clinical significance label: {0}")]
    DuplicateLabel(String),
}

/// One row of the clinical-significance settings table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinsigLabel {
    pub label: String,
    pub sort_order: u32,
    #[serde(rename = "color_rgb", default)]
    pub color: String,
    /// Alternative spellings, ", "-separated in the settings file
    #[serde(default, deserialize_with = "split_aliases")]
    pub alias: Vec<String>,
}

fn split_aliases<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect())
}

/// Label ordering and colour lookups (case-insensitive on labels and aliases)
#[derive(Debug, Clone)]
pub struct ClinsigConfig {
    labels: Vec<ClinsigLabel>,
    index: HashMap<String, usize>,
}

impl Default for ClinsigConfig {
    fn default() -> Self {
        let rows: [(&str, u32, &str, &[&str]); 17] = [
            ("Pathogenic", 1, "rgb(192, 0, 0)", &[]),
            ("Pathogenic/Likely pathogenic", 2, "rgb(230, 60, 30)", &["Pathogenic / Likely pathogenic"]),
            ("Likely pathogenic", 3, "rgb(255, 120, 60)", &[]),
            (LABEL_CONFLICTING, 4, "rgb(255, 192, 0)", &["Conflicting", "Conflicting classifications of pathogenicity"]),
            ("Uncertain significance", 5, "rgb(190, 190, 190)", &["VUS"]),
            ("Likely benign", 6, "rgb(150, 200, 230)", &[]),
            ("Benign/Likely benign", 7, "rgb(80, 150, 210)", &["Benign / Likely benign"]),
            ("Benign", 8, "rgb(0, 90, 180)", &[]),
            ("drug response", 9, "rgb(120, 80, 170)", &[]),
            ("risk factor", 10, "rgb(160, 110, 200)", &[]),
            ("association", 11, "rgb(200, 160, 220)", &[]),
            ("protective", 12, "rgb(90, 170, 120)", &[]),
            ("affects", 13, "rgb(140, 200, 160)", &[]),
            ("other", 14, "rgb(170, 170, 120)", &[]),
            ("not provided", 15, "rgb(220, 220, 220)", &[]),
            ("conflicting data from submitters", 16, "rgb(255, 220, 120)", &[]),
            (LABEL_UNREPORTED, 17, "rgb(255, 255, 255)", &[]),
        ];

        let labels = rows
            .iter()
            .map(|(label, sort_order, color, alias)| ClinsigLabel {
                label: label.to_string(),
                sort_order: *sort_order,
                color: color.to_string(),
                alias: alias.iter().map(|a| a.to_string()).collect(),
            })
            .collect();

        Self::from_labels(labels).unwrap_or_else(|_| Self {
            labels: Vec::new(),
            index: HashMap::new(),
        })
    }
}

impl ClinsigConfig {
    /// Build lookups from label rows; aliases never shadow a primary label
    pub fn from_labels(labels: Vec<ClinsigLabel>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::EmptySettings);
        }

        let mut index = HashMap::new();
        for (i, row) in labels.iter().enumerate() {
            if index.insert(row.label.to_lowercase(), i).is_some() {
                return Err(ConfigError::DuplicateLabel(row.label.clone()));
            }
        }
        for (i, row) in labels.iter().enumerate() {
            for alias in &row.alias {
                index.entry(alias.to_lowercase()).or_insert(i);
            }
        }

        Ok(Self { labels, index })
    }

    /// Load the settings table from a tab-delimited file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_path(path)?;

        let labels = reader
            .deserialize::<ClinsigLabel>()
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self::from_labels(labels)?;
        info!("Loaded {} clinical significance labels from {:?}", config.labels.len(), path);
        Ok(config)
    }

    /// Load from `path` when given, otherwise use the built-in table
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("Using built-in clinical significance settings");
                Ok(Self::default())
            }
        }
    }

    pub fn labels(&self) -> &[ClinsigLabel] {
        &self.labels
    }

    fn lookup(&self, label: &str) -> Option<&ClinsigLabel> {
        self.index
            .get(&label.trim().to_lowercase())
            .and_then(|&i| self.labels.get(i))
    }

    pub fn sort_rank(&self, label: &str) -> u32 {
        self.lookup(label).map(|l| l.sort_order).unwrap_or(UNKNOWN_LABEL_RANK)
    }

    pub fn color(&self, label: &str) -> &str {
        self.lookup(label)
            .map(|l| l.color.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_LABEL_COLOR)
    }

    /// Order two labels by configured rank, then alphabetically
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.sort_rank(a)
            .cmp(&self.sort_rank(b))
            .then_with(|| a.cmp(b))
    }

    /// Sort labels in configured order
    pub fn sort_labels<S: AsRef<str>>(&self, labels: &mut [S]) {
        labels.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
    }
}

/// Genome build used for coordinates and source queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GenomeBuild {
    Hg19,
    Hg38,
}

impl GenomeBuild {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenomeBuild::Hg19 => "hg19",
            GenomeBuild::Hg38 => "hg38",
        }
    }
}

/// Settings for one annotation run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub build: GenomeBuild,
    /// Variant keys per source request
    pub chunk_size: usize,
    /// Attempts per chunk before giving up (first try included)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
    pub malformed_policy: MalformedPolicy,
    pub formats: Vec<OutputFormat>,
    /// Flag selecting the pathogenic variant subset of the exploratory tables
    pub pathogenic_scope: PathogenicScope,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            build: GenomeBuild::Hg19,
            chunk_size: 1000,
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            request_timeout: Duration::from_secs(60),
            malformed_policy: MalformedPolicy::RejectBatch,
            formats: vec![OutputFormat::Tsv],
            pathogenic_scope: PathogenicScope::AnyCondition,
        }
    }
}

impl RunSettings {
    /// Allow `retries` retries after the first attempt
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    /// Backoff before retry number `attempt` (1-based), doubling up to the cap
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_retries_exclude_first_attempt() {
        assert_eq!(RunSettings::default().with_retries(3).max_attempts, 4);
        assert_eq!(RunSettings::default().with_retries(0).max_attempts, 1);
        assert_eq!(RunSettings::default().with_retries(u32::MAX).max_attempts, u32::MAX);
    }

    #[test]
    fn test_default_ordering() {
        let config = ClinsigConfig::default();
        assert_eq!(config.sort_rank("Pathogenic"), 1);
        assert_eq!(config.sort_rank("pathogenic"), 1);
        assert_eq!(config.sort_rank(LABEL_UNREPORTED), 17);
        assert_eq!(config.sort_rank("something new"), UNKNOWN_LABEL_RANK);

        let mut labels = vec!["Benign", "Pathogenic", "zzz", "Likely pathogenic", "aaa"];
        config.sort_labels(&mut labels);
        assert_eq!(labels, vec!["Pathogenic", "Likely pathogenic", "Benign", "aaa", "zzz"]);
    }

    #[test]
    fn test_alias_lookup() {
        let config = ClinsigConfig::default();
        assert_eq!(config.sort_rank("Conflicting"), config.sort_rank(LABEL_CONFLICTING));
        assert_eq!(config.color("Benign / Likely benign"), config.color("Benign/Likely benign"));
        assert_eq!(config.color("unheard of"), UNKNOWN_LABEL_COLOR);
    }

    #[test]
    fn test_load_settings_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "label\tsort_order\tcolor_rgb\talias\n\
             Benign\t1\trgb(0, 0, 255)\tB, benign-ish\n\
             Pathogenic\t2\trgb(255, 0, 0)\t\n"
        )
        .unwrap();
        file.flush().unwrap();

        let config = ClinsigConfig::load(file.path()).unwrap();
        assert_eq!(config.labels().len(), 2);
        assert_eq!(config.sort_rank("benign-ish"), 1);
        assert_eq!(config.sort_rank("Pathogenic"), 2);
        assert_eq!(config.color("b"), "rgb(0, 0, 255)");
        assert!(config.labels()[1].alias.is_empty());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let labels = vec![
            ClinsigLabel { label: "Benign".into(), sort_order: 1, color: String::new(), alias: vec![] },
            ClinsigLabel { label: "benign".into(), sort_order: 2, color: String::new(), alias: vec![] },
        ];
        assert!(matches!(
            ClinsigConfig::from_labels(labels),
            Err(ConfigError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_backoff_is_bounded() {
        let settings = RunSettings::default();
        assert_eq!(settings.backoff_for(1), Duration::from_millis(500));
        assert_eq!(settings.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(settings.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(settings.backoff_for(30), Duration::from_secs(8));
    }
}
