// ==============================================================================
// parsers/input.rs - User Variant List Parser
// ==============================================================================
// Description: Reads the user's variant list and derives HGVS variant keys
// Author: Matt Barham
// Created: 2026-01-21
// Modified: 2026-01-21
// Version: 1.0.0
// ==============================================================================
// Format: CSV (.csv) or tab-delimited (any other extension) with a header
// Example:
//   CHR    POS        REF    ALT    SAMPLE
//   7      140453136  A      T      tumour-12
//   X      153296777  G      A      tumour-12
// ==============================================================================

use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{InputVariant, VariantKey};

/// Default names of the chromosome, position, reference and alternate columns
pub const DEFAULT_VARIANT_COLUMNS: [&str; 4] = ["CHR", "POS", "REF", "ALT"];

/// Errors that can occur while reading the variant list
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Input variant file not found: {0}")]
    NotFound(String),

    #[error("Unsupported input file type '.{0}' (use .csv or tab-delimited text)")]
    UnsupportedExtension(String),

    #[error("Input variant file does not contain the variant columns: {0}")]
    MissingColumns(String),

    #[error("Invalid position at row {row}: '{value}'")]
    InvalidPosition { row: usize, value: String },

    #[error("Empty value in column '{column}' at row {row}")]
    EmptyValue { row: usize, column: String },

    #[error("Input variant file contains no variants")]
    EmptyFile,
}

/// Parsed variant list
#[derive(Debug, Clone, PartialEq)]
pub struct InputTable {
    /// Pass-through columns that were found, in the order requested
    pub extra_columns: Vec<String>,
    pub variants: Vec<InputVariant>,
}

impl InputTable {
    pub fn keys(&self) -> Vec<VariantKey> {
        self.variants.iter().map(|v| v.key.clone()).collect()
    }
}

/// Variant list parser
#[derive(Debug, Clone)]
pub struct InputParser {
    /// Chromosome, position, reference and alternate column names
    pub variant_columns: [String; 4],
    /// Optional columns to carry into the result tables
    pub extra_columns: Vec<String>,
}

impl Default for InputParser {
    fn default() -> Self {
        Self::new(DEFAULT_VARIANT_COLUMNS.map(String::from), Vec::new())
    }
}

impl InputParser {
    pub fn new(variant_columns: [String; 4], extra_columns: Vec<String>) -> Self {
        Self {
            variant_columns,
            extra_columns,
        }
    }

    /// Parse a variant list file
    ///
    /// # Arguments
    /// * `path` - Path to the CSV or tab-delimited variant file
    ///
    /// # Returns
    /// * `Ok(InputTable)` - Variants with keys and pass-through columns
    /// * `Err(InputError)` - Missing file or columns, bad position, empty file
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<InputTable, InputError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(InputError::NotFound(path.display().to_string()));
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let delimiter = match ext.as_str() {
            "xlsx" | "xls" => return Err(InputError::UnsupportedExtension(ext)),
            "csv" => b',',
            _ => b'\t',
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let column_index = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<&str> = self
            .variant_columns
            .iter()
            .filter(|c| column_index(c).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(InputError::MissingColumns(missing.join(", ")));
        }
        let [chrom_idx, pos_idx, ref_idx, alt_idx] = [0, 1, 2, 3]
            .map(|i| column_index(&self.variant_columns[i]).unwrap_or_default());

        let mut extra_columns = Vec::new();
        let mut extra_indices = Vec::new();
        for column in &self.extra_columns {
            match column_index(column) {
                Some(idx) => {
                    extra_columns.push(column.clone());
                    extra_indices.push(idx);
                }
                None => warn!("Input column '{}' not found in variant file; skipping", column),
            }
        }

        let mut variants = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let row = idx + 2; // header is row 1
            let field = |i: usize, column: &str| -> Result<String, InputError> {
                let value = record.get(i).unwrap_or_default().trim();
                if value.is_empty() {
                    return Err(InputError::EmptyValue {
                        row,
                        column: column.to_string(),
                    });
                }
                Ok(value.to_string())
            };

            let chrom = field(chrom_idx, &self.variant_columns[0])?;
            let position_str = field(pos_idx, &self.variant_columns[1])?;
            let ref_allele = field(ref_idx, &self.variant_columns[2])?;
            let alt_allele = field(alt_idx, &self.variant_columns[3])?;

            let position = position_str
                .parse::<u64>()
                .map_err(|_| InputError::InvalidPosition { row, value: position_str.clone() })?;

            let extra: BTreeMap<String, String> = extra_columns
                .iter()
                .zip(&extra_indices)
                .map(|(name, &i)| (name.clone(), record.get(i).unwrap_or_default().trim().to_string()))
                .collect();

            variants.push(InputVariant {
                key: VariantKey::from_parts(&chrom, position, &ref_allele, &alt_allele),
                chrom,
                position,
                ref_allele,
                alt_allele,
                extra,
            });
        }

        if variants.is_empty() {
            return Err(InputError::EmptyFile);
        }

        info!("Read {} input variants from {:?}", variants.len(), path);
        Ok(InputTable {
            extra_columns,
            variants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn create_test_file(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_tab_delimited() {
        let contents = "CHR\tPOS\tREF\tALT\tSAMPLE\n7\t140453136\tA\tT\ts1\n x \t153296777\tG\tA\ts2\n";
        let file = create_test_file(contents, ".txt");
        let parser = InputParser::new(DEFAULT_VARIANT_COLUMNS.map(String::from), vec!["SAMPLE".to_string()]);

        let table = parser.parse(file.path()).unwrap();
        assert_eq!(table.variants.len(), 2);
        assert_eq!(table.extra_columns, vec!["SAMPLE"]);

        assert_eq!(table.variants[0].key.as_str(), "chr7:g.140453136A>T");
        assert_eq!(table.variants[0].extra.get("SAMPLE").map(String::as_str), Some("s1"));
        assert_eq!(table.variants[1].chrom, "x");
        assert_eq!(table.variants[1].key.as_str(), "chrX:g.153296777G>A");
    }

    #[test]
    fn test_parse_csv_with_custom_columns() {
        let contents = "chrom,pos,ref,alt\nchr1,100,C,T\n";
        let file = create_test_file(contents, ".csv");
        let parser = InputParser::new(
            ["chrom", "pos", "ref", "alt"].map(String::from),
            vec!["missing".to_string()],
        );

        let table = parser.parse(file.path()).unwrap();
        assert_eq!(table.variants[0].key.as_str(), "chr1:g.100C>T");
        assert!(table.extra_columns.is_empty());
    }

    #[test]
    fn test_missing_variant_columns() {
        let file = create_test_file("CHR\tPOS\tREF\n1\t100\tA\n", ".tsv");
        match InputParser::default().parse(file.path()).unwrap_err() {
            InputError::MissingColumns(cols) => assert_eq!(cols, "ALT"),
            other => panic!("Expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_position() {
        let file = create_test_file("CHR\tPOS\tREF\tALT\n1\tabc\tA\tG\n", ".tsv");
        match InputParser::default().parse(file.path()).unwrap_err() {
            InputError::InvalidPosition { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("Expected InvalidPosition, got {:?}", other),
        }
    }

    #[test]
    fn test_excel_rejected() {
        let file = create_test_file("not really excel", ".xlsx");
        assert!(matches!(
            InputParser::default().parse(file.path()),
            Err(InputError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn test_empty_file() {
        let file = create_test_file("CHR\tPOS\tREF\tALT\n", ".tsv");
        assert!(matches!(InputParser::default().parse(file.path()), Err(InputError::EmptyFile)));
    }

    #[test]
    fn test_file_not_found() {
        assert!(matches!(
            InputParser::default().parse("/nonexistent/variants.tsv"),
            Err(InputError::NotFound(_))
        ));
    }
}
