// ==============================================================================
// parsers/mod.rs - Input and record parsers
// ==============================================================================
// Description: Variant list reader and ClinVar record normalization
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-01-28
// Version: 2.0.0
// ==============================================================================

pub mod nested;
pub mod normalizer;
pub mod input;

pub use nested::{Nested, ShapeError};
pub use normalizer::{
    explode_significance, BatchOutcome, MalformedPolicy, NormalizeError, NormalizedBatch, RawQueryResult,
    RecordNormalizer, RejectedRecord,
};
pub use input::{InputError, InputParser, InputTable, DEFAULT_VARIANT_COLUMNS};
