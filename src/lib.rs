// ==============================================================================
// lib.rs - ClinVar Consensus Library
// ==============================================================================
// Description: Library interface for ClinVar consensus annotation modules
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-16
// Version: 2.1.0
// ==============================================================================

pub mod parsers;
pub mod models;
pub mod config;
pub mod classifier;
pub mod aggregates;
pub mod merger;
pub mod exploratory;
pub mod table;
pub mod source;
pub mod output;
pub mod processor;

#[cfg(test)]
mod fixtures;
