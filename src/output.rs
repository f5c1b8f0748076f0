//! Results of an extraction run.

use crate::error::UnitError;
use crate::record::Record;
use serde::{Deserialize, Serialize};

/// Outcome of one document unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    /// 1-based position across all inputs.
    pub position: usize,
    /// Display name, e.g. `register_page_2.png`.
    pub label: String,
    /// Merged records with the model's unit-local record numbers.
    pub records: Vec<Record>,
    /// Model calls issued (successful or not).
    pub calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    /// Set when the unit contributed no records.
    pub error: Option<UnitError>,
}

impl UnitResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_units: usize,
    pub succeeded_units: usize,
    pub failed_units: usize,
    /// Units skipped because the model returned nothing.
    pub skipped_units: usize,
    pub total_records: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
}

impl ExtractionStats {
    /// Summarise per-unit results.
    pub fn from_units(units: &[UnitResult], total_records: usize) -> Self {
        let skipped = units
            .iter()
            .filter(|u| u.error.as_ref().is_some_and(UnitError::is_skip))
            .count();
        let succeeded = units.iter().filter(|u| u.is_success()).count();
        Self {
            total_units: units.len(),
            succeeded_units: succeeded,
            failed_units: units.len() - succeeded - skipped,
            skipped_units: skipped,
            total_records,
            total_input_tokens: units.iter().map(|u| u.input_tokens).sum(),
            total_output_tokens: units.iter().map(|u| u.output_tokens).sum(),
            ..Default::default()
        }
    }
}

/// Everything an extraction run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Aggregated records, renumbered 1..N.
    pub records: Vec<Record>,
    /// Per-unit outcomes in input order.
    pub units: Vec<UnitResult>,
    pub stats: ExtractionStats,
}
