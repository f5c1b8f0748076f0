//! Run-level entry points: documents in, one aggregated record table out.
//!
//! [`extract`] owns the outer surface (reference dataset, input resolution,
//! rasterisation, provider selection). [`extract_units`] is the processing
//! core and takes any [`ModelBackend`], which is what the integration tests
//! drive with scripted replies.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::ExtractError;
use crate::output::{ExtractionOutput, ExtractionStats, UnitResult};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::input;
use crate::pipeline::llm::{LlmBackend, ModelBackend};
use crate::pipeline::orchestrator::process_unit;
use crate::pipeline::units::{build_units, DocumentUnit};
use crate::reference::AddressReference;
use crate::table::RecordTable;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Extract patient records from PDFs and images.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `inputs`: Local file paths or HTTP/HTTPS URLs, PDF/PNG/JPEG
/// * `config`: Extraction configuration
///
/// # Returns
/// `Ok(ExtractionOutput)` even when some or all units failed; check
/// `output.units[i].error` and `output.stats`.
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors:
/// - No input given
/// - Address reference missing or invalid
/// - An input is missing, unreadable, or not a PDF/PNG/JPEG
/// - A PDF cannot be opened or rasterised
/// - No LLM provider can be configured
pub async fn extract<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    if inputs.is_empty() {
        return Err(ExtractError::NoInput);
    }
    info!("Starting extraction of {} input(s)", inputs.len());

    // ── Step 1: Address reference ────────────────────────────────────────
    let reference = AddressReference::load(&config.reference_path)?;

    // ── Step 2: Resolve inputs ───────────────────────────────────────────
    let mut resolved = Vec::with_capacity(inputs.len());
    for input_str in inputs {
        resolved.push(input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?);
    }

    // ── Step 3: Get/create provider ──────────────────────────────────────
    let provider = resolve_provider(config).await?;

    // ── Step 4: Expand to units (rasterises PDFs) ────────────────────────
    let render_start = Instant::now();
    let units = build_units(&resolved, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    if units.is_empty() {
        return Err(ExtractError::NoInput);
    }

    // ── Step 5: Run the pipeline on every unit ───────────────────────────
    let backend = LlmBackend::new(provider, config);
    let mut output = extract_units(&backend, &units, &reference, config).await;

    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Run every unit through the pipeline and aggregate the results.
///
/// Units are processed `config.concurrency` at a time; results and records
/// keep unit order regardless of completion order.
pub async fn extract_units<B: ModelBackend>(
    backend: &B,
    units: &[DocumentUnit],
    reference: &AddressReference,
    config: &ExtractionConfig,
) -> ExtractionOutput {
    let total = units.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let llm_start = Instant::now();
    let results: Vec<UnitResult> = stream::iter(units.iter().map(|unit| async move {
        if let Some(ref cb) = config.progress_callback {
            cb.on_unit_start(unit.position, total, &unit.label);
        }
        let result = process_unit(backend, unit, reference, config).await;
        if let Some(ref cb) = config.progress_callback {
            match &result.error {
                None => cb.on_unit_complete(unit.position, total, result.records.len()),
                Some(e) => cb.on_unit_error(unit.position, total, &e.to_string()),
            }
        }
        result
    }))
    .buffered(config.concurrency.max(1))
    .collect()
    .await;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let records = aggregate(results.iter().map(|r| r.records.clone()));
    let mut stats = ExtractionStats::from_units(&results, records.len());
    stats.llm_duration_ms = llm_duration_ms;
    stats.total_duration_ms = llm_duration_ms;

    info!(
        "Extraction complete: {} record(s) from {}/{} unit(s), {} skipped",
        stats.total_records, stats.succeeded_units, stats.total_units, stats.skipped_units
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, stats.succeeded_units);
    }

    ExtractionOutput {
        records,
        units: results,
        stats,
    }
}

/// Extract records and export them to a spreadsheet file.
///
/// A `.xlsx` path gets a workbook, anything else gets CSV.
pub async fn extract_to_file<S: AsRef<str>>(
    inputs: &[S],
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionStats, ExtractError> {
    let output = extract(inputs, config).await?;
    RecordTable::from_records(output.records).export(output_path)?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(inputs, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`, or
///    `gemini-2.5-flash` when no model is named.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Gemini key** (`GEMINI_API_KEY` or `GOOGLE_API_KEY`): the pipeline's
///    prompts are tuned on Gemini, so it wins over other keys present.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
async fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, config.model.as_deref().unwrap_or(&env_model));
        }
    }

    let has_key = |var: &str| std::env::var(var).is_ok_and(|v| !v.is_empty());
    if has_key("GEMINI_API_KEY") || has_key("GOOGLE_API_KEY") {
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (recommended), OPENAI_API_KEY, or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
