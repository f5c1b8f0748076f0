//! # clinicscan
//!
//! Turn photographed or scanned clinic patient registers into a structured,
//! editable table using a multimodal AI model.
//!
//! ## Why this crate?
//!
//! Village clinic registers are handwritten, mix Indonesian and Javanese,
//! and abbreviate addresses and dates freely. A single "read this page" call
//! gets most rows right and a few columns consistently wrong. This crate
//! extracts once, then asks the same model four focused follow-up questions
//! on the same conversation (addresses, names and visit dates, birth dates
//! and ages, diagnoses). Each follow-up answers with deltas only, which are
//! merged into the first extraction.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input      resolve local files or download URLs, sniff format
//!  ├─ 2. Units      one unit per image, one per PDF page (pdfium, spawn_blocking)
//!  ├─ 3. Extract    base call: prompt + alamat.json + page image
//!  ├─ 4. Correct    address → name/visit date → birth date/age → diagnosis
//!  ├─ 5. Merge      sanitise replies, apply patches keyed on "No"
//!  ├─ 6. Aggregate  concatenate units, renumber 1..N
//!  └─ 7. Table      edit cells, export .xlsx or CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clinicscan::{extract, ExtractionConfig, RecordTable};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::builder()
//!         .reference_path("alamat.json")
//!         .build()?;
//!     let output = extract(&["register.pdf", "IMG_0042.jpg"], &config).await?;
//!     eprintln!("{} records, {} units skipped",
//!         output.stats.total_records,
//!         output.stats.skipped_units);
//!     RecordTable::from_records(output.records).export("pasien.xlsx")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `clinicscan` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! clinicscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod reference;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{BackendError, ExtractError, MergeError, UnitError};
pub use extract::{extract, extract_sync, extract_to_file, extract_units};
pub use output::{ExtractionOutput, ExtractionStats, UnitResult};
pub use pipeline::merge::merge;
pub use pipeline::sanitize::sanitize_reply;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::CorrectionPass;
pub use record::{Field, Patch, Record, RecordId};
pub use reference::AddressReference;
pub use table::RecordTable;
