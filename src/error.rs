//! Error types for the clinicscan library.
//!
//! Failures come in three weights:
//!
//! * [`ExtractError`] (**fatal**): the run cannot start or an outer surface
//!   failed (no input, missing address reference, unreadable file, provider
//!   not configured, export write failed). Returned as `Err(ExtractError)`.
//!
//! * [`UnitError`] (**non-fatal**): one document unit (an image or one PDF
//!   page) could not be turned into records. Stored inside
//!   [`crate::output::UnitResult`]; every other unit still runs.
//!
//! * [`MergeError`] / [`BackendError`]: raised inside the pipeline and
//!   folded into a [`UnitError`] (or into an empty patch) by the
//!   orchestrator. They never escape a unit.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the clinicscan library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No document was supplied, or every supplied document was empty.
    #[error("No input documents to process.\nPass at least one PDF or image.")]
    NoInput,

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file is neither a PDF nor a supported image.
    #[error("Unsupported file '{path}': expected PDF, PNG or JPEG\nFirst bytes: {magic:?}")]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Reference dataset errors ──────────────────────────────────────────
    /// The address reference dataset does not exist.
    #[error("Address reference '{path}' not found.\nPlace alamat.json next to the binary or pass --reference.")]
    ReferenceNotFound { path: PathBuf },

    /// The address reference dataset could not be read or is not JSON.
    #[error("Address reference '{path}' is unusable: {detail}")]
    ReferenceInvalid { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page} of '{path}': {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Scanned PDFs are rasterised with pdfium. Either:\n\
  • install libpdfium system-wide, or\n\
  • set PDFIUM_LIB_PATH=/dir/containing/libpdfium (or pass --pdfium-lib).\n\
Image inputs (PNG/JPEG) do not need pdfium."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Table / export errors ─────────────────────────────────────────────
    /// Could not serialise or write the exported table.
    #[error("Failed to export table to '{path}': {detail}")]
    ExportFailed { path: PathBuf, detail: String },

    /// A table edit addressed a row that does not exist.
    #[error("Row {row} is out of range (table has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document unit.
///
/// The unit contributes zero records; the run continues with the next unit.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The unit could not be handed to the AI backend.
    #[error("Unit {position}: upload failed: {detail}")]
    UploadFailed { position: usize, detail: String },

    /// The base extraction call itself failed.
    #[error("Unit {position}: extraction call failed: {detail}")]
    ExtractionCallFailed { position: usize, detail: String },

    /// The base extraction reply was empty; the unit was skipped.
    #[error("Unit {position}: model returned an empty reply, unit skipped")]
    EmptyReply { position: usize },

    /// The base extraction reply held no usable JSON array.
    #[error("Unit {position}: model did not return a JSON array of records")]
    ExtractionFailed { position: usize, raw_reply: String },

    /// The base records could not be merged with the correction patches.
    #[error("Unit {position}: merge failed: {detail}")]
    MergeFailed {
        position: usize,
        detail: String,
        raw_base: String,
    },
}

impl UnitError {
    /// `true` when the unit was skipped rather than broken.
    pub fn is_skip(&self) -> bool {
        matches!(self, UnitError::EmptyReply { .. })
    }
}

/// Failure of the patch-merge engine.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The base text is not a JSON array.
    #[error("base records are not a JSON array: {0}")]
    NotAnArray(String),

    /// An element of the base array is not a valid record.
    #[error("base element {index} is not a valid record: {detail}")]
    InvalidRecord { index: usize, detail: String },

    /// The merged records could not be serialised.
    #[error("could not serialise merged records: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Failure reported by a [`crate::pipeline::llm::ModelBackend`].
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The unit could not be attached.
    #[error("upload failed: {0}")]
    Upload(String),

    /// The model call failed after all retries.
    #[error("model call failed after {retries} retries: {detail}")]
    Call { retries: u32, detail: String },

    /// The model call exceeded the configured timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The conversation referenced an attachment that is not held.
    #[error("unknown attachment '{0}'")]
    UnknownAttachment(String),

    /// The attachment could not be released.
    #[error("release failed: {0}")]
    Release(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_not_found_mentions_path() {
        let e = ExtractError::ReferenceNotFound {
            path: PathBuf::from("data/alamat.json"),
        };
        assert!(e.to_string().contains("data/alamat.json"));
    }

    #[test]
    fn empty_reply_is_a_skip() {
        assert!(UnitError::EmptyReply { position: 2 }.is_skip());
        assert!(!UnitError::ExtractionFailed {
            position: 2,
            raw_reply: "sorry".into()
        }
        .is_skip());
    }

    #[test]
    fn unit_error_display_carries_position() {
        let e = UnitError::MergeFailed {
            position: 7,
            detail: "base records are not a JSON array".into(),
            raw_base: "{}".into(),
        };
        assert!(e.to_string().starts_with("Unit 7"), "got: {e}");
    }

    #[test]
    fn backend_timeout_display() {
        let e = BackendError::Timeout { secs: 90 };
        assert!(e.to_string().contains("90s"));
    }

    #[test]
    fn row_out_of_range_display() {
        let e = ExtractError::RowOutOfRange { row: 5, len: 3 };
        assert!(e.to_string().contains("Row 5"));
        assert!(e.to_string().contains("3 rows"));
    }
}
