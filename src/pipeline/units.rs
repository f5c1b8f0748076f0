//! Document units: the atomic pieces of work sent to the model.
//!
//! An image input is one unit; a PDF input becomes one unit per page, named
//! `{stem}_page_{n}.png`. Units are numbered `1..` across all inputs in
//! input order, which is also the order their records appear in the table.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::input::{InputKind, ResolvedInput};
use crate::pipeline::render;
use std::fmt;
use tracing::info;

/// One image handed to the model.
#[derive(Clone)]
pub struct DocumentUnit {
    /// 1-based position across all inputs.
    pub position: usize,
    /// Display name, e.g. `register_page_2.png` or `IMG_0042.jpg`.
    pub label: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for DocumentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentUnit")
            .field("position", &self.position)
            .field("label", &self.label)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Label of page `page` (1-based) of the PDF with file stem `stem`.
pub fn page_label(stem: &str, page: usize) -> String {
    format!("{stem}_page_{page}.png")
}

/// Expand resolved inputs into document units.
///
/// PDFs are rasterised in one pass before any unit is built; a PDF that
/// cannot be opened fails the whole run.
pub async fn build_units(
    inputs: &[ResolvedInput],
    config: &ExtractionConfig,
) -> Result<Vec<DocumentUnit>, ExtractError> {
    let pdf_paths = inputs
        .iter()
        .filter(|i| *i.kind() == InputKind::Pdf)
        .map(|i| i.path().to_path_buf())
        .collect();
    let mut rendered = render::render_pdfs(pdf_paths, config).await?.into_iter();

    let mut units = Vec::new();
    for input in inputs {
        match input.kind() {
            InputKind::Pdf => {
                let pages = rendered.next().unwrap_or_default();
                let stem = input
                    .path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string());
                for (i, bytes) in pages.into_iter().enumerate() {
                    units.push(DocumentUnit {
                        position: units.len() + 1,
                        label: page_label(&stem, i + 1),
                        mime_type: "image/png",
                        bytes,
                    });
                }
            }
            InputKind::Image { mime_type } => {
                let bytes = tokio::fs::read(input.path()).await.map_err(|e| {
                    ExtractError::Internal(format!("Failed to read {}: {e}", input.path().display()))
                })?;
                let label = input
                    .path()
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".to_string());
                units.push(DocumentUnit {
                    position: units.len() + 1,
                    label,
                    mime_type,
                    bytes,
                });
            }
        }
    }

    info!("{} input(s) expanded to {} unit(s)", inputs.len(), units.len());
    Ok(units)
}
