//! PDF rasterisation: every page of every PDF input to a PNG via pdfium.
//!
//! pdfium is not async-safe, so all rendering for a run happens inside one
//! `spawn_blocking` task with a single library binding. Pages are PNG-encoded
//! on the blocking thread as well; only bytes cross back into async code.
//!
//! The longest edge is capped at `max_rendered_pixels` after scaling to the
//! configured DPI, so an A3 register scanned at 200 DPI does not produce a
//! 3,300 px image the provider would downscale anyway.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::encode::png_bytes;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a directory that holds the pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise all pages of the given PDFs.
///
/// # Returns
/// One entry per input path, in input order, each holding that document's
/// pages as PNG bytes in page order.
pub async fn render_pdfs(
    paths: Vec<PathBuf>,
    config: &ExtractionConfig,
) -> Result<Vec<Vec<Vec<u8>>>, ExtractError> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let lib_dir = config.pdfium_lib_path.clone();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib_dir.as_deref())?;
        paths
            .iter()
            .map(|p| render_blocking(&pdfium, p, dpi, max_pixels, password.as_deref()))
            .collect()
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to pdfium: explicit directory, then `PDFIUM_LIB_PATH`, then the
/// system library.
fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, ExtractError> {
    let dir = lib_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

    let bindings = match dir {
        Some(dir) => {
            let lib = Pdfium::pdfium_platform_library_name_at_path(&dir);
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib).or_else(|_| Pdfium::bind_to_system_library())
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn render_blocking(
    pdfium: &Pdfium,
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<Vec<u8>>, ExtractError> {
    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ExtractError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ExtractError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    info!("PDF {} loaded: {} pages", pdf_path.display(), pages.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let rasterisation_failed = |page: usize, detail: String| ExtractError::RasterisationFailed {
        path: pdf_path.to_path_buf(),
        page,
        detail,
    };

    let mut results = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| rasterisation_failed(idx + 1, format!("{:?}", e)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let png = png_bytes(&image).map_err(|e| rasterisation_failed(idx + 1, e.to_string()))?;
        results.push(png);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_pdfs_needs_no_pdfium() {
        let config = ExtractionConfig::default();
        let pages = render_pdfs(Vec::new(), &config).await.unwrap();
        assert!(pages.is_empty());
    }
}
