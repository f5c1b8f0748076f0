//! Image encoding: rendered pages to PNG bytes, document units to base64
//! `ImageData` for the multimodal request body.
//!
//! Pages are stored as PNG rather than JPEG: ballpoint handwriting on a
//! scanned register loses thin strokes to JPEG artefacts.

use crate::pipeline::units::DocumentUnit;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap a unit's bytes as base64 image data.
///
/// `detail: "high"` keeps the full tile budget on providers that honour it;
/// the small digits of a NIK column are unreadable in a single low-res tile.
pub fn image_data(unit: &DocumentUnit) -> ImageData {
    let b64 = STANDARD.encode(&unit.bytes);
    debug!("Encoded {} → {} bytes base64", unit.label, b64.len());
    ImageData::new(b64, unit.mime_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = png_bytes(&img).expect("encode should succeed");
        assert_eq!(image::guess_format(&png).unwrap(), image::ImageFormat::Png);

        let unit = DocumentUnit {
            position: 1,
            label: "scan_page_1.png".into(),
            mime_type: "image/png",
            bytes: png.clone(),
        };
        let data = image_data(&unit);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, png);
    }
}
