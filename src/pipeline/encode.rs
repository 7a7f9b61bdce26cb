//! Image encoding: `DynamicImage` → base64 payload for the `inline_data` part.
//!
//! JPEG is the default: a 200-DPI textbook page is several megabytes as PNG
//! and a few hundred kilobytes as JPEG at quality 85, and the model reads
//! printed Tamil equally well from either. JPEG has no alpha channel, so
//! transparent regions are composited onto white first; dropping alpha
//! instead would turn them black and hide the text.

use crate::config::ImageEncoding;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// A page image ready to inline into a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    /// Standard base64, no data-URI prefix.
    pub data: String,
}

/// Encode a rasterised page for the model API.
pub fn encode_page(
    img: &DynamicImage,
    encoding: ImageEncoding,
) -> Result<EncodedImage, image::ImageError> {
    let mut buf = Vec::new();

    let mime_type = match encoding {
        ImageEncoding::Jpeg { quality } => {
            let flat = DynamicImage::ImageRgb8(flatten_on_white(img));
            flat.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
            "image/jpeg"
        }
        ImageEncoding::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
            "image/png"
        }
    };

    let data = STANDARD.encode(&buf);
    debug!("Encoded page image ({}) → {} bytes base64", mime_type, data.len());

    Ok(EncodedImage {
        mime_type: mime_type.to_string(),
        data,
    })
}

/// Alpha-composite every pixel onto an opaque white background.
fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img, ImageEncoding::Png).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_jpeg_from_rgba() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 128])));
        let data = encode_page(&img, ImageEncoding::Jpeg { quality: 85 }).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let flat = flatten_on_white(&img);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));

        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255])));
        let flat = flatten_on_white(&img);
        assert_eq!(flat.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }
}
