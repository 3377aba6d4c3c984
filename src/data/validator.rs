// ============================================================
// Layer 4 — Image Validator
// ============================================================
// The hard gate between untrusted upload bytes and the model.
//
// Rules, applied in order:
//   1. Bytes must be non-empty and identify as one of the
//      allow-listed container formats (JPEG, PNG, GIF, BMP).
//   2. Both dimensions ≥ 50px  — else "too small"
//   3. Both dimensions ≤ 4096px — else "too large"
//   4. Color modes outside {RGB, Grayscale, RGBA} are coerced;
//      the raster is held as 8-bit RGB afterwards either way.
//
// Every rejection is a Validation error: a client fault the
// host surfaces as a 4xx response, never a system fault. No
// tensor work happens until this gate has passed.
//
// Reference: Rust Book §9 (Error Handling)

use image::ColorType;

use crate::domain::error::AnalysisError;
use crate::domain::image::{DecodedImage, SourceColor, SourceFormat};

/// Smallest side length a diagnostically useful X-ray can have.
pub const MIN_DIMENSION: u32 = 50;

/// Largest side length accepted before preprocessing cost and
/// decode memory get out of hand.
pub const MAX_DIMENSION: u32 = 4096;

pub struct ImageValidator;

impl ImageValidator {
    /// Decode raw bytes and enforce every validation rule.
    ///
    /// Returns the validated image (already coerced to RGB) or
    /// the Validation error describing what the caller must fix.
    pub fn decode_and_validate(bytes: &[u8]) -> Result<DecodedImage, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::Validation("image bytes are empty".into()));
        }

        // ── Rule 1: container format allow-list ───────────────────────────────
        // Detect the format from the bytes themselves — the client's
        // filename or content-type header is not trusted.
        let detected = image::guess_format(bytes).map_err(|_| {
            AnalysisError::Validation("unrecognized image format".into())
        })?;
        let format = SourceFormat::from_image_format(detected).ok_or_else(|| {
            AnalysisError::Validation(format!(
                "unsupported image format: {detected:?} (allowed: JPEG, PNG, GIF, BMP)"
            ))
        })?;

        let decoded = image::load_from_memory_with_format(bytes, detected)
            .map_err(|e| AnalysisError::Validation(format!("could not decode image: {e}")))?;

        // ── Rules 2 and 3: dimension bounds ───────────────────────────────────
        let (width, height) = (decoded.width(), decoded.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(AnalysisError::Validation(format!(
                "image is too small: {width}x{height} (minimum {MIN_DIMENSION}x{MIN_DIMENSION})"
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(AnalysisError::Validation(format!(
                "image is too large: {width}x{height} (maximum {MAX_DIMENSION}x{MAX_DIMENSION})"
            )));
        }

        // ── Rule 4: color mode coercion ───────────────────────────────────────
        let source_color = match decoded.color() {
            ColorType::Rgb8             => SourceColor::Rgb,
            ColorType::L8               => SourceColor::Grayscale,
            ColorType::Rgba8            => SourceColor::Rgba,
            other => {
                tracing::debug!("Coercing color mode {:?} to RGB", other);
                SourceColor::Other
            }
        };

        // Every downstream consumer wants RGB8, so the conversion
        // happens once here regardless of source mode.
        Ok(DecodedImage::new(decoded.to_rgb8(), format, source_color))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
    use std::io::Cursor;

    /// Encode a blank raster of the given size into format bytes.
    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_empty_bytes_rejected() {
        let err = ImageValidator::decode_and_validate(&[]).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = ImageValidator::decode_and_validate(b"not an image at all").unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[test]
    fn test_too_small_rejected_with_reason() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(10, 10)), ImageFormat::Png);
        let err = ImageValidator::decode_and_validate(&bytes).unwrap_err();
        match err {
            AnalysisError::Validation(msg) => assert!(msg.contains("too small"), "{msg}"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_too_large_rejected_with_reason() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::new(5000, 5000)),
            ImageFormat::Png,
        );
        let err = ImageValidator::decode_and_validate(&bytes).unwrap_err();
        match err {
            AnalysisError::Validation(msg) => assert!(msg.contains("too large"), "{msg}"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_disallowed_format_rejected() {
        // TIFF decodes fine but is not on the allow-list
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(64, 64)), ImageFormat::Tiff);
        let err = ImageValidator::decode_and_validate(&bytes).unwrap_err();
        match err {
            AnalysisError::Validation(msg) => assert!(msg.contains("unsupported"), "{msg}"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_rgb_png_accepted() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(224, 224)), ImageFormat::Png);
        let image = ImageValidator::decode_and_validate(&bytes).unwrap();
        assert_eq!(image.format, SourceFormat::Png);
        assert_eq!(image.source_color, SourceColor::Rgb);
        assert_eq!((image.width(), image.height()), (224, 224));
    }

    #[test]
    fn test_grayscale_coerced_to_rgb() {
        let bytes = encode(DynamicImage::ImageLuma8(GrayImage::new(60, 80)), ImageFormat::Png);
        let image = ImageValidator::decode_and_validate(&bytes).unwrap();
        assert_eq!(image.source_color, SourceColor::Grayscale);
        // Raster is RGB8 after validation no matter what came in
        assert_eq!(image.rgb.dimensions(), (60, 80));
    }

    #[test]
    fn test_rgba_accepted() {
        let bytes = encode(DynamicImage::ImageRgba8(RgbaImage::new(64, 64)), ImageFormat::Png);
        let image = ImageValidator::decode_and_validate(&bytes).unwrap();
        assert_eq!(image.source_color, SourceColor::Rgba);
    }

    #[test]
    fn test_boundary_dimensions_accepted() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(50, 50)), ImageFormat::Png);
        assert!(ImageValidator::decode_and_validate(&bytes).is_ok());
    }
}
