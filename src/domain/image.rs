// ============================================================
// Layer 3 — Image Domain Types
// ============================================================
// Request-scoped rasters. A DecodedImage is created from raw
// upload bytes by the validator, reused by the saliency pass
// (to avoid a second decode), and dropped when the request
// completes. Nothing here is ever shared across requests.
//
// Reference: Rust Book §5 (Structs)

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};

/// The container formats the pipeline accepts, mirrored by the
/// validator's allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl SourceFormat {
    /// Map a detected container format onto the allow-list.
    /// Returns `None` for anything the pipeline rejects.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png  => Some(Self::Png),
            ImageFormat::Gif  => Some(Self::Gif),
            ImageFormat::Bmp  => Some(Self::Bmp),
            _                 => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png  => "PNG",
            Self::Gif  => "GIF",
            Self::Bmp  => "BMP",
        }
    }
}

/// The color mode the image arrived in, recorded before the
/// coercion to RGB so the validator can log what it converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceColor {
    Rgb,
    Grayscale,
    Rgba,
    /// Anything outside {RGB, Grayscale, RGBA} — coerced to RGB.
    Other,
}

/// A validated, in-memory RGB raster plus its provenance.
///
/// Invariant (established by the validator, relied on everywhere
/// downstream): both dimensions are within [50, 4096] pixels.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// The raster, always held as 8-bit RGB after validation
    pub rgb: RgbImage,

    /// Container format the bytes arrived in
    pub format: SourceFormat,

    /// Color mode before the RGB coercion
    pub source_color: SourceColor,
}

impl DecodedImage {
    pub fn new(rgb: RgbImage, format: SourceFormat, source_color: SourceColor) -> Self {
        Self { rgb, format, source_color }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }
}

/// The saliency heatmap composited over the original image.
///
/// Always has exactly the original image's pixel dimensions.
/// Encoding to a file format and choosing a storage location is
/// the host's job — the core only hands back the raster (plus a
/// JPEG helper for hosts that want bytes).
#[derive(Debug, Clone)]
pub struct SaliencyOverlay {
    pub rgb: RgbImage,
}

impl SaliencyOverlay {
    pub fn new(rgb: RgbImage) -> Self {
        Self { rgb }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Encode the overlay as JPEG bytes, for hosts that store
    /// the artifact instead of the raster.
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(self.rgb.clone())
            .write_to(&mut buf, ImageFormat::Jpeg)
            .context("Failed to encode saliency overlay as JPEG")?;
        Ok(buf.into_inner())
    }
}
