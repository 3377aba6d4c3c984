// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// The model's paired preprocessing transform. The parameters
// travel with the model artifacts (config.json) so that the
// transform is always the one the weights were trained with:
//
//   1. Resize to the working resolution (square, bilinear)
//   2. Rescale u8 pixels to [0, 1]
//   3. Normalise per channel: (x - mean) / std
//   4. Emit channel-major (CHW) f32 data for the tensor
//
// The same transform feeds both the classification pass and
// the saliency pass, so the gradients computed by the latter
// line up with what the model actually saw.
//
// Reference: Rust Book §13 (Iterators)

use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::domain::image::DecodedImage;

fn default_image_size() -> usize {
    224
}

fn default_mean() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_std() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

/// Preprocessing parameters, deserialized from the model
/// repository's config.json alongside the architecture fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Working resolution: images are resized to size × size
    #[serde(default = "default_image_size")]
    pub image_size: usize,

    /// Per-channel mean subtracted after rescaling to [0, 1]
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],

    /// Per-channel standard deviation divided out
    #[serde(default = "default_std")]
    pub image_std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: default_image_size(),
            image_mean: default_mean(),
            image_std:  default_std(),
        }
    }
}

#[derive(Debug)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// The square working resolution of the model.
    pub fn resolution(&self) -> usize {
        self.config.image_size
    }

    /// Transform a validated image into flat CHW f32 data of
    /// length 3 × size × size, ready for a [1, 3, size, size]
    /// tensor reshape.
    pub fn to_model_input(&self, image: &DecodedImage) -> Vec<f32> {
        let size = self.config.image_size as u32;
        let resized = image::imageops::resize(&image.rgb, size, size, FilterType::Triangle);
        self.normalize_chw(&resized)
    }

    /// Rescale + normalise a resized raster in channel-major order.
    fn normalize_chw(&self, resized: &RgbImage) -> Vec<f32> {
        let (width, height) = resized.dimensions();
        let mut data = Vec::with_capacity(3 * (width * height) as usize);

        // Channel-major: all of R, then all of G, then all of B —
        // the layout the conv stack expects.
        for channel in 0..3 {
            let mean = self.config.image_mean[channel];
            let std  = self.config.image_std[channel];
            for y in 0..height {
                for x in 0..width {
                    let value = resized.get_pixel(x, y)[channel] as f32 / 255.0;
                    data.push((value - mean) / std);
                }
            }
        }

        data
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::{SourceColor, SourceFormat};
    use image::Rgb;

    fn decoded(rgb: RgbImage) -> DecodedImage {
        DecodedImage::new(rgb, SourceFormat::Png, SourceColor::Rgb)
    }

    #[test]
    fn test_output_length_matches_resolution() {
        let pre = Preprocessor::new(PreprocessConfig::default());
        let input = pre.to_model_input(&decoded(RgbImage::new(64, 48)));
        assert_eq!(input.len(), 3 * 224 * 224);
    }

    #[test]
    fn test_normalization_values() {
        // A uniform white image: 255/255 = 1.0 → (1.0 - 0.5) / 0.5 = 1.0
        let config = PreprocessConfig { image_size: 8, ..Default::default() };
        let pre = Preprocessor::new(config);
        let white = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
        let input = pre.to_model_input(&decoded(white));
        assert!(input.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        // A uniform black image: 0/255 = 0.0 → (0.0 - 0.5) / 0.5 = -1.0
        let config = PreprocessConfig { image_size: 8, ..Default::default() };
        let pre = Preprocessor::new(config);
        let black = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let input = pre.to_model_input(&decoded(black));
        assert!(input.iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_channel_major_layout() {
        // Pure red image: R channel all ones, G and B all minus-one
        let config = PreprocessConfig { image_size: 4, ..Default::default() };
        let pre = Preprocessor::new(config);
        let red = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        let input = pre.to_model_input(&decoded(red));

        let plane = 4 * 4;
        assert!(input[..plane].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(input[plane..].iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_custom_mean_std_respected() {
        let config = PreprocessConfig {
            image_size: 2,
            image_mean: [0.0, 0.0, 0.0],
            image_std:  [1.0, 1.0, 1.0],
        };
        let pre = Preprocessor::new(config);
        let gray = RgbImage::from_pixel(2, 2, Rgb([51, 51, 51]));
        let input = pre.to_model_input(&decoded(gray));
        // 51/255 = 0.2 with identity normalisation
        assert!(input.iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }
}
