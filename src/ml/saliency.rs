// ============================================================
// Layer 5 — Saliency Map Generation
// ============================================================
// Gradient-based attribution: which pixels drove the prediction?
//
// This is a second, independent pass over the same validated
// image — gradients are computed for visualization, never for
// training, and no model parameter is ever updated:
//
//   1. Re-run preprocessing with gradient tracking on the input
//      (each call builds a fresh autodiff graph, so there are no
//      stale accumulated gradients to zero)
//   2. Forward pass; recompute the arg-max locally rather than
//      trusting a value computed by the other pass
//   3. Backpropagate the single winning logit to the input
//   4. |gradient| summed over channels → one importance value
//      per pixel of the working resolution
//   5. Min-max normalise to [0, 1]; a flat gradient map becomes
//      all zeros instead of dividing by zero
//   6. Scale to [0, 255], resize to the ORIGINAL image size,
//      apply a jet-style colormap
//   7. 50/50 alpha blend over the original RGB raster
//
// Failure semantics: the classification result is the primary
// deliverable and this pass is decoration. Every failure in
// here — including panics out of the tensor runtime — degrades
// to `None` with a warning log. Nothing escalates.
//
// Reference: Simonyan et al. (2014) Deep Inside Convolutional
//            Networks: Visualising Image Classification Models
//            and Saliency Maps

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use burn::prelude::*;
use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};

use crate::domain::image::{DecodedImage, SaliencyOverlay};
use crate::ml::engine::InferenceEngine;
use crate::ml::{GradBackend, ScratchGuard};

/// Fixed blend ratio between heatmap and original image.
const BLEND_ALPHA: f32 = 0.5;

/// Computes the attribution overlay for one request. Borrows the
/// engine's model — the weights are shared with the
/// classification pass, never copied.
pub struct SaliencyGenerator<'a> {
    engine: &'a InferenceEngine,
}

impl<'a> SaliencyGenerator<'a> {
    pub fn new(engine: &'a InferenceEngine) -> Self {
        Self { engine }
    }

    /// Produce the overlay, or `None` if anything went wrong.
    pub fn generate(&self, image: &DecodedImage) -> Option<SaliencyOverlay> {
        match self.try_generate(image) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                tracing::warn!("Saliency generation failed (degrading to none): {e:#}");
                None
            }
        }
    }

    fn try_generate(&self, image: &DecodedImage) -> Result<SaliencyOverlay> {
        // Same unconditional device cleanup as the classification
        // pass — the backward graph allocates scratch buffers that
        // must be settled before we return.
        let _scratch = ScratchGuard::new(&self.engine.device);

        let grid = self.input_gradient_grid(image)?;
        let size = self.engine.preprocessor.resolution() as u32;

        let normalized = normalize_saliency(&grid);
        let gray = grayscale_from_normalized(&normalized, size, size)
            .ok_or_else(|| anyhow!("gradient grid has wrong length"))?;

        // The model's working resolution rarely matches the
        // uploaded image; the overlay must match the upload.
        let resized = image::imageops::resize(
            &gray,
            image.width(),
            image.height(),
            FilterType::Triangle,
        );
        let heatmap = apply_jet(&resized);
        let overlay = blend_overlay(&image.rgb, &heatmap, BLEND_ALPHA);

        tracing::debug!(
            "Saliency overlay ready at {}x{}",
            overlay.width(),
            overlay.height()
        );
        Ok(SaliencyOverlay::new(overlay))
    }

    /// Forward + backward pass: per-pixel |∂logit/∂input| summed
    /// over channels, flattened row-major at the working
    /// resolution.
    fn input_gradient_grid(&self, image: &DecodedImage) -> Result<Vec<f32>> {
        let input_data = self.engine.preprocessor.to_model_input(image);
        let size = self.engine.preprocessor.resolution();

        // The tensor runtime panics on allocation failure; this
        // pass swallows even that, per the degrade-to-none contract.
        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<Vec<f32>> {
            let input = Tensor::<GradBackend, 1>::from_floats(
                input_data.as_slice(),
                &self.engine.device,
            )
            .reshape([1, 3, size, size])
            .require_grad();

            let logits = self.engine.model.forward(input.clone());

            // Independent arg-max for this pass
            let scores: Vec<f32> = logits
                .clone()
                .into_data()
                .to_vec()
                .map_err(|e| anyhow!("cannot read logits: {e:?}"))?;
            let class_idx = scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(idx, _)| idx)
                .ok_or_else(|| anyhow!("model produced no logits"))?;

            // Backpropagate from the single winning logit
            let score: Tensor<GradBackend, 1> = logits
                .slice([0..1, class_idx..class_idx + 1])
                .reshape([1]);
            let grads = score.backward();
            let input_grad = input
                .grad(&grads)
                .ok_or_else(|| anyhow!("input gradient unavailable"))?;

            // [1, 3, s, s] → abs → sum over channels → [1, 1, s, s]
            input_grad
                .abs()
                .sum_dim(1)
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("cannot read gradients: {e:?}"))
        }));

        match outcome {
            Ok(result) => result,
            Err(_) => Err(anyhow!("saliency pass panicked in the tensor runtime")),
        }
    }
}

/// Min-max scale importance values into [0, 1]. A degenerate
/// (flat) map scales to all zeros — never a division by zero.
pub(crate) fn normalize_saliency(values: &[f32]) -> Vec<f32> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }

    let range = max - min;
    if values.is_empty() || range == 0.0 || !range.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - min) / range).collect()
}

/// Pack normalized [0, 1] values into an 8-bit grayscale raster.
pub(crate) fn grayscale_from_normalized(
    values: &[f32],
    width: u32,
    height: u32,
) -> Option<GrayImage> {
    let pixels: Vec<u8> = values
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    GrayImage::from_raw(width, height, pixels)
}

/// A jet-style color for one intensity: blue through cyan,
/// green and yellow up to red.
pub(crate) fn jet_color(value: u8) -> Rgb<u8> {
    let x = value as f32 / 255.0;
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([
        channel(1.5 - (4.0 * x - 3.0).abs()),
        channel(1.5 - (4.0 * x - 2.0).abs()),
        channel(1.5 - (4.0 * x - 1.0).abs()),
    ])
}

/// Colormap a grayscale importance raster into a 3-channel heatmap.
pub(crate) fn apply_jet(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        jet_color(gray.get_pixel(x, y)[0])
    })
}

/// Fixed-ratio alpha blend: alpha of the heatmap over the base.
/// Both rasters must have identical dimensions.
pub(crate) fn blend_overlay(base: &RgbImage, heatmap: &RgbImage, alpha: f32) -> RgbImage {
    debug_assert_eq!(base.dimensions(), heatmap.dimensions());
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let b = base.get_pixel(x, y);
        let h = heatmap.get_pixel(x, y);
        let mix = |i: usize| {
            ((1.0 - alpha) * b[i] as f32 + alpha * h[i] as f32)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgb([mix(0), mix(1), mix(2)])
    })
}
