// ============================================================
// Layer 5 — CNN Classifier Architecture
// ============================================================
// A compact convolutional classifier for chest X-rays, plus the
// ModelSpec that travels with the weights.
//
// Why does the spec live next to the model?
//   When loading for inference we must rebuild the exact
//   architecture (working resolution, class count) before the
//   recorded weights can be restored into it. The repository's
//   config.json is the single source of truth for that — and
//   for the label ordering, which is read from the model's own
//   id2label mapping rather than hardcoded, so a model swap
//   with different classes stays correct.
//
// Architecture:
//   - {Conv 3x3 (no padding) + ReLU} with 2x2 max-pooling
//     after the first two blocks
//   - Flatten
//   - FC: d → d/2 + ReLU + Dropout
//   - FC: d/2 → num_classes (raw logits — softmax is applied
//     by the engine, and the saliency pass needs the logit)
//
// Size arithmetic: each unpadded 3x3 conv shrinks the side by
// 2, each 2x2 pool halves it (floor). 224 → 222 → 111 → 109 →
// 54 → 52, so d = 128 * 52 * 52.
//
// Reference: Burn Book §3 (Building Blocks)

use std::collections::BTreeMap;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::PreprocessConfig;

/// Channel widths of the three conv blocks.
const CONV_CHANNELS: [usize; 3] = [32, 64, 128];

/// Smallest working resolution the conv stack can shrink.
/// 18 → 16 → 8 → 6 → 3 → 1; anything below 18 collapses the
/// feature map to zero.
pub const MIN_WORKING_RESOLUTION: usize = 18;

/// Labels used only when a model repository ships no id2label
/// mapping at all. Using these is logged as a warning — the
/// model's own mapping is authoritative.
pub const FALLBACK_LABELS: [&str; 2] = ["NORMAL", "PNEUMONIA"];

fn default_dropout() -> f64 {
    0.0
}

/// Everything config.json declares about a packaged model:
/// label vocabulary, working resolution and the preprocessing
/// parameters the weights were trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Class index → class name, as the model defines it.
    /// Keys are stringified indices ("0", "1", ...).
    #[serde(default)]
    pub id2label: BTreeMap<String, String>,

    /// Preprocessing transform parameters (flattened so the
    /// config file stays a single flat JSON object)
    #[serde(flatten)]
    pub preprocess: PreprocessConfig,

    /// Dropout probability baked into the trained weights;
    /// irrelevant at inference but needed to rebuild the module
    #[serde(default = "default_dropout")]
    pub dropout: f64,
}

impl ModelSpec {
    /// The ordered label vocabulary from the model's own
    /// id2label mapping, or `None` when the mapping is missing
    /// or malformed (non-numeric keys).
    pub fn labels(&self) -> Option<Vec<String>> {
        if self.id2label.is_empty() {
            return None;
        }
        let mut indexed: Vec<(usize, &String)> = Vec::with_capacity(self.id2label.len());
        for (key, label) in &self.id2label {
            indexed.push((key.parse().ok()?, label));
        }
        indexed.sort_by_key(|(idx, _)| *idx);
        Some(indexed.into_iter().map(|(_, label)| label.clone()).collect())
    }
}

/// Model hyperparameters — reconstructed from the ModelSpec at
/// load time, never trusted from the caller.
#[derive(Config, Debug)]
pub struct XrayCnnConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Square working resolution of the input
    #[config(default = 224)]
    pub image_size: usize,

    /// Dropout probability between the two linear layers
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl XrayCnnConfig {
    /// Side length of the feature map after the conv stack.
    /// Zero means the working resolution is too small.
    pub fn feature_map_side(&self) -> usize {
        let after_conv1 = self.image_size.saturating_sub(2);
        let after_pool1 = after_conv1 / 2;
        let after_conv2 = after_pool1.saturating_sub(2);
        let after_pool2 = after_conv2 / 2;
        after_pool2.saturating_sub(2)
    }

    /// Initialise the module on the given device. The caller
    /// (the engine) validates `image_size` first, so a zero
    /// feature map cannot occur here.
    pub fn init<B: Backend>(&self, device: &B::Device) -> XrayCnn<B> {
        let side = self.feature_map_side();
        let d = CONV_CHANNELS[2] * side * side;
        let d_half = d / 2;

        XrayCnn {
            conv1: Conv2dConfig::new([3, CONV_CHANNELS[0]], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).init(),
            conv2: Conv2dConfig::new([CONV_CHANNELS[0], CONV_CHANNELS[1]], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).init(),
            conv3: Conv2dConfig::new([CONV_CHANNELS[1], CONV_CHANNELS[2]], [3, 3])
                .with_stride([1, 1])
                .init(device),
            fc1:        LinearConfig::new(d, d_half).init(device),
            fc2:        LinearConfig::new(d_half, self.num_classes).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

/// The chest X-ray classifier.
#[derive(Module, Debug)]
pub struct XrayCnn<B: Backend> {
    conv1: Conv2d<B>,  // 3 → 32
    pool1: MaxPool2d,  // 2x2
    conv2: Conv2d<B>,  // 32 → 64
    pool2: MaxPool2d,  // 2x2
    conv3: Conv2d<B>,  // 64 → 128

    fc1: Linear<B>,    // d → d/2
    fc2: Linear<B>,    // d/2 → num_classes

    dropout:    Dropout,
    activation: Relu,
}

impl<B: Backend> XrayCnn<B> {
    /// Forward pass.
    ///
    /// `images`: [batch, 3, size, size] → logits [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_follow_model_ordering() {
        let json = r#"{
            "id2label": {"1": "PNEUMONIA", "0": "NORMAL"},
            "image_size": 224
        }"#;
        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.labels().unwrap(), vec!["NORMAL", "PNEUMONIA"]);
    }

    #[test]
    fn test_labels_multiclass_numeric_order() {
        // "10" must sort after "9" — numeric order, not lexicographic
        let json = r#"{"id2label": {
            "0":"a","1":"b","2":"c","3":"d","4":"e","5":"f",
            "6":"g","7":"h","8":"i","9":"j","10":"k"
        }}"#;
        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        let labels = spec.labels().unwrap();
        assert_eq!(labels.len(), 11);
        assert_eq!(labels[9], "j");
        assert_eq!(labels[10], "k");
    }

    #[test]
    fn test_missing_id2label_yields_none() {
        let spec: ModelSpec = serde_json::from_str(r#"{"image_size": 224}"#).unwrap();
        assert!(spec.labels().is_none());
    }

    #[test]
    fn test_malformed_id2label_yields_none() {
        let json = r#"{"id2label": {"zero": "NORMAL"}}"#;
        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        assert!(spec.labels().is_none());
    }

    #[test]
    fn test_preprocess_fields_flatten() {
        let json = r#"{
            "id2label": {"0": "NORMAL", "1": "PNEUMONIA"},
            "image_size": 224,
            "image_mean": [0.5, 0.5, 0.5],
            "image_std": [0.5, 0.5, 0.5]
        }"#;
        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.preprocess.image_size, 224);
        assert_eq!(spec.preprocess.image_mean, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_feature_map_arithmetic() {
        let cfg = XrayCnnConfig::new(2).with_image_size(224);
        // 224 → 222 → 111 → 109 → 54 → 52
        assert_eq!(cfg.feature_map_side(), 52);

        let tiny = XrayCnnConfig::new(2).with_image_size(13);
        assert_eq!(tiny.feature_map_side(), 0);

        // 18 → 16 → 8 → 6 → 3 → 1 is the smallest non-degenerate size
        let minimum = XrayCnnConfig::new(2).with_image_size(MIN_WORKING_RESOLUTION);
        assert_eq!(minimum.feature_map_side(), 1);

        // Every size below the minimum is degenerate, without exception
        for size in 0..MIN_WORKING_RESOLUTION {
            let below = XrayCnnConfig::new(2).with_image_size(size);
            assert_eq!(below.feature_map_side(), 0, "size {size}");
        }
    }
}
