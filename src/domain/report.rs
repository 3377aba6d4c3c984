// ============================================================
// Layer 3 — Result Types
// ============================================================
// The immutable value types the pipeline hands back to the host:
// the classification itself, the per-class breakdown and the
// packaged report with its bilingual explanation.
//
// Numeric contract: confidence and every distribution entry are
// percentages in [0, 100], rounded to 2 decimal places. After
// rounding the distribution sums to 100 only within a small
// epsilon — callers must not assert exact equality.
//
// Reference: Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

use crate::domain::image::SaliencyOverlay;

/// One entry of the per-class probability breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassProbability {
    /// Class name, taken from the model's own label vocabulary
    pub label: String,

    /// Probability as a percentage, rounded to 2 decimals
    pub percent: f64,
}

/// The outcome of one forward pass. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Arg-max class name
    pub label: String,

    /// Probability of the arg-max class, in [0, 100]
    pub confidence: f64,

    /// Full distribution in the model's label order
    pub distribution: Vec<ClassProbability>,
}

impl ClassificationResult {
    /// Sum of the rounded distribution — ~100 within rounding error.
    pub fn distribution_total(&self) -> f64 {
        self.distribution.iter().map(|p| p.percent).sum()
    }
}

/// Human-readable explanation of a result, in both languages the
/// product ships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub ar: String,
    pub en: String,
}

impl Explanation {
    pub fn new(ar: impl Into<String>, en: impl Into<String>) -> Self {
        Self { ar: ar.into(), en: en.into() }
    }
}

/// The packaged response the web layer consumes.
///
/// The saliency overlay is optional by design: the classification
/// is the primary deliverable and must survive any saliency
/// failure. The raster itself is not serialized — the host
/// encodes and stores it, then records its own reference.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Arg-max class name (the original API's `result` field)
    pub result: String,

    /// Confidence percentage, 2 decimals
    pub confidence: f64,

    /// Per-class breakdown in model label order
    pub probabilities: Vec<ClassProbability>,

    /// Bilingual explanation for the predicted label
    pub explanation: Explanation,

    /// Heatmap overlay, absent whenever the saliency pass failed
    #[serde(skip)]
    pub saliency: Option<SaliencyOverlay>,
}

impl AnalysisReport {
    pub fn has_saliency(&self) -> bool {
        self.saliency.is_some()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_total() {
        let result = ClassificationResult {
            label:      "PNEUMONIA".into(),
            confidence: 87.12,
            distribution: vec![
                ClassProbability { label: "NORMAL".into(),    percent: 12.88 },
                ClassProbability { label: "PNEUMONIA".into(), percent: 87.12 },
            ],
        };
        assert!((result.distribution_total() - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_report_serializes_without_raster() {
        let report = AnalysisReport {
            result:        "NORMAL".into(),
            confidence:    99.0,
            probabilities: vec![],
            explanation:   Explanation::new("ar", "en"),
            saliency:      None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"result\":\"NORMAL\""));
        assert!(!json.contains("saliency"));
    }
}
