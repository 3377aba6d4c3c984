// ============================================================
// Layer 2 — Result Packager
// ============================================================
// Pairs a classification with its bilingual explanation and
// assembles the final report.
//
// The explanation table is keyed by the model's label names.
// An unknown label (a swapped-in model with classes this table
// does not know) gets a NEUTRAL consult-a-doctor explanation
// and a warning — it must never inherit the "normal, no
// findings" text of a different class.
//
// Reference: Rust Book §8 (Collections)

use std::collections::HashMap;

use crate::domain::image::SaliencyOverlay;
use crate::domain::report::{AnalysisReport, ClassificationResult, Explanation};

pub struct ResultPackager {
    explanations: HashMap<String, Explanation>,
}

impl ResultPackager {
    /// The product's built-in explanation table.
    pub fn new() -> Self {
        let mut explanations = HashMap::new();
        explanations.insert(
            "NORMAL".to_string(),
            Explanation::new(
                "الصورة طبيعية. لا يوجد دليل على التهاب رئوي.",
                "The image is normal. No evidence of pneumonia.",
            ),
        );
        explanations.insert(
            "PNEUMONIA".to_string(),
            Explanation::new(
                "تم الكشف عن التهاب رئوي. يُرجى استشارة الطبيب للمراجعة.",
                "Pneumonia detected. Please consult a doctor for review.",
            ),
        );
        Self { explanations }
    }

    /// Explanation for a predicted label, or the neutral
    /// fallback when the label is not in the table.
    pub fn explanation_for(&self, label: &str) -> Explanation {
        match self.explanations.get(label) {
            Some(explanation) => explanation.clone(),
            None => {
                tracing::warn!(
                    "No explanation on file for label '{}'; using the neutral fallback",
                    label
                );
                neutral_explanation()
            }
        }
    }

    /// Assemble the final report from a classification and an
    /// optional saliency overlay.
    pub fn package(
        &self,
        result: ClassificationResult,
        saliency: Option<SaliencyOverlay>,
    ) -> AnalysisReport {
        let explanation = self.explanation_for(&result.label);
        AnalysisReport {
            result: result.label,
            confidence: result.confidence,
            probabilities: result.distribution,
            explanation,
            saliency,
        }
    }
}

impl Default for ResultPackager {
    fn default() -> Self {
        Self::new()
    }
}

/// The fallback for labels outside the table: no medical claim
/// in either direction, just a referral.
fn neutral_explanation() -> Explanation {
    Explanation::new(
        "لا يتوفر تفسير لهذه النتيجة. يُرجى استشارة الطبيب للمراجعة.",
        "No explanation is available for this result. Please consult a doctor for review.",
    )
}
