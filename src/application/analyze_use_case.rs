// ============================================================
// Layer 2 — Analyze Use Case
// ============================================================
// The end-to-end workflow for one uploaded image:
//   1. Classify the raw bytes (decode, validate, forward pass)
//   2. Best-effort: generate the saliency overlay
//   3. Package the result with its bilingual explanation
//   4. Record the outcome in the audit trail
//
// Ordering invariant: the saliency pass runs AFTER a successful
// classification and reuses its validated image. An image the
// validator rejected never reaches the model, in either pass.
//
// The analyzer arrives as a trait object-free generic, so tests
// drive this workflow with a stub instead of a loaded model.

use anyhow::Result;

use crate::application::packager::ResultPackager;
use crate::domain::error::AnalysisError;
use crate::domain::report::AnalysisReport;
use crate::domain::traits::Analyzer;
use crate::infra::audit::{AuditEvent, AuditLogger};

pub struct AnalyzeUseCase {
    packager:      ResultPackager,
    audit:         Option<AuditLogger>,
    with_saliency: bool,
}

impl AnalyzeUseCase {
    pub fn new(with_saliency: bool) -> Self {
        Self {
            packager: ResultPackager::new(),
            audit: None,
            with_saliency,
        }
    }

    /// Attach an audit trail. Without one, outcomes are only
    /// visible in the tracing output.
    pub fn with_audit(mut self, dir: &str) -> Result<Self> {
        self.audit = Some(AuditLogger::new(dir)?);
        Ok(self)
    }

    /// Run the workflow for one image.
    pub fn run<A: Analyzer>(
        &self,
        analyzer: &A,
        bytes: &[u8],
    ) -> Result<AnalysisReport, AnalysisError> {
        let (result, image) = match analyzer.classify(bytes) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let AnalysisError::ResourceExhausted(detail) = &e {
                    self.record(&AuditEvent::ResourceExhausted {
                        detail: detail.clone(),
                    });
                }
                return Err(e);
            }
        };

        // Best-effort decoration: a failed overlay leaves
        // `saliency` empty and the report still ships.
        let saliency = if self.with_saliency {
            analyzer.explain(&image)
        } else {
            tracing::debug!("Saliency pass disabled for this run");
            None
        };

        let report = self.packager.package(result, saliency);

        self.record(&AuditEvent::AnalysisCompleted {
            label:      report.result.clone(),
            confidence: report.confidence,
        });

        Ok(report)
    }

    /// Audit writes never abort an analysis; a failed write is
    /// an operator problem, not the patient's.
    fn record(&self, event: &AuditEvent) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(event) {
                tracing::warn!("Audit write failed: {e:#}");
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::{DecodedImage, SaliencyOverlay, SourceColor, SourceFormat};
    use crate::domain::report::{ClassProbability, ClassificationResult};
    use image::RgbImage;
    use std::cell::Cell;

    /// Canned analyzer: fixed classification, counts explain calls.
    struct StubAnalyzer {
        labels:        Vec<String>,
        outcome:       Result<ClassificationResult, AnalysisError>,
        with_overlay:  bool,
        explain_calls: Cell<usize>,
    }

    impl StubAnalyzer {
        fn ok(label: &str, with_overlay: bool) -> Self {
            Self {
                labels: vec!["NORMAL".into(), "PNEUMONIA".into()],
                outcome: Ok(ClassificationResult {
                    label:      label.to_string(),
                    confidence: 91.5,
                    distribution: vec![
                        ClassProbability { label: "NORMAL".into(),    percent: 8.5 },
                        ClassProbability { label: "PNEUMONIA".into(), percent: 91.5 },
                    ],
                }),
                with_overlay,
                explain_calls: Cell::new(0),
            }
        }

        fn failing(error: AnalysisError) -> Self {
            Self {
                labels:        vec![],
                outcome:       Err(error),
                with_overlay:  false,
                explain_calls: Cell::new(0),
            }
        }
    }

    impl Analyzer for StubAnalyzer {
        fn classify(
            &self,
            _bytes: &[u8],
        ) -> Result<(ClassificationResult, DecodedImage), AnalysisError> {
            let image = DecodedImage::new(
                RgbImage::new(64, 64),
                SourceFormat::Png,
                SourceColor::Rgb,
            );
            self.outcome.clone().map(|result| (result, image))
        }

        fn explain(&self, image: &DecodedImage) -> Option<SaliencyOverlay> {
            self.explain_calls.set(self.explain_calls.get() + 1);
            self.with_overlay
                .then(|| SaliencyOverlay::new(image.rgb.clone()))
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    #[test]
    fn test_successful_run_packages_everything() {
        let use_case = AnalyzeUseCase::new(true);
        let stub = StubAnalyzer::ok("PNEUMONIA", true);

        let report = use_case.run(&stub, b"fake bytes").unwrap();
        assert_eq!(report.result, "PNEUMONIA");
        assert_eq!(report.confidence, 91.5);
        assert!(report.explanation.en.contains("Pneumonia detected"));
        assert!(report.has_saliency());
        assert_eq!(stub.explain_calls.get(), 1);
    }

    #[test]
    fn test_saliency_failure_keeps_the_classification() {
        // The overlay degrades to none, the report still ships
        let use_case = AnalyzeUseCase::new(true);
        let stub = StubAnalyzer::ok("NORMAL", false);

        let report = use_case.run(&stub, b"fake bytes").unwrap();
        assert_eq!(report.result, "NORMAL");
        assert!(!report.has_saliency());
    }

    #[test]
    fn test_saliency_disabled_skips_the_pass_entirely() {
        let use_case = AnalyzeUseCase::new(false);
        let stub = StubAnalyzer::ok("NORMAL", true);

        let report = use_case.run(&stub, b"fake bytes").unwrap();
        assert!(!report.has_saliency());
        assert_eq!(stub.explain_calls.get(), 0);
    }

    #[test]
    fn test_classification_failure_propagates_unchanged() {
        let use_case = AnalyzeUseCase::new(true);
        let stub = StubAnalyzer::failing(AnalysisError::Validation("too small".into()));

        let err = use_case.run(&stub, b"fake bytes").unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(stub.explain_calls.get(), 0);
    }

    #[test]
    fn test_resource_exhaustion_is_audited_and_propagated() {
        let dir = std::env::temp_dir()
            .join("pneumo-detect-tests")
            .join(format!("audit-oom-{}", std::process::id()));
        let use_case = AnalyzeUseCase::new(true)
            .with_audit(dir.to_str().unwrap())
            .unwrap();
        let stub =
            StubAnalyzer::failing(AnalysisError::ResourceExhausted("allocation failed".into()));

        let err = use_case.run(&stub, b"fake bytes").unwrap_err();
        assert!(matches!(err, AnalysisError::ResourceExhausted(_)));

        let text = std::fs::read_to_string(dir.join("audit.jsonl")).unwrap();
        assert!(text.contains("RESOURCE_EXHAUSTED"));
    }
}
