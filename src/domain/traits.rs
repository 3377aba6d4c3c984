// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// By programming against traits instead of concrete types,
// the application layer can swap implementations without
// changing the code that uses them. For example:
//   - InferenceEngine implements Analyzer (the real pipeline)
//   - A stub Analyzer stands in for it in unit tests, so the
//     request orchestration is testable without a GPU or
//     downloaded model weights
//
// This is the Dependency Inversion Principle from SOLID,
// applied using Rust's trait system.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use crate::domain::error::AnalysisError;
use crate::domain::image::{DecodedImage, SaliencyOverlay};
use crate::domain::report::ClassificationResult;

// ─── Analyzer ─────────────────────────────────────────────────────────────────
/// Any component that can classify an X-ray image and, as a
/// secondary best-effort operation, explain its prediction.
///
/// Implementations:
///   - InferenceEngine → runs the loaded burn model
///   - test stubs      → return canned results
pub trait Analyzer {
    /// Decode, validate and classify raw image bytes.
    ///
    /// Returns the classification together with the validated
    /// image so the caller can reuse the decode for the
    /// saliency pass instead of decoding twice.
    fn classify(
        &self,
        bytes: &[u8],
    ) -> Result<(ClassificationResult, DecodedImage), AnalysisError>;

    /// Produce the saliency overlay for a validated image.
    ///
    /// Best-effort by contract: any internal failure degrades to
    /// `None`, it never propagates an error.
    fn explain(&self, image: &DecodedImage) -> Option<SaliencyOverlay>;

    /// The model's ordered label vocabulary.
    fn labels(&self) -> &[String];
}
