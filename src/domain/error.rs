// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// A closed set of error kinds for the analysis pipeline.
//
// The host maps each kind to a response class without ever
// inspecting message text:
//   - Validation        → client fault (4xx), user fixes input
//   - NotLoaded         → host sequencing bug, fail fast
//   - ResourceExhausted → transient capacity failure, retryable
//   - ModelLoad         → engine unusable until operator retries
//   - Internal          → generic server fault, details logged
//
// Reference: Rust Book §9 (Error Handling)

use thiserror::Error;

/// Every failure the analysis pipeline can surface to a caller.
///
/// Message strings are for humans; dispatch decisions must use
/// the variant (or the helper methods below), never the text.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Malformed, empty, undecodable or out-of-bounds input image.
    /// Always recoverable by the caller — never a system fault.
    #[error("invalid image: {0}")]
    Validation(String),

    /// `analyze` was called before a successful model load.
    /// Indicates a host sequencing bug, not a per-request problem.
    #[error("model is not loaded")]
    NotLoaded,

    /// The accelerator ran out of memory (or equivalent capacity
    /// failure) during inference. Retry-eligible after backoff.
    #[error("inference resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The model artifacts could not be fetched or deserialized.
    /// The engine refuses analysis traffic until a load succeeds.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Anything unexpected. Full context goes to the log; the
    /// message crossing the boundary stays generic.
    #[error("internal analysis error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// True when the caller (not the system) is at fault and can
    /// fix the request — surfaced as a 4xx-class response.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when retrying later may succeed without any change
    /// to the request (capacity problems, a failed load awaiting
    /// an operator retry). NotLoaded is excluded: calling analyze
    /// before load is a sequencing bug to fail fast on, not a
    /// condition that backoff resolves.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_) | Self::ModelLoad(_))
    }

    /// Stable machine-readable code for audit records and API
    /// error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_)        => "VALIDATION_ERROR",
            Self::NotLoaded            => "MODEL_NOT_LOADED",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::ModelLoad(_)         => "MODEL_LOAD_ERROR",
            Self::Internal(_)          => "INTERNAL_ERROR",
        }
    }

    /// Suggested HTTP status for hosts that speak HTTP.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_)        => 400,
            Self::ResourceExhausted(_) => 503,
            Self::NotLoaded            => 503,
            Self::ModelLoad(_)         => 503,
            Self::Internal(_)          => 500,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_client_fault_not_retryable() {
        let e = AnalysisError::Validation("too small".into());
        assert!(e.is_client_fault());
        assert!(!e.is_retryable());
        assert_eq!(e.http_status(), 400);
        assert_eq!(e.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_resource_exhausted_is_retryable_503() {
        let e = AnalysisError::ResourceExhausted("out of memory".into());
        assert!(e.is_retryable());
        assert!(!e.is_client_fault());
        assert_eq!(e.http_status(), 503);
    }

    #[test]
    fn test_not_loaded_fails_fast_not_retryable() {
        // A sequencing bug on the host side: surfaced as 503 but
        // never treated as something a backoff would fix
        let e = AnalysisError::NotLoaded;
        assert!(!e.is_retryable());
        assert!(!e.is_client_fault());
        assert_eq!(e.http_status(), 503);
        assert_eq!(e.code(), "MODEL_NOT_LOADED");
    }

    #[test]
    fn test_internal_stays_generic() {
        let e = AnalysisError::Internal("wgpu device lost".into());
        assert!(!e.is_client_fault());
        assert!(!e.is_retryable());
        assert_eq!(e.http_status(), 500);
    }
}
