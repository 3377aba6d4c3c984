// ============================================================
// Layer 4 — Data Layer
// ============================================================
// Everything that turns raw upload bytes into model-ready
// numbers, with validation as the hard gate in between:
//
//   validator.rs    — decodes bytes, enforces the format
//                     allow-list and the 50px–4096px dimension
//                     bounds, coerces the color mode to RGB.
//                     Nothing touches the model before this
//                     gate passes.
//
//   preprocessor.rs — the model's paired transform: resize to
//                     the working resolution, rescale to [0,1],
//                     per-channel mean/std normalisation,
//                     channel-major (CHW) layout.
//
// Reference: Rust Book §7 (Modules)

/// Byte-level decode + format/size validation
pub mod validator;

/// Resize / normalise / CHW transform for the model
pub mod preprocessor;
