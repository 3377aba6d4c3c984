// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// This is the heart of the application — pure Rust structs
// and traits that define the core concepts of the pipeline.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - NO ML-specific code
//   - Only plain Rust structs, enums, and traits
//     (plus the `image` raster types, which are the domain's
//      pixel currency)
//
// Why keep this layer pure?
//   - Easy to unit test (no GPU needed)
//   - Easy to understand (no framework noise)
//   - Easy to swap implementations (just implement the trait)
//
// Think of this layer as the "dictionary" of the system —
// it defines what things ARE, not how they work.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// The closed error taxonomy every layer speaks
pub mod error;

// Validated rasters: DecodedImage and SaliencyOverlay
pub mod image;

// Classification results, explanations, packaged reports
pub mod report;

// Core abstractions (traits) that other layers implement
pub mod traits;
