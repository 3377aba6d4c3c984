// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (analyzing one uploaded image).
//
// Rules for this layer:
//   - No tensor math or model code here (that's Layer 5)
//   - No UI or printing here (that's Layer 1)
//   - No direct file or network access (that's Layer 6)
//   - Only workflow coordination
//
// Think of this layer as the "director" — it tells other
// layers what to do but doesn't do the work itself.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The end-to-end analysis workflow
pub mod analyze_use_case;

// Result packaging: explanation lookup + report assembly
pub mod packager;
