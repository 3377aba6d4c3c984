// ============================================================
// Layer 6 — Infrastructure
// ============================================================
// Everything that touches the outside world below the ML layer:
// the filesystem, the network, the audit trail.
//
// What's in this layer:
//
//   model_repository.rs — Resolves a model repository id to
//                         local artifact paths. A repository is
//                         either a directory on disk or an HTTP
//                         base URL; remote artifacts are
//                         downloaded once into a local cache
//                         and reused on later runs
//
//   audit.rs            — Append-only JSONL audit trail of
//                         analysis outcomes and capacity
//                         incidents, one timestamped record
//                         per line
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

pub mod audit;
pub mod model_repository;
