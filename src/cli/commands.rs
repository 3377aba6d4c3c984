// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `analyze` and `info`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

/// Environment variable naming the model repository
pub const MODEL_REPO_ENV: &str = "MODEL_REPO";

/// Environment variable carrying the repository access token
pub const MODEL_TOKEN_ENV: &str = "MODEL_TOKEN";

/// Repository used when neither the flag nor MODEL_REPO is set
pub const DEFAULT_MODEL_REPO: &str = "models/chest_xray_pneumonia";

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze one chest X-ray image for pneumonia
    Analyze(AnalyzeArgs),

    /// Show model repository, labels and working resolution
    Info(InfoArgs),
}

/// All arguments for the `analyze` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Path to the X-ray image (JPEG, PNG, GIF or BMP)
    pub image: String,

    /// Model repository: a local directory or an http(s) base
    /// URL. Falls back to $MODEL_REPO, then the built-in default
    #[arg(long)]
    pub model_repo: Option<String>,

    /// Access token for a private repository.
    /// Falls back to $MODEL_TOKEN
    #[arg(long)]
    pub token: Option<String>,

    /// Print the report as JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    /// Skip the saliency overlay (classification only)
    #[arg(long)]
    pub no_saliency: bool,

    /// Where to write the saliency JPEG.
    /// Default: next to the input, with a "_saliency" suffix
    #[arg(long)]
    pub saliency_out: Option<String>,

    /// Directory for the audit trail (audit.jsonl)
    #[arg(long, default_value = "logs")]
    pub audit_dir: String,
}

/// All arguments for the `info` command
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Model repository: a local directory or an http(s) base
    /// URL. Falls back to $MODEL_REPO, then the built-in default
    #[arg(long)]
    pub model_repo: Option<String>,

    /// Access token for a private repository.
    /// Falls back to $MODEL_TOKEN
    #[arg(long)]
    pub token: Option<String>,
}

/// Flag → environment variable → built-in default.
pub fn resolve_repo(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var(MODEL_REPO_ENV).ok())
        .unwrap_or_else(|| DEFAULT_MODEL_REPO.to_string())
}

/// Flag → environment variable → no token (public repository).
pub fn resolve_token(flag: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var(MODEL_TOKEN_ENV).ok())
}
