// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `analyze` — classifies one X-ray image and writes the
//                  saliency overlay next to it
//   2. `info`    — loads the model and reports its labels and
//                  working resolution
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use commands::{resolve_repo, resolve_token, AnalyzeArgs, Commands, InfoArgs};

use crate::application::analyze_use_case::AnalyzeUseCase;
use crate::domain::report::AnalysisReport;
use crate::ml::engine::ModelManager;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "pneumo-detect",
    version = "0.1.0",
    about = "Classify chest X-ray images for pneumonia, with saliency overlays."
)]
pub struct Cli {
    /// The subcommand to run (analyze or info)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Analyze(args) => run_analyze(args),
            Commands::Info(args)    => run_info(args),
        }
    }
}

/// Handles the `analyze` subcommand: load the model, run the
/// workflow, print the report, write the overlay.
fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let repo = resolve_repo(args.model_repo);
    let token = resolve_token(args.token);

    let manager = ModelManager::new();
    let engine = manager.load(&repo, token.as_deref())?;

    let bytes = fs::read(&args.image)
        .with_context(|| format!("cannot read image '{}'", args.image))?;

    let use_case = AnalyzeUseCase::new(!args.no_saliency).with_audit(&args.audit_dir)?;
    let report = use_case.run(engine.as_ref(), &bytes)?;

    // Write the overlay before printing, so the printed path
    // always refers to a file that exists.
    let overlay_path = match &report.saliency {
        Some(overlay) => {
            let path = args
                .saliency_out
                .map(PathBuf::from)
                .unwrap_or_else(|| default_overlay_path(Path::new(&args.image)));
            fs::write(&path, overlay.to_jpeg_bytes()?)
                .with_context(|| format!("cannot write overlay '{}'", path.display()))?;
            Some(path)
        }
        None => None,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, overlay_path.as_deref());
    }
    Ok(())
}

/// Handles the `info` subcommand.
/// Loads the model and prints what it declares about itself.
fn run_info(args: InfoArgs) -> Result<()> {
    let repo = resolve_repo(args.model_repo);
    let token = resolve_token(args.token);

    let manager = ModelManager::new();
    let engine = manager.load(&repo, token.as_deref())?;

    println!("Repository:         {}", repo);
    println!("State:              {}", manager.state_name());
    println!("Device:             {}", engine.device_description());
    println!("Labels:             {}", engine.label_vocabulary().join(", "));
    println!("Working resolution: {0}x{0}", engine.working_resolution());
    Ok(())
}

/// Human-readable report output.
fn print_report(report: &AnalysisReport, overlay_path: Option<&Path>) {
    println!("\nResult:     {}", report.result);
    println!("Confidence: {:.2}%", report.confidence);

    println!("\nProbabilities:");
    for entry in &report.probabilities {
        println!("  {:<12} {:>6.2}%", entry.label, entry.percent);
    }

    println!("\nExplanation (en): {}", report.explanation.en);
    println!("Explanation (ar): {}", report.explanation.ar);

    match overlay_path {
        Some(path) => println!("\nSaliency overlay: {}", path.display()),
        None       => println!("\nSaliency overlay: not available"),
    }
}

/// "scan.png" → "scan_saliency.jpg", in the same directory.
fn default_overlay_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}_saliency.jpg"))
}
