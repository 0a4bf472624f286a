//! # gpuscope - Replay Entry Point
//!
//! Feeds a recorded XPU backend capture through a profiling session and writes
//! the correlated trace as Chrome Trace Event JSON:
//!
//! ```bash
//! gpuscope --records capture.json --export trace.json
//! RUST_LOG=debug gpuscope --records capture.json --kinds kernel --export trace.json
//! ```

use anyhow::Result;
use clap::Parser;

use gpuscope::cli::Args;
use gpuscope::domain::ProfilerError;
use gpuscope::replay::run_replay;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

/// Rejected requests and unparsable input files are usage errors; anything
/// else is a runtime failure. Walks the whole chain since `run_replay` adds
/// context on top of the source error.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    let usage = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ProfilerError>(),
            Some(ProfilerError::Unsupported(_) | ProfilerError::UnsupportedKind(_))
        ) || cause.is::<serde_json::Error>()
    });
    if usage {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    if !quiet {
        println!("gpuscope v{}", env!("CARGO_PKG_VERSION"));
        println!("records: {}", args.records.display());
        println!("export: {}", args.export.display());
    }

    let summary = run_replay(&args)?;

    // Record errors are diagnostics, not failures
    for error in &summary.errors {
        eprintln!("warning: {error}");
    }

    if !quiet {
        println!("iteration: {}", summary.iteration);
        println!(
            "activities: {} ({} malformed, {} outside window, {} linked)",
            summary.activities,
            summary.stats.malformed,
            summary.stats.out_of_window,
            summary.stats.linked
        );
    }
    Ok(())
}
