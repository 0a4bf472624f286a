//! Offline replay of a recorded backend capture
//!
//! Drives one full session lifecycle against a [`RecordedBackend`] and writes
//! the result as a Chrome trace. Used by the `gpuscope` binary.

use anyhow::{Context, Result};
use gpuscope_common::RawRecord;
use log::info;
use std::sync::Arc;

use crate::backend::{RecordedBackend, RecordedTrace};
use crate::cli::Args;
use crate::config::ProfilerConfig;
use crate::context::{ManualClock, ProfilerContext};
use crate::domain::{RecordError, Timestamp};
use crate::export::ChromeTraceExporter;
use crate::normalizer::NormalizerStats;
use crate::profiler::XpuProfiler;
use crate::session::ActivityProfilerSession;

/// Outcome of one replay
#[derive(Debug)]
pub struct ReplaySummary {
    pub activities: usize,
    pub iteration: u32,
    pub stats: NormalizerStats,
    pub errors: Vec<RecordError>,
}

/// Replay `args.records` and export the trace to `args.export`
///
/// # Errors
/// Returns an error if an input cannot be loaded, the session cannot be
/// configured, or the trace cannot be written
pub fn run_replay(args: &Args) -> Result<ReplaySummary> {
    let config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)?,
        None => ProfilerConfig::default(),
    };
    let trace = RecordedTrace::from_file(&args.records)?;
    info!("Loaded {} raw record(s) from {}", trace.records.len(), args.records.display());

    // The session span mirrors the capture instead of the replay's wall clock
    let capture_end =
        trace.records.iter().filter_map(RawRecord::interval).map(|(_, end)| end).max();
    let window_end = args.window_end.map(Timestamp);
    let clock = Arc::new(ManualClock::new(args.window_start));

    let backend = Arc::new(RecordedBackend::from_trace(trace));
    let context = Arc::new(ProfilerContext::with_clock(backend, clock.clone()));
    let profiler = XpuProfiler::new(context);

    let mut session = profiler
        .configure_session(&args.requested_kinds(), &config)
        .context("Failed to configure XPU session")?;
    session.start()?;
    if let Some(end) = args.window_end.or(capture_end) {
        clock.set(end.max(args.window_start));
    }
    session.stop()?;

    let mut exporter = ChromeTraceExporter::new();
    session.process_trace_windowed(
        &mut exporter,
        None,
        Timestamp(args.window_start),
        window_end,
    )?;

    let buffer = session.take_trace_buffer();
    exporter
        .export_to_file(&args.export)
        .with_context(|| format!("Failed to write trace to {}", args.export.display()))?;

    Ok(ReplaySummary {
        activities: buffer.len(),
        iteration: buffer.span.iteration,
        stats: session.stats(),
        errors: session.errors().to_vec(),
    })
}
