//! Trace exporters
//!
//! Exporters are [`ActivityLogger`](crate::trace::ActivityLogger)s: a session
//! forwards every normalized activity to them while it drains the backend.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
