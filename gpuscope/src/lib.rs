//! # gpuscope - XPU Activity Trace Correlation
//!
//! gpuscope ingests the activity buffers of a device-profiling backend
//! (runtime API calls, kernel launches, memory copies and fills, profiler
//! overhead), stitches them together by correlation id, filters them against
//! a capture window and hands a normalized trace to the host aggregator.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Host Aggregator (profiler core)                │
//! │     ActivityProfiler::configure ─► ActivityProfilerSession      │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ start / stop / process_trace
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    gpuscope (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Session    │──▶│  Normalizer  │──▶│ TraceBuffer  │         │
//! │  │ (lifecycle)  │   │ (per kind)   │   │ + Logger     │         │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────────┘         │
//! │         │                  │                                    │
//! │         │           ┌──────┴───────┐   ┌──────────────┐         │
//! │         │           │ Correlation  │   │   Device     │         │
//! │         │           │  Map/Links   │   │   Table      │         │
//! │         │           └──────────────┘   └──────────────┘         │
//! │         ▼                                                       │
//! │  ┌──────────────┐                                               │
//! │  │   Backend    │  (ActivityBackend trait)                      │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiler`]: registry entry that configures sessions
//! - [`session`]: session state machine and the host-facing session trait
//! - [`normalizer`]: per-kind record handlers, admission checks, linkage
//! - [`correlation`]: correlation map, pending runtime links, queue ordinals
//! - [`device`]: process-wide device UUID → index table
//! - [`context`]: process-scoped state injected into sessions
//! - [`backend`]: the backend seam and the in-memory recorded backend
//! - [`trace`]: normalized activities, trace span and buffer, logger trait
//! - [`export`]: Chrome Trace Event Format output
//! - [`api`]: child profiler and client registration
//! - [`config`], [`cli`], [`replay`]: configuration and the replay binary
//! - [`domain`]: newtypes and error enums
//!
//! ## Typical Usage
//!
//! ```bash
//! # Correlate a recorded capture and open trace.json in Perfetto
//! ./gpuscope --records capture.json --export trace.json
//! ```

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod correlation;
pub mod device;
pub mod domain;
pub mod export;
pub mod normalizer;
pub mod profiler;
pub mod replay;
pub mod session;
pub mod trace;

pub use domain::ActivityKind;
pub use profiler::{ActivityProfiler, XpuProfiler};
pub use session::{ActivityProfilerSession, SessionState, XpuSession};
