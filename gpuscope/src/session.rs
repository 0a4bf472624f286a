//! # Profiling Session
//!
//! One capture from configuration to trace hand-off.
//!
//! ```text
//!   configure ──► Configured ──start──► Started ──stop──► Stopped
//!                     │                    │                 │
//!                     └────────────────────┴── process_trace ┴──► Drained
//! ```
//!
//! - `start()` is only valid from `Configured`.
//! - The first `stop()` disables the backend and fixes the window end, even
//!   on a drained session; later calls are logged no-ops.
//! - `process_trace` runs exactly once. Calling it before `stop()` yields a
//!   trace with an open window end.
//! - Dropping the session discards whatever the backend still buffers, however
//!   processing ended.

use gpuscope_common::CorrelationFlow;
use log::{debug, info};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::ProfilerConfig;
use crate::context::ProfilerContext;
use crate::domain::{ActivityKind, DeviceIndex, ProfilerError, QueueIndex, RecordError, Timestamp};
use crate::normalizer::{ActivityNormalizer, CaptureWindow, NormalizerStats};
use crate::trace::{ActivityLogger, LinkedActivityResolver, TraceBuffer, TraceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    Started,
    Stopped,
    Drained,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Configured => "configured",
            SessionState::Started => "started",
            SessionState::Stopped => "stopped",
            SessionState::Drained => "drained",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-level device track description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: DeviceIndex,
    pub name: String,
}

/// One device queue track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub device: DeviceIndex,
    pub id: QueueIndex,
    pub sort_index: u32,
    pub name: String,
}

/// Session surface seen by the host aggregator
pub trait ActivityProfilerSession {
    fn state(&self) -> SessionState;

    /// # Errors
    /// Returns `InvalidState` unless the session is `Configured`
    fn start(&mut self) -> Result<(), ProfilerError>;

    /// # Errors
    /// Never fails today; kept fallible for backends whose disable can fail
    fn stop(&mut self) -> Result<(), ProfilerError>;

    /// Drain the backend and normalize against `[start, end)` of this session
    ///
    /// # Errors
    /// Returns `InvalidState` if the trace was already processed
    fn process_trace(&mut self, logger: &mut dyn ActivityLogger) -> Result<(), ProfilerError>;

    /// Like [`process_trace`](Self::process_trace), filtering against the
    /// supplied window and linking runtime calls through `resolver`
    ///
    /// # Errors
    /// Returns `InvalidState` if the trace was already processed
    fn process_trace_windowed(
        &mut self,
        logger: &mut dyn ActivityLogger,
        resolver: Option<LinkedActivityResolver>,
        window_start: Timestamp,
        window_end: Option<Timestamp>,
    ) -> Result<(), ProfilerError>;

    fn device_info(&self) -> Option<DeviceInfo>;

    fn resource_infos(&self) -> Vec<ResourceInfo>;

    /// Move the accumulated trace out; later calls return an empty buffer
    fn take_trace_buffer(&mut self) -> TraceBuffer;

    fn errors(&self) -> &[RecordError];

    fn push_correlation_id(&self, id: u64);

    fn pop_correlation_id(&self);

    fn push_user_correlation_id(&self, id: u64);

    fn pop_user_correlation_id(&self);
}

pub struct XpuSession {
    context: Arc<ProfilerContext>,
    config: Arc<ProfilerConfig>,
    requested: BTreeSet<ActivityKind>,
    state: SessionState,
    profiler_start: Option<Timestamp>,
    profiler_end: Option<Timestamp>,
    normalizer: ActivityNormalizer,
    buffer: TraceBuffer,
}

impl XpuSession {
    /// Configure the backend for `requested` and enter `Configured`
    ///
    /// # Errors
    /// Returns an error if the backend rejects the buffer limit or any kind
    pub fn new(
        context: Arc<ProfilerContext>,
        requested: BTreeSet<ActivityKind>,
        config: &ProfilerConfig,
    ) -> Result<Self, ProfilerError> {
        let config = Arc::new(config.clone());
        let backend = context.backend();
        backend.set_max_buffer_size(config.activities_max_gpu_buffer_size)?;
        backend.enable(&requested)?;

        let devices = context.devices();
        info!(
            "Configured XPU session: {} kind(s), {} device(s)",
            requested.len(),
            devices.len()
        );

        Ok(Self {
            normalizer: ActivityNormalizer::new(devices, requested.clone()),
            context,
            config,
            requested,
            state: SessionState::Configured,
            profiler_start: None,
            profiler_end: None,
            buffer: TraceBuffer::default(),
        })
    }

    pub fn requested(&self) -> &BTreeSet<ActivityKind> {
        &self.requested
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn window(&self) -> CaptureWindow {
        self.normalizer.window()
    }

    pub fn stats(&self) -> NormalizerStats {
        self.normalizer.stats
    }

    fn drain(&mut self, logger: &mut dyn ActivityLogger) -> Result<(), ProfilerError> {
        if self.state == SessionState::Drained {
            return Err(ProfilerError::InvalidState {
                operation: "process_trace",
                state: self.state.as_str(),
            });
        }

        self.buffer.span = TraceSpan {
            start: self.profiler_start.unwrap_or_default(),
            end: self.profiler_end,
            name: self.config.trace_name.clone(),
            iteration: self.context.next_iteration(),
        };
        logger.handle_span(&self.buffer.span);

        if let Some(records) = self.context.backend().activity_buffer() {
            debug!("Processing {} raw record(s)", records.len());
            for record in &records {
                self.normalizer.process_record(record, &mut self.buffer, logger);
            }
        }

        let stats = self.normalizer.stats;
        info!(
            "Processed trace iteration {}: {} emitted, {} malformed, {} out of window",
            self.buffer.span.iteration, stats.emitted, stats.malformed, stats.out_of_window
        );
        self.state = SessionState::Drained;
        Ok(())
    }

    fn correlation(&self, flow: CorrelationFlow, id: Option<u64>) {
        let backend = self.context.backend();
        match id {
            Some(id) => backend.push_correlation_id(id, flow),
            None => backend.pop_correlation_id(flow),
        }
    }
}

impl ActivityProfilerSession for XpuSession {
    fn state(&self) -> SessionState {
        self.state
    }

    fn start(&mut self) -> Result<(), ProfilerError> {
        if self.state != SessionState::Configured {
            return Err(ProfilerError::InvalidState {
                operation: "start",
                state: self.state.as_str(),
            });
        }
        let now = self.context.now();
        self.profiler_start = Some(now);
        self.state = SessionState::Started;
        info!("XPU session started at {now}");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        if self.profiler_end.is_some() {
            debug!("Ignoring stop() on {} session", self.state);
            return Ok(());
        }
        self.context.backend().disable(&self.requested);
        let now = self.context.now();
        self.profiler_end = Some(now);
        // A drained session stays drained; collection still has to halt.
        if self.state != SessionState::Drained {
            self.state = SessionState::Stopped;
        }
        info!("XPU session stopped at {now}");
        Ok(())
    }

    fn process_trace(&mut self, logger: &mut dyn ActivityLogger) -> Result<(), ProfilerError> {
        let window = CaptureWindow::new(self.profiler_start.unwrap_or_default(), self.profiler_end);
        if self.state != SessionState::Drained {
            self.normalizer.set_window(window);
        }
        self.drain(logger)
    }

    fn process_trace_windowed(
        &mut self,
        logger: &mut dyn ActivityLogger,
        resolver: Option<LinkedActivityResolver>,
        window_start: Timestamp,
        window_end: Option<Timestamp>,
    ) -> Result<(), ProfilerError> {
        if self.state != SessionState::Drained {
            self.normalizer.set_window(CaptureWindow::new(window_start, window_end));
            self.normalizer.set_resolver(resolver);
        }
        self.drain(logger)
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    fn resource_infos(&self) -> Vec<ResourceInfo> {
        self.normalizer
            .queues()
            .queues()
            .iter()
            .zip(0u32..)
            .map(|(queue, ordinal)| ResourceInfo {
                device: queue.device,
                id: QueueIndex(ordinal),
                sort_index: ordinal,
                name: format!("XPU queue {ordinal}"),
            })
            .collect()
    }

    fn take_trace_buffer(&mut self) -> TraceBuffer {
        std::mem::take(&mut self.buffer)
    }

    fn errors(&self) -> &[RecordError] {
        self.normalizer.errors()
    }

    fn push_correlation_id(&self, id: u64) {
        self.correlation(CorrelationFlow::Default, Some(id));
    }

    fn pop_correlation_id(&self) {
        self.correlation(CorrelationFlow::Default, None);
    }

    fn push_user_correlation_id(&self, id: u64) {
        self.correlation(CorrelationFlow::User, Some(id));
    }

    fn pop_user_correlation_id(&self) {
        self.correlation(CorrelationFlow::User, None);
    }
}

impl Drop for XpuSession {
    fn drop(&mut self) {
        self.context.backend().clear_activities();
        self.normalizer.clear();
    }
}

impl fmt::Debug for XpuSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XpuSession")
            .field("state", &self.state)
            .field("requested", &self.requested)
            .field("profiler_start", &self.profiler_start)
            .field("profiler_end", &self.profiler_end)
            .finish_non_exhaustive()
    }
}
