//! Profiler registry entry for XPU devices
//!
//! The host aggregator holds one [`ActivityProfiler`] per device family and
//! asks it for a session each time a capture is configured.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ProfilerConfig;
use crate::context::ProfilerContext;
use crate::domain::{ActivityKind, ProfilerError};
use crate::session::{ActivityProfilerSession, XpuSession};

/// Registry name of the XPU profiler
pub const XPU_PROFILER_NAME: &str = "__xpu_profiler__";

/// Kinds the XPU profiler can collect and normalize
pub const SUPPORTED_ACTIVITIES: [ActivityKind; 6] = [
    ActivityKind::MemCopy,
    ActivityKind::MemFill,
    ActivityKind::Kernel,
    ActivityKind::Runtime,
    ActivityKind::ExternalCorrelation,
    ActivityKind::Overhead,
];

/// Start/stop intent recorded by a scheduled configure, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

pub trait ActivityProfiler {
    fn name(&self) -> &str;

    /// # Errors
    /// Legacy query; implementations may refuse it
    fn available_activities(&self) -> Result<&BTreeSet<ActivityKind>, ProfilerError>;

    /// # Errors
    /// Returns an error if a kind is unsupported or the backend fails
    fn configure(
        &mut self,
        kinds: &BTreeSet<ActivityKind>,
        config: &ProfilerConfig,
    ) -> Result<Box<dyn ActivityProfilerSession>, ProfilerError>;

    /// Configure a session and remember when an external scheduler should run it
    ///
    /// # Errors
    /// Same as [`configure`](Self::configure)
    fn configure_scheduled(
        &mut self,
        start_ms: i64,
        duration_ms: i64,
        kinds: &BTreeSet<ActivityKind>,
        config: &ProfilerConfig,
    ) -> Result<Box<dyn ActivityProfilerSession>, ProfilerError>;
}

#[derive(Debug)]
pub struct XpuProfiler {
    context: Arc<ProfilerContext>,
    supported: BTreeSet<ActivityKind>,
    scheduled: Option<ScheduledWindow>,
}

impl XpuProfiler {
    pub fn new(context: Arc<ProfilerContext>) -> Self {
        Self { context, supported: SUPPORTED_ACTIVITIES.into_iter().collect(), scheduled: None }
    }

    pub fn supported_activities(&self) -> &BTreeSet<ActivityKind> {
        &self.supported
    }

    /// Last window recorded by [`ActivityProfiler::configure_scheduled`]
    pub fn scheduled_window(&self) -> Option<ScheduledWindow> {
        self.scheduled
    }

    /// Configure a session with the concrete session type
    ///
    /// # Errors
    /// Returns an error if a kind is unsupported or the backend fails
    pub fn configure_session(
        &self,
        kinds: &BTreeSet<ActivityKind>,
        config: &ProfilerConfig,
    ) -> Result<XpuSession, ProfilerError> {
        if let Some(kind) = kinds.iter().find(|kind| !self.supported.contains(kind)) {
            return Err(ProfilerError::UnsupportedKind(*kind));
        }
        XpuSession::new(Arc::clone(&self.context), kinds.clone(), config)
    }
}

impl ActivityProfiler for XpuProfiler {
    fn name(&self) -> &str {
        XPU_PROFILER_NAME
    }

    fn available_activities(&self) -> Result<&BTreeSet<ActivityKind>, ProfilerError> {
        Err(ProfilerError::Unsupported("available_activities"))
    }

    fn configure(
        &mut self,
        kinds: &BTreeSet<ActivityKind>,
        config: &ProfilerConfig,
    ) -> Result<Box<dyn ActivityProfilerSession>, ProfilerError> {
        Ok(Box::new(self.configure_session(kinds, config)?))
    }

    fn configure_scheduled(
        &mut self,
        start_ms: i64,
        duration_ms: i64,
        kinds: &BTreeSet<ActivityKind>,
        config: &ProfilerConfig,
    ) -> Result<Box<dyn ActivityProfilerSession>, ProfilerError> {
        self.scheduled = Some(ScheduledWindow {
            start_ms,
            end_ms: start_ms.saturating_add(duration_ms),
        });
        self.configure(kinds, config)
    }
}
