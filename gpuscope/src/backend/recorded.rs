//! In-memory backend replaying recorded activity buffers
//!
//! Behaves like a live tracing backend from the engine's point of view:
//! - correlation ids pushed by the host are tracked per flow, and every runtime
//!   record emitted while a stack is non-empty is preceded by an
//!   `ExternalCorrelation` record carrying the top of that stack
//! - the activity buffer is handed out once and then starts empty
//! - enable/disable calls and the buffer limit are remembered for inspection

use anyhow::{Context, Result};
use gpuscope_common::{CorrelationFlow, ExternalCorrelationRecord, Platform, RawRecord};
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ActivityBackend;
use crate::domain::{ActivityKind, BackendError};

/// On-disk format of a recorded backend capture
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordedTrace {
    /// Platform list the devices are enumerated from
    #[serde(default)]
    pub platforms: Vec<Platform>,

    /// Activity buffer, in backend arrival order
    pub records: Vec<RawRecord>,
}

impl RecordedTrace {
    /// Parse a recorded capture from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not match the format
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recorded trace {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse recorded trace {}", path.display()))
    }
}

#[derive(Debug, Default)]
struct State {
    platforms: Vec<Platform>,
    buffer: Vec<RawRecord>,
    stacks: HashMap<CorrelationFlow, Vec<u64>>,
    enabled: BTreeSet<ActivityKind>,
    max_buffer_size: Option<usize>,
    platform_queries: usize,
    fail_enable: bool,
}

#[derive(Debug, Default)]
pub struct RecordedBackend {
    state: Mutex<State>,
}

impl RecordedBackend {
    pub fn new(platforms: Vec<Platform>) -> Self {
        Self { state: Mutex::new(State { platforms, ..State::default() }) }
    }

    /// Build a backend whose buffer already holds a recorded capture, verbatim
    pub fn from_trace(trace: RecordedTrace) -> Self {
        let backend = Self::new(trace.platforms);
        backend.lock().buffer = trace.records;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record as the live backend would
    pub fn emit(&self, record: RawRecord) {
        let mut state = self.lock();
        if let RawRecord::Runtime(ref runtime) = record {
            for flow in [CorrelationFlow::Default, CorrelationFlow::User] {
                let top = state.stacks.get(&flow).and_then(|stack| stack.last()).copied();
                if let Some(external_id) = top {
                    state.buffer.push(RawRecord::ExternalCorrelation(ExternalCorrelationRecord {
                        flow,
                        correlation_id: runtime.correlation_id,
                        external_id,
                    }));
                }
            }
        }
        state.buffer.push(record);
    }

    /// Make the next `enable` call fail
    pub fn fail_next_enable(&self) {
        self.lock().fail_enable = true;
    }

    pub fn enabled_kinds(&self) -> BTreeSet<ActivityKind> {
        self.lock().enabled.clone()
    }

    pub fn max_buffer_size(&self) -> Option<usize> {
        self.lock().max_buffer_size
    }

    /// How many times the platform list was queried
    pub fn platform_queries(&self) -> usize {
        self.lock().platform_queries
    }

    /// Number of records buffered and not yet drained
    pub fn pending_records(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Current top of a correlation stack
    pub fn current_correlation(&self, flow: CorrelationFlow) -> Option<u64> {
        self.lock().stacks.get(&flow).and_then(|stack| stack.last()).copied()
    }
}

impl ActivityBackend for RecordedBackend {
    fn set_max_buffer_size(&self, bytes: usize) -> Result<(), BackendError> {
        if bytes == 0 {
            return Err(BackendError::BufferSize(bytes));
        }
        self.lock().max_buffer_size = Some(bytes);
        Ok(())
    }

    fn enable(&self, kinds: &BTreeSet<ActivityKind>) -> Result<(), BackendError> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_enable) {
            let kind = kinds.iter().next().copied().unwrap_or(ActivityKind::Kernel);
            return Err(BackendError::Enable(kind));
        }
        state.enabled.extend(kinds.iter().copied());
        Ok(())
    }

    fn disable(&self, kinds: &BTreeSet<ActivityKind>) {
        let mut state = self.lock();
        state.enabled.retain(|kind| !kinds.contains(kind));
    }

    fn activity_buffer(&self) -> Option<Vec<RawRecord>> {
        let mut state = self.lock();
        if state.buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut state.buffer))
    }

    fn push_correlation_id(&self, id: u64, flow: CorrelationFlow) {
        self.lock().stacks.entry(flow).or_default().push(id);
    }

    fn pop_correlation_id(&self, flow: CorrelationFlow) {
        let popped = self.lock().stacks.get_mut(&flow).and_then(Vec::pop);
        if popped.is_none() {
            debug!("pop on empty {flow:?} correlation stack");
        }
    }

    fn clear_activities(&self) {
        self.lock().buffer.clear();
    }

    fn platforms(&self) -> Vec<Platform> {
        let mut state = self.lock();
        state.platform_queries += 1;
        state.platforms.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuscope_common::RuntimeRecord;

    fn runtime(correlation_id: u64) -> RawRecord {
        RawRecord::Runtime(RuntimeRecord {
            name: "zeCommandListAppendLaunchKernel".to_string(),
            start_ns: 10,
            end_ns: 20,
            correlation_id,
            pid: 1,
            tid: 1,
        })
    }

    #[test]
    fn test_emit_prepends_external_correlation() {
        let backend = RecordedBackend::default();
        backend.push_correlation_id(42, CorrelationFlow::Default);
        backend.push_correlation_id(99, CorrelationFlow::User);
        backend.emit(runtime(7));

        let buffer = backend.activity_buffer().unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(
            buffer[0],
            RawRecord::ExternalCorrelation(ExternalCorrelationRecord {
                flow: CorrelationFlow::Default,
                correlation_id: 7,
                external_id: 42,
            })
        );
        assert_eq!(
            buffer[1],
            RawRecord::ExternalCorrelation(ExternalCorrelationRecord {
                flow: CorrelationFlow::User,
                correlation_id: 7,
                external_id: 99,
            })
        );
    }

    #[test]
    fn test_correlation_stack_nesting() {
        let backend = RecordedBackend::default();
        backend.push_correlation_id(1, CorrelationFlow::Default);
        backend.push_correlation_id(2, CorrelationFlow::Default);
        assert_eq!(backend.current_correlation(CorrelationFlow::Default), Some(2));
        backend.pop_correlation_id(CorrelationFlow::Default);
        assert_eq!(backend.current_correlation(CorrelationFlow::Default), Some(1));
        backend.pop_correlation_id(CorrelationFlow::Default);
        backend.pop_correlation_id(CorrelationFlow::Default);
        assert_eq!(backend.current_correlation(CorrelationFlow::Default), None);
    }

    #[test]
    fn test_buffer_is_handed_out_once() {
        let backend = RecordedBackend::default();
        backend.emit(runtime(1));
        assert!(backend.activity_buffer().is_some());
        assert!(backend.activity_buffer().is_none());
    }

    #[test]
    fn test_enable_disable() {
        let backend = RecordedBackend::default();
        let kinds = BTreeSet::from([ActivityKind::Kernel, ActivityKind::Overhead]);
        backend.enable(&kinds).unwrap();
        assert_eq!(backend.enabled_kinds(), kinds);
        backend.disable(&BTreeSet::from([ActivityKind::Kernel]));
        assert_eq!(backend.enabled_kinds(), BTreeSet::from([ActivityKind::Overhead]));
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let backend = RecordedBackend::default();
        assert_eq!(backend.set_max_buffer_size(0), Err(BackendError::BufferSize(0)));
        assert_eq!(backend.max_buffer_size(), None);
    }

    #[test]
    fn test_recorded_trace_parse() {
        let json = r#"{
            "platforms": [{"kind": "level_zero", "devices": [{"name": "gpu0", "is_gpu": true}]}],
            "records": [
                {"kind": "overhead", "overhead_kind": "buffer_flush", "start_ns": 1, "end_ns": 2, "count": 1}
            ]
        }"#;
        let trace: RecordedTrace = serde_json::from_str(json).unwrap();
        assert_eq!(trace.platforms.len(), 1);
        assert_eq!(trace.platforms[0].devices[0].uuid, None);
        assert_eq!(trace.records.len(), 1);
    }
}
