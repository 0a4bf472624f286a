use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{ExportError, Timestamp};
use crate::trace::{ActivityDetails, ActivityLogger, NormalizedActivity, Placement, TraceSpan};

/// Category of flow arrows from a runtime call to the device work it issued
const FLOW_CATEGORY: &str = "ac2g";

/// Track holding the trace span and profiler overhead
const PROFILER_TRACK: (u32, u32) = (u32::MAX, 0);
const PROFILER_TRACK_NAME: &str = "Profiler";

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    name: String,
    /// Category for filtering/coloring (the activity kind)
    cat: String,
    /// Phase: "X" = complete, "s"/"f" = flow start/finish, "M" = metadata
    ph: String,
    /// Timestamp in microseconds, relative to the span start
    ts: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    pid: u32,
    tid: u32,
    /// Flow id
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    /// Flow binding point
    #[serde(skip_serializing_if = "Option::is_none")]
    bp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Chrome trace exporter for timeline visualization
///
/// Device activities land on `pid = device index`, `tid = queue index`;
/// runtime calls on their host thread; the span and overhead on a dedicated
/// profiler track.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    /// Track names keyed by (pid, tid), sorted for stable output
    tracks: BTreeMap<(u32, u32), String>,
    span: Option<TraceSpan>,
}

impl ChromeTraceExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events collected so far, metadata excluded
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn relative_us(&self, ts: Timestamp) -> f64 {
        let base = self.span.as_ref().map_or(Timestamp(0), |span| span.start);
        Timestamp(ts.0.saturating_sub(base.0)).as_micros()
    }

    fn track(&mut self, placement: Placement) -> (u32, u32) {
        let (key, name) = match placement {
            Placement::Host { pid, tid } => ((pid.0, tid.0), format!("Thread {}", tid.0)),
            Placement::Device { device, queue } => (
                (u32::from(device.0), queue.0),
                format!("XPU {} queue {}", device.0, queue.0),
            ),
            Placement::Unplaced => (PROFILER_TRACK, PROFILER_TRACK_NAME.to_string()),
        };
        self.tracks.entry(key).or_insert(name);
        key
    }

    fn flow(
        &mut self,
        runtime: &NormalizedActivity,
        device_start: Timestamp,
        device_track: (u32, u32),
        id: u64,
    ) {
        let runtime_track = self.track(runtime.placement);
        let start_ts = self.relative_us(runtime.start);
        let finish_ts = self.relative_us(device_start);

        self.events.push(ChromeTraceEvent {
            name: FLOW_CATEGORY.to_string(),
            cat: FLOW_CATEGORY.to_string(),
            ph: "s".to_string(),
            ts: start_ts,
            dur: None,
            pid: runtime_track.0,
            tid: runtime_track.1,
            id: Some(id),
            bp: None,
            args: None,
        });
        self.events.push(ChromeTraceEvent {
            name: FLOW_CATEGORY.to_string(),
            cat: FLOW_CATEGORY.to_string(),
            ph: "f".to_string(),
            ts: finish_ts,
            dur: None,
            pid: device_track.0,
            tid: device_track.1,
            id: Some(id),
            bp: Some("e".to_string()),
            args: None,
        });
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut all_events = Vec::with_capacity(self.events.len() + self.tracks.len() + 1);

        if let Some(span) = &self.span {
            let mut args = HashMap::new();
            args.insert("iteration".to_string(), serde_json::json!(span.iteration));
            all_events.push(ChromeTraceEvent {
                name: span.name.clone(),
                cat: "trace_span".to_string(),
                ph: "X".to_string(),
                ts: 0.0,
                dur: span.end.map(|end| self.relative_us(end)),
                pid: PROFILER_TRACK.0,
                tid: PROFILER_TRACK.1,
                id: None,
                bp: None,
                args: Some(args),
            });
        }

        all_events.extend(self.events.iter().cloned());

        for ((pid, tid), name) in &self.tracks {
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(name));

            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                dur: None,
                pid: *pid,
                tid: *tid,
                id: None,
                bp: None,
                args: Some(args),
            });
        }

        let trace = ChromeTrace { trace_events: all_events, display_time_unit: "ms".to_string() };

        let mut writer = writer;
        serde_json::to_writer_pretty(&mut writer, &trace)?;
        writer.flush()?;
        Ok(())
    }

    /// Export to a newly created file
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let file = File::create(path)?;
        self.export(BufWriter::new(file))
    }
}

impl ActivityLogger for ChromeTraceExporter {
    fn handle_span(&mut self, span: &TraceSpan) {
        self.tracks.entry(PROFILER_TRACK).or_insert_with(|| PROFILER_TRACK_NAME.to_string());
        self.span = Some(span.clone());
    }

    fn handle_activity(&mut self, activity: &NormalizedActivity) {
        let (pid, tid) = self.track(activity.placement);

        let mut args = HashMap::new();
        if let Some(correlation_id) = activity.correlation_id {
            args.insert("correlation".to_string(), serde_json::json!(correlation_id.0));
        }
        if let Some(external_id) = activity.external_id {
            args.insert("external id".to_string(), serde_json::json!(external_id.0));
        }
        if let Some(user_id) = activity.user_id {
            args.insert("user id".to_string(), serde_json::json!(user_id.0));
        }
        if let Some(host) = &activity.host_activity {
            args.insert("host activity".to_string(), serde_json::json!(host.name));
        }
        match &activity.details {
            ActivityDetails::Runtime | ActivityDetails::Kernel => {}
            ActivityDetails::MemCopy { copy_kind, bytes, peer } => {
                args.insert("kind".to_string(), serde_json::json!(copy_kind.label()));
                args.insert("bytes".to_string(), serde_json::json!(bytes));
                if let Some(peer) = peer {
                    args.insert("peer device".to_string(), serde_json::json!(peer.0));
                }
            }
            ActivityDetails::MemFill { bytes, value } => {
                args.insert("bytes".to_string(), serde_json::json!(bytes));
                args.insert("value".to_string(), serde_json::json!(value));
            }
            ActivityDetails::Overhead { count } => {
                args.insert("count".to_string(), serde_json::json!(count));
            }
        }

        self.events.push(ChromeTraceEvent {
            name: activity.name.clone(),
            cat: activity.kind.as_str().to_string(),
            ph: "X".to_string(),
            ts: self.relative_us(activity.start),
            dur: Some(Timestamp(activity.duration_ns()).as_micros()),
            pid,
            tid,
            id: None,
            bp: None,
            args: (!args.is_empty()).then_some(args),
        });

        if let (Some(runtime), Some(correlation_id)) = (&activity.linked, activity.correlation_id) {
            self.flow(runtime, activity.start, (pid, tid), correlation_id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityKind, CorrelationId, DeviceIndex, Pid, QueueIndex, Tid};
    use std::sync::Arc;

    fn runtime() -> Arc<NormalizedActivity> {
        Arc::new(NormalizedActivity {
            kind: ActivityKind::Runtime,
            name: "zeCommandListAppendLaunchKernel".to_string(),
            placement: Placement::Host { pid: Pid(10), tid: Tid(11) },
            start: Timestamp(1_100),
            end: Timestamp(1_110),
            correlation_id: Some(CorrelationId(7)),
            external_id: None,
            user_id: None,
            linked: None,
            host_activity: None,
            details: ActivityDetails::Runtime,
        })
    }

    fn kernel(linked: Option<Arc<NormalizedActivity>>) -> NormalizedActivity {
        NormalizedActivity {
            kind: ActivityKind::Kernel,
            name: "gemm".to_string(),
            placement: Placement::Device { device: DeviceIndex(1), queue: QueueIndex(2) },
            start: Timestamp(1_120),
            end: Timestamp(3_120),
            correlation_id: Some(CorrelationId(7)),
            external_id: None,
            user_id: None,
            linked,
            host_activity: None,
            details: ActivityDetails::Kernel,
        }
    }

    fn exported(exporter: &ChromeTraceExporter) -> JsonValue {
        let mut buffer = Vec::new();
        exporter.export(&mut buffer).unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    #[test]
    fn test_complete_event_is_relative_to_span() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.handle_span(&TraceSpan {
            start: Timestamp(1_000),
            end: Some(Timestamp(5_000)),
            name: "__xpu_profiler__".to_string(),
            iteration: 3,
        });
        exporter.handle_activity(&kernel(None));

        let json = exported(&exporter);
        let events = json["traceEvents"].as_array().unwrap();
        let span = &events[0];
        assert_eq!(span["name"], "__xpu_profiler__");
        assert_eq!(span["dur"], 4.0);
        assert_eq!(span["args"]["iteration"], 3);

        let kernel = &events[1];
        assert_eq!(kernel["ph"], "X");
        assert_eq!(kernel["cat"], "kernel");
        assert_eq!(kernel["ts"], 0.12);
        assert_eq!(kernel["dur"], 2.0);
        assert_eq!(kernel["pid"], 1);
        assert_eq!(kernel["tid"], 2);
        assert_eq!(json["displayTimeUnit"], "ms");
    }

    #[test]
    fn test_linked_activity_emits_flow() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.handle_activity(&kernel(Some(runtime())));
        assert_eq!(exporter.event_count(), 3);

        let json = exported(&exporter);
        let events = json["traceEvents"].as_array().unwrap();
        let phases: Vec<_> = events.iter().map(|e| e["ph"].as_str().unwrap()).collect();
        assert_eq!(&phases[..3], &["X", "s", "f"]);
        assert_eq!(events[1]["pid"], 10);
        assert_eq!(events[1]["id"], 7);
        assert_eq!(events[2]["bp"], "e");
    }

    #[test]
    fn test_thread_names_per_track() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.handle_activity(&kernel(Some(runtime())));

        let json = exported(&exporter);
        let names: Vec<_> = json["traceEvents"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["ph"] == "M")
            .map(|e| e["args"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["XPU 1 queue 2".to_string(), "Thread 11".to_string()]);
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let mut exporter = ChromeTraceExporter::new();
        exporter.handle_activity(&kernel(None));
        exporter.export_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("traceEvents"));
    }
}
