//! CLI argument definitions

use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::domain::ActivityKind;

#[derive(Parser, Debug)]
#[command(
    name = "gpuscope",
    about = "Correlate recorded XPU activity buffers into a Chrome trace",
    after_help = "\
EXAMPLES:
    gpuscope --records capture.json --export trace.json
    gpuscope --records capture.json --kinds kernel,overhead --export trace.json
    gpuscope --records capture.json --window-start 1000 --window-end 5000 --export trace.json"
)]
pub struct Args {
    /// Recorded backend capture (platform list plus raw activity records)
    #[arg(long, value_name = "FILE")]
    pub records: PathBuf,

    /// Profiler configuration (JSON); defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Activity kinds to request, comma separated (default: all)
    #[arg(long, value_delimiter = ',', value_name = "KINDS")]
    pub kinds: Vec<ActivityKind>,

    /// Write the Chrome trace to this file
    #[arg(long, value_name = "FILE")]
    pub export: PathBuf,

    /// Capture window start in nanoseconds
    #[arg(long, default_value = "0", value_name = "NS")]
    pub window_start: u64,

    /// Capture window end in nanoseconds (open when omitted)
    #[arg(long, value_name = "NS")]
    pub window_end: Option<u64>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Requested kinds, every kind when none were given
    pub fn requested_kinds(&self) -> BTreeSet<ActivityKind> {
        if self.kinds.is_empty() {
            ActivityKind::ALL.into_iter().collect()
        } else {
            self.kinds.iter().copied().collect()
        }
    }
}
