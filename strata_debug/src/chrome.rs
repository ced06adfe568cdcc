// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] writes a [`FrameReport`] as [Chrome Trace Event Format][spec]
//! JSON. Each frame becomes a `Frame` span with nested `Preroll` and `Paint`
//! spans, plus instant events for `Requested` and `Presented`.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use strata_core::profiler::{FrameMilestone, FrameReport, FrameReportEntry};
use strata_core::time::{HostTime, Timebase};

/// Exports `report` as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Timestamps are microseconds since the profiler was created.
pub fn export(report: &FrameReport, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    for entry in &report.entries {
        frame_events(entry, report.origin, report.timebase, &mut events);
    }
    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

const SPANS: [(&str, FrameMilestone, FrameMilestone); 2] = [
    ("Preroll", FrameMilestone::PrerollBegin, FrameMilestone::PrerollEnd),
    ("Paint", FrameMilestone::PaintBegin, FrameMilestone::PaintEnd),
];

const INSTANTS: [(&str, FrameMilestone); 2] = [
    ("Requested", FrameMilestone::Requested),
    ("Presented", FrameMilestone::Presented),
];

fn frame_events(entry: &FrameReportEntry, origin: HostTime, timebase: Timebase, events: &mut Vec<Value>) {
    let ts = |t: HostTime| t.micros_since(origin, timebase);
    let frame = entry.milestone(FrameMilestone::Begin).zip(entry.milestone(FrameMilestone::End));

    if let Some((begin, _)) = frame {
        events.push(json!({
            "ph": "B",
            "name": "Frame",
            "cat": "Frame",
            "ts": ts(begin),
            "pid": 0,
            "tid": 0,
            "args": { "frame": entry.frame },
        }));
    }
    for (name, begin, end) in SPANS {
        let Some((begin, end)) = entry.milestone(begin).zip(entry.milestone(end)) else {
            continue;
        };
        for (ph, t) in [("B", begin), ("E", end)] {
            events.push(json!({
                "ph": ph,
                "name": name,
                "cat": "Frame",
                "ts": ts(t),
                "pid": 0,
                "tid": 0,
                "args": { "frame": entry.frame },
            }));
        }
    }
    for (name, milestone) in INSTANTS {
        let Some(t) = entry.milestone(milestone) else {
            continue;
        };
        events.push(json!({
            "ph": "i",
            "name": name,
            "cat": "Present",
            "ts": ts(t),
            "pid": 0,
            "tid": 0,
            "s": "t",
            "args": { "frame": entry.frame },
        }));
    }
    if let Some((_, end)) = frame {
        events.push(json!({
            "ph": "E",
            "name": "Frame",
            "cat": "Frame",
            "ts": ts(end),
            "pid": 0,
            "tid": 0,
            "args": { "frame": entry.frame },
        }));
    }
}
