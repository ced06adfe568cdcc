// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable frame profiler output.
//!
//! [`PrettyPrinter`] writes one line per frame of a [`FrameReport`] to a
//! [`Write`](std::io::Write) destination (default: stderr), followed by a
//! summary line.

use std::io::{self, Write};

use strata_core::profiler::{FrameMilestone, FrameReport, FrameReportEntry};
use strata_core::time::Timebase;

/// Writes human-readable frame lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrinter<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrinter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrinter").finish_non_exhaustive()
    }
}

impl PrettyPrinter {
    /// Creates a printer that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(io::stderr()),
        }
    }

    /// Creates a printer that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrinter<W> {
    /// Creates a printer that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Writes every frame of `report` and a summary line.
    pub fn print_report(&mut self, report: &FrameReport) -> io::Result<()> {
        let mut paint_total = 0.0;
        let mut painted = 0_u32;
        for entry in &report.entries {
            self.print_frame(entry, report.timebase)?;
            if let Some(paint) = span_us(entry, FrameMilestone::PaintBegin, FrameMilestone::PaintEnd, report.timebase) {
                paint_total += paint;
                painted += 1;
            }
        }
        let average = if painted == 0 {
            0.0
        } else {
            paint_total / f64::from(painted)
        };
        writeln!(
            self.writer,
            "[summary] frames={} avg-paint={average:.1}µs",
            report.entries.len(),
        )
    }

    fn print_frame(&mut self, entry: &FrameReportEntry, timebase: Timebase) -> io::Result<()> {
        let span = |begin, end| match span_us(entry, begin, end, timebase) {
            Some(us) => format!("{us:.1}µs"),
            None => "?".to_owned(),
        };
        writeln!(
            self.writer,
            "[frame] #{} preroll={} paint={} present-latency={} total={}",
            entry.frame,
            span(FrameMilestone::PrerollBegin, FrameMilestone::PrerollEnd),
            span(FrameMilestone::PaintBegin, FrameMilestone::PaintEnd),
            span(FrameMilestone::Requested, FrameMilestone::Presented),
            span(FrameMilestone::Begin, FrameMilestone::End),
        )
    }

    /// Writes cache statistics lines, as produced by the content
    /// aggregator's `cache_stats`.
    pub fn print_cache_stats(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            writeln!(self.writer, "[cache] {line}")?;
        }
        Ok(())
    }
}

fn span_us(
    entry: &FrameReportEntry,
    begin: FrameMilestone,
    end: FrameMilestone,
    timebase: Timebase,
) -> Option<f64> {
    let (begin, end) = entry.milestone(begin).zip(entry.milestone(end))?;
    Some(end.micros_since(begin, timebase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::time::HostTime;

    fn entry(frame: u64) -> FrameReportEntry {
        let mut milestones = [HostTime::ZERO; FrameMilestone::COUNT];
        let marks = [
            (FrameMilestone::Begin, 1_000),
            (FrameMilestone::PaintBegin, 2_000),
            (FrameMilestone::PaintEnd, 4_500),
            (FrameMilestone::End, 9_000),
        ];
        for (milestone, t) in marks {
            let index = FrameMilestone::ALL
                .iter()
                .position(|m| *m == milestone)
                .unwrap();
            milestones[index] = HostTime(t);
        }
        FrameReportEntry { frame, milestones }
    }

    #[test]
    fn frame_lines_and_summary() {
        let report = FrameReport {
            timebase: Timebase::NANOS,
            origin: HostTime::ZERO,
            entries: vec![entry(1), entry(2)],
        };
        let mut printer = PrettyPrinter::with_writer(Vec::<u8>::new());
        printer.print_report(&report).unwrap();
        let output = String::from_utf8(printer.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3, "got: {output}");
        assert!(lines[0].starts_with("[frame] #1"), "got: {output}");
        assert!(lines[0].contains("paint=2.5µs"), "got: {output}");
        assert!(lines[0].contains("preroll=?"), "got: {output}");
        assert!(lines[0].contains("total=8.0µs"), "got: {output}");
        assert_eq!(lines[2], "[summary] frames=2 avg-paint=2.5µs");
    }

    #[test]
    fn cache_lines_are_prefixed() {
        let mut printer = PrettyPrinter::with_writer(Vec::<u8>::new());
        printer
            .print_cache_stats(&["Layer #1:0".to_owned()])
            .unwrap();
        let output = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(output, "[cache] Layer #1:0\n");
    }
}
