// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame milestone profiling.
//!
//! [`FrameProfiler`] keeps the most recent frames in a ring of samples. Each
//! sample stores one [`HostTime`] per [`FrameMilestone`]. The ring is a
//! doubly linked list threaded through an arena, with a sentinel at index 0;
//! retired samples stay in the arena and are reused by later frames.
//!
//! The present thread is the only writer. Reports are built under the same
//! lock and are plain owned values.

use parking_lot::Mutex;

use crate::time::{self, HostTime, Timebase};

/// Default number of frames kept in the ring.
pub const DEFAULT_THRESHOLD: usize = 32;

/// Largest accepted ring threshold.
pub const MAX_THRESHOLD: usize = 4096;

/// Named points in a frame's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameMilestone {
    /// The next surface frame was requested.
    Requested,
    /// The frame was presented.
    Presented,
    /// Preroll started.
    PrerollBegin,
    /// Preroll finished.
    PrerollEnd,
    /// Paint started.
    PaintBegin,
    /// Paint finished.
    PaintEnd,
    /// The frame began.
    Begin,
    /// The frame ended.
    End,
}

impl FrameMilestone {
    /// Number of milestones.
    pub const COUNT: usize = 8;

    /// All milestones in storage order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Requested,
        Self::Presented,
        Self::PrerollBegin,
        Self::PrerollEnd,
        Self::PaintBegin,
        Self::PaintEnd,
        Self::Begin,
        Self::End,
    ];

    /// Stable name used in exported reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Presented => "presented",
            Self::PrerollBegin => "preroll-begin",
            Self::PrerollEnd => "preroll-end",
            Self::PaintBegin => "paint-begin",
            Self::PaintEnd => "paint-end",
            Self::Begin => "begin",
            Self::End => "end",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Milestones of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReportEntry {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Timestamps indexed like [`FrameMilestone::ALL`]; unmarked milestones
    /// are [`HostTime::ZERO`].
    pub milestones: [HostTime; FrameMilestone::COUNT],
}

impl FrameReportEntry {
    /// Timestamp of `milestone`, or `None` if it was never marked.
    #[must_use]
    pub fn milestone(&self, milestone: FrameMilestone) -> Option<HostTime> {
        let t = self.milestones[milestone.index()];
        (!t.is_zero()).then_some(t)
    }
}

/// Snapshot of the completed frames in the ring, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Converts timestamps to nanoseconds.
    pub timebase: Timebase,
    /// When the profiler was created.
    pub origin: HostTime,
    /// Completed frames.
    pub entries: Vec<FrameReportEntry>,
}

const SENTINEL: usize = 0;

#[derive(Clone, Copy, Debug)]
struct Sample {
    alive: bool,
    pending: bool,
    frame: u64,
    timestamps: [HostTime; FrameMilestone::COUNT],
    prev: usize,
    next: usize,
}

impl Sample {
    const fn sentinel() -> Self {
        Self {
            alive: true,
            pending: false,
            frame: 0,
            timestamps: [HostTime::ZERO; FrameMilestone::COUNT],
            prev: SENTINEL,
            next: SENTINEL,
        }
    }
}

#[derive(Debug)]
struct Ring {
    samples: Vec<Sample>,
    threshold: usize,
    frame_counter: u64,
    current: Option<usize>,
}

impl Ring {
    fn pop_first(&mut self) {
        let first = self.samples[SENTINEL].next;
        if first == SENTINEL {
            return;
        }
        let next = self.samples[first].next;
        self.samples[first].alive = false;
        self.samples[next].prev = SENTINEL;
        self.samples[SENTINEL].next = next;
    }

    fn create_sample(&mut self) -> usize {
        if self.samples.len() > self.threshold {
            self.pop_first();
        }
        let index = match self.samples.iter().position(|s| !s.alive) {
            Some(index) => index,
            None => {
                self.samples.push(Sample::sentinel());
                self.samples.len() - 1
            }
        };

        let tail = self.samples[SENTINEL].prev;
        let frame = self.frame_counter;
        self.frame_counter += 1;
        self.samples[index] = Sample {
            alive: true,
            pending: true,
            frame,
            timestamps: [HostTime::ZERO; FrameMilestone::COUNT],
            prev: tail,
            next: SENTINEL,
        };
        self.samples[tail].next = index;
        self.samples[SENTINEL].prev = index;
        index
    }

    fn mark(&mut self, milestone: FrameMilestone, at: HostTime) {
        match self.current {
            Some(index) => self.samples[index].timestamps[milestone.index()] = at,
            None => log::warn!("Milestone {} marked outside of a frame", milestone.as_str()),
        }
    }
}

/// Ring buffer of per-frame milestone timestamps.
#[derive(Debug)]
pub struct FrameProfiler {
    origin: HostTime,
    ring: Mutex<Ring>,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl FrameProfiler {
    /// Creates a profiler keeping up to `threshold` frames. Out-of-range
    /// thresholds fall back to [`DEFAULT_THRESHOLD`].
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        let threshold = if threshold == 0 || threshold > MAX_THRESHOLD {
            log::warn!(
                "Frame profiler threshold {threshold} is out of range, using {DEFAULT_THRESHOLD}"
            );
            DEFAULT_THRESHOLD
        } else {
            threshold
        };
        Self {
            origin: time::now(),
            ring: Mutex::new(Ring {
                samples: vec![Sample::sentinel()],
                threshold,
                frame_counter: 1,
                current: None,
            }),
        }
    }

    /// Ring threshold in use.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.ring.lock().threshold
    }

    /// Starts a new frame sample and marks [`FrameMilestone::Begin`].
    pub fn begin_frame(&self) {
        let mut ring = self.ring.lock();
        if let Some(index) = ring.current.take() {
            log::warn!("Frame {} began before the previous one ended", ring.samples[index].frame);
            ring.samples[index].pending = false;
        }
        let index = ring.create_sample();
        ring.current = Some(index);
        ring.mark(FrameMilestone::Begin, time::now());
    }

    /// Stamps `milestone` in the current frame.
    pub fn mark_milestone(&self, milestone: FrameMilestone) {
        self.ring.lock().mark(milestone, time::now());
    }

    /// Marks [`FrameMilestone::End`] and completes the current frame.
    pub fn end_frame(&self) {
        let mut ring = self.ring.lock();
        ring.mark(FrameMilestone::End, time::now());
        if let Some(index) = ring.current.take() {
            ring.samples[index].pending = false;
        }
    }

    /// Number of frames currently in the ring, including a pending one.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        let ring = self.ring.lock();
        let mut count = 0;
        let mut cursor = ring.samples[SENTINEL].next;
        while cursor != SENTINEL {
            count += 1;
            cursor = ring.samples[cursor].next;
        }
        count
    }

    /// Builds a report of the completed frames, or `None` if there are none.
    #[must_use]
    pub fn generate_report(&self) -> Option<FrameReport> {
        let ring = self.ring.lock();
        let mut last = ring.samples[SENTINEL].prev;
        while last != SENTINEL && ring.samples[last].pending {
            last = ring.samples[last].prev;
        }
        if last == SENTINEL {
            return None;
        }

        let mut entries = Vec::new();
        let mut cursor = ring.samples[SENTINEL].next;
        loop {
            let sample = &ring.samples[cursor];
            entries.push(FrameReportEntry {
                frame: sample.frame,
                milestones: sample.timestamps,
            });
            if cursor == last {
                break;
            }
            cursor = sample.next;
        }
        Some(FrameReport {
            timebase: time::timebase(),
            origin: self.origin,
            entries,
        })
    }

    /// Empties the ring. With `free_memory` the sample arena is released as
    /// well; otherwise samples are kept for reuse.
    pub fn purge_recent_history(&self, free_memory: bool) {
        let mut ring = self.ring.lock();
        ring.current = None;
        if free_memory {
            ring.samples.truncate(1);
            ring.samples.shrink_to_fit();
        } else {
            for sample in ring.samples.iter_mut().skip(1) {
                sample.alive = false;
            }
        }
        let sentinel = &mut ring.samples[SENTINEL];
        sentinel.next = SENTINEL;
        sentinel.prev = SENTINEL;
    }

    /// Number of sample slots allocated, including the sentinel.
    #[must_use]
    pub fn allocated_samples(&self) -> usize {
        self.ring.lock().samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frames(profiler: &FrameProfiler, n: usize) {
        for _ in 0..n {
            profiler.begin_frame();
            profiler.mark_milestone(FrameMilestone::PrerollBegin);
            profiler.mark_milestone(FrameMilestone::PrerollEnd);
            profiler.mark_milestone(FrameMilestone::PaintBegin);
            profiler.mark_milestone(FrameMilestone::PaintEnd);
            profiler.mark_milestone(FrameMilestone::Requested);
            profiler.mark_milestone(FrameMilestone::Presented);
            profiler.end_frame();
        }
    }

    #[test]
    fn empty_profiler_has_no_report() {
        let profiler = FrameProfiler::default();
        assert!(profiler.generate_report().is_none(), "no frames yet");
        profiler.begin_frame();
        assert!(profiler.generate_report().is_none(), "pending frames are not reported");
    }

    #[test]
    fn ring_keeps_the_most_recent_frames() {
        let profiler = FrameProfiler::new(4);
        run_frames(&profiler, 10);
        let report = profiler.generate_report().unwrap();
        let frames: Vec<u64> = report.entries.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![7, 8, 9, 10]);
        assert_eq!(profiler.allocated_samples(), 5, "samples are reused");
    }

    #[test]
    fn milestones_are_ordered() {
        let profiler = FrameProfiler::default();
        run_frames(&profiler, 1);
        let report = profiler.generate_report().unwrap();
        let entry = report.entries[0];
        let order = [
            FrameMilestone::Begin,
            FrameMilestone::PrerollBegin,
            FrameMilestone::PrerollEnd,
            FrameMilestone::PaintBegin,
            FrameMilestone::PaintEnd,
            FrameMilestone::Requested,
            FrameMilestone::Presented,
            FrameMilestone::End,
        ];
        for pair in order.windows(2) {
            let (a, b) = (entry.milestone(pair[0]).unwrap(), entry.milestone(pair[1]).unwrap());
            assert!(a <= b, "{:?} after {:?}", pair[0], pair[1]);
        }
        assert!(report.origin <= entry.milestone(FrameMilestone::Begin).unwrap());
    }

    #[test]
    fn pending_frame_is_excluded_from_report() {
        let profiler = FrameProfiler::default();
        run_frames(&profiler, 2);
        profiler.begin_frame();
        assert_eq!(profiler.sample_count(), 3);
        assert_eq!(profiler.generate_report().unwrap().entries.len(), 2);
    }

    #[test]
    fn purge_empties_the_ring() {
        let profiler = FrameProfiler::new(8);
        run_frames(&profiler, 3);
        profiler.purge_recent_history(false);
        assert!(profiler.generate_report().is_none(), "history purged");
        assert_eq!(profiler.allocated_samples(), 4, "slots kept for reuse");
        run_frames(&profiler, 1);
        assert_eq!(profiler.allocated_samples(), 4);
        assert_eq!(profiler.generate_report().unwrap().entries[0].frame, 4);
        profiler.purge_recent_history(true);
        assert_eq!(profiler.allocated_samples(), 1);
    }

    #[test]
    fn out_of_range_threshold_falls_back() {
        assert_eq!(FrameProfiler::new(MAX_THRESHOLD + 1).threshold(), DEFAULT_THRESHOLD);
        assert_eq!(FrameProfiler::new(MAX_THRESHOLD).threshold(), MAX_THRESHOLD);
    }
}
