// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Records the milestones of every message crossing the thread boundary.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use strata_core::time::{HostTime, now, timebase};

use crate::message::{Endpoint, Message, MessageMilestone, Milestones, Payload};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferSample {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    opcode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signal_code: Option<u32>,
    address: String,
    type_name: &'static str,
    /// Microseconds since the profiler was created.
    milestones: BTreeMap<&'static str, u64>,
}

#[derive(Serialize)]
struct TransferProfile<'a> {
    pid: u32,
    samples: &'a [TransferSample],
}

/// Message transfer profiler, enabled by
/// [`PresentOptions::profile_message_transfer`](crate::PresentOptions::profile_message_transfer).
#[derive(Debug)]
pub(crate) struct TransferProfiler {
    origin: HostTime,
    dir: PathBuf,
    samples: Mutex<Vec<TransferSample>>,
}

impl TransferProfiler {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            origin: now(),
            dir,
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Records a message the host thread just received.
    pub(crate) fn record(&self, message: &Message) {
        let (kind, opcode, signal_code) = match &message.payload {
            Payload::RemoteCall(call) => ("remote-call", Some(call.opcode), None),
            Payload::Signal(signal) => ("signal", None, Some(signal.code)),
        };
        let sample = self.sample(kind, opcode, signal_code, message.endpoint, &message.milestones);
        self.samples.lock().push(sample);
    }

    fn sample(
        &self,
        kind: &'static str,
        opcode: Option<u32>,
        signal_code: Option<u32>,
        endpoint: Endpoint,
        milestones: &Milestones,
    ) -> TransferSample {
        let milestones = MessageMilestone::ALL
            .iter()
            .filter_map(|milestone| {
                let time = milestones.get(*milestone)?;
                let nanos = time.saturating_duration_since(self.origin).to_nanos(timebase());
                Some((milestone.as_str(), nanos / 1_000))
            })
            .collect();
        TransferSample {
            kind,
            opcode,
            signal_code,
            address: format!("{:#x}", endpoint.address),
            type_name: endpoint.type_name,
            milestones,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Path the profile is written to.
    pub(crate) fn path(&self) -> PathBuf {
        profile_path(&self.dir, std::process::id())
    }

    /// Writes the recorded samples as JSON and returns the file written.
    pub(crate) fn write(&self) -> io::Result<PathBuf> {
        let path = self.path();
        let samples = self.samples.lock();
        let profile = TransferProfile {
            pid: std::process::id(),
            samples: &samples,
        };
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, &profile)?;
        writer.flush()?;
        log::info!("Wrote {} transfer samples to {}", samples.len(), path.display());
        Ok(path)
    }
}

fn profile_path(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!("transfer-profiling-{pid}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_file_is_named_after_the_pid() {
        let path = profile_path(Path::new("/tmp/profiles"), 4242);
        assert_eq!(path, Path::new("/tmp/profiles/transfer-profiling-4242.json"));
    }

    #[test]
    fn samples_serialize_with_relative_micros() {
        let profiler = TransferProfiler::new(std::env::temp_dir());
        let mut milestones = Milestones::default();
        milestones.mark(MessageMilestone::HostConstruction);
        milestones.mark(MessageMilestone::HostEnqueued);
        let endpoint = Endpoint {
            type_name: "Surface",
            address: 0x1000,
        };
        let sample = profiler.sample("remote-call", Some(5), None, endpoint, &milestones);
        let json = serde_json::to_value(&sample).unwrap();

        assert_eq!(json["type"], "remote-call");
        assert_eq!(json["opcode"], 5);
        assert!(json.get("signalCode").is_none());
        assert_eq!(json["address"], "0x1000");
        assert_eq!(json["typeName"], "Surface");
        let recorded = json["milestones"].as_object().unwrap();
        assert_eq!(recorded.len(), 2, "unreached milestones are omitted");
        assert!(recorded.contains_key("host-construction"));
        assert!(recorded.contains_key("host-enqueued"));
    }

    #[test]
    fn write_produces_a_samples_array() {
        let dir = std::env::temp_dir().join(format!("strata-transfer-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let profiler = TransferProfiler::new(dir.clone());
        let endpoint = Endpoint {
            type_name: "TaskRunner",
            address: 0x20,
        };
        let sample = profiler.sample("signal", None, Some(1), endpoint, &Milestones::default());
        profiler.samples.lock().push(sample);
        assert_eq!(profiler.len(), 1);

        let path = profiler.write().unwrap();
        let json: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(json["samples"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["samples"][0]["signalCode"], 1);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
