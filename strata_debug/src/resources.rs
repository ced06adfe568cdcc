// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON graphics-resource tracer.
//!
//! [`JsonResourceTracer`] walks [`Trackable`] objects and records what they
//! hold. Each traced root becomes one entry of `tracings`; trackable members
//! nest under `members`:
//!
//! ```json
//! {
//!   "type": "graphics-resources",
//!   "tracer": "aggregator",
//!   "tracings": [
//!     {
//!       "annotation": "ContentAggregator",
//!       "objects": [],
//!       "members": [
//!         {
//!           "annotation": "LayerGenerationCache",
//!           "objects": [
//!             { "annotation": "Cache[Layer#3:0]", "type": "texture", "device": "cpu",
//!               "ownership": "shared", "id": 12, "size": 160000 }
//!           ],
//!           "members": []
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::io::{self, Write};

use serde::Serialize;
use strata_core::trace::{ResourceTracer, Trackable, TracedResource};

/// Value of the document's `type` field.
pub const DOCUMENT_TYPE: &str = "graphics-resources";

#[derive(Clone, Debug, Serialize)]
struct TracedObject {
    annotation: String,
    #[serde(rename = "type")]
    kind: &'static str,
    device: &'static str,
    ownership: &'static str,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
}

#[derive(Clone, Debug, Default, Serialize)]
struct Tracing {
    annotation: String,
    objects: Vec<TracedObject>,
    members: Vec<Self>,
}

impl Tracing {
    fn new(annotation: &str) -> Self {
        Self {
            annotation: annotation.to_owned(),
            ..Self::default()
        }
    }

    fn object_count(&self) -> usize {
        self.objects.len() + self.members.iter().map(Self::object_count).sum::<usize>()
    }

    fn total_size(&self) -> usize {
        self.objects.iter().filter_map(|o| o.size).sum::<usize>()
            + self.members.iter().map(Self::total_size).sum::<usize>()
    }
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    tracer: &'a str,
    tracings: &'a [Tracing],
}

/// Collects resource reports into a JSON document.
#[derive(Debug)]
pub struct JsonResourceTracer {
    name: String,
    tracings: Vec<Tracing>,
    // Open tracings, innermost last.
    stack: Vec<Tracing>,
}

impl JsonResourceTracer {
    /// Creates an empty tracer; `name` becomes the document's `tracer` field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracings: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Traces `object` as a new top-level entry.
    pub fn trace_root(&mut self, annotation: &str, object: &dyn Trackable) {
        self.stack.push(Tracing::new(annotation));
        object.trace(self);
        if let Some(tracing) = self.stack.pop() {
            self.tracings.push(tracing);
        }
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracings.len()
    }

    /// Returns `true` if nothing was traced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracings.is_empty()
    }

    /// Number of resources recorded at any depth.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.tracings.iter().map(Tracing::object_count).sum()
    }

    /// Sum of the known resource sizes, in bytes.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.tracings.iter().map(Tracing::total_size).sum()
    }

    fn document(&self) -> Document<'_> {
        Document {
            kind: DOCUMENT_TYPE,
            tracer: &self.name,
            tracings: &self.tracings,
        }
    }

    /// Builds the JSON document.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.document()).unwrap_or(serde_json::Value::Null)
    }

    /// Writes the JSON document to `writer`.
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.document())?;
        Ok(())
    }

    fn current(&mut self) -> &mut Tracing {
        if self.stack.is_empty() {
            // Reports outside trace_root land in an unnamed entry.
            self.stack.push(Tracing::default());
        }
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Closes tracings left open by reports made outside
    /// [`trace_root`](Self::trace_root).
    pub fn flush(&mut self) {
        while let Some(tracing) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.members.push(tracing),
                None => self.tracings.push(tracing),
            }
        }
    }
}

impl ResourceTracer for JsonResourceTracer {
    fn trace_resource(&mut self, resource: TracedResource<'_>) {
        self.current().objects.push(TracedObject {
            annotation: resource.annotation.to_owned(),
            kind: resource.kind.as_str(),
            device: resource.device.as_str(),
            ownership: resource.ownership.as_str(),
            id: resource.id,
            size: resource.size,
        });
    }

    fn trace_member(&mut self, annotation: &str, member: &dyn Trackable) {
        self.stack.push(Tracing::new(annotation));
        member.trace(self);
        let Some(tracing) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some(parent) => parent.members.push(tracing),
            None => self.tracings.push(tracing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::trace::{TrackableDevice, TrackableOwnership, TrackableType};

    struct Leaf(u64);

    impl Trackable for Leaf {
        fn trace(&self, tracer: &mut dyn ResourceTracer) {
            tracer.trace_resource(TracedResource {
                annotation: "pixels",
                kind: TrackableType::Texture,
                device: TrackableDevice::Cpu,
                ownership: TrackableOwnership::StrictOwned,
                id: self.0,
                size: Some(1024),
            });
        }
    }

    struct Owner;

    impl Trackable for Owner {
        fn trace(&self, tracer: &mut dyn ResourceTracer) {
            tracer.trace_resource(TracedResource {
                annotation: "fence",
                kind: TrackableType::Semaphore,
                device: TrackableDevice::Gpu,
                ownership: TrackableOwnership::Shared,
                id: 7,
                size: None,
            });
            tracer.trace_member("first", &Leaf(1));
            tracer.trace_member("second", &Leaf(2));
        }
    }

    #[test]
    fn members_nest_under_their_owner() {
        let mut tracer = JsonResourceTracer::new("test");
        tracer.trace_root("owner", &Owner);
        let json = tracer.to_json();

        assert_eq!(json["type"], DOCUMENT_TYPE);
        assert_eq!(json["tracer"], "test");
        let owner = &json["tracings"][0];
        assert_eq!(owner["annotation"], "owner");
        assert_eq!(owner["objects"][0]["type"], "semaphore");
        assert_eq!(owner["objects"][0]["device"], "gpu");
        assert!(owner["objects"][0].get("size").is_none(), "unknown size is omitted");
        let members = owner["members"].as_array().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1]["annotation"], "second");
        assert_eq!(members[1]["objects"][0]["id"], 2);
        assert_eq!(members[1]["objects"][0]["ownership"], "strict-owned");
    }

    #[test]
    fn totals_cover_every_depth() {
        let mut tracer = JsonResourceTracer::new("test");
        tracer.trace_root("owner", &Owner);
        tracer.trace_root("leaf", &Leaf(3));
        assert_eq!(tracer.len(), 2);
        assert_eq!(tracer.object_count(), 4);
        assert_eq!(tracer.total_size(), 3 * 1024);
    }

    #[test]
    fn loose_reports_are_flushed_into_an_unnamed_entry() {
        let mut tracer = JsonResourceTracer::new("test");
        Leaf(9).trace(&mut tracer);
        assert!(tracer.is_empty());
        tracer.flush();
        assert_eq!(tracer.len(), 1);
        assert_eq!(tracer.to_json()["tracings"][0]["annotation"], "");
    }

    #[test]
    fn written_document_parses_back() {
        let mut tracer = JsonResourceTracer::new("test");
        tracer.trace_root("owner", &Owner);
        let mut out = Vec::new();
        tracer.write_to(&mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, tracer.to_json());
    }
}
