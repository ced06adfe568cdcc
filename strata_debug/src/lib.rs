// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics output for Strata.
//!
//! - [`resources::JsonResourceTracer`]: a
//!   [`ResourceTracer`](strata_core::trace::ResourceTracer) collecting the
//!   graphics resources held by trackable objects into a JSON document.
//! - [`pretty::PrettyPrinter`]: human-readable one-line-per-frame output for
//!   [`FrameReport`](strata_core::profiler::FrameReport)s.
//! - [`chrome::export`]: writes frame reports as Chrome Trace Event Format
//!   JSON.

pub mod chrome;
pub mod pretty;
pub mod resources;
