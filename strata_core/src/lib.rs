// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer tree, canvas abstraction and frame caches for the Strata compositor.
//!
//! `strata_core` holds everything the present thread needs to turn a layer
//! tree into pixels, independent of threads and GPU APIs.
//!
//! # Architecture
//!
//! ```text
//!   LayerTree ──► Layer::preroll() ──► paint bounds + cull rect
//!                                            │
//!                 ┌──────────────────────────┘
//!                 ▼
//!   Layer::paint(PaintContext) ──► MultiplexerCanvas ──┬─► RasterCanvas (frame)
//!        │            ▲                                ├─► observers
//!        ▼            │                                └─► PictureRecorder (capture)
//!   LayerGenerationCache / RasterCache
//! ```
//!
//! **[`layer`]**: Layer taxonomy as a sum type with tag-dispatched preroll
//! and paint kernels. Setters bump a per-layer generation counter.
//!
//! **[`canvas`]**: The [`Canvas`](canvas::Canvas) trait and its
//! implementations: a tiny-skia raster canvas, a display-list recorder
//! producing [`Picture`](canvas::Picture)s, an N-way multiplexer and a
//! counting canvas for tests.
//!
//! **[`cache`]**: Generation-driven layer snapshots and the use-count driven
//! picture raster cache.
//!
//! **[`texture`]**: Texture manager shared between the host and the present
//! thread.
//!
//! **[`profiler`]**: Ring buffer of per-frame milestone timestamps.
//!
//! **[`trace`]**: Resource tracing interface for memory diagnostics.
//!
//! **[`time`]**: Monotonic host time.

pub mod cache;
pub mod canvas;
pub mod damage;
pub mod filter;
pub mod geometry;
pub mod image;
pub mod layer;
pub mod paint;
pub mod profiler;
pub mod resource;
pub mod texture;
pub mod time;
pub mod trace;
