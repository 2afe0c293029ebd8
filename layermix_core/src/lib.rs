// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layered compositing of asynchronously produced frames.
//!
//! `layermix_core` composes an ordered list of layers into one output
//! surface with the painter's algorithm. Some layers show static images;
//! others show frames that an external producer (an offscreen browser
//! view, say) paints on its own thread, either as CPU pixel buffers or as
//! shared GPU textures. The crate is backend-agnostic: drawing goes through
//! the [`Backend`](gpu::Backend) trait, implemented for real GPUs by
//! `layermix_backend_wgpu` and in software by [`headless`].
//!
//! # Architecture
//!
//! ```text
//!   producer thread                        render thread
//!   ───────────────                        ─────────────
//!   paint ──► RenderHandler ──► FrameBuffer        RenderLoop
//!                  │                ▲                  │
//!                  │ FrameRequester │ swap             ▼
//!                  └───────────────►│◄──── Composition::tick / render
//!                                   │             │
//!                               Layer::render ◄───┘  (bottom to top)
//!                                                 │
//!                                                 ▼
//!                                  SwapChain::present ──► PublishSink
//! ```
//!
//! **[`frame_buffer`]**: Latest-frame staging between a producer and the
//! render thread. CPU frames are double-buffered and uploaded once per new
//! frame; shared textures are opened on arrival.
//!
//! **[`layer`]**: The [`Layer`](layer::Layer) trait with image, source and
//! popup layers. Placement is normalized to the composition.
//!
//! **[`composition`]**: The ordered layer list, hit-testing, input routing
//! and frame-rate measurement.
//!
//! **[`handler`]**: The producer-facing [`RenderHandler`](handler::RenderHandler)
//! and the threaded [`RenderLoop`](handler::RenderLoop).
//!
//! **[`scene`]**: Building a composition from a declarative description.
//!
//! **[`gpu`]**: The backend contract: textures, quads, effects, swap chains.
//!
//! **[`snapshot`]**: Copy-on-read lists that let render passes run without
//! holding locks.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod composition;
pub mod frame_buffer;
pub mod geometry;
pub mod gpu;
pub mod handler;
pub mod headless;
pub mod layer;
pub mod scene;
pub mod snapshot;
pub mod stats;
pub mod time;
