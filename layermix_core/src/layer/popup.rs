// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Layer, LayerCore};
use crate::frame_buffer::FrameBuffer;
use crate::geometry::PixelRect;
use crate::gpu::Backend;

#[derive(Clone, Copy, Debug, Default)]
struct PopupRects {
    /// As reported; may extend past the composition.
    original: PixelRect,
    /// Shifted to lie inside the composition where possible.
    clamped: PixelRect,
}

/// A transient widget (a dropdown, say) placed in composition pixels.
///
/// The producer reports the popup's rectangle in pixels. The layer keeps
/// it inside the composition and remembers how far it had to shift it, so
/// popup-local input can be mapped back with [`xoffset`](Self::xoffset)
/// and [`yoffset`](Self::yoffset).
pub struct PopupLayer<B: Backend> {
    core: LayerCore<B>,
    frame_buffer: Arc<FrameBuffer<B>>,
    rects: Mutex<PopupRects>,
}

impl<B: Backend> PopupLayer<B> {
    /// Creates a popup drawing `frame_buffer`. Popups never take input
    /// through hit-testing; the host routes it with [`contains`](Self::contains).
    pub fn new(backend: Arc<B>, frame_buffer: Arc<FrameBuffer<B>>, flip: bool) -> Self {
        Self {
            core: LayerCore::new(backend, false, flip),
            frame_buffer,
            rects: Mutex::new(PopupRects::default()),
        }
    }

    /// The buffer the producer paints the popup into.
    pub fn frame_buffer(&self) -> &Arc<FrameBuffer<B>> {
        &self.frame_buffer
    }

    /// Places the popup at `rect` (composition pixels).
    ///
    /// The origin is moved to zero if negative, then shifted left/up so the
    /// popup ends inside the composition, then moved to zero again. A popup
    /// larger than the composition therefore sits at the origin and
    /// overhangs. Ignored while detached or while the composition has no
    /// area.
    pub fn set_bounds(&self, rect: PixelRect) {
        let Some(composition) = self.core.composition() else {
            return;
        };
        let (width, height) = (composition.width(), composition.height());
        let (Ok(outer_w), Ok(outer_h)) = (i32::try_from(width), i32::try_from(height)) else {
            return;
        };
        if outer_w == 0 || outer_h == 0 {
            return;
        }

        let mut clamped = rect;
        clamped.x = clamped.x.max(0);
        clamped.y = clamped.y.max(0);
        if clamped.x.saturating_add(clamped.width) > outer_w {
            clamped.x = outer_w.saturating_sub(clamped.width);
        }
        if clamped.y.saturating_add(clamped.height) > outer_h {
            clamped.y = outer_h.saturating_sub(clamped.height);
        }
        clamped.x = clamped.x.max(0);
        clamped.y = clamped.y.max(0);

        *self.rects.lock() = PopupRects {
            original: rect,
            clamped,
        };
        tracing::debug!(?rect, ?clamped, "popup placed");

        if let Some(bounds) = clamped.normalized(width, height) {
            self.core.move_to(bounds);
        }
    }

    /// The rectangle as last reported.
    pub fn original_bounds(&self) -> PixelRect {
        self.rects.lock().original
    }

    /// The rectangle actually displayed, in composition pixels.
    pub fn pixel_bounds(&self) -> PixelRect {
        self.rects.lock().clamped
    }

    /// Horizontal shift applied by clamping (`original.x - clamped.x`).
    pub fn xoffset(&self) -> i32 {
        let rects = self.rects.lock();
        rects.original.x.saturating_sub(rects.clamped.x)
    }

    /// Vertical shift applied by clamping (`original.y - clamped.y`).
    pub fn yoffset(&self) -> i32 {
        let rects = self.rects.lock();
        rects.original.y.saturating_sub(rects.clamped.y)
    }

    /// Whether composition pixel `(x, y)` is over the displayed popup.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.lock().clamped.contains(x, y)
    }
}

impl<B: Backend> Layer<B> for PopupLayer<B> {
    fn core(&self) -> &LayerCore<B> {
        &self.core
    }

    fn render(&self, ctx: &mut B::Context) {
        let texture = self.frame_buffer.swap(ctx);
        self.core.render_texture(ctx, texture.as_deref());
    }
}

impl<B: Backend> fmt::Debug for PopupLayer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rects = *self.rects.lock();
        f.debug_struct("PopupLayer")
            .field("core", &self.core)
            .field("original", &rects.original)
            .field("clamped", &rects.clamped)
            .finish_non_exhaustive()
    }
}
