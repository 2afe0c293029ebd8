// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositing layers.
//!
//! A [`Layer`] is a positioned quad that draws one texture. Layers are
//! shared as [`LayerRef`]s between a [`Composition`] and whoever created
//! them; identity is pointer identity.
//!
//! Every variant embeds a [`LayerCore`], which holds the state all layers
//! share (bounds, flags, the back-reference to the owning composition, and
//! the lazily built quad and effect). The trait's provided methods delegate
//! to it, so a variant only implements what differs:
//!
//! - [`ImageLayer`]: a static texture.
//! - [`SourceLayer`]: frames from an asynchronous [`FrameSource`] through a
//!   [`FrameBuffer`](crate::frame_buffer::FrameBuffer).
//! - [`PopupLayer`]: a transient widget positioned in composition pixels.

mod image;
mod popup;
mod source;

pub use image::ImageLayer;
pub use popup::PopupLayer;
pub use source::{FrameSource, SourceLayer};

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::composition::{Composition, CompositionRef};
use crate::geometry::Rect;
use crate::gpu::Backend;
use crate::time::Duration;

/// A shared, dynamically typed layer.
pub type LayerRef<B> = Arc<dyn Layer<B>>;

/// Mouse buttons forwarded to input-capable layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Wheel button.
    Middle,
    /// Secondary button.
    Right,
}

/// A compositing unit.
///
/// All methods take `&self`: layers are shared between the thread that
/// owns the composition and the render thread, and keep their mutable state
/// behind locks in [`LayerCore`].
pub trait Layer<B: Backend>: Send + Sync {
    /// The shared state.
    fn core(&self) -> &LayerCore<B>;

    /// Draws the layer's current texture at its bounds. Drawing nothing is
    /// not an error.
    fn render(&self, ctx: &mut B::Context);

    /// Advances time-dependent state. `time` is measured from the start of
    /// the render loop.
    fn tick(&self, time: Duration) {
        let _ = time;
    }

    /// Normalized bounds.
    fn bounds(&self) -> Rect {
        self.core().bounds()
    }

    /// Sets normalized bounds. Geometry is rebuilt on the next render.
    fn move_to(&self, bounds: Rect) {
        self.core().move_to(bounds);
    }

    /// Records the owning composition.
    fn attach(&self, composition: CompositionRef<B>) {
        self.core().attach(composition);
    }

    /// The owning composition, if attached and still alive.
    fn composition(&self) -> Option<Arc<Composition<B>>> {
        self.core().composition()
    }

    /// Whether hit-testing may route input here.
    fn want_input(&self) -> bool {
        self.core().want_input()
    }

    /// Whether texture rows are drawn bottom-up.
    fn flip(&self) -> bool {
        self.core().flip()
    }

    /// A button press or release at `(x, y)`, relative to the layer's
    /// top-left corner in pixels.
    fn mouse_click(&self, button: MouseButton, up: bool, x: i32, y: i32) {
        let _ = (button, up, x, y);
    }

    /// Pointer motion at `(x, y)`, relative to the layer's top-left corner.
    /// `leave` is set when the pointer left the layer.
    fn mouse_move(&self, leave: bool, x: i32, y: i32) {
        let _ = (leave, x, y);
    }

    /// Reloads the layer's content from its producer.
    fn refresh(&self) {}
}

struct Placement<B: Backend> {
    bounds: Rect,
    version: u64,
    geometry: Option<(u64, Arc<B::Geometry>)>,
}

/// State shared by every layer variant.
pub struct LayerCore<B: Backend> {
    backend: Arc<B>,
    want_input: bool,
    flip: bool,
    placement: Mutex<Placement<B>>,
    effect: Mutex<Option<Arc<B::Effect>>>,
    composition: Mutex<Option<CompositionRef<B>>>,
}

impl<B: Backend> LayerCore<B> {
    /// Creates core state with empty bounds.
    pub fn new(backend: Arc<B>, want_input: bool, flip: bool) -> Self {
        Self {
            backend,
            want_input,
            flip,
            placement: Mutex::new(Placement {
                bounds: Rect::ZERO,
                version: 0,
                geometry: None,
            }),
            effect: Mutex::new(None),
            composition: Mutex::new(None),
        }
    }

    /// The backend this layer draws through.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Normalized bounds.
    pub fn bounds(&self) -> Rect {
        self.placement.lock().bounds
    }

    /// Sets bounds and invalidates the cached quad.
    pub fn move_to(&self, bounds: Rect) {
        let stale = {
            let mut placement = self.placement.lock();
            placement.bounds = bounds;
            placement.version += 1;
            placement.geometry.take()
        };
        drop(stale);
    }

    /// Whether hit-testing may route input here.
    pub fn want_input(&self) -> bool {
        self.want_input
    }

    /// Whether texture rows are drawn bottom-up.
    pub fn flip(&self) -> bool {
        self.flip
    }

    /// Records the owning composition.
    pub fn attach(&self, composition: CompositionRef<B>) {
        *self.composition.lock() = Some(composition);
    }

    /// The owning composition, if attached and still alive.
    pub fn composition(&self) -> Option<Arc<Composition<B>>> {
        self.composition.lock().as_ref()?.upgrade()
    }

    /// Draws `texture` as a quad at the current bounds.
    ///
    /// Builds the quad on first use after a move, and the effect once. A
    /// quad built for bounds that moved again meanwhile is used for this
    /// draw but not cached. `None` draws nothing.
    pub fn render_texture(&self, ctx: &mut B::Context, texture: Option<&B::Texture>) {
        let Some(texture) = texture else {
            return;
        };
        let Some(geometry) = self.geometry() else {
            return;
        };
        let Some(effect) = self.effect() else {
            return;
        };
        if let Err(err) = self.backend.draw(ctx, &geometry, &effect, texture) {
            tracing::warn!(%err, "layer draw failed");
        }
    }

    fn geometry(&self) -> Option<Arc<B::Geometry>> {
        let (bounds, version) = {
            let placement = self.placement.lock();
            match &placement.geometry {
                Some((built, geometry)) if *built == placement.version => {
                    return Some(Arc::clone(geometry));
                }
                _ => (placement.bounds, placement.version),
            }
        };

        let geometry = match self.backend.create_quad(bounds, self.flip) {
            Ok(geometry) => Arc::new(geometry),
            Err(err) => {
                tracing::warn!(%err, "cannot build layer quad");
                return None;
            }
        };

        let mut placement = self.placement.lock();
        if placement.version == version {
            placement.geometry = Some((version, Arc::clone(&geometry)));
        }
        Some(geometry)
    }

    fn effect(&self) -> Option<Arc<B::Effect>> {
        if let Some(effect) = self.effect.lock().as_ref() {
            return Some(Arc::clone(effect));
        }
        let effect = match self.backend.create_default_effect() {
            Ok(effect) => Arc::new(effect),
            Err(err) => {
                tracing::warn!(%err, "cannot build layer effect");
                return None;
            }
        };
        Some(Arc::clone(self.effect.lock().get_or_insert(effect)))
    }
}

impl<B: Backend> fmt::Debug for LayerCore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerCore")
            .field("bounds", &self.bounds())
            .field("want_input", &self.want_input)
            .field("flip", &self.flip)
            .finish_non_exhaustive()
    }
}
