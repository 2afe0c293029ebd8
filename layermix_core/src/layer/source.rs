// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Layer, LayerCore, MouseButton};
use crate::frame_buffer::FrameBuffer;
use crate::gpu::Backend;
use crate::time::Duration;

/// An asynchronous frame producer, such as an embedded browser view.
///
/// The producer delivers frames into the [`FrameBuffer`] of its
/// [`SourceLayer`] on its own thread. The layer calls back into the
/// producer from the render thread and the input thread.
pub trait FrameSource: Send + Sync {
    /// The layer's on-screen size changed to `width` × `height` pixels.
    fn resize(&self, width: u32, height: u32);

    /// Asks for a new frame now (external begin-frame mode).
    fn begin_frame(&self);

    /// A button press or release at layer-relative `(x, y)`.
    fn mouse_click(&self, button: MouseButton, up: bool, x: i32, y: i32) {
        let _ = (button, up, x, y);
    }

    /// Pointer motion at layer-relative `(x, y)`.
    fn mouse_move(&self, leave: bool, x: i32, y: i32) {
        let _ = (leave, x, y);
    }

    /// Reloads the content.
    fn reload(&self) {}

    /// Stops producing frames. Called once, when the layer is dropped.
    fn close(&self);
}

/// A layer fed by a [`FrameSource`] through a [`FrameBuffer`].
pub struct SourceLayer<B: Backend> {
    core: LayerCore<B>,
    source: Arc<dyn FrameSource>,
    frame_buffer: Arc<FrameBuffer<B>>,
    send_begin_frame: bool,
    size: Mutex<Option<(u32, u32)>>,
}

impl<B: Backend> SourceLayer<B> {
    /// Creates a layer drawing `frame_buffer`, which `source` fills.
    ///
    /// `flip` should be set when the source delivers shared textures, whose
    /// rows arrive bottom-up. With `send_begin_frame` each tick asks the
    /// source for a frame.
    pub fn new(
        backend: Arc<B>,
        source: Arc<dyn FrameSource>,
        frame_buffer: Arc<FrameBuffer<B>>,
        want_input: bool,
        flip: bool,
        send_begin_frame: bool,
    ) -> Self {
        Self {
            core: LayerCore::new(backend, want_input, flip),
            source,
            frame_buffer,
            send_begin_frame,
            size: Mutex::new(None),
        }
    }

    /// The buffer the source paints into.
    pub fn frame_buffer(&self) -> &Arc<FrameBuffer<B>> {
        &self.frame_buffer
    }

    /// The producer.
    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }
}

impl<B: Backend> Layer<B> for SourceLayer<B> {
    fn core(&self) -> &LayerCore<B> {
        &self.core
    }

    fn render(&self, ctx: &mut B::Context) {
        let texture = self.frame_buffer.swap(ctx);
        self.core.render_texture(ctx, texture.as_deref());
    }

    /// Forwards the layer's pixel size to the source when it changed, then
    /// requests a frame in external begin-frame mode. Does nothing while
    /// detached.
    fn tick(&self, _time: Duration) {
        let Some(composition) = self.core.composition() else {
            return;
        };
        let rect = self
            .core
            .bounds()
            .to_pixels(composition.width(), composition.height());
        let size = (rect.width.max(0).unsigned_abs(), rect.height.max(0).unsigned_abs());

        let changed = {
            let mut last = self.size.lock();
            let changed = *last != Some(size);
            *last = Some(size);
            changed
        };
        if changed {
            tracing::debug!(buffer = %self.frame_buffer.id(), width = size.0, height = size.1, "source resize");
            self.source.resize(size.0, size.1);
        }
        if self.send_begin_frame {
            self.source.begin_frame();
        }
    }

    fn mouse_click(&self, button: MouseButton, up: bool, x: i32, y: i32) {
        if self.core.want_input() {
            self.source.mouse_click(button, up, x, y);
        }
    }

    fn mouse_move(&self, leave: bool, x: i32, y: i32) {
        if self.core.want_input() {
            self.source.mouse_move(leave, x, y);
        }
    }

    fn refresh(&self) {
        self.source.reload();
    }
}

impl<B: Backend> Drop for SourceLayer<B> {
    fn drop(&mut self) {
        tracing::info!(buffer = %self.frame_buffer.id(), "closing source");
        self.source.close();
    }
}

impl<B: Backend> fmt::Debug for SourceLayer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLayer")
            .field("core", &self.core)
            .field("frame_buffer", &self.frame_buffer)
            .field("send_begin_frame", &self.send_begin_frame)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Composition, CompositionConfig};
    use crate::geometry::Rect;
    use crate::gpu::Color;
    use crate::headless::{HeadlessBackend, HeadlessContext};
    use crate::layer::LayerRef;
    use crate::time::{Clock, HostTime, ManualClock};

    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<String>>,
    }

    impl Probe {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl FrameSource for Probe {
        fn resize(&self, width: u32, height: u32) {
            self.calls.lock().push(format!("resize {width}x{height}"));
        }

        fn begin_frame(&self) {
            self.calls.lock().push("begin_frame".into());
        }

        fn mouse_click(&self, button: MouseButton, up: bool, x: i32, y: i32) {
            self.calls
                .lock()
                .push(format!("click {button:?} {up} {x},{y}"));
        }

        fn reload(&self) {
            self.calls.lock().push("reload".into());
        }

        fn close(&self) {
            self.calls.lock().push("close".into());
        }
    }

    fn composition(width: u32, height: u32) -> Arc<Composition<HeadlessBackend>> {
        Composition::new(
            Arc::new(HeadlessBackend::new()),
            CompositionConfig::new(width, height),
            Arc::new(ManualClock::new(HostTime(0))) as Arc<dyn Clock>,
        )
    }

    fn layer(
        comp: &Composition<HeadlessBackend>,
        probe: &Arc<Probe>,
        want_input: bool,
        send_begin_frame: bool,
    ) -> Arc<SourceLayer<HeadlessBackend>> {
        Arc::new(SourceLayer::new(
            Arc::clone(comp.backend()),
            Arc::clone(probe) as Arc<dyn FrameSource>,
            comp.create_frame_buffer(),
            want_input,
            false,
            send_begin_frame,
        ))
    }

    #[test]
    fn tick_forwards_resize_only_on_change() {
        let comp = composition(800, 600);
        let probe = Arc::new(Probe::default());
        let source = layer(&comp, &probe, false, false);
        source.move_to(Rect::new(0.0, 0.0, 0.5, 0.5));

        source.tick(Duration::ZERO);
        assert!(probe.calls().is_empty(), "detached layers do nothing");

        comp.add_layer(Arc::clone(&source) as LayerRef<HeadlessBackend>);
        comp.tick(Duration::ZERO);
        comp.tick(Duration::SECOND);
        comp.resize(true, 400, 300);
        comp.tick(Duration::SECOND);
        assert_eq!(probe.calls(), ["resize 400x300", "resize 200x150"]);
    }

    #[test]
    fn external_begin_frame_requests_every_tick() {
        let comp = composition(10, 10);
        let probe = Arc::new(Probe::default());
        let source = layer(&comp, &probe, false, true);
        source.move_to(Rect::FULL);
        comp.add_layer(source);
        comp.tick(Duration::ZERO);
        comp.tick(Duration::ZERO);
        assert_eq!(probe.calls(), ["resize 10x10", "begin_frame", "begin_frame"]);
    }

    #[test]
    fn input_requires_want_input() {
        let comp = composition(10, 10);
        let deaf_probe = Arc::new(Probe::default());
        let deaf = layer(&comp, &deaf_probe, false, false);
        deaf.mouse_click(MouseButton::Left, false, 1, 1);
        assert!(deaf_probe.calls().is_empty());

        let probe = Arc::new(Probe::default());
        let listening = layer(&comp, &probe, true, false);
        listening.mouse_click(MouseButton::Left, true, 3, 4);
        listening.refresh();
        assert_eq!(probe.calls(), ["click Left true 3,4", "reload"]);
    }

    #[test]
    fn renders_the_newest_frame() {
        let comp = composition(2, 1);
        let probe = Arc::new(Probe::default());
        let source = layer(&comp, &probe, false, false);
        source.move_to(Rect::FULL);

        let mut ctx = HeadlessContext::new(2, 1, Color::BLACK);
        source.render(&mut ctx);
        assert_eq!(comp.backend().draw_calls(), 0, "no frame yet");

        // BGRA red.
        source.frame_buffer().on_paint(&[0, 0, 255, 255], 1, 1);
        source.render(&mut ctx);
        assert_eq!(ctx.target().pixel(1, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn drop_closes_the_source() {
        let comp = composition(10, 10);
        let probe = Arc::new(Probe::default());
        let source: LayerRef<HeadlessBackend> = layer(&comp, &probe, false, false);
        comp.add_layer(Arc::clone(&source));
        let held = comp.layers();

        assert!(comp.remove_layer(&source));
        drop(source);
        assert!(probe.calls().is_empty(), "a snapshot still holds the layer");
        drop(held);
        assert_eq!(probe.calls(), ["close"]);
    }
}
