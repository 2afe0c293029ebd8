// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The ordered layer collection for one output surface.
//!
//! A [`Composition`] paints its layers back to front in insertion order
//! (painter's algorithm, no depth testing), routes input to the topmost
//! input-capable layer under the pointer, and measures its own render rate.
//!
//! Tick, render and hit-testing all iterate a [`Snapshot`] of the layer
//! list taken in O(1) under the lock. Producers may add or remove layers
//! while a pass is running; the pass finishes with the layers it started
//! with, and a removed layer is freed once the last snapshot holding it is
//! dropped.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::frame_buffer::{FrameBuffer, FrameBufferId};
use crate::geometry::PixelPoint;
use crate::gpu::{Backend, PixelFormat};
use crate::layer::{LayerRef, MouseButton};
use crate::snapshot::{Snapshot, SnapshotList};
use crate::stats::FpsCounter;
use crate::time::{Clock, Duration};

/// Initial size and policy of a [`Composition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositionConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether presentation waits for vertical sync.
    pub vsync: bool,
    /// Layout of CPU frames stored by frame buffers this composition
    /// creates.
    pub pixel_format: PixelFormat,
}

impl CompositionConfig {
    /// A `width` × `height` composition with vsync and BGRA frames.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vsync: true,
            pixel_format: PixelFormat::Bgra8,
        }
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

#[derive(Clone, Copy, Debug)]
struct Surface {
    width: u32,
    height: u32,
    vsync: bool,
}

/// An ordered set of layers composed into one surface.
pub struct Composition<B: Backend> {
    this: Weak<Self>,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    pixel_format: PixelFormat,
    layers: SnapshotList<LayerRef<B>>,
    surface: Mutex<Surface>,
    time: Mutex<Duration>,
    fps: Mutex<FpsCounter>,
    next_frame_buffer: AtomicU64,
}

impl<B: Backend> Composition<B> {
    /// Creates an empty composition.
    ///
    /// The first frame-rate window opens now.
    pub fn new(backend: Arc<B>, config: CompositionConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let mut fps = FpsCounter::new();
        fps.start(clock.now());
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            backend,
            clock,
            pixel_format: config.pixel_format,
            layers: SnapshotList::new(),
            surface: Mutex::new(Surface {
                width: config.width,
                height: config.height,
                vsync: config.vsync,
            }),
            time: Mutex::new(Duration::ZERO),
            fps: Mutex::new(fps),
            next_frame_buffer: AtomicU64::new(0),
        })
    }

    /// A non-owning reference to this composition.
    pub fn downgrade(&self) -> CompositionRef<B> {
        CompositionRef(self.this.clone())
    }

    /// The backend layers draw through.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The clock used for frame-rate measurement.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Creates a frame buffer with the next id from this composition's
    /// counter.
    pub fn create_frame_buffer(&self) -> Arc<FrameBuffer<B>> {
        let id = FrameBufferId(self.next_frame_buffer.fetch_add(1, Ordering::Relaxed));
        Arc::new(FrameBuffer::new(
            id,
            Arc::clone(&self.backend),
            self.pixel_format,
            Arc::clone(&self.clock),
        ))
    }

    /// Appends `layer` on top and attaches it.
    ///
    /// Returns `false` (and does nothing) if the layer is already present.
    pub fn add_layer(&self, layer: LayerRef<B>) -> bool {
        let attach = Arc::clone(&layer);
        if !self
            .layers
            .push_unique(layer, |existing| Arc::ptr_eq(existing, &attach))
        {
            tracing::debug!("layer already in composition");
            return false;
        }
        attach.attach(self.downgrade());
        true
    }

    /// Removes every entry that is `layer` (by identity).
    ///
    /// Returns whether anything was removed.
    pub fn remove_layer(&self, layer: &LayerRef<B>) -> bool {
        self.layers.remove_where(|existing| Arc::ptr_eq(existing, layer)) > 0
    }

    /// Removes all layers.
    pub fn clear(&self) {
        drop(self.layers.clear());
    }

    /// A consistent view of the layers, bottom first.
    pub fn layers(&self) -> Snapshot<LayerRef<B>> {
        self.layers.snapshot()
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.surface.lock().width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.surface.lock().height
    }

    /// Whether presentation waits for vertical sync.
    pub fn is_vsync(&self) -> bool {
        self.surface.lock().vsync
    }

    /// Time passed to the last [`tick`](Self::tick).
    pub fn time(&self) -> Duration {
        *self.time.lock()
    }

    /// Render passes per second over the last closed window.
    pub fn fps(&self) -> f64 {
        self.fps.lock().fps()
    }

    /// Updates the stored size and vsync flag.
    ///
    /// No GPU resource is resized here; the caller resizes its swap chain.
    pub fn resize(&self, vsync: bool, width: u32, height: u32) {
        *self.surface.lock() = Surface {
            width,
            height,
            vsync,
        };
    }

    /// Stores `time` and ticks every layer.
    pub fn tick(&self, time: Duration) {
        *self.time.lock() = time;
        let layers = self.layers.snapshot();
        for layer in &layers {
            layer.tick(time);
        }
    }

    /// Renders every layer in insertion order, then counts the pass.
    pub fn render(&self, ctx: &mut B::Context) {
        let layers = self.layers.snapshot();
        for layer in &layers {
            layer.render(ctx);
        }

        let now = self.clock.now();
        if let Some(fps) = self.fps.lock().record(now) {
            tracing::debug!(fps, layers = layers.len(), "composition frame rate");
        }
    }

    /// Finds the topmost input-capable layer containing `point`.
    ///
    /// `point` is in composition pixels. On a match it is rewritten to be
    /// relative to the layer's top-left corner; otherwise it is untouched.
    pub fn layer_from_point(&self, point: &mut PixelPoint) -> Option<LayerRef<B>> {
        let (width, height) = {
            let surface = self.surface.lock();
            (surface.width, surface.height)
        };
        let layers = self.layers.snapshot();
        layers.iter().rev().find_map(|layer| {
            if !layer.want_input() {
                return None;
            }
            let rect = layer.bounds().to_pixels(width, height);
            if rect.contains(point.x, point.y) {
                point.x -= rect.x;
                point.y -= rect.y;
                Some(Arc::clone(layer))
            } else {
                None
            }
        })
    }

    /// Routes a click to the layer under `(x, y)`.
    pub fn mouse_click(&self, button: MouseButton, up: bool, x: i32, y: i32) {
        let mut point = PixelPoint::new(x, y);
        if let Some(layer) = self.layer_from_point(&mut point) {
            layer.mouse_click(button, up, point.x, point.y);
        }
    }

    /// Routes pointer motion to the layer under `(x, y)`.
    pub fn mouse_move(&self, leave: bool, x: i32, y: i32) {
        let mut point = PixelPoint::new(x, y);
        if let Some(layer) = self.layer_from_point(&mut point) {
            layer.mouse_move(leave, point.x, point.y);
        }
    }

    /// Reloads every layer.
    pub fn refresh(&self) {
        let layers = self.layers.snapshot();
        for layer in &layers {
            layer.refresh();
        }
    }
}

impl<B: Backend> fmt::Debug for Composition<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let surface = *self.surface.lock();
        f.debug_struct("Composition")
            .field("width", &surface.width)
            .field("height", &surface.height)
            .field("vsync", &surface.vsync)
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

/// A weak back-reference from a layer to its composition.
pub struct CompositionRef<B: Backend>(Weak<Composition<B>>);

impl<B: Backend> CompositionRef<B> {
    /// Returns the composition if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<Composition<B>>> {
        self.0.upgrade()
    }
}

impl<B: Backend> Clone for CompositionRef<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: Backend> fmt::Debug for CompositionRef<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompositionRef")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::gpu::Color;
    use crate::headless::{HeadlessBackend, HeadlessContext};
    use crate::layer::{Layer, LayerCore};
    use crate::time::{HostTime, ManualClock};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        core: LayerCore<HeadlessBackend>,
        name: &'static str,
        log: Log,
    }

    impl Recorder {
        fn new(
            backend: &Arc<HeadlessBackend>,
            name: &'static str,
            want_input: bool,
            log: &Log,
        ) -> Arc<Self> {
            Arc::new(Self {
                core: LayerCore::new(Arc::clone(backend), want_input, false),
                name,
                log: Arc::clone(log),
            })
        }
    }

    impl Layer<HeadlessBackend> for Recorder {
        fn core(&self) -> &LayerCore<HeadlessBackend> {
            &self.core
        }

        fn render(&self, _ctx: &mut HeadlessContext) {
            self.log.lock().push(format!("render {}", self.name));
        }

        fn tick(&self, time: Duration) {
            self.log
                .lock()
                .push(format!("tick {} {}", self.name, time.micros()));
        }

        fn mouse_click(&self, button: MouseButton, up: bool, x: i32, y: i32) {
            self.log
                .lock()
                .push(format!("click {} {button:?} {up} {x},{y}", self.name));
        }

        fn mouse_move(&self, leave: bool, x: i32, y: i32) {
            self.log
                .lock()
                .push(format!("move {} {leave} {x},{y}", self.name));
        }

        fn refresh(&self) {
            self.log.lock().push(format!("refresh {}", self.name));
        }
    }

    fn setup(width: u32, height: u32) -> (Arc<HeadlessBackend>, Arc<ManualClock>, Arc<Composition<HeadlessBackend>>) {
        let backend = Arc::new(HeadlessBackend::new());
        let clock = Arc::new(ManualClock::new(HostTime(0)));
        let comp = Composition::new(
            Arc::clone(&backend),
            CompositionConfig::new(width, height),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (backend, clock, comp)
    }

    fn ctx() -> HeadlessContext {
        HeadlessContext::new(1, 1, Color::BLACK)
    }

    #[test]
    fn renders_in_insertion_order() {
        let (backend, _, comp) = setup(100, 100);
        let log = Log::default();
        for name in ["a", "b", "c", "d"] {
            assert!(comp.add_layer(Recorder::new(&backend, name, false, &log)));
        }
        comp.render(&mut ctx());
        assert_eq!(
            *log.lock(),
            ["render a", "render b", "render c", "render d"],
            "painter's algorithm: first added draws first"
        );
    }

    #[test]
    fn duplicate_add_is_ignored_and_remove_is_by_identity() {
        let (backend, _, comp) = setup(100, 100);
        let log = Log::default();
        let a: LayerRef<HeadlessBackend> = Recorder::new(&backend, "a", false, &log);
        let twin: LayerRef<HeadlessBackend> = Recorder::new(&backend, "a", false, &log);

        assert!(comp.add_layer(Arc::clone(&a)));
        assert!(!comp.add_layer(Arc::clone(&a)), "same layer twice");
        assert!(comp.add_layer(Arc::clone(&twin)), "equal-looking layer is distinct");
        assert_eq!(comp.len(), 2);

        assert!(comp.remove_layer(&a));
        assert!(!comp.remove_layer(&a), "second removal finds nothing");
        assert_eq!(comp.len(), 1);
        assert!(Arc::ptr_eq(&comp.layers()[0], &twin));
    }

    #[test]
    fn add_attaches_weakly() {
        let (backend, _, comp) = setup(100, 100);
        let log = Log::default();
        let layer = Recorder::new(&backend, "a", false, &log);
        assert!(comp.add_layer(Arc::clone(&layer) as LayerRef<HeadlessBackend>));

        let attached = layer.composition().expect("attached on add");
        assert!(Arc::ptr_eq(&attached, &comp));
        drop(attached);

        comp.clear();
        drop(comp);
        assert!(layer.composition().is_none(), "layer does not keep the composition alive");
    }

    #[test]
    fn hit_test_prefers_topmost_layer() {
        let (backend, _, comp) = setup(200, 200);
        let log = Log::default();
        let first = Recorder::new(&backend, "first", true, &log);
        let second = Recorder::new(&backend, "second", true, &log);
        first.move_to(Rect::new(0.0, 0.0, 0.5, 0.5));
        second.move_to(Rect::new(0.25, 0.25, 0.5, 0.5));
        comp.add_layer(Arc::clone(&first) as LayerRef<HeadlessBackend>);
        comp.add_layer(Arc::clone(&second) as LayerRef<HeadlessBackend>);

        let mut point = PixelPoint::new(150, 150);
        let hit = comp.layer_from_point(&mut point).expect("hit");
        assert!(Arc::ptr_eq(&hit, &(second as LayerRef<HeadlessBackend>)));
        assert_eq!(point, PixelPoint::new(25, 25), "relative to the layer");

        let mut overlap = PixelPoint::new(60, 60);
        let hit = comp.layer_from_point(&mut overlap).expect("hit");
        assert!(
            Arc::ptr_eq(&hit, &(Arc::clone(&comp.layers()[1]))),
            "overlap goes to the later layer"
        );
        assert_eq!(overlap, PixelPoint::new(10, 10));

        let mut corner = PixelPoint::new(10, 10);
        let hit = comp.layer_from_point(&mut corner).expect("hit");
        assert!(Arc::ptr_eq(&hit, &(first as LayerRef<HeadlessBackend>)));
    }

    #[test]
    fn hit_test_skips_layers_without_input_and_misses_cleanly() {
        let (backend, _, comp) = setup(200, 200);
        let log = Log::default();
        let below = Recorder::new(&backend, "below", true, &log);
        let above = Recorder::new(&backend, "above", false, &log);
        below.move_to(Rect::FULL);
        above.move_to(Rect::FULL);
        comp.add_layer(Arc::clone(&below) as LayerRef<HeadlessBackend>);
        comp.add_layer(above);

        let mut point = PixelPoint::new(5, 7);
        let hit = comp.layer_from_point(&mut point).expect("falls through");
        assert!(Arc::ptr_eq(&hit, &(below as LayerRef<HeadlessBackend>)));

        let mut outside = PixelPoint::new(200, 10);
        assert!(comp.layer_from_point(&mut outside).is_none(), "right edge is exclusive");
        assert_eq!(outside, PixelPoint::new(200, 10), "point untouched on a miss");
    }

    #[test]
    fn mouse_events_route_with_relative_points() {
        let (backend, _, comp) = setup(200, 100);
        let log = Log::default();
        let layer = Recorder::new(&backend, "web", true, &log);
        layer.move_to(Rect::new(0.5, 0.5, 0.5, 0.5));
        comp.add_layer(layer);

        comp.mouse_click(MouseButton::Right, true, 120, 60);
        comp.mouse_move(false, 199, 99);
        comp.mouse_move(false, 10, 10);
        assert_eq!(
            *log.lock(),
            ["click web Right true 20,10", "move web false 99,49"],
            "the miss is dropped"
        );
    }

    #[test]
    fn tick_stores_time_and_reaches_every_layer() {
        let (backend, _, comp) = setup(10, 10);
        let log = Log::default();
        comp.add_layer(Recorder::new(&backend, "a", false, &log));
        comp.add_layer(Recorder::new(&backend, "b", false, &log));
        comp.tick(Duration::from_millis(16));
        assert_eq!(comp.time(), Duration(16_000));
        assert_eq!(*log.lock(), ["tick a 16000", "tick b 16000"]);
    }

    #[test]
    fn refresh_reaches_every_layer() {
        let (backend, _, comp) = setup(10, 10);
        let log = Log::default();
        comp.add_layer(Recorder::new(&backend, "a", false, &log));
        comp.add_layer(Recorder::new(&backend, "b", true, &log));
        comp.refresh();
        assert_eq!(*log.lock(), ["refresh a", "refresh b"]);
    }

    #[test]
    fn fps_window_closes_on_the_boundary() {
        let (_, clock, comp) = setup(10, 10);
        for _ in 0..30 {
            clock.advance(Duration(1_000_000 / 30));
            comp.render(&mut ctx());
        }
        // 30 * 33_333 falls 10us short of the window; the last pass lands
        // exactly on it.
        clock.set(HostTime(1_000_000));
        assert_eq!(comp.fps(), 0.0, "window still open");
        comp.render(&mut ctx());
        assert!((comp.fps() - 31.0).abs() < 1e-9, "fps was {}", comp.fps());
    }

    #[test]
    fn fps_thirty_frames_in_window() {
        let (_, clock, comp) = setup(10, 10);
        for i in 1..=30_u64 {
            clock.set(HostTime(i * 1_000_000 / 30));
            comp.render(&mut ctx());
        }
        assert!((comp.fps() - 30.0).abs() < 1e-9, "fps was {}", comp.fps());
    }

    #[test]
    fn resize_updates_size_and_vsync() {
        let (_, _, comp) = setup(10, 10);
        assert!(comp.is_vsync());
        comp.resize(false, 640, 480);
        assert_eq!((comp.width(), comp.height()), (640, 480));
        assert!(!comp.is_vsync());
    }

    #[test]
    fn frame_buffers_are_numbered_per_composition() {
        let (_, _, comp) = setup(10, 10);
        let (_, _, other) = setup(10, 10);
        assert_eq!(comp.create_frame_buffer().id().to_string(), "layermix_0");
        assert_eq!(comp.create_frame_buffer().id().to_string(), "layermix_1");
        assert_eq!(other.create_frame_buffer().id(), FrameBufferId(0), "counters are not global");
    }

    #[test]
    fn empty_render_still_counts() {
        let (backend, clock, comp) = setup(10, 10);
        clock.set(HostTime(2_000_000));
        comp.render(&mut ctx());
        assert!((comp.fps() - 0.5).abs() < 1e-9);
        assert_eq!(backend.draw_calls(), 0);
    }
}
