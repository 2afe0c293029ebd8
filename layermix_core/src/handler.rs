// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Producer-facing adapter and the render loop.
//!
//! The pieces, and the thread each runs on:
//!
//! ```text
//!   producer thread                       render thread
//!   ───────────────                       ─────────────
//!   RenderHandler::on_paint ──► FrameBuffer ◄── Renderer::render_frame
//!   RenderHandler::on_popup_show               │  Composition::tick
//!          │                                   │  Composition::render
//!          └── FrameRequester ──► RenderLoop ──┘  SwapChain::present
//!                                                 PublishSink::publish
//! ```
//!
//! [`RenderHandler`] receives paint and popup notifications and routes them
//! into the view's or the popup's frame buffer. [`Renderer`] owns the swap
//! chain and draws one frame at a time. [`RenderLoop`] runs a renderer on
//! its own thread, at a fixed interval and whenever a [`FrameRequester`]
//! asks, until stopped.

use core::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::composition::Composition;
use crate::frame_buffer::FrameBuffer;
use crate::geometry::{PixelRect, Rect};
use crate::gpu::{Backend, Color, GpuError, PublishSink, SharedHandle, SwapChain, TextureInfo};
use crate::layer::{FrameSource, Layer, LayerRef, PopupLayer, SourceLayer};
use crate::time::{Duration, HostTime};

/// Which surface of the producer a paint is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaintElement {
    /// The main view.
    View,
    /// The popup widget.
    Popup,
}

/// Render loop policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderLoopConfig {
    /// Time between ticks.
    pub frame_interval: Duration,
    /// Ask the source for each frame instead of letting it paint on its own
    /// schedule. Presentation then skips vsync.
    pub send_begin_frame: bool,
    /// Draw as soon as a paint arrives instead of waiting for the next tick.
    pub render_on_paint: bool,
    /// Background behind all layers.
    pub clear_color: Color,
}

impl RenderLoopConfig {
    /// Tick at 60 Hz; the source paints on its own schedule.
    #[must_use]
    pub const fn polling() -> Self {
        Self {
            frame_interval: Duration(16_667),
            send_begin_frame: false,
            render_on_paint: false,
            clear_color: Color::BLACK,
        }
    }

    /// Tick at 60 Hz, requesting a frame from the source each tick and
    /// drawing as soon as it arrives.
    #[must_use]
    pub const fn external_begin_frame() -> Self {
        Self {
            frame_interval: Duration(16_667),
            send_begin_frame: true,
            render_on_paint: true,
            clear_color: Color::BLACK,
        }
    }
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self::polling()
    }
}

enum Command {
    Frame,
    Stop,
}

/// Asks a [`RenderLoop`] for a frame. Cheap to clone.
#[derive(Clone)]
pub struct FrameRequester {
    commands: Sender<Command>,
}

impl FrameRequester {
    /// Requests one frame as soon as possible.
    ///
    /// Returns `false` if the loop has stopped.
    pub fn request_frame(&self) -> bool {
        self.commands.send(Command::Frame).is_ok()
    }
}

impl fmt::Debug for FrameRequester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRequester")
            .field("pending", &self.commands.len())
            .finish()
    }
}

/// Routes producer notifications into a composition.
///
/// Owns the view layer (added to the composition on construction, covering
/// it) and the popup state machine: hidden until
/// [`on_popup_show(true)`](Self::on_popup_show) adds a [`PopupLayer`],
/// hidden again when `on_popup_show(false)` removes it.
pub struct RenderHandler<B: Backend> {
    composition: Arc<Composition<B>>,
    view: Arc<SourceLayer<B>>,
    popup: Mutex<Option<Arc<PopupLayer<B>>>>,
    flip: bool,
    config: RenderLoopConfig,
    requester: Mutex<Option<FrameRequester>>,
}

impl<B: Backend> RenderHandler<B> {
    /// Creates the view layer for `source` and adds it to `composition`.
    ///
    /// `shared_textures` says whether the source paints through
    /// [`on_accelerated_paint`](Self::on_accelerated_paint); such frames are
    /// drawn flipped.
    pub fn new(
        composition: Arc<Composition<B>>,
        source: Arc<dyn FrameSource>,
        want_input: bool,
        shared_textures: bool,
        config: RenderLoopConfig,
    ) -> Self {
        let view = Arc::new(SourceLayer::new(
            Arc::clone(composition.backend()),
            source,
            composition.create_frame_buffer(),
            want_input,
            shared_textures,
            config.send_begin_frame,
        ));
        view.move_to(Rect::FULL);
        composition.add_layer(Arc::clone(&view) as LayerRef<B>);
        tracing::info!(view = %view.frame_buffer().id(), "render handler ready");
        Self {
            composition,
            view,
            popup: Mutex::new(None),
            flip: shared_textures,
            config,
            requester: Mutex::new(None),
        }
    }

    /// Where frame requests go. Without one, requests are dropped.
    pub fn set_frame_requester(&self, requester: FrameRequester) {
        *self.requester.lock() = Some(requester);
    }

    /// The composition this handler feeds.
    pub fn composition(&self) -> &Arc<Composition<B>> {
        &self.composition
    }

    /// The main view's layer.
    pub fn view(&self) -> &Arc<SourceLayer<B>> {
        &self.view
    }

    /// The popup layer while shown.
    pub fn popup(&self) -> Option<Arc<PopupLayer<B>>> {
        self.popup.lock().clone()
    }

    /// Whether the popup is shown.
    pub fn is_popup_shown(&self) -> bool {
        self.popup.lock().is_some()
    }

    /// A CPU-painted frame for `element`.
    pub fn on_paint(&self, element: PaintElement, pixels: &[u8], width: u32, height: u32) {
        match element {
            PaintElement::View => self.view.frame_buffer().on_paint(pixels, width, height),
            PaintElement::Popup => {
                let Some(popup) = self.popup() else {
                    tracing::debug!("popup paint while hidden");
                    return;
                };
                popup.frame_buffer().on_paint(pixels, width, height);
            }
        }
        if self.config.render_on_paint {
            self.request_frame();
        }
    }

    /// A shared-texture frame for `element`.
    pub fn on_accelerated_paint(&self, element: PaintElement, handle: SharedHandle) {
        match element {
            PaintElement::View => self.view.frame_buffer().on_gpu_paint(handle),
            PaintElement::Popup => {
                let Some(popup) = self.popup() else {
                    tracing::debug!(?handle, "popup paint while hidden");
                    return;
                };
                popup.frame_buffer().on_gpu_paint(handle);
            }
        }
        if self.config.render_on_paint {
            self.request_frame();
        }
    }

    /// Shows or hides the popup.
    ///
    /// Each show creates a popup layer with a fresh frame buffer; showing
    /// twice keeps the existing one. Hiding removes the layer, releasing its
    /// frame buffer, and requests a frame so it disappears immediately.
    pub fn on_popup_show(&self, show: bool) {
        if show {
            let mut popup = self.popup.lock();
            if popup.is_some() {
                tracing::debug!("popup already shown");
                return;
            }
            let frame_buffer = self.composition.create_frame_buffer();
            let id = frame_buffer.id();
            let layer = Arc::new(PopupLayer::new(
                Arc::clone(self.composition.backend()),
                frame_buffer,
                self.flip,
            ));
            self.composition.add_layer(Arc::clone(&layer) as LayerRef<B>);
            *popup = Some(layer);
            tracing::debug!(popup = %id, "popup shown");
        } else {
            let Some(layer) = self.popup.lock().take() else {
                tracing::debug!("popup already hidden");
                return;
            };
            self.composition.remove_layer(&(layer as LayerRef<B>));
            tracing::debug!("popup hidden");
            self.request_frame();
        }
    }

    /// The popup's rectangle in composition pixels.
    pub fn on_popup_size(&self, rect: PixelRect) {
        if let Some(popup) = self.popup() {
            popup.set_bounds(rect);
        }
    }

    /// How far the popup was shifted to fit, or `(0, 0)` when hidden.
    pub fn popup_offset(&self) -> (i32, i32) {
        self.popup()
            .map_or((0, 0), |popup| (popup.xoffset(), popup.yoffset()))
    }

    /// Whether composition pixel `(x, y)` is over the shown popup.
    pub fn is_over_popup(&self, x: i32, y: i32) -> bool {
        self.popup().is_some_and(|popup| popup.contains(x, y))
    }

    /// Builds the render-thread half, presenting into `swap_chain`.
    pub fn renderer<S: SwapChain<B>>(&self, swap_chain: S) -> Renderer<B, S> {
        Renderer::new(
            Arc::clone(&self.composition),
            Arc::clone(self.view.frame_buffer()),
            swap_chain,
            self.config,
        )
    }

    fn request_frame(&self) {
        if let Some(requester) = self.requester.lock().as_ref() {
            if !requester.request_frame() {
                tracing::debug!("render loop gone; frame request dropped");
            }
        }
    }
}

impl<B: Backend> Drop for RenderHandler<B> {
    fn drop(&mut self) {
        if let Some(popup) = self.popup.get_mut().take() {
            self.composition.remove_layer(&(popup as LayerRef<B>));
        }
        self.composition
            .remove_layer(&(Arc::clone(&self.view) as LayerRef<B>));
    }
}

impl<B: Backend> fmt::Debug for RenderHandler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHandler")
            .field("view", &self.view)
            .field("popup_shown", &self.is_popup_shown())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Draws frames of a composition into a swap chain.
pub struct Renderer<B: Backend, S: SwapChain<B>> {
    composition: Arc<Composition<B>>,
    view: Arc<FrameBuffer<B>>,
    swap_chain: S,
    publish: Option<Box<dyn PublishSink<B>>>,
    config: RenderLoopConfig,
    start: HostTime,
    frames: u64,
}

impl<B: Backend, S: SwapChain<B>> Renderer<B, S> {
    /// Creates a renderer. The surface follows the size of `view`'s frames.
    pub fn new(
        composition: Arc<Composition<B>>,
        view: Arc<FrameBuffer<B>>,
        swap_chain: S,
        config: RenderLoopConfig,
    ) -> Self {
        let start = composition.clock().now();
        Self {
            composition,
            view,
            swap_chain,
            publish: None,
            config,
            start,
            frames: 0,
        }
    }

    /// Hands each view frame to `sink` after it is presented.
    #[must_use]
    pub fn with_publish_sink(mut self, sink: Box<dyn PublishSink<B>>) -> Self {
        self.publish = Some(sink);
        self
    }

    /// The swap chain.
    pub fn swap_chain(&self) -> &S {
        &self.swap_chain
    }

    /// Frames presented.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Ticks the composition with the time since this renderer was
    /// created, then draws and presents.
    pub fn render_frame(&mut self) -> Result<(), GpuError> {
        let now = self.composition.clock().now();
        self.composition.tick(now - self.start);
        self.redraw()
    }

    /// Draws and presents without ticking.
    ///
    /// The composition and swap chain take the size of the view's current
    /// texture first. Vsync is off when frames are requested externally.
    pub fn redraw(&mut self) -> Result<(), GpuError> {
        let backend = Arc::clone(self.composition.backend());
        let vsync = !self.config.send_begin_frame;
        let (width, height) = match self.view.texture() {
            Some(texture) => (texture.width(), texture.height()),
            None => (self.composition.width(), self.composition.height()),
        };
        self.composition.resize(vsync, width, height);
        self.swap_chain.resize(&backend, width, height)?;

        let mut ctx = self.swap_chain.begin_frame(&backend, self.config.clear_color)?;
        self.composition.render(&mut ctx);
        self.swap_chain.present(&backend, ctx, vsync)?;
        self.frames += 1;

        if let Some(sink) = self.publish.as_mut() {
            if let Some(texture) = self.view.texture() {
                sink.publish(&texture);
            }
        }
        Ok(())
    }
}

impl<B: Backend, S: SwapChain<B>> fmt::Debug for Renderer<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("composition", &self.composition)
            .field("frames", &self.frames)
            .field("publishing", &self.publish.is_some())
            .finish_non_exhaustive()
    }
}

/// A [`Renderer`] running on its own thread.
///
/// The thread ticks and draws every frame interval, and draws (without
/// ticking) when a [`FrameRequester`] asks. A tick that comes due while
/// requests keep arriving still runs. [`stop`](Self::stop), or dropping the
/// loop, stops and joins the thread.
pub struct RenderLoop {
    commands: Sender<Command>,
    thread: Option<JoinHandle<u64>>,
}

impl RenderLoop {
    /// Starts `renderer` on a new thread named `layermix-render`.
    pub fn spawn<B, S>(mut renderer: Renderer<B, S>) -> io::Result<Self>
    where
        B: Backend,
        S: SwapChain<B> + 'static,
    {
        let (commands, receiver) = crossbeam_channel::unbounded();
        let interval = renderer.config.frame_interval.to_std();
        let thread = thread::Builder::new()
            .name("layermix-render".into())
            .spawn(move || run(&mut renderer, &receiver, interval))?;
        tracing::info!(?interval, "render loop started");
        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    /// A handle for requesting frames.
    pub fn requester(&self) -> FrameRequester {
        FrameRequester {
            commands: self.commands.clone(),
        }
    }

    /// Stops the loop and waits for the thread. Returns the number of
    /// frames presented.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        let _ = self.commands.send(Command::Stop);
        match thread.join() {
            Ok(frames) => {
                tracing::info!(frames, "render loop stopped");
                frames
            }
            Err(_) => {
                tracing::warn!("render thread panicked");
                0
            }
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLoop")
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

fn run<B, S>(
    renderer: &mut Renderer<B, S>,
    commands: &Receiver<Command>,
    interval: std::time::Duration,
) -> u64
where
    B: Backend,
    S: SwapChain<B>,
{
    let mut next_tick = Instant::now() + interval;
    loop {
        let tick = match commands.recv_deadline(next_tick) {
            Ok(Command::Frame) => {
                if drain_frame_requests(commands) {
                    break;
                }
                Instant::now() >= next_tick
            }
            Err(RecvTimeoutError::Timeout) => true,
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        };

        let result = if tick {
            next_tick = Instant::now() + interval;
            renderer.render_frame()
        } else {
            renderer.redraw()
        };
        if let Err(err) = result {
            tracing::warn!(%err, "frame failed");
        }
    }
    renderer.frames()
}

/// Coalesces queued frame requests. Returns `true` if a stop was queued.
fn drain_frame_requests(commands: &Receiver<Command>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Frame) => {}
            Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return true,
            Err(TryRecvError::Empty) => return false,
        }
    }
}
