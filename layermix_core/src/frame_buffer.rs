// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-producer frame delivery.
//!
//! A [`FrameBuffer`] bridges a producer that paints on its own thread to the
//! render thread. Producers deliver frames one of two ways:
//!
//! - **CPU paint** ([`on_paint`](FrameBuffer::on_paint)): pixels are copied
//!   into a staging buffer. The next [`swap`](FrameBuffer::swap) uploads the
//!   newest complete staging buffer to the texture, once.
//! - **GPU import** ([`on_gpu_paint`](FrameBuffer::on_gpu_paint)): a shared
//!   texture handle is opened and its texture becomes the front texture
//!   directly.
//!
//! The mode is whichever entry point was called last. Mixing both on one
//! buffer is a caller error.
//!
//! The internal mutex guards only pointers, dimensions and flags. Pixel
//! copies, texture creation, shared-handle opens and uploads all run with
//! the lock released, so a slow producer never stalls the render thread and
//! a slow upload never stalls the producer.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::{Backend, PixelFormat, SharedHandle, TextureInfo};
use crate::stats::FpsCounter;
use crate::time::Clock;

/// Identifies a [`FrameBuffer`] within its composition.
///
/// Displayed as `layermix_<n>`; publish sinks use it as a sender name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameBufferId(pub u64);

impl fmt::Display for FrameBufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layermix_{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Empty,
    Cpu,
    Shared(SharedHandle),
}

struct State<B: Backend> {
    mode: Mode,
    texture: Option<Arc<B::Texture>>,
    width: u32,
    height: u32,
    /// Last complete CPU frame; always `width * height * 4` bytes.
    front: Option<Arc<Vec<u8>>>,
    /// The buffer the producer fills next, when it could be recycled.
    spare: Vec<u8>,
    dirty: bool,
}

/// Double-buffered frame storage for one producer.
pub struct FrameBuffer<B: Backend> {
    id: FrameBufferId,
    backend: Arc<B>,
    format: PixelFormat,
    clock: Arc<dyn Clock>,
    state: Mutex<State<B>>,
    fps: Mutex<FpsCounter>,
    reallocations: AtomicU64,
    uploads: AtomicU64,
    imports: AtomicU64,
}

impl<B: Backend> FrameBuffer<B> {
    /// Creates an empty buffer. CPU frames are stored in `format`.
    ///
    /// Compositions create buffers through
    /// [`Composition::create_frame_buffer`](crate::composition::Composition::create_frame_buffer),
    /// which assigns ids.
    pub fn new(id: FrameBufferId, backend: Arc<B>, format: PixelFormat, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            backend,
            format,
            clock,
            state: Mutex::new(State {
                mode: Mode::Empty,
                texture: None,
                width: 0,
                height: 0,
                front: None,
                spare: Vec::new(),
                dirty: false,
            }),
            fps: Mutex::new(FpsCounter::new()),
            reallocations: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            imports: AtomicU64::new(0),
        }
    }

    /// Receives a CPU-painted frame: top-left origin, `width * 4` bytes per
    /// row.
    ///
    /// Reallocates the texture and staging buffers when the size changed
    /// (or the buffer was previously importing). Frames that are empty or
    /// shorter than `width * height * 4` bytes are dropped.
    pub fn on_paint(&self, pixels: &[u8], width: u32, height: u32) {
        let len = match PixelFormat::frame_len(width, height) {
            Some(len) if len > 0 && pixels.len() >= len => len,
            _ => {
                tracing::warn!(
                    buffer = %self.id,
                    width,
                    height,
                    bytes = pixels.len(),
                    "dropping malformed frame"
                );
                return;
            }
        };

        let (reuse, mut staging) = {
            let mut state = self.state.lock();
            let reuse = state.mode == Mode::Cpu
                && state.texture.is_some()
                && state.width == width
                && state.height == height;
            let staging = if reuse {
                core::mem::take(&mut state.spare)
            } else {
                Vec::new()
            };
            (reuse, staging)
        };

        let texture = if reuse {
            None
        } else {
            match self.backend.create_texture(width, height, self.format, None) {
                Ok(texture) => Some(Arc::new(texture)),
                Err(err) => {
                    tracing::warn!(buffer = %self.id, width, height, %err, "keeping previous frame");
                    return;
                }
            }
        };

        if staging.len() != len {
            staging = vec![0; len];
        }
        staging.copy_from_slice(&pixels[..len]);

        let (old_texture, old_front) = {
            let mut state = self.state.lock();
            let old_texture = match texture {
                Some(texture) => {
                    state.mode = Mode::Cpu;
                    state.width = width;
                    state.height = height;
                    state.texture.replace(texture)
                }
                None => None,
            };
            let old_front = state.front.replace(Arc::new(staging));
            state.dirty = true;
            (old_texture, old_front)
        };

        if !reuse {
            self.reallocations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(buffer = %self.id, width, height, "reallocated staging and texture");
        }

        // Recycle the previous front as the next spare when the render
        // thread is done with it.
        if let Some(recycled) = old_front
            .and_then(|front| Arc::try_unwrap(front).ok())
            .filter(|buf| buf.len() == len)
        {
            self.state.lock().spare = recycled;
        }
        drop(old_texture);

        self.record_frame(width, height);
    }

    /// Receives a frame as a shared texture handle.
    ///
    /// The handle is only opened when it differs from the current one. If
    /// opening fails the previous texture stays in place.
    pub fn on_gpu_paint(&self, handle: SharedHandle) {
        {
            let mut state = self.state.lock();
            if state.mode == Mode::Shared(handle) && state.texture.is_some() {
                state.dirty = true;
                let (width, height) = (state.width, state.height);
                drop(state);
                self.record_frame(width, height);
                return;
            }
        }

        let texture = match self.backend.open_shared_texture(handle) {
            Ok(texture) => Arc::new(texture),
            Err(err) => {
                tracing::warn!(buffer = %self.id, ?handle, %err, "could not open shared texture");
                return;
            }
        };
        let (width, height) = (texture.width(), texture.height());

        let (old_texture, old_front) = {
            let mut state = self.state.lock();
            state.mode = Mode::Shared(handle);
            state.width = width;
            state.height = height;
            state.dirty = true;
            state.spare = Vec::new();
            (state.texture.replace(texture), state.front.take())
        };
        drop((old_texture, old_front));

        self.imports.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(buffer = %self.id, ?handle, width, height, "opened shared texture");
        self.record_frame(width, height);
    }

    /// Returns the front texture, uploading the newest CPU frame first if
    /// one arrived since the last call.
    ///
    /// Safe to call every render tick: without a new frame it returns the
    /// same texture and does no work. Returns `None` before the first
    /// frame.
    pub fn swap(&self, ctx: &mut B::Context) -> Option<Arc<B::Texture>> {
        let (texture, pending) = {
            let mut state = self.state.lock();
            let texture = state.texture.clone()?;
            let pending = if state.dirty && state.mode == Mode::Cpu {
                state.front.clone()
            } else {
                None
            };
            state.dirty = false;
            (texture, pending)
        };

        if let Some(pixels) = pending {
            match self.backend.upload(ctx, &texture, &pixels) {
                Ok(()) => {
                    self.uploads.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    tracing::warn!(buffer = %self.id, %err, "upload failed");
                }
            }
        }
        Some(texture)
    }

    /// Returns the front texture without uploading.
    #[must_use]
    pub fn texture(&self) -> Option<Arc<B::Texture>> {
        self.state.lock().texture.clone()
    }

    /// This buffer's id.
    #[must_use]
    pub fn id(&self) -> FrameBufferId {
        self.id
    }

    /// Width of the current frame in pixels (zero before the first frame).
    #[must_use]
    pub fn width(&self) -> u32 {
        self.state.lock().width
    }

    /// Height of the current frame in pixels (zero before the first frame).
    #[must_use]
    pub fn height(&self) -> u32 {
        self.state.lock().height
    }

    /// Whether the current frame came from a shared texture.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self.state.lock().mode, Mode::Shared(_))
    }

    /// Whether a frame arrived since the last [`swap`](Self::swap).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Byte length of the staged CPU frame (zero in GPU mode).
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.state.lock().front.as_ref().map_or(0, |f| f.len())
    }

    /// Times the texture and staging buffers were reallocated for CPU
    /// frames.
    #[must_use]
    pub fn reallocations(&self) -> u64 {
        self.reallocations.load(Ordering::Relaxed)
    }

    /// CPU-to-texture uploads performed by [`swap`](Self::swap).
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Shared-handle opens.
    #[must_use]
    pub fn imports(&self) -> u64 {
        self.imports.load(Ordering::Relaxed)
    }

    /// Producer frame rate over the last closed one-second window.
    #[must_use]
    pub fn fps(&self) -> f64 {
        self.fps.lock().fps()
    }

    fn record_frame(&self, width: u32, height: u32) {
        let now = self.clock.now();
        if let Some(fps) = self.fps.lock().record(now) {
            tracing::debug!(buffer = %self.id, width, height, fps, "producer frame rate");
        }
    }
}

impl<B: Backend> fmt::Debug for FrameBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FrameBuffer")
            .field("id", &self.id)
            .field("mode", &state.mode)
            .field("width", &state.width)
            .field("height", &state.height)
            .field("dirty", &state.dirty)
            .finish_non_exhaustive()
    }
}
