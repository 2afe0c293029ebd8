// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software backend.
//!
//! [`HeadlessBackend`] implements [`Backend`] entirely on the CPU. Textures
//! are pixel stores, quads are rectangles, and draws rasterize with nearest
//! sampling and source-over blending into a [`HeadlessTarget`]. It serves
//! hosts without a GPU and gives tests something exact to assert against:
//! every operation is counted.
//!
//! Shared handles are issued by [`HeadlessBackend::export_shared`]. Opening
//! one yields a new texture object that aliases the exported pixels, which
//! is how a real cross-context import behaves.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::geometry::Rect;
use crate::gpu::{Backend, Color, GpuError, PixelFormat, SharedHandle, SwapChain, TextureInfo};

type PixelStore = Arc<Mutex<Vec<u8>>>;

#[derive(Clone, Debug)]
struct Exported {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: PixelStore,
}

/// A [`Backend`] that renders in software.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_texture: AtomicU64,
    next_handle: AtomicU64,
    exported: Mutex<HashMap<SharedHandle, Exported>>,
    fail_texture_creation: AtomicBool,
    textures_created: AtomicU64,
    shared_opens: AtomicU64,
    uploads: AtomicU64,
    quads_created: AtomicU64,
    effects_created: AtomicU64,
    draw_calls: AtomicU64,
}

impl HeadlessBackend {
    /// Creates a backend with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `texture` openable through the returned handle.
    pub fn export_shared(&self, texture: &HeadlessTexture) -> SharedHandle {
        let handle = SharedHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.exported.lock().insert(
            handle,
            Exported {
                width: texture.width,
                height: texture.height,
                format: texture.format,
                pixels: Arc::clone(&texture.pixels),
            },
        );
        handle
    }

    /// Invalidates `handle`; later opens fail.
    pub fn revoke_shared(&self, handle: SharedHandle) -> bool {
        self.exported.lock().remove(&handle).is_some()
    }

    /// Makes every subsequent [`create_texture`](Backend::create_texture)
    /// fail while `fail` is set.
    pub fn set_fail_texture_creation(&self, fail: bool) {
        self.fail_texture_creation.store(fail, Ordering::Relaxed);
    }

    /// Textures created through [`Backend::create_texture`].
    #[must_use]
    pub fn textures_created(&self) -> u64 {
        self.textures_created.load(Ordering::Relaxed)
    }

    /// Successful shared-handle opens.
    #[must_use]
    pub fn shared_opens(&self) -> u64 {
        self.shared_opens.load(Ordering::Relaxed)
    }

    /// CPU uploads performed.
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Quads built.
    #[must_use]
    pub fn quads_created(&self) -> u64 {
        self.quads_created.load(Ordering::Relaxed)
    }

    /// Effects built.
    #[must_use]
    pub fn effects_created(&self) -> u64 {
        self.effects_created.load(Ordering::Relaxed)
    }

    /// Draw calls issued.
    #[must_use]
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.next_texture.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A CPU-resident texture.
#[derive(Debug)]
pub struct HeadlessTexture {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: PixelStore,
}

impl HeadlessTexture {
    /// Unique id of this texture object. Imports of the same shared texture
    /// get distinct ids.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns a copy of the raw pixels, in this texture's format.
    #[must_use]
    pub fn pixels(&self) -> Vec<u8> {
        self.pixels.lock().clone()
    }

    /// Returns the pixel at `(x, y)` as RGBA, or `None` outside the texture.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let pixels = self.pixels.lock();
        Some(read_rgba(&pixels, self.width, self.format, x, y))
    }
}

impl TextureInfo for HeadlessTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}

/// A quad: normalized bounds plus a flip flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeadlessQuad {
    /// Normalized placement.
    pub bounds: Rect,
    /// Whether texture rows are sampled bottom-up.
    pub flip: bool,
}

/// The textured-quad effect. Carries no state in software.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessEffect;

/// An RGBA render target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessTarget {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl HeadlessTarget {
    /// Creates a target filled with `clear`.
    #[must_use]
    pub fn new(width: u32, height: u32, clear: Color) -> Self {
        let rgba = clear.to_rgba8();
        let len = PixelFormat::frame_len(width, height).unwrap_or(0);
        let mut pixels = Vec::with_capacity(len);
        for _ in 0..len / PixelFormat::BYTES_PER_PIXEL {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA pixel rows, top first.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the pixel at `(x, y)`, or `None` outside the target.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(read_rgba(&self.pixels, self.width, PixelFormat::Rgba8, x, y))
    }
}

/// Per-frame drawing state: the target being composed.
#[derive(Debug)]
pub struct HeadlessContext {
    target: HeadlessTarget,
    draws: u32,
}

impl HeadlessContext {
    /// Creates a context over a fresh target filled with `clear`.
    #[must_use]
    pub fn new(width: u32, height: u32, clear: Color) -> Self {
        Self {
            target: HeadlessTarget::new(width, height, clear),
            draws: 0,
        }
    }

    /// The target as drawn so far.
    #[must_use]
    pub fn target(&self) -> &HeadlessTarget {
        &self.target
    }

    /// Draws issued against this context.
    #[must_use]
    pub fn draws(&self) -> u32 {
        self.draws
    }

    /// Finishes the context, returning its target.
    #[must_use]
    pub fn into_target(self) -> HeadlessTarget {
        self.target
    }
}

impl Backend for HeadlessBackend {
    type Texture = HeadlessTexture;
    type Geometry = HeadlessQuad;
    type Effect = HeadlessEffect;
    type Context = HeadlessContext;

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        initial: Option<&[u8]>,
    ) -> Result<HeadlessTexture, GpuError> {
        let failed = |reason: &str| GpuError::TextureCreation {
            width,
            height,
            reason: reason.into(),
        };
        if self.fail_texture_creation.load(Ordering::Relaxed) {
            return Err(failed("creation disabled"));
        }
        if width == 0 || height == 0 {
            return Err(failed("zero-sized texture"));
        }
        let len = PixelFormat::frame_len(width, height).ok_or_else(|| failed("too large"))?;
        let pixels = match initial {
            Some(data) if data.len() != len => {
                return Err(GpuError::UploadSize {
                    expected: len,
                    actual: data.len(),
                });
            }
            Some(data) => data.to_vec(),
            None => vec![0; len],
        };
        self.textures_created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessTexture {
            id: self.next_id(),
            width,
            height,
            format,
            pixels: Arc::new(Mutex::new(pixels)),
        })
    }

    fn open_shared_texture(&self, handle: SharedHandle) -> Result<HeadlessTexture, GpuError> {
        let exported = self
            .exported
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(GpuError::SharedHandle(handle))?;
        self.shared_opens.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessTexture {
            id: self.next_id(),
            width: exported.width,
            height: exported.height,
            format: exported.format,
            pixels: exported.pixels,
        })
    }

    fn upload(
        &self,
        _ctx: &mut HeadlessContext,
        texture: &HeadlessTexture,
        pixels: &[u8],
    ) -> Result<(), GpuError> {
        let mut store = texture.pixels.lock();
        if store.len() != pixels.len() {
            return Err(GpuError::UploadSize {
                expected: store.len(),
                actual: pixels.len(),
            });
        }
        store.copy_from_slice(pixels);
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_quad(&self, bounds: Rect, flip: bool) -> Result<HeadlessQuad, GpuError> {
        self.quads_created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessQuad { bounds, flip })
    }

    fn create_default_effect(&self) -> Result<HeadlessEffect, GpuError> {
        self.effects_created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessEffect)
    }

    fn draw(
        &self,
        ctx: &mut HeadlessContext,
        geometry: &HeadlessQuad,
        _effect: &HeadlessEffect,
        texture: &HeadlessTexture,
    ) -> Result<(), GpuError> {
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
        ctx.draws += 1;
        let source = texture.pixels.lock();
        rasterize(&mut ctx.target, geometry, texture, &source);
        Ok(())
    }
}

/// Nearest-sample `texture` over the pixels `quad` covers, blending
/// source-over.
fn rasterize(target: &mut HeadlessTarget, quad: &HeadlessQuad, texture: &HeadlessTexture, source: &[u8]) {
    let dest = quad.bounds.to_pixels(target.width, target.height);
    if dest.width <= 0 || dest.height <= 0 || texture.width == 0 || texture.height == 0 {
        return;
    }
    let x0 = dest.x.max(0);
    let y0 = dest.y.max(0);
    let x1 = dest
        .x
        .saturating_add(dest.width)
        .min(i32::try_from(target.width).unwrap_or(i32::MAX));
    let y1 = dest
        .y
        .saturating_add(dest.height)
        .min(i32::try_from(target.height).unwrap_or(i32::MAX));

    for y in y0..y1 {
        let v = sample_index(span_offset(y, dest.y), dest.height, texture.height);
        let v = if quad.flip { texture.height - 1 - v } else { v };
        for x in x0..x1 {
            let u = sample_index(span_offset(x, dest.x), dest.width, texture.width);
            let src = read_rgba(source, texture.width, texture.format, u, v);
            let offset = pixel_offset(target.width, x.unsigned_abs(), y.unsigned_abs());
            let dst = &mut target.pixels[offset..offset + 4];
            blend_over(dst, src);
        }
    }
}

/// Distance from `start` to `at`, which lies at or after it.
fn span_offset(at: i32, start: i32) -> u64 {
    (i64::from(at) - i64::from(start)).unsigned_abs()
}

/// Maps destination offset `d` in a span of `span` pixels onto `len` texels.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the result is below `len`, which is a u32"
)]
fn sample_index(d: u64, span: i32, len: u32) -> u32 {
    let span = u64::from(span.unsigned_abs());
    ((d * u64::from(len)) / span).min(u64::from(len) - 1) as u32
}

fn pixel_offset(width: u32, x: u32, y: u32) -> usize {
    (y as usize * width as usize + x as usize) * PixelFormat::BYTES_PER_PIXEL
}

fn read_rgba(pixels: &[u8], width: u32, format: PixelFormat, x: u32, y: u32) -> [u8; 4] {
    let o = pixel_offset(width, x, y);
    let p = [pixels[o], pixels[o + 1], pixels[o + 2], pixels[o + 3]];
    match format {
        PixelFormat::Rgba8 => p,
        PixelFormat::Bgra8 => [p[2], p[1], p[0], p[3]],
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "a weighted mean of two bytes fits in a byte"
)]
fn blend_over(dst: &mut [u8], src: [u8; 4]) {
    match src[3] {
        255 => dst.copy_from_slice(&src),
        0 => {}
        a => {
            let a = u32::from(a);
            for (d, s) in dst.iter_mut().zip(src).take(3) {
                *d = ((u32::from(s) * a + u32::from(*d) * (255 - a)) / 255) as u8;
            }
            dst[3] = (a + u32::from(dst[3]) * (255 - a) / 255) as u8;
        }
    }
}

/// Shared record of frames a [`HeadlessSwapChain`] presented.
#[derive(Clone, Debug, Default)]
pub struct PresentedFrames {
    inner: Arc<Mutex<PresentedInner>>,
}

#[derive(Debug, Default)]
struct PresentedInner {
    count: u64,
    last: Option<HeadlessTarget>,
    last_vsync: bool,
}

impl PresentedFrames {
    /// Frames presented so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    /// The most recent frame.
    #[must_use]
    pub fn last(&self) -> Option<HeadlessTarget> {
        self.inner.lock().last.clone()
    }

    /// Whether the most recent frame was presented with vsync.
    #[must_use]
    pub fn last_vsync(&self) -> bool {
        self.inner.lock().last_vsync
    }
}

/// A [`SwapChain`] that keeps presented frames in memory.
#[derive(Debug)]
pub struct HeadlessSwapChain {
    width: u32,
    height: u32,
    presented: PresentedFrames,
}

impl HeadlessSwapChain {
    /// Creates a swap chain of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            presented: PresentedFrames::default(),
        }
    }

    /// A handle to the presented frames that stays valid after the swap
    /// chain moves to a render thread.
    #[must_use]
    pub fn frames(&self) -> PresentedFrames {
        self.presented.clone()
    }
}

impl SwapChain<HeadlessBackend> for HeadlessSwapChain {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, _backend: &HeadlessBackend, width: u32, height: u32) -> Result<(), GpuError> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn begin_frame(&mut self, _backend: &HeadlessBackend, clear: Color) -> Result<HeadlessContext, GpuError> {
        Ok(HeadlessContext::new(self.width, self.height, clear))
    }

    fn present(&mut self, _backend: &HeadlessBackend, ctx: HeadlessContext, vsync: bool) -> Result<(), GpuError> {
        let mut inner = self.presented.inner.lock();
        inner.count += 1;
        inner.last = Some(ctx.into_target());
        inner.last_vsync = vsync;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn solid(backend: &HeadlessBackend, w: u32, h: u32, rgba: [u8; 4]) -> HeadlessTexture {
        let pixels: Vec<u8> = rgba.iter().copied().cycle().take((w * h * 4) as usize).collect();
        backend
            .create_texture(w, h, PixelFormat::Rgba8, Some(&pixels))
            .unwrap()
    }

    #[test]
    fn draw_covers_truncated_pixel_bounds() {
        let backend = HeadlessBackend::new();
        let tex = solid(&backend, 2, 2, RED);
        let quad = backend.create_quad(Rect::new(0.25, 0.25, 0.5, 0.5), false).unwrap();
        let effect = backend.create_default_effect().unwrap();
        let mut ctx = HeadlessContext::new(8, 8, Color::BLACK);

        backend.draw(&mut ctx, &quad, &effect, &tex).unwrap();

        let target = ctx.target();
        assert_eq!(target.pixel(2, 2), Some(RED), "top-left of the quad");
        assert_eq!(target.pixel(5, 5), Some(RED), "bottom-right of the quad");
        assert_eq!(target.pixel(6, 6), Some([0, 0, 0, 255]), "outside stays clear");
        assert_eq!(target.pixel(1, 2), Some([0, 0, 0, 255]), "left of the quad");
        assert_eq!(backend.draw_calls(), 1);
    }

    #[test]
    fn huge_quad_is_clipped_to_the_target() {
        let backend = HeadlessBackend::new();
        let tex = solid(&backend, 2, 2, RED);
        let quad = backend.create_quad(Rect::new(0.5, 0.0, 1e9, 1.0), false).unwrap();
        let mut ctx = HeadlessContext::new(4, 4, Color::BLACK);

        backend.draw(&mut ctx, &quad, &HeadlessEffect, &tex).unwrap();

        let target = ctx.target();
        assert_eq!(target.pixel(1, 0), Some([0, 0, 0, 255]), "left of the quad");
        assert_eq!(target.pixel(2, 0), Some(RED), "quad starts at its origin");
        assert_eq!(target.pixel(3, 3), Some(RED), "runs to the target edge");
    }

    #[test]
    fn flip_samples_rows_bottom_up() {
        let backend = HeadlessBackend::new();
        // Top row red, bottom row blue.
        let mut pixels = Vec::new();
        pixels.extend_from_slice(&RED);
        pixels.extend_from_slice(&BLUE);
        let tex = backend
            .create_texture(1, 2, PixelFormat::Rgba8, Some(&pixels))
            .unwrap();
        let effect = HeadlessEffect;

        let mut upright = HeadlessContext::new(1, 2, Color::BLACK);
        let quad = backend.create_quad(Rect::FULL, false).unwrap();
        backend.draw(&mut upright, &quad, &effect, &tex).unwrap();
        assert_eq!(upright.target().pixel(0, 0), Some(RED));

        let mut flipped = HeadlessContext::new(1, 2, Color::BLACK);
        let quad = backend.create_quad(Rect::FULL, true).unwrap();
        backend.draw(&mut flipped, &quad, &effect, &tex).unwrap();
        assert_eq!(flipped.target().pixel(0, 0), Some(BLUE), "rows swapped");
        assert_eq!(flipped.target().pixel(0, 1), Some(RED), "rows swapped");
    }

    #[test]
    fn bgra_is_swizzled_on_read() {
        let backend = HeadlessBackend::new();
        let tex = backend
            .create_texture(1, 1, PixelFormat::Bgra8, Some(&[255, 0, 0, 255]))
            .unwrap();
        assert_eq!(tex.pixel(0, 0), Some(BLUE), "BGRA blue reads as RGBA blue");
    }

    #[test]
    fn shared_handle_aliases_pixels() {
        let backend = HeadlessBackend::new();
        let tex = solid(&backend, 1, 1, RED);
        let handle = backend.export_shared(&tex);

        let opened = backend.open_shared_texture(handle).unwrap();
        assert_ne!(opened.id(), tex.id(), "a new texture object");
        let mut ctx = HeadlessContext::new(1, 1, Color::BLACK);
        backend.upload(&mut ctx, &tex, &BLUE).unwrap();
        assert_eq!(opened.pixel(0, 0), Some(BLUE), "writes are visible through the import");

        assert!(backend.revoke_shared(handle));
        assert!(matches!(
            backend.open_shared_texture(handle),
            Err(GpuError::SharedHandle(h)) if h == handle
        ));
    }

    #[test]
    fn upload_rejects_wrong_size() {
        let backend = HeadlessBackend::new();
        let tex = solid(&backend, 2, 1, RED);
        let mut ctx = HeadlessContext::new(1, 1, Color::BLACK);
        assert!(matches!(
            backend.upload(&mut ctx, &tex, &[0; 4]),
            Err(GpuError::UploadSize {
                expected: 8,
                actual: 4
            })
        ));
        assert_eq!(backend.uploads(), 0, "failed upload is not counted");
    }

    #[test]
    fn texture_creation_can_fail() {
        let backend = HeadlessBackend::new();
        assert!(backend.create_texture(0, 4, PixelFormat::Rgba8, None).is_err());
        backend.set_fail_texture_creation(true);
        assert!(backend.create_texture(4, 4, PixelFormat::Rgba8, None).is_err());
        assert_eq!(backend.textures_created(), 0);
    }

    #[test]
    fn half_alpha_blends() {
        let mut dst = [0, 0, 0, 255];
        blend_over(&mut dst, [255, 255, 255, 128]);
        assert_eq!(dst[0], 128, "mid grey");
        assert_eq!(dst[3], 255, "opaque stays opaque");
    }

    #[test]
    fn swap_chain_records_presents() {
        let backend = HeadlessBackend::new();
        let mut chain = HeadlessSwapChain::new(2, 2);
        let frames = chain.frames();
        chain.resize(&backend, 3, 1).unwrap();
        let ctx = chain.begin_frame(&backend, Color::new(0.0, 1.0, 0.0, 1.0)).unwrap();
        chain.present(&backend, ctx, true).unwrap();

        assert_eq!(frames.count(), 1);
        assert!(frames.last_vsync());
        let last = frames.last().unwrap();
        assert_eq!((last.width(), last.height()), (3, 1));
        assert_eq!(last.pixel(2, 0), Some([0, 255, 0, 255]));
    }
}
