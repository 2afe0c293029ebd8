// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for graphics integrations.
//!
//! The compositor core never talks to a graphics API directly. A *backend*
//! provides the following pieces:
//!
//! - **Textures**: created empty or from pixels, updated by CPU upload, or
//!   imported from a [`SharedHandle`] produced elsewhere. Textures report
//!   their size through [`TextureInfo`].
//!
//! - **Geometry and effects**: a textured quad built from normalized bounds
//!   (with an optional vertical flip) and the default effect that samples a
//!   texture onto it.
//!
//! - **Draw**: binds geometry, effect and texture for the duration of one
//!   draw call against a per-frame [`Backend::Context`].
//!
//! - **Swap chain**: implements [`SwapChain`] to hand out frame contexts
//!   and present them.
//!
//! - **Publish**: an optional [`PublishSink`] receives the main view's
//!   frame after each composed frame is presented.
//!
//! # Crate boundaries
//!
//! `layermix_core` owns the layer model, composition and this contract
//! module, plus a software [`HeadlessBackend`](crate::headless::HeadlessBackend).
//! GPU backend crates depend on `layermix_core` and implement [`Backend`].

use thiserror::Error;

use crate::geometry::Rect;

/// Byte layout of a 4-bytes-per-pixel texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Blue, green, red, alpha. What browser engines paint.
    #[default]
    Bgra8,
    /// Red, green, blue, alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel (always 4).
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Returns the byte length of a tightly packed `width` × `height` frame,
    /// or `None` on overflow.
    #[must_use]
    pub fn frame_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(Self::BYTES_PER_PIXEL)
    }
}

/// An opaque handle to a texture owned by another context.
///
/// Handles are only meaningful to the backend that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedHandle(pub u64);

/// A straight-alpha RGBA color with components in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Creates a color.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the color as RGBA bytes.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "components are clamped to 0..=255 before the cast"
    )]
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Size and layout of a backend texture.
pub trait TextureInfo {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Pixel layout.
    fn format(&self) -> PixelFormat;
}

/// A graphics backend the compositor renders through.
///
/// Methods take `&self`; backends synchronize internally. Every method may
/// be called from the render thread, and texture creation and shared-handle
/// import may also be called from producer threads.
pub trait Backend: Send + Sync + 'static {
    /// A GPU (or software) texture.
    type Texture: TextureInfo + Send + Sync + 'static;
    /// A textured quad positioned in normalized target space.
    type Geometry: Send + Sync + 'static;
    /// The shader state used to draw a quad.
    type Effect: Send + Sync + 'static;
    /// Per-frame drawing state handed out by a [`SwapChain`].
    type Context;

    /// Creates a `width` × `height` texture, optionally filled with
    /// `initial` (tightly packed, `width * 4` bytes per row).
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        initial: Option<&[u8]>,
    ) -> Result<Self::Texture, GpuError>;

    /// Opens a texture shared by another context.
    fn open_shared_texture(&self, handle: SharedHandle) -> Result<Self::Texture, GpuError>;

    /// Replaces the contents of `texture` with `pixels` (tightly packed).
    fn upload(
        &self,
        ctx: &mut Self::Context,
        texture: &Self::Texture,
        pixels: &[u8],
    ) -> Result<(), GpuError>;

    /// Builds a quad covering `bounds` (normalized), flipped vertically when
    /// `flip` is set.
    fn create_quad(&self, bounds: Rect, flip: bool) -> Result<Self::Geometry, GpuError>;

    /// Builds the default textured-quad effect.
    fn create_default_effect(&self) -> Result<Self::Effect, GpuError>;

    /// Binds `geometry`, `effect` and `texture`, draws once, then unbinds.
    fn draw(
        &self,
        ctx: &mut Self::Context,
        geometry: &Self::Geometry,
        effect: &Self::Effect,
        texture: &Self::Texture,
    ) -> Result<(), GpuError>;
}

/// The presentation surface a composed frame is drawn into.
pub trait SwapChain<B: Backend>: Send {
    /// Current width in pixels.
    fn width(&self) -> u32;

    /// Current height in pixels.
    fn height(&self) -> u32;

    /// Resizes the surface. A no-op when the size is unchanged.
    fn resize(&mut self, backend: &B, width: u32, height: u32) -> Result<(), GpuError>;

    /// Starts a frame cleared to `clear`.
    fn begin_frame(&mut self, backend: &B, clear: Color) -> Result<B::Context, GpuError>;

    /// Finishes and presents a frame started by
    /// [`begin_frame`](Self::begin_frame).
    fn present(&mut self, backend: &B, ctx: B::Context, vsync: bool) -> Result<(), GpuError>;
}

/// A one-way consumer of the main view's frames (for example a network
/// broadcaster). There is no acknowledgment.
pub trait PublishSink<B: Backend>: Send {
    /// Hands over the view's current texture once a composed frame has
    /// been presented. This is the producer's frame, not the composition.
    fn publish(&mut self, texture: &B::Texture);
}

/// Graphics failures.
///
/// None of these abort a render pass: the affected layer keeps its last good
/// frame. Startup failures are reported by backend crates separately.
#[derive(Debug, Error)]
pub enum GpuError {
    /// A texture could not be created.
    #[error("cannot create {width}x{height} texture: {reason}")]
    TextureCreation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Backend-specific reason.
        reason: String,
    },
    /// A shared handle did not resolve to a texture.
    #[error("cannot open shared texture {0:?}")]
    SharedHandle(SharedHandle),
    /// Pixel data does not match the texture size.
    #[error("upload of {actual} bytes does not match the {expected} bytes expected")]
    UploadSize {
        /// Bytes the texture needs.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// The device is gone.
    #[error("device lost: {0}")]
    DeviceLost(String),
    /// The presentation surface failed.
    #[error("surface error: {0}")]
    Surface(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_checks_overflow() {
        assert_eq!(PixelFormat::frame_len(2, 3), Some(24));
        assert_eq!(PixelFormat::frame_len(0, 3), Some(0));
        assert_eq!(
            PixelFormat::frame_len(u32::MAX, u32::MAX),
            (u32::MAX as usize)
                .checked_mul(u32::MAX as usize)
                .and_then(|n| n.checked_mul(4)),
            "overflow is reported as None on any pointer width"
        );
    }

    #[test]
    fn color_quantizes_and_clamps() {
        assert_eq!(Color::BLACK.to_rgba8(), [0, 0, 0, 255]);
        assert_eq!(Color::new(1.5, 0.5, -1.0, 1.0).to_rgba8(), [255, 128, 0, 255]);
    }

    #[test]
    fn errors_render_readably() {
        let e = GpuError::UploadSize {
            expected: 16,
            actual: 8,
        };
        assert_eq!(
            e.to_string(),
            "upload of 8 bytes does not match the 16 bytes expected"
        );
        assert_eq!(
            GpuError::SharedHandle(SharedHandle(7)).to_string(),
            "cannot open shared texture SharedHandle(7)"
        );
    }
}
