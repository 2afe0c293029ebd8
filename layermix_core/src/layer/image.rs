// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use std::sync::Arc;

use super::{Layer, LayerCore};
use crate::gpu::{Backend, GpuError, PixelFormat};

/// A layer showing a texture that never changes.
///
/// Decoding image files is up to the host; this layer takes pixels or a
/// ready texture.
pub struct ImageLayer<B: Backend> {
    core: LayerCore<B>,
    texture: Arc<B::Texture>,
}

impl<B: Backend> ImageLayer<B> {
    /// Wraps an existing texture.
    pub fn new(backend: Arc<B>, texture: Arc<B::Texture>) -> Self {
        Self {
            core: LayerCore::new(backend, false, false),
            texture,
        }
    }

    /// Uploads `pixels` (tightly packed, top row first) into a new texture.
    pub fn from_pixels(
        backend: Arc<B>,
        width: u32,
        height: u32,
        pixels: &[u8],
        format: PixelFormat,
    ) -> Result<Self, GpuError> {
        let texture = backend.create_texture(width, height, format, Some(pixels))?;
        tracing::info!(width, height, "image layer created");
        Ok(Self::new(backend, Arc::new(texture)))
    }

    /// The texture drawn by this layer.
    pub fn texture(&self) -> &Arc<B::Texture> {
        &self.texture
    }
}

impl<B: Backend> Layer<B> for ImageLayer<B> {
    fn core(&self) -> &LayerCore<B> {
        &self.core
    }

    fn render(&self, ctx: &mut B::Context) {
        self.core.render_texture(ctx, Some(&*self.texture));
    }
}

impl<B: Backend> fmt::Debug for ImageLayer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLayer")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::gpu::Color;
    use crate::headless::{HeadlessBackend, HeadlessContext};

    #[test]
    fn draws_its_pixels_at_its_bounds() {
        let backend = Arc::new(HeadlessBackend::new());
        let layer = ImageLayer::from_pixels(
            Arc::clone(&backend),
            1,
            1,
            &[0, 255, 0, 255],
            PixelFormat::Rgba8,
        )
        .unwrap();
        layer.move_to(Rect::new(0.5, 0.0, 0.5, 1.0));
        assert!(!layer.want_input());

        let mut ctx = HeadlessContext::new(4, 2, Color::BLACK);
        layer.render(&mut ctx);
        layer.tick(crate::time::Duration::SECOND);
        layer.render(&mut ctx);

        assert_eq!(ctx.target().pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(ctx.target().pixel(3, 1), Some([0, 255, 0, 255]));
        assert_eq!(backend.textures_created(), 1, "texture created once");
        assert_eq!(backend.uploads(), 0, "static content is never re-uploaded");
    }

    #[test]
    fn wrong_pixel_count_fails() {
        let backend = Arc::new(HeadlessBackend::new());
        let err = ImageLayer::from_pixels(backend, 2, 2, &[0; 4], PixelFormat::Rgba8).unwrap_err();
        assert!(matches!(err, GpuError::UploadSize { expected: 16, actual: 4 }));
    }
}
