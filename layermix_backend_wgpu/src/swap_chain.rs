// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

use layermix_core::gpu::{Backend, Color, GpuError, SwapChain, TextureInfo};

use crate::StartupError;
use crate::backend::{WgpuBackend, WgpuContext, WgpuTexture, texture_format};

const fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

/// A [`SwapChain`] over a window surface.
///
/// Vsync follows the `vsync` flag of each present; a change takes effect
/// from the next frame.
pub struct SurfaceSwapChain {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfaceSwapChain {
    /// Configures `surface` for `backend`'s target format.
    ///
    /// Fails if the surface cannot present that format on `adapter`.
    pub fn new(
        backend: &WgpuBackend,
        adapter: &wgpu::Adapter,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, StartupError> {
        let format = texture_format(backend.target());
        let caps = surface.get_capabilities(adapter);
        if !caps.formats.contains(&format) {
            return Err(StartupError::UnsupportedSurfaceFormat(format));
        }
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: present_mode(true),
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(backend.device(), &config);
        tracing::info!(width = config.width, height = config.height, ?format, "surface configured");
        Ok(Self { surface, config })
    }

    /// The surface.
    pub fn surface(&self) -> &wgpu::Surface<'static> {
        &self.surface
    }

    fn acquire(&self, backend: &WgpuBackend) -> Result<wgpu::SurfaceTexture, GpuError> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface outdated; reconfiguring");
                self.surface.configure(backend.device(), &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|err| GpuError::Surface(err.to_string()))
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(GpuError::DeviceLost("out of memory acquiring a frame".into()))
            }
            Err(err) => Err(GpuError::Surface(err.to_string())),
        }
    }
}

impl fmt::Debug for SurfaceSwapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceSwapChain")
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("present_mode", &self.config.present_mode)
            .finish_non_exhaustive()
    }
}

impl SwapChain<WgpuBackend> for SurfaceSwapChain {
    fn width(&self) -> u32 {
        self.config.width
    }

    fn height(&self) -> u32 {
        self.config.height
    }

    fn resize(&mut self, backend: &WgpuBackend, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            tracing::debug!(width, height, "ignoring empty surface size");
            return Ok(());
        }
        if (width, height) == (self.config.width, self.config.height) {
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(backend.device(), &self.config);
        tracing::debug!(width, height, "surface resized");
        Ok(())
    }

    fn begin_frame(&mut self, backend: &WgpuBackend, clear: Color) -> Result<WgpuContext, GpuError> {
        let frame = self.acquire(backend)?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuContext::begin(
            backend.device(),
            &view,
            clear,
            (self.config.width, self.config.height),
            Some(frame),
        ))
    }

    fn present(&mut self, backend: &WgpuBackend, ctx: WgpuContext, vsync: bool) -> Result<(), GpuError> {
        let (commands, frame) = ctx.finish();
        backend.queue().submit(Some(commands));
        if let Some(frame) = frame {
            frame.present();
        }
        let mode = present_mode(vsync);
        if mode != self.config.present_mode {
            self.config.present_mode = mode;
            self.surface.configure(backend.device(), &self.config);
            tracing::debug!(vsync, "present mode changed");
        }
        Ok(())
    }
}

/// A [`SwapChain`] rendering into a texture, for hosts that publish or
/// read back the composed frame instead of showing it.
pub struct OffscreenSwapChain {
    target: WgpuTexture,
    presented: u64,
}

impl OffscreenSwapChain {
    /// Creates a `width` × `height` target in `backend`'s target format.
    pub fn new(backend: &WgpuBackend, width: u32, height: u32) -> Result<Self, GpuError> {
        Ok(Self {
            target: backend.create_texture(width, height, backend.target(), None)?,
            presented: 0,
        })
    }

    /// The texture frames are composed into.
    pub fn target(&self) -> &WgpuTexture {
        &self.target
    }

    /// Frames presented.
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl fmt::Debug for OffscreenSwapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffscreenSwapChain")
            .field("target", &self.target)
            .field("presented", &self.presented)
            .finish()
    }
}

impl SwapChain<WgpuBackend> for OffscreenSwapChain {
    fn width(&self) -> u32 {
        self.target.width()
    }

    fn height(&self) -> u32 {
        self.target.height()
    }

    fn resize(&mut self, backend: &WgpuBackend, width: u32, height: u32) -> Result<(), GpuError> {
        if (width, height) == (self.width(), self.height()) {
            return Ok(());
        }
        self.target = backend.create_texture(width, height, backend.target(), None)?;
        tracing::debug!(width, height, "offscreen target resized");
        Ok(())
    }

    fn begin_frame(&mut self, backend: &WgpuBackend, clear: Color) -> Result<WgpuContext, GpuError> {
        Ok(WgpuContext::begin(
            backend.device(),
            self.target.view(),
            clear,
            (self.width(), self.height()),
            None,
        ))
    }

    fn present(&mut self, backend: &WgpuBackend, ctx: WgpuContext, _vsync: bool) -> Result<(), GpuError> {
        let (commands, _) = ctx.finish();
        backend.queue().submit(Some(commands));
        self.presented += 1;
        Ok(())
    }
}
