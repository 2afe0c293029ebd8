// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! wgpu backend for layermix.
//!
//! [`WgpuBackend`] implements [`Backend`](layermix_core::gpu::Backend) on a
//! wgpu device: textures are sampled `Bgra8Unorm`/`Rgba8Unorm` textures,
//! CPU frames are uploaded with queue writes, layers are drawn as
//! alpha-blended textured quads, and shared handles resolve through an
//! in-process table (see [`WgpuBackend::export_shared`]).
//!
//! Two swap chains are provided:
//!
//! - [`SurfaceSwapChain`] presents to a window surface, switching between
//!   vsync and immediate presentation per frame.
//! - [`OffscreenSwapChain`] composes into a texture that can be published or
//!   sampled elsewhere.
//!
//! # Startup
//!
//! ```no_run
//! use layermix_backend_wgpu::WgpuBackend;
//! use layermix_core::gpu::PixelFormat;
//!
//! let backend = WgpuBackend::headless(PixelFormat::Bgra8)?;
//! # Ok::<(), layermix_backend_wgpu::StartupError>(())
//! ```
//!
//! Failing to start is fatal: there is no degraded mode. Every later
//! failure is a [`GpuError`](layermix_core::gpu::GpuError) that the
//! compositor absorbs.

mod backend;
mod quad;
mod swap_chain;

pub use backend::{WgpuBackend, WgpuContext, WgpuEffect, WgpuQuad, WgpuTexture, texture_format};
pub use swap_chain::{OffscreenSwapChain, SurfaceSwapChain};

use thiserror::Error;

/// Why the backend could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    /// No adapter matched the request.
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    /// The adapter refused to create a device.
    #[error("cannot create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// The window surface could not be created.
    #[error("cannot create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    /// The surface cannot present the composition's format.
    #[error("surface does not support {0:?}")]
    UnsupportedSurfaceFormat(wgpu::TextureFormat),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_render_readably() {
        assert_eq!(StartupError::NoAdapter.to_string(), "no suitable GPU adapter found");
        assert_eq!(
            StartupError::UnsupportedSurfaceFormat(wgpu::TextureFormat::Bgra8Unorm).to_string(),
            "surface does not support Bgra8Unorm"
        );
    }
}
