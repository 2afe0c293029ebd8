// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::HashMap;

use layermix_core::geometry::Rect;
use layermix_core::gpu::{Backend, Color, GpuError, PixelFormat, SharedHandle, TextureInfo};
use parking_lot::Mutex;

use crate::{StartupError, SurfaceSwapChain};
use crate::quad::{self, QUAD_VERTEX_COUNT, QuadVertex};

/// The wgpu format used for textures of `format`.
#[must_use]
pub const fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

/// A [`Backend`] drawing through a wgpu device.
///
/// Every texture gets its bind group when it is created, so a draw only
/// sets state. Shared handles resolve through an in-process table filled by
/// [`export_shared`](Self::export_shared); a producer that renders with the
/// same device exports its target once and then reports the handle on each
/// frame.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: PixelFormat,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipeline: wgpu::RenderPipeline,
    shared: Mutex<HashMap<SharedHandle, Shared>>,
    next_handle: AtomicU64,
}

struct Shared {
    texture: wgpu::Texture,
    format: PixelFormat,
}

impl WgpuBackend {
    /// Wraps an existing device. Frames are composed into `target`-format
    /// surfaces.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, target: PixelFormat) -> Self {
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!(%err, "uncaptured wgpu error");
        }));
        let bind_group_layout = quad::create_bind_group_layout(&device);
        let pipeline = quad::create_pipeline(&device, texture_format(target), &bind_group_layout);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("layermix frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            device,
            queue,
            target,
            bind_group_layout,
            sampler,
            pipeline,
            shared: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Creates a device on the default adapter, without a surface.
    pub fn headless(target: PixelFormat) -> Result<Self, StartupError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .ok_or(StartupError::NoAdapter)?;
        Self::from_adapter(&adapter, target)
    }

    /// Creates a device on `adapter`.
    pub fn from_adapter(adapter: &wgpu::Adapter, target: PixelFormat) -> Result<Self, StartupError> {
        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("layermix"),
                ..Default::default()
            },
            None,
        ))?;
        tracing::info!(adapter = %info.name, backend = ?info.backend, "wgpu device ready");
        Ok(Self::new(device, queue, target))
    }

    /// Creates a surface for `window`, a device on an adapter that can
    /// present to it, and a swap chain over the surface.
    pub fn with_window(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        target: PixelFormat,
    ) -> Result<(Self, SurfaceSwapChain), StartupError> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: Some(&surface),
            ..Default::default()
        }))
        .ok_or(StartupError::NoAdapter)?;
        let backend = Self::from_adapter(&adapter, target)?;
        let swap_chain = SurfaceSwapChain::new(&backend, &adapter, surface, width, height)?;
        Ok((backend, swap_chain))
    }

    /// The device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Layout of composed frames.
    pub fn target(&self) -> PixelFormat {
        self.target
    }

    /// Makes `texture` openable through the returned handle.
    pub fn export_shared(&self, texture: &WgpuTexture) -> SharedHandle {
        let handle = SharedHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.shared.lock().insert(
            handle,
            Shared {
                texture: texture.texture.clone(),
                format: texture.format,
            },
        );
        tracing::debug!(?handle, "texture exported");
        handle
    }

    /// Invalidates `handle`. Textures already opened through it stay valid.
    pub fn revoke_shared(&self, handle: SharedHandle) -> bool {
        self.shared.lock().remove(&handle).is_some()
    }

    fn wrap(&self, texture: wgpu::Texture, format: PixelFormat) -> WgpuTexture {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("layermix frame bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        WgpuTexture {
            texture,
            view,
            bind_group,
            format,
        }
    }

    fn write(&self, texture: &wgpu::Texture, pixels: &[u8]) -> Result<(), GpuError> {
        let expected = PixelFormat::frame_len(texture.width(), texture.height()).unwrap_or(usize::MAX);
        if pixels.len() != expected {
            return Err(GpuError::UploadSize {
                expected,
                actual: pixels.len(),
            });
        }
        self.queue.write_texture(
            texture.as_image_copy(),
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(texture.width() * 4),
                rows_per_image: Some(texture.height()),
            },
            texture.size(),
        );
        Ok(())
    }
}

impl fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("target", &self.target)
            .field("shared", &self.shared.lock().len())
            .finish_non_exhaustive()
    }
}

/// A sampled texture with its bind group.
pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    format: PixelFormat,
}

impl WgpuTexture {
    /// The underlying texture.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// A view of the whole texture.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl TextureInfo for WgpuTexture {
    fn width(&self) -> u32 {
        self.texture.width()
    }

    fn height(&self) -> u32 {
        self.texture.height()
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}

impl fmt::Debug for WgpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuTexture")
            .field("width", &self.texture.width())
            .field("height", &self.texture.height())
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// A quad's vertex buffer.
#[derive(Debug)]
pub struct WgpuQuad {
    buffer: wgpu::Buffer,
    bounds: Rect,
    flip: bool,
}

impl WgpuQuad {
    /// The normalized bounds the quad covers.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Whether texture rows are sampled bottom-up.
    pub fn flip(&self) -> bool {
        self.flip
    }
}

/// The textured-quad pipeline.
#[derive(Debug)]
pub struct WgpuEffect {
    pipeline: wgpu::RenderPipeline,
}

/// A frame being recorded: an encoder with one open render pass.
pub struct WgpuContext {
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
    frame: Option<wgpu::SurfaceTexture>,
    width: u32,
    height: u32,
}

impl WgpuContext {
    /// Opens a pass over `target`, cleared to `clear`. `frame` is the
    /// surface texture to present afterwards, if any.
    pub(crate) fn begin(
        device: &wgpu::Device,
        target: &wgpu::TextureView,
        clear: Color,
        (width, height): (u32, u32),
        frame: Option<wgpu::SurfaceTexture>,
    ) -> Self {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("layermix frame encoder"),
        });
        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("layermix composition pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear.r),
                            g: f64::from(clear.g),
                            b: f64::from(clear.b),
                            a: f64::from(clear.a),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        Self {
            encoder,
            pass: Some(pass),
            frame,
            width,
            height,
        }
    }

    /// Target width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Ends the pass and returns the recorded commands.
    pub(crate) fn finish(self) -> (wgpu::CommandBuffer, Option<wgpu::SurfaceTexture>) {
        let Self {
            encoder,
            pass,
            frame,
            ..
        } = self;
        drop(pass);
        (encoder.finish(), frame)
    }
}

impl fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuContext")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("surface", &self.frame.is_some())
            .finish_non_exhaustive()
    }
}

impl Backend for WgpuBackend {
    type Texture = WgpuTexture;
    type Geometry = WgpuQuad;
    type Effect = WgpuEffect;
    type Context = WgpuContext;

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        initial: Option<&[u8]>,
    ) -> Result<WgpuTexture, GpuError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(GpuError::TextureCreation {
                width,
                height,
                reason: format!("dimensions must be within 1..={max}"),
            });
        }
        if let Some(pixels) = initial {
            let expected = PixelFormat::frame_len(width, height).unwrap_or(usize::MAX);
            if pixels.len() != expected {
                return Err(GpuError::UploadSize {
                    expected,
                    actual: pixels.len(),
                });
            }
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("layermix frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        if let Some(pixels) = initial {
            self.write(&texture, pixels)?;
        }
        Ok(self.wrap(texture, format))
    }

    fn open_shared_texture(&self, handle: SharedHandle) -> Result<WgpuTexture, GpuError> {
        let (texture, format) = {
            let shared = self.shared.lock();
            let entry = shared.get(&handle).ok_or(GpuError::SharedHandle(handle))?;
            (entry.texture.clone(), entry.format)
        };
        Ok(self.wrap(texture, format))
    }

    fn upload(
        &self,
        _ctx: &mut WgpuContext,
        texture: &WgpuTexture,
        pixels: &[u8],
    ) -> Result<(), GpuError> {
        // Queue writes land before the frame's command buffer on submit.
        self.write(&texture.texture, pixels)
    }

    fn create_quad(&self, bounds: Rect, flip: bool) -> Result<WgpuQuad, GpuError> {
        let vertices = quad::quad_vertices(bounds, flip);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("layermix quad"),
            size: size_of::<[QuadVertex; 6]>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&buffer, 0, bytemuck::cast_slice(&vertices));
        Ok(WgpuQuad {
            buffer,
            bounds,
            flip,
        })
    }

    fn create_default_effect(&self) -> Result<WgpuEffect, GpuError> {
        Ok(WgpuEffect {
            pipeline: self.pipeline.clone(),
        })
    }

    fn draw(
        &self,
        ctx: &mut WgpuContext,
        geometry: &WgpuQuad,
        effect: &WgpuEffect,
        texture: &WgpuTexture,
    ) -> Result<(), GpuError> {
        let Some(pass) = ctx.pass.as_mut() else {
            return Err(GpuError::Surface("draw after the frame ended".into()));
        };
        pass.set_pipeline(&effect.pipeline);
        pass.set_bind_group(0, &texture.bind_group, &[]);
        pass.set_vertex_buffer(0, geometry.buffer.slice(..));
        pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        Ok(())
    }
}
