// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The unified GPU backend.
//!
//! Everything the device sees goes through a [`GpuDriver`]: uploads are
//! staged in one growable transfer buffer and copied by the device, frames
//! are recorded as command lists and submitted at [`Renderer::flip`], and
//! resources that may still be in use are parked in a [`FrameRing`] until
//! the fence of the frame that retired them has signalled.

use super::driver::{
    BufferHandle, BufferUsage, DrawCall, DrawUniforms, GpuCommand, GpuDriver, GpuFence,
    LightBlock, Pipeline, TextureHandle, MAX_GPU_LIGHTS,
};
use crate::graphics::common::{blit_readback, eye_position, TexturePixels};
use crate::graphics::SamplerDesc;
use anyhow::Context;
use relic_core::math::{FColor, Mat4, Plane};
use relic_core::object::Object;
use relic_core::renderer::api::ui::{
    content_rect, create_2d_transform, expand_dst_rect, orthographic_projection, scissor_rect,
    ui_quad_vertices, UI_QUAD_INDICES,
};
use relic_core::renderer::{
    Appearance, BackendKind, CacheKey, DrawParams, FrameRing, FrameStats, GroupGeometry, Lookup,
    Rect, RenderError, Renderer, RendererConfig, ResourceCache, ResourceError, SceneLight,
    ViewportTransform,
};
use relic_core::scene::{Mesh, Surface, Texture};
use std::time::Duration;

/// Initial size of the upload staging buffer.
pub const INITIAL_TRANSFER_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy)]
struct GpuTexture {
    handle: TextureHandle,
    width: u32,
    height: u32,
    bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct GpuMesh {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    vertex_count: u32,
    bytes: u64,
}

/// A resource waiting for its frame fence before release.
#[derive(Debug)]
enum Retired {
    Texture(GpuTexture),
    Mesh(GpuMesh),
}

impl Retired {
    fn bytes(&self) -> u64 {
        match self {
            Retired::Texture(t) => t.bytes,
            Retired::Mesh(m) => m.bytes,
        }
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn backend_error(err: anyhow::Error) -> ResourceError {
    ResourceError::BackendError(format!("{err:#}"))
}

/// A [`Renderer`] for devices with a command/transfer-buffer API.
pub struct GpuRenderer<D: GpuDriver> {
    driver: D,
    name: String,
    width: u32,
    height: u32,
    transform: ViewportTransform,
    projection: Mat4,
    lights: Vec<SceneLight>,

    textures: ResourceCache<GpuTexture>,
    meshes: ResourceCache<GpuMesh>,
    ring: FrameRing<GpuFence, Retired>,

    transfer: BufferHandle,
    transfer_size: u64,
    upload_fence: Option<GpuFence>,
    white_texture: TextureHandle,
    ui_quad: GpuMesh,

    commands: Vec<GpuCommand>,
    pass_open: bool,
    pending_clear: Option<[f32; 4]>,
    pipeline: Option<Pipeline>,
    transparent: bool,
    dither: bool,
    anisotropy: f32,
    timeout: Duration,
    stats: FrameStats,
}

impl<D: GpuDriver> GpuRenderer<D> {
    /// Creates the renderer, its render targets and the built-in resources.
    pub fn new(
        mut driver: D,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "zero-sized render target");
        driver
            .resize_targets(width, height)
            .context("failed to create render targets")?;
        let transfer = driver
            .create_buffer(BufferUsage::Transfer, INITIAL_TRANSFER_SIZE)
            .context("failed to create the transfer buffer")?;

        // White texel, then the UI quad, packed into one staging write.
        let quad = ui_quad_vertices();
        let quad_vertices: &[u8] = bytemuck::cast_slice(&quad);
        let quad_indices: &[u8] = bytemuck::cast_slice(&UI_QUAD_INDICES);
        let vertex_offset = 4usize;
        let index_offset = align4(vertex_offset + quad_vertices.len());
        let mut staging = vec![255u8; 4];
        staging.extend_from_slice(quad_vertices);
        staging.resize(index_offset, 0);
        staging.extend_from_slice(quad_indices);
        driver.write_transfer(transfer, 0, &staging)?;

        let white_texture = driver.create_texture(1, 1, SamplerDesc::for_texture(false, 1.0, 1.0))?;
        let ui_quad = GpuMesh {
            vertex_buffer: driver.create_buffer(BufferUsage::Vertex, quad_vertices.len() as u64)?,
            index_buffer: driver.create_buffer(BufferUsage::Index, quad_indices.len() as u64)?,
            index_count: UI_QUAD_INDICES.len() as u32,
            vertex_count: quad.len() as u32,
            bytes: 0,
        };
        let upload_fence = driver.submit(vec![
            GpuCommand::CopyBufferToTexture {
                src: transfer,
                src_offset: 0,
                dst: white_texture,
            },
            GpuCommand::CopyBufferToBuffer {
                src: transfer,
                src_offset: vertex_offset as u64,
                dst: ui_quad.vertex_buffer,
                size: quad_vertices.len() as u64,
            },
            GpuCommand::CopyBufferToBuffer {
                src: transfer,
                src_offset: index_offset as u64,
                dst: ui_quad.index_buffer,
                size: quad_indices.len() as u64,
            },
        ]);

        let name = format!("Unified GPU ({})", driver.name());
        log::info!(
            "{name}: {width}x{height}, {} frames in flight, {}x MSAA",
            config.buffer_count,
            driver.sample_count()
        );
        if driver.sample_count() != config.msaa_samples {
            log::warn!(
                "{name}: {}x MSAA requested, running at {}x",
                config.msaa_samples,
                driver.sample_count()
            );
        }
        Ok(Self {
            driver,
            name,
            width,
            height,
            transform: ViewportTransform::fit(
                width,
                height,
                config.virtual_width,
                config.virtual_height,
            ),
            projection: Mat4::IDENTITY,
            lights: Vec::new(),
            textures: ResourceCache::new("gpu texture"),
            meshes: ResourceCache::new("gpu mesh"),
            ring: FrameRing::new(config.buffer_count as usize, "gpu"),
            transfer,
            transfer_size: INITIAL_TRANSFER_SIZE,
            upload_fence: Some(upload_fence),
            white_texture,
            ui_quad,
            commands: vec![GpuCommand::SetDither(config.dither)],
            pass_open: false,
            pending_clear: None,
            pipeline: None,
            transparent: false,
            dither: config.dither,
            anisotropy: config.anisotropy,
            timeout: config.fence_timeout(),
            stats: FrameStats::default(),
        })
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Current size of the upload staging buffer.
    pub fn transfer_capacity(&self) -> u64 {
        self.transfer_size
    }

    /// Writes `data` at the start of the transfer buffer, growing it first
    /// when it is too small. Waits for the previous upload to be consumed.
    fn stage(&mut self, data: &[u8]) -> anyhow::Result<()> {
        if let Some(fence) = self.upload_fence.take() {
            anyhow::ensure!(
                self.driver.wait(fence, self.timeout),
                "timed out waiting for the previous upload"
            );
        }
        let needed = data.len() as u64;
        if needed > self.transfer_size {
            let size = needed.next_power_of_two();
            let buffer = self.driver.create_buffer(BufferUsage::Transfer, size)?;
            self.driver.destroy_buffer(self.transfer);
            log::debug!(
                "{}: transfer buffer grew from {} to {size} bytes",
                self.name,
                self.transfer_size
            );
            self.transfer = buffer;
            self.transfer_size = size;
        }
        self.driver.write_transfer(self.transfer, 0, data)
    }

    fn submit_upload(&mut self, commands: Vec<GpuCommand>) {
        self.upload_fence = Some(self.driver.submit(commands));
    }

    fn upload_texture(
        &mut self,
        pixels: &TexturePixels,
        sampler: SamplerDesc,
    ) -> anyhow::Result<GpuTexture> {
        self.stage(&pixels.rgba)?;
        let handle = self
            .driver
            .create_texture(pixels.width, pixels.height, sampler)?;
        self.submit_upload(vec![GpuCommand::CopyBufferToTexture {
            src: self.transfer,
            src_offset: 0,
            dst: handle,
        }]);
        self.stats.texture_uploads += 1;
        self.stats.resident_bytes += pixels.byte_len();
        Ok(GpuTexture {
            handle,
            width: pixels.width,
            height: pixels.height,
            bytes: pixels.byte_len(),
        })
    }

    fn upload_mesh(&mut self, geometry: &GroupGeometry) -> anyhow::Result<GpuMesh> {
        let vertices: &[u8] = bytemuck::cast_slice(&geometry.vertices);
        let indices: &[u8] = bytemuck::cast_slice(&geometry.indices);
        let index_offset = align4(vertices.len());
        let mut staging = Vec::with_capacity(index_offset + indices.len());
        staging.extend_from_slice(vertices);
        staging.resize(index_offset, 0);
        staging.extend_from_slice(indices);
        self.stage(&staging)?;

        let vertex_buffer = self
            .driver
            .create_buffer(BufferUsage::Vertex, align4(vertices.len()).max(4) as u64)?;
        let index_buffer = match self
            .driver
            .create_buffer(BufferUsage::Index, align4(indices.len()).max(4) as u64)
        {
            Ok(buffer) => buffer,
            Err(err) => {
                self.driver.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };

        let mut copies = Vec::with_capacity(2);
        if !vertices.is_empty() {
            copies.push(GpuCommand::CopyBufferToBuffer {
                src: self.transfer,
                src_offset: 0,
                dst: vertex_buffer,
                size: vertices.len() as u64,
            });
        }
        if !indices.is_empty() {
            copies.push(GpuCommand::CopyBufferToBuffer {
                src: self.transfer,
                src_offset: index_offset as u64,
                dst: index_buffer,
                size: indices.len() as u64,
            });
        }
        self.submit_upload(copies);

        let bytes = (vertices.len() + indices.len()) as u64;
        self.stats.mesh_uploads += 1;
        self.stats.resident_bytes += bytes;
        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: geometry.indices.len() as u32,
            vertex_count: geometry.vertices.len() as u32,
            bytes,
        })
    }

    fn release(&mut self, retired: Retired) {
        self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(retired.bytes());
        match retired {
            Retired::Texture(texture) => self.driver.destroy_texture(texture.handle),
            Retired::Mesh(mesh) => {
                self.driver.destroy_buffer(mesh.vertex_buffer);
                self.driver.destroy_buffer(mesh.index_buffer);
            }
        }
    }

    fn retire_evicted(&mut self) {
        let textures = self.textures.take_retired().into_iter().map(Retired::Texture);
        let meshes = self.meshes.take_retired().into_iter().map(Retired::Mesh);
        let retired: Vec<Retired> = textures.chain(meshes).collect();
        if !retired.is_empty() {
            log::debug!("{}: {} evicted resource(s) deferred", self.name, retired.len());
        }
        self.ring.defer_all(retired);
    }

    fn ensure_pass(&mut self) {
        if !self.pass_open {
            self.commands.push(GpuCommand::BeginPass {
                clear: self.pending_clear.take(),
            });
            self.pass_open = true;
            self.pipeline = None;
        }
    }

    fn close_pass(&mut self) {
        if self.pass_open {
            self.commands.push(GpuCommand::EndPass);
            self.pass_open = false;
        }
    }

    fn bind_pipeline(&mut self, pipeline: Pipeline) {
        if self.pipeline != Some(pipeline) {
            self.commands.push(GpuCommand::SetPipeline(pipeline));
            self.pipeline = Some(pipeline);
        }
    }

    /// Submits pending commands and waits until the device is idle.
    fn flush(&mut self) {
        self.close_pass();
        if let Some(fence) = self.upload_fence.take() {
            self.driver.wait(fence, self.timeout);
        }
        if !self.commands.is_empty() {
            let fence = self.driver.submit(std::mem::take(&mut self.commands));
            if !self.driver.wait(fence, self.timeout) {
                log::warn!("{}: flush timed out", self.name);
            }
        }
    }
}

impl<D: GpuDriver> Renderer for GpuRenderer<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::UnifiedGpu
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn push_lights(&mut self, lights: &[SceneLight]) {
        self.lights.clear();
        self.lights.extend_from_slice(lights);
    }

    fn set_projection(&mut self, projection: &Mat4, _front: f32, _back: f32) {
        self.projection = *projection;
    }

    fn set_frustum_planes(&mut self, _planes: &[Plane; 6]) {}

    fn get_texture_id(
        &mut self,
        texture: &Texture,
        is_ui: bool,
        scale_x: f32,
        scale_y: f32,
    ) -> Result<u32, ResourceError> {
        let key = CacheKey::new(texture.id(), 0);
        let version = texture.version();
        let lookup = self.textures.lookup(key, version);
        if let Lookup::Hit(id) = lookup {
            return Ok(id);
        }
        let pixels = TexturePixels::from_texture(texture)?;
        let sampler =
            SamplerDesc::for_texture(is_ui, scale_x, scale_y).with_anisotropy(self.anisotropy);
        let uploaded = self.upload_texture(&pixels, sampler).map_err(backend_error)?;
        match lookup {
            Lookup::Stale(id) => {
                if let Some(old) = self.textures.replace(id, version, uploaded) {
                    self.ring.defer(Retired::Texture(old));
                }
                Ok(id)
            }
            _ => {
                let id = self.textures.insert(key, version, uploaded);
                self.textures.watch(texture, id);
                Ok(id)
            }
        }
    }

    fn get_mesh_id(&mut self, mesh: &Mesh, group: usize) -> Result<u32, ResourceError> {
        let key = CacheKey::new(mesh.id(), group);
        let (version, geometry) = {
            let g = mesh.group(group).ok_or(ResourceError::NotFound)?;
            match self.meshes.lookup(key, g.version) {
                Lookup::Hit(id) => return Ok(id),
                _ => (g.version, GroupGeometry::from_group(&g)?),
            }
        };
        let uploaded = self.upload_mesh(&geometry).map_err(backend_error)?;
        match self.meshes.lookup(key, version) {
            Lookup::Stale(id) => {
                if let Some(old) = self.meshes.replace(id, version, uploaded) {
                    self.ring.defer(Retired::Mesh(old));
                }
                Ok(id)
            }
            _ => {
                let id = self.meshes.insert(key, version, uploaded);
                self.meshes.watch(mesh, id);
                Ok(id)
            }
        }
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.stats.draw_calls = 0;
        self.stats.skipped_draws = 0;
        self.stats.triangles = 0;
        if self.lights.len() > MAX_GPU_LIGHTS {
            log::error!(
                "{}: {} lights in the scene, only the first {MAX_GPU_LIGHTS} are used",
                self.name,
                self.lights.len()
            );
        }
        self.transparent = false;
        self.ensure_pass();
        self.commands
            .push(GpuCommand::BindLights(LightBlock::new(&self.lights)));
        Ok(())
    }

    fn enable_transparency(&mut self) {
        self.transparent = true;
    }

    fn submit_draw(&mut self, mesh_id: u32, params: &DrawParams, appearance: &Appearance) {
        let Some(mesh) = self.meshes.get(mesh_id).copied() else {
            self.stats.skipped_draws += 1;
            return;
        };
        let texture = appearance
            .is_textured()
            .then(|| self.textures.get(appearance.texture_id).map(|t| t.handle))
            .flatten();
        let uniforms = DrawUniforms::scene(
            params.model_view * self.projection,
            params.world,
            &params.normal_matrix,
            FColor::from(appearance.color).to_array(),
            eye_position(&params.view).to_array(),
            appearance.shininess,
            texture.is_some(),
            appearance.flat,
        );
        self.ensure_pass();
        self.bind_pipeline(if self.transparent {
            Pipeline::Transparent
        } else {
            Pipeline::Opaque
        });
        self.commands.push(GpuCommand::Draw(DrawCall {
            vertex_buffer: mesh.vertex_buffer,
            index_buffer: mesh.index_buffer,
            index_count: mesh.index_count,
            texture: texture.unwrap_or(self.white_texture),
            uniforms,
        }));
        self.stats.draw_calls += 1;
        self.stats.triangles += mesh.index_count / 3;
        self.stats.last_draw_vertex_count = mesh.vertex_count;
    }

    fn finalize_frame(&mut self) -> Result<(), RenderError> {
        self.transparent = false;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, transform: ViewportTransform) {
        if width == 0 || height == 0 {
            log::warn!("{}: ignoring resize to {width}x{height}", self.name);
            return;
        }
        self.flush();
        if let Err(err) = self.driver.resize_targets(width, height) {
            log::error!("{}: failed to resize render targets: {err:#}", self.name);
            return;
        }
        self.width = width;
        self.height = height;
        self.transform = transform;
        log::debug!("{}: resized to {width}x{height}", self.name);
    }

    fn clear(&mut self, r: f32, g: f32, b: f32) {
        self.close_pass();
        self.pending_clear = Some([r, g, b, 1.0]);
    }

    fn flip(&mut self) -> Result<(), RenderError> {
        self.retire_evicted();
        if self.pending_clear.is_some() {
            self.ensure_pass();
        }
        self.close_pass();
        self.commands.push(GpuCommand::Present);
        let fence = self.driver.submit(std::mem::take(&mut self.commands));
        self.ring.set_fence(fence);
        self.ring.advance();
        self.stats.frame_number += 1;

        if let Some(fence) = self.ring.take_fence() {
            if !self.driver.wait(fence, self.timeout) {
                log::error!(
                    "{}: frame fence {fence:?} not signalled within {:?}",
                    self.name,
                    self.timeout
                );
                return Err(RenderError::DeviceLost);
            }
        }
        for retired in self.ring.take_deletions() {
            self.release(retired);
        }
        Ok(())
    }

    fn draw_2d_image(&mut self, texture_id: u32, src: Rect, dst: Rect, color: FColor) {
        let Some(texture) = self.textures.get(texture_id).copied() else {
            log::warn!("{}: 2D draw with unknown texture {texture_id}", self.name);
            self.stats.skipped_draws += 1;
            return;
        };
        let expanded = expand_dst_rect(src, dst, texture.width, texture.height);
        let mvp = create_2d_transform(expanded, self.transform)
            * orthographic_projection(self.width, self.height);
        self.ensure_pass();
        self.bind_pipeline(Pipeline::Ui);
        self.commands.extend([
            GpuCommand::SetScissor(Some(scissor_rect(dst, self.transform))),
            GpuCommand::Draw(DrawCall {
                vertex_buffer: self.ui_quad.vertex_buffer,
                index_buffer: self.ui_quad.index_buffer,
                index_count: self.ui_quad.index_count,
                texture: texture.handle,
                uniforms: DrawUniforms::ui(mvp, color.to_array()),
            }),
            GpuCommand::SetScissor(None),
        ]);
        self.stats.draw_calls += 1;
        self.stats.triangles += 2;
    }

    fn download(&mut self, target: &mut Surface) -> Result<(), RenderError> {
        let rect = content_rect(self.width, self.height, self.transform);
        if rect.w <= 0 || rect.h <= 0 {
            return Err(RenderError::RenderingFailed("empty content area".to_string()));
        }
        let (w, h) = (rect.w as u32, rect.h as u32);
        let len = w as usize * h as usize * 4;
        let buffer = self
            .driver
            .create_buffer(BufferUsage::Transfer, len as u64)
            .map_err(|err| RenderError::ResourceError(backend_error(err)))?;
        let fence = self
            .driver
            .submit(vec![GpuCommand::CopyPresentToBuffer { rect, dst: buffer }]);
        let result = if self.driver.wait(fence, self.timeout) {
            self.driver
                .read_transfer(buffer, 0, len)
                .map_err(|err| RenderError::ResourceError(backend_error(err)))
        } else {
            Err(RenderError::DeviceLost)
        };
        self.driver.destroy_buffer(buffer);
        blit_readback(target, &result?, w, h);
        Ok(())
    }

    fn set_dither(&mut self, dither: bool) {
        if self.dither != dither {
            self.dither = dither;
            self.commands.push(GpuCommand::SetDither(dither));
        }
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}

impl<D: GpuDriver> Drop for GpuRenderer<D> {
    fn drop(&mut self) {
        let (fences, mut deletions) = self.ring.drain();
        let last = fences.into_iter().chain(self.upload_fence.take()).max();
        if let Some(fence) = last {
            if !self.driver.wait(fence, self.timeout) {
                log::warn!("{}: releasing resources with work still pending", self.name);
            }
        }
        deletions.extend(self.textures.drain().into_iter().map(Retired::Texture));
        deletions.extend(self.meshes.drain().into_iter().map(Retired::Mesh));
        deletions.push(Retired::Mesh(self.ui_quad));
        for retired in deletions {
            self.release(retired);
        }
        self.driver.destroy_texture(self.white_texture);
        self.driver.destroy_buffer(self.transfer);
        log::debug!("{}: released", self.name);
    }
}

impl<D: GpuDriver> std::fmt::Debug for GpuRenderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuRenderer")
            .field("name", &self.name)
            .field("size", &(self.width, self.height))
            .field("frame", &self.stats.frame_number)
            .field("resident_bytes", &self.stats.resident_bytes)
            .finish_non_exhaustive()
    }
}
