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

//! The tile GPU backend.
//!
//! Device memory is allocated and freed explicitly. Each frame is one scene;
//! closing it arms a vertex and a fragment notification. Vertex-side memory
//! (the 2D quad buffer) is double buffered on the vertex notifications,
//! fragment-side memory (light blocks, freed textures and meshes) is triple
//! buffered on the fragment notifications.

use super::driver::{
    FragmentProgram, MemoryBlock, MemorySpan, Notification, PlaneVertex, SceneUniforms, TileDraw,
    TileDriver, TileLight, TileLightBlock, TileTexture, TileTextureFormat, FRAGMENT_BUFFER_COUNT,
    MAX_TILE_LIGHTS, PALETTE_ALIGNMENT, VERTEX_BUFFER_COUNT,
};
use crate::graphics::common::{blit_readback, eye_position};
use crate::graphics::SamplerDesc;
use anyhow::Context;
use relic_core::math::{FColor, Mat4, Plane, Vec3};
use relic_core::object::Object;
use relic_core::renderer::api::ui::content_rect;
use relic_core::renderer::{
    Appearance, BackendKind, CacheKey, DrawParams, FrameRing, FrameStats, GroupGeometry, Lookup,
    Rect, RenderError, Renderer, RendererConfig, ResourceCache, ResourceError, SceneLight,
    ViewportTransform, NO_TEXTURE_ID,
};
use relic_core::scene::{Mesh, PixelFormat, Surface, Texture};
use std::time::Duration;

/// 2D quads available per frame before the quad buffer wraps.
pub const QUADS_PER_FRAME: usize = 50;

const QUAD_BYTES: usize = std::mem::size_of::<PlaneVertex>() * 4;
const LIGHT_BLOCK_BYTES: usize = std::mem::size_of::<TileLightBlock>();

#[derive(Debug, Clone, Copy)]
struct CachedTexture {
    texture: TileTexture,
    bytes: u64,
    /// Fragment notification of the last frame that sampled it.
    last_used: Option<Notification>,
}

#[derive(Debug, Clone, Copy)]
struct CachedMesh {
    block: MemoryBlock,
    vertex_count: u32,
    index_offset: usize,
    index_count: u32,
    bytes: u64,
}

/// Memory waiting for a fragment notification before it is freed.
#[derive(Debug, Clone, Copy)]
struct Allocation {
    block: MemoryBlock,
    bytes: u64,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn backend_error(err: anyhow::Error) -> ResourceError {
    ResourceError::BackendError(format!("{err:#}"))
}

/// Texture bytes in device layout: RGBA texels, or indices followed by the
/// palette at its aligned offset.
fn texture_data(surface: &Surface, format: TileTextureFormat, size: usize) -> Vec<u8> {
    match format {
        TileTextureFormat::Rgba8 => surface.to_rgba8(),
        TileTextureFormat::Paletted8 { palette_offset } => {
            let mut data = surface.pixels().to_vec();
            data.resize(palette_offset, 0);
            data.extend_from_slice(bytemuck::cast_slice(surface.palette()));
            data.resize(size, 0);
            data
        }
    }
}

/// Packs scene lights into the fragment light block. Returns the block and
/// how many non-ambient lights did not fit.
fn pack_lights(lights: &[SceneLight]) -> (TileLightBlock, usize) {
    let mut block = TileLightBlock::default();
    let mut ambient = Vec3::ZERO;
    let mut packed = 0;
    let mut dropped = 0;
    for light in lights {
        if light.is_ambient() {
            ambient += light.rgb();
            continue;
        }
        if packed == MAX_TILE_LIGHTS {
            dropped += 1;
            continue;
        }
        let (vector, is_directional) = if light.is_directional() {
            (light.direction(), 1.0)
        } else {
            (light.position(), 0.0)
        };
        block.lights[packed] = TileLight {
            color: light.rgb().extend(1.0).to_array(),
            vector: vector.extend(0.0).to_array(),
            is_directional,
            _align: [0.0; 3],
        };
        packed += 1;
    }
    block.ambient = ambient.extend(1.0).to_array();
    (block, dropped)
}

/// A [`Renderer`] for tile-based devices with explicit memory management.
pub struct TileRenderer<D: TileDriver> {
    driver: D,
    name: String,
    width: u32,
    height: u32,
    transform: ViewportTransform,
    projection: Mat4,
    lights: Vec<SceneLight>,

    textures: ResourceCache<CachedTexture>,
    meshes: ResourceCache<CachedMesh>,
    ring: FrameRing<Notification, Allocation>,

    vertex_index: usize,
    vertex_pending: [Option<Notification>; VERTEX_BUFFER_COUNT],
    vertex_values: [u32; VERTEX_BUFFER_COUNT],
    fragment_values: [u32; FRAGMENT_BUFFER_COUNT],

    light_memory: MemoryBlock,
    quad_memory: [MemoryBlock; VERTEX_BUFFER_COUNT],
    quad_count: usize,

    scene_open: bool,
    cleared: bool,
    transparent: bool,
    dither: bool,
    timeout: Duration,
    stats: FrameStats,
}

impl<D: TileDriver> TileRenderer<D> {
    /// Creates the renderer and its per-frame memory.
    pub fn new(
        mut driver: D,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "zero-sized display");
        driver
            .resize_display(width, height)
            .context("failed to create display buffers")?;
        let light_memory = driver
            .alloc(LIGHT_BLOCK_BYTES * FRAGMENT_BUFFER_COUNT, 16)
            .context("failed to allocate light blocks")?;
        let quad_memory = [
            driver.alloc(QUAD_BYTES * QUADS_PER_FRAME, 16)?,
            driver.alloc(QUAD_BYTES * QUADS_PER_FRAME, 16)?,
        ];
        driver.set_dither(config.dither);

        let name = format!("Tile GPU ({})", driver.name());
        log::info!(
            "{name}: {width}x{height}, {VERTEX_BUFFER_COUNT} vertex / {FRAGMENT_BUFFER_COUNT} fragment buffers"
        );
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
            textures: ResourceCache::new("tile texture"),
            meshes: ResourceCache::new("tile mesh"),
            ring: FrameRing::new(FRAGMENT_BUFFER_COUNT, "tile"),
            vertex_index: 0,
            vertex_pending: [None; VERTEX_BUFFER_COUNT],
            vertex_values: [0; VERTEX_BUFFER_COUNT],
            fragment_values: [0; FRAGMENT_BUFFER_COUNT],
            light_memory,
            quad_memory,
            quad_count: 0,
            scene_open: false,
            cleared: false,
            transparent: false,
            dither: config.dither,
            timeout: config.fence_timeout(),
            stats: FrameStats::default(),
        })
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The fragment notification the open frame will signal.
    fn pending_fragment(&self) -> Notification {
        let index = self.ring.current_index();
        Notification {
            slot: (VERTEX_BUFFER_COUNT + index) as u32,
            value: self.fragment_values[index].wrapping_add(1),
        }
    }

    fn light_span(&self) -> MemorySpan {
        MemorySpan {
            block: self.light_memory,
            offset: self.ring.current_index() * LIGHT_BLOCK_BYTES,
        }
    }

    fn start_scene(&mut self) {
        if !self.scene_open {
            self.driver.begin_scene();
            self.scene_open = true;
        }
    }

    fn alloc(&mut self, size: usize, alignment: usize) -> Result<MemoryBlock, ResourceError> {
        self.driver.alloc(size, alignment).map_err(|err| {
            log::warn!("{}: {err:#}", self.name);
            ResourceError::OutOfMemory
        })
    }

    fn upload(&mut self, size: usize, alignment: usize, parts: &[(usize, &[u8])]) -> Result<MemoryBlock, ResourceError> {
        let block = self.alloc(size, alignment)?;
        for &(offset, data) in parts.iter().filter(|(_, d)| !d.is_empty()) {
            if let Err(err) = self.driver.write(block, offset, data) {
                self.driver.free(block);
                return Err(backend_error(err));
            }
        }
        Ok(block)
    }

    fn upload_texture(
        &mut self,
        data: &[u8],
        format: TileTextureFormat,
        (width, height): (u32, u32),
        sampler: SamplerDesc,
    ) -> Result<CachedTexture, ResourceError> {
        let block = self.upload(data.len(), PALETTE_ALIGNMENT, &[(0, data)])?;
        let bytes = data.len() as u64;
        self.stats.texture_uploads += 1;
        self.stats.resident_bytes += bytes;
        log::debug!("{}: uploaded {width}x{height} texture ({bytes} bytes)", self.name);
        Ok(CachedTexture {
            texture: TileTexture {
                data: block,
                width,
                height,
                format,
                sampler,
            },
            bytes,
            last_used: None,
        })
    }

    fn upload_mesh(&mut self, geometry: &GroupGeometry) -> Result<CachedMesh, ResourceError> {
        let vertices: &[u8] = bytemuck::cast_slice(&geometry.vertices);
        let indices: &[u8] = bytemuck::cast_slice(&geometry.indices);
        let index_offset = align4(vertices.len());
        let size = (index_offset + indices.len()).max(4);
        let block = self.upload(size, 16, &[(0, vertices), (index_offset, indices)])?;
        self.stats.mesh_uploads += 1;
        self.stats.resident_bytes += size as u64;
        Ok(CachedMesh {
            block,
            vertex_count: geometry.vertices.len() as u32,
            index_offset,
            index_count: geometry.indices.len() as u32,
            bytes: size as u64,
        })
    }

    fn release(&mut self, allocation: Allocation) {
        self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(allocation.bytes);
        self.driver.free(allocation.block);
    }

    fn retire_evicted(&mut self) {
        let textures = self.textures.take_retired().into_iter().map(|t| Allocation {
            block: t.texture.data,
            bytes: t.bytes,
        });
        let meshes = self.meshes.take_retired().into_iter().map(|m| Allocation {
            block: m.block,
            bytes: m.bytes,
        });
        let retired: Vec<Allocation> = textures.chain(meshes).collect();
        if !retired.is_empty() {
            log::debug!("{}: {} evicted allocation(s) deferred", self.name, retired.len());
        }
        self.ring.defer_all(retired);
    }

    /// Waits for every notification issued so far.
    fn wait_idle(&mut self) -> bool {
        let vertex = (0..VERTEX_BUFFER_COUNT).map(|i| (i, self.vertex_values[i]));
        let fragment =
            (0..FRAGMENT_BUFFER_COUNT).map(|i| (VERTEX_BUFFER_COUNT + i, self.fragment_values[i]));
        let issued: Vec<Notification> = vertex
            .chain(fragment)
            .filter(|&(_, value)| value > 0)
            .map(|(slot, value)| Notification {
                slot: slot as u32,
                value,
            })
            .collect();
        issued
            .into_iter()
            .all(|n| self.driver.wait(n, self.timeout))
    }

    /// Rewrites a cached texture in place once the device is done with it.
    fn rewrite_texture(
        &mut self,
        id: u32,
        entry: CachedTexture,
        data: &[u8],
        sampler: SamplerDesc,
        version: u32,
    ) -> Result<(), ResourceError> {
        if let Some(notification) = entry.last_used {
            if !self.driver.wait(notification, self.timeout) {
                return Err(ResourceError::BackendError(
                    "texture still in use by the device".to_string(),
                ));
            }
        }
        self.driver
            .write(entry.texture.data, 0, data)
            .map_err(backend_error)?;
        if let Some(cached) = self.textures.get_mut(id) {
            cached.texture.sampler = sampler;
            cached.last_used = None;
        }
        self.textures.set_version(id, version);
        self.stats.texture_uploads += 1;
        log::debug!("{}: texture {id} rewritten in place", self.name);
        Ok(())
    }
}

impl<D: TileDriver> Renderer for TileRenderer<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::TileGpu
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

        let surface = texture.surface();
        let (width, height) = (surface.width(), surface.height());
        if width == 0 || height == 0 {
            return Err(ResourceError::UnsupportedFormat(
                "zero-sized texture".to_string(),
            ));
        }
        let paletted = surface.format() == PixelFormat::Indexed8;
        let (format, size) = TileTextureFormat::layout(paletted, width, height);
        let data = texture_data(&surface, format, size);
        drop(surface);
        let sampler = SamplerDesc::for_texture(is_ui, scale_x, scale_y);

        match lookup {
            Lookup::Stale(id) => {
                let entry = *self.textures.get(id).ok_or(ResourceError::InvalidHandle)?;
                let same_layout = entry.texture.width == width
                    && entry.texture.height == height
                    && entry.texture.format == format;
                let in_open_frame = entry.last_used == Some(self.pending_fragment());
                if same_layout && !in_open_frame {
                    self.rewrite_texture(id, entry, &data, sampler, version)?;
                } else {
                    let fresh = self.upload_texture(&data, format, (width, height), sampler)?;
                    if let Some(old) = self.textures.replace(id, version, fresh) {
                        self.ring.defer(Allocation {
                            block: old.texture.data,
                            bytes: old.bytes,
                        });
                    }
                }
                Ok(id)
            }
            _ => {
                let fresh = self.upload_texture(&data, format, (width, height), sampler)?;
                let id = self.textures.insert(key, version, fresh);
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
        let uploaded = self.upload_mesh(&geometry)?;
        match self.meshes.lookup(key, version) {
            Lookup::Stale(id) => {
                if let Some(old) = self.meshes.replace(id, version, uploaded) {
                    self.ring.defer(Allocation {
                        block: old.block,
                        bytes: old.bytes,
                    });
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
        self.transparent = false;
        self.start_scene();

        let (block, dropped) = pack_lights(&self.lights);
        if dropped > 0 {
            log::error!(
                "{}: {dropped} light(s) beyond the {MAX_TILE_LIGHTS} supported were dropped",
                self.name
            );
        }
        let span = self.light_span();
        self.driver
            .write(span.block, span.offset, bytemuck::bytes_of(&block))
            .map_err(|err| RenderError::ResourceError(backend_error(err)))
    }

    fn enable_transparency(&mut self) {
        self.transparent = true;
    }

    fn submit_draw(&mut self, mesh_id: u32, params: &DrawParams, appearance: &Appearance) {
        let Some(mesh) = self.meshes.get(mesh_id).copied() else {
            self.stats.skipped_draws += 1;
            return;
        };
        let pending = self.pending_fragment();
        let texture = if appearance.is_textured() {
            self.textures.get_mut(appearance.texture_id).map(|cached| {
                cached.last_used = Some(pending);
                cached.texture
            })
        } else {
            None
        };
        let uniforms = SceneUniforms {
            model_view: params.model_view,
            projection: self.projection,
            world: params.world,
            normal_matrix: params.normal_matrix.to_padded_rows(),
            eye: eye_position(&params.view).to_array(),
            color: FColor::from(appearance.color).to_array(),
            shininess: appearance.shininess,
            flat: appearance.flat,
        };
        let draw = TileDraw::Scene {
            program: FragmentProgram::select(self.transparent, texture.is_some()),
            vertices: MemorySpan::start(mesh.block),
            vertex_count: mesh.vertex_count,
            indices: MemorySpan {
                block: mesh.block,
                offset: mesh.index_offset,
            },
            index_count: mesh.index_count,
            texture,
            lights: self.light_span(),
            uniforms,
        };
        self.start_scene();
        self.driver.draw(&draw);
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
        if !self.wait_idle() {
            log::warn!("{}: resizing with work still pending", self.name);
        }
        if let Err(err) = self.driver.resize_display(width, height) {
            log::error!("{}: failed to resize display: {err:#}", self.name);
            return;
        }
        self.width = width;
        self.height = height;
        self.transform = transform;
        log::debug!("{}: resized to {width}x{height}", self.name);
    }

    fn clear(&mut self, r: f32, g: f32, b: f32) {
        self.start_scene();
        self.driver.clear(r, g, b);
        self.cleared = true;
    }

    fn flip(&mut self) -> Result<(), RenderError> {
        self.retire_evicted();
        self.start_scene();

        let vi = self.vertex_index;
        let fi = self.ring.current_index();
        self.vertex_values[vi] = self.vertex_values[vi].wrapping_add(1);
        self.fragment_values[fi] = self.fragment_values[fi].wrapping_add(1);
        let vertex = Notification {
            slot: vi as u32,
            value: self.vertex_values[vi],
        };
        let fragment = Notification {
            slot: (VERTEX_BUFFER_COUNT + fi) as u32,
            value: self.fragment_values[fi],
        };
        self.driver.end_scene(vertex, fragment);
        self.scene_open = false;
        self.cleared = false;
        self.transparent = false;
        self.quad_count = 0;
        self.vertex_pending[vi] = Some(vertex);
        self.ring.set_fence(fragment);

        self.vertex_index = (vi + 1) % VERTEX_BUFFER_COUNT;
        self.ring.advance();
        self.stats.frame_number += 1;

        let waits = [
            self.vertex_pending[self.vertex_index].take(),
            self.ring.take_fence(),
        ];
        for notification in waits.into_iter().flatten() {
            if !self.driver.wait(notification, self.timeout) {
                log::error!(
                    "{}: notification {notification:?} not written within {:?}",
                    self.name,
                    self.timeout
                );
                return Err(RenderError::DeviceLost);
            }
        }
        for allocation in self.ring.take_deletions() {
            self.release(allocation);
        }
        self.driver.swap_display();
        Ok(())
    }

    fn draw_2d_image(&mut self, texture_id: u32, src: Rect, dst: Rect, color: FColor) {
        self.start_scene();
        if !self.cleared {
            self.clear(0.0, 0.0, 0.0);
        }

        let pending = self.pending_fragment();
        let (texture, uv) = if texture_id == NO_TEXTURE_ID {
            (None, [0.0; 4])
        } else {
            let Some(cached) = self.textures.get_mut(texture_id) else {
                log::warn!("{}: 2D draw with unknown texture {texture_id}", self.name);
                self.stats.skipped_draws += 1;
                return;
            };
            cached.last_used = Some(pending);
            let (tw, th) = (cached.texture.width as f32, cached.texture.height as f32);
            let uv = [
                src.x as f32 / tw,
                src.y as f32 / th,
                (src.x + src.w) as f32 / tw,
                (src.y + src.h) as f32 / th,
            ];
            (Some(cached.texture), uv)
        };

        let (left, top) = self.transform.to_window(dst.x as f32, dst.y as f32);
        let (right, bottom) = self
            .transform
            .to_window((dst.x + dst.w) as f32, (dst.y + dst.h) as f32);
        let (w, h) = (self.width as f32, self.height as f32);
        let ndc = |x: f32, y: f32| [x / w * 2.0 - 1.0, 1.0 - y / h * 2.0];
        let [u0, v0, u1, v1] = uv;
        let quad = [
            PlaneVertex {
                position: ndc(left, top),
                tex_coord: [u0, v0],
            },
            PlaneVertex {
                position: ndc(right, top),
                tex_coord: [u1, v0],
            },
            PlaneVertex {
                position: ndc(left, bottom),
                tex_coord: [u0, v1],
            },
            PlaneVertex {
                position: ndc(right, bottom),
                tex_coord: [u1, v1],
            },
        ];

        if self.quad_count >= QUADS_PER_FRAME {
            log::warn!(
                "{}: more than {QUADS_PER_FRAME} 2D quads this frame, reusing the quad buffer",
                self.name
            );
            self.quad_count = 0;
        }
        let span = MemorySpan {
            block: self.quad_memory[self.vertex_index],
            offset: self.quad_count * QUAD_BYTES,
        };
        if let Err(err) = self
            .driver
            .write(span.block, span.offset, bytemuck::cast_slice(&quad))
        {
            log::warn!("{}: 2D quad write failed: {err:#}", self.name);
            self.stats.skipped_draws += 1;
            return;
        }
        self.quad_count += 1;
        self.driver.draw(&TileDraw::Plane {
            vertices: span,
            texture,
            color: color.to_array(),
        });
        self.stats.draw_calls += 1;
        self.stats.triangles += 2;
    }

    fn download(&mut self, target: &mut Surface) -> Result<(), RenderError> {
        let rect = content_rect(self.width, self.height, self.transform);
        if rect.w <= 0 || rect.h <= 0 {
            return Err(RenderError::RenderingFailed("empty content area".to_string()));
        }
        let last = (self.ring.current_index() + FRAGMENT_BUFFER_COUNT - 1) % FRAGMENT_BUFFER_COUNT;
        if self.fragment_values[last] > 0 {
            let displayed = Notification {
                slot: (VERTEX_BUFFER_COUNT + last) as u32,
                value: self.fragment_values[last],
            };
            if !self.driver.wait(displayed, self.timeout) {
                return Err(RenderError::DeviceLost);
            }
        }
        let pixels = self.driver.read_display(rect);
        blit_readback(target, &pixels, rect.w as u32, rect.h as u32);
        Ok(())
    }

    fn set_dither(&mut self, dither: bool) {
        self.dither = dither;
        self.driver.set_dither(dither);
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}

impl<D: TileDriver> Drop for TileRenderer<D> {
    fn drop(&mut self) {
        if !self.wait_idle() {
            log::warn!("{}: freeing memory with work still pending", self.name);
        }
        let (_, mut allocations) = self.ring.drain();
        allocations.extend(self.textures.drain().into_iter().map(|t| Allocation {
            block: t.texture.data,
            bytes: t.bytes,
        }));
        allocations.extend(self.meshes.drain().into_iter().map(|m| Allocation {
            block: m.block,
            bytes: m.bytes,
        }));
        for allocation in allocations {
            self.release(allocation);
        }
        for block in self.quad_memory {
            self.driver.free(block);
        }
        self.driver.free(self.light_memory);
        log::debug!("{}: released", self.name);
    }
}

impl<D: TileDriver> std::fmt::Debug for TileRenderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRenderer")
            .field("name", &self.name)
            .field("size", &(self.width, self.height))
            .field("vertex_index", &self.vertex_index)
            .field("fragment_index", &self.ring.current_index())
            .field("resident_bytes", &self.stats.resident_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::tile::SoftTileDriver;
    use relic_core::math::Rgba8;

    fn renderer() -> TileRenderer<SoftTileDriver> {
        TileRenderer::new(SoftTileDriver::new(), 64, 48, &RendererConfig::default()).unwrap()
    }

    fn identity(r: &mut TileRenderer<SoftTileDriver>) {
        r.resize(64, 48, ViewportTransform::IDENTITY);
    }

    #[test]
    fn test_paletted_texture_is_stored_natively() {
        let mut r = renderer();
        let surface = Surface::from_indexed(4, 4, vec![0; 16], &[Rgba8::WHITE]).unwrap();
        r.get_texture_id(&Texture::new(surface), false, 1.0, 1.0).unwrap();
        assert_eq!(r.stats().resident_bytes, 64 + 1024);

        r.get_texture_id(&Texture::new(Surface::filled(4, 4, Rgba8::WHITE)), false, 1.0, 1.0)
            .unwrap();
        assert_eq!(r.stats().resident_bytes, 64 + 1024 + 64);
    }

    #[test]
    fn test_idle_texture_is_rewritten_in_place() {
        let mut r = renderer();
        let texture = Texture::new(Surface::filled(4, 4, Rgba8::WHITE));
        let id = r.get_texture_id(&texture, false, 1.0, 1.0).unwrap();
        let blocks = r.driver().live_blocks();

        texture.update_surface(|s| s.put_pixel(0, 0, Rgba8::BLACK));
        assert_eq!(r.get_texture_id(&texture, false, 1.0, 1.0).unwrap(), id);
        assert_eq!(r.driver().live_blocks(), blocks);
        assert_eq!(r.stats().texture_uploads, 2);
    }

    #[test]
    fn test_texture_in_open_frame_is_reallocated() {
        let mut r = renderer();
        identity(&mut r);
        let texture = Texture::new(Surface::filled(4, 4, Rgba8::WHITE));
        let id = r.get_texture_id(&texture, true, 1.0, 1.0).unwrap();
        let blocks = r.driver().live_blocks();
        r.draw_2d_image(id, Rect::new(0, 0, 4, 4), Rect::new(0, 0, 8, 8), FColor::WHITE);

        texture.update_surface(|s| s.put_pixel(0, 0, Rgba8::BLACK));
        assert_eq!(r.get_texture_id(&texture, true, 1.0, 1.0).unwrap(), id);
        assert_eq!(r.driver().live_blocks(), blocks + 1);

        for _ in 0..FRAGMENT_BUFFER_COUNT {
            r.flip().unwrap();
        }
        assert_eq!(r.driver().live_blocks(), blocks);
        assert_eq!(r.stats().resident_bytes, 64);
    }

    #[test]
    fn test_quad_buffer_wraps() {
        let mut r = renderer();
        identity(&mut r);
        for _ in 0..QUADS_PER_FRAME + 1 {
            r.draw_2d_image(NO_TEXTURE_ID, Rect::default(), Rect::new(0, 0, 2, 2), FColor::WHITE);
        }
        assert_eq!(r.quad_count, 1);
        assert_eq!(r.stats().draw_calls as usize, QUADS_PER_FRAME + 1);
    }

    #[test]
    fn test_color_quad_fills_destination() {
        let mut r = renderer();
        identity(&mut r);
        r.clear(0.0, 0.0, 0.0);
        let red = FColor::new(1.0, 0.0, 0.0, 1.0);
        r.draw_2d_image(NO_TEXTURE_ID, Rect::default(), Rect::new(0, 0, 32, 24), red);
        r.flip().unwrap();
        let front = r.driver().front_buffer();
        assert_eq!(front.pixel(10, 10), Rgba8::new(255, 0, 0, 255));
        assert_eq!(front.pixel(40, 30), Rgba8::BLACK);
    }

    #[test]
    fn test_lights_beyond_two_are_dropped() {
        let mut r = renderer();
        let white = FColor::WHITE;
        r.push_lights(&[
            SceneLight::ambient(FColor::new(0.25, 0.25, 0.25, 1.0)),
            SceneLight::ambient(FColor::new(0.25, 0.25, 0.25, 1.0)),
            SceneLight::new(white, None, Some(Vec3::Z)),
            SceneLight::new(white, Some(Vec3::ONE), None),
            SceneLight::new(white, None, Some(Vec3::X)),
        ]);
        r.begin_frame().unwrap();

        let memory = r.driver().memory(r.light_memory).unwrap();
        let block: TileLightBlock = bytemuck::pod_read_unaligned(&memory[..LIGHT_BLOCK_BYTES]);
        assert_eq!(block.ambient[..3], [0.5, 0.5, 0.5]);
        assert_eq!(block.lights[0].is_directional, 1.0);
        assert_eq!(block.lights[1].vector[..3], [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_missing_notification_reports_device_lost() {
        let mut r = renderer();
        let hang = r.driver().hang_handle();
        hang.set(true);
        r.flip().unwrap();
        assert_eq!(r.flip(), Err(RenderError::DeviceLost));
        hang.set(false);
    }

    #[test]
    fn test_exhausted_memory_fails_the_upload() {
        let mut r = TileRenderer::new(
            SoftTileDriver::with_budget(8 * 1024),
            64,
            48,
            &RendererConfig::default(),
        )
        .unwrap();
        let texture = Texture::new(Surface::filled(64, 64, Rgba8::WHITE));
        assert_eq!(
            r.get_texture_id(&texture, false, 1.0, 1.0),
            Err(ResourceError::OutOfMemory)
        );
        assert_eq!(r.stats().resident_bytes, 0);
    }
}
