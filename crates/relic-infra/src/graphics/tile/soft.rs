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

//! A headless [`TileDriver`] with a fixed memory budget.
//!
//! Draws are rasterized as soon as they are recorded and notifications are
//! written at `end_scene`, unless the device has been hung.

use super::driver::{
    MemoryBlock, MemorySpan, Notification, PlaneVertex, TileDraw, TileDriver,
    TileLightBlock, TileTexture, TileTextureFormat,
};
use crate::graphics::common::{clear_rgba, mat3_from_padded, ProgrammableDraw};
use crate::raster::{draw_triangle, ClipVertex, CullMode, DepthTest, RasterState, RenderTarget, TextureImage};
use anyhow::{anyhow, bail};
use relic_core::math::{FColor, Rgba8, Vec2, Vec3, Vec4};
use relic_core::renderer::{Rect, SceneLight};
use relic_core::scene::surface::PALETTE_SIZE;
use relic_core::scene::Vertex;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// Default memory budget of [`SoftTileDriver::new`].
pub const DEFAULT_MEMORY_BUDGET: usize = 32 * 1024 * 1024;

/// CPU implementation of the tile-based device.
#[derive(Debug)]
pub struct SoftTileDriver {
    blocks: HashMap<u32, Vec<u8>>,
    next_block: u32,
    budget: usize,
    used: usize,
    notifications: HashMap<u32, u32>,
    back: RenderTarget,
    front: RenderTarget,
    in_scene: bool,
    dither: bool,
    hung: Rc<Cell<bool>>,
}

impl SoftTileDriver {
    /// Creates a driver with the default memory budget.
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_MEMORY_BUDGET)
    }

    /// Creates a driver that refuses allocations beyond `budget` bytes.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            next_block: 1,
            budget,
            used: 0,
            notifications: HashMap::new(),
            back: RenderTarget::new(1, 1),
            front: RenderTarget::new(1, 1),
            in_scene: false,
            dither: false,
            hung: Rc::new(Cell::new(false)),
        }
    }

    /// While set, scenes still draw but notifications are never written.
    pub fn hang_handle(&self) -> Rc<Cell<bool>> {
        self.hung.clone()
    }

    /// Live allocations.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes currently allocated.
    pub fn used_memory(&self) -> usize {
        self.used
    }

    /// The contents of a live allocation.
    pub fn memory(&self, block: MemoryBlock) -> Option<&[u8]> {
        self.blocks.get(&block.0).map(Vec::as_slice)
    }

    /// The displayed buffer.
    pub fn front_buffer(&self) -> &RenderTarget {
        &self.front
    }

    fn bytes(&self, span: MemorySpan) -> Option<&[u8]> {
        self.blocks.get(&span.block.0)?.get(span.offset..)
    }

    fn decode_texture(&self, texture: &TileTexture) -> Option<TextureImage> {
        let data = self.blocks.get(&texture.data.0)?;
        let texels = texture.width as usize * texture.height as usize;
        let rgba = match texture.format {
            TileTextureFormat::Rgba8 => data.get(..texels * 4)?.to_vec(),
            TileTextureFormat::Paletted8 { palette_offset } => {
                let indices = data.get(..texels)?;
                let palette: Vec<Rgba8> = bytemuck::pod_collect_to_vec(
                    data.get(palette_offset..palette_offset + PALETTE_SIZE * 4)?,
                );
                let expanded: Vec<Rgba8> = indices.iter().map(|&i| palette[i as usize]).collect();
                bytemuck::cast_slice(&expanded).to_vec()
            }
        };
        let mut image = TextureImage::from_rgba(texture.width, texture.height, &rgba)?;
        image.filter = texture.sampler.filter;
        image.wrap = texture.sampler.wrap;
        Some(image)
    }

    fn decode_lights(&self, span: MemorySpan) -> Vec<SceneLight> {
        let size = std::mem::size_of::<TileLightBlock>();
        let Some(block) = self
            .bytes(span)
            .and_then(|b| b.get(..size))
            .map(bytemuck::pod_read_unaligned::<TileLightBlock>)
        else {
            return Vec::new();
        };
        let mut lights = Vec::with_capacity(3);
        let [r, g, b, _] = block.ambient;
        if r != 0.0 || g != 0.0 || b != 0.0 {
            lights.push(SceneLight::ambient(FColor::new(r, g, b, 1.0)));
        }
        for light in block.lights.iter().filter(|l| l.color[..3] != [0.0; 3]) {
            let [r, g, b, a] = light.color;
            let v = Vec3::new(light.vector[0], light.vector[1], light.vector[2]);
            lights.push(if light.is_directional != 0.0 {
                SceneLight::new(FColor::new(r, g, b, a), None, Some(v))
            } else {
                SceneLight::new(FColor::new(r, g, b, a), Some(v), None)
            });
        }
        lights
    }

    fn draw_scene(&mut self, draw: &TileDraw) {
        let TileDraw::Scene {
            program,
            vertices,
            vertex_count,
            indices,
            index_count,
            texture,
            lights,
            uniforms,
        } = draw
        else {
            return;
        };
        let (Some(vb), Some(ib)) = (self.bytes(*vertices), self.bytes(*indices)) else {
            log::warn!("Soft tile: draw references freed memory");
            return;
        };
        let vertex_bytes = (*vertex_count as usize * std::mem::size_of::<Vertex>()).min(vb.len());
        let vertex_data: Vec<Vertex> = bytemuck::pod_collect_to_vec(&vb[..vertex_bytes]);
        let count = (*index_count as usize).min(ib.len() / 2);
        let index_data: Vec<u16> = bytemuck::pod_collect_to_vec(&ib[..count * 2]);
        let image = (*texture)
            .filter(|_| program.textured())
            .and_then(|t| self.decode_texture(&t));
        let lights = self.decode_lights(*lights);

        let state = RasterState {
            depth_test: DepthTest::Less,
            depth_write: !program.blended(),
            blend: program.blended(),
            flat: uniforms.flat,
            dither: self.dither,
            ..RasterState::default()
        };
        let [r, g, b, a] = uniforms.color;
        ProgrammableDraw {
            vertices: &vertex_data,
            indices: &index_data,
            model_view_projection: uniforms.model_view * uniforms.projection,
            world: uniforms.world,
            normal_matrix: mat3_from_padded(&uniforms.normal_matrix),
            eye: Vec3::new(uniforms.eye[0], uniforms.eye[1], uniforms.eye[2]),
            color: Vec4::new(r, g, b, a),
            shininess: uniforms.shininess,
            lights: Some(&lights),
        }
        .execute(&mut self.back, &state, image.as_ref());
    }

    fn draw_plane(&mut self, vertices: MemorySpan, texture: Option<TileTexture>, color: [f32; 4]) {
        let size = std::mem::size_of::<PlaneVertex>() * 4;
        let Some(quad) = self.bytes(vertices).and_then(|b| b.get(..size)) else {
            log::warn!("Soft tile: plane draw references freed memory");
            return;
        };
        let quad: Vec<PlaneVertex> = bytemuck::pod_collect_to_vec(quad);
        let image = texture.and_then(|t| self.decode_texture(&t));
        let [r, g, b, a] = color;
        let clip = quad.iter().map(|v| ClipVertex {
            position: Vec4::new(v.position[0], v.position[1], 0.0, 1.0),
            color: Vec4::new(r, g, b, a),
            uv: Vec2::new(v.tex_coord[0], v.tex_coord[1]),
        });
        let clip: Vec<ClipVertex> = clip.collect();
        let state = RasterState {
            depth_test: DepthTest::Always,
            depth_write: false,
            blend: true,
            cull: CullMode::None,
            dither: self.dither,
            ..RasterState::default()
        };
        let viewport = Rect::new(0, 0, self.back.width() as i32, self.back.height() as i32);
        // Strip order.
        for tri in [[0, 1, 2], [2, 1, 3]] {
            let corners = tri.map(|i| clip[i]);
            draw_triangle(&mut self.back, &state, &corners, viewport, image.as_ref());
        }
    }
}

impl Default for SoftTileDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TileDriver for SoftTileDriver {
    fn name(&self) -> &str {
        "software"
    }

    fn resize_display(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            bail!("zero-sized display {width}x{height}");
        }
        self.back.resize(width, height);
        self.front.resize(width, height);
        Ok(())
    }

    fn alloc(&mut self, size: usize, alignment: usize) -> anyhow::Result<MemoryBlock> {
        if size == 0 || !alignment.is_power_of_two() {
            bail!("invalid allocation of {size} bytes aligned to {alignment}");
        }
        if self.used + size > self.budget {
            bail!(
                "device memory exhausted: {size} bytes requested, {} of {} in use",
                self.used,
                self.budget
            );
        }
        let block = MemoryBlock(self.next_block);
        self.next_block += 1;
        self.used += size;
        self.blocks.insert(block.0, vec![0; size]);
        Ok(block)
    }

    fn free(&mut self, block: MemoryBlock) {
        match self.blocks.remove(&block.0) {
            Some(bytes) => self.used -= bytes.len(),
            None => log::warn!("Soft tile: double free of {block:?}"),
        }
    }

    fn write(&mut self, block: MemoryBlock, offset: usize, data: &[u8]) -> anyhow::Result<()> {
        let bytes = self
            .blocks
            .get_mut(&block.0)
            .ok_or_else(|| anyhow!("unknown memory block {block:?}"))?;
        let dst = bytes
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| anyhow!("write of {} bytes overflows {block:?}", data.len()))?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn begin_scene(&mut self) {
        if self.in_scene {
            log::warn!("Soft tile: begin_scene inside an open scene");
        }
        self.in_scene = true;
    }

    fn clear(&mut self, r: f32, g: f32, b: f32) {
        self.back.clear_color(clear_rgba(r, g, b));
        self.back.clear_depth(1.0);
    }

    fn draw(&mut self, draw: &TileDraw) {
        if !self.in_scene {
            log::warn!("Soft tile: draw outside a scene dropped");
            return;
        }
        match *draw {
            TileDraw::Scene { .. } => self.draw_scene(draw),
            TileDraw::Plane {
                vertices,
                texture,
                color,
            } => self.draw_plane(vertices, texture, color),
        }
    }

    fn end_scene(&mut self, vertex: Notification, fragment: Notification) {
        self.in_scene = false;
        if self.hung.get() {
            log::trace!("Soft tile: notifications {vertex:?} {fragment:?} dropped by a hung device");
            return;
        }
        self.notifications.insert(vertex.slot, vertex.value);
        self.notifications.insert(fragment.slot, fragment.value);
    }

    fn wait(&mut self, notification: Notification, _timeout: Duration) -> bool {
        self.notifications
            .get(&notification.slot)
            .is_some_and(|&value| value >= notification.value)
    }

    fn swap_display(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
        // The new back buffer keeps the previous contents until cleared.
        self.back.copy_from(&self.front);
    }

    fn read_display(&self, rect: Rect) -> Vec<u8> {
        self.front.read_rect(rect).2
    }

    fn set_dither(&mut self, dither: bool) {
        self.dither = dither;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_budget_is_enforced() {
        let mut driver = SoftTileDriver::with_budget(100);
        let a = driver.alloc(60, 16).unwrap();
        assert!(driver.alloc(60, 16).is_err());
        driver.free(a);
        assert_eq!(driver.used_memory(), 0);
        assert!(driver.alloc(60, 16).is_ok());
        assert!(driver.alloc(8, 3).is_err());
    }

    #[test]
    fn test_hung_device_never_notifies() {
        let mut driver = SoftTileDriver::new();
        let note = Notification { slot: 0, value: 1 };
        driver.hang_handle().set(true);
        driver.begin_scene();
        driver.end_scene(note, Notification { slot: 2, value: 1 });
        assert!(!driver.wait(note, Duration::ZERO));
        driver.hang_handle().set(false);
        driver.begin_scene();
        driver.end_scene(note, Notification { slot: 2, value: 1 });
        assert!(driver.wait(note, Duration::ZERO));
    }

    #[test]
    fn test_paletted_texture_decodes_through_palette() {
        let mut driver = SoftTileDriver::new();
        let (format, size) = TileTextureFormat::layout(true, 2, 1);
        let block = driver.alloc(size, 64).unwrap();
        let TileTextureFormat::Paletted8 { palette_offset } = format else {
            panic!("expected a paletted layout");
        };
        driver.write(block, 0, &[0, 1]).unwrap();
        driver
            .write(block, palette_offset, bytemuck::cast_slice(&[Rgba8::BLACK, Rgba8::WHITE]))
            .unwrap();
        let texture = TileTexture {
            data: block,
            width: 2,
            height: 1,
            format,
            sampler: crate::graphics::SamplerDesc::for_texture(true, 1.0, 1.0),
        };
        let image = driver.decode_texture(&texture).unwrap();
        assert_relative_eq!(image.sample(Vec2::new(0.75, 0.5)).x, 1.0);
        assert_relative_eq!(image.sample(Vec2::new(0.25, 0.5)).x, 0.0);
    }
}
