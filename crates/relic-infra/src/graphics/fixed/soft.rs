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

//! A headless [`FixedDevice`] on the shared rasterizer.

use super::driver::{FixedDevice, FixedTexture, RenderState, ShadeMode, TlVertex};
use crate::graphics::SamplerDesc;
use crate::raster::{rasterize, CullMode, DepthTest, RasterState, RenderTarget, ScreenVertex, TextureImage};
use anyhow::{anyhow, bail};
use relic_core::math::{Rgba8, Vec2, Vec4};
use relic_core::renderer::Rect;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// CPU implementation of the fixed-function device.
#[derive(Debug)]
pub struct SoftFixedDevice {
    textures: HashMap<u32, TextureImage>,
    next_texture: u32,
    bound: Option<FixedTexture>,
    back: RenderTarget,
    front: RenderTarget,
    state: RasterState,
    in_scene: bool,
    lost: Rc<Cell<bool>>,
}

impl SoftFixedDevice {
    /// Creates a device; the renderer sizes it with [`FixedDevice::reset`].
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_texture: 1,
            bound: None,
            back: RenderTarget::new(1, 1),
            front: RenderTarget::new(1, 1),
            state: RasterState::default(),
            in_scene: false,
            lost: Rc::new(Cell::new(false)),
        }
    }

    /// A switch that, while set, reports the device as lost.
    pub fn lose_handle(&self) -> Rc<Cell<bool>> {
        self.lost.clone()
    }

    /// Live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// The displayed buffer.
    pub fn front_buffer(&self) -> &RenderTarget {
        &self.front
    }

    fn to_screen(v: &TlVertex) -> ScreenVertex {
        let c = Rgba8::from_argb(v.diffuse);
        ScreenVertex {
            x: v.x,
            y: v.y,
            z: v.z,
            rhw: v.rhw,
            color: Vec4::new(
                c.r as f32 / 255.0,
                c.g as f32 / 255.0,
                c.b as f32 / 255.0,
                c.a as f32 / 255.0,
            ),
            uv: Vec2::new(v.tu, v.tv),
        }
    }
}

impl Default for SoftFixedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedDevice for SoftFixedDevice {
    fn name(&self) -> &str {
        "software"
    }

    fn reset(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            bail!("zero-sized back buffer {width}x{height}");
        }
        self.back.resize(width, height);
        self.front.resize(width, height);
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost.get()
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
        sampler: SamplerDesc,
    ) -> anyhow::Result<FixedTexture> {
        let mut image = TextureImage::from_rgba(width, height, rgba)
            .ok_or_else(|| anyhow!("bad texture data for {width}x{height}"))?;
        image.filter = sampler.filter;
        image.wrap = sampler.wrap;
        let handle = FixedTexture(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(handle.0, image);
        Ok(handle)
    }

    fn release_texture(&mut self, texture: FixedTexture) {
        if self.textures.remove(&texture.0).is_none() {
            log::warn!("Soft fixed: double release of {texture:?}");
        }
        if self.bound == Some(texture) {
            self.bound = None;
        }
    }

    fn begin_scene(&mut self) -> anyhow::Result<()> {
        if self.lost.get() {
            bail!("device lost");
        }
        if self.in_scene {
            bail!("scene already open");
        }
        self.in_scene = true;
        Ok(())
    }

    fn end_scene(&mut self) {
        self.in_scene = false;
    }

    fn clear(&mut self, argb: u32, depth: f32) {
        self.back.clear_color(Rgba8::from_argb(argb));
        self.back.clear_depth(depth);
    }

    fn set_render_state(&mut self, state: RenderState) {
        match state {
            RenderState::ZEnable(on) => {
                self.state.depth_test = if on { DepthTest::Less } else { DepthTest::Always }
            }
            RenderState::ZWrite(on) => self.state.depth_write = on,
            RenderState::AlphaBlend(on) => self.state.blend = on,
            RenderState::CullBack(on) => {
                self.state.cull = if on { CullMode::Back } else { CullMode::None }
            }
            RenderState::Shade(mode) => self.state.flat = mode == ShadeMode::Flat,
            RenderState::Dither(on) => self.state.dither = on,
            RenderState::Scissor(rect) => self.state.scissor = rect,
        }
    }

    fn set_texture(&mut self, texture: Option<FixedTexture>) {
        self.bound = texture;
    }

    fn draw_primitive_up(&mut self, vertices: &[TlVertex]) {
        if !self.in_scene {
            log::warn!("Soft fixed: draw outside a scene dropped");
            return;
        }
        let texture = self.bound.and_then(|t| self.textures.get(&t.0));
        for tri in vertices.chunks_exact(3) {
            let mut screen = [tri[0], tri[1], tri[2]].map(|v| Self::to_screen(&v));
            if self.state.flat {
                let provoking = screen[0].color;
                for v in &mut screen {
                    v.color = provoking;
                }
            }
            rasterize(&mut self.back, &self.state, &screen, texture);
        }
    }

    fn present(&mut self) -> anyhow::Result<()> {
        if self.lost.get() {
            bail!("device lost during present");
        }
        self.front.copy_from(&self.back);
        Ok(())
    }

    fn read_front(&self, rect: Rect) -> Vec<u8> {
        self.front.read_rect(rect).2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relic_core::math::color::pack_argb;

    fn vertex(x: f32, y: f32, diffuse: u32) -> TlVertex {
        TlVertex {
            x,
            y,
            z: 0.5,
            rhw: 1.0,
            diffuse,
            ..TlVertex::default()
        }
    }

    #[test]
    fn test_flat_shade_uses_first_vertex() {
        let mut device = SoftFixedDevice::new();
        device.reset(16, 16).unwrap();
        device.begin_scene().unwrap();
        device.clear(pack_argb(255, 0, 0, 0), 1.0);
        device.set_render_state(RenderState::Shade(ShadeMode::Flat));
        let red = pack_argb(255, 255, 0, 0);
        let blue = pack_argb(255, 0, 0, 255);
        device.draw_primitive_up(&[vertex(0.0, 0.0, red), vertex(16.0, 0.0, blue), vertex(0.0, 16.0, blue)]);
        device.end_scene();
        device.present().unwrap();
        assert_eq!(device.front_buffer().pixel(4, 4), Rgba8::new(255, 0, 0, 255));
    }

    #[test]
    fn test_lost_device_refuses_scenes() {
        let mut device = SoftFixedDevice::new();
        device.lose_handle().set(true);
        assert!(device.is_lost());
        assert!(device.begin_scene().is_err());
        assert!(device.present().is_err());
    }
}
