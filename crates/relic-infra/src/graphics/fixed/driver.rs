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

//! The device interface behind [`FixedRenderer`]: a fixed-function device
//! fed with already transformed, lit vertices.
//!
//! [`FixedRenderer`]: super::FixedRenderer

use crate::graphics::SamplerDesc;
use relic_core::renderer::Rect;

/// A device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedTexture(pub u32);

/// A screen-space vertex: position in pixels, depth in `[0, 1]`, the
/// reciprocal of clip w, a packed `0xAARRGGBB` diffuse colour and one set
/// of texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TlVertex {
    /// Pixel x.
    pub x: f32,
    /// Pixel y, down.
    pub y: f32,
    /// Depth.
    pub z: f32,
    /// Reciprocal homogeneous w.
    pub rhw: f32,
    /// Packed diffuse colour.
    pub diffuse: u32,
    /// Texture u.
    pub tu: f32,
    /// Texture v.
    pub tv: f32,
}

/// Colour interpolation across a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeMode {
    /// The first vertex colours the whole triangle.
    Flat,
    /// Colours are interpolated.
    Gouraud,
}

/// One render state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderState {
    /// Depth test.
    ZEnable(bool),
    /// Depth writes.
    ZWrite(bool),
    /// Source-alpha blending.
    AlphaBlend(bool),
    /// Back-face culling.
    CullBack(bool),
    /// Shade mode.
    Shade(ShadeMode),
    /// Ordered dithering.
    Dither(bool),
    /// Scissor rectangle in pixels.
    Scissor(Option<Rect>),
}

/// A fixed-function device with a managed texture pool.
pub trait FixedDevice {
    /// The device name.
    fn name(&self) -> &str;

    /// (Re)creates the back buffers.
    fn reset(&mut self, width: u32, height: u32) -> anyhow::Result<()>;

    /// Whether the device has been lost and must be recreated.
    fn is_lost(&self) -> bool;

    /// Creates a texture from tightly packed RGBA texels.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
        sampler: SamplerDesc,
    ) -> anyhow::Result<FixedTexture>;

    /// Releases a texture. The device keeps it alive while in use.
    fn release_texture(&mut self, texture: FixedTexture);

    /// Opens a scene.
    fn begin_scene(&mut self) -> anyhow::Result<()>;

    /// Closes the scene.
    fn end_scene(&mut self);

    /// Clears colour to `argb` and depth to `depth`.
    fn clear(&mut self, argb: u32, depth: f32);

    /// Changes one render state.
    fn set_render_state(&mut self, state: RenderState);

    /// Binds a texture to stage 0, modulated with the diffuse colour.
    fn set_texture(&mut self, texture: Option<FixedTexture>);

    /// Draws a non-indexed triangle list from user memory.
    fn draw_primitive_up(&mut self, vertices: &[TlVertex]);

    /// Shows the back buffer.
    fn present(&mut self) -> anyhow::Result<()>;

    /// Reads a rectangle of the displayed buffer as tightly packed RGBA.
    fn read_front(&self, rect: Rect) -> Vec<u8>;
}
