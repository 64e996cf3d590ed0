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

//! The command/transfer-buffer device interface behind [`GpuRenderer`].
//!
//! Resources live on the device and are named by handles. Data reaches them
//! only through a host-visible transfer buffer and copy commands; work is
//! recorded as a list of [`GpuCommand`]s and submitted in one go, and each
//! submission returns a [`GpuFence`] that signals when the device is done.
//!
//! [`GpuRenderer`]: super::GpuRenderer

use crate::graphics::SamplerDesc;
use relic_core::math::{Mat3, Mat4};
use relic_core::renderer::{Rect, SceneLight};
use std::time::Duration;

/// Names a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Names a device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Signals completion of one submission. Fences are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuFence(pub u64);

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, a tightly packed `relic_core::scene::Vertex` array.
    Vertex,
    /// 16-bit triangle-list indices.
    Index,
    /// Host-visible staging memory for uploads and readbacks.
    Transfer,
}

/// The three graphics pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// Depth test and write, no blending.
    Opaque,
    /// Depth test without write, source-alpha blending.
    Transparent,
    /// No depth, blending, no culling.
    Ui,
}

/// Lights bound to the scene pipelines.
pub const MAX_GPU_LIGHTS: usize = 3;

/// The light uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightBlock {
    /// Light slots; only the first `count[0]` are live.
    pub lights: [SceneLight; MAX_GPU_LIGHTS],
    /// `[count, 0, 0, 0]`.
    pub count: [u32; 4],
}

impl LightBlock {
    /// Packs up to [`MAX_GPU_LIGHTS`] lights; the rest are ignored.
    pub fn new(lights: &[SceneLight]) -> Self {
        let mut block = Self {
            lights: [bytemuck::Zeroable::zeroed(); MAX_GPU_LIGHTS],
            count: [0; 4],
        };
        let n = lights.len().min(MAX_GPU_LIGHTS);
        block.lights[..n].copy_from_slice(&lights[..n]);
        block.count[0] = n as u32;
        block
    }

    /// The live lights.
    pub fn active(&self) -> &[SceneLight] {
        &self.lights[..(self.count[0] as usize).min(MAX_GPU_LIGHTS)]
    }
}

impl Default for LightBlock {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Per-draw uniforms. Lighting runs in world space.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    /// Model to clip space.
    pub model_view_projection: Mat4,
    /// Model to world space.
    pub world: Mat4,
    /// Normal transform, rows padded to four floats.
    pub normal_matrix: [[f32; 4]; 3],
    /// Base colour.
    pub color: [f32; 4],
    /// Camera position in `xyz`, shininess in `w`.
    pub eye_shininess: [f32; 4],
    /// `[use_texture, flat, 0, 0]`.
    pub flags: [u32; 4],
}

impl DrawUniforms {
    /// Uniforms for a lit scene draw.
    #[allow(clippy::too_many_arguments)]
    pub fn scene(
        model_view_projection: Mat4,
        world: Mat4,
        normal_matrix: &Mat3,
        color: [f32; 4],
        eye: [f32; 3],
        shininess: f32,
        textured: bool,
        flat: bool,
    ) -> Self {
        Self {
            model_view_projection,
            world,
            normal_matrix: normal_matrix.to_padded_rows(),
            color,
            eye_shininess: [eye[0], eye[1], eye[2], shininess],
            flags: [textured as u32, flat as u32, 0, 0],
        }
    }

    /// Uniforms for an unlit, textured 2D quad.
    pub fn ui(model_view_projection: Mat4, color: [f32; 4]) -> Self {
        Self {
            model_view_projection,
            world: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY.to_padded_rows(),
            color,
            eye_shininess: [0.0; 4],
            flags: [1, 0, 0, 0],
        }
    }

    /// Whether the draw samples its texture.
    pub fn textured(&self) -> bool {
        self.flags[0] != 0
    }

    /// Whether the draw is flat-shaded.
    pub fn flat(&self) -> bool {
        self.flags[1] != 0
    }

    /// Specular exponent.
    pub fn shininess(&self) -> f32 {
        self.eye_shininess[3]
    }
}

/// One indexed draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    /// Vertex buffer.
    pub vertex_buffer: BufferHandle,
    /// Index buffer.
    pub index_buffer: BufferHandle,
    /// Number of indices to draw.
    pub index_count: u32,
    /// Bound texture; the white texture when untextured.
    pub texture: TextureHandle,
    /// Uniforms.
    pub uniforms: DrawUniforms,
}

/// A recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Copies bytes between buffers.
    CopyBufferToBuffer {
        /// Source buffer.
        src: BufferHandle,
        /// Offset into the source.
        src_offset: u64,
        /// Destination buffer, written from offset 0.
        dst: BufferHandle,
        /// Byte count.
        size: u64,
    },
    /// Fills a whole texture from tightly packed RGBA rows.
    CopyBufferToTexture {
        /// Source buffer.
        src: BufferHandle,
        /// Offset into the source.
        src_offset: u64,
        /// Destination texture.
        dst: TextureHandle,
    },
    /// Opens a render pass on the render target, optionally clearing colour
    /// and depth.
    BeginPass {
        /// Clear colour, or `None` to keep the contents.
        clear: Option<[f32; 4]>,
    },
    /// Binds a pipeline.
    SetPipeline(Pipeline),
    /// Restricts drawing to a rectangle of the render target.
    SetScissor(Option<Rect>),
    /// Binds the light block.
    BindLights(LightBlock),
    /// Toggles ordered dithering on colour writes.
    SetDither(bool),
    /// Draws.
    Draw(DrawCall),
    /// Closes the render pass.
    EndPass,
    /// Copies the render target to the present target.
    Present,
    /// Copies a rectangle of the present target into a transfer buffer as
    /// tightly packed RGBA rows.
    CopyPresentToBuffer {
        /// Source rectangle.
        rect: Rect,
        /// Destination buffer.
        dst: BufferHandle,
    },
}

/// A device with a command/transfer-buffer API.
pub trait GpuDriver {
    /// The adapter or implementation name.
    fn name(&self) -> &str;

    /// Allocates a buffer of `size` bytes.
    fn create_buffer(&mut self, usage: BufferUsage, size: u64) -> anyhow::Result<BufferHandle>;

    /// Frees a buffer. The caller guarantees no pending work uses it.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Allocates an RGBA8 texture.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        sampler: SamplerDesc,
    ) -> anyhow::Result<TextureHandle>;

    /// Frees a texture. The caller guarantees no pending work uses it.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Writes host data into a transfer buffer.
    fn write_transfer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8])
        -> anyhow::Result<()>;

    /// Reads host data back from a transfer buffer.
    fn read_transfer(&mut self, buffer: BufferHandle, offset: u64, len: usize)
        -> anyhow::Result<Vec<u8>>;

    /// Samples per pixel of the colour and depth targets.
    fn sample_count(&self) -> u32;

    /// Reallocates the render, depth and present targets.
    fn resize_targets(&mut self, width: u32, height: u32) -> anyhow::Result<()>;

    /// Submits recorded commands for execution in order.
    fn submit(&mut self, commands: Vec<GpuCommand>) -> GpuFence;

    /// Blocks until `fence` signals. Returns `false` on timeout.
    fn wait(&mut self, fence: GpuFence, timeout: Duration) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use relic_core::math::{FColor, Vec3};

    #[test]
    fn test_light_block_truncates() {
        let lights = vec![SceneLight::ambient(FColor::WHITE); 5];
        let block = LightBlock::new(&lights);
        assert_eq!(block.count[0], 3);
        assert_eq!(block.active().len(), 3);
        assert!(LightBlock::default().active().is_empty());
    }

    #[test]
    fn test_uniform_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 224);
        assert_eq!(std::mem::size_of::<LightBlock>(), 3 * 48 + 16);
        let u = DrawUniforms::scene(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            &Mat3::IDENTITY,
            [1.0; 4],
            Vec3::ZERO.to_array(),
            4.0,
            true,
            false,
        );
        assert!(u.textured() && !u.flat());
        assert_eq!(u.shininess(), 4.0);
    }
}
