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

//! The explicit-memory device interface behind [`TileRenderer`].
//!
//! The renderer allocates and frees device memory itself and writes
//! vertices, indices, textures and uniform blocks into it. Scenes are
//! bracketed by `begin_scene`/`end_scene`; ending a scene arms a vertex and
//! a fragment [`Notification`] that the device writes once the tiler and the
//! fragment stage are done with everything the scene referenced.
//!
//! [`TileRenderer`]: super::TileRenderer

use crate::graphics::SamplerDesc;
use relic_core::math::Mat4;
use relic_core::renderer::Rect;
use std::time::Duration;

/// A device memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBlock(pub u32);

/// A byte range inside a [`MemoryBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySpan {
    /// The allocation.
    pub block: MemoryBlock,
    /// Start offset in bytes.
    pub offset: usize,
}

impl MemorySpan {
    /// The start of `block`.
    pub const fn start(block: MemoryBlock) -> Self {
        Self { block, offset: 0 }
    }
}

/// Vertex notification slots.
pub const VERTEX_BUFFER_COUNT: usize = 2;
/// Fragment notification slots; also the depth of the deletion queues.
pub const FRAGMENT_BUFFER_COUNT: usize = 3;
/// Required alignment of a palette inside texture memory.
pub const PALETTE_ALIGNMENT: usize = 64;

/// A notification region slot and the value that marks completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Notification {
    /// Index into the notification region.
    pub slot: u32,
    /// Value written by the device when the work is done.
    pub value: u32,
}

/// Texel layout of a texture in device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileTextureFormat {
    /// Four bytes per texel.
    Rgba8,
    /// One index per texel, followed by a 256-entry RGBA palette at
    /// `palette_offset`.
    Paletted8 {
        /// Byte offset of the palette from the start of the texture data.
        palette_offset: usize,
    },
}

/// A texture descriptor pointing into device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileTexture {
    /// Texel data.
    pub data: MemoryBlock,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Texel layout.
    pub format: TileTextureFormat,
    /// Sampler state.
    pub sampler: SamplerDesc,
}

impl TileTextureFormat {
    /// The layout and byte size of a `width`×`height` texture.
    pub fn layout(paletted: bool, width: u32, height: u32) -> (Self, usize) {
        let texels = width as usize * height as usize;
        if paletted {
            let palette_offset = texels.div_ceil(PALETTE_ALIGNMENT) * PALETTE_ALIGNMENT;
            (
                Self::Paletted8 { palette_offset },
                palette_offset + relic_core::scene::surface::PALETTE_SIZE * 4,
            )
        } else {
            (Self::Rgba8, texels * 4)
        }
    }
}

/// The four scene fragment programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentProgram {
    /// Opaque, vertex colour only.
    OpaqueColor,
    /// Blended, vertex colour only.
    BlendedColor,
    /// Opaque, textured.
    OpaqueTexture,
    /// Blended, textured.
    BlendedTexture,
}

impl FragmentProgram {
    /// Picks the program for a draw.
    pub fn select(blended: bool, textured: bool) -> Self {
        match (blended, textured) {
            (false, false) => Self::OpaqueColor,
            (true, false) => Self::BlendedColor,
            (false, true) => Self::OpaqueTexture,
            (true, true) => Self::BlendedTexture,
        }
    }

    /// Whether the program blends.
    pub fn blended(self) -> bool {
        matches!(self, Self::BlendedColor | Self::BlendedTexture)
    }

    /// Whether the program samples a texture.
    pub fn textured(self) -> bool {
        matches!(self, Self::OpaqueTexture | Self::BlendedTexture)
    }
}

/// One light in the fragment light block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileLight {
    /// Colour.
    pub color: [f32; 4],
    /// Direction for directional lights, position otherwise.
    pub vector: [f32; 4],
    /// 1 for directional lights.
    pub is_directional: f32,
    /// Padding.
    pub _align: [f32; 3],
}

/// Lights held in device memory, one block per fragment buffer.
pub const MAX_TILE_LIGHTS: usize = 2;

/// The fragment light uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileLightBlock {
    /// Positional and directional lights; unused slots are black.
    pub lights: [TileLight; MAX_TILE_LIGHTS],
    /// Summed ambient colour in `rgb`.
    pub ambient: [f32; 4],
}

/// Per-draw vertex and fragment uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneUniforms {
    /// Model to view space.
    pub model_view: Mat4,
    /// View to clip space.
    pub projection: Mat4,
    /// Model to world space, for lighting.
    pub world: Mat4,
    /// Normal transform rows.
    pub normal_matrix: [[f32; 4]; 3],
    /// Camera position in world space.
    pub eye: [f32; 3],
    /// Base colour.
    pub color: [f32; 4],
    /// Specular exponent.
    pub shininess: f32,
    /// Use the provoking vertex colour.
    pub flat: bool,
}

/// A 2D vertex in normalized device coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PlaneVertex {
    /// Clip-space `xy`.
    pub position: [f32; 2],
    /// Texture coordinates.
    pub tex_coord: [f32; 2],
}

/// A draw recorded into the current scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileDraw {
    /// An indexed triangle list through the main programs.
    Scene {
        /// Fragment program.
        program: FragmentProgram,
        /// Vertex stream of `relic_core::scene::Vertex`.
        vertices: MemorySpan,
        /// Vertices in the stream.
        vertex_count: u32,
        /// 16-bit indices.
        indices: MemorySpan,
        /// Index count.
        index_count: u32,
        /// Bound texture for textured programs.
        texture: Option<TileTexture>,
        /// The light block for this frame.
        lights: MemorySpan,
        /// Uniforms.
        uniforms: SceneUniforms,
    },
    /// A four-vertex strip of [`PlaneVertex`], depth test off.
    Plane {
        /// Vertex stream.
        vertices: MemorySpan,
        /// Image source, or `None` for a flat colour.
        texture: Option<TileTexture>,
        /// Flood colour.
        color: [f32; 4],
    },
}

/// A tile-based device with explicit memory and notifications.
pub trait TileDriver {
    /// The device name.
    fn name(&self) -> &str;

    /// Reallocates the display buffers.
    fn resize_display(&mut self, width: u32, height: u32) -> anyhow::Result<()>;

    /// Allocates device memory.
    fn alloc(&mut self, size: usize, alignment: usize) -> anyhow::Result<MemoryBlock>;

    /// Frees device memory. The caller guarantees nothing in flight uses it.
    fn free(&mut self, block: MemoryBlock);

    /// Writes host bytes into device memory.
    fn write(&mut self, block: MemoryBlock, offset: usize, data: &[u8]) -> anyhow::Result<()>;

    /// Opens a scene on the back buffer.
    fn begin_scene(&mut self);

    /// Clears the back buffer colour and depth.
    fn clear(&mut self, r: f32, g: f32, b: f32);

    /// Records a draw.
    fn draw(&mut self, draw: &TileDraw);

    /// Closes the scene; the device writes both notifications when done.
    fn end_scene(&mut self, vertex: Notification, fragment: Notification);

    /// Blocks until `notification` has been written. `false` on timeout.
    fn wait(&mut self, notification: Notification, timeout: Duration) -> bool;

    /// Queues the back buffer for display.
    fn swap_display(&mut self);

    /// Reads a rectangle of the displayed buffer as tightly packed RGBA.
    fn read_display(&self, rect: Rect) -> Vec<u8>;

    /// Enables ordered dithering of the colour output.
    fn set_dither(&mut self, dither: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_selection() {
        let p = FragmentProgram::select(true, false);
        assert_eq!(p, FragmentProgram::BlendedColor);
        assert!(p.blended() && !p.textured());
        assert!(FragmentProgram::select(false, true).textured());
    }

    #[test]
    fn test_paletted_layout_aligns_palette() {
        let (format, size) = TileTextureFormat::layout(true, 10, 10);
        assert_eq!(format, TileTextureFormat::Paletted8 { palette_offset: 128 });
        assert_eq!(size, 128 + 1024);
        assert_eq!(TileTextureFormat::layout(false, 2, 2).1, 16);
        assert_eq!(std::mem::size_of::<TileLightBlock>(), 2 * 48 + 16);
    }
}
