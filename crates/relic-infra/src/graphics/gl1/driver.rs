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

//! The OpenGL 1.1 command surface the GL backend is written against.
//!
//! The trait mirrors the subset of the fixed-function API the renderer needs:
//! capability toggles, the two matrix stacks, eight lights with a colour
//! material, 2D textures, client-side vertex arrays, buffer objects when the
//! extension is present, and immediate-mode quads. Matrices use the row-vector
//! convention of [`Mat4`]: `load_matrix` takes the matrix the engine built,
//! not its transpose.

use crate::raster::{Filter, Wrap};
use relic_core::math::Mat4;
use relic_core::renderer::Rect;

/// The extension that enables [`Gl11::gen_buffer`] and friends.
pub const VBO_EXTENSION: &str = "GL_ARB_vertex_buffer_object";

/// Number of light units.
pub const MAX_GL_LIGHTS: usize = 8;

/// A texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlTexture(pub u32);

/// A buffer object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlBuffer(pub u32);

/// Server-side capabilities toggled with `enable`/`disable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth comparison against the depth buffer.
    DepthTest,
    /// Source-alpha blending.
    Blend,
    /// Back-face culling with clockwise front faces.
    CullFace,
    /// Per-vertex lighting.
    Lighting,
    /// Current colour drives the ambient and diffuse material.
    ColorMaterial,
    /// Texturing from the bound texture.
    Texture2D,
    /// Renormalize transformed normals.
    Normalize,
    /// Ordered dither to 16-bit colour.
    Dither,
    /// One light unit, `0..MAX_GL_LIGHTS`.
    Light(usize),
}

/// Target of the matrix commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMode {
    /// The modelview stack.
    ModelView,
    /// The projection stack.
    Projection,
}

/// Colour interpolation across a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeModel {
    /// The last vertex colours the whole triangle.
    Flat,
    /// Interpolated.
    Smooth,
}

/// Parameters of the bound texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexParam {
    /// Minification filter.
    MinFilter(Filter),
    /// Magnification filter.
    MagFilter(Filter),
    /// Addressing on both axes.
    Wrap(Wrap),
}

/// One light unit. `position.w == 0` makes the light directional, with
/// `position` pointing towards the light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlLight {
    /// Ambient intensity.
    pub ambient: [f32; 4],
    /// Diffuse intensity.
    pub diffuse: [f32; 4],
    /// Specular intensity.
    pub specular: [f32; 4],
    /// Homogeneous position.
    pub position: [f32; 4],
}

/// Front material terms not covered by the colour material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlMaterial {
    /// Specular reflectance.
    pub specular: [f32; 4],
    /// Specular exponent.
    pub shininess: f32,
}

/// Where a vertex array lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArraySource<'a, T> {
    /// Client memory.
    Client(&'a [T]),
    /// A buffer object filled with `buffer_data`.
    Buffer(GlBuffer),
}

/// The enabled client arrays of one `draw_elements`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientArrays<'a> {
    /// Vertex positions.
    pub positions: ArraySource<'a, [f32; 3]>,
    /// Vertex normals.
    pub normals: ArraySource<'a, [f32; 3]>,
    /// `None` leaves the texture coordinate array disabled.
    pub tex_coords: Option<ArraySource<'a, [f32; 2]>>,
}

/// An OpenGL 1.1 context.
pub trait Gl11 {
    /// The `GL_RENDERER` string.
    fn renderer_string(&self) -> &str;
    /// Whether the extension string lists `name`.
    fn extension_supported(&self, name: &str) -> bool;
    /// Whether the context was lost and every object in it is gone.
    fn is_context_lost(&self) -> bool;
    /// Resizes the default framebuffer.
    fn resize_drawable(&mut self, width: u32, height: u32) -> anyhow::Result<()>;

    /// Sets the viewport, bottom-left origin.
    fn viewport(&mut self, rect: Rect);
    /// Turns a capability on.
    fn enable(&mut self, cap: Capability);
    /// Turns a capability off.
    fn disable(&mut self, cap: Capability);
    /// Enables or disables depth writes.
    fn depth_mask(&mut self, write: bool);
    /// Selects flat or smooth shading.
    fn shade_model(&mut self, model: ShadeModel);

    /// Selects the stack the matrix commands act on.
    fn matrix_mode(&mut self, mode: MatrixMode);
    /// Replaces the current matrix with the identity.
    fn load_identity(&mut self);
    /// Replaces the current matrix.
    fn load_matrix(&mut self, matrix: &Mat4);
    /// Duplicates the top of the current stack.
    fn push_matrix(&mut self);
    /// Pops the current stack.
    fn pop_matrix(&mut self);
    /// Multiplies the current matrix by an orthographic projection.
    fn ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32);

    /// Sets the scene ambient term.
    fn light_model_ambient(&mut self, color: [f32; 4]);
    /// Sets a light unit. The position is transformed by the current modelview.
    fn light(&mut self, index: usize, light: &GlLight);
    /// Sets the front material.
    fn material(&mut self, material: &GlMaterial);
    /// Sets the current colour.
    fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32);

    /// Allocates a texture name.
    fn gen_texture(&mut self) -> GlTexture;
    /// Binds a texture, or unbinds with `None`.
    fn bind_texture(&mut self, texture: Option<GlTexture>);
    /// Specifies level 0 of the bound texture from RGBA bytes.
    fn tex_image_2d(&mut self, width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<()>;
    /// Sets a parameter of the bound texture.
    fn tex_parameter(&mut self, param: TexParam);
    /// Deletes a texture.
    fn delete_texture(&mut self, texture: GlTexture);

    /// Allocates a buffer name.
    fn gen_buffer(&mut self) -> GlBuffer;
    /// Replaces a buffer's store.
    fn buffer_data(&mut self, buffer: GlBuffer, data: &[u8]);
    /// Deletes a buffer.
    fn delete_buffer(&mut self, buffer: GlBuffer);

    /// Draws an indexed triangle list.
    fn draw_elements(&mut self, arrays: &ClientArrays<'_>, indices: ArraySource<'_, u16>, count: usize);

    /// Starts an immediate-mode quad list.
    fn begin_quads(&mut self);
    /// Sets the current texture coordinate.
    fn tex_coord2f(&mut self, u: f32, v: f32);
    /// Emits a vertex at `z = 0`.
    fn vertex2f(&mut self, x: f32, y: f32);
    /// Ends the immediate-mode primitive and draws it.
    fn end(&mut self);

    /// Sets the clear colour.
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    /// Clears colour and depth.
    fn clear(&mut self);
    /// Blocks until every command completed.
    fn finish(&mut self);
    /// Reads a rectangle with a bottom-left origin. Rows come bottom first.
    fn read_pixels(&mut self, rect: Rect) -> Vec<u8>;
    /// Presents the back buffer.
    fn swap_buffers(&mut self) -> anyhow::Result<()>;
}

/// The column-vector `glOrtho` matrix, in row-vector form.
pub fn ortho_matrix(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let (w, h, d) = (right - left, top - bottom, far - near);
    Mat4::from_rows([
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, 2.0 / h, 0.0, 0.0],
        [0.0, 0.0, -2.0 / d, 0.0],
        [-(right + left) / w, -(top + bottom) / h, -(far + near) / d, 1.0],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relic_core::math::Vec3;

    #[test]
    fn test_ortho_maps_corners_to_ndc() {
        let m = ortho_matrix(0.0, 640.0, 480.0, 0.0, -1.0, 1.0);
        let top_left = m.transform_point(Vec3::ZERO);
        assert_relative_eq!(top_left.x, -1.0);
        assert_relative_eq!(top_left.y, 1.0);
        assert_relative_eq!(top_left.z, 0.0);
        let bottom_right = m.transform_point(Vec3::new(640.0, 480.0, 0.0));
        assert_relative_eq!(bottom_right.x, 1.0);
        assert_relative_eq!(bottom_right.y, -1.0);
    }
}
