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

//! A software OpenGL 1.1 context.
//!
//! Implements the fixed-function vertex pipeline (modelview and projection
//! stacks, eight lights with a local viewer, colour material) on top of the
//! shared rasterizer. The default framebuffer is double buffered; swapping
//! copies the back buffer to the front and keeps the back contents.

use super::driver::{
    ortho_matrix, ArraySource, Capability, ClientArrays, Gl11, GlBuffer, GlLight, GlMaterial,
    GlTexture, MatrixMode, ShadeModel, TexParam, MAX_GL_LIGHTS, VBO_EXTENSION,
};
use crate::raster::{
    draw_triangle, ClipVertex, CullMode, DepthTest, RasterState, RenderTarget, TextureImage,
};
use anyhow::{anyhow, bail};
use relic_core::math::{Mat3, Mat4, Rgba8, Vec2, Vec3, Vec4};
use relic_core::renderer::Rect;
use std::borrow::Cow;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

const DEFAULT_SCENE_AMBIENT: [f32; 4] = [0.2, 0.2, 0.2, 1.0];
const DEFAULT_MATERIAL_AMBIENT: Vec4 = Vec4::new(0.2, 0.2, 0.2, 1.0);
const DEFAULT_MATERIAL_DIFFUSE: Vec4 = Vec4::new(0.8, 0.8, 0.8, 1.0);

fn default_light(index: usize) -> GlLight {
    let on = if index == 0 { 1.0 } else { 0.0 };
    GlLight {
        ambient: [0.0, 0.0, 0.0, 1.0],
        diffuse: [on, on, on, 1.0],
        specular: [on, on, on, 1.0],
        position: [0.0, 0.0, 1.0, 0.0],
    }
}

fn rgb(v: [f32; 4]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

fn mul3(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x * b.x, a.y * b.y, a.z * b.z)
}

#[derive(Debug, Default)]
struct SoftTexture {
    image: Option<TextureImage>,
}

#[derive(Debug, Clone, Copy)]
struct ImmediateVertex {
    position: Vec3,
    uv: Vec2,
    color: Vec4,
}

/// CPU implementation of [`Gl11`].
#[derive(Debug)]
pub struct SoftGl {
    extensions: Vec<String>,
    lost: Rc<Cell<bool>>,
    back: RenderTarget,
    front: RenderTarget,
    viewport: Rect,
    caps: HashSet<Capability>,
    depth_write: bool,
    shade: ShadeModel,
    mode: MatrixMode,
    modelview: Vec<Mat4>,
    projection: Vec<Mat4>,
    scene_ambient: [f32; 4],
    lights: [GlLight; MAX_GL_LIGHTS],
    material: GlMaterial,
    color: Vec4,
    tex_coord: Vec2,
    clear: Rgba8,
    textures: HashMap<u32, SoftTexture>,
    bound: Option<GlTexture>,
    buffers: HashMap<u32, Vec<u8>>,
    next_name: u32,
    immediate: Option<Vec<ImmediateVertex>>,
}

impl SoftGl {
    /// Creates a context with a `width` x `height` default framebuffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extensions: vec![VBO_EXTENSION.to_string()],
            lost: Rc::new(Cell::new(false)),
            back: RenderTarget::new(width, height),
            front: RenderTarget::new(width, height),
            viewport: Rect::new(0, 0, width as i32, height as i32),
            caps: HashSet::from([Capability::Dither]),
            depth_write: true,
            shade: ShadeModel::Smooth,
            mode: MatrixMode::ModelView,
            modelview: vec![Mat4::IDENTITY],
            projection: vec![Mat4::IDENTITY],
            scene_ambient: DEFAULT_SCENE_AMBIENT,
            lights: std::array::from_fn(default_light),
            material: GlMaterial {
                specular: [0.0, 0.0, 0.0, 1.0],
                shininess: 0.0,
            },
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            tex_coord: Vec2::ZERO,
            clear: Rgba8::new(0, 0, 0, 0),
            textures: HashMap::new(),
            bound: None,
            buffers: HashMap::new(),
            next_name: 1,
            immediate: None,
        }
    }

    /// A context without buffer objects, forcing client arrays.
    pub fn without_vbo(width: u32, height: u32) -> Self {
        let mut gl = Self::new(width, height);
        gl.extensions.clear();
        gl
    }

    /// A switch that, while set, reports the context as lost.
    pub fn lose_handle(&self) -> Rc<Cell<bool>> {
        self.lost.clone()
    }

    /// Live texture names.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Live buffer names.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// The displayed buffer, top row first.
    pub fn front_buffer(&self) -> &RenderTarget {
        &self.front
    }

    fn name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    fn stack(&mut self) -> &mut Vec<Mat4> {
        match self.mode {
            MatrixMode::ModelView => &mut self.modelview,
            MatrixMode::Projection => &mut self.projection,
        }
    }

    fn top(stack: &[Mat4]) -> Mat4 {
        stack.last().copied().unwrap_or(Mat4::IDENTITY)
    }

    fn set_top(&mut self, matrix: Mat4) {
        let stack = self.stack();
        match stack.last_mut() {
            Some(top) => *top = matrix,
            None => stack.push(matrix),
        }
    }

    fn raster_state(&self) -> RasterState {
        let depth = self.caps.contains(&Capability::DepthTest);
        RasterState {
            depth_test: if depth { DepthTest::Less } else { DepthTest::Always },
            depth_write: depth && self.depth_write,
            reverse_z: false,
            blend: self.caps.contains(&Capability::Blend),
            cull: if self.caps.contains(&Capability::CullFace) {
                CullMode::Back
            } else {
                CullMode::None
            },
            flat: false,
            dither: self.caps.contains(&Capability::Dither),
            scissor: None,
        }
    }

    /// The viewport converted to a top-left origin.
    fn screen_viewport(&self) -> Rect {
        let height = self.back.height() as i32;
        Rect::new(
            self.viewport.x,
            height - (self.viewport.y + self.viewport.h),
            self.viewport.w,
            self.viewport.h,
        )
    }

    /// Evaluates the lighting equation for an eye-space vertex.
    fn light_vertex(&self, position: Vec3, normal: Vec3) -> Vec4 {
        let (ambient, diffuse) = if self.caps.contains(&Capability::ColorMaterial) {
            (self.color, self.color)
        } else {
            (DEFAULT_MATERIAL_AMBIENT, DEFAULT_MATERIAL_DIFFUSE)
        };
        let (ambient, diffuse_rgb) = (ambient.truncate(), diffuse.truncate());
        let specular = rgb(self.material.specular);
        let to_eye = (-position).normalize();

        let mut sum = mul3(rgb(self.scene_ambient), ambient);
        for (index, light) in self.lights.iter().enumerate() {
            if !self.caps.contains(&Capability::Light(index)) {
                continue;
            }
            let p = light.position;
            let to_light = if p[3] == 0.0 {
                Vec3::new(p[0], p[1], p[2]).normalize()
            } else {
                (Vec3::new(p[0], p[1], p[2]) * (1.0 / p[3]) - position).normalize()
            };
            sum += mul3(rgb(light.ambient), ambient);
            let n_dot_l = normal.dot(to_light).max(0.0);
            sum += mul3(rgb(light.diffuse), diffuse_rgb) * n_dot_l;
            if n_dot_l > 0.0 {
                let half = (to_light + to_eye).normalize();
                let term = normal.dot(half).max(0.0).powf(self.material.shininess);
                sum += mul3(rgb(light.specular), specular) * term;
            }
        }
        Vec4::new(
            sum.x.clamp(0.0, 1.0),
            sum.y.clamp(0.0, 1.0),
            sum.z.clamp(0.0, 1.0),
            diffuse.w,
        )
    }

    fn fetch<'a, T: bytemuck::Pod>(&self, source: ArraySource<'a, T>) -> Option<Cow<'a, [T]>> {
        match source {
            ArraySource::Client(data) => Some(Cow::Borrowed(data)),
            ArraySource::Buffer(buffer) => self
                .buffers
                .get(&buffer.0)
                .map(|bytes| Cow::Owned(bytemuck::pod_collect_to_vec(bytes))),
        }
    }

    /// Rasterizes clip-space triangles with the current state.
    fn draw_triangles(&mut self, triangles: impl IntoIterator<Item = [ClipVertex; 3]>) {
        let state = self.raster_state();
        let viewport = self.screen_viewport();
        let texture = if self.caps.contains(&Capability::Texture2D) {
            self.bound
                .and_then(|t| self.textures.get(&t.0))
                .and_then(|t| t.image.as_ref())
        } else {
            None
        };
        for mut tri in triangles {
            if self.shade == ShadeModel::Flat {
                let provoking = tri[2].color;
                for v in &mut tri {
                    v.color = provoking;
                }
            }
            draw_triangle(&mut self.back, &state, &tri, viewport, texture);
        }
    }
}

impl Gl11 for SoftGl {
    fn renderer_string(&self) -> &str {
        "Relic SoftGL 1.1"
    }

    fn extension_supported(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    fn is_context_lost(&self) -> bool {
        self.lost.get()
    }

    fn resize_drawable(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if self.lost.get() {
            bail!("context lost");
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("zero-sized drawable {width}x{height}"));
        }
        self.back.resize(width, height);
        self.front.resize(width, height);
        Ok(())
    }

    fn viewport(&mut self, rect: Rect) {
        self.viewport = rect;
    }

    fn enable(&mut self, cap: Capability) {
        self.caps.insert(cap);
    }

    fn disable(&mut self, cap: Capability) {
        self.caps.remove(&cap);
    }

    fn depth_mask(&mut self, write: bool) {
        self.depth_write = write;
    }

    fn shade_model(&mut self, model: ShadeModel) {
        self.shade = model;
    }

    fn matrix_mode(&mut self, mode: MatrixMode) {
        self.mode = mode;
    }

    fn load_identity(&mut self) {
        self.set_top(Mat4::IDENTITY);
    }

    fn load_matrix(&mut self, matrix: &Mat4) {
        self.set_top(*matrix);
    }

    fn push_matrix(&mut self) {
        let stack = self.stack();
        let top = Self::top(stack);
        stack.push(top);
    }

    fn pop_matrix(&mut self) {
        let stack = self.stack();
        if stack.len() > 1 {
            stack.pop();
        } else {
            log::warn!("SoftGL: matrix stack underflow");
        }
    }

    fn ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        let current = Self::top(self.stack());
        self.set_top(ortho_matrix(left, right, bottom, top, near, far) * current);
    }

    fn light_model_ambient(&mut self, color: [f32; 4]) {
        self.scene_ambient = color;
    }

    fn light(&mut self, index: usize, light: &GlLight) {
        let Some(slot) = self.lights.get_mut(index) else {
            log::warn!("SoftGL: no light unit {index}");
            return;
        };
        let modelview = Self::top(&self.modelview);
        let [x, y, z, w] = light.position;
        let position = modelview.transform_vec4(Vec4::new(x, y, z, w));
        *slot = GlLight {
            position: position.to_array(),
            ..*light
        };
    }

    fn material(&mut self, material: &GlMaterial) {
        self.material = *material;
    }

    fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.color = Vec4::new(r, g, b, a);
    }

    fn gen_texture(&mut self) -> GlTexture {
        let name = self.name();
        self.textures.insert(name, SoftTexture::default());
        GlTexture(name)
    }

    fn bind_texture(&mut self, texture: Option<GlTexture>) {
        self.bound = texture;
    }

    fn tex_image_2d(&mut self, width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<()> {
        let bound = self.bound.ok_or_else(|| anyhow!("no texture bound"))?;
        let texture = self
            .textures
            .get_mut(&bound.0)
            .ok_or_else(|| anyhow!("texture {} does not exist", bound.0))?;
        let mut image = TextureImage::from_rgba(width, height, rgba)
            .ok_or_else(|| anyhow!("{} bytes do not describe a {width}x{height} image", rgba.len()))?;
        if let Some(old) = &texture.image {
            image.filter = old.filter;
            image.wrap = old.wrap;
        }
        texture.image = Some(image);
        Ok(())
    }

    fn tex_parameter(&mut self, param: TexParam) {
        let Some(image) = self
            .bound
            .and_then(|t| self.textures.get_mut(&t.0))
            .and_then(|t| t.image.as_mut())
        else {
            return;
        };
        // No mipmaps: minified lookups use the magnification filter.
        match param {
            TexParam::MinFilter(_) => {}
            TexParam::MagFilter(filter) => image.filter = filter,
            TexParam::Wrap(wrap) => image.wrap = wrap,
        }
    }

    fn delete_texture(&mut self, texture: GlTexture) {
        self.textures.remove(&texture.0);
        if self.bound == Some(texture) {
            self.bound = None;
        }
    }

    fn gen_buffer(&mut self) -> GlBuffer {
        let name = self.name();
        self.buffers.insert(name, Vec::new());
        GlBuffer(name)
    }

    fn buffer_data(&mut self, buffer: GlBuffer, data: &[u8]) {
        match self.buffers.get_mut(&buffer.0) {
            Some(store) => {
                store.clear();
                store.extend_from_slice(data);
            }
            None => log::warn!("SoftGL: buffer {} does not exist", buffer.0),
        }
    }

    fn delete_buffer(&mut self, buffer: GlBuffer) {
        self.buffers.remove(&buffer.0);
    }

    fn draw_elements(&mut self, arrays: &ClientArrays<'_>, indices: ArraySource<'_, u16>, count: usize) {
        let (Some(positions), Some(normals), Some(indices)) = (
            self.fetch(arrays.positions),
            self.fetch(arrays.normals),
            self.fetch(indices),
        ) else {
            log::warn!("SoftGL: draw_elements with a missing buffer");
            return;
        };
        let tex_coords = match arrays.tex_coords.map(|t| self.fetch(t)) {
            Some(None) => {
                log::warn!("SoftGL: draw_elements with a missing texture coordinate buffer");
                return;
            }
            Some(Some(t)) => Some(t),
            None => None,
        };

        let modelview = Self::top(&self.modelview);
        let model_view_projection = modelview * Self::top(&self.projection);
        let normal_matrix = Mat3::normal_matrix(&modelview);
        let lighting = self.caps.contains(&Capability::Lighting);
        let normalize = self.caps.contains(&Capability::Normalize);

        let vertices: Vec<ClipVertex> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let position = Vec3::new(p[0], p[1], p[2]);
                let color = if lighting {
                    let n = normals.get(i).map_or(Vec3::Z, |n| Vec3::new(n[0], n[1], n[2]));
                    let mut n = normal_matrix.transform(n);
                    if normalize {
                        n = n.normalize();
                    }
                    self.light_vertex(modelview.transform_point3(position), n)
                } else {
                    self.color
                };
                let uv = tex_coords
                    .as_ref()
                    .and_then(|t| t.get(i))
                    .map_or(self.tex_coord, |t| Vec2::new(t[0], t[1]));
                ClipVertex {
                    position: model_view_projection.transform_point(position),
                    color,
                    uv,
                }
            })
            .collect();

        let count = count.min(indices.len());
        let triangles: Vec<[ClipVertex; 3]> = indices[..count]
            .chunks_exact(3)
            .filter_map(|tri| {
                let corner = |i: u16| vertices.get(i as usize).copied();
                Some([corner(tri[0])?, corner(tri[1])?, corner(tri[2])?])
            })
            .collect();
        self.draw_triangles(triangles);
    }

    fn begin_quads(&mut self) {
        if self.immediate.is_some() {
            log::warn!("SoftGL: begin inside begin/end");
        }
        self.immediate = Some(Vec::new());
    }

    fn tex_coord2f(&mut self, u: f32, v: f32) {
        self.tex_coord = Vec2::new(u, v);
    }

    fn vertex2f(&mut self, x: f32, y: f32) {
        let vertex = ImmediateVertex {
            position: Vec3::new(x, y, 0.0),
            uv: self.tex_coord,
            color: self.color,
        };
        match &mut self.immediate {
            Some(vertices) => vertices.push(vertex),
            None => log::warn!("SoftGL: vertex outside begin/end"),
        }
    }

    fn end(&mut self) {
        let Some(vertices) = self.immediate.take() else {
            log::warn!("SoftGL: end without begin");
            return;
        };
        let modelview = Self::top(&self.modelview);
        let model_view_projection = modelview * Self::top(&self.projection);
        let lighting = self.caps.contains(&Capability::Lighting);
        let clip: Vec<ClipVertex> = vertices
            .iter()
            .map(|v| ClipVertex {
                position: model_view_projection.transform_point(v.position),
                color: if lighting {
                    self.light_vertex(modelview.transform_point3(v.position), Vec3::Z)
                } else {
                    v.color
                },
                uv: v.uv,
            })
            .collect();
        let triangles: Vec<[ClipVertex; 3]> = clip
            .chunks_exact(4)
            .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
            .collect();
        self.draw_triangles(triangles);
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.clear = Rgba8::new(byte(r), byte(g), byte(b), byte(a));
    }

    fn clear(&mut self) {
        self.back.clear_color(self.clear);
        if self.depth_write {
            self.back.clear_depth(1.0);
        }
    }

    fn finish(&mut self) {}

    fn read_pixels(&mut self, rect: Rect) -> Vec<u8> {
        let height = self.back.height() as i32;
        let top_left = Rect::new(rect.x, height - (rect.y + rect.h), rect.w, rect.h);
        let (w, _, rows) = self.back.read_rect(top_left);
        let stride = w as usize * 4;
        if stride == 0 {
            return rows;
        }
        rows.chunks_exact(stride).rev().flatten().copied().collect()
    }

    fn swap_buffers(&mut self) -> anyhow::Result<()> {
        if self.lost.get() {
            self.textures.clear();
            self.buffers.clear();
            bail!("context lost");
        }
        self.front.copy_from(&self.back);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: u32 = 16;

    /// A triangle covering the lower-left half of NDC, clockwise on screen.
    const POSITIONS: [[f32; 3]; 3] = [[-1.0, 1.0, 0.5], [1.0, -1.0, 0.5], [-1.0, -1.0, 0.5]];
    const NORMALS: [[f32; 3]; 3] = [[0.0, 0.0, -1.0]; 3];

    fn draw(gl: &mut SoftGl, arrays: &ClientArrays<'_>, indices: ArraySource<'_, u16>) {
        gl.clear_color(0.0, 0.0, 0.0, 1.0);
        gl.clear();
        gl.draw_elements(arrays, indices, 3);
        gl.swap_buffers().unwrap();
    }

    fn client_arrays() -> ClientArrays<'static> {
        ClientArrays {
            positions: ArraySource::Client(&POSITIONS),
            normals: ArraySource::Client(&NORMALS),
            tex_coords: None,
        }
    }

    #[test]
    fn test_colour_material_lit_head_on() {
        let mut gl = SoftGl::new(SIZE, SIZE);
        gl.enable(Capability::Lighting);
        gl.enable(Capability::ColorMaterial);
        gl.enable(Capability::Light(0));
        gl.light_model_ambient([0.0, 0.0, 0.0, 1.0]);
        gl.light(
            0,
            &GlLight {
                ambient: [0.0, 0.0, 0.0, 1.0],
                diffuse: [1.0, 1.0, 1.0, 1.0],
                specular: [0.0, 0.0, 0.0, 1.0],
                position: [0.0, 0.0, -1.0, 0.0],
            },
        );
        gl.color4f(0.0, 1.0, 0.0, 1.0);
        draw(&mut gl, &client_arrays(), ArraySource::Client(&[0, 1, 2]));
        assert_eq!(gl.front_buffer().pixel(2, 13), Rgba8::new(0, 255, 0, 255));
        assert_eq!(gl.front_buffer().pixel(13, 2), Rgba8::BLACK);
    }

    #[test]
    fn test_light_position_follows_modelview() {
        let mut gl = SoftGl::new(SIZE, SIZE);
        gl.load_matrix(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        gl.light(1, &default_light(0));
        gl.load_identity();
        let mut point = default_light(0);
        point.position = [0.0, 0.0, 0.0, 1.0];
        gl.push_matrix();
        gl.load_matrix(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        gl.light(2, &point);
        gl.pop_matrix();
        assert_eq!(gl.lights[1].position, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(gl.lights[2].position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(SoftGl::top(&gl.modelview), Mat4::IDENTITY);
    }

    #[test]
    fn test_flat_shading_uses_last_vertex() {
        let mut gl = SoftGl::new(SIZE, SIZE);
        gl.enable(Capability::Lighting);
        gl.enable(Capability::ColorMaterial);
        gl.enable(Capability::Light(0));
        gl.light_model_ambient([0.0, 0.0, 0.0, 1.0]);
        let normals = [[0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, -1.0]];
        let arrays = ClientArrays {
            normals: ArraySource::Client(&normals),
            ..client_arrays()
        };
        gl.light(0, &GlLight { position: [0.0, 0.0, -1.0, 0.0], ..default_light(0) });
        gl.shade_model(ShadeModel::Flat);
        draw(&mut gl, &arrays, ArraySource::Client(&[0, 1, 2]));
        assert_eq!(gl.front_buffer().pixel(2, 13), Rgba8::WHITE);
    }

    #[test]
    fn test_buffer_arrays_match_client_arrays() {
        let mut gl = SoftGl::new(SIZE, SIZE);
        draw(&mut gl, &client_arrays(), ArraySource::Client(&[0, 1, 2]));
        let expected = gl.front_buffer().as_bytes().to_vec();

        let positions = gl.gen_buffer();
        gl.buffer_data(positions, bytemuck::cast_slice(&POSITIONS));
        let normals = gl.gen_buffer();
        gl.buffer_data(normals, bytemuck::cast_slice(&NORMALS));
        let indices = gl.gen_buffer();
        gl.buffer_data(indices, bytemuck::cast_slice(&[0u16, 1, 2]));
        let arrays = ClientArrays {
            positions: ArraySource::Buffer(positions),
            normals: ArraySource::Buffer(normals),
            tex_coords: None,
        };
        draw(&mut gl, &arrays, ArraySource::Buffer(indices));
        assert_eq!(gl.front_buffer().as_bytes(), expected.as_slice());
        assert_eq!(gl.live_buffers(), 3);
    }

    #[test]
    fn test_read_pixels_is_bottom_up() {
        let mut gl = SoftGl::new(SIZE, SIZE);
        draw(&mut gl, &client_arrays(), ArraySource::Client(&[0, 1, 2]));
        let rows = gl.read_pixels(Rect::new(0, 0, 2, 2));
        assert_eq!(&rows[..4], &[255, 255, 255, 255]);
        let top = gl.read_pixels(Rect::new(12, 14, 2, 2));
        assert_eq!(&top[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_lost_context_drops_objects() {
        let mut gl = SoftGl::new(SIZE, SIZE);
        gl.gen_texture();
        gl.lose_handle().set(true);
        assert!(gl.swap_buffers().is_err());
        assert_eq!(gl.live_textures(), 0);
        assert!(gl.resize_drawable(8, 8).is_err());
    }
}
