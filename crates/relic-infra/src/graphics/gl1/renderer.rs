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

//! The OpenGL 1.1 backend.

use super::driver::{
    ArraySource, Capability, ClientArrays, Gl11, GlBuffer, GlLight, GlMaterial, GlTexture,
    MatrixMode, ShadeModel, TexParam, MAX_GL_LIGHTS, VBO_EXTENSION,
};
use crate::graphics::common::{blit_readback, TexturePixels};
use crate::graphics::SamplerDesc;
use anyhow::Context;
use relic_core::math::{FColor, Mat4, Plane};
use relic_core::object::Object;
use relic_core::renderer::api::ui::content_rect;
use relic_core::renderer::{
    Appearance, BackendKind, CacheKey, DrawParams, FrameStats, GroupGeometry, Lookup, Rect,
    RenderError, Renderer, RendererConfig, ResourceCache, ResourceError, SceneLight,
    ViewportTransform, NO_TEXTURE_ID,
};
use relic_core::scene::{Mesh, Surface, Texture};

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy)]
struct CachedTexture {
    name: GlTexture,
    width: u32,
    height: u32,
    bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct MeshBuffers {
    positions: GlBuffer,
    normals: GlBuffer,
    tex_coords: Option<GlBuffer>,
    indices: GlBuffer,
}

#[derive(Debug)]
struct CachedMesh {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    /// Only kept for textured groups.
    tex_coords: Option<Vec<[f32; 2]>>,
    indices: Vec<u16>,
    buffers: Option<MeshBuffers>,
    flat: bool,
    bytes: u64,
}

impl CachedMesh {
    fn new(geometry: &GroupGeometry, textured: bool) -> Self {
        Self {
            positions: geometry.vertices.iter().map(|v| v.position.to_array()).collect(),
            normals: geometry.vertices.iter().map(|v| v.normal.to_array()).collect(),
            tex_coords: textured.then(|| {
                geometry
                    .vertices
                    .iter()
                    .map(|v| [v.tex_coord.x, v.tex_coord.y])
                    .collect()
            }),
            indices: geometry.indices.clone(),
            buffers: None,
            flat: geometry.flat,
            bytes: (geometry.vertex_bytes() + geometry.index_bytes()) as u64,
        }
    }

    fn arrays(&self) -> (ClientArrays<'_>, ArraySource<'_, u16>) {
        match &self.buffers {
            Some(b) => (
                ClientArrays {
                    positions: ArraySource::Buffer(b.positions),
                    normals: ArraySource::Buffer(b.normals),
                    tex_coords: b.tex_coords.map(ArraySource::Buffer),
                },
                ArraySource::Buffer(b.indices),
            ),
            None => (
                ClientArrays {
                    positions: ArraySource::Client(&self.positions),
                    normals: ArraySource::Client(&self.normals),
                    tex_coords: self.tex_coords.as_deref().map(ArraySource::Client),
                },
                ArraySource::Client(&self.indices),
            ),
        }
    }
}

/// Converts a world-space light into a GL light unit in the space of `view`.
fn gl_light(light: &SceneLight, view: &Mat4) -> GlLight {
    let color = light.rgb();
    let color = [color.x, color.y, color.z, 1.0];
    if light.is_ambient() {
        return GlLight {
            ambient: color,
            diffuse: BLACK,
            specular: BLACK,
            position: [0.0, 0.0, 1.0, 0.0],
        };
    }
    if light.is_directional() {
        let d = view.transform_direction(light.direction());
        GlLight {
            ambient: BLACK,
            diffuse: color,
            specular: color,
            position: [-d.x, -d.y, -d.z, 0.0],
        }
    } else {
        let p = view.transform_point3(light.position());
        GlLight {
            ambient: BLACK,
            diffuse: color,
            specular: BLACK,
            position: [p.x, p.y, p.z, 1.0],
        }
    }
}

/// A [`Renderer`] over an OpenGL 1.1 context.
pub struct Gl11Renderer<G: Gl11> {
    gl: G,
    name: String,
    width: u32,
    height: u32,
    transform: ViewportTransform,
    projection: Mat4,
    lights: Vec<SceneLight>,
    /// The view the light units were last uploaded for.
    lights_view: Option<Mat4>,
    use_vbos: bool,

    textures: ResourceCache<CachedTexture>,
    meshes: ResourceCache<CachedMesh>,

    dirty: bool,
    stats: FrameStats,
}

impl<G: Gl11> Gl11Renderer<G> {
    /// Creates the renderer on a current context.
    pub fn new(mut gl: G, width: u32, height: u32, config: &RendererConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!gl.is_context_lost(), "context is lost");
        gl.resize_drawable(width, height)
            .context("failed to size the default framebuffer")?;
        gl.enable(Capability::CullFace);
        if config.dither {
            gl.enable(Capability::Dither);
        } else {
            gl.disable(Capability::Dither);
        }
        let use_vbos = gl.extension_supported(VBO_EXTENSION);
        let name = format!("OpenGL 1.1 ({})", gl.renderer_string());
        log::info!(
            "{name}: {width}x{height}, {}",
            if use_vbos { "buffer objects" } else { "client arrays" }
        );
        let mut renderer = Self {
            gl,
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
            lights_view: None,
            use_vbos,
            textures: ResourceCache::new("gl texture"),
            meshes: ResourceCache::new("gl mesh"),
            dirty: false,
            stats: FrameStats::default(),
        };
        renderer.gl.viewport(Rect::new(0, 0, width as i32, height as i32));
        Ok(renderer)
    }

    /// The underlying context.
    pub fn gl(&self) -> &G {
        &self.gl
    }

    fn upload_texture(&mut self, pixels: &TexturePixels, sampler: SamplerDesc) -> anyhow::Result<CachedTexture> {
        let name = self.gl.gen_texture();
        self.gl.bind_texture(Some(name));
        if let Err(err) = self.gl.tex_image_2d(pixels.width, pixels.height, &pixels.rgba) {
            self.gl.bind_texture(None);
            self.gl.delete_texture(name);
            return Err(err);
        }
        self.gl.tex_parameter(TexParam::MinFilter(sampler.filter));
        self.gl.tex_parameter(TexParam::MagFilter(sampler.filter));
        self.gl.tex_parameter(TexParam::Wrap(sampler.wrap));
        self.gl.bind_texture(None);
        self.stats.texture_uploads += 1;
        self.stats.resident_bytes += pixels.byte_len();
        log::debug!("{}: uploaded {}x{} texture", self.name, pixels.width, pixels.height);
        Ok(CachedTexture {
            name,
            width: pixels.width,
            height: pixels.height,
            bytes: pixels.byte_len(),
        })
    }

    fn upload_mesh(&mut self, mesh: &mut CachedMesh) {
        if self.use_vbos {
            let buffer = |gl: &mut G, data: &[u8]| {
                let name = gl.gen_buffer();
                gl.buffer_data(name, data);
                name
            };
            mesh.buffers = Some(MeshBuffers {
                positions: buffer(&mut self.gl, bytemuck::cast_slice(&mesh.positions)),
                normals: buffer(&mut self.gl, bytemuck::cast_slice(&mesh.normals)),
                tex_coords: mesh
                    .tex_coords
                    .as_ref()
                    .map(|t| buffer(&mut self.gl, bytemuck::cast_slice(t))),
                indices: buffer(&mut self.gl, bytemuck::cast_slice(&mesh.indices)),
            });
        }
        self.stats.mesh_uploads += 1;
        self.stats.resident_bytes += mesh.bytes;
    }

    fn release_texture(&mut self, texture: CachedTexture) {
        self.gl.delete_texture(texture.name);
        self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(texture.bytes);
    }

    fn release_mesh(&mut self, mesh: CachedMesh) {
        if let Some(b) = mesh.buffers {
            for buffer in [Some(b.positions), Some(b.normals), b.tex_coords, Some(b.indices)]
                .into_iter()
                .flatten()
            {
                self.gl.delete_buffer(buffer);
            }
        }
        self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(mesh.bytes);
    }

    fn release_retired(&mut self) {
        for texture in self.textures.take_retired() {
            self.release_texture(texture);
        }
        for mesh in self.meshes.take_retired() {
            self.release_mesh(mesh);
        }
    }

    /// Loads the light units for `view` with an identity modelview.
    fn upload_lights(&mut self, view: &Mat4) {
        self.gl.matrix_mode(MatrixMode::ModelView);
        self.gl.push_matrix();
        self.gl.load_identity();
        for (index, light) in self.lights.iter().enumerate() {
            self.gl.light(index, &gl_light(light, view));
            self.gl.enable(Capability::Light(index));
        }
        self.gl.pop_matrix();
        self.lights_view = Some(*view);
    }
}

impl<G: Gl11> Renderer for Gl11Renderer<G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OpenGl1
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn push_lights(&mut self, lights: &[SceneLight]) {
        if lights.len() > MAX_GL_LIGHTS {
            log::error!(
                "{}: {} lights in the scene, only {MAX_GL_LIGHTS} are enabled",
                self.name,
                lights.len()
            );
        }
        self.lights.clear();
        self.lights
            .extend_from_slice(&lights[..lights.len().min(MAX_GL_LIGHTS)]);
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
        let sampler = SamplerDesc::for_texture(is_ui, scale_x, scale_y);
        let uploaded = self.upload_texture(&pixels, sampler).map_err(|err| {
            log::warn!("{}: texture upload failed: {err:#}", self.name);
            ResourceError::BackendError(format!("{err:#}"))
        })?;
        match lookup {
            Lookup::Stale(id) => {
                if let Some(old) = self.textures.replace(id, version, uploaded) {
                    self.release_texture(old);
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
        let (version, mut cached) = {
            let g = mesh.group(group).ok_or(ResourceError::NotFound)?;
            match self.meshes.lookup(key, g.version) {
                Lookup::Hit(id) => return Ok(id),
                _ => {
                    let geometry = GroupGeometry::from_group(&g)?;
                    (g.version, CachedMesh::new(&geometry, g.texture.is_some()))
                }
            }
        };
        self.upload_mesh(&mut cached);
        match self.meshes.lookup(key, version) {
            Lookup::Stale(id) => {
                if let Some(old) = self.meshes.replace(id, version, cached) {
                    self.release_mesh(old);
                }
                Ok(id)
            }
            _ => {
                let id = self.meshes.insert(key, version, cached);
                self.meshes.watch(mesh, id);
                Ok(id)
            }
        }
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.gl.is_context_lost() {
            return Err(RenderError::DeviceLost);
        }
        self.stats.draw_calls = 0;
        self.stats.skipped_draws = 0;
        self.stats.triangles = 0;

        let gl = &mut self.gl;
        gl.disable(Capability::Blend);
        gl.enable(Capability::DepthTest);
        gl.depth_mask(true);
        gl.enable(Capability::Lighting);
        gl.enable(Capability::ColorMaterial);
        for index in 0..MAX_GL_LIGHTS {
            gl.disable(Capability::Light(index));
        }
        gl.light_model_ambient(BLACK);
        gl.matrix_mode(MatrixMode::Projection);
        gl.load_matrix(&self.projection);
        gl.matrix_mode(MatrixMode::ModelView);
        gl.load_identity();
        self.lights_view = None;
        self.dirty = true;
        Ok(())
    }

    fn enable_transparency(&mut self) {
        self.gl.enable(Capability::Blend);
        self.gl.depth_mask(false);
    }

    fn submit_draw(&mut self, mesh_id: u32, params: &DrawParams, appearance: &Appearance) {
        if self.meshes.get(mesh_id).is_none() {
            self.stats.skipped_draws += 1;
            return;
        }
        if self.lights_view != Some(params.view) {
            self.upload_lights(&params.view);
        }
        let texture = appearance
            .is_textured()
            .then(|| self.textures.get(appearance.texture_id).map(|t| t.name))
            .flatten();

        let Some(mesh) = self.meshes.get(mesh_id) else {
            return;
        };
        let gl = &mut self.gl;
        gl.matrix_mode(MatrixMode::ModelView);
        gl.load_matrix(&params.model_view);
        gl.enable(Capability::Normalize);
        let c = FColor::from(appearance.color);
        gl.color4f(c.r, c.g, c.b, c.a);
        gl.material(&if appearance.shininess != 0.0 {
            GlMaterial {
                specular: [1.0; 4],
                shininess: appearance.shininess,
            }
        } else {
            GlMaterial {
                specular: [0.0; 4],
                shininess: 0.0,
            }
        });
        gl.shade_model(if mesh.flat || appearance.flat {
            ShadeModel::Flat
        } else {
            ShadeModel::Smooth
        });

        let (mut arrays, indices) = mesh.arrays();
        match texture {
            Some(name) if arrays.tex_coords.is_some() => {
                gl.enable(Capability::Texture2D);
                gl.bind_texture(Some(name));
            }
            _ => {
                gl.disable(Capability::Texture2D);
                arrays.tex_coords = None;
            }
        }
        gl.draw_elements(&arrays, indices, mesh.indices.len());

        self.stats.draw_calls += 1;
        self.stats.triangles += (mesh.indices.len() / 3) as u32;
        self.stats.last_draw_vertex_count = mesh.positions.len() as u32;
    }

    fn finalize_frame(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, transform: ViewportTransform) {
        if let Err(err) = self.gl.resize_drawable(width, height) {
            log::error!("{}: failed to resize to {width}x{height}: {err:#}", self.name);
            return;
        }
        self.gl.viewport(Rect::new(0, 0, width as i32, height as i32));
        self.width = width;
        self.height = height;
        self.transform = transform;
        log::debug!("{}: resized to {width}x{height}", self.name);
    }

    fn clear(&mut self, r: f32, g: f32, b: f32) {
        self.dirty = true;
        self.gl.enable(Capability::DepthTest);
        self.gl.depth_mask(true);
        self.gl.clear_color(r, g, b, 1.0);
        self.gl.clear();
    }

    fn flip(&mut self) -> Result<(), RenderError> {
        if self.gl.is_context_lost() {
            log::error!("{}: context lost", self.name);
            return Err(RenderError::DeviceLost);
        }
        if self.dirty {
            if let Err(err) = self.gl.swap_buffers() {
                log::error!("{}: swap failed: {err:#}", self.name);
                return Err(RenderError::DeviceLost);
            }
            self.dirty = false;
        }
        self.release_retired();
        self.stats.frame_number += 1;
        Ok(())
    }

    fn draw_2d_image(&mut self, texture_id: u32, src: Rect, dst: Rect, color: FColor) {
        let texture = if texture_id == NO_TEXTURE_ID {
            None
        } else {
            match self.textures.get(texture_id) {
                Some(t) => Some(*t),
                None => {
                    log::warn!("{}: 2D draw with unknown texture {texture_id}", self.name);
                    self.stats.skipped_draws += 1;
                    return;
                }
            }
        };
        self.dirty = true;

        let t = self.transform;
        let left = -t.offset_x / t.scale;
        let right = (self.width as f32 - t.offset_x) / t.scale;
        let top = -t.offset_y / t.scale;
        let bottom = (self.height as f32 - t.offset_y) / t.scale;

        let gl = &mut self.gl;
        gl.disable(Capability::DepthTest);
        gl.depth_mask(false);
        gl.matrix_mode(MatrixMode::Projection);
        gl.push_matrix();
        gl.load_identity();
        gl.ortho(left, right, bottom, top, -1.0, 1.0);
        gl.matrix_mode(MatrixMode::ModelView);
        gl.push_matrix();
        gl.load_identity();
        gl.disable(Capability::Lighting);
        gl.color4f(color.r, color.g, color.b, color.a);
        gl.enable(Capability::Blend);

        let [u1, v1, u2, v2] = match texture {
            Some(tex) => {
                gl.enable(Capability::Texture2D);
                gl.bind_texture(Some(tex.name));
                let (w, h) = (tex.width as f32, tex.height as f32);
                [
                    src.x as f32 / w,
                    src.y as f32 / h,
                    (src.x + src.w) as f32 / w,
                    (src.y + src.h) as f32 / h,
                ]
            }
            None => {
                gl.disable(Capability::Texture2D);
                [0.0; 4]
            }
        };
        let (x1, y1) = (dst.x as f32, dst.y as f32);
        let (x2, y2) = (x1 + dst.w as f32, y1 + dst.h as f32);
        gl.begin_quads();
        for (u, v, x, y) in [(u1, v1, x1, y1), (u2, v1, x2, y1), (u2, v2, x2, y2), (u1, v2, x1, y2)] {
            gl.tex_coord2f(u, v);
            gl.vertex2f(x, y);
        }
        gl.end();

        gl.matrix_mode(MatrixMode::ModelView);
        gl.pop_matrix();
        gl.matrix_mode(MatrixMode::Projection);
        gl.pop_matrix();
        gl.matrix_mode(MatrixMode::ModelView);
        self.stats.draw_calls += 1;
        self.stats.triangles += 2;
    }

    fn download(&mut self, target: &mut Surface) -> Result<(), RenderError> {
        if self.gl.is_context_lost() {
            return Err(RenderError::DeviceLost);
        }
        let rect = content_rect(self.width, self.height, self.transform);
        if rect.w <= 0 || rect.h <= 0 {
            return Err(RenderError::RenderingFailed("empty content area".to_string()));
        }
        self.gl.finish();
        let gl_rect = Rect::new(rect.x, self.height as i32 - (rect.y + rect.h), rect.w, rect.h);
        let bottom_up = self.gl.read_pixels(gl_rect);
        let stride = rect.w as usize * 4;
        if bottom_up.len() != stride * rect.h as usize {
            return Err(RenderError::RenderingFailed("short read".to_string()));
        }
        let rows: Vec<u8> = bottom_up.chunks_exact(stride).rev().flatten().copied().collect();
        blit_readback(target, &rows, rect.w as u32, rect.h as u32);
        Ok(())
    }

    fn set_dither(&mut self, dither: bool) {
        if dither {
            self.gl.enable(Capability::Dither);
        } else {
            self.gl.disable(Capability::Dither);
        }
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}

impl<G: Gl11> Drop for Gl11Renderer<G> {
    fn drop(&mut self) {
        for texture in self.textures.drain() {
            self.release_texture(texture);
        }
        for mesh in self.meshes.drain() {
            self.release_mesh(mesh);
        }
        log::debug!("{}: released", self.name);
    }
}

impl<G: Gl11> std::fmt::Debug for Gl11Renderer<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gl11Renderer")
            .field("name", &self.name)
            .field("size", &(self.width, self.height))
            .field("use_vbos", &self.use_vbos)
            .field("resident_bytes", &self.stats.resident_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl1::SoftGl;
    use relic_core::math::{Mat3, Rgba8, Vec2, Vec3};
    use relic_core::scene::Vertex;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;

    fn renderer(gl: SoftGl) -> Gl11Renderer<SoftGl> {
        let mut r = Gl11Renderer::new(gl, WIDTH, HEIGHT, &RendererConfig::default()).unwrap();
        r.resize(WIDTH, HEIGHT, ViewportTransform::IDENTITY);
        r.set_projection(&Mat4::perspective_lh(1.0, 4.0 / 3.0, 1.0, 100.0), 1.0, 100.0);
        r
    }

    fn triangle() -> Mesh {
        let mesh = Mesh::new();
        mesh.add_group(3, 1, 3, &[0, 1, 2]).unwrap();
        let n = Vec3::new(0.0, 0.0, -1.0);
        mesh.set_vertices(
            0,
            0,
            &[
                Vertex::new(Vec3::new(-1.0, 1.0, 3.0), n, Vec2::ZERO),
                Vertex::new(Vec3::new(1.0, 1.0, 3.0), n, Vec2::ZERO),
                Vertex::new(Vec3::new(0.0, -1.0, 3.0), n, Vec2::ZERO),
            ],
        )
        .unwrap();
        mesh
    }

    fn draw(r: &mut Gl11Renderer<SoftGl>, mesh: &Mesh) {
        let id = r.get_mesh_id(mesh, 0).unwrap();
        let params = DrawParams {
            model_view: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
        };
        let appearance = Appearance {
            color: Rgba8::new(128, 128, 128, 255),
            shininess: 0.0,
            texture_id: NO_TEXTURE_ID,
            flat: false,
        };
        r.begin_frame().unwrap();
        r.clear(0.0, 0.0, 0.0);
        r.submit_draw(id, &params, &appearance);
        r.finalize_frame().unwrap();
        r.flip().unwrap();
    }

    #[test]
    fn test_directional_light_reaches_full_base_colour() {
        let mut r = renderer(SoftGl::new(WIDTH, HEIGHT));
        r.push_lights(&[SceneLight::new(FColor::WHITE, None, Some(Vec3::Z))]);
        draw(&mut r, &triangle());
        let center = r.gl().front_buffer().pixel(WIDTH / 2, HEIGHT / 2);
        assert_eq!(center, Rgba8::new(128, 128, 128, 255));
    }

    #[test]
    fn test_client_arrays_without_vbo_extension() {
        let mut with_vbo = renderer(SoftGl::new(WIDTH, HEIGHT));
        let mut without = renderer(SoftGl::without_vbo(WIDTH, HEIGHT));
        let mesh = triangle();
        for r in [&mut with_vbo, &mut without] {
            r.push_lights(&[SceneLight::ambient(FColor::WHITE)]);
            draw(r, &mesh);
        }
        assert_eq!(with_vbo.gl().live_buffers(), 3);
        assert_eq!(without.gl().live_buffers(), 0);
        assert_eq!(
            with_vbo.gl().front_buffer().as_bytes(),
            without.gl().front_buffer().as_bytes()
        );
    }

    #[test]
    fn test_evicted_mesh_deletes_buffers() {
        let mut r = renderer(SoftGl::new(WIDTH, HEIGHT));
        let mesh = triangle();
        r.get_mesh_id(&mesh, 0).unwrap();
        assert!(r.stats().resident_bytes > 0);
        drop(mesh);
        r.flip().unwrap();
        assert_eq!(r.gl().live_buffers(), 0);
        assert_eq!(r.stats().resident_bytes, 0);
    }

    #[test]
    fn test_lights_beyond_eight_are_dropped() {
        let mut r = renderer(SoftGl::new(WIDTH, HEIGHT));
        r.push_lights(&vec![SceneLight::ambient(FColor::WHITE); 10]);
        assert_eq!(r.lights.len(), MAX_GL_LIGHTS);
    }

    #[test]
    fn test_lost_context_reports_device_lost() {
        let mut r = renderer(SoftGl::new(WIDTH, HEIGHT));
        r.clear(0.0, 0.0, 0.0);
        r.gl().lose_handle().set(true);
        assert_eq!(r.flip(), Err(RenderError::DeviceLost));
        assert_eq!(r.begin_frame(), Err(RenderError::DeviceLost));
    }

    #[test]
    fn test_download_returns_rows_top_first() {
        let mut r = renderer(SoftGl::new(WIDTH, HEIGHT));
        let texture = Texture::new(Surface::filled(2, 2, Rgba8::WHITE));
        let id = r.get_texture_id(&texture, true, 1.0, 1.0).unwrap();
        r.clear(0.0, 0.0, 0.0);
        let top_half = Rect::new(0, 0, WIDTH as i32, HEIGHT as i32 / 2);
        r.draw_2d_image(id, Rect::new(0, 0, 2, 2), top_half, FColor::WHITE);
        r.flip().unwrap();

        let mut out = Surface::new_rgba(WIDTH, HEIGHT);
        r.download(&mut out).unwrap();
        assert_eq!(out.pixel(1, 1), Rgba8::WHITE);
        assert_eq!(out.pixel(1, HEIGHT - 2), Rgba8::BLACK);
    }
}
