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

//! The fixed-function device backend.
//!
//! Transform and lighting run on the CPU. Each group is moved to view space,
//! lit there with fixed-function rules, clipped against the near and far
//! planes, projected, and handed to the device as screen-space vertices.
//! Meshes stay in host memory; only textures live on the device.

use super::driver::{FixedDevice, FixedTexture, RenderState, ShadeMode, TlVertex};
use crate::graphics::common::{blit_readback, TexturePixels};
use crate::graphics::SamplerDesc;
use crate::raster::shading::{shade_fixed_function, ShadePoint};
use crate::raster::{clip_polygon, to_screen, ClipVertex, ScreenVertex};
use anyhow::Context;
use relic_core::math::{pack_argb, FColor, Mat4, Plane, Vec3, Vec4};
use relic_core::math::color::unit_to_byte;
use relic_core::object::Object;
use relic_core::renderer::api::ui::content_rect;
use relic_core::renderer::{
    Appearance, BackendKind, CacheKey, DrawParams, FrameStats, GroupGeometry, Lookup, Rect,
    RenderError, Renderer, RendererConfig, ResourceCache, ResourceError, SceneLight,
    ViewportTransform, NO_TEXTURE_ID,
};
use relic_core::scene::{Mesh, Surface, Texture, Vertex};

/// Hardware light slots.
pub const MAX_FIXED_LIGHTS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct CachedTexture {
    handle: FixedTexture,
    width: u32,
    height: u32,
    bytes: u64,
}

#[derive(Debug, Clone)]
struct CachedMesh {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    center: Vec3,
    radius: f32,
    bytes: u64,
}

impl CachedMesh {
    fn new(geometry: GroupGeometry) -> Self {
        let count = geometry.vertices.len().max(1) as f32;
        let sum = geometry
            .vertices
            .iter()
            .fold(Vec3::ZERO, |acc, v| acc + v.position);
        let center = sum * (1.0 / count);
        let radius = geometry
            .vertices
            .iter()
            .map(|v| (v.position - center).length())
            .fold(0.0, f32::max);
        let bytes = (geometry.vertex_bytes() + geometry.index_bytes()) as u64;
        Self {
            vertices: geometry.vertices,
            indices: geometry.indices,
            center,
            radius,
            bytes,
        }
    }

    /// Whether the bounding sphere, carried to view space, touches the frustum.
    fn visible(&self, model_view: &Mat4, planes: &[Plane; 6]) -> bool {
        let center = model_view.transform_point3(self.center);
        let scale = (0..3)
            .map(|i| model_view.row(i).truncate().length())
            .fold(0.0, f32::max);
        let radius = self.radius * scale;
        planes.iter().all(|p| p.distance(center) >= -radius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Opaque,
    Transparent,
    Ui,
}

fn pack_color(c: Vec4) -> u32 {
    pack_argb(unit_to_byte(c.w), unit_to_byte(c.x), unit_to_byte(c.y), unit_to_byte(c.z))
}

fn tl_vertex(v: &ScreenVertex) -> TlVertex {
    TlVertex {
        x: v.x,
        y: v.y,
        z: v.z,
        rhw: v.rhw,
        diffuse: pack_color(v.color),
        tu: v.uv.x,
        tv: v.uv.y,
    }
}

/// Carries world-space lights into the space of `view`.
fn lights_in_view(lights: &[SceneLight], view: &Mat4) -> Vec<SceneLight> {
    lights
        .iter()
        .map(|light| {
            if light.is_ambient() {
                return *light;
            }
            let rgb = light.rgb();
            let color = FColor::new(rgb.x, rgb.y, rgb.z, 1.0);
            if light.is_positional() {
                SceneLight::new(color, Some(view.transform_point3(light.position())), None)
            } else {
                SceneLight::new(color, None, Some(view.transform_direction(light.direction())))
            }
        })
        .collect()
}

/// A [`Renderer`] that performs transform and lighting itself.
pub struct FixedRenderer<D: FixedDevice> {
    device: D,
    name: String,
    width: u32,
    height: u32,
    transform: ViewportTransform,
    projection: Mat4,
    planes: Option<[Plane; 6]>,
    lights: Vec<SceneLight>,

    textures: ResourceCache<CachedTexture>,
    meshes: ResourceCache<CachedMesh>,

    scene_open: bool,
    mode: Option<Mode>,
    dither: bool,
    stats: FrameStats,
    scratch: Vec<TlVertex>,
}

impl<D: FixedDevice> FixedRenderer<D> {
    /// Creates the renderer and sizes the device.
    pub fn new(
        mut device: D,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "zero-sized back buffer");
        anyhow::ensure!(!device.is_lost(), "device is lost");
        device
            .reset(width, height)
            .context("failed to create back buffers")?;
        device.set_render_state(RenderState::Dither(config.dither));
        let name = format!("Fixed function ({})", device.name());
        log::info!("{name}: {width}x{height}");
        Ok(Self {
            device,
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
            planes: None,
            lights: Vec::new(),
            textures: ResourceCache::new("fixed texture"),
            meshes: ResourceCache::new("fixed mesh"),
            scene_open: false,
            mode: None,
            dither: config.dither,
            stats: FrameStats::default(),
            scratch: Vec::new(),
        })
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    fn start_scene(&mut self) -> Result<(), RenderError> {
        if self.scene_open {
            return Ok(());
        }
        if self.device.is_lost() {
            return Err(RenderError::DeviceLost);
        }
        self.device.begin_scene().map_err(|err| {
            log::error!("{}: begin_scene failed: {err:#}", self.name);
            RenderError::DeviceLost
        })?;
        self.scene_open = true;
        Ok(())
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode == Some(mode) {
            return;
        }
        let (z_enable, z_write, blend, cull) = match mode {
            Mode::Opaque => (true, true, false, true),
            Mode::Transparent => (true, false, true, true),
            Mode::Ui => (false, false, true, false),
        };
        for state in [
            RenderState::ZEnable(z_enable),
            RenderState::ZWrite(z_write),
            RenderState::AlphaBlend(blend),
            RenderState::CullBack(cull),
        ] {
            self.device.set_render_state(state);
        }
        self.mode = Some(mode);
    }

    fn release(&mut self, texture: CachedTexture) {
        self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(texture.bytes);
        self.device.release_texture(texture.handle);
    }

    fn release_retired(&mut self) {
        for texture in self.textures.take_retired() {
            self.release(texture);
        }
        for mesh in self.meshes.take_retired() {
            self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(mesh.bytes);
        }
    }
}

/// Lights, clips and projects one group into a screen-space triangle list.
fn transform_group(
    mesh: &CachedMesh,
    params: &DrawParams,
    appearance: &Appearance,
    lights: &[SceneLight],
    projection: &Mat4,
    viewport: Rect,
    out: &mut Vec<TlVertex>,
) {
    let base = FColor::from(appearance.color);
    let base = Vec4::new(base.r, base.g, base.b, base.a);
    let model_view_projection = params.model_view * *projection;
    let lit: Vec<ClipVertex> = mesh
        .vertices
        .iter()
        .map(|v| {
            let world_normal = params.normal_matrix.transform(v.normal);
            let point = ShadePoint {
                position: params.model_view.transform_point3(v.position),
                normal: params.view.transform_direction(world_normal).normalize(),
                eye: Vec3::ZERO,
            };
            ClipVertex {
                position: model_view_projection.transform_point(v.position),
                color: shade_fixed_function(lights, &point, base, appearance.shininess),
                uv: v.tex_coord,
            }
        })
        .collect();

    out.clear();
    for tri in mesh.indices.chunks_exact(3) {
        let corners = [tri[0], tri[1], tri[2]].map(|i| lit.get(i as usize).copied());
        let [Some(a), Some(b), Some(c)] = corners else {
            continue;
        };
        let mut triangle = [a, b, c];
        if appearance.flat {
            triangle[1].color = a.color;
            triangle[2].color = a.color;
        }
        let polygon = clip_polygon(&triangle);
        if polygon.len() < 3 {
            continue;
        }
        let screen: Vec<ScreenVertex> = polygon.iter().map(|v| to_screen(v, viewport)).collect();
        for i in 1..screen.len() - 1 {
            out.extend([&screen[0], &screen[i], &screen[i + 1]].map(tl_vertex));
        }
    }
}

impl<D: FixedDevice> Renderer for FixedRenderer<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::FixedFunction
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

    fn set_frustum_planes(&mut self, planes: &[Plane; 6]) {
        self.planes = Some(*planes);
    }

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
        let handle = self
            .device
            .create_texture(pixels.width, pixels.height, &pixels.rgba, sampler)
            .map_err(|err| {
                log::warn!("{}: texture creation failed: {err:#}", self.name);
                ResourceError::BackendError(format!("{err:#}"))
            })?;
        let uploaded = CachedTexture {
            handle,
            width: pixels.width,
            height: pixels.height,
            bytes: pixels.byte_len(),
        };
        self.stats.texture_uploads += 1;
        self.stats.resident_bytes += uploaded.bytes;
        log::debug!(
            "{}: uploaded {}x{} texture",
            self.name,
            uploaded.width,
            uploaded.height
        );
        match lookup {
            Lookup::Stale(id) => {
                // The managed pool keeps the old texture alive while in use.
                if let Some(old) = self.textures.replace(id, version, uploaded) {
                    self.release(old);
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
        let cached = CachedMesh::new(geometry);
        self.stats.mesh_uploads += 1;
        self.stats.resident_bytes += cached.bytes;
        match self.meshes.lookup(key, version) {
            Lookup::Stale(id) => {
                if let Some(old) = self.meshes.replace(id, version, cached) {
                    self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(old.bytes);
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
        self.stats.draw_calls = 0;
        self.stats.skipped_draws = 0;
        self.stats.triangles = 0;
        let positional = self.lights.iter().filter(|l| !l.is_ambient()).count();
        if positional > MAX_FIXED_LIGHTS {
            log::error!(
                "{}: {positional} lights in the scene, only {MAX_FIXED_LIGHTS} are enabled",
                self.name
            );
            let mut kept = 0;
            self.lights.retain(|l| {
                if l.is_ambient() {
                    return true;
                }
                kept += 1;
                kept <= MAX_FIXED_LIGHTS
            });
        }
        self.start_scene()?;
        self.set_mode(Mode::Opaque);
        Ok(())
    }

    fn enable_transparency(&mut self) {
        self.set_mode(Mode::Transparent);
    }

    fn submit_draw(&mut self, mesh_id: u32, params: &DrawParams, appearance: &Appearance) {
        let Some(mesh) = self.meshes.get(mesh_id) else {
            self.stats.skipped_draws += 1;
            return;
        };
        if let Some(planes) = &self.planes {
            if !mesh.visible(&params.model_view, planes) {
                return;
            }
        }
        let vertex_count = mesh.vertices.len() as u32;
        let lights = lights_in_view(&self.lights, &params.view);
        let viewport = Rect::new(0, 0, self.width as i32, self.height as i32);
        transform_group(
            mesh,
            params,
            appearance,
            &lights,
            &self.projection,
            viewport,
            &mut self.scratch,
        );
        let texture = appearance
            .is_textured()
            .then(|| self.textures.get(appearance.texture_id).map(|t| t.handle))
            .flatten();

        if matches!(self.mode, None | Some(Mode::Ui)) {
            self.set_mode(Mode::Opaque);
        }
        self.device.set_render_state(RenderState::Shade(if appearance.flat {
            ShadeMode::Flat
        } else {
            ShadeMode::Gouraud
        }));
        self.device.set_texture(texture);
        self.device.draw_primitive_up(&self.scratch);
        self.stats.draw_calls += 1;
        self.stats.triangles += (self.scratch.len() / 3) as u32;
        self.stats.last_draw_vertex_count = vertex_count;
    }

    fn finalize_frame(&mut self) -> Result<(), RenderError> {
        if self.mode == Some(Mode::Transparent) {
            self.set_mode(Mode::Opaque);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, transform: ViewportTransform) {
        if width == 0 || height == 0 {
            log::warn!("{}: ignoring resize to {width}x{height}", self.name);
            return;
        }
        if self.scene_open {
            self.device.end_scene();
            self.scene_open = false;
        }
        if let Err(err) = self.device.reset(width, height) {
            log::error!("{}: failed to reset the device: {err:#}", self.name);
            return;
        }
        // Render states do not survive a reset.
        self.mode = None;
        self.device.set_render_state(RenderState::Dither(self.dither));
        self.width = width;
        self.height = height;
        self.transform = transform;
        log::debug!("{}: resized to {width}x{height}", self.name);
    }

    fn clear(&mut self, r: f32, g: f32, b: f32) {
        if let Err(err) = self.start_scene() {
            log::warn!("{}: clear skipped: {err}", self.name);
            return;
        }
        self.device.clear(pack_color(Vec4::new(r, g, b, 1.0)), 1.0);
    }

    fn flip(&mut self) -> Result<(), RenderError> {
        if self.scene_open {
            self.device.end_scene();
            self.scene_open = false;
        }
        self.mode = None;
        self.stats.frame_number += 1;
        if let Err(err) = self.device.present() {
            log::error!("{}: present failed: {err:#}", self.name);
            return Err(RenderError::DeviceLost);
        }
        self.release_retired();
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
        if let Err(err) = self.start_scene() {
            log::warn!("{}: 2D draw skipped: {err}", self.name);
            return;
        }
        let [u0, v0, u1, v1] = match texture {
            Some(t) => {
                let (w, h) = (t.width as f32, t.height as f32);
                [
                    src.x as f32 / w,
                    src.y as f32 / h,
                    (src.x + src.w) as f32 / w,
                    (src.y + src.h) as f32 / h,
                ]
            }
            None => [0.0; 4],
        };
        let (left, top) = self.transform.to_window(dst.x as f32, dst.y as f32);
        let (right, bottom) = self
            .transform
            .to_window((dst.x + dst.w) as f32, (dst.y + dst.h) as f32);
        let diffuse = pack_color(Vec4::new(color.r, color.g, color.b, color.a));
        let corner = |x: f32, y: f32, tu: f32, tv: f32| TlVertex {
            x,
            y,
            z: 0.0,
            rhw: 1.0,
            diffuse,
            tu,
            tv,
        };
        let tl = corner(left, top, u0, v0);
        let tr = corner(right, top, u1, v0);
        let bl = corner(left, bottom, u0, v1);
        let br = corner(right, bottom, u1, v1);

        self.set_mode(Mode::Ui);
        self.device.set_render_state(RenderState::Shade(ShadeMode::Gouraud));
        self.device.set_texture(texture.map(|t| t.handle));
        self.device.draw_primitive_up(&[tl, tr, br, tl, br, bl]);
        self.stats.draw_calls += 1;
        self.stats.triangles += 2;
    }

    fn download(&mut self, target: &mut Surface) -> Result<(), RenderError> {
        if self.device.is_lost() {
            return Err(RenderError::DeviceLost);
        }
        let rect = content_rect(self.width, self.height, self.transform);
        if rect.w <= 0 || rect.h <= 0 {
            return Err(RenderError::RenderingFailed("empty content area".to_string()));
        }
        let pixels = self.device.read_front(rect);
        blit_readback(target, &pixels, rect.w as u32, rect.h as u32);
        Ok(())
    }

    fn set_dither(&mut self, dither: bool) {
        self.dither = dither;
        self.device.set_render_state(RenderState::Dither(dither));
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}

impl<D: FixedDevice> Drop for FixedRenderer<D> {
    fn drop(&mut self) {
        if self.scene_open {
            self.device.end_scene();
        }
        self.device.set_texture(None);
        for texture in self.textures.drain() {
            self.release(texture);
        }
        log::debug!("{}: released", self.name);
    }
}

impl<D: FixedDevice> std::fmt::Debug for FixedRenderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedRenderer")
            .field("name", &self.name)
            .field("size", &(self.width, self.height))
            .field("lights", &self.lights.len())
            .field("resident_bytes", &self.stats.resident_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::fixed::SoftFixedDevice;
    use relic_core::math::{Mat3, Rgba8, Vec2};

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;

    fn renderer() -> FixedRenderer<SoftFixedDevice> {
        let mut r =
            FixedRenderer::new(SoftFixedDevice::new(), WIDTH, HEIGHT, &RendererConfig::default())
                .unwrap();
        r.resize(WIDTH, HEIGHT, ViewportTransform::IDENTITY);
        r.set_projection(&Mat4::perspective_lh(1.0, 4.0 / 3.0, 1.0, 100.0), 1.0, 100.0);
        r
    }

    /// A clockwise (on screen) triangle facing a camera looking down +z.
    fn triangle(z: f32) -> Mesh {
        let mesh = Mesh::new();
        mesh.add_group(3, 1, 3, &[0, 1, 2]).unwrap();
        let n = Vec3::new(0.0, 0.0, -1.0);
        mesh.set_vertices(
            0,
            0,
            &[
                Vertex::new(Vec3::new(-1.0, 1.0, z), n, Vec2::ZERO),
                Vertex::new(Vec3::new(1.0, 1.0, z), n, Vec2::ZERO),
                Vertex::new(Vec3::new(0.0, -1.0, z), n, Vec2::ZERO),
            ],
        )
        .unwrap();
        mesh
    }

    fn params(model_view: Mat4) -> DrawParams {
        DrawParams {
            model_view,
            world: model_view,
            view: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
        }
    }

    fn grey() -> Appearance {
        Appearance {
            color: Rgba8::new(128, 128, 128, 255),
            shininess: 0.0,
            texture_id: NO_TEXTURE_ID,
            flat: false,
        }
    }

    fn draw(r: &mut FixedRenderer<SoftFixedDevice>, mesh: &Mesh) {
        let id = r.get_mesh_id(mesh, 0).unwrap();
        r.begin_frame().unwrap();
        r.clear(0.0, 0.0, 0.0);
        r.submit_draw(id, &params(Mat4::IDENTITY), &grey());
        r.finalize_frame().unwrap();
        r.flip().unwrap();
    }

    #[test]
    fn test_directional_light_lights_in_view_space() {
        let mut r = renderer();
        r.push_lights(&[SceneLight::new(FColor::WHITE, None, Some(Vec3::Z))]);
        draw(&mut r, &triangle(3.0));
        let center = r.device().front_buffer().pixel(WIDTH / 2, HEIGHT / 2);
        assert_eq!(center, Rgba8::new(128, 128, 128, 255));

        r.push_lights(&[SceneLight::new(FColor::WHITE, None, Some(-Vec3::Z))]);
        draw(&mut r, &triangle(3.0));
        let center = r.device().front_buffer().pixel(WIDTH / 2, HEIGHT / 2);
        assert_eq!(center, Rgba8::BLACK);
    }

    #[test]
    fn test_triangle_behind_camera_is_clipped() {
        let mut r = renderer();
        r.push_lights(&[SceneLight::ambient(FColor::WHITE)]);
        draw(&mut r, &triangle(-3.0));
        assert_eq!(r.stats().triangles, 0);
        assert_eq!(r.device().front_buffer().count_not(Rgba8::BLACK), 0);

        draw(&mut r, &triangle(3.0));
        assert_eq!(r.stats().triangles, 1);
        assert!(r.device().front_buffer().count_not(Rgba8::BLACK) > 0);
    }

    #[test]
    fn test_group_outside_frustum_is_culled() {
        let mut r = renderer();
        let planes = relic_core::viewport::view_frustum_planes(&r.projection, 1.0, 100.0);
        r.set_frustum_planes(&planes);
        let mesh = triangle(3.0);
        let id = r.get_mesh_id(&mesh, 0).unwrap();
        r.begin_frame().unwrap();
        r.submit_draw(id, &params(Mat4::from_translation(Vec3::new(500.0, 0.0, 0.0))), &grey());
        assert_eq!(r.stats().draw_calls, 0);
        r.submit_draw(id, &params(Mat4::IDENTITY), &grey());
        assert_eq!(r.stats().draw_calls, 1);
    }

    #[test]
    fn test_lost_device_fails_flip_and_frame() {
        let mut r = renderer();
        let lose = r.device().lose_handle();
        lose.set(true);
        assert_eq!(r.flip(), Err(RenderError::DeviceLost));
        assert_eq!(r.begin_frame(), Err(RenderError::DeviceLost));
    }

    #[test]
    fn test_refreshed_texture_releases_the_old_one() {
        let mut r = renderer();
        let texture = Texture::new(Surface::filled(2, 2, Rgba8::WHITE));
        let id = r.get_texture_id(&texture, false, 1.0, 1.0).unwrap();
        texture.update_surface(|s| s.put_pixel(0, 0, Rgba8::BLACK));
        assert_eq!(r.get_texture_id(&texture, false, 1.0, 1.0).unwrap(), id);
        assert_eq!(r.device().live_textures(), 1);
        assert_eq!(r.stats().resident_bytes, 16);

        drop(texture);
        r.flip().unwrap();
        assert_eq!(r.device().live_textures(), 0);
        assert_eq!(r.stats().resident_bytes, 0);
    }

    #[test]
    fn test_2d_image_fills_destination() {
        let mut r = renderer();
        let texture = Texture::new(Surface::filled(4, 4, Rgba8::WHITE));
        let id = r.get_texture_id(&texture, true, 1.0, 1.0).unwrap();
        r.clear(0.0, 0.0, 0.0);
        r.draw_2d_image(id, Rect::new(0, 0, 4, 4), Rect::new(0, 0, 32, 24), FColor::WHITE);
        r.flip().unwrap();
        let front = r.device().front_buffer();
        assert_eq!(front.pixel(10, 10), Rgba8::WHITE);
        assert_eq!(front.pixel(40, 30), Rgba8::BLACK);
    }
}
