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

//! A recording renderer for unit tests.

use crate::math::{FColor, Mat4, Plane};
use crate::object::Object;
use crate::renderer::{
    error::{RenderError, ResourceError},
    Appearance, BackendKind, CacheKey, DrawParams, FrameStats, GroupGeometry, Lookup, Rect,
    Renderer, ResourceCache, SceneLight, ViewportTransform,
};
use crate::scene::{Mesh, Surface, Texture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    PushLights(Vec<SceneLight>),
    SetProjection(Mat4),
    SetFrustumPlanes,
    BeginFrame,
    EnableTransparency,
    SubmitDraw {
        mesh_id: u32,
        vertex_count: usize,
        appearance: Appearance,
        params: DrawParams,
    },
    FinalizeFrame,
    Resize(u32, u32, ViewportTransform),
    Clear(f32, f32, f32),
    Flip,
    Draw2d(u32, Rect, Rect),
    Download,
    SetDither(bool),
}

pub(crate) type CallLog = Rc<RefCell<Vec<Call>>>;

#[derive(Debug)]
pub(crate) struct RecordingRenderer {
    pub log: CallLog,
    pub lose_device_on_flip: Rc<Cell<bool>>,
    width: u32,
    height: u32,
    meshes: ResourceCache<usize>,
    textures: ResourceCache<()>,
    stats: FrameStats,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            lose_device_on_flip: Rc::new(Cell::new(false)),
            width,
            height,
            meshes: ResourceCache::new("mesh"),
            textures: ResourceCache::new("texture"),
            stats: FrameStats::default(),
        }
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl Renderer for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::UnifiedGpu
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn push_lights(&mut self, lights: &[SceneLight]) {
        self.record(Call::PushLights(lights.to_vec()));
    }

    fn set_projection(&mut self, projection: &Mat4, _front: f32, _back: f32) {
        self.record(Call::SetProjection(*projection));
    }

    fn set_frustum_planes(&mut self, _planes: &[Plane; 6]) {
        self.record(Call::SetFrustumPlanes);
    }

    fn get_texture_id(
        &mut self,
        texture: &Texture,
        _is_ui: bool,
        _scale_x: f32,
        _scale_y: f32,
    ) -> Result<u32, ResourceError> {
        let key = CacheKey::new(texture.id(), 0);
        Ok(match self.textures.lookup(key, texture.version()) {
            Lookup::Hit(id) => id,
            Lookup::Stale(id) => {
                self.textures.set_version(id, texture.version());
                self.stats.texture_uploads += 1;
                id
            }
            Lookup::Miss => {
                let id = self.textures.insert(key, texture.version(), ());
                self.textures.watch(texture, id);
                self.stats.texture_uploads += 1;
                id
            }
        })
    }

    fn get_mesh_id(&mut self, mesh: &Mesh, group: usize) -> Result<u32, ResourceError> {
        let g = mesh.group(group).ok_or(ResourceError::NotFound)?;
        let key = CacheKey::new(mesh.id(), group);
        match self.meshes.lookup(key, g.version) {
            Lookup::Hit(id) => Ok(id),
            Lookup::Stale(id) => {
                let geometry = GroupGeometry::from_group(&g)?;
                self.meshes.replace(id, g.version, geometry.vertices.len());
                self.stats.mesh_uploads += 1;
                Ok(id)
            }
            Lookup::Miss => {
                let geometry = GroupGeometry::from_group(&g)?;
                let id = self.meshes.insert(key, g.version, geometry.vertices.len());
                self.meshes.watch(mesh, id);
                self.stats.mesh_uploads += 1;
                Ok(id)
            }
        }
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.stats.draw_calls = 0;
        self.record(Call::BeginFrame);
        Ok(())
    }

    fn enable_transparency(&mut self) {
        self.record(Call::EnableTransparency);
    }

    fn submit_draw(&mut self, mesh_id: u32, params: &DrawParams, appearance: &Appearance) {
        let Some(&vertex_count) = self.meshes.get(mesh_id) else {
            self.stats.skipped_draws += 1;
            return;
        };
        self.stats.draw_calls += 1;
        self.stats.last_draw_vertex_count = vertex_count as u32;
        self.record(Call::SubmitDraw {
            mesh_id,
            vertex_count,
            appearance: *appearance,
            params: *params,
        });
    }

    fn finalize_frame(&mut self) -> Result<(), RenderError> {
        self.record(Call::FinalizeFrame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, transform: ViewportTransform) {
        self.width = width;
        self.height = height;
        self.record(Call::Resize(width, height, transform));
    }

    fn clear(&mut self, r: f32, g: f32, b: f32) {
        self.record(Call::Clear(r, g, b));
    }

    fn flip(&mut self) -> Result<(), RenderError> {
        self.record(Call::Flip);
        if self.lose_device_on_flip.replace(false) {
            return Err(RenderError::DeviceLost);
        }
        self.stats.frame_number += 1;
        Ok(())
    }

    fn draw_2d_image(&mut self, texture_id: u32, src: Rect, dst: Rect, _color: FColor) {
        self.record(Call::Draw2d(texture_id, src, dst));
    }

    fn download(&mut self, _target: &mut Surface) -> Result<(), RenderError> {
        self.record(Call::Download);
        Ok(())
    }

    fn set_dither(&mut self, dither: bool) {
        self.record(Call::SetDither(dither));
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}
