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

//! Viewports: the camera, its projection, and the per-frame walk that turns a
//! frame hierarchy into renderer calls.
//!
//! ```text
//! render(root)
//!   ├─ camera world ─► view (rigid inverse) ─► view * projection
//!   ├─ lights (depth-first over children) ─► push_lights, begin_frame
//!   ├─ frustum planes ─► set_frustum_planes
//!   ├─ meshes: cull, opaque draws now, blended draws deferred by depth
//!   └─ enable_transparency, deferred draws far to near, finalize_frame
//! ```

mod pick;

pub use self::pick::PickHit;

use crate::device::DeviceShared;
use crate::math::{FColor, Mat3, Mat4, Plane, Vec3, Vec4};
use crate::object::{Object, ObjectCore};
use crate::renderer::{
    error::RenderError, Appearance, DrawParams, Renderer, SceneLight, NO_TEXTURE_ID,
};
use crate::scene::{Frame, LightType, Mesh, Visual, WeakFrame};
use crate::status::{RmError, RmResult};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Projection kinds. Only perspective projection is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    /// Perspective projection.
    Perspective,
    /// Orthographic projection; accepted and treated as perspective.
    Orthographic,
}

/// A blended draw waiting for the back-to-front pass.
#[derive(Debug, Clone, Copy)]
struct DeferredDraw {
    mesh_id: u32,
    params: DrawParams,
    appearance: Appearance,
    depth: f32,
}

#[derive(Debug)]
struct ViewportState {
    width: u32,
    height: u32,
    camera: Option<Frame>,
    root: WeakFrame,
    front: f32,
    back: f32,
    field: f32,
    background: u32,
    projection: Mat4,
    inverse_projection: Mat4,
    view: Mat4,
    view_projection: Mat4,
    frustum: [Plane; 6],
}

struct ViewportInner {
    core: ObjectCore,
    device: Weak<DeviceShared>,
    state: RefCell<ViewportState>,
}

/// A shared viewport handle.
#[derive(Clone)]
pub struct Viewport(Rc<ViewportInner>);

/// Builds the six view-space frustum planes: left, right, top, bottom, near, far.
///
/// Normals point inward, so a point is inside when every distance is >= 0.
/// The side planes are taken from the focal terms of `projection`, so they
/// follow the aspect correction applied for the render target.
pub fn view_frustum_planes(projection: &Mat4, front: f32, back: f32) -> [Plane; 6] {
    let tan_x = 1.0 / projection.m[0][0];
    let tan_y = 1.0 / projection.m[1][1];
    [
        Plane::new(Vec3::new(1.0, 0.0, tan_x).normalize(), 0.0),
        Plane::new(Vec3::new(-1.0, 0.0, tan_x).normalize(), 0.0),
        Plane::new(Vec3::new(0.0, -1.0, tan_y).normalize(), 0.0),
        Plane::new(Vec3::new(0.0, 1.0, tan_y).normalize(), 0.0),
        Plane::new(Vec3::Z, -front),
        Plane::new(-Vec3::Z, back),
    ]
}

/// Whether any part of `mesh`'s box, transformed by `model_view`, can be inside the frustum.
pub fn mesh_in_frustum(mesh: &Mesh, model_view: &Mat4, planes: &[Plane; 6]) -> bool {
    let bounds = mesh.bounding_box();
    if bounds.is_empty() {
        return false;
    }
    let corners = bounds.corners().map(|c| model_view.transform_point3(c));
    !planes
        .iter()
        .any(|plane| corners.iter().all(|&c| plane.distance(c) < 0.0))
}

fn light_from_frame(light_type: LightType, argb: u32, world: &Mat4) -> SceneLight {
    let color = FColor::from_argb(argb);
    let position = light_type.is_positional().then(|| world.translation());
    let direction = light_type
        .is_directional()
        .then(|| world.row(2).truncate());
    SceneLight::new(color, position, direction)
}

/// Collects lights depth-first over child frames, accumulating world transforms.
fn collect_lights(frame: &Frame, parent_world: &Mat4, out: &mut Vec<SceneLight>) {
    let world = frame.transform() * *parent_world;
    for light in frame.lights().snapshot() {
        out.push(light_from_frame(light.light_type(), light.color(), &world));
    }
    for child in frame.children().snapshot() {
        collect_lights(&child, &world, out);
    }
}

/// Visits every frame reachable from `frame`: child frames, then frames used
/// as visuals that are not also children. `visit` receives the frame, its
/// world transform and the path from the root. Cycles through frame visuals
/// are cut.
pub(crate) fn walk_frames(
    frame: &Frame,
    parent_world: &Mat4,
    path: &mut Vec<Frame>,
    visit: &mut dyn FnMut(&Frame, &Mat4, &[Frame]),
) {
    if path.iter().any(|f| f == frame) {
        log::warn!("Frame {:?} references itself; skipping the cycle.", frame.id());
        return;
    }
    let world = frame.transform() * *parent_world;
    path.push(frame.clone());
    visit(frame, &world, path);
    let children = frame.children().snapshot();
    for child in &children {
        walk_frames(child, &world, path, visit);
    }
    for visual in frame.visuals().snapshot() {
        if let Visual::Frame(instance) = visual {
            if !children.contains(&instance) {
                walk_frames(&instance, &world, path, visit);
            }
        }
    }
    path.pop();
}

impl ViewportState {
    fn camera_world(&self) -> Mat4 {
        self.camera
            .as_ref()
            .map_or(Mat4::IDENTITY, |camera| camera.world_transform())
    }

    fn refresh_view(&mut self) {
        self.view = self.camera_world().rigid_inverse();
        self.view_projection = self.view * self.projection;
    }

    /// Rebuilds the projection for a renderer of `window` pixels.
    fn update_projection(&mut self, window: (u32, u32)) {
        let virtual_aspect = self.width as f32 / self.height as f32;
        let window_aspect = window.0.max(1) as f32 / window.1.max(1) as f32;
        let base = self.front / self.field;
        let mut f_h = base;
        let mut f_v = base * virtual_aspect;
        if window_aspect >= virtual_aspect {
            f_h *= virtual_aspect / window_aspect;
        } else {
            f_v *= window_aspect / virtual_aspect;
        }
        self.projection = Mat4::perspective_lh(f_h, f_v, self.front, self.back);
        self.inverse_projection = Mat4::perspective_lh_inverse(f_h, f_v, self.front, self.back);
        self.view_projection = self.view * self.projection;
    }

    fn render_scene(&mut self, root: &Frame, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        self.background = root.scene_background();
        self.refresh_view();

        let mut lights = Vec::new();
        collect_lights(root, &Mat4::IDENTITY, &mut lights);
        renderer.push_lights(&lights);
        renderer.begin_frame()?;

        self.frustum = view_frustum_planes(&self.projection, self.front, self.back);
        renderer.set_frustum_planes(&self.frustum);

        let mut deferred = Vec::new();
        let mut path = Vec::new();
        walk_frames(root, &Mat4::IDENTITY, &mut path, &mut |frame, world, _| {
            for visual in frame.visuals().snapshot() {
                if let Visual::Mesh(mesh) = visual {
                    self.draw_mesh(&mesh, world, renderer, &mut deferred);
                }
            }
        });

        deferred.sort_by(|a: &DeferredDraw, b| b.depth.total_cmp(&a.depth));
        renderer.enable_transparency();
        for draw in &deferred {
            renderer.submit_draw(draw.mesh_id, &draw.params, &draw.appearance);
        }

        renderer.finalize_frame()
    }

    fn draw_mesh(
        &self,
        mesh: &Mesh,
        world: &Mat4,
        renderer: &mut dyn Renderer,
        deferred: &mut Vec<DeferredDraw>,
    ) {
        let model_view = *world * self.view;
        if !mesh_in_frustum(mesh, &model_view, &self.frustum) {
            return;
        }
        let params = DrawParams {
            model_view,
            world: *world,
            view: self.view,
            normal_matrix: Mat3::normal_matrix(world),
        };
        for index in 0..mesh.group_count() {
            let Some((color, shininess, texture, flat)) = mesh.group(index).map(|g| {
                (
                    g.color,
                    g.material.as_ref().map_or(0.0, |m| m.power()),
                    g.texture.clone(),
                    g.is_flat(),
                )
            }) else {
                continue;
            };
            let texture_id = match texture {
                Some(texture) => renderer
                    .get_texture_id(&texture, false, 1.0, 1.0)
                    .unwrap_or_else(|err| {
                        log::warn!("Drawing group {index} of {:?} untextured: {err}", mesh.id());
                        NO_TEXTURE_ID
                    }),
                None => NO_TEXTURE_ID,
            };
            let mesh_id = match renderer.get_mesh_id(mesh, index) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("Skipping group {index} of {:?}: {err}", mesh.id());
                    continue;
                }
            };
            let appearance = Appearance {
                color,
                shininess,
                texture_id,
                flat,
            };
            if color.is_opaque() {
                renderer.submit_draw(mesh_id, &params, &appearance);
            } else {
                let clip = self.view_projection.transform_point(world.translation());
                deferred.push(DeferredDraw {
                    mesh_id,
                    params,
                    appearance,
                    depth: (clip.z / clip.w + 1.0) * 0.5,
                });
            }
        }
    }
}

impl Viewport {
    pub(crate) fn new(
        device: &Rc<DeviceShared>,
        width: u32,
        height: u32,
        camera: Option<&Frame>,
    ) -> Self {
        let mut state = ViewportState {
            width,
            height,
            camera: camera.cloned(),
            root: WeakFrame::default(),
            front: 1.0,
            back: 10.0,
            field: 0.5,
            background: 0xFF00_0000,
            projection: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            frustum: [Plane::new(Vec3::ZERO, 0.0); 6],
        };
        state.refresh_view();
        let viewport = Viewport(Rc::new(ViewportInner {
            core: ObjectCore::new(),
            device: Rc::downgrade(device),
            state: RefCell::new(state),
        }));
        viewport.update_projection();
        viewport
    }

    fn device(&self) -> RmResult<Rc<DeviceShared>> {
        self.0.device.upgrade().ok_or(RmError::GenericFailure)
    }

    /// Rebuilds the projection for the current renderer size and pushes it.
    pub(crate) fn update_projection(&self) {
        let device = self.0.device.upgrade();
        let mut state = self.0.state.borrow_mut();
        let window = device
            .as_ref()
            .and_then(|d| d.renderer_size())
            .unwrap_or((state.width, state.height));
        state.update_projection(window);
        let (projection, front, back) = (state.projection, state.front, state.back);
        drop(state);
        if let Some(device) = device {
            let _ = device.with_renderer(|r| r.set_projection(&projection, front, back));
        }
    }

    /// Virtual width.
    pub fn width(&self) -> u32 {
        self.0.state.borrow().width
    }

    /// Virtual height.
    pub fn height(&self) -> u32 {
        self.0.state.borrow().height
    }

    /// Sets the camera frame.
    pub fn set_camera(&self, camera: Option<&Frame>) {
        self.0.state.borrow_mut().camera = camera.cloned();
    }

    /// The camera frame.
    pub fn camera(&self) -> Option<Frame> {
        self.0.state.borrow().camera.clone()
    }

    /// Sets the projection type. Rendering always uses perspective.
    pub fn set_projection(&self, projection: ProjectionType) -> RmResult<()> {
        if projection != ProjectionType::Perspective {
            log::debug!("{projection:?} projection requested; rendering stays perspective.");
        }
        Ok(())
    }

    /// The projection type.
    pub fn projection(&self) -> ProjectionType {
        ProjectionType::Perspective
    }

    /// Sets the front clipping plane distance.
    pub fn set_front(&self, front: f32) -> RmResult<()> {
        {
            let mut state = self.0.state.borrow_mut();
            if front.is_nan() || front <= 0.0 || front >= state.back {
                return Err(RmError::InvalidParameter);
            }
            state.front = front;
        }
        self.update_projection();
        Ok(())
    }

    /// The front clipping plane distance.
    pub fn front(&self) -> f32 {
        self.0.state.borrow().front
    }

    /// Sets the back clipping plane distance.
    pub fn set_back(&self, back: f32) -> RmResult<()> {
        {
            let mut state = self.0.state.borrow_mut();
            if back.is_nan() || back <= state.front {
                return Err(RmError::InvalidParameter);
            }
            state.back = back;
        }
        self.update_projection();
        Ok(())
    }

    /// The back clipping plane distance.
    pub fn back(&self) -> f32 {
        self.0.state.borrow().back
    }

    /// Sets the field: half the height of the view window at the front plane.
    pub fn set_field(&self, field: f32) -> RmResult<()> {
        if field.is_nan() || field <= 0.0 {
            return Err(RmError::InvalidParameter);
        }
        self.0.state.borrow_mut().field = field;
        self.update_projection();
        Ok(())
    }

    /// The field.
    pub fn field(&self) -> f32 {
        self.0.state.borrow().field
    }

    /// The current projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        self.0.state.borrow().projection
    }

    /// The view matrix computed by the last render or transform.
    pub fn view_matrix(&self) -> Mat4 {
        self.0.state.borrow().view
    }

    /// Renders the hierarchy under `root` through the camera.
    pub fn render(&self, root: &Frame) -> RmResult<()> {
        let device = self.device()?;
        let result = {
            let mut slot = device.renderer.borrow_mut();
            let renderer = slot.as_deref_mut().ok_or(RmError::GenericFailure)?;
            let mut state = self.0.state.borrow_mut();
            state.root = root.downgrade();
            state.render_scene(root, renderer)
        };
        device.check(result)
    }

    /// Accepted for compatibility; the whole viewport is redrawn every frame.
    pub fn force_update(&self, _x: i32, _y: i32, _w: i32, _h: i32) -> RmResult<()> {
        Ok(())
    }

    /// Clears to the background colour of the last rendered root.
    pub fn clear(&self) -> RmResult<()> {
        let device = self.device()?;
        let c = FColor::from_argb(self.0.state.borrow().background);
        device.with_renderer(|r| r.clear(c.r, c.g, c.b))
    }

    /// Projects a world point to homogeneous screen coordinates
    /// `(sx * w, sy * w, z, w)` over the virtual resolution, y down.
    pub fn transform(&self, world: Vec3) -> RmResult<Vec4> {
        let mut state = self.0.state.borrow_mut();
        state.refresh_view();
        let clip = state.view_projection.transform_point(world);
        if clip.w == 0.0 {
            return Err(RmError::InvalidParameter);
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        let sx = (ndc_x * 0.5 + 0.5) * state.width as f32;
        let sy = (-ndc_y * 0.5 + 0.5) * state.height as f32;
        Ok(Vec4::new(sx * clip.w, sy * clip.w, clip.z, clip.w))
    }

    /// Inverts [`Viewport::transform`].
    pub fn inverse_transform(&self, screen: Vec4) -> RmResult<Vec3> {
        if screen.w == 0.0 {
            return Err(RmError::InvalidParameter);
        }
        let mut state = self.0.state.borrow_mut();
        state.refresh_view();
        let sx = screen.x / screen.w;
        let sy = screen.y / screen.w;
        let ndc_x = sx / state.width as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - sy / state.height as f32 * 2.0;
        let clip = Vec4::new(ndc_x * screen.w, ndc_y * screen.w, screen.z, screen.w);
        let view = state.inverse_projection.transform_vec4(clip);
        let world = state.camera_world().transform_vec4(view);
        if world.w != 0.0 {
            Ok(world.truncate() / world.w)
        } else {
            Ok(world.truncate())
        }
    }

    /// Casts a ray through a virtual-resolution point and returns every mesh
    /// hit under the last rendered root, nearest first.
    pub fn pick(&self, x: f32, y: f32) -> RmResult<Vec<PickHit>> {
        let state = self.0.state.borrow();
        let root = state.root.upgrade().ok_or(RmError::GenericFailure)?;
        let ray = pick::build_pick_ray(
            x,
            y,
            state.width,
            state.height,
            &state.camera_world(),
            state.front,
            state.field,
        );
        drop(state);
        Ok(pick::pick_scene(&root, &ray))
    }
}

impl Object for Viewport {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Viewport {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Viewport")
            .field("id", &self.id())
            .field("width", &state.width)
            .field("height", &state.height)
            .field("front", &state.front)
            .field("back", &state.back)
            .field("field", &state.field)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::math::Vec2;
    use crate::renderer::RendererConfig;
    use crate::scene::{Light, Vertex};
    use crate::testing::{Call, CallLog, RecordingRenderer};

    fn close(a: f32, b: f32) -> bool {
        approx::abs_diff_eq!(a, b, epsilon = 1e-3)
    }

    fn device() -> (Device, CallLog) {
        let renderer = RecordingRenderer::new(640, 480);
        let log = renderer.log.clone();
        let device = Device::new(640, 480, Box::new(renderer), &RendererConfig::default());
        (device, log)
    }

    fn quad_mesh(argb: u32) -> Mesh {
        let mesh = Mesh::new();
        let g = mesh.add_group(4, 2, 3, &[0, 1, 2, 0, 2, 3]).unwrap();
        let n = Vec3::new(0.0, 0.0, -1.0);
        let verts = [
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), n, Vec2::ZERO),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), n, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), n, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), n, Vec2::ZERO),
        ];
        mesh.set_vertices(g, 0, &verts).unwrap();
        mesh.set_group_color(g, argb).unwrap();
        mesh
    }

    fn framed(root: &Frame, mesh: &Mesh, z: f32) -> Frame {
        let frame = Frame::new();
        frame.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, z)));
        frame.add_visual(mesh).unwrap();
        root.add_child(&frame).unwrap();
        frame
    }

    fn camera_at(z: f32) -> Frame {
        let camera = Frame::new();
        camera.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, z)));
        camera
    }

    fn submitted_depths(log: &CallLog) -> Vec<Option<f32>> {
        log.borrow()
            .iter()
            .filter_map(|call| match call {
                Call::SubmitDraw { params, .. } => Some(Some(params.world.translation().z)),
                Call::EnableTransparency => Some(None),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_projection_maps_front_to_zero_and_back_to_one() {
        let (device, _) = device();
        let viewport = device.create_viewport(None, 0, 0, 640, 480).unwrap();
        assert_eq!(viewport.projection_matrix().m[2][3], 1.0);

        let front = viewport.transform(Vec3::new(0.0, 0.0, 1.0)).unwrap();
        assert!(close(front.z / front.w, 0.0));
        let back = viewport.transform(Vec3::new(0.0, 0.0, 10.0)).unwrap();
        assert!(close(back.z / back.w, 1.0));
    }

    #[test]
    fn test_frustum_planes_bound_the_projection() {
        let projection = Mat4::perspective_lh(2.0, 2.0, 1.0, 10.0);
        let planes = view_frustum_planes(&projection, 1.0, 10.0);
        // A point on the right edge at depth 4 sits on the right plane.
        assert!(close(planes[1].distance(Vec3::new(2.0, 0.0, 4.0)), 0.0));
        assert!(planes.iter().all(|p| p.distance(Vec3::new(0.0, 0.0, 5.0)) > 0.0));
        assert!(planes[4].distance(Vec3::new(0.0, 0.0, 0.5)) < 0.0);
        assert!(planes[5].distance(Vec3::new(0.0, 0.0, 11.0)) < 0.0);
    }

    #[test]
    fn test_blended_draws_follow_opaque_far_to_near() {
        let (device, log) = device();
        let camera = camera_at(-5.0);
        let viewport = device.create_viewport(Some(&camera), 0, 0, 640, 480).unwrap();

        let root = Frame::new();
        let glass = quad_mesh(0x80FF_FFFF);
        framed(&root, &glass, 1.0);
        framed(&root, &quad_mesh(0xFFFF_0000), 0.0);
        framed(&root, &glass, 3.0);

        log.borrow_mut().clear();
        viewport.render(&root).unwrap();

        assert_eq!(
            submitted_depths(&log),
            vec![Some(0.0), None, Some(3.0), Some(1.0)]
        );
        let calls = log.borrow();
        assert!(matches!(calls.first(), Some(Call::PushLights(_))));
        assert!(matches!(calls.get(1), Some(Call::BeginFrame)));
        assert!(matches!(calls.last(), Some(Call::FinalizeFrame)));
    }

    #[test]
    fn test_mesh_behind_camera_is_culled() {
        let (device, log) = device();
        let viewport = device.create_viewport(None, 0, 0, 640, 480).unwrap();
        let root = Frame::new();
        framed(&root, &quad_mesh(0xFFFF_FFFF), -4.0);
        framed(&root, &quad_mesh(0xFFFF_FFFF), 50.0);

        log.borrow_mut().clear();
        viewport.render(&root).unwrap();
        assert_eq!(submitted_depths(&log), vec![None]);
    }

    #[test]
    fn test_lights_take_frame_world_transform() {
        let (device, log) = device();
        let viewport = device.create_viewport(None, 0, 0, 640, 480).unwrap();
        let root = Frame::new();
        let lamp = Frame::new();
        lamp.set_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        lamp.add_light(&Light::new(LightType::Point, 0xFFFF_0000))
            .unwrap();
        root.add_child(&lamp).unwrap();
        root.add_light(&Light::new(LightType::Ambient, 0xFF40_4040))
            .unwrap();

        log.borrow_mut().clear();
        viewport.render(&root).unwrap();
        let calls = log.borrow();
        let Some(Call::PushLights(lights)) = calls.first() else {
            panic!("expected lights first, got {calls:?}");
        };
        assert_eq!(lights.len(), 2);
        assert!(lights[0].is_ambient());
        assert!(lights[1].is_positional());
        assert_eq!(lights[1].position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(close(lights[1].rgb().x, 1.0));
    }

    #[test]
    fn test_view_matrix_inverts_camera() {
        let (device, _) = device();
        let camera = Frame::new();
        camera.set_transform(
            Mat4::from_rotation_y(0.4) * Mat4::from_translation(Vec3::new(1.0, 2.0, -6.0)),
        );
        let viewport = device.create_viewport(Some(&camera), 0, 0, 640, 480).unwrap();
        viewport.render(&Frame::new()).unwrap();

        let expected = camera.world_transform().inverse().unwrap();
        let view = viewport.view_matrix();
        for row in 0..4 {
            for col in 0..4 {
                assert!(close(view.m[row][col], expected.m[row][col]));
            }
        }
    }

    #[test]
    fn test_transform_round_trip() {
        let (device, _) = device();
        let camera = Frame::new();
        camera.set_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, -5.0)));
        let viewport = device.create_viewport(Some(&camera), 0, 0, 640, 480).unwrap();

        let point = Vec3::new(0.5, 0.3, 2.0);
        let screen = viewport.transform(point).unwrap();
        let back = viewport.inverse_transform(screen).unwrap();
        assert!(close(back.x, point.x) && close(back.y, point.y) && close(back.z, point.z));

        let centre = viewport.transform(Vec3::new(1.0, 2.0, 0.0)).unwrap();
        assert!(close(centre.x / centre.w, 320.0));
        assert!(close(centre.y / centre.w, 240.0));
    }

    #[test]
    fn test_clip_planes_are_validated() {
        let (device, _) = device();
        let viewport = device.create_viewport(None, 0, 0, 640, 480).unwrap();
        assert_eq!(viewport.set_front(0.0), Err(RmError::InvalidParameter));
        assert_eq!(viewport.set_front(10.0), Err(RmError::InvalidParameter));
        assert_eq!(viewport.set_back(0.5), Err(RmError::InvalidParameter));
        assert_eq!(viewport.set_field(f32::NAN), Err(RmError::InvalidParameter));
        viewport.set_front(2.0).unwrap();
        viewport.set_back(100.0).unwrap();
        assert_eq!((viewport.front(), viewport.back()), (2.0, 100.0));
        // front / field doubles when front does.
        assert!(close(viewport.projection_matrix().m[0][0], 4.0));
    }

    #[test]
    fn test_pick_uses_last_rendered_root() {
        let (device, _) = device();
        let camera = camera_at(-5.0);
        let viewport = device.create_viewport(Some(&camera), 0, 0, 640, 480).unwrap();
        assert_eq!(viewport.pick(320.0, 240.0).unwrap_err(), RmError::GenericFailure);

        let root = Frame::new();
        let mesh = quad_mesh(0xFFFF_FFFF);
        let holder = framed(&root, &mesh, 0.0);
        viewport.render(&root).unwrap();

        let hits = viewport.pick(320.0, 240.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].frames, vec![root, holder]);
        assert!(close(hits[0].distance, 5.0));
        assert!(viewport.pick(5.0, 5.0).unwrap().is_empty());
    }

    #[test]
    fn test_frame_visual_cycle_is_cut() {
        let (device, log) = device();
        let camera = camera_at(-5.0);
        let viewport = device.create_viewport(Some(&camera), 0, 0, 640, 480).unwrap();
        let root = Frame::new();
        let instance = framed(&root, &quad_mesh(0xFFFF_FFFF), 0.0);
        assert_eq!(instance.add_visual(&root), Err(RmError::InvalidParameter));
        let loose = Frame::new();
        instance.add_visual(&loose).unwrap();
        loose.add_visual(&instance).unwrap();

        log.borrow_mut().clear();
        viewport.render(&root).unwrap();
        assert_eq!(submitted_depths(&log), vec![Some(0.0), None]);
    }
}
