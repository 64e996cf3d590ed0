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

//! Frames: the transform hierarchy of the scene graph.
//!
//! A frame owns its children and shares its visuals and lights. The link to
//! the parent is weak, so a subtree never keeps its ancestors alive.

use super::{collection::Collection, light::Light, texture::Texture, Visual};
use crate::math::{color::pack_rgb_f32, pack_argb, Mat4, Vec3};
use crate::object::{Object, ObjectCore};
use crate::status::{RmError, RmResult};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// How a transform passed to [`Frame::add_transform`] combines with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineType {
    /// Replace the local transform.
    Replace,
    /// Apply before the current transform.
    Before,
    /// Apply after the current transform.
    After,
}

/// Where a frame's meshes take their material from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialMode {
    /// Use the mesh's own materials.
    FromMesh,
    /// Use the parent's material.
    FromParent,
    /// Use the frame's material.
    FromFrame,
}

struct FrameInner {
    core: ObjectCore,
    transform: Cell<Mat4>,
    background: Cell<u32>,
    color: Cell<u32>,
    material_mode: Cell<MaterialMode>,
    texture: RefCell<Option<Texture>>,
    parent: RefCell<Weak<FrameInner>>,
    children: Collection<Frame>,
    visuals: Collection<Visual>,
    lights: Collection<Light>,
}

/// A shared frame handle.
#[derive(Clone)]
pub struct Frame(Rc<FrameInner>);

impl Frame {
    /// Creates a detached frame with an identity transform.
    pub fn new() -> Self {
        Frame(Rc::new(FrameInner {
            core: ObjectCore::new(),
            transform: Cell::new(Mat4::IDENTITY),
            background: Cell::new(pack_argb(0xFF, 0, 0, 0)),
            color: Cell::new(pack_argb(0xFF, 0xFF, 0xFF, 0xFF)),
            material_mode: Cell::new(MaterialMode::FromMesh),
            texture: RefCell::new(None),
            parent: RefCell::new(Weak::new()),
            children: Collection::new(),
            visuals: Collection::new(),
            lights: Collection::new(),
        }))
    }

    /// Returns the parent frame, if it is still alive.
    pub fn parent(&self) -> Option<Frame> {
        self.0.parent.borrow().upgrade().map(Frame)
    }

    fn is_self_or_ancestor(&self, other: &Frame) -> bool {
        let mut cursor = Some(self.clone());
        while let Some(frame) = cursor {
            if frame == *other {
                return true;
            }
            cursor = frame.parent();
        }
        false
    }

    /// Attaches `child`, detaching it from its previous parent first.
    ///
    /// Adding a child that already belongs to this frame is a no-op. Adding
    /// this frame or one of its ancestors is rejected.
    pub fn add_child(&self, child: &Frame) -> RmResult<()> {
        if self.is_self_or_ancestor(child) {
            return Err(RmError::InvalidParameter);
        }
        if let Some(old) = child.parent() {
            if old == *self {
                return Ok(());
            }
            old.0.children.remove_first(|c| c == child);
        }
        child.0.parent.replace(Rc::downgrade(&self.0));
        self.0.children.push(child.clone());
        Ok(())
    }

    /// Detaches `child` without destroying it.
    pub fn delete_child(&self, child: &Frame) -> RmResult<()> {
        if !self.0.children.remove_first(|c| c == child) {
            return Err(RmError::NotFound);
        }
        child.0.parent.replace(Weak::new());
        Ok(())
    }

    /// The live list of children.
    pub fn children(&self) -> Collection<Frame> {
        self.0.children.clone()
    }

    /// Attaches a mesh or an instanced frame.
    pub fn add_visual(&self, visual: impl Into<Visual>) -> RmResult<()> {
        let visual = visual.into();
        if let Visual::Frame(f) = &visual {
            if self.is_self_or_ancestor(f) {
                return Err(RmError::InvalidParameter);
            }
        }
        self.0.visuals.push(visual);
        Ok(())
    }

    /// Detaches the first occurrence of a visual.
    pub fn delete_visual(&self, visual: impl Into<Visual>) -> RmResult<()> {
        let visual = visual.into();
        if self.0.visuals.remove_first(|v| *v == visual) {
            Ok(())
        } else {
            Err(RmError::InvalidParameter)
        }
    }

    /// The live list of visuals.
    pub fn visuals(&self) -> Collection<Visual> {
        self.0.visuals.clone()
    }

    /// Attaches a light.
    pub fn add_light(&self, light: &Light) -> RmResult<()> {
        self.0.lights.push(light.clone());
        Ok(())
    }

    /// Detaches the first occurrence of a light.
    pub fn delete_light(&self, light: &Light) -> RmResult<()> {
        if self.0.lights.remove_first(|l| l == light) {
            Ok(())
        } else {
            Err(RmError::InvalidParameter)
        }
    }

    /// The live list of lights.
    pub fn lights(&self) -> Collection<Light> {
        self.0.lights.clone()
    }

    /// Whether a visual is attached to this frame.
    pub fn has_visual(&self, visual: &Visual) -> bool {
        self.0.visuals.any(|v| v == visual)
    }

    /// Combines `matrix` into the local transform.
    ///
    /// Only [`CombineType::Replace`] is supported.
    pub fn add_transform(&self, combine: CombineType, matrix: Mat4) -> RmResult<()> {
        match combine {
            CombineType::Replace => {
                self.0.transform.set(matrix);
                Ok(())
            }
            other => {
                log::warn!("Frame::add_transform: combine type {other:?} is not implemented");
                Err(RmError::GenericFailure)
            }
        }
    }

    /// Replaces the local transform.
    pub fn set_transform(&self, matrix: Mat4) {
        self.0.transform.set(matrix);
    }

    /// The local transform.
    pub fn transform(&self) -> Mat4 {
        self.0.transform.get()
    }

    /// The transform from this frame to the root: `local * parent_world`.
    pub fn world_transform(&self) -> Mat4 {
        let mut world = self.transform();
        let mut cursor = self.parent();
        while let Some(frame) = cursor {
            world = world * frame.transform();
            cursor = frame.parent();
        }
        world
    }

    /// The local position. Positions relative to another frame are not supported.
    pub fn position(&self, reference: Option<&Frame>) -> RmResult<Vec3> {
        if reference.is_some() {
            log::warn!("Frame::position: reference frames are not supported");
            return Err(RmError::GenericFailure);
        }
        let m = self.transform();
        let w = m.m[3][3];
        Ok(m.translation() / w)
    }

    /// Sets the background colour used when this frame is the render root.
    pub fn set_scene_background_rgb(&self, r: f32, g: f32, b: f32) {
        self.0.background.set(pack_rgb_f32(r, g, b));
    }

    /// Sets the background colour from an `0xAARRGGBB` word.
    pub fn set_scene_background(&self, argb: u32) {
        self.0.background.set(argb);
    }

    /// The background colour as `0xAARRGGBB`.
    pub fn scene_background(&self) -> u32 {
        self.0.background.get()
    }

    /// Sets the frame colour from an `0xAARRGGBB` word.
    pub fn set_color(&self, argb: u32) {
        self.0.color.set(argb);
    }

    /// Sets the frame colour from float channels; alpha is forced to opaque.
    pub fn set_color_rgb(&self, r: f32, g: f32, b: f32) {
        self.0.color.set(pack_rgb_f32(r, g, b));
    }

    /// The frame colour as `0xAARRGGBB`.
    pub fn color(&self) -> u32 {
        self.0.color.get()
    }

    /// Sets the frame texture.
    pub fn set_texture(&self, texture: Option<&Texture>) -> RmResult<()> {
        let texture = texture.ok_or(RmError::GenericFailure)?;
        self.0.texture.replace(Some(texture.clone()));
        Ok(())
    }

    /// Returns the frame texture.
    pub fn texture(&self) -> RmResult<Texture> {
        self.0.texture.borrow().clone().ok_or(RmError::GenericFailure)
    }

    /// Sets the material mode. Stored only; renderers use mesh materials.
    pub fn set_material_mode(&self, mode: MaterialMode) {
        self.0.material_mode.set(mode);
    }

    /// The material mode.
    pub fn material_mode(&self) -> MaterialMode {
        self.0.material_mode.get()
    }

    /// Number of live handles to this frame.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Creates a non-owning reference.
    pub fn downgrade(&self) -> WeakFrame {
        WeakFrame(Rc::downgrade(&self.0))
    }
}

/// A non-owning frame reference.
#[derive(Clone, Default)]
pub struct WeakFrame(Weak<FrameInner>);

impl WeakFrame {
    /// Returns the frame if it is still alive.
    pub fn upgrade(&self) -> Option<Frame> {
        self.0.upgrade().map(Frame)
    }
}

impl std::fmt::Debug for WeakFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakFrame(alive: {})", self.0.strong_count() > 0)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Frame {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id())
            .field("children", &self.0.children.len())
            .field("visuals", &self.0.visuals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{approx_eq, FRAC_PI_2};
    use crate::object::Destroyable;
    use crate::scene::{LightType, Mesh};

    fn vec3_approx_eq(a: Vec3, b: Vec3) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    #[test]
    fn test_add_child_reparents_exactly_once() {
        let a = Frame::new();
        let b = Frame::new();
        let c = Frame::new();
        a.add_child(&c).unwrap();
        a.add_child(&c).unwrap();
        assert_eq!(a.children().len(), 1);

        let a_children = a.children();
        b.add_child(&c).unwrap();
        assert_eq!(b.children().snapshot(), vec![c.clone()]);
        assert!(a_children.is_empty());
        assert_eq!(c.parent(), Some(b.clone()));
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let root = Frame::new();
        let child = Frame::new();
        root.add_child(&child).unwrap();
        assert_eq!(child.add_child(&root), Err(RmError::InvalidParameter));
        assert_eq!(root.add_child(&root), Err(RmError::InvalidParameter));
        assert_eq!(child.add_visual(&root), Err(RmError::InvalidParameter));
    }

    #[test]
    fn test_delete_child() {
        let p = Frame::new();
        let c = Frame::new();
        assert_eq!(p.delete_child(&c), Err(RmError::NotFound));
        p.add_child(&c).unwrap();
        p.delete_child(&c).unwrap();
        assert!(c.parent().is_none());
        assert!(p.children().is_empty());
    }

    #[test]
    fn test_parent_link_is_weak() {
        let child = Frame::new();
        {
            let parent = Frame::new();
            parent.add_child(&child).unwrap();
            assert!(child.parent().is_some());
        }
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_visuals_and_lights_are_live() {
        let f = Frame::new();
        let visuals = f.visuals();
        let mesh = Mesh::new();
        f.add_visual(&mesh).unwrap();
        assert_eq!(visuals.len(), 1);
        f.delete_visual(&mesh).unwrap();
        assert!(visuals.is_empty());
        assert_eq!(f.delete_visual(&mesh), Err(RmError::InvalidParameter));

        let light = Light::new(LightType::Ambient, 0xFFFFFFFF);
        let lights = f.lights();
        f.add_light(&light).unwrap();
        assert_eq!(lights.get(0), Some(light.clone()));
        f.delete_light(&light).unwrap();
        assert!(lights.is_empty());
    }

    #[test]
    fn test_world_composition_is_local_then_parent() {
        let parent = Frame::new();
        let child = Frame::new();
        parent.add_child(&child).unwrap();
        parent.set_transform(Mat4::from_rotation_z(FRAC_PI_2));
        child.set_transform(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let world = child.world_transform();
        // L * W: the child offset is rotated by the parent.
        assert!(vec3_approx_eq(world.translation(), Vec3::new(0.0, 1.0, 0.0)));
        let wrong = parent.transform() * child.transform();
        assert!(!vec3_approx_eq(wrong.translation(), world.translation()));
    }

    #[test]
    fn test_add_transform_and_position() {
        let f = Frame::new();
        let m = Mat4::from_translation(Vec3::new(2.0, 4.0, 6.0));
        f.add_transform(CombineType::Replace, m).unwrap();
        assert_eq!(f.position(None), Ok(Vec3::new(2.0, 4.0, 6.0)));
        assert_eq!(
            f.add_transform(CombineType::Before, m),
            Err(RmError::GenericFailure)
        );
        assert_eq!(f.position(Some(&Frame::new())), Err(RmError::GenericFailure));
    }

    #[test]
    fn test_colors_and_texture() {
        let f = Frame::new();
        f.set_scene_background_rgb(1.0, 0.0, 0.0);
        assert_eq!(f.scene_background(), 0xFFFF0000);
        f.set_color(0x11223344);
        assert_eq!(f.color(), 0x11223344);
        assert_eq!(f.texture().err(), Some(RmError::GenericFailure));
        assert_eq!(f.set_texture(None), Err(RmError::GenericFailure));
    }

    #[test]
    fn test_destroying_frame_releases_children() {
        let released = Rc::new(Cell::new(false));
        let child = Frame::new();
        let flag = released.clone();
        child.add_destroy_callback(Box::new(move |_| flag.set(true)));
        let parent = Frame::new();
        parent.add_child(&child).unwrap();
        drop(child);
        assert!(!released.get());
        drop(parent);
        assert!(released.get());
    }
}
