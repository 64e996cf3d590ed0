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

//! Meshes: lists of independently shaded groups.
//!
//! Every group carries a version counter. Mutations that change what a backend
//! uploads (vertices, texture, shading quality) bump it; colour and material
//! changes do not, because they travel with each draw instead.

use super::{material::Material, texture::Texture, RenderQuality, TextureMapping};
use crate::math::{Aabb, Rgba8, Vec2, Vec3};
use crate::object::{Object, ObjectCore};
use crate::status::{RmError, RmResult};
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

/// A mesh vertex: position, normal and texture coordinates.
#[derive(Debug, Default, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Model-space position.
    pub position: Vec3,
    /// Model-space normal.
    pub normal: Vec3,
    /// Texture coordinates.
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Creates a vertex.
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// One surface of a mesh, drawn with a single colour, texture and shading mode.
#[derive(Debug, Clone)]
pub struct MeshGroup {
    /// Constant colour, default opaque white.
    pub color: Rgba8,
    /// Optional texture.
    pub texture: Option<Texture>,
    /// Optional material.
    pub material: Option<Material>,
    /// Shading quality, default Gouraud.
    pub quality: RenderQuality,
    /// Vertices per face in `indices`.
    pub vertex_per_face: u32,
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// Face indices, `vertex_per_face` per face.
    pub indices: Vec<u32>,
    /// Content version, bumped by geometry, texture and quality changes.
    pub version: u32,
}

impl MeshGroup {
    fn new(vertex_per_face: u32, indices: Vec<u32>) -> Self {
        Self {
            color: Rgba8::WHITE,
            texture: None,
            material: None,
            quality: RenderQuality::Gouraud,
            vertex_per_face,
            vertices: Vec::new(),
            indices,
            version: 0,
        }
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Number of faces in the group.
    pub fn face_count(&self) -> usize {
        if self.vertex_per_face == 0 {
            0
        } else {
            self.indices.len() / self.vertex_per_face as usize
        }
    }

    /// Whether the group should be flat shaded.
    pub fn is_flat(&self) -> bool {
        matches!(self.quality, RenderQuality::Flat | RenderQuality::UnlitFlat)
    }
}

/// Counts and face data returned by [`Mesh::group_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    /// Number of vertices.
    pub vertex_count: usize,
    /// Number of faces.
    pub face_count: usize,
    /// Vertices per face.
    pub vertex_per_face: u32,
    /// Face indices.
    pub indices: Vec<u32>,
}

struct MeshInner {
    core: ObjectCore,
    groups: RefCell<Vec<MeshGroup>>,
    bounds: Cell<Aabb>,
}

/// A shared mesh handle.
#[derive(Clone)]
pub struct Mesh(Rc<MeshInner>);

impl Mesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::from_parts(ObjectCore::new(), Vec::new(), Aabb::EMPTY)
    }

    fn from_parts(core: ObjectCore, groups: Vec<MeshGroup>, bounds: Aabb) -> Self {
        Mesh(Rc::new(MeshInner {
            core,
            groups: RefCell::new(groups),
            bounds: Cell::new(bounds),
        }))
    }

    /// Appends a group and returns its index.
    ///
    /// `faces` must hold at least `face_count * vertex_per_face` indices; the
    /// vertices themselves are supplied later with [`Mesh::set_vertices`].
    pub fn add_group(
        &self,
        vertex_count: usize,
        face_count: usize,
        vertex_per_face: u32,
        faces: &[u32],
    ) -> RmResult<usize> {
        let needed = face_count * vertex_per_face as usize;
        if (face_count > 0 && vertex_per_face == 0) || faces.len() < needed {
            return Err(RmError::InvalidParameter);
        }
        let mut group = MeshGroup::new(vertex_per_face, faces[..needed].to_vec());
        group.vertices.reserve(vertex_count);
        let mut groups = self.0.groups.borrow_mut();
        groups.push(group);
        Ok(groups.len() - 1)
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.0.groups.borrow().len()
    }

    /// Borrows a group for reading.
    pub fn group(&self, index: usize) -> Option<Ref<'_, MeshGroup>> {
        Ref::filter_map(self.0.groups.borrow(), |g| g.get(index)).ok()
    }

    /// Returns counts and face indices of a group.
    pub fn group_info(&self, index: usize) -> RmResult<GroupInfo> {
        let group = self.group(index).ok_or(RmError::InvalidParameter)?;
        Ok(GroupInfo {
            vertex_count: group.vertices.len(),
            face_count: group.face_count(),
            vertex_per_face: group.vertex_per_face,
            indices: group.indices.clone(),
        })
    }

    fn with_group<R>(&self, index: usize, f: impl FnOnce(&mut MeshGroup) -> R) -> RmResult<R> {
        let mut groups = self.0.groups.borrow_mut();
        let group = groups.get_mut(index).ok_or(RmError::InvalidParameter)?;
        Ok(f(group))
    }

    /// Sets a group colour from an `0xAARRGGBB` word.
    pub fn set_group_color(&self, index: usize, argb: u32) -> RmResult<()> {
        self.with_group(index, |g| g.color = Rgba8::from_argb(argb))
    }

    /// Sets a group colour from float channels; alpha is forced to opaque.
    pub fn set_group_color_rgb(&self, index: usize, r: f32, g: f32, b: f32) -> RmResult<()> {
        let argb = crate::math::color::pack_rgb_f32(r, g, b);
        self.set_group_color(index, argb)
    }

    /// Returns the group colour as `0xAARRGGBB`; opaque white for an unknown group.
    pub fn group_color(&self, index: usize) -> u32 {
        self.group(index)
            .map(|g| g.color.to_argb())
            .unwrap_or(0xFFFF_FFFF)
    }

    /// Assigns a material to a group.
    pub fn set_group_material(&self, index: usize, material: Option<&Material>) -> RmResult<()> {
        self.with_group(index, |g| g.material = material.cloned())
    }

    /// Returns the group's material.
    pub fn group_material(&self, index: usize) -> RmResult<Material> {
        self.group(index)
            .ok_or(RmError::InvalidParameter)?
            .material
            .clone()
            .ok_or(RmError::GenericFailure)
    }

    /// Assigns a texture to a group and bumps its version.
    pub fn set_group_texture(&self, index: usize, texture: Option<&Texture>) -> RmResult<()> {
        self.with_group(index, |g| {
            g.texture = texture.cloned();
            g.bump();
        })
    }

    /// Returns the group's texture.
    pub fn group_texture(&self, index: usize) -> RmResult<Texture> {
        self.group(index)
            .ok_or(RmError::InvalidParameter)?
            .texture
            .clone()
            .ok_or(RmError::GenericFailure)
    }

    /// Accepted for compatibility; texture mapping is always perspective correct.
    pub fn set_group_mapping(&self, index: usize, _mapping: TextureMapping) -> RmResult<()> {
        self.with_group(index, |_| ())
    }

    /// Returns the texture mapping mode of a group.
    pub fn group_mapping(&self, _index: usize) -> TextureMapping {
        TextureMapping::PerspectiveCorrect
    }

    /// Sets the shading quality of a group and bumps its version.
    pub fn set_group_quality(&self, index: usize, quality: RenderQuality) -> RmResult<()> {
        self.with_group(index, |g| {
            g.quality = quality;
            g.bump();
        })
    }

    /// Returns the shading quality; Gouraud for an unknown group.
    pub fn group_quality(&self, index: usize) -> RenderQuality {
        self.group(index)
            .map(|g| g.quality)
            .unwrap_or(RenderQuality::Gouraud)
    }

    /// Returns a group's content version.
    pub fn group_version(&self, index: usize) -> Option<u32> {
        self.group(index).map(|g| g.version)
    }

    /// Writes vertices starting at `offset`, growing the array as needed.
    pub fn set_vertices(&self, index: usize, offset: usize, vertices: &[Vertex]) -> RmResult<()> {
        if vertices.is_empty() {
            return Err(RmError::InvalidParameter);
        }
        self.with_group(index, |g| {
            let end = offset + vertices.len();
            if end > g.vertices.len() {
                g.vertices.resize(end, Vertex::default());
            }
            g.vertices[offset..end].copy_from_slice(vertices);
            g.bump();
        })?;
        self.update_bounds();
        Ok(())
    }

    /// Reads `count` vertices starting at `start`.
    pub fn vertices(&self, index: usize, start: usize, count: usize) -> RmResult<Vec<Vertex>> {
        let group = self.group(index).ok_or(RmError::InvalidParameter)?;
        if count == 0 || start + count > group.vertices.len() {
            return Err(RmError::InvalidParameter);
        }
        Ok(group.vertices[start..start + count].to_vec())
    }

    /// The model-space bounding box over all groups.
    pub fn bounding_box(&self) -> Aabb {
        self.0.bounds.get()
    }

    fn update_bounds(&self) {
        let groups = self.0.groups.borrow();
        let bounds = Aabb::from_points(
            groups
                .iter()
                .flat_map(|g| g.vertices.iter().map(|v| v.position)),
        );
        self.0.bounds.set(bounds);
    }

    /// Creates an independent copy with a fresh identity. Textures and
    /// materials are shared with the source.
    pub fn duplicate(&self) -> Mesh {
        let groups = self.0.groups.borrow().clone();
        Mesh::from_parts(self.0.core.clone_metadata(), groups, self.bounding_box())
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Mesh {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("id", &self.id())
            .field("groups", &self.group_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::surface::Surface;

    fn quad() -> (Mesh, usize) {
        let mesh = Mesh::new();
        let g = mesh.add_group(4, 2, 3, &[0, 1, 2, 0, 2, 3]).unwrap();
        let n = Vec3::new(0.0, 0.0, -1.0);
        let verts = [
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), n, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), n, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), n, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), n, Vec2::new(1.0, 1.0)),
        ];
        mesh.set_vertices(g, 0, &verts).unwrap();
        (mesh, g)
    }

    #[test]
    fn test_add_group_validates_face_data() {
        let mesh = Mesh::new();
        assert_eq!(mesh.add_group(3, 2, 3, &[0, 1, 2]), Err(RmError::InvalidParameter));
        assert_eq!(mesh.add_group(3, 1, 3, &[0, 1, 2, 9]), Ok(0));
        let info = mesh.group_info(0).unwrap();
        assert_eq!(info.indices, vec![0, 1, 2]);
        assert_eq!(info.face_count, 1);
        assert_eq!(mesh.group_info(1), Err(RmError::InvalidParameter));
    }

    #[test]
    fn test_set_vertices_grows_and_updates_box() {
        let (mesh, g) = quad();
        let b = mesh.bounding_box();
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 0.0));
        let far = Vertex::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, Vec2::ZERO);
        mesh.set_vertices(g, 6, &[far]).unwrap();
        assert_eq!(mesh.group_info(g).unwrap().vertex_count, 7);
        assert_eq!(mesh.bounding_box().max.z, 5.0);
        assert_eq!(mesh.set_vertices(g, 0, &[]), Err(RmError::InvalidParameter));
    }

    #[test]
    fn test_get_vertices_checks_range() {
        let (mesh, g) = quad();
        assert_eq!(mesh.vertices(g, 1, 2).unwrap().len(), 2);
        assert_eq!(mesh.vertices(g, 3, 2), Err(RmError::InvalidParameter));
    }

    #[test]
    fn test_version_bumps_only_for_uploaded_state() {
        let (mesh, g) = quad();
        let v = mesh.group_version(g).unwrap();
        mesh.set_group_color(g, 0x80FF0000).unwrap();
        assert_eq!(mesh.group_version(g), Some(v));
        assert_eq!(mesh.group_color(g), 0x80FF0000);
        mesh.set_group_quality(g, RenderQuality::Flat).unwrap();
        assert_eq!(mesh.group_version(g), Some(v + 1));
        let tex = Texture::new(Surface::new_rgba(1, 1));
        mesh.set_group_texture(g, Some(&tex)).unwrap();
        assert_eq!(mesh.group_version(g), Some(v + 2));
    }

    #[test]
    fn test_group_defaults_and_unknown_groups() {
        let (mesh, g) = quad();
        assert_eq!(mesh.group_color(99), 0xFFFF_FFFF);
        assert_eq!(mesh.group_quality(99), RenderQuality::Gouraud);
        assert_eq!(mesh.group_texture(g), Err(RmError::GenericFailure));
        assert_eq!(mesh.group_material(g), Err(RmError::GenericFailure));
        assert_eq!(mesh.group_mapping(g), TextureMapping::PerspectiveCorrect);
        mesh.set_group_color_rgb(g, 0.0, 1.0, 0.0).unwrap();
        assert_eq!(mesh.group_color(g), 0xFF00FF00);
    }

    #[test]
    fn test_duplicate_shares_texture() {
        let (mesh, g) = quad();
        let tex = Texture::new(Surface::new_rgba(1, 1));
        mesh.set_group_texture(g, Some(&tex)).unwrap();
        let copy = mesh.duplicate();
        assert_ne!(copy.id(), mesh.id());
        assert!(copy != mesh);
        assert_eq!(copy.group_texture(g).unwrap(), tex);
        assert_eq!(tex.ref_count(), 3);
    }
}
