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

//! Upload preparation shared by every backend.

use crate::math::Vec2;
use crate::renderer::error::ResourceError;
use crate::scene::{MeshGroup, Vertex};

/// Largest vertex count addressable with 16-bit indices.
pub const MAX_U16_VERTICES: usize = 1 << 16;

/// Expands an indexed triangle list into one with no shared vertices.
///
/// Every triangle's three vertices carry the normal of its first vertex as
/// stored; no geometric normal is computed. Texture coordinates are zeroed
/// when `textured` is false. Indices that point past `vertices` are
/// skipped along with their triangle.
pub fn flatten(vertices: &[Vertex], indices: &[u32], textured: bool) -> (Vec<Vertex>, Vec<u32>) {
    let mut out_vertices = Vec::with_capacity(indices.len());
    for tri in indices.chunks_exact(3) {
        let Some(corners) = tri
            .iter()
            .map(|&i| vertices.get(i as usize).copied())
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        let normal = corners[0].normal;
        for mut v in corners {
            v.normal = normal;
            if !textured {
                v.tex_coord = Vec2::ZERO;
            }
            out_vertices.push(v);
        }
    }
    let out_indices = (0..out_vertices.len() as u32).collect();
    (out_vertices, out_indices)
}

/// Geometry of one mesh group ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupGeometry {
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// 16-bit triangle-list indices.
    pub indices: Vec<u16>,
    /// Whether the group was flattened.
    pub flat: bool,
}

impl GroupGeometry {
    /// Builds the upload geometry of a group, flattening it for flat quality.
    pub fn from_group(group: &MeshGroup) -> Result<Self, ResourceError> {
        if group.vertex_per_face != 3 && !group.indices.is_empty() {
            return Err(ResourceError::UnsupportedFormat(format!(
                "{} vertices per face",
                group.vertex_per_face
            )));
        }
        let flat = group.is_flat();
        let (vertices, indices) = if flat {
            flatten(&group.vertices, &group.indices, group.texture.is_some())
        } else {
            if group
                .indices
                .iter()
                .any(|&i| i as usize >= group.vertices.len())
            {
                return Err(ResourceError::OutOfBounds);
            }
            (group.vertices.clone(), group.indices.clone())
        };
        if vertices.len() > MAX_U16_VERTICES {
            return Err(ResourceError::OutOfBounds);
        }
        Ok(Self {
            vertices,
            indices: indices.into_iter().map(|i| i as u16).collect(),
            flat,
        })
    }

    /// Size in bytes of the vertex data.
    pub fn vertex_bytes(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice())
    }

    /// Size in bytes of the index data.
    pub fn index_bytes(&self) -> usize {
        std::mem::size_of_val(self.indices.as_slice())
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::scene::{Mesh, RenderQuality};

    fn vtx(x: f32, y: f32, n: Vec3) -> Vertex {
        Vertex::new(Vec3::new(x, y, 0.0), n, Vec2::new(x, y))
    }

    #[test]
    fn test_flatten_uses_first_vertex_normal() {
        let verts = [
            vtx(0.0, 0.0, Vec3::X),
            vtx(1.0, 0.0, Vec3::Y),
            vtx(1.0, 1.0, Vec3::Z),
            vtx(0.0, 1.0, Vec3::Y),
        ];
        let (out, idx) = flatten(&verts, &[0, 1, 2, 2, 3, 0], false);
        assert_eq!(out.len(), 6);
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5]);
        assert!(out[..3].iter().all(|v| v.normal == Vec3::X));
        assert!(out[3..].iter().all(|v| v.normal == Vec3::Z));
        assert!(out.iter().all(|v| v.tex_coord == Vec2::ZERO));
        assert_eq!(out[4].position, verts[3].position);
    }

    #[test]
    fn test_flatten_keeps_uvs_when_textured() {
        let verts = [vtx(0.0, 0.0, Vec3::Z), vtx(1.0, 0.0, Vec3::Z), vtx(1.0, 1.0, Vec3::Z)];
        let (out, _) = flatten(&verts, &[0, 1, 2], true);
        assert_eq!(out[2].tex_coord, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_group_geometry_validation() {
        let mesh = Mesh::new();
        let g = mesh.add_group(3, 1, 3, &[0, 1, 5]).unwrap();
        mesh.set_vertices(g, 0, &[vtx(0.0, 0.0, Vec3::Z); 3]).unwrap();
        let group = mesh.group(g).unwrap();
        assert_eq!(GroupGeometry::from_group(&group), Err(ResourceError::OutOfBounds));
        drop(group);

        let quads = mesh.add_group(4, 1, 4, &[0, 1, 2, 3]).unwrap();
        let group = mesh.group(quads).unwrap();
        assert!(matches!(
            GroupGeometry::from_group(&group),
            Err(ResourceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_group_geometry_flat_quality() {
        let mesh = Mesh::new();
        let g = mesh.add_group(4, 2, 3, &[0, 1, 2, 0, 2, 3]).unwrap();
        let verts = [
            vtx(-1.0, -1.0, Vec3::Z),
            vtx(-1.0, 1.0, Vec3::Z),
            vtx(1.0, 1.0, Vec3::Z),
            vtx(1.0, -1.0, Vec3::Z),
        ];
        mesh.set_vertices(g, 0, &verts).unwrap();
        let smooth = GroupGeometry::from_group(&mesh.group(g).unwrap()).unwrap();
        assert_eq!(smooth.vertices.len(), 4);
        assert!(!smooth.flat);
        mesh.set_group_quality(g, RenderQuality::Flat).unwrap();
        let flat = GroupGeometry::from_group(&mesh.group(g).unwrap()).unwrap();
        assert_eq!(flat.vertices.len(), 6);
        assert_eq!(flat.triangle_count(), 2);
        assert_eq!(flat.index_bytes(), 12);
    }

    #[test]
    fn test_too_many_vertices_for_u16() {
        let mesh = Mesh::new();
        let g = mesh.add_group(0, 1, 3, &[0, 1, 2]).unwrap();
        let verts = vec![Vertex::default(); MAX_U16_VERTICES + 1];
        mesh.set_vertices(g, 0, &verts).unwrap();
        let group = mesh.group(g).unwrap();
        assert_eq!(GroupGeometry::from_group(&group), Err(ResourceError::OutOfBounds));
    }
}
