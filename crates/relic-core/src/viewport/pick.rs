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

//! Ray picking against mesh triangles.

use super::walk_frames;
use crate::math::{Mat4, Ray, Vec3};
use crate::scene::{Frame, Mesh, Visual};

/// A mesh hit by a pick ray.
#[derive(Debug, Clone)]
pub struct PickHit {
    /// The mesh that was hit.
    pub visual: Visual,
    /// Frames from the root down to the frame holding the mesh.
    pub frames: Vec<Frame>,
    /// Distance from the camera along the ray.
    pub distance: f32,
}

/// Builds a world-space ray through a point of the virtual resolution.
pub(crate) fn build_pick_ray(
    x: f32,
    y: f32,
    width: u32,
    height: u32,
    camera_world: &Mat4,
    front: f32,
    field: f32,
) -> Ray {
    let aspect = width as f32 / height as f32;
    let nx = 2.0 * x / width as f32 - 1.0;
    let ny = 1.0 - 2.0 * y / height as f32;
    let f = front / field;
    let dir_view = Vec3::new(nx / f, ny / (f * aspect), 1.0).normalize();
    let dir_world = camera_world.transform_direction(dir_view).normalize();
    Ray::new(camera_world.translation(), dir_world)
}

/// Distance to the nearest triangle of `mesh` hit by `ray`.
fn intersect_mesh(ray: &Ray, mesh: &Mesh, world: &Mat4) -> Option<f32> {
    let mut nearest: Option<f32> = None;
    for index in 0..mesh.group_count() {
        let Some(group) = mesh.group(index) else {
            continue;
        };
        if group.vertex_per_face != 3 {
            continue;
        }
        for tri in group.indices.chunks_exact(3) {
            let corner = |i: u32| {
                group
                    .vertices
                    .get(i as usize)
                    .map(|v| world.transform_point3(v.position))
            };
            let (Some(v0), Some(v1), Some(v2)) = (corner(tri[0]), corner(tri[1]), corner(tri[2]))
            else {
                continue;
            };
            if let Some(t) = ray.intersect_triangle(v0, v1, v2) {
                nearest = Some(nearest.map_or(t, |n| n.min(t)));
            }
        }
    }
    nearest
}

/// Walks the hierarchy under `root` and returns every mesh hit, nearest first.
pub(crate) fn pick_scene(root: &Frame, ray: &Ray) -> Vec<PickHit> {
    let mut hits = Vec::new();
    let mut path = Vec::new();
    walk_frames(root, &Mat4::IDENTITY, &mut path, &mut |frame, world, path| {
        for visual in frame.visuals().snapshot() {
            let Visual::Mesh(mesh) = &visual else {
                continue;
            };
            let bounds = mesh.bounding_box();
            if bounds.is_empty() || bounds.transformed(world).intersect_ray(ray).is_none() {
                continue;
            }
            if let Some(distance) = intersect_mesh(ray, mesh, world) {
                hits.push(PickHit {
                    visual: visual.clone(),
                    frames: path.to_vec(),
                    distance,
                });
            }
        }
    });
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Vec2, EPSILON};
    use crate::scene::Vertex;

    fn quad_mesh() -> Mesh {
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
        mesh
    }

    #[test]
    fn test_centre_ray_points_along_camera_z() {
        let camera = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let ray = build_pick_ray(320.0, 240.0, 640, 480, &camera, 1.0, 0.5);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, -5.0));
        assert!((ray.direction.z - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_hits_sorted_with_frame_paths() {
        let root = Frame::new();
        let near = Frame::new();
        let far = Frame::new();
        root.add_child(&near).unwrap();
        root.add_child(&far).unwrap();
        far.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)));
        let mesh = quad_mesh();
        far.add_visual(&mesh).unwrap();
        near.add_visual(&mesh).unwrap();

        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let hits = pick_scene(&root, &ray);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].distance - 5.0).abs() < EPSILON);
        assert!((hits[1].distance - 8.0).abs() < EPSILON);
        assert_eq!(hits[0].frames, vec![root.clone(), near.clone()]);
        assert_eq!(hits[1].frames, vec![root, far]);
        assert_eq!(hits[0].visual, Visual::Mesh(mesh));
    }

    #[test]
    fn test_miss_returns_nothing() {
        let root = Frame::new();
        root.add_visual(&quad_mesh()).unwrap();
        let ray = Ray::new(Vec3::new(5.0, 5.0, -5.0), Vec3::Z);
        assert!(pick_scene(&root, &ray).is_empty());
    }
}
