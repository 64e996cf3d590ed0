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

//! Helpers for 2D image draws and presentation readback.

use super::common::{Rect, ViewportTransform};
use crate::math::{Mat4, Vec2, Vec3};
use crate::scene::Vertex;

/// Indices of the unit UI quad.
pub const UI_QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// The unit quad spanning (0,0)..(1,1), with matching texture coordinates.
pub fn ui_quad_vertices() -> [Vertex; 4] {
    let n = Vec3::new(0.0, 0.0, -1.0);
    [
        Vertex::new(Vec3::new(0.0, 0.0, 0.0), n, Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 0.0, 0.0), n, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 1.0, 0.0), n, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(0.0, 1.0, 0.0), n, Vec2::new(0.0, 1.0)),
    ]
}

/// Places the unit quad over `dst` (virtual pixels) in window pixels.
pub fn create_2d_transform(dst: Rect, transform: ViewportTransform) -> Mat4 {
    let x = dst.x as f32 * transform.scale + transform.offset_x;
    let y = dst.y as f32 * transform.scale + transform.offset_y;
    let w = dst.w as f32 * transform.scale;
    let h = dst.h as f32 * transform.scale;
    Mat4::from_rows([
        [w, 0.0, 0.0, 0.0],
        [0.0, h, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [x, y, 0.0, 1.0],
    ])
}

/// Pixel to clip-space projection with y pointing down.
pub fn orthographic_projection(width: u32, height: u32) -> Mat4 {
    Mat4::orthographic_2d(width as f32, height as f32)
}

/// Grows `dst` so that the whole texture maps onto it with `src` landing on `dst`.
///
/// Drawing the full texture into the expanded rectangle and clipping to
/// [`scissor_rect`] reproduces a sub-rectangle blit.
pub fn expand_dst_rect(src: Rect, dst: Rect, texture_w: u32, texture_h: u32) -> Rect {
    let scale_x = dst.w as f32 / src.w.max(1) as f32;
    let scale_y = dst.h as f32 / src.h.max(1) as f32;
    Rect::new(
        (dst.x as f32 - src.x as f32 * scale_x).round() as i32,
        (dst.y as f32 - src.y as f32 * scale_y).round() as i32,
        (texture_w as f32 * scale_x).round() as i32,
        (texture_h as f32 * scale_y).round() as i32,
    )
}

/// The destination rectangle in window pixels.
pub fn scissor_rect(dst: Rect, transform: ViewportTransform) -> Rect {
    Rect::new(
        (dst.x as f32 * transform.scale + transform.offset_x).round() as i32,
        (dst.y as f32 * transform.scale + transform.offset_y).round() as i32,
        (dst.w as f32 * transform.scale).round() as i32,
        (dst.h as f32 * transform.scale).round() as i32,
    )
}

/// The part of a `width`×`height` target not covered by letterbox bars.
pub fn content_rect(width: u32, height: u32, transform: ViewportTransform) -> Rect {
    let offset_x = transform.offset_x as i32;
    let offset_y = transform.offset_y as i32;
    Rect::new(
        offset_x,
        offset_y,
        (width as i32 - offset_x * 2).max(0),
        (height as i32 - offset_y * 2).max(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_2d_transform_maps_unit_quad() {
        let t = ViewportTransform {
            scale: 2.0,
            offset_x: 10.0,
            offset_y: 0.0,
        };
        let m = create_2d_transform(Rect::new(5, 5, 20, 10), t);
        let corner = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(corner.x, 60.0);
        assert_relative_eq!(corner.y, 30.0);
    }

    #[test]
    fn test_ortho_maps_corners_to_clip() {
        let p = orthographic_projection(640, 480);
        let tl = p.transform_point3(Vec3::ZERO);
        let br = p.transform_point3(Vec3::new(640.0, 480.0, 0.0));
        assert_relative_eq!(tl.x, -1.0);
        assert_relative_eq!(tl.y, 1.0);
        assert_relative_eq!(br.x, 1.0);
        assert_relative_eq!(br.y, -1.0);
    }

    #[test]
    fn test_expand_dst_rect_for_sub_image() {
        let r = expand_dst_rect(Rect::new(8, 0, 8, 8), Rect::new(100, 50, 16, 16), 32, 8);
        assert_eq!(r, Rect::new(84, 50, 64, 16));
    }

    #[test]
    fn test_content_rect_crops_letterbox() {
        let t = ViewportTransform::fit(800, 480, 640, 480);
        assert_eq!(content_rect(800, 480, t), Rect::new(80, 0, 640, 480));
    }
}
