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

//! Value types exchanged between the viewport and the renderers.

use crate::math::{FColor, Mat3, Mat4, Rgba8, Vec3};

/// Texture id meaning "draw untextured".
pub const NO_TEXTURE_ID: u32 = u32::MAX;

/// A light prepared for upload: world-space position and direction, float colour.
///
/// `position.w` is 1 for positional lights and `direction.w` is 1 for
/// directional ones; a light with both flags clear is ambient.
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SceneLight {
    /// Linear colour; alpha is carried along but unused.
    pub color: [f32; 4],
    /// World position, `w` = positional flag.
    pub position: [f32; 4],
    /// World direction, `w` = directional flag.
    pub direction: [f32; 4],
}

impl SceneLight {
    /// An ambient light.
    pub fn ambient(color: FColor) -> Self {
        Self {
            color: color.to_array(),
            position: [0.0; 4],
            direction: [0.0; 4],
        }
    }

    /// A light with optional position and direction.
    pub fn new(color: FColor, position: Option<Vec3>, direction: Option<Vec3>) -> Self {
        let position = position.map_or([0.0; 4], |p| [p.x, p.y, p.z, 1.0]);
        let direction = direction.map_or([0.0; 4], |d| [d.x, d.y, d.z, 1.0]);
        Self {
            color: color.to_array(),
            position,
            direction,
        }
    }

    /// Whether the light has a position.
    pub fn is_positional(&self) -> bool {
        self.position[3] != 0.0
    }

    /// Whether the light has a direction.
    pub fn is_directional(&self) -> bool {
        self.direction[3] != 0.0
    }

    /// Whether the light contributes uniformly.
    pub fn is_ambient(&self) -> bool {
        !self.is_positional() && !self.is_directional()
    }

    /// RGB colour.
    pub fn rgb(&self) -> Vec3 {
        Vec3::new(self.color[0], self.color[1], self.color[2])
    }

    /// World position.
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }

    /// World direction.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(self.direction[0], self.direction[1], self.direction[2])
    }
}

/// Per-draw surface parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Appearance {
    /// Constant colour; alpha below 255 means the draw is deferred and blended.
    pub color: Rgba8,
    /// Specular exponent; 0 disables specular highlights.
    pub shininess: f32,
    /// Texture id from `Renderer::get_texture_id`, or [`NO_TEXTURE_ID`].
    pub texture_id: u32,
    /// Flat shading.
    pub flat: bool,
}

impl Appearance {
    /// Whether a texture is bound.
    pub fn is_textured(&self) -> bool {
        self.texture_id != NO_TEXTURE_ID
    }
}

/// The matrices accompanying a draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawParams {
    /// Model to view space (`world * view`).
    pub model_view: Mat4,
    /// Model to world space.
    pub world: Mat4,
    /// World to view space.
    pub view: Mat4,
    /// Normal transform, see [`Mat3::normal_matrix`].
    pub normal_matrix: Mat3,
}

/// An integer rectangle in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub w: i32,
    /// Height.
    pub h: i32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

/// Uniform scale plus letterbox offsets mapping the virtual resolution into the window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportTransform {
    /// Window pixels per virtual pixel.
    pub scale: f32,
    /// Horizontal letterbox offset in window pixels.
    pub offset_x: f32,
    /// Vertical letterbox offset in window pixels.
    pub offset_y: f32,
}

impl ViewportTransform {
    /// The identity mapping.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Fits a virtual resolution into a window, preserving aspect ratio.
    pub fn fit(window_w: u32, window_h: u32, virtual_w: u32, virtual_h: u32) -> Self {
        let (ww, wh) = (window_w as f32, window_h as f32);
        let (vw, vh) = (virtual_w.max(1) as f32, virtual_h.max(1) as f32);
        let scale = (ww / vw).min(wh / vh);
        Self {
            scale,
            offset_x: (ww - vw * scale) * 0.5,
            offset_y: (wh - vh * scale) * 0.5,
        }
    }

    /// Maps a window point into virtual coordinates.
    pub fn to_render(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    /// Maps a virtual point into window coordinates.
    pub fn to_window(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Counters describing renderer activity.
///
/// Draw counters cover the current frame and are reset by `begin_frame`;
/// upload counters accumulate over the renderer's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames presented so far.
    pub frame_number: u64,
    /// Draw calls issued in the current frame.
    pub draw_calls: u32,
    /// Draws skipped in the current frame (unknown ids, exhausted memory).
    pub skipped_draws: u32,
    /// Triangles submitted in the current frame.
    pub triangles: u32,
    /// Vertices referenced by the most recent draw.
    pub last_draw_vertex_count: u32,
    /// Texture uploads, including in-place refreshes.
    pub texture_uploads: u32,
    /// Mesh uploads, including in-place refreshes.
    pub mesh_uploads: u32,
    /// Bytes of backend memory currently held for cached resources.
    pub resident_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_transform_letterboxes() {
        let t = ViewportTransform::fit(1280, 720, 640, 480);
        assert_eq!(t.scale, 1.5);
        assert_eq!(t.offset_x, 160.0);
        assert_eq!(t.offset_y, 0.0);
        let (x, y) = t.to_window(0.0, 0.0);
        assert_eq!((x, y), (160.0, 0.0));
        assert_eq!(t.to_render(x, y), (0.0, 0.0));
    }

    #[test]
    fn test_scene_light_flags() {
        let ambient = SceneLight::ambient(FColor::WHITE);
        assert!(ambient.is_ambient());
        let spot = SceneLight::new(FColor::WHITE, Some(Vec3::ONE), Some(Vec3::Z));
        assert!(spot.is_positional() && spot.is_directional());
        assert_eq!(spot.direction(), Vec3::Z);
    }
}
