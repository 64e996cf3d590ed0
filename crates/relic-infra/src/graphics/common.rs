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

//! Helpers shared by every backend.

use crate::raster::shading::{shade_programmable, ShadePoint};
use crate::raster::{draw_triangle, ClipVertex, Filter, RasterState, RenderTarget, TextureImage, Wrap};
use relic_core::math::{Mat3, Mat4, Rgba8, Vec3, Vec4};
use relic_core::renderer::{Rect, ResourceError, SceneLight};
use relic_core::scene::{Surface, Texture, Vertex};

/// Sampler settings of a texture upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    /// Filter.
    pub filter: Filter,
    /// Addressing.
    pub wrap: Wrap,
    /// Anisotropic filtering cap; 1 disables it.
    pub anisotropy: u16,
}

/// Highest anisotropy level a sampler is given.
pub const MAX_ANISOTROPY: u16 = 16;

impl SamplerDesc {
    /// Scene textures tile and filter bilinearly. UI textures clamp and stay
    /// pixel-exact unless they are drawn smaller than their source.
    pub fn for_texture(is_ui: bool, scale_x: f32, scale_y: f32) -> Self {
        if !is_ui {
            return Self {
                filter: Filter::Linear,
                wrap: Wrap::Repeat,
                anisotropy: 1,
            };
        }
        let minified = scale_x < 1.0 || scale_y < 1.0;
        Self {
            filter: if minified { Filter::Linear } else { Filter::Nearest },
            wrap: Wrap::Clamp,
            anisotropy: 1,
        }
    }

    /// Caps anisotropic filtering at `level`, rounded and clamped to
    /// `1..=MAX_ANISOTROPY`. Only repeating bilinear samplers (scene
    /// textures) take it.
    pub fn with_anisotropy(mut self, level: f32) -> Self {
        if self.filter == Filter::Linear && self.wrap == Wrap::Repeat {
            let level = if level.is_finite() { level.round() } else { 1.0 };
            self.anisotropy = level.clamp(1.0, MAX_ANISOTROPY as f32) as u16;
        }
        self
    }
}

/// Texture pixels expanded to RGBA, ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TexturePixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TexturePixels {
    pub fn from_texture(texture: &Texture) -> Result<Self, ResourceError> {
        let surface = texture.surface();
        if surface.width() == 0 || surface.height() == 0 {
            return Err(ResourceError::UnsupportedFormat(
                "zero-sized texture".to_string(),
            ));
        }
        Ok(Self {
            width: surface.width(),
            height: surface.height(),
            rgba: surface.to_rgba8(),
        })
    }

    pub fn byte_len(&self) -> u64 {
        self.rgba.len() as u64
    }
}

/// The camera position in world space, recovered from a rigid view matrix.
pub(crate) fn eye_position(view: &Mat4) -> Vec3 {
    view.rigid_inverse().translation()
}

pub(crate) fn clear_rgba(r: f32, g: f32, b: f32) -> Rgba8 {
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba8::new(byte(r), byte(g), byte(b), 255)
}

pub(crate) fn full_rect(width: u32, height: u32) -> Rect {
    Rect::new(0, 0, width as i32, height as i32)
}

/// Scales a cropped readback into `target` with nearest sampling.
pub(crate) fn blit_readback(target: &mut Surface, rgba: &[u8], width: u32, height: u32) {
    target.blit_scaled_from(rgba, width, height, (0.0, 0.0, width as f32, height as f32));
}

/// One indexed draw through a programmable vertex stage.
pub(crate) struct ProgrammableDraw<'a> {
    pub vertices: &'a [Vertex],
    pub indices: &'a [u16],
    pub model_view_projection: Mat4,
    pub world: Mat4,
    pub normal_matrix: Mat3,
    pub eye: Vec3,
    pub color: Vec4,
    pub shininess: f32,
    /// `None` draws unlit with the base colour.
    pub lights: Option<&'a [SceneLight]>,
}

impl ProgrammableDraw<'_> {
    fn vertex(&self, v: &Vertex) -> ClipVertex {
        let color = match self.lights {
            Some(lights) => {
                let point = ShadePoint {
                    position: self.world.transform_point3(v.position),
                    normal: self.normal_matrix.transform(v.normal).normalize(),
                    eye: self.eye,
                };
                shade_programmable(lights, &point, self.color, self.shininess)
            }
            None => self.color,
        };
        ClipVertex {
            position: self.model_view_projection.transform_point(v.position),
            color,
            uv: v.tex_coord,
        }
    }

    /// Shades and rasterizes every complete triangle. Returns how many
    /// survived clipping.
    pub fn execute(
        &self,
        target: &mut RenderTarget,
        state: &RasterState,
        texture: Option<&TextureImage>,
    ) -> u32 {
        let viewport = full_rect(target.width(), target.height());
        let mut drawn = 0;
        for tri in self.indices.chunks_exact(3) {
            let corners = [tri[0], tri[1], tri[2]].map(|i| self.vertices.get(i as usize));
            let [Some(a), Some(b), Some(c)] = corners else {
                continue;
            };
            let clip = [self.vertex(a), self.vertex(b), self.vertex(c)];
            if draw_triangle(target, state, &clip, viewport, texture) {
                drawn += 1;
            }
        }
        drawn
    }
}

pub(crate) fn mat3_from_padded(rows: &[[f32; 4]; 3]) -> Mat3 {
    Mat3::from_rows(rows.map(|r| [r[0], r[1], r[2]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relic_core::math::Vec2;

    #[test]
    fn test_ui_sampler_is_pixel_exact_when_magnified() {
        let s = SamplerDesc::for_texture(true, 2.0, 2.0);
        assert_eq!(s.filter, Filter::Nearest);
        assert_eq!(s.wrap, Wrap::Clamp);
        assert_eq!(SamplerDesc::for_texture(true, 0.5, 1.0).filter, Filter::Linear);
        assert_eq!(SamplerDesc::for_texture(false, 1.0, 1.0).wrap, Wrap::Repeat);
    }

    #[test]
    fn test_anisotropy_applies_to_scene_samplers_only() {
        let scene = SamplerDesc::for_texture(false, 1.0, 1.0);
        assert_eq!(scene.anisotropy, 1);
        assert_eq!(scene.with_anisotropy(8.0).anisotropy, 8);
        assert_eq!(scene.with_anisotropy(64.0).anisotropy, MAX_ANISOTROPY);
        assert_eq!(scene.with_anisotropy(0.0).anisotropy, 1);
        assert_eq!(scene.with_anisotropy(f32::NAN).anisotropy, 1);
        let ui = SamplerDesc::for_texture(true, 0.5, 0.5);
        assert_eq!(ui.with_anisotropy(8.0).anisotropy, 1);
    }

    #[test]
    fn test_eye_position_from_view() {
        let camera = Mat4::from_translation(Vec3::new(1.0, 2.0, -5.0));
        let eye = eye_position(&camera.rigid_inverse());
        assert!((eye - Vec3::new(1.0, 2.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_indexed_texture_expands_to_rgba() {
        let surface = Surface::from_indexed(2, 1, vec![1, 0], &[Rgba8::WHITE, Rgba8::BLACK]).unwrap();
        let pixels = TexturePixels::from_texture(&Texture::new(surface)).unwrap();
        assert_eq!(pixels.rgba, vec![0, 0, 0, 255, 255, 255, 255, 255]);
        let mut image = TextureImage::from_rgba(pixels.width, pixels.height, &pixels.rgba).unwrap();
        image.filter = Filter::Linear;
        image.wrap = Wrap::Repeat;
        let texel = image.sample(Vec2::new(0.75, 0.5));
        assert_relative_eq!(texel.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(texel.w, 1.0, epsilon = 1e-5);
    }
}
