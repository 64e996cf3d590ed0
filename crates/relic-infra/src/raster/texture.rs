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

use relic_core::math::{Rgba8, Vec2, Vec4};

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    #[default]
    Linear,
}

/// Texture addressing outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrap {
    /// Tile the image.
    #[default]
    Repeat,
    /// Clamp to the edge texels.
    Clamp,
}

/// A sampled RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    texels: Vec<Rgba8>,
    /// Sampling filter.
    pub filter: Filter,
    /// Addressing mode.
    pub wrap: Wrap,
}

impl TextureImage {
    /// Wraps tightly packed RGBA bytes. Returns `None` when the length does
    /// not match the size.
    pub fn from_rgba(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if width == 0 || height == 0 || bytes.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            texels: bytemuck::pod_collect_to_vec(bytes),
            filter: Filter::Linear,
            wrap: Wrap::Repeat,
        })
    }

    /// A 1×1 image of one colour.
    pub fn solid(color: Rgba8) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
            filter: Filter::Nearest,
            wrap: Wrap::Repeat,
        }
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    fn texel(&self, x: i64, y: i64) -> Vec4 {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x, y) = match self.wrap {
            Wrap::Repeat => (x.rem_euclid(w) as usize, y.rem_euclid(h) as usize),
            Wrap::Clamp => (x.clamp(0, w - 1) as usize, y.clamp(0, h - 1) as usize),
        };
        let c = self.texels[y * self.width as usize + x];
        Vec4::new(
            c.r as f32 / 255.0,
            c.g as f32 / 255.0,
            c.b as f32 / 255.0,
            c.a as f32 / 255.0,
        )
    }

    /// Samples at normalized coordinates.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let u = uv.x * self.width as f32;
        let v = uv.y * self.height as f32;
        match self.filter {
            Filter::Nearest => self.texel(u.floor() as i64, v.floor() as i64),
            Filter::Linear => {
                let (u, v) = (u - 0.5, v - 0.5);
                let (x0, y0) = (u.floor(), v.floor());
                let (fx, fy) = (u - x0, v - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = Vec4::lerp(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
                let bottom = Vec4::lerp(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
                Vec4::lerp(top, bottom, fy)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nearest_wraps() {
        let bytes = [255, 0, 0, 255, 0, 255, 0, 255];
        let mut image = TextureImage::from_rgba(2, 1, &bytes).unwrap();
        image.filter = Filter::Nearest;
        assert_relative_eq!(image.sample(Vec2::new(0.25, 0.5)).x, 1.0);
        assert_relative_eq!(image.sample(Vec2::new(0.75, 0.5)).y, 1.0);
        assert_relative_eq!(image.sample(Vec2::new(1.25, 0.5)).x, 1.0);
    }

    #[test]
    fn test_linear_blends_neighbours() {
        let bytes = [0, 0, 0, 255, 255, 255, 255, 255];
        let image = TextureImage::from_rgba(2, 1, &bytes).unwrap();
        let mid = image.sample(Vec2::new(0.5, 0.5));
        assert_relative_eq!(mid.x, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_clamp_holds_edge_texel() {
        let bytes = [255, 0, 0, 255, 0, 255, 0, 255];
        let mut image = TextureImage::from_rgba(2, 1, &bytes).unwrap();
        image.filter = Filter::Nearest;
        image.wrap = Wrap::Clamp;
        assert_relative_eq!(image.sample(Vec2::new(1.25, 0.5)).y, 1.0);
        assert_relative_eq!(image.sample(Vec2::new(-0.5, 0.5)).x, 1.0);
    }

    #[test]
    fn test_rejects_bad_length() {
        assert!(TextureImage::from_rgba(2, 2, &[0; 4]).is_none());
    }
}
