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

//! A small scanline-free triangle rasterizer shared by the headless drivers.
//!
//! The pipeline is split the way hardware splits it:
//!
//! ```text
//! ClipVertex ─► clip_polygon (near/far) ─► to_screen ─► ScreenVertex ─► rasterize
//! ```
//!
//! Drivers that receive pre-transformed vertices enter at [`rasterize`].
//! Screen space has its origin at the top-left corner with y pointing down;
//! triangles that appear clockwise on screen are front-facing.

pub mod shading;
mod texture;

pub use texture::{Filter, TextureImage, Wrap};

use relic_core::math::{Rgba8, Vec2, Vec4};
use relic_core::renderer::Rect;

/// A vertex in homogeneous clip space, with standard `[0, 1]` depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex {
    /// Clip-space position.
    pub position: Vec4,
    /// Colour, straight alpha, channels in `[0, 1]`.
    pub color: Vec4,
    /// Texture coordinates.
    pub uv: Vec2,
}

impl ClipVertex {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            position: Vec4::lerp(a.position, b.position, t),
            color: Vec4::lerp(a.color, b.color, t),
            uv: a.uv + (b.uv - a.uv) * t,
        }
    }
}

/// A vertex after the perspective divide and viewport mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenVertex {
    /// Pixel x.
    pub x: f32,
    /// Pixel y, down.
    pub y: f32,
    /// Normalized depth in `[0, 1]`.
    pub z: f32,
    /// Reciprocal of clip w, used for perspective-correct interpolation.
    pub rhw: f32,
    /// Colour, straight alpha.
    pub color: Vec4,
    /// Texture coordinates.
    pub uv: Vec2,
}

/// Depth comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthTest {
    /// No depth test.
    Always,
    /// Passes when nearer with standard depth.
    Less,
    /// Passes when nearer with reversed depth.
    Greater,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Drop counter-clockwise (on screen) triangles.
    Back,
}

/// Per-draw fixed-function state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    /// Depth comparison.
    pub depth_test: DepthTest,
    /// Whether passing fragments write depth.
    pub depth_write: bool,
    /// Store `1 - z` instead of `z`.
    pub reverse_z: bool,
    /// Source-alpha blending.
    pub blend: bool,
    /// Face culling.
    pub cull: CullMode,
    /// Use the first vertex's colour for the whole triangle.
    pub flat: bool,
    /// Quantize to 16-bit colour with an ordered dither.
    pub dither: bool,
    /// Optional clip rectangle in pixels.
    pub scissor: Option<Rect>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_test: DepthTest::Less,
            depth_write: true,
            reverse_z: false,
            blend: false,
            cull: CullMode::Back,
            flat: false,
            dither: false,
            scissor: None,
        }
    }
}

/// A colour buffer with a matching depth buffer.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    color: Vec<Rgba8>,
    depth: Vec<f32>,
}

impl RenderTarget {
    /// Creates a black target with depth cleared to 1.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![Rgba8::BLACK; len],
            depth: vec![1.0; len],
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reallocates the buffers, discarding their contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    /// Fills the colour buffer.
    pub fn clear_color(&mut self, color: Rgba8) {
        self.color.fill(color);
    }

    /// Fills the depth buffer.
    pub fn clear_depth(&mut self, depth: f32) {
        self.depth.fill(depth);
    }

    /// Reads one pixel. Out-of-range reads return transparent black.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba8 {
        if x >= self.width || y >= self.height {
            return Rgba8::default();
        }
        self.color[(y * self.width + x) as usize]
    }

    /// Reads one depth value.
    pub fn depth(&self, x: u32, y: u32) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.depth[(y * self.width + x) as usize])
    }

    /// The colour buffer as tightly packed RGBA bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.color)
    }

    /// Copies a rectangle out as RGBA bytes. The rectangle is clamped to the target.
    pub fn read_rect(&self, rect: Rect) -> (u32, u32, Vec<u8>) {
        let x0 = rect.x.clamp(0, self.width as i32) as u32;
        let y0 = rect.y.clamp(0, self.height as i32) as u32;
        let x1 = (rect.x + rect.w).clamp(0, self.width as i32) as u32;
        let y1 = (rect.y + rect.h).clamp(0, self.height as i32) as u32;
        let (w, h) = (x1.saturating_sub(x0), y1.saturating_sub(y0));
        let mut out = Vec::with_capacity(w as usize * h as usize * 4);
        for y in y0..y1 {
            let start = (y * self.width + x0) as usize;
            out.extend_from_slice(bytemuck::cast_slice(&self.color[start..start + w as usize]));
        }
        (w, h, out)
    }

    /// Copies `source` into this target at the same size, or scaled with
    /// nearest sampling when sizes differ.
    pub fn copy_from(&mut self, source: &RenderTarget) {
        if source.width == self.width && source.height == self.height {
            self.color.copy_from_slice(&source.color);
            return;
        }
        for y in 0..self.height {
            let sy = (y as u64 * source.height as u64 / self.height.max(1) as u64) as u32;
            for x in 0..self.width {
                let sx = (x as u64 * source.width as u64 / self.width.max(1) as u64) as u32;
                self.color[(y * self.width + x) as usize] = source.pixel(sx, sy);
            }
        }
    }

    /// Counts pixels that differ from `background`.
    pub fn count_not(&self, background: Rgba8) -> usize {
        self.color.iter().filter(|&&c| c != background).count()
    }
}

/// Clips a triangle against the near (`z >= 0`) and far (`z <= w`) planes.
///
/// Returns the clipped convex polygon; fewer than three vertices means the
/// triangle is fully outside.
pub fn clip_polygon(triangle: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    let near = |v: &ClipVertex| v.position.z;
    let far = |v: &ClipVertex| v.position.w - v.position.z;
    let polygon = clip_against(triangle.to_vec(), near);
    clip_against(polygon, far)
}

fn clip_against(input: Vec<ClipVertex>, distance: impl Fn(&ClipVertex) -> f32) -> Vec<ClipVertex> {
    if input.iter().all(|v| distance(v) >= 0.0) {
        return input;
    }
    let mut output = Vec::with_capacity(input.len() + 2);
    for i in 0..input.len() {
        let current = &input[i];
        let next = &input[(i + 1) % input.len()];
        let (dc, dn) = (distance(current), distance(next));
        if dc >= 0.0 {
            output.push(*current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            let t = dc / (dc - dn);
            output.push(ClipVertex::lerp(current, next, t));
        }
    }
    output
}

/// Divides by w and maps into `viewport` (pixels, y down).
pub fn to_screen(v: &ClipVertex, viewport: Rect) -> ScreenVertex {
    let rhw = 1.0 / v.position.w;
    let ndc_x = v.position.x * rhw;
    let ndc_y = v.position.y * rhw;
    ScreenVertex {
        x: viewport.x as f32 + (ndc_x * 0.5 + 0.5) * viewport.w as f32,
        y: viewport.y as f32 + (0.5 - ndc_y * 0.5) * viewport.h as f32,
        z: v.position.z * rhw,
        rhw,
        color: v.color,
        uv: v.uv,
    }
}

/// Clips, projects and rasterizes one clip-space triangle.
///
/// Returns whether any part of it survived clipping.
pub fn draw_triangle(
    target: &mut RenderTarget,
    state: &RasterState,
    triangle: &[ClipVertex; 3],
    viewport: Rect,
    texture: Option<&TextureImage>,
) -> bool {
    let polygon = clip_polygon(triangle);
    if polygon.len() < 3 {
        return false;
    }
    // Keep the provoking colour of the original triangle for flat shading.
    let provoking = triangle[0].color;
    let screen: Vec<ScreenVertex> = polygon.iter().map(|v| to_screen(v, viewport)).collect();
    for i in 1..screen.len() - 1 {
        let mut tri = [screen[0], screen[i], screen[i + 1]];
        if state.flat {
            for v in &mut tri {
                v.color = provoking;
            }
        }
        rasterize(target, state, &tri, texture);
    }
    true
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

const BAYER_4X4: [[f32; 4]; 4] = [
    [0.0, 8.0, 2.0, 10.0],
    [12.0, 4.0, 14.0, 6.0],
    [3.0, 11.0, 1.0, 9.0],
    [15.0, 7.0, 13.0, 5.0],
];

fn dither_channel(value: f32, x: u32, y: u32, levels: f32) -> f32 {
    let threshold = BAYER_4X4[(y % 4) as usize][(x % 4) as usize] / 16.0 - 0.5;
    ((value * levels + threshold).round() / levels).clamp(0.0, 1.0)
}

fn to_bytes(c: Vec4) -> Rgba8 {
    let b = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba8::new(b(c.x), b(c.y), b(c.z), b(c.w))
}

fn to_floats(c: Rgba8) -> Vec4 {
    Vec4::new(
        c.r as f32 / 255.0,
        c.g as f32 / 255.0,
        c.b as f32 / 255.0,
        c.a as f32 / 255.0,
    )
}

/// Multiplies two colours channel by channel.
pub fn modulate(a: Vec4, b: Vec4) -> Vec4 {
    Vec4::new(a.x * b.x, a.y * b.y, a.z * b.z, a.w * b.w)
}

/// Rasterizes a screen-space triangle.
///
/// Colour and texture coordinates are interpolated perspective-correctly;
/// depth is interpolated linearly in screen space.
pub fn rasterize(
    target: &mut RenderTarget,
    state: &RasterState,
    triangle: &[ScreenVertex; 3],
    texture: Option<&TextureImage>,
) {
    let [v0, mut v1, mut v2] = *triangle;
    let area = edge((v0.x, v0.y), (v1.x, v1.y), (v2.x, v2.y));
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        if state.cull == CullMode::Back {
            return;
        }
        std::mem::swap(&mut v1, &mut v2);
    }
    let area = area.abs();

    let mut min_x = v0.x.min(v1.x).min(v2.x).floor().max(0.0) as i32;
    let mut min_y = v0.y.min(v1.y).min(v2.y).floor().max(0.0) as i32;
    let mut max_x = (v0.x.max(v1.x).max(v2.x).ceil() as i32).min(target.width as i32 - 1);
    let mut max_y = (v0.y.max(v1.y).max(v2.y).ceil() as i32).min(target.height as i32 - 1);
    if let Some(s) = state.scissor {
        min_x = min_x.max(s.x);
        min_y = min_y.max(s.y);
        max_x = max_x.min(s.x + s.w - 1);
        max_y = max_y.min(s.y + s.h - 1);
    }
    if min_x > max_x || min_y > max_y {
        return;
    }

    let (p0, p1, p2) = ((v0.x, v0.y), (v1.x, v1.y), (v2.x, v2.y));
    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let p = (px as f32 + 0.5, py as f32 + 0.5);
            let w0 = edge(p1, p2, p);
            let w1 = edge(p2, p0, p);
            let w2 = edge(p0, p1, p);
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let (b0, b1, b2) = (w0 / area, w1 / area, w2 / area);

            let z = b0 * v0.z + b1 * v1.z + b2 * v2.z;
            if !(0.0..=1.0).contains(&z) {
                continue;
            }
            let depth = if state.reverse_z { 1.0 - z } else { z };
            let index = (py as u32 * target.width + px as u32) as usize;
            let stored = target.depth[index];
            let passes = match state.depth_test {
                DepthTest::Always => true,
                DepthTest::Less => depth < stored,
                DepthTest::Greater => depth > stored,
            };
            if !passes {
                continue;
            }

            let rhw = b0 * v0.rhw + b1 * v1.rhw + b2 * v2.rhw;
            let (c0, c1, c2) = (b0 * v0.rhw / rhw, b1 * v1.rhw / rhw, b2 * v2.rhw / rhw);
            let mut color = v0.color * c0 + v1.color * c1 + v2.color * c2;
            if let Some(texture) = texture {
                let uv = v0.uv * c0 + v1.uv * c1 + v2.uv * c2;
                color = modulate(color, texture.sample(uv));
            }

            if state.blend {
                let dst = to_floats(target.color[index]);
                let a = color.w.clamp(0.0, 1.0);
                color = Vec4::new(
                    color.x * a + dst.x * (1.0 - a),
                    color.y * a + dst.y * (1.0 - a),
                    color.z * a + dst.z * (1.0 - a),
                    a + dst.w * (1.0 - a),
                );
            }
            if state.dither {
                let (x, y) = (px as u32, py as u32);
                color = Vec4::new(
                    dither_channel(color.x, x, y, 31.0),
                    dither_channel(color.y, x, y, 63.0),
                    dither_channel(color.z, x, y, 31.0),
                    color.w,
                );
            }
            target.color[index] = to_bytes(color);
            if state.depth_write {
                target.depth[index] = depth;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
        ClipVertex {
            position: Vec4::new(x, y, z, w),
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            uv: Vec2::ZERO,
        }
    }

    fn full(target: &RenderTarget) -> Rect {
        Rect::new(0, 0, target.width() as i32, target.height() as i32)
    }

    #[test]
    fn test_clockwise_triangle_is_drawn_and_ccw_culled() {
        let mut target = RenderTarget::new(16, 16);
        let viewport = full(&target);
        let state = RasterState::default();
        // Bottom-left, top-left, top-right: clockwise on screen.
        let cw = [
            clip(-1.0, -1.0, 0.5, 1.0),
            clip(-1.0, 1.0, 0.5, 1.0),
            clip(1.0, 1.0, 0.5, 1.0),
        ];
        assert!(draw_triangle(&mut target, &state, &cw, viewport, None));
        let drawn = target.count_not(Rgba8::BLACK);
        assert!(drawn > 100);

        let mut target = RenderTarget::new(16, 16);
        let ccw = [cw[0], cw[2], cw[1]];
        draw_triangle(&mut target, &state, &ccw, viewport, None);
        assert_eq!(target.count_not(Rgba8::BLACK), 0);
    }

    #[test]
    fn test_near_plane_clipping_splits_triangle() {
        let tri = [
            clip(0.0, 0.0, -1.0, 1.0),
            clip(1.0, 0.0, 1.0, 2.0),
            clip(0.0, 1.0, 1.0, 2.0),
        ];
        let polygon = clip_polygon(&tri);
        assert_eq!(polygon.len(), 4);
        assert!(polygon.iter().all(|v| v.position.z >= -1e-6));

        let behind = [clip(0.0, 0.0, -1.0, 1.0); 3];
        assert!(clip_polygon(&behind).is_empty());
    }

    #[test]
    fn test_depth_test_keeps_nearest() {
        let mut target = RenderTarget::new(8, 8);
        let viewport = full(&target);
        let state = RasterState {
            cull: CullMode::None,
            ..RasterState::default()
        };
        let quad = |z: f32, color: Vec4| {
            let mut v = [
                clip(-1.0, -1.0, z, 1.0),
                clip(-1.0, 3.0, z, 1.0),
                clip(3.0, -1.0, z, 1.0),
            ];
            for vertex in &mut v {
                vertex.color = color;
            }
            v
        };
        draw_triangle(&mut target, &state, &quad(0.2, Vec4::new(1.0, 0.0, 0.0, 1.0)), viewport, None);
        draw_triangle(&mut target, &state, &quad(0.6, Vec4::new(0.0, 1.0, 0.0, 1.0)), viewport, None);
        assert_eq!(target.pixel(4, 4), Rgba8::new(255, 0, 0, 255));

        let reversed = RasterState {
            reverse_z: true,
            depth_test: DepthTest::Greater,
            ..state
        };
        let mut target = RenderTarget::new(8, 8);
        target.clear_depth(0.0);
        draw_triangle(&mut target, &reversed, &quad(0.6, Vec4::new(0.0, 1.0, 0.0, 1.0)), viewport, None);
        draw_triangle(&mut target, &reversed, &quad(0.2, Vec4::new(1.0, 0.0, 0.0, 1.0)), viewport, None);
        assert_eq!(target.pixel(4, 4), Rgba8::new(255, 0, 0, 255));
    }

    #[test]
    fn test_blending_mixes_with_destination() {
        let mut target = RenderTarget::new(4, 4);
        target.clear_color(Rgba8::new(0, 0, 255, 255));
        let state = RasterState {
            blend: true,
            depth_test: DepthTest::Always,
            depth_write: false,
            cull: CullMode::None,
            ..RasterState::default()
        };
        let mut tri = [
            clip(-1.0, -1.0, 0.5, 1.0),
            clip(-1.0, 3.0, 0.5, 1.0),
            clip(3.0, -1.0, 0.5, 1.0),
        ];
        for v in &mut tri {
            v.color = Vec4::new(1.0, 0.0, 0.0, 0.5);
        }
        let viewport = full(&target);
        draw_triangle(&mut target, &state, &tri, viewport, None);
        let p = target.pixel(1, 1);
        assert!((p.r as i32 - 128).abs() <= 1 && (p.b as i32 - 128).abs() <= 1);
    }

    #[test]
    fn test_scissor_limits_coverage() {
        let mut target = RenderTarget::new(8, 8);
        let state = RasterState {
            cull: CullMode::None,
            depth_test: DepthTest::Always,
            scissor: Some(Rect::new(2, 2, 2, 2)),
            ..RasterState::default()
        };
        let tri = [
            clip(-1.0, -1.0, 0.5, 1.0),
            clip(-1.0, 3.0, 0.5, 1.0),
            clip(3.0, -1.0, 0.5, 1.0),
        ];
        let viewport = full(&target);
        draw_triangle(&mut target, &state, &tri, viewport, None);
        assert_eq!(target.count_not(Rgba8::BLACK), 4);
    }

    #[test]
    fn test_read_rect_crops() {
        let mut target = RenderTarget::new(4, 2);
        target.clear_color(Rgba8::WHITE);
        let (w, h, bytes) = target.read_rect(Rect::new(1, 0, 2, 5));
        assert_eq!((w, h), (2, 2));
        assert_eq!(bytes.len(), 16);
    }
}
