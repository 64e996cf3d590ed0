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

//! CPU-side pixel storage backing textures and readback targets.

use crate::math::Rgba8;
use crate::status::{RmError, RmResult};

/// Number of entries in an indexed surface's palette.
pub const PALETTE_SIZE: usize = 256;

/// Pixel layout of a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Four bytes per pixel, in R, G, B, A order.
    Rgba8,
    /// One palette index per pixel.
    Indexed8,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Indexed8 => 1,
        }
    }
}

/// A tightly packed 2D image.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
    palette: Vec<Rgba8>,
}

impl Surface {
    /// Creates a transparent black RGBA surface.
    pub fn new_rgba(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            pixels: vec![0; width as usize * height as usize * 4],
            palette: Vec::new(),
        }
    }

    /// Wraps existing RGBA bytes. Fails if the length does not match the size.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> RmResult<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(RmError::InvalidParameter);
        }
        Ok(Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            pixels,
            palette: Vec::new(),
        })
    }

    /// Creates a surface filled with one colour.
    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        let mut surface = Self::new_rgba(width, height);
        for px in surface.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        surface
    }

    /// Wraps palette indices. The palette is padded with opaque black to 256 entries.
    pub fn from_indexed(
        width: u32,
        height: u32,
        indices: Vec<u8>,
        palette: &[Rgba8],
    ) -> RmResult<Self> {
        if indices.len() != width as usize * height as usize || palette.len() > PALETTE_SIZE {
            return Err(RmError::InvalidParameter);
        }
        let mut full = palette.to_vec();
        full.resize(PALETTE_SIZE, Rgba8::BLACK);
        Ok(Self {
            width,
            height,
            format: PixelFormat::Indexed8,
            pixels: indices,
            palette: full,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw pixel bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// The palette of an indexed surface; empty for RGBA surfaces.
    pub fn palette(&self) -> &[Rgba8] {
        &self.palette
    }

    /// Replaces palette entries starting at `first`.
    pub fn set_palette(&mut self, first: usize, entries: &[Rgba8]) -> RmResult<()> {
        if self.format != PixelFormat::Indexed8 || first + entries.len() > PALETTE_SIZE {
            return Err(RmError::InvalidParameter);
        }
        self.palette[first..first + entries.len()].copy_from_slice(entries);
        Ok(())
    }

    /// Bytes per row.
    pub fn pitch(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Reads one pixel as RGBA, resolving the palette when needed.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba8 {
        let i = y as usize * self.width as usize + x as usize;
        match self.format {
            PixelFormat::Rgba8 => {
                let p = &self.pixels[i * 4..i * 4 + 4];
                Rgba8::new(p[0], p[1], p[2], p[3])
            }
            PixelFormat::Indexed8 => self.palette[self.pixels[i] as usize],
        }
    }

    /// Writes one RGBA pixel. Has no effect on indexed surfaces.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba8) {
        if self.format != PixelFormat::Rgba8 || x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }

    /// Expands the surface into tightly packed RGBA bytes.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba8 => self.pixels.clone(),
            PixelFormat::Indexed8 => self
                .pixels
                .iter()
                .flat_map(|&i| {
                    let c = self.palette[i as usize];
                    [c.r, c.g, c.b, c.a]
                })
                .collect(),
        }
    }

    /// Fills this RGBA surface from a region of a larger RGBA image, scaling with
    /// nearest sampling.
    ///
    /// `src` is `width * height * 4` bytes; the region is given in source pixels
    /// and is clamped to the source bounds.
    pub fn blit_scaled_from(
        &mut self,
        src: &[u8],
        src_width: u32,
        src_height: u32,
        region: (f32, f32, f32, f32),
    ) {
        if self.format != PixelFormat::Rgba8 || src_width == 0 || src_height == 0 {
            return;
        }
        let (rx, ry, rw, rh) = region;
        for y in 0..self.height {
            let sy = (ry + (y as f32 + 0.5) * rh / self.height as f32) as i64;
            let sy = sy.clamp(0, src_height as i64 - 1) as usize;
            for x in 0..self.width {
                let sx = (rx + (x as f32 + 0.5) * rw / self.width as f32) as i64;
                let sx = sx.clamp(0, src_width as i64 - 1) as usize;
                let s = (sy * src_width as usize + sx) * 4;
                let d = (y as usize * self.width as usize + x as usize) * 4;
                self.pixels[d..d + 4].copy_from_slice(&src[s..s + 4]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_rejects_bad_length() {
        assert_eq!(
            Surface::from_rgba(2, 2, vec![0; 3]),
            Err(RmError::InvalidParameter)
        );
    }

    #[test]
    fn test_indexed_resolves_palette() {
        let red = Rgba8::new(255, 0, 0, 255);
        let mut s = Surface::from_indexed(2, 1, vec![0, 1], &[Rgba8::WHITE, red]).unwrap();
        assert_eq!(s.pixel(1, 0), red);
        assert_eq!(s.palette().len(), PALETTE_SIZE);
        s.set_palette(1, &[Rgba8::BLACK]).unwrap();
        assert_eq!(s.to_rgba8(), vec![255, 255, 255, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn test_blit_scaled_crops_region() {
        // 4x2 source: left half red, right half blue.
        let mut src = Vec::new();
        for _ in 0..2 {
            for x in 0..4 {
                src.extend_from_slice(if x < 2 { &[255, 0, 0, 255] } else { &[0, 0, 255, 255] });
            }
        }
        let mut dst = Surface::new_rgba(1, 1);
        dst.blit_scaled_from(&src, 4, 2, (2.0, 0.0, 2.0, 2.0));
        assert_eq!(dst.pixel(0, 0), Rgba8::new(0, 0, 255, 255));
    }
}
