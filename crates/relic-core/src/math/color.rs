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

//! Colour representations: packed `0xAARRGGBB` words, 8-bit RGBA and float RGBA.

/// Packs 8-bit channels into an `0xAARRGGBB` word.
#[inline]
pub const fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Converts a float channel in `[0, 1]` to a byte, clamping out-of-range input.
#[inline]
pub fn unit_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Packs float RGB channels into an opaque `0xFFRRGGBB` word.
#[inline]
pub fn pack_rgb_f32(r: f32, g: f32, b: f32) -> u32 {
    pack_argb(0xFF, unit_to_byte(r), unit_to_byte(g), unit_to_byte(b))
}

/// A colour with 8-bit channels in memory order R, G, B, A.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Rgba8 {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque white.
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0, 0, 0, 255);

    /// Creates a colour from its channels.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpacks an `0xAARRGGBB` word.
    #[inline]
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    /// Packs into an `0xAARRGGBB` word.
    #[inline]
    pub const fn to_argb(self) -> u32 {
        pack_argb(self.a, self.r, self.g, self.b)
    }

    /// Returns `true` when the colour is fully opaque.
    #[inline]
    pub const fn is_opaque(self) -> bool {
        self.a == 255
    }
}

/// A colour with float channels in `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct FColor {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl FColor {
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    /// Transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a colour from its channels.
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Unpacks an `0xAARRGGBB` word into normalized floats.
    #[inline]
    pub fn from_argb(argb: u32) -> Self {
        Self::from(Rgba8::from_argb(argb))
    }

    /// Returns the channels as an array.
    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Converts back to bytes, clamping each channel.
    #[inline]
    pub fn to_rgba8(self) -> Rgba8 {
        Rgba8::new(
            unit_to_byte(self.r),
            unit_to_byte(self.g),
            unit_to_byte(self.b),
            unit_to_byte(self.a),
        )
    }
}

impl Default for FColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<Rgba8> for FColor {
    fn from(c: Rgba8) -> Self {
        Self::new(
            c.r as f32 / 255.0,
            c.g as f32 / 255.0,
            c.b as f32 / 255.0,
            c.a as f32 / 255.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_round_trip() {
        let c = Rgba8::from_argb(0x80112233);
        assert_eq!(c, Rgba8::new(0x11, 0x22, 0x33, 0x80));
        assert_eq!(c.to_argb(), 0x80112233);
        assert!(!c.is_opaque());
    }

    #[test]
    fn test_pack_rgb_f32_forces_alpha() {
        assert_eq!(pack_rgb_f32(1.0, 0.0, 0.5), 0xFFFF0080);
        assert_eq!(pack_rgb_f32(2.0, -1.0, 0.0), 0xFFFF0000);
    }

    #[test]
    fn test_fcolor_from_argb() {
        let c = FColor::from_argb(0xFF00FF00);
        assert_eq!(c, FColor::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(c.to_rgba8(), Rgba8::new(0, 255, 0, 255));
    }
}
