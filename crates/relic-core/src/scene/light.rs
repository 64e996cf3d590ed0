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

//! Lights attached to frames.

use crate::math::color::pack_rgb_f32;
use crate::object::{Object, ObjectCore};
use std::cell::Cell;
use std::rc::Rc;

/// The kind of a light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Uniform light from every direction.
    Ambient,
    /// Omnidirectional light at the frame's position.
    Point,
    /// Cone light at the frame's position, aimed along the frame's Z axis.
    Spot,
    /// Parallel light along the frame's Z axis.
    Directional,
    /// Point light whose rays are treated as parallel.
    ParallelPoint,
}

impl LightType {
    /// Whether the light takes its position from the frame's world translation.
    pub const fn is_positional(self) -> bool {
        matches!(
            self,
            LightType::Point | LightType::Spot | LightType::ParallelPoint
        )
    }

    /// Whether the light takes its direction from the frame's world Z axis.
    pub const fn is_directional(self) -> bool {
        matches!(self, LightType::Directional | LightType::Spot)
    }
}

struct LightInner {
    core: ObjectCore,
    kind: Cell<LightType>,
    color: Cell<u32>,
}

/// A shared light handle.
#[derive(Clone)]
pub struct Light(Rc<LightInner>);

impl Light {
    /// Creates a light of `kind` with an `0xAARRGGBB` colour.
    pub fn new(kind: LightType, argb: u32) -> Self {
        Light(Rc::new(LightInner {
            core: ObjectCore::new(),
            kind: Cell::new(kind),
            color: Cell::new(argb),
        }))
    }

    /// Creates a light from float RGB channels.
    pub fn new_rgb(kind: LightType, r: f32, g: f32, b: f32) -> Self {
        Self::new(kind, pack_rgb_f32(r, g, b))
    }

    /// The light kind.
    pub fn light_type(&self) -> LightType {
        self.0.kind.get()
    }

    /// Changes the light kind.
    pub fn set_type(&self, kind: LightType) {
        self.0.kind.set(kind);
    }

    /// The colour as `0xAARRGGBB`.
    pub fn color(&self) -> u32 {
        self.0.color.get()
    }

    /// Sets the colour from an `0xAARRGGBB` word.
    pub fn set_color(&self, argb: u32) {
        self.0.color.set(argb);
    }

    /// Sets the colour from float channels; alpha is forced to opaque.
    pub fn set_color_rgb(&self, r: f32, g: f32, b: f32) {
        self.0.color.set(pack_rgb_f32(r, g, b));
    }
}

impl Object for Light {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Light {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Light")
            .field("id", &self.id())
            .field("type", &self.light_type())
            .field("color", &format_args!("{:#010x}", self.color()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_color_rgb_packs_opaque_argb() {
        let l = Light::new_rgb(LightType::Point, 0.0, 0.0, 0.0);
        l.set_color_rgb(1.0, 0.5, 0.0);
        assert_eq!(l.color(), 0xFFFF8000);
    }

    #[test]
    fn test_type_classification() {
        assert!(LightType::Spot.is_positional() && LightType::Spot.is_directional());
        assert!(!LightType::Ambient.is_positional() && !LightType::Ambient.is_directional());
        assert!(LightType::ParallelPoint.is_positional());
        assert!(!LightType::Directional.is_positional());
    }
}
