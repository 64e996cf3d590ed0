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

//! Surface materials. Only the specular power reaches the renderers.

use crate::math::Vec3;
use crate::object::{Object, ObjectCore};
use std::cell::Cell;
use std::rc::Rc;

struct MaterialInner {
    core: ObjectCore,
    power: Cell<f32>,
    specular: Cell<Vec3>,
    emissive: Cell<Vec3>,
}

/// A shared material handle.
#[derive(Clone)]
pub struct Material(Rc<MaterialInner>);

impl Material {
    /// Creates a material with the given specular power.
    pub fn new(power: f32) -> Self {
        Material(Rc::new(MaterialInner {
            core: ObjectCore::new(),
            power: Cell::new(power),
            specular: Cell::new(Vec3::ONE),
            emissive: Cell::new(Vec3::ZERO),
        }))
    }

    /// Specular exponent; 0 disables highlights.
    pub fn power(&self) -> f32 {
        self.0.power.get()
    }

    /// Sets the specular exponent.
    pub fn set_power(&self, power: f32) {
        self.0.power.set(power);
    }

    /// Specular colour.
    pub fn specular(&self) -> Vec3 {
        self.0.specular.get()
    }

    /// Sets the specular colour.
    pub fn set_specular(&self, r: f32, g: f32, b: f32) {
        self.0.specular.set(Vec3::new(r, g, b));
    }

    /// Emissive colour.
    pub fn emissive(&self) -> Vec3 {
        self.0.emissive.get()
    }

    /// Sets the emissive colour.
    pub fn set_emissive(&self, r: f32, g: f32, b: f32) {
        self.0.emissive.set(Vec3::new(r, g, b));
    }
}

impl Object for Material {
    fn core(&self) -> &ObjectCore {
        &self.0.core
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("id", &self.id())
            .field("power", &self.power())
            .finish()
    }
}
