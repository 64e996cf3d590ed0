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

//! Per-vertex lighting models.
//!
//! Two models are provided. [`shade_programmable`] is the one the GPU
//! backends run in their vertex stage: ambient lights add flat colour,
//! every other light adds Lambert diffuse, and only directional lights add a
//! Blinn-Phong highlight. [`shade_fixed_function`] follows the classic
//! fixed-function device: an ambient render state, directional and point
//! lights, and specular from every light whenever the material is shiny.
//!
//! Inputs are expected in one space (world or view), chosen by the caller.

use relic_core::math::{Vec3, Vec4};
use relic_core::renderer::SceneLight;

/// A lit point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadePoint {
    /// Position.
    pub position: Vec3,
    /// Unit normal.
    pub normal: Vec3,
    /// Eye position, for specular.
    pub eye: Vec3,
}

fn clamp01(v: Vec3) -> Vec3 {
    Vec3::new(v.x.clamp(0.0, 1.0), v.y.clamp(0.0, 1.0), v.z.clamp(0.0, 1.0))
}

fn to_light(light: &SceneLight, position: Vec3) -> Vec3 {
    if light.is_directional() {
        -light.direction().normalize()
    } else {
        (light.position() - position).normalize()
    }
}

fn blinn(normal: Vec3, to_light: Vec3, to_eye: Vec3, shininess: f32) -> f32 {
    let half = (to_light + to_eye).normalize();
    normal.dot(half).max(0.0).powf(shininess)
}

/// Lighting as evaluated by the programmable pipelines.
pub fn shade_programmable(lights: &[SceneLight], point: &ShadePoint, base: Vec4, shininess: f32) -> Vec4 {
    let to_eye = (point.eye - point.position).normalize();
    let mut diffuse = Vec3::ZERO;
    let mut specular = Vec3::ZERO;
    for light in lights {
        if light.is_ambient() {
            diffuse += light.rgb();
            continue;
        }
        let l = to_light(light, point.position);
        let n_dot_l = point.normal.dot(l).max(0.0);
        diffuse += light.rgb() * n_dot_l;
        if light.is_directional() && shininess > 0.0 && n_dot_l > 0.0 {
            specular += light.rgb() * blinn(point.normal, l, to_eye, shininess);
        }
    }
    let rgb = clamp01(diffuse * base.truncate() + specular);
    rgb.extend(base.w)
}

/// Lighting as evaluated by a fixed-function device.
///
/// Spot lights are lit as point lights; the cone is not modelled.
pub fn shade_fixed_function(
    lights: &[SceneLight],
    point: &ShadePoint,
    base: Vec4,
    shininess: f32,
) -> Vec4 {
    let to_eye = (point.eye - point.position).normalize();
    let mut ambient = Vec3::ZERO;
    let mut diffuse = Vec3::ZERO;
    let mut specular = Vec3::ZERO;
    for light in lights {
        if light.is_ambient() {
            ambient += light.rgb();
            continue;
        }
        let l = if light.is_positional() {
            (light.position() - point.position).normalize()
        } else {
            -light.direction().normalize()
        };
        let n_dot_l = point.normal.dot(l).max(0.0);
        diffuse += light.rgb() * n_dot_l;
        if shininess != 0.0 && n_dot_l > 0.0 {
            specular += light.rgb() * blinn(point.normal, l, to_eye, shininess);
        }
    }
    let rgb = clamp01((ambient + diffuse) * base.truncate() + specular);
    rgb.extend(base.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relic_core::math::FColor;

    fn facing_camera() -> ShadePoint {
        ShadePoint {
            position: Vec3::ZERO,
            normal: Vec3::new(0.0, 0.0, -1.0),
            eye: Vec3::new(0.0, 0.0, -5.0),
        }
    }

    fn white() -> FColor {
        FColor::new(1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn test_ambient_only_scales_base() {
        let lights = [SceneLight::ambient(FColor::new(0.5, 0.5, 0.5, 1.0))];
        let c = shade_programmable(&lights, &facing_camera(), Vec4::new(1.0, 0.5, 0.0, 0.75), 0.0);
        assert_relative_eq!(c.x, 0.5);
        assert_relative_eq!(c.y, 0.25);
        assert_relative_eq!(c.w, 0.75);
    }

    #[test]
    fn test_directional_light_head_on() {
        let lights = [SceneLight::new(white(), None, Some(Vec3::Z))];
        let c = shade_programmable(&lights, &facing_camera(), Vec4::new(0.2, 0.4, 0.6, 1.0), 0.0);
        assert_relative_eq!(c.x, 0.2, epsilon = 1e-5);
        assert_relative_eq!(c.z, 0.6, epsilon = 1e-5);

        let behind = [SceneLight::new(white(), None, Some(-Vec3::Z))];
        let c = shade_programmable(&behind, &facing_camera(), Vec4::new(0.2, 0.4, 0.6, 1.0), 0.0);
        assert_relative_eq!(c.x, 0.0);
    }

    #[test]
    fn test_programmable_specular_is_directional_only() {
        let base = Vec4::new(0.2, 0.2, 0.2, 1.0);
        let point_light = [SceneLight::new(white(), Some(Vec3::new(0.0, 0.0, -5.0)), None)];
        let lit = shade_programmable(&point_light, &facing_camera(), base, 8.0);
        assert_relative_eq!(lit.x, 0.2, epsilon = 1e-5);

        let fixed = shade_fixed_function(&point_light, &facing_camera(), base, 8.0);
        assert_relative_eq!(fixed.x, 1.0, epsilon = 1e-5);
    }
}
