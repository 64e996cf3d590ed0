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

//! Provides row-major 3x3 and 4x4 matrix types using the row-vector convention.

use super::{
    vector::{Vec3, Vec4},
    EPSILON,
};
use std::ops::{Index, Mul};

/// Determinant threshold under which the normal matrix degenerates to zero.
pub const NORMAL_MATRIX_EPSILON: f32 = 1e-6;

// --- Mat3 ---

/// A 3x3 row-major matrix, typically the linear part of an affine transform.
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat3 {
    /// The rows of the matrix.
    pub m: [[f32; 3]; 3],
}

impl Mat3 {
    /// The 3x3 identity matrix.
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// A 3x3 matrix with all elements set to 0.
    pub const ZERO: Self = Self { m: [[0.0; 3]; 3] };

    /// Creates a matrix from its rows.
    #[inline]
    pub const fn from_rows(m: [[f32; 3]; 3]) -> Self {
        Self { m }
    }

    /// Computes the determinant of the matrix.
    pub fn determinant(&self) -> f32 {
        let [[a, b, c], [d, e, f], [g, h, i]] = self.m;
        a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g)
    }

    /// Returns the transpose of the matrix.
    pub fn transpose(&self) -> Self {
        let m = self.m;
        Self::from_rows([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// Computes the inverse of the matrix, or `None` if it is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < NORMAL_MATRIX_EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        let [[a, b, c], [d, e, f], [g, h, i]] = self.m;
        Some(Self::from_rows([
            [(e * i - f * h) * inv, (c * h - b * i) * inv, (b * f - c * e) * inv],
            [(f * g - d * i) * inv, (a * i - c * g) * inv, (c * d - a * f) * inv],
            [(d * h - e * g) * inv, (b * g - a * h) * inv, (a * e - b * d) * inv],
        ]))
    }

    /// Builds the matrix that carries normals through the linear part of a world
    /// transform: the inverse transpose, or all zeros when the transform is
    /// degenerate.
    pub fn normal_matrix(world: &Mat4) -> Self {
        match world.upper_3x3().inverse() {
            Some(inv) => inv.transpose(),
            None => Self::ZERO,
        }
    }

    /// Transforms a row vector: `v * M`.
    #[inline]
    pub fn transform(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            v.x * m[0][0] + v.y * m[1][0] + v.z * m[2][0],
            v.x * m[0][1] + v.y * m[1][1] + v.z * m[2][1],
            v.x * m[0][2] + v.y * m[1][2] + v.z * m[2][2],
        )
    }

    /// Returns the rows padded to four floats each, the layout GPU uniform blocks expect.
    pub fn to_padded_rows(&self) -> [[f32; 4]; 3] {
        let m = self.m;
        [
            [m[0][0], m[0][1], m[0][2], 0.0],
            [m[1][0], m[1][1], m[1][2], 0.0],
            [m[2][0], m[2][1], m[2][2], 0.0],
        ]
    }
}

impl Default for Mat3 {
    /// Returns the 3x3 identity matrix.
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

// --- Mat4 ---

/// A 4x4 row-major matrix using the row-vector convention (`v' = v * M`).
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat4 {
    /// The rows of the matrix. Row 3 holds the translation of an affine transform.
    pub m: [[f32; 4]; 4],
}

impl Mat4 {
    /// The 4x4 identity matrix.
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// A 4x4 matrix with all elements set to 0.
    pub const ZERO: Self = Self { m: [[0.0; 4]; 4] };

    /// Creates a matrix from its rows.
    #[inline]
    pub const fn from_rows(m: [[f32; 4]; 4]) -> Self {
        Self { m }
    }

    /// Returns a row of the matrix.
    #[inline]
    pub fn row(&self, index: usize) -> Vec4 {
        let r = self.m[index];
        Vec4::new(r[0], r[1], r[2], r[3])
    }

    /// Creates a translation matrix.
    #[inline]
    pub fn from_translation(v: Vec3) -> Self {
        let mut out = Self::IDENTITY;
        out.m[3] = [v.x, v.y, v.z, 1.0];
        out
    }

    /// Creates a non-uniform scale matrix.
    #[inline]
    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_rows([
            [scale.x, 0.0, 0.0, 0.0],
            [0.0, scale.y, 0.0, 0.0],
            [0.0, 0.0, scale.z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Creates a left-handed rotation around the X axis.
    pub fn from_rotation_x(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, c, s, 0.0],
            [0.0, -s, c, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Creates a left-handed rotation around the Y axis.
    pub fn from_rotation_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([
            [c, 0.0, -s, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [s, 0.0, c, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Creates a left-handed rotation around the Z axis.
    pub fn from_rotation_z(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([
            [c, s, 0.0, 0.0],
            [-s, c, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Builds the left-handed perspective projection used by viewports.
    ///
    /// `f_h` and `f_v` are the horizontal and vertical focal scales; depth maps
    /// `front` to 0 and `back` to 1.
    pub fn perspective_lh(f_h: f32, f_v: f32, front: f32, back: f32) -> Self {
        let depth = back - front;
        Self::from_rows([
            [f_h, 0.0, 0.0, 0.0],
            [0.0, f_v, 0.0, 0.0],
            [0.0, 0.0, back / depth, 1.0],
            [0.0, 0.0, -front * back / depth, 0.0],
        ])
    }

    /// Analytic inverse of [`Mat4::perspective_lh`].
    pub fn perspective_lh_inverse(f_h: f32, f_v: f32, front: f32, back: f32) -> Self {
        let depth = back - front;
        let q = depth / (-front * back);
        Self::from_rows([
            [1.0 / f_h, 0.0, 0.0, 0.0],
            [0.0, 1.0 / f_v, 0.0, 0.0],
            [0.0, 0.0, 0.0, q],
            [0.0, 0.0, 1.0, -(back / depth) * q],
        ])
    }

    /// Builds the 2D orthographic projection that maps pixel space (y down) to NDC.
    pub fn orthographic_2d(width: f32, height: f32) -> Self {
        Self::from_rows([
            [2.0 / width, 0.0, 0.0, 0.0],
            [0.0, -2.0 / height, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [-1.0, 1.0, 0.0, 1.0],
        ])
    }

    /// Returns the translation stored in row 3.
    #[inline]
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[3][0], self.m[3][1], self.m[3][2])
    }

    /// Returns the linear (upper-left 3x3) part.
    pub fn upper_3x3(&self) -> Mat3 {
        let m = &self.m;
        Mat3::from_rows([
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ])
    }

    /// Returns the transpose of the matrix.
    pub fn transpose(&self) -> Self {
        let mut out = Self::ZERO;
        for (r, row) in self.m.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                out.m[c][r] = *value;
            }
        }
        out
    }

    /// Transforms a homogeneous row vector: `v * M`.
    #[inline]
    pub fn transform_vec4(&self, v: Vec4) -> Vec4 {
        let m = &self.m;
        Vec4::new(
            v.x * m[0][0] + v.y * m[1][0] + v.z * m[2][0] + v.w * m[3][0],
            v.x * m[0][1] + v.y * m[1][1] + v.z * m[2][1] + v.w * m[3][1],
            v.x * m[0][2] + v.y * m[1][2] + v.z * m[2][2] + v.w * m[3][2],
            v.x * m[0][3] + v.y * m[1][3] + v.z * m[2][3] + v.w * m[3][3],
        )
    }

    /// Transforms a point (`w = 1`) and returns the homogeneous result.
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec4 {
        self.transform_vec4(p.extend(1.0))
    }

    /// Transforms a point and drops `w`, assuming an affine matrix.
    #[inline]
    pub fn transform_point3(&self, p: Vec3) -> Vec3 {
        self.transform_point(p).truncate()
    }

    /// Transforms a direction (`w = 0`).
    #[inline]
    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        self.transform_vec4(d.extend(0.0)).truncate()
    }

    /// Inverts a rigid-body transform (rotation plus translation) by transposing
    /// the rotation and negating the rotated translation.
    pub fn rigid_inverse(&self) -> Self {
        let m = &self.m;
        let mut out = Self::IDENTITY;
        for r in 0..3 {
            for c in 0..3 {
                out.m[r][c] = m[c][r];
            }
        }
        let t = self.translation();
        for c in 0..3 {
            out.m[3][c] = -(t.x * out.m[0][c] + t.y * out.m[1][c] + t.z * out.m[2][c]);
        }
        out
    }

    /// Computes the determinant of the matrix.
    pub fn determinant(&self) -> f32 {
        let (s, c) = self.sub_factors();
        s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0]
    }

    /// 2x2 minors of the top two and bottom two rows, for Laplace expansion.
    fn sub_factors(&self) -> ([f32; 6], [f32; 6]) {
        let a = &self.m;
        let s = [
            a[0][0] * a[1][1] - a[1][0] * a[0][1],
            a[0][0] * a[1][2] - a[1][0] * a[0][2],
            a[0][0] * a[1][3] - a[1][0] * a[0][3],
            a[0][1] * a[1][2] - a[1][1] * a[0][2],
            a[0][1] * a[1][3] - a[1][1] * a[0][3],
            a[0][2] * a[1][3] - a[1][2] * a[0][3],
        ];
        let c = [
            a[2][0] * a[3][1] - a[3][0] * a[2][1],
            a[2][0] * a[3][2] - a[3][0] * a[2][2],
            a[2][0] * a[3][3] - a[3][0] * a[2][3],
            a[2][1] * a[3][2] - a[3][1] * a[2][2],
            a[2][1] * a[3][3] - a[3][1] * a[2][3],
            a[2][2] * a[3][3] - a[3][2] * a[2][3],
        ];
        (s, c)
    }

    /// Computes the inverse of the matrix.
    /// Returns `None` if the matrix is not invertible.
    pub fn inverse(&self) -> Option<Self> {
        let (s, c) = self.sub_factors();
        let det =
            s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0];
        if det.abs() < EPSILON * EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        let a = &self.m;
        let out = [
            [
                (a[1][1] * c[5] - a[1][2] * c[4] + a[1][3] * c[3]) * inv,
                (-a[0][1] * c[5] + a[0][2] * c[4] - a[0][3] * c[3]) * inv,
                (a[3][1] * s[5] - a[3][2] * s[4] + a[3][3] * s[3]) * inv,
                (-a[2][1] * s[5] + a[2][2] * s[4] - a[2][3] * s[3]) * inv,
            ],
            [
                (-a[1][0] * c[5] + a[1][2] * c[2] - a[1][3] * c[1]) * inv,
                (a[0][0] * c[5] - a[0][2] * c[2] + a[0][3] * c[1]) * inv,
                (-a[3][0] * s[5] + a[3][2] * s[2] - a[3][3] * s[1]) * inv,
                (a[2][0] * s[5] - a[2][2] * s[2] + a[2][3] * s[1]) * inv,
            ],
            [
                (a[1][0] * c[4] - a[1][1] * c[2] + a[1][3] * c[0]) * inv,
                (-a[0][0] * c[4] + a[0][1] * c[2] - a[0][3] * c[0]) * inv,
                (a[3][0] * s[4] - a[3][1] * s[2] + a[3][3] * s[0]) * inv,
                (-a[2][0] * s[4] + a[2][1] * s[2] - a[2][3] * s[0]) * inv,
            ],
            [
                (-a[1][0] * c[3] + a[1][1] * c[1] - a[1][2] * c[0]) * inv,
                (a[0][0] * c[3] - a[0][1] * c[1] + a[0][2] * c[0]) * inv,
                (-a[3][0] * s[3] + a[3][1] * s[1] - a[3][2] * s[0]) * inv,
                (a[2][0] * s[3] - a[2][1] * s[1] + a[2][2] * s[0]) * inv,
            ],
        ];
        Some(Self::from_rows(out))
    }
}

// --- Operators Overloading ---

impl Default for Mat4 {
    /// Returns the 4x4 identity matrix.
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Mat4> for Mat4 {
    type Output = Self;
    /// `self * rhs`: with row vectors, `self` is applied first.
    fn mul(self, rhs: Mat4) -> Self::Output {
        let mut out = Self::ZERO;
        for r in 0..4 {
            for c in 0..4 {
                out.m[r][c] = (0..4).map(|k| self.m[r][k] * rhs.m[k][c]).sum();
            }
        }
        out
    }
}

impl Index<usize> for Mat4 {
    type Output = [f32; 4];
    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.m[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{approx_eq, FRAC_PI_2};

    fn mat4_approx_eq(a: Mat4, b: Mat4) -> bool {
        a.m.iter()
            .flatten()
            .zip(b.m.iter().flatten())
            .all(|(x, y)| approx_eq(*x, *y))
    }

    fn vec3_approx_eq(a: Vec3, b: Vec3) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    /// Small deterministic generator so the randomized checks are reproducible.
    struct Lcg(u32);

    impl Lcg {
        fn next(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (self.0 >> 8) as f32 / (1u32 << 24) as f32
        }
    }

    #[test]
    fn test_translation_lives_in_row_three() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.translation(), Vec3::new(1.0, 2.0, 3.0));
        let p = m.transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rotation_y_is_left_handed() {
        // +X rotated by +90deg about Y points to -Z in a left-handed system.
        let r = Mat4::from_rotation_y(FRAC_PI_2);
        let v = r.transform_direction(Vec3::X);
        assert!(vec3_approx_eq(v, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_product_applies_left_operand_first() {
        let t = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let r = Mat4::from_rotation_z(FRAC_PI_2);
        let p = (t * r).transform_point3(Vec3::ZERO);
        // Translate first, then rotate +X onto +Y.
        assert!(vec3_approx_eq(p, Vec3::new(0.0, 5.0, 0.0)));
        let q = (r * t).transform_point3(Vec3::ZERO);
        assert!(vec3_approx_eq(q, Vec3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_inverse_of_identity_and_singular() {
        assert_eq!(Mat4::IDENTITY.inverse(), Some(Mat4::IDENTITY));
        assert!(Mat4::ZERO.inverse().is_none());
    }

    #[test]
    fn test_general_inverse_round_trip() {
        let m = Mat4::from_scale(Vec3::new(2.0, 3.0, 0.5))
            * Mat4::from_rotation_x(0.3)
            * Mat4::from_translation(Vec3::new(1.0, -2.0, 4.0));
        let inv = m.inverse().unwrap();
        assert!(mat4_approx_eq(m * inv, Mat4::IDENTITY));
        assert!(mat4_approx_eq(inv * m, Mat4::IDENTITY));
    }

    #[test]
    fn test_rigid_inverse_matches_general_inverse() {
        let mut rng = Lcg(7);
        for _ in 0..64 {
            let rot = Mat4::from_rotation_x(rng.next() * 6.0)
                * Mat4::from_rotation_y(rng.next() * 6.0)
                * Mat4::from_rotation_z(rng.next() * 6.0);
            let t = Vec3::new(
                rng.next() * 10.0 - 5.0,
                rng.next() * 10.0 - 5.0,
                rng.next() * 10.0 - 5.0,
            );
            let world = rot * Mat4::from_translation(t);
            let brute = world.inverse().unwrap();
            assert!(mat4_approx_eq(world.rigid_inverse(), brute));
        }
    }

    #[test]
    fn test_perspective_inverse_round_trip() {
        let proj = Mat4::perspective_lh(2.0, 2.5, 1.0, 100.0);
        let inv = Mat4::perspective_lh_inverse(2.0, 2.5, 1.0, 100.0);
        assert!(mat4_approx_eq(proj * inv, Mat4::IDENTITY));
    }

    #[test]
    fn test_perspective_maps_front_to_zero_and_back_to_one() {
        let proj = Mat4::perspective_lh(1.0, 1.0, 1.0, 10.0);
        let near = proj.transform_point(Vec3::new(0.0, 0.0, 1.0));
        let far = proj.transform_point(Vec3::new(0.0, 0.0, 10.0));
        assert!(approx_eq(near.z / near.w, 0.0));
        assert!(approx_eq(far.z / far.w, 1.0));
        assert_eq!(proj.m[2][3], 1.0);
    }

    #[test]
    fn test_normal_matrix_handles_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = Mat3::normal_matrix(&world);
        // A surface tilted 45 degrees keeps a normal perpendicular to its tangent.
        let tangent = world.transform_direction(Vec3::new(1.0, -1.0, 0.0));
        let normal = n.transform(Vec3::new(1.0, 1.0, 0.0));
        assert!(approx_eq(tangent.dot(normal), 0.0));
        assert_eq!(Mat3::normal_matrix(&Mat4::ZERO), Mat3::ZERO);
    }

    #[test]
    fn test_mat3_inverse() {
        let m = Mat3::from_rows([[2.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 1.0]]);
        let inv = m.inverse().unwrap();
        let id = Mat3::IDENTITY;
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let back = inv.transform(m.transform(axis));
            assert!(vec3_approx_eq(back, id.transform(axis)));
        }
    }
}
