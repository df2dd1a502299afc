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

//! Column-major `Mat3` and `Mat4`, laid out the way GPU uniform and push
//! constant blocks expect them.

use super::{Vec3, Vec4, EPSILON};
use approx::{AbsDiffEq, RelativeEq};
use std::ops::Mul;

// --- Mat3 ---

/// A 3x3 column-major matrix. Mostly used as a normal matrix.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat3 {
    /// The columns of the matrix.
    pub cols: [Vec3; 3],
}

impl Mat3 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [Vec3::X, Vec3::Y, Vec3::Z],
    };

    /// Creates a matrix from three columns.
    #[inline]
    pub const fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self { cols: [c0, c1, c2] }
    }

    /// Determinant, computed as the scalar triple product of the columns.
    #[inline]
    pub fn determinant(&self) -> f32 {
        self.cols[0].cross(self.cols[1]).dot(self.cols[2])
    }

    /// Returns the transpose.
    pub fn transpose(&self) -> Self {
        let [a, b, c] = self.cols;
        Self::from_cols(
            Vec3::new(a.x, b.x, c.x),
            Vec3::new(a.y, b.y, c.y),
            Vec3::new(a.z, b.z, c.z),
        )
    }

    /// Returns the inverse, or `None` for a singular matrix.
    pub fn inverse(&self) -> Option<Self> {
        let [a, b, c] = self.cols;
        let r0 = b.cross(c);
        let r1 = c.cross(a);
        let r2 = a.cross(b);
        let det = r2.dot(c);
        if det.abs() < EPSILON * EPSILON {
            return None;
        }
        // r0..r2 are the rows of the inverse (scaled by det).
        Some(
            Self::from_cols(
                Vec3::new(r0.x, r1.x, r2.x),
                Vec3::new(r0.y, r1.y, r2.y),
                Vec3::new(r0.z, r1.z, r2.z),
            )
            .scaled(1.0 / det),
        )
    }

    /// Normal matrix of an affine model matrix: the inverse-transpose of its
    /// upper 3x3 block. Falls back to the plain 3x3 block when it is singular.
    pub fn normal_matrix(model: &Mat4) -> Self {
        let upper = model.to_mat3();
        upper
            .inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(upper)
    }

    /// Flattens the matrix into nine floats, column by column.
    pub fn to_cols_array(&self) -> [f32; 9] {
        let [a, b, c] = self.cols;
        [a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z]
    }

    #[inline]
    fn scaled(self, s: f32) -> Self {
        Self::from_cols(self.cols[0] * s, self.cols[1] * s, self.cols[2] * s)
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: Vec3) -> Vec3 {
        self.cols[0] * rhs.x + self.cols[1] * rhs.y + self.cols[2] * rhs.z
    }
}

// --- Mat4 ---

/// A 4x4 column-major matrix for model, view and projection transforms.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat4 {
    /// The columns of the matrix.
    pub cols: [Vec4; 4],
}

impl Mat4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
    };

    /// Creates a matrix from four columns.
    #[inline]
    pub const fn from_cols(c0: Vec4, c1: Vec4, c2: Vec4, c3: Vec4) -> Self {
        Self {
            cols: [c0, c1, c2, c3],
        }
    }

    /// Translation matrix.
    #[inline]
    pub fn from_translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = Vec4::from_vec3(t, 1.0);
        m
    }

    /// Non-uniform scale matrix.
    #[inline]
    pub fn from_scale(s: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(s.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, s.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, s.z, 0.0),
            Vec4::W,
        )
    }

    /// Builds an affine matrix from three basis axes and a translation.
    ///
    /// The axes are written as the first three columns unchanged, so callers
    /// fold any scale into them.
    #[inline]
    pub fn from_basis(x_axis: Vec3, y_axis: Vec3, z_axis: Vec3, translation: Vec3) -> Self {
        Self::from_cols(
            Vec4::from_vec3(x_axis, 0.0),
            Vec4::from_vec3(y_axis, 0.0),
            Vec4::from_vec3(z_axis, 0.0),
            Vec4::from_vec3(translation, 1.0),
        )
    }

    /// Right-handed perspective projection with a `[0, 1]` depth range.
    pub fn perspective_rh_zo(fov_y_radians: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        let f = 1.0 / (0.5 * fov_y_radians).tan();
        let range = z_near - z_far;
        Self::from_cols(
            Vec4::new(f / aspect, 0.0, 0.0, 0.0),
            Vec4::new(0.0, f, 0.0, 0.0),
            Vec4::new(0.0, 0.0, z_far / range, -1.0),
            Vec4::new(0.0, 0.0, z_near * z_far / range, 0.0),
        )
    }

    /// Right-handed orthographic projection with a `[0, 1]` depth range.
    pub fn orthographic_rh_zo(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        z_near: f32,
        z_far: f32,
    ) -> Self {
        let rl = 1.0 / (right - left);
        let tb = 1.0 / (top - bottom);
        let nf = 1.0 / (z_near - z_far);
        Self::from_cols(
            Vec4::new(2.0 * rl, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 * tb, 0.0, 0.0),
            Vec4::new(0.0, 0.0, nf, 0.0),
            Vec4::new(-(left + right) * rl, -(top + bottom) * tb, z_near * nf, 1.0),
        )
    }

    /// Right-handed view matrix looking from `eye` toward `target`.
    ///
    /// Returns `None` if `eye` and `target` coincide or `up` is parallel to the
    /// view direction.
    pub fn look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Option<Self> {
        let forward = (target - eye).try_normalize()?;
        let side = forward.cross(up).try_normalize()?;
        let up = side.cross(forward);
        Some(Self::from_cols(
            Vec4::new(side.x, up.x, -forward.x, 0.0),
            Vec4::new(side.y, up.y, -forward.y, 0.0),
            Vec4::new(side.z, up.z, -forward.z, 0.0),
            Vec4::new(-side.dot(eye), -up.dot(eye), forward.dot(eye), 1.0),
        ))
    }

    /// Returns the transpose.
    pub fn transpose(&self) -> Self {
        Self::from_cols(self.row(0), self.row(1), self.row(2), self.row(3))
    }

    /// Returns row `index` as a vector.
    #[inline]
    pub fn row(&self, index: usize) -> Vec4 {
        Vec4::new(
            self.cols[0].component(index),
            self.cols[1].component(index),
            self.cols[2].component(index),
            self.cols[3].component(index),
        )
    }

    /// General inverse, or `None` for a singular matrix.
    pub fn inverse(&self) -> Option<Self> {
        let a = self.cols[0].truncate();
        let b = self.cols[1].truncate();
        let c = self.cols[2].truncate();
        let d = self.cols[3].truncate();
        let (x, y, z, w) = (
            self.cols[0].w,
            self.cols[1].w,
            self.cols[2].w,
            self.cols[3].w,
        );

        let s = a.cross(b);
        let t = c.cross(d);
        let u = a * y - b * x;
        let v = c * w - d * z;

        let det = s.dot(v) + t.dot(u);
        if det.abs() < EPSILON * EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let (s, t, u, v) = (s * inv_det, t * inv_det, u * inv_det, v * inv_det);

        // Rows of the inverse.
        let r0 = b.cross(v) + t * y;
        let r1 = v.cross(a) - t * x;
        let r2 = d.cross(u) + s * w;
        let r3 = u.cross(c) - s * z;
        let last = Vec4::new(-b.dot(t), a.dot(t), -d.dot(s), c.dot(s));

        Some(Self::from_cols(
            Vec4::new(r0.x, r1.x, r2.x, r3.x),
            Vec4::new(r0.y, r1.y, r2.y, r3.y),
            Vec4::new(r0.z, r1.z, r2.z, r3.z),
            last,
        ))
    }

    /// Upper-left 3x3 block.
    #[inline]
    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_cols(
            self.cols[0].truncate(),
            self.cols[1].truncate(),
            self.cols[2].truncate(),
        )
    }

    /// Copy of the matrix with its translation column reset.
    ///
    /// Applied to a view matrix this yields the "infinity view" used by sky
    /// boxes and other geometry that must stay centered on the camera.
    #[inline]
    pub fn without_translation(&self) -> Self {
        let mut m = *self;
        m.cols[3] = Vec4::W;
        m
    }

    /// Translation part of an affine matrix.
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.cols[3].truncate()
    }

    /// Transforms a point (w = 1).
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        (*self * Vec4::from_vec3(p, 1.0)).truncate()
    }

    /// Flattens the matrix into sixteen floats, column by column.
    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        for (chunk, col) in out.chunks_exact_mut(4).zip(self.cols.iter()) {
            chunk.copy_from_slice(&[col.x, col.y, col.z, col.w]);
        }
        out
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;
    #[inline]
    fn mul(self, rhs: Vec4) -> Vec4 {
        self.cols[0] * rhs.x + self.cols[1] * rhs.y + self.cols[2] * rhs.z + self.cols[3] * rhs.w
    }
}

impl Mul<Mat4> for Mat4 {
    type Output = Mat4;
    #[inline]
    fn mul(self, rhs: Mat4) -> Mat4 {
        Self::from_cols(
            self * rhs.cols[0],
            self * rhs.cols[1],
            self * rhs.cols[2],
            self * rhs.cols[3],
        )
    }
}

impl AbsDiffEq for Mat4 {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

impl RelativeEq for Mat4 {
    fn default_max_relative() -> f32 {
        f32::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f32, max_relative: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn sample_affine() -> Mat4 {
        Mat4::from_translation(Vec3::new(3.0, -2.0, 5.0))
            * Mat4::from_basis(
                Vec3::new(0.0, 0.0, -2.0),
                Vec3::new(0.0, 3.0, 0.0),
                Vec3::new(0.5, 0.0, 0.0),
                Vec3::ZERO,
            )
    }

    #[test]
    fn inverse_of_affine_matrix_round_trips_to_identity() {
        let m = sample_affine();
        let inv = m.inverse().expect("matrix should be invertible");
        assert_abs_diff_eq!(m * inv, Mat4::IDENTITY, epsilon = 1e-5);
        assert_abs_diff_eq!(inv * m, Mat4::IDENTITY, epsilon = 1e-5);
    }

    #[test]
    fn inverse_of_projection_matrix() {
        let p = Mat4::perspective_rh_zo(1.0, 16.0 / 9.0, 0.1, 100.0);
        let inv = p.inverse().expect("projection should be invertible");
        assert_abs_diff_eq!(p * inv, Mat4::IDENTITY, epsilon = 1e-4);
    }

    #[test]
    fn singular_matrices_have_no_inverse() {
        assert!(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)).inverse().is_none());
        let flat = Mat3::from_cols(Vec3::X, Vec3::X, Vec3::Z);
        assert!(flat.inverse().is_none());
    }

    #[test]
    fn mat3_inverse_matches_scale() {
        let m = Mat4::from_scale(Vec3::new(2.0, 4.0, 8.0)).to_mat3();
        let inv = m.inverse().expect("scale should be invertible");
        assert_relative_eq!(inv * Vec3::new(2.0, 4.0, 8.0), Vec3::ONE);
    }

    #[test]
    fn normal_matrix_of_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = Mat3::normal_matrix(&model);
        assert_relative_eq!(n * Vec3::X, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn look_at_moves_eye_to_origin() {
        let eye = Vec3::new(0.0, 2.0, 10.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y).expect("valid view");
        assert_abs_diff_eq!(view.transform_point(eye), Vec3::ZERO, epsilon = 1e-5);
        // The target lies straight ahead, on -Z.
        let target = view.transform_point(Vec3::ZERO);
        assert!(target.z < 0.0);
        assert_abs_diff_eq!(target.x, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn look_at_rejects_degenerate_input() {
        assert!(Mat4::look_at_rh(Vec3::ONE, Vec3::ONE, Vec3::Y).is_none());
        assert!(Mat4::look_at_rh(Vec3::ZERO, Vec3::Y, Vec3::Y).is_none());
    }

    #[test]
    fn without_translation_keeps_rotation() {
        let m = sample_affine();
        let stripped = m.without_translation();
        assert_eq!(stripped.translation(), Vec3::ZERO);
        assert_eq!(stripped.to_mat3(), m.to_mat3());
    }

    #[test]
    fn cols_array_is_column_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let flat = m.to_cols_array();
        assert_eq!(&flat[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(flat[15], 1.0);
    }
}
