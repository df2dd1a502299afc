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

//! Linear algebra for the rendering core.
//!
//! The types here are deliberately small: vectors, column-major matrices and
//! a [`CartesianFrame`] describing where an instance sits in the world. All
//! matrix types are `bytemuck::Pod` so they can be copied straight into push
//! constant blocks and instance buffers.
//!
//! Angles are in **radians**.

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

pub use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

pub mod frame;
pub mod matrix;
pub mod vector;

pub use self::frame::CartesianFrame;
pub use self::matrix::{Mat3, Mat4};
pub use self::vector::{Vec3, Vec4};

/// Converts degrees to radians.
///
/// # Examples
///
/// ```
/// use lumen_core::math::{degrees_to_radians, PI};
/// assert!((degrees_to_radians(180.0) - PI).abs() < 1e-6);
/// ```
#[inline]
pub fn degrees_to_radians(degrees: f32) -> f32 {
    degrees * (PI / 180.0)
}
