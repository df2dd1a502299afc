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

//! A position + orientation + scale frame, the CPU-side transform of every
//! renderable instance.

use super::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// A right-handed local coordinate frame.
///
/// Local axes map as follows: `+X` is [`CartesianFrame::right`], `+Y` is
/// [`CartesianFrame::up`] and `-Z` is [`CartesianFrame::forward`].
/// `forward` and `up` are kept orthonormal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianFrame {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    scale: Vec3,
}

impl Default for CartesianFrame {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
            scale: Vec3::ONE,
        }
    }
}

impl CartesianFrame {
    /// A frame at `position` with the default orientation and unit scale.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Builder-style orientation override. See [`CartesianFrame::set_orientation`].
    pub fn with_orientation(mut self, forward: Vec3, up: Vec3) -> Self {
        self.set_orientation(forward, up);
        self
    }

    /// Builder-style scale override.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// World position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit forward vector.
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// Unit up vector.
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Unit right vector.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up)
    }

    /// Per-axis scale.
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Moves the frame to `position`.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Moves the frame by `offset`.
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Replaces the per-axis scale.
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    /// Re-orients the frame.
    ///
    /// `up` is re-orthogonalized against `forward`. Degenerate input (a zero
    /// forward, or an up parallel to it) leaves the orientation unchanged and
    /// returns `false`.
    pub fn set_orientation(&mut self, forward: Vec3, up: Vec3) -> bool {
        match orthonormal_basis(forward, up) {
            Some((forward, up)) => {
                self.forward = forward;
                self.up = up;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of this frame turned to face `target`.
    ///
    /// The orientation is rebuilt from `target - position` alone; the stored
    /// forward and up vectors are ignored. World `+Y` is used as the up hint,
    /// falling back to `+Z` when looking straight up or down. Position and
    /// scale are preserved. If `target` coincides with the position the frame
    /// is returned unchanged.
    pub fn facing_point(&self, target: Vec3) -> Self {
        let direction = target - self.position;
        let basis =
            orthonormal_basis(direction, Vec3::Y).or_else(|| orthonormal_basis(direction, Vec3::Z));
        match basis {
            Some((forward, up)) => Self {
                forward,
                up,
                ..*self
            },
            None => *self,
        }
    }

    /// Model (local-to-world) matrix: translation * rotation * scale.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_basis(
            self.right() * self.scale.x,
            self.up * self.scale.y,
            -self.forward * self.scale.z,
            self.position,
        )
    }
}

fn orthonormal_basis(forward: Vec3, up_hint: Vec3) -> Option<(Vec3, Vec3)> {
    let forward = forward.try_normalize()?;
    let right = forward.cross(up_hint).try_normalize()?;
    Some((forward, right.cross(forward)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_frame_is_identity() {
        assert_eq!(CartesianFrame::default().model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn model_matrix_places_origin_at_position() {
        let frame = CartesianFrame::at(Vec3::new(4.0, 5.0, 6.0)).with_scale(Vec3::new(2.0, 2.0, 2.0));
        let m = frame.model_matrix();
        assert_relative_eq!(m.transform_point(Vec3::ZERO), Vec3::new(4.0, 5.0, 6.0));
        assert_relative_eq!(
            m.transform_point(Vec3::X),
            Vec3::new(6.0, 5.0, 6.0)
        );
    }

    #[test]
    fn facing_point_ignores_stored_orientation() {
        let frame = CartesianFrame::at(Vec3::new(1.0, 0.0, 0.0))
            .with_orientation(Vec3::Y, Vec3::Z);
        let faced = frame.facing_point(Vec3::new(1.0, 0.0, 10.0));
        assert_relative_eq!(faced.forward(), Vec3::Z);
        assert_relative_eq!(faced.up(), Vec3::Y);
        assert_eq!(faced.position(), frame.position());
    }

    #[test]
    fn facing_point_straight_up_uses_fallback_hint() {
        let faced = CartesianFrame::default().facing_point(Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(faced.forward(), Vec3::Y);
        assert!(faced.up().dot(faced.forward()).abs() < 1e-6);
    }

    #[test]
    fn degenerate_orientation_is_rejected() {
        let mut frame = CartesianFrame::default();
        assert!(!frame.set_orientation(Vec3::ZERO, Vec3::Y));
        assert!(!frame.set_orientation(Vec3::Y, Vec3::Y));
        assert_eq!(frame, CartesianFrame::default());
    }
}
