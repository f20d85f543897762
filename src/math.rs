//! Math types for SoundStage

pub use glam::{Quat, Vec3};

/// Listener orientation as a facing vector and an upward vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub facing: Vec3,
    pub up: Vec3,
}

impl Orientation {
    /// Rotates both vectors about the X axis, then Y, then Z (radians).
    pub fn rotate(&mut self, x: f32, y: f32, z: f32) {
        let rotation = euler_xyz(x, y, z);
        self.facing = rotation * self.facing;
        self.up = rotation * self.up;
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            facing: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

/// Rotation that applies X, then Y, then Z.
pub fn euler_xyz(x: f32, y: f32, z: f32) -> Quat {
    Quat::from_rotation_z(z) * Quat::from_rotation_y(y) * Quat::from_rotation_x(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn rotate_about_y_turns_facing_sideways() {
        let mut orientation = Orientation::default();
        orientation.rotate(0.0, FRAC_PI_2, 0.0);
        assert!(orientation.facing.abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(orientation.up.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn rotation_order_is_x_first() {
        // X first lifts the facing vector to +Y, then Z by 90 degrees moves it to -X.
        let v = euler_xyz(FRAC_PI_2, 0.0, FRAC_PI_2) * Vec3::NEG_Z;
        assert!(v.abs_diff_eq(Vec3::NEG_X, 1e-5));
    }
}
