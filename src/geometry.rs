//! Directions and orientations in the listener's world frame.
//!
//! The world frame is right handed with `+x` pointing right, `+y` up and `-z`
//! forward. Azimuth grows counter clockwise when seen from above, so a source
//! at azimuth 90° sits to the listener's left. Elevation grows upwards.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Quat, Vec3};

/// Tolerance used by approximate comparisons of angles and positions.
pub const EPSILON: f32 = 1e-6;

/// Cartesian position in the world frame.
pub type WorldPosition = Vec3;

/// Orientation change in the world frame, a unit quaternion.
pub type WorldRotation = Quat;

/// Direction on the unit sphere.
///
/// Azimuth lies in `(-π, π]` and elevation in `[-π/2, π/2]`, both radians.
///
/// At the poles azimuth is undefined. Whenever a direction lies within
/// [`EPSILON`] of a pole its azimuth is stored as `0`, no matter how it was
/// constructed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SphericalAngle {
    azimuth: f32,
    elevation: f32,
}

impl SphericalAngle {
    pub fn new(azimuth: f32, elevation: f32) -> Self {
        if elevation.abs() > FRAC_PI_2 {
            // over the top: let the cartesian form fold it back into range
            let raw = SphericalAngle { azimuth, elevation };
            return Self::from_world_position(raw.world_position_on_unit_sphere());
        }

        if FRAC_PI_2 - elevation.abs() < EPSILON {
            return SphericalAngle {
                azimuth: 0.0,
                elevation,
            };
        }

        SphericalAngle {
            azimuth: wrap_azimuth(azimuth),
            elevation,
        }
    }

    pub fn from_degrees(azimuth: f32, elevation: f32) -> Self {
        Self::new(azimuth.to_radians(), elevation.to_radians())
    }

    /// Direction of `position` as seen from the origin.
    ///
    /// `position` does not need to be unit length. The zero vector maps to
    /// `(0, 0)`.
    pub fn from_world_position(position: WorldPosition) -> Self {
        let horizontal = f32::hypot(position.x, position.z);
        let elevation = f32::atan2(position.y, horizontal);

        let azimuth = if horizontal < EPSILON {
            0.0
        } else {
            wrap_azimuth(f32::atan2(-position.x, -position.z))
        };

        SphericalAngle { azimuth, elevation }
    }

    pub fn world_position_on_unit_sphere(&self) -> WorldPosition {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();

        Vec3::new(-cos_el * sin_az, sin_el, -cos_el * cos_az)
    }

    /// Mirror across the median plane.
    pub fn flip_azimuth(&self) -> Self {
        Self::new(-self.azimuth, self.elevation)
    }

    pub fn rotate(&self, rotation: WorldRotation) -> Self {
        Self::from_world_position(rotation * self.world_position_on_unit_sphere())
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    pub fn azimuth_degrees(&self) -> f32 {
        self.azimuth.to_degrees()
    }

    pub fn elevation_degrees(&self) -> f32 {
        self.elevation.to_degrees()
    }

    /// Compares directions, not raw components, so `π` and `-π` azimuths match.
    pub fn approx_eq(&self, other: &SphericalAngle) -> bool {
        let a = self.world_position_on_unit_sphere();
        let b = other.world_position_on_unit_sphere();

        a.abs_diff_eq(b, EPSILON * 4.0)
    }
}

fn wrap_azimuth(azimuth: f32) -> f32 {
    if azimuth > -PI && azimuth <= PI {
        return azimuth;
    }

    let wrapped = azimuth.rem_euclid(TAU);

    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}
