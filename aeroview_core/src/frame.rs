//! Body-frame <-> render-frame conversion.
//!
//! Body frame: x forward, y left, z up; orientation as roll/pitch/yaw in
//! degrees (intrinsic Z-Y-X: yaw, then pitch, then roll).
//!
//! Render frame: x right, y up, z back (the renderer looks down -z).
//!
//! ```text
//!   body            render
//!   forward  --->   -z
//!   left     --->   -x
//!   up       --->   +y
//! ```
//!
//! The remap is a proper rotation (determinant +1), so the same signed
//! permutation applies to positions and to the vector part of a quaternion.

use crate::pose::Pose;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Anything whose render-frame position and rotation can be written.
pub trait RenderTarget {
    fn set_render_position(&mut self, position: Vector3<f64>);
    fn set_render_rotation(&mut self, rotation: UnitQuaternion<f64>);
}

/// Body position (forward, left, up) -> render position (right, up, back).
#[inline]
pub fn to_render_position(body: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-body.y, body.z, -body.x)
}

/// Render position (right, up, back) -> body position (forward, left, up).
#[inline]
pub fn to_body_position(render: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-render.z, -render.x, render.y)
}

/// Builds the body-frame orientation from roll/pitch/yaw in degrees.
///
/// `from_euler_angles` composes `Rz(yaw) * Ry(pitch) * Rx(roll)`, which is
/// the intrinsic yaw-pitch-roll order used by the vehicle.
pub fn body_rotation(rpy_deg: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(
        rpy_deg.x.to_radians(),
        rpy_deg.y.to_radians(),
        rpy_deg.z.to_radians(),
    )
}

/// Body roll/pitch/yaw (degrees) -> render-frame rotation.
///
/// The rotation is composed once in the body frame, then its axis is
/// remapped with the position rule: roll (body x) becomes -render z,
/// pitch (body y) becomes -render x, yaw (body z) becomes render y.
pub fn to_render_rotation(rpy_deg: &Vector3<f64>) -> UnitQuaternion<f64> {
    let q = body_rotation(rpy_deg).into_inner();
    UnitQuaternion::new_unchecked(Quaternion::new(q.w, -q.j, q.k, -q.i))
}

/// Render-frame rotation -> body roll/pitch/yaw in degrees.
pub fn to_body_rotation(render: &UnitQuaternion<f64>) -> Vector3<f64> {
    let q = render.as_ref();
    let body = UnitQuaternion::new_unchecked(Quaternion::new(q.w, -q.k, -q.i, q.j));
    let (roll, pitch, yaw) = body.euler_angles();
    Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}

/// Writes a body pose onto a render target in one call.
pub fn apply_pose<T: RenderTarget + ?Sized>(target: &mut T, pose: &Pose) {
    target.set_render_position(to_render_position(&pose.position));
    target.set_render_rotation(to_render_rotation(&pose.rpy_deg));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_axis_mapping() {
        let forward = to_render_position(&Vector3::new(1.0, 0.0, 0.0));
        let left = to_render_position(&Vector3::new(0.0, 1.0, 0.0));
        let up = to_render_position(&Vector3::new(0.0, 0.0, 1.0));

        assert_eq!(forward, Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(left, Vector3::new(-1.0, 0.0, 0.0));
        assert_eq!(up, Vector3::new(0.0, 1.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_position_round_trip(
            x in -1.0e6f64..1.0e6,
            y in -1.0e6f64..1.0e6,
            z in -1.0e6f64..1.0e6,
        ) {
            let p = Vector3::new(x, y, z);
            let back = to_body_position(&to_render_position(&p));
            prop_assert!((back - p).norm() <= 1e-9);
        }

        #[test]
        fn prop_rotation_round_trip(
            roll in -179.0f64..179.0,
            pitch in -89.0f64..89.0,
            yaw in -179.0f64..179.0,
        ) {
            let rpy = Vector3::new(roll, pitch, yaw);
            let back = to_body_rotation(&to_render_rotation(&rpy));
            prop_assert!((back - rpy).norm() <= 1e-6);
        }
    }

    #[test]
    fn test_yaw_90_turns_forward_into_left() {
        let rotation = to_render_rotation(&Vector3::new(0.0, 0.0, 90.0));
        let forward = to_render_position(&Vector3::new(1.0, 0.0, 0.0));

        let rotated = to_body_position(&(rotation * forward));

        assert_relative_eq!(rotated, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_roll_90_turns_left_into_up() {
        let rotation = to_render_rotation(&Vector3::new(90.0, 0.0, 0.0));
        let left = to_render_position(&Vector3::new(0.0, 1.0, 0.0));

        let rotated = to_body_position(&(rotation * left));

        assert_relative_eq!(rotated, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_render_rotation_matches_change_of_basis() {
        // R_render = M * R_body * M^T for the signed permutation M
        let rpy = Vector3::new(25.0, -40.0, 130.0);
        let body = body_rotation(&rpy);
        let render = to_render_rotation(&rpy);

        for v in [Vector3::x(), Vector3::y(), Vector3::z(), Vector3::new(0.3, -1.2, 2.0)] {
            let via_body = to_render_position(&(body * v));
            let via_render = render * to_render_position(&v);
            assert_relative_eq!(via_body, via_render, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_composed_rotation_differs_from_per_axis_copy() {
        // Copying each angle onto a render axis independently is not the
        // same rotation once more than one angle is non-zero.
        let rpy = Vector3::new(30.0, 40.0, 50.0);
        let composed = to_render_rotation(&rpy);

        let per_axis = UnitQuaternion::from_euler_angles(
            rpy.y.to_radians(),
            rpy.z.to_radians(),
            rpy.x.to_radians(),
        );

        assert!(composed.angle_to(&per_axis) > 1e-3);
    }

    struct Recorder {
        position: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    }

    impl RenderTarget for Recorder {
        fn set_render_position(&mut self, position: Vector3<f64>) {
            self.position = position;
        }

        fn set_render_rotation(&mut self, rotation: UnitQuaternion<f64>) {
            self.rotation = rotation;
        }
    }

    #[test]
    fn test_apply_pose_sets_both_parts() {
        let mut target = Recorder {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        };
        let pose = Pose::new(Vector3::new(2.0, 1.0, 3.0), Vector3::new(0.0, 0.0, 45.0));

        apply_pose(&mut target, &pose);

        assert_eq!(target.position, Vector3::new(-1.0, 3.0, -2.0));
        assert_relative_eq!(target.rotation.angle(), 45f64.to_radians(), epsilon = 1e-12);
    }
}
