//! Scalar and vector helpers on top of glam
//!
//! Kinematics use `glam::Vec3`; these fill the gaps the resolver and the
//! observer mirror need (plane projection, look rotation, move-towards).

use glam::{Mat3, Quat, Vec3};

/// Linear interpolation, `t` unclamped
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Where `value` sits between `a` and `b`, clamped to [0, 1]
#[inline]
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if (b - a).abs() <= f32::EPSILON {
        return 0.0;
    }
    ((value - a) / (b - a)).clamp(0.0, 1.0)
}

/// Component of `v` along `normal` (normal need not be unit length)
#[inline]
pub fn project_onto(v: Vec3, normal: Vec3) -> Vec3 {
    let len_sq = normal.length_squared();
    if len_sq <= f32::EPSILON {
        return Vec3::ZERO;
    }
    normal * (v.dot(normal) / len_sq)
}

/// Component of `v` lying in the plane with the given normal
#[inline]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    v - project_onto(v, normal)
}

/// Velocity after bouncing off a surface.
///
/// The normal component is reversed and scaled by `bounciness`; the
/// tangential component is kept as is.
#[inline]
pub fn bounce(velocity: Vec3, normal: Vec3, bounciness: f32) -> Vec3 {
    -project_onto(velocity, normal) * bounciness + project_on_plane(velocity, normal)
}

/// Rotation whose local +Z points along `forward` with local +Y as close to
/// `up` as possible. Degenerate inputs fall back to a different up axis,
/// and a zero forward gives the identity.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let f = forward.normalize_or_zero();
    if f == Vec3::ZERO {
        return Quat::IDENTITY;
    }

    let mut right = up.cross(f);
    if right.length_squared() <= 1e-8 {
        // forward is parallel to up
        let alt = if f.x.abs() < 0.9 { Vec3::X } else { Vec3::Z };
        right = alt.cross(f);
    }
    let right = right.normalize();
    let true_up = f.cross(right);

    Quat::from_mat3(&Mat3::from_cols(right, true_up, f)).normalize()
}

/// Move `current` toward `target` by at most `max_delta`
#[inline]
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let to_target = target - current;
    let dist = to_target.length();
    if dist <= max_delta || dist <= f32::EPSILON {
        target
    } else {
        current + to_target / dist * max_delta
    }
}

/// True when every component is finite
#[inline]
pub fn is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}
