//! Math types and projection helpers
//!
//! Projections use a zero-to-one depth range, matching Vulkan's clip space.
//! The Y flip that Vulkan needs is applied separately with [`flip_y`], so the
//! projection functions stay identical to their right-handed textbook forms.

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// World-space up axis
pub const WORLD_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Convert degrees to radians
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees.to_radians()
}

/// Right-handed look-at view matrix
pub fn look_at(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(*eye), &Point3::from(*target), up)
}

/// Right-handed perspective projection with depth mapped to `[0, 1]`
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let tan_half = (fov_y * 0.5).tan();
    let mut m = Mat4::zeros();
    m[(0, 0)] = 1.0 / (aspect * tan_half);
    m[(1, 1)] = 1.0 / tan_half;
    m[(2, 2)] = far / (near - far);
    m[(3, 2)] = -1.0;
    m[(2, 3)] = -(far * near) / (far - near);
    m
}

/// Right-handed orthographic projection with depth mapped to `[0, 1]`
pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let mut m = Mat4::identity();
    m[(0, 0)] = 2.0 / (right - left);
    m[(1, 1)] = 2.0 / (top - bottom);
    m[(2, 2)] = -1.0 / (far - near);
    m[(0, 3)] = -(right + left) / (right - left);
    m[(1, 3)] = -(top + bottom) / (top - bottom);
    m[(2, 3)] = -near / (far - near);
    m
}

/// Negate the row-1 column-1 term so +Y points up in Vulkan clip space
pub fn flip_y(mut projection: Mat4) -> Mat4 {
    projection[(1, 1)] *= -1.0;
    projection
}

/// Column-major array form used for GPU uploads
pub fn to_columns(m: &Mat4) -> [[f32; 4]; 4] {
    (*m).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let proj = perspective(deg_to_rad(60.0), 4.0 / 3.0, 0.1, 100.0);

        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);

        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn orthographic_maps_box_to_clip_volume() {
        let proj = orthographic(0.0, 1.0, -0.5, 0.5, 0.1, 100.0);

        let corner = proj * Vec4::new(1.0, 0.5, -100.0, 1.0);
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corner.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corner.z, 1.0, epsilon = 1e-5);

        let origin = proj * Vec4::new(0.0, -0.5, -0.1, 1.0);
        assert_relative_eq!(origin.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(origin.y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(origin.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn flip_y_only_touches_the_y_scale() {
        let proj = perspective(deg_to_rad(45.0), 1.0, 0.1, 10.0);
        let flipped = flip_y(proj);

        assert_relative_eq!(flipped[(1, 1)], -proj[(1, 1)]);
        assert_relative_eq!(flipped[(0, 0)], proj[(0, 0)]);
        assert_relative_eq!(flipped[(2, 3)], proj[(2, 3)]);
    }

    #[test]
    fn look_at_moves_target_onto_negative_z() {
        let view = look_at(&Vec3::new(0.0, 0.0, 5.0), &Vec3::zeros(), &WORLD_UP);
        let target = view.transform_point(&Point3::origin());

        assert_relative_eq!(target, Point3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }
}
