//! # Fly Camera
//!
//! Yaw/pitch camera driven by keyboard movement and mouse look. View space is
//! right-handed and Y-up; the projection uses a zero-to-one depth range and
//! has its Y scale flipped for Vulkan clip space.
//!
//! Mouse input arrives as absolute cursor positions. The first position after
//! the latch is armed only records the cursor, so grabbing the view never
//! produces a jump.

use crate::core::config::CameraConfig;
use crate::foundation::math::{self, Mat4, Vec3, WORLD_UP};
use crate::input::MovementDirection;

/// Pitch limit in degrees, keeps the front vector away from world up
const PITCH_LIMIT: f32 = 89.0;

/// First-person camera with yaw and pitch angles
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position
    pub position: Vec3,
    /// Units per second
    pub move_speed: f32,
    /// Degrees per pixel of cursor movement
    pub sensitivity: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,

    yaw: f32,
    pitch: f32,
    front: Vec3,
    right: Vec3,
    up: Vec3,

    first_move: bool,
    last_cursor: (f32, f32),
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl Camera {
    /// Create a camera looking down -Z from the configured position
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self {
            position: config.position,
            move_speed: config.move_speed,
            sensitivity: config.sensitivity,
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
            yaw: -90.0,
            pitch: 0.0,
            front: Vec3::new(0.0, 0.0, -1.0),
            right: Vec3::new(1.0, 0.0, 0.0),
            up: WORLD_UP,
            first_move: true,
            last_cursor: (0.0, 0.0),
        };
        camera.update_vectors();
        camera
    }

    /// Yaw angle in degrees
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch angle in degrees
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Normalized viewing direction
    pub fn front(&self) -> Vec3 {
        self.front
    }

    /// Normalized right vector
    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// Normalized camera up vector
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Move one step of `move_speed * dt` along `direction`
    pub fn process_movement(&mut self, direction: MovementDirection, dt: f32) {
        let velocity = self.move_speed * dt;
        match direction {
            MovementDirection::Forward => self.position += self.front * velocity,
            MovementDirection::Backward => self.position -= self.front * velocity,
            MovementDirection::Left => self.position -= self.right * velocity,
            MovementDirection::Right => self.position += self.right * velocity,
            MovementDirection::Up => self.position += WORLD_UP * velocity,
            MovementDirection::Down => self.position -= WORLD_UP * velocity,
        }
    }

    /// Feed an absolute cursor position while mouse look is active
    pub fn process_mouse_move(&mut self, x: f32, y: f32) {
        if self.first_move {
            self.last_cursor = (x, y);
            self.first_move = false;
        }

        let dx = (x - self.last_cursor.0) * self.sensitivity;
        let dy = (y - self.last_cursor.1) * self.sensitivity;
        self.last_cursor = (x, y);

        self.yaw += dx;
        self.pitch = (self.pitch + dy).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// Arm the first-move latch; call when mouse look is released
    pub fn release_mouse(&mut self) {
        self.first_move = true;
    }

    /// World-to-view transform
    pub fn view_matrix(&self) -> Mat4 {
        math::look_at(&self.position, &(self.position + self.front), &self.up)
    }

    /// Perspective projection for `aspect`, Y flipped for Vulkan
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        math::flip_y(math::perspective(
            math::deg_to_rad(self.fov_degrees),
            aspect,
            self.near,
            self.far,
        ))
    }

    fn update_vectors(&mut self) {
        let yaw = math::deg_to_rad(self.yaw);
        // Cursor Y grows downwards, so positive pitch looks down
        let pitch = math::deg_to_rad(-self.pitch);

        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(&WORLD_UP).normalize();
        self.up = self.right.cross(&self.front).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_at_origin() -> Camera {
        Camera::from_config(&CameraConfig {
            position: Vec3::zeros(),
            ..CameraConfig::default()
        })
    }

    #[test]
    fn initial_orientation_looks_down_negative_z() {
        let camera = camera_at_origin();

        assert_relative_eq!(camera.front(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        assert_relative_eq!(camera.right(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(camera.up(), WORLD_UP, epsilon = 1e-6);
    }

    #[test]
    fn forward_step_scales_with_speed_and_time() {
        let mut camera = camera_at_origin();
        camera.move_speed = 2.0;

        camera.process_movement(MovementDirection::Forward, 0.5);

        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn vertical_moves_follow_world_up() {
        let mut camera = camera_at_origin();
        camera.process_mouse_move(0.0, 0.0);
        camera.process_mouse_move(0.0, 100.0);

        camera.process_movement(MovementDirection::Up, 1.0);

        assert_relative_eq!(camera.position.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.position.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn first_cursor_sample_does_not_rotate() {
        let mut camera = camera_at_origin();

        camera.process_mouse_move(400.0, 300.0);

        assert_relative_eq!(camera.yaw(), -90.0);
        assert_relative_eq!(camera.pitch(), 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera_at_origin();
        camera.process_mouse_move(0.0, 0.0);
        camera.process_mouse_move(0.0, 10_000.0);

        assert_relative_eq!(camera.pitch(), 89.0);
        assert!(camera.front().y < 0.0);

        camera.process_mouse_move(0.0, -10_000.0);
        assert_relative_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn released_mouse_rearms_the_latch() {
        let mut camera = camera_at_origin();
        camera.process_mouse_move(0.0, 0.0);
        camera.release_mouse();

        camera.process_mouse_move(500.0, 0.0);

        assert_relative_eq!(camera.yaw(), -90.0);
    }

    #[test]
    fn yaw_turns_right_with_cursor() {
        let mut camera = camera_at_origin();
        camera.sensitivity = 1.0;
        camera.process_mouse_move(0.0, 0.0);
        camera.process_mouse_move(90.0, 0.0);

        assert_relative_eq!(camera.front(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn projection_is_flipped_for_vulkan() {
        let camera = camera_at_origin();
        let unflipped = math::perspective(math::deg_to_rad(60.0), 1.5, 0.1, 100.0);

        let projection = camera.projection_matrix(1.5);

        assert_relative_eq!(projection[(1, 1)], -unflipped[(1, 1)], epsilon = 1e-6);
    }

    #[test]
    fn view_places_camera_at_origin() {
        let mut camera = camera_at_origin();
        camera.position = Vec3::new(1.0, 2.0, 3.0);

        let eye = camera.view_matrix().transform_point(&math::Point3::new(1.0, 2.0, 3.0));

        assert_relative_eq!(eye, math::Point3::origin(), epsilon = 1e-5);
    }
}
