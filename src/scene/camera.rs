// Fly camera driven by per-frame input deltas
//
// Yaw 0 / pitch 0 looks down -Z with +Y up. Angles are in degrees.

use glam::{Mat4, Vec2, Vec3};

/// Input gathered over one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraInput {
    /// x = right, y = up, z = forward; each component in [-1, 1]
    pub movement: Vec3,
    /// x = yaw, y = pitch, e.g. mouse travel in pixels
    pub rotation: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// World units per second
    pub speed: f32,
    /// Degrees per second per unit of rotation input
    pub sensitivity: f32,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    pub const MAX_PITCH: f32 = 89.0;
    const UP: Vec3 = Vec3::Y;

    pub fn new(position: Vec3, aspect: f32) -> Self {
        let mut camera = Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 60.0,
            aspect,
            near: 0.1,
            far: 1000.0,
            speed: 2.5,
            sensitivity: 6.0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.recompute();
        camera
    }

    pub fn forward(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(-yaw.sin() * pitch.cos(), pitch.sin(), -yaw.cos() * pitch.cos())
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Self::UP).normalize()
    }

    /// Integrate one frame of input. With `dt == 0` nothing moves.
    pub fn update(&mut self, input: &CameraInput, dt: f32) {
        let step = self.speed * dt;
        let movement = self.right() * input.movement.x + Self::UP * input.movement.y + self.forward() * input.movement.z;
        self.position += movement * step;

        let turn = self.sensitivity * dt;
        self.yaw = (self.yaw + input.rotation.x * turn).rem_euclid(360.0);
        self.pitch = (self.pitch + input.rotation.y * turn).clamp(-Self::MAX_PITCH, Self::MAX_PITCH);

        self.recompute();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.recompute();
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    fn recompute(&mut self) {
        self.view = Mat4::look_to_rh(self.position, self.forward(), Self::UP);
        let mut projection = Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect.max(f32::EPSILON), self.near, self.far);
        // Vulkan clip space has +Y pointing down
        projection.y_axis.y *= -1.0;
        self.projection = projection;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(movement: Vec3, rotation: Vec2) -> CameraInput {
        CameraInput { movement, rotation }
    }

    #[test]
    fn zero_dt_changes_nothing() {
        let mut camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), 1.5);
        camera.yaw = 30.0;
        camera.pitch = -10.0;
        let before = camera.clone();
        camera.update(&input(Vec3::ONE, Vec2::new(50.0, -50.0)), 0.0);
        assert_eq!(camera.position, before.position);
        assert_eq!(camera.yaw, before.yaw);
        assert_eq!(camera.pitch, before.pitch);
    }

    #[test]
    fn pitch_is_clamped_both_ways() {
        let mut camera = Camera::new(Vec3::ZERO, 1.0);
        camera.update(&input(Vec3::ZERO, Vec2::new(0.0, 1000.0)), 1.0);
        assert_eq!(camera.pitch, 89.0);
        camera.update(&input(Vec3::ZERO, Vec2::new(0.0, -5000.0)), 1.0);
        assert_eq!(camera.pitch, -89.0);
    }

    #[test]
    fn forward_movement_scales_with_speed_and_dt() {
        let mut camera = Camera::new(Vec3::ZERO, 1.0);
        camera.speed = 4.0;
        camera.update(&input(Vec3::Z, Vec2::ZERO), 0.5);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1e-5));
    }

    #[test]
    fn strafing_follows_yaw() {
        let mut camera = Camera::new(Vec3::ZERO, 1.0);
        camera.yaw = 90.0;
        // Looking down -X, right is -Z
        camera.update(&input(Vec3::X, Vec2::ZERO), 1.0 / camera.speed);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn yaw_wraps_into_range() {
        let mut camera = Camera::new(Vec3::ZERO, 1.0);
        camera.sensitivity = 1.0;
        camera.update(&input(Vec3::ZERO, Vec2::new(-30.0, 0.0)), 1.0);
        assert!((camera.yaw - 330.0).abs() < 1e-4);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::new(Vec3::ZERO, 1.0);
        let clip = camera.view_projection() * glam::Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }
}
