// Free-fly camera
//
// Pure math over glam, no GPU state. Angles are stored in degrees.

use glam::{Mat4, Vec2, Vec3};

use crate::config::CameraConfig;
use crate::input::{InputState, Key};

pub const PITCH_LIMIT: f32 = 89.0;
pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    pub speed: f32,
    pub sensitivity: f32,
    zoom: f32,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            world_up: Vec3::Y,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            speed: 2.5,
            sensitivity: 0.1,
            zoom: MAX_ZOOM,
        };
        camera.update_vectors();
        camera
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self::new(Vec3::from_array(config.position), config.yaw, config.pitch);
        camera.speed = config.speed;
        camera.sensitivity = config.sensitivity;
        camera.zoom = config.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        camera
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Vertical field of view in degrees
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn process_keyboard(&mut self, direction: Movement, delta_time: f32) {
        let velocity = self.speed * delta_time;
        match direction {
            Movement::Forward => self.position += self.front * velocity,
            Movement::Backward => self.position -= self.front * velocity,
            Movement::Left => self.position -= self.right * velocity,
            Movement::Right => self.position += self.right * velocity,
            Movement::Up => self.position += self.world_up * velocity,
            Movement::Down => self.position -= self.world_up * velocity,
        }
    }

    /// Offsets are in pixels, y positive = look up
    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32) {
        self.yaw += x_offset * self.sensitivity;
        self.pitch = (self.pitch + y_offset * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    pub fn process_mouse_scroll(&mut self, y_offset: f32) {
        self.zoom = (self.zoom - y_offset).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Perspective projection in Vulkan clip space: depth in [0, 1] and the
    /// y axis flipped so +y points up on screen.
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.zoom.to_radians(), aspect_ratio, NEAR_PLANE, FAR_PLANE);
        proj.y_axis.y *= -1.0;
        proj
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

/// Translates one frame of polled input into camera motion.
///
/// Movement is scaled by `delta_time` so speed is independent of frame rate.
/// Mouse look only applies while the cursor is captured.
pub fn apply_input(camera: &mut Camera, input: &mut InputState, delta_time: f32) {
    const BINDINGS: &[(Key, Movement)] = &[
        (Key::W, Movement::Forward),
        (Key::S, Movement::Backward),
        (Key::A, Movement::Left),
        (Key::D, Movement::Right),
        (Key::Space, Movement::Up),
        (Key::LeftControl, Movement::Down),
    ];

    for &(key, movement) in BINDINGS {
        if input.is_key_down(key) {
            camera.process_keyboard(movement, delta_time);
        }
    }
    if input.is_key_down(Key::RightControl) && !input.is_key_down(Key::LeftControl) {
        camera.process_keyboard(Movement::Down, delta_time);
    }

    let delta = input.take_mouse_delta();
    if input.is_captured() && delta != Vec2::ZERO {
        camera.process_mouse_movement(delta.x, delta.y);
    }

    let scroll = input.take_scroll();
    if scroll != 0.0 {
        camera.process_mouse_scroll(scroll);
    }
}

/// Model transform of the spinning cube: 45 degrees per second about +Z
pub fn model_rotation(elapsed_seconds: f32) -> Mat4 {
    Mat4::from_axis_angle(Vec3::Z, elapsed_seconds * 45f32.to_radians())
}

#[cfg(test)]
impl Camera {
    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera() -> Camera {
        Camera::from_config(&CameraConfig::default())
    }

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = default_camera();
        assert!(camera.front().abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!(camera.right().abs_diff_eq(Vec3::X, 1e-5));
        assert!(camera.up().abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = default_camera();
        camera.process_mouse_movement(0.0, 10_000.0);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
        camera.process_mouse_movement(0.0, -50_000.0);
        assert_eq!(camera.pitch(), -PITCH_LIMIT);

        for step in [13.0, -700.0, 2.5, 900.0, -3.0] {
            camera.process_mouse_movement(step, step);
            assert!((-PITCH_LIMIT..=PITCH_LIMIT).contains(&camera.pitch()));
        }
        assert!(camera.front().is_finite());
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = default_camera();
        for offset in [3.0, 100.0, -7.0, -200.0, 0.5, 44.0] {
            camera.process_mouse_scroll(offset);
            assert!((MIN_ZOOM..=MAX_ZOOM).contains(&camera.zoom()));
        }
        camera.process_mouse_scroll(1000.0);
        assert_eq!(camera.zoom(), MIN_ZOOM);
        camera.process_mouse_scroll(-1000.0);
        assert_eq!(camera.zoom(), MAX_ZOOM);
    }

    #[test]
    fn movement_scales_with_delta_time() {
        let mut slow = default_camera();
        let mut fast = default_camera();
        let start = slow.position;

        slow.process_keyboard(Movement::Forward, 0.5);
        fast.process_keyboard(Movement::Forward, 1.0);

        let slow_distance = (slow.position - start).length();
        let fast_distance = (fast.position - start).length();
        assert!((slow_distance - 1.25).abs() < 1e-5);
        assert!((fast_distance - 2.5).abs() < 1e-5);
    }

    #[test]
    fn projection_flips_y() {
        let camera = default_camera();
        let proj = camera.projection_matrix(1024.0 / 768.0);
        assert!(proj.y_axis.y < 0.0);
        // Near plane maps to depth 0 in Vulkan clip space
        let clip = proj * glam::Vec4::new(0.0, 0.0, -NEAR_PLANE, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-5);
    }

    #[test]
    fn apply_input_moves_and_looks() {
        let mut camera = default_camera();
        let mut input = InputState::new();
        let start = camera.position;

        input.set_key(Key::W, true);
        apply_input(&mut camera, &mut input, 1.0);
        assert!(camera.position.z < start.z);

        // Released cursor: motion has no effect on yaw
        let yaw = camera.yaw();
        input.mouse_motion(100.0, 0.0);
        apply_input(&mut camera, &mut input, 0.0);
        assert_eq!(camera.yaw(), yaw);

        input.set_captured(true);
        input.mouse_motion(500.0, 500.0);
        input.mouse_motion(10.0, 0.0);
        apply_input(&mut camera, &mut input, 0.0);
        assert!((camera.yaw() - (yaw + 1.0)).abs() < 1e-5);
    }

    #[test]
    fn model_rotation_is_about_z() {
        let model = model_rotation(2.0);
        let rotated = model.transform_vector3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert!(model.transform_vector3(Vec3::Z).abs_diff_eq(Vec3::Z, 1e-5));
    }
}
