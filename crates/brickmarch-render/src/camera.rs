//! Camera and view management.

use brickmarch_core::InputState;
use glam::{Vec2, Vec3};

use crate::ray_march::Ray;

/// Distance from the eye to the image plane, in units of half the image
/// height. Must match `sdf_raymarch.comp`.
pub const FOCAL_LENGTH: f32 = 1.5;

/// View used for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Unit view direction.
    pub direction: Vec3,
}

impl Camera {
    pub fn new(position: Vec3, direction: Vec3) -> Self {
        Self {
            position,
            direction: direction.normalize(),
        }
    }

    /// Screen-right and screen-up vectors.
    pub fn basis(&self) -> (Vec3, Vec3) {
        let right = self
            .direction
            .cross(Vec3::Y)
            .try_normalize()
            .unwrap_or(Vec3::NEG_X);
        let up = right.cross(self.direction);
        (right, up)
    }

    /// Ray through the center of `pixel` in a `width`×`height` image,
    /// using the same projection as the raymarch shader.
    pub fn ray_through(&self, pixel: Vec2, width: u32, height: u32) -> Ray {
        let resolution = Vec2::new(width as f32, height as f32);
        let mut uv = (pixel + 0.5 - 0.5 * resolution) / resolution.y;
        uv.y = -uv.y;

        let (right, up) = self.basis();
        Ray::new(
            self.position,
            self.direction * FOCAL_LENGTH + right * uv.x + up * uv.y,
        )
    }
}

/// Free-flying editor camera driven by mouse look and WASD/QE movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyCamera {
    pub position: Vec3,
    /// Rotation about the Y axis, radians.
    pub yaw: f32,
    /// Elevation, radians, clamped to ±[`FlyCamera::PITCH_LIMIT`].
    pub pitch: f32,
    /// Movement speed in units per second.
    pub speed: f32,
    /// Radians per pixel of mouse motion.
    pub sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.5, -5.0),
            yaw: -1.57,
            pitch: -0.15,
            speed: 5.0,
            sensitivity: 0.003,
        }
    }
}

impl FlyCamera {
    pub const PITCH_LIMIT: f32 = 1.5;
    pub const MIN_SPEED: f32 = 0.5;
    pub const MAX_SPEED: f32 = 50.0;
    /// Speed change per scroll step.
    pub const SCROLL_SPEED_STEP: f32 = 0.5;

    /// Unit view direction from yaw and pitch.
    pub fn direction(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw)
    }

    /// Horizontal strafe direction.
    pub fn right(&self) -> Vec3 {
        let dir = self.direction();
        Vec3::new(-dir.z, 0.0, dir.x)
            .try_normalize()
            .unwrap_or(Vec3::NEG_X)
    }

    /// Apply one frame of input.
    pub fn update(&mut self, input: &InputState, dt: f32) {
        let active = input.camera_active();

        if active {
            self.yaw -= input.mouse_delta.x * self.sensitivity;
            self.pitch = (self.pitch - input.mouse_delta.y * self.sensitivity)
                .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
        }

        if !input.ui_captures_mouse {
            self.speed = (self.speed + input.scroll_delta * Self::SCROLL_SPEED_STEP)
                .clamp(Self::MIN_SPEED, Self::MAX_SPEED);
        }

        if active {
            let axes = input.movement.axes();
            let step = self.speed * dt;
            self.position += self.direction() * axes.z * step;
            self.position += self.right() * axes.x * step;
            self.position.y += axes.y * step;
        }
    }

    pub fn camera(&self) -> Camera {
        Camera {
            position: self.position,
            direction: self.direction(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use brickmarch_core::MoveIntent;

    fn captured() -> InputState {
        InputState {
            mouse_captured: true,
            ..Default::default()
        }
    }

    #[test]
    fn center_ray_follows_view_direction() {
        let camera = Camera::new(Vec3::ZERO, Vec3::Z);
        // Even sizes put the center between pixels.
        let ray = camera.ray_through(Vec2::new(49.5, 24.5), 100, 50);
        assert_relative_eq!(ray.direction.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(ray.direction.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(ray.direction.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn top_of_image_looks_up() {
        let camera = Camera::new(Vec3::ZERO, Vec3::Z);
        let ray = camera.ray_through(Vec2::new(50.0, 0.0), 100, 50);
        assert!(ray.direction.y > 0.0);
    }

    #[test]
    fn direction_from_yaw_and_pitch() {
        let camera = FlyCamera {
            yaw: 0.0,
            pitch: 0.0,
            ..Default::default()
        };
        assert_relative_eq!(camera.direction().z, 1.0);
        assert_relative_eq!(camera.right().x, -1.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = FlyCamera::default();
        let input = InputState {
            mouse_delta: Vec2::new(0.0, -10_000.0),
            ..captured()
        };
        camera.update(&input, 0.016);
        assert_relative_eq!(camera.pitch, FlyCamera::PITCH_LIMIT);
    }

    #[test]
    fn look_ignored_without_capture() {
        let mut camera = FlyCamera::default();
        let input = InputState {
            mouse_delta: Vec2::new(100.0, 100.0),
            ..Default::default()
        };
        camera.update(&input, 0.016);
        assert_eq!(camera.yaw, FlyCamera::default().yaw);
        assert_eq!(camera.pitch, FlyCamera::default().pitch);
    }

    #[test]
    fn scroll_speed_is_clamped() {
        let mut camera = FlyCamera::default();
        camera.update(
            &InputState {
                scroll_delta: 1000.0,
                ..Default::default()
            },
            0.0,
        );
        assert_eq!(camera.speed, FlyCamera::MAX_SPEED);
        camera.update(
            &InputState {
                scroll_delta: -1000.0,
                ..Default::default()
            },
            0.0,
        );
        assert_eq!(camera.speed, FlyCamera::MIN_SPEED);
    }

    #[test]
    fn forward_moves_along_direction() {
        let mut camera = FlyCamera::default();
        let start = camera.position;
        let dir = camera.direction();
        let input = InputState {
            movement: MoveIntent {
                forward: true,
                ..Default::default()
            },
            ..captured()
        };
        camera.update(&input, 0.5);
        let moved = camera.position - start;
        assert_relative_eq!(moved.length(), 2.5, epsilon = 1e-5);
        assert_relative_eq!(moved.normalize().dot(dir), 1.0, epsilon = 1e-5);
    }
}
