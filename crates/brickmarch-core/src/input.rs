//! Per-frame input snapshot handed to the core by the windowing layer.

use glam::Vec2;

/// Movement keys held this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveIntent {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MoveIntent {
    /// Signed axes: x = right, y = up, z = forward.
    pub fn axes(&self) -> glam::Vec3 {
        let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        glam::Vec3::new(
            axis(self.right, self.left),
            axis(self.up, self.down),
            axis(self.forward, self.back),
        )
    }
}

/// Input state for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputState {
    /// Cursor position in output-image pixels.
    pub cursor: Vec2,
    /// Mouse motion since the previous frame, in pixels.
    pub mouse_delta: Vec2,
    /// Scroll wheel motion since the previous frame.
    pub scroll_delta: f32,
    /// The camera owns the mouse (e.g. right button held).
    pub mouse_captured: bool,
    /// The UI layer wants the mouse this frame.
    pub ui_captures_mouse: bool,
    pub movement: MoveIntent,
}

impl InputState {
    /// Whether look and movement input should drive the camera.
    pub const fn camera_active(&self) -> bool {
        self.mouse_captured && !self.ui_captures_mouse
    }

    /// Clear per-frame deltas after they have been consumed.
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_requires_capture_without_ui() {
        let mut input = InputState {
            mouse_captured: true,
            ..Default::default()
        };
        assert!(input.camera_active());
        input.ui_captures_mouse = true;
        assert!(!input.camera_active());
    }

    #[test]
    fn opposing_keys_cancel() {
        let intent = MoveIntent {
            forward: true,
            back: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(intent.axes(), glam::Vec3::new(1.0, 0.0, 0.0));
    }
}
