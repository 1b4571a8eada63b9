//! Camera gestures

/// A single interactive camera-control input
///
/// Deltas are raw client units (pixels for drags, wheel units for zoom);
/// [`crate::CameraController::apply`] scales them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    /// Orbit drag, pointer delta in pixels
    Rotate { dx: f32, dy: f32 },
    /// Pan drag, pointer delta in pixels
    Pan { dx: f32, dy: f32 },
    /// Wheel zoom towards the pixel under the cursor
    Zoom { x: f32, y: f32, amount: f32 },
    /// Back to the initial pose
    Reset,
}

impl GestureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GestureEvent::Rotate { .. } => "rotate",
            GestureEvent::Pan { .. } => "pan",
            GestureEvent::Zoom { .. } => "zoom",
            GestureEvent::Reset => "reset",
        }
    }
}
