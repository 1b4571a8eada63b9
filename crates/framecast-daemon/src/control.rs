//! Per-connection control channel
//!
//! Turns viewer input into session changes. Drag tracking is per connection,
//! so two viewers dragging at once never see each other's anchor points. Pose
//! updates from different viewers are last-writer-wins on the shared camera.

use framecast_core::{CameraPose, GestureEvent};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::session::{Session, SessionError};

/// Mouse button code for orbit drags
pub const BUTTON_ROTATE: i64 = 1;
/// Mouse button code for pan drags
pub const BUTTON_PAN: i64 = 2;

/// Raw pointer state sent with every `user_interaction` event
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PointerInput {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "wheelDelta", default)]
    pub wheel_delta: f64,
    #[serde(default)]
    pub button: Option<i64>,
}

/// Inbound control event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    Pause,
    Resume,
    UserInteraction(PointerInput),
    ResetCam,
}

/// Result of handling one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlOutcome {
    Paused,
    Resumed,
    PoseApplied(CameraPose),
    /// Valid event with nothing to do (repeated pause, drag start, release)
    Unchanged,
    Ignored(&'static str),
}

/// Drag tracking for one connection
///
/// `pointer` is the last position seen, whatever the buttons, and is
/// reported alongside rejected gestures. `anchor` is the previous position
/// of the current drag and is cleared on release.
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pointer: Option<(f64, f64)>,
    anchor: Option<(f64, f64)>,
}

impl DragState {
    #[cfg(test)]
    pub fn pointer(&self) -> Option<(f64, f64)> {
        self.pointer
    }

    #[cfg(test)]
    pub fn anchor(&self) -> Option<(f64, f64)> {
        self.anchor
    }

    /// Update tracking and return the gesture this input produces, if any
    pub fn track(&mut self, input: &PointerInput) -> Option<GestureEvent> {
        self.pointer = Some((input.x, input.y));

        // wheel wins over any held button
        if input.wheel_delta != 0.0 {
            return Some(GestureEvent::Zoom {
                x: input.x as f32,
                y: input.y as f32,
                amount: input.wheel_delta as f32,
            });
        }

        let button = match input.button {
            Some(button) if button != 0 => button,
            _ => {
                self.anchor = None;
                return None;
            }
        };

        let gesture = self.anchor.and_then(|(prev_x, prev_y)| {
            let dx = (input.x - prev_x) as f32;
            let dy = (input.y - prev_y) as f32;
            if dx == 0.0 && dy == 0.0 {
                return None;
            }
            match button {
                BUTTON_ROTATE => Some(GestureEvent::Rotate { dx, dy }),
                BUTTON_PAN => Some(GestureEvent::Pan { dx, dy }),
                _ => None,
            }
        });
        self.anchor = Some((input.x, input.y));
        gesture
    }
}

/// Control state for one connected viewer
pub struct ControlChannel {
    session: Arc<Session>,
    drag: DragState,
}

impl ControlChannel {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            drag: DragState::default(),
        }
    }

    #[cfg(test)]
    pub fn drag(&self) -> &DragState {
        &self.drag
    }

    /// Apply one event; events of a connection are handled in arrival order
    pub async fn handle(&mut self, event: ControlEvent) -> ControlOutcome {
        match event {
            ControlEvent::Pause => {
                if self.session.set_paused(true).await {
                    ControlOutcome::Paused
                } else {
                    ControlOutcome::Unchanged
                }
            }
            ControlEvent::Resume => {
                if self.session.set_paused(false).await {
                    ControlOutcome::Resumed
                } else {
                    ControlOutcome::Unchanged
                }
            }
            ControlEvent::UserInteraction(input) => {
                if self.session.is_paused().await {
                    return ControlOutcome::Ignored("paused");
                }
                match self.drag.track(&input) {
                    Some(gesture) => self.dispatch(gesture).await,
                    None => ControlOutcome::Unchanged,
                }
            }
            ControlEvent::ResetCam => self.dispatch(GestureEvent::Reset).await,
        }
    }

    async fn dispatch(&self, gesture: GestureEvent) -> ControlOutcome {
        match self.session.apply_gesture(&gesture).await {
            Ok(pose) => ControlOutcome::PoseApplied(pose),
            Err(SessionError::NotReady) => {
                debug!(
                    gesture = gesture.name(),
                    pointer = ?self.drag.pointer,
                    "Ignoring camera control before the source is ready"
                );
                ControlOutcome::Ignored("not ready")
            }
            Err(SessionError::Terminated) => ControlOutcome::Ignored("terminated"),
            Err(SessionError::Pose(e)) => {
                debug!(
                    gesture = gesture.name(),
                    pointer = ?self.drag.pointer,
                    error = %e,
                    "Gesture produced an invalid pose"
                );
                ControlOutcome::Ignored("invalid pose")
            }
            Err(e) => {
                warn!(gesture = gesture.name(), error = %e, "Camera update failed");
                ControlOutcome::Ignored("camera update failed")
            }
        }
    }
}
